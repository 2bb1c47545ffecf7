pub mod gateway;
pub mod handlers;
pub mod webhook;

pub use gateway::*;
pub use handlers::*;
pub use webhook::*;
