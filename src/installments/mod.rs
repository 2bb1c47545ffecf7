pub mod handlers;
pub mod models;
pub mod scheduler;
pub mod service;

pub use handlers::*;
pub use models::*;
pub use service::*;
