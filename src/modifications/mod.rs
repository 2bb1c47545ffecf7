pub mod handlers;
pub mod models;
pub mod refund_policy;
pub mod service;

pub use handlers::*;
pub use models::*;
pub use refund_policy::*;
pub use service::*;
