pub mod availability;
pub mod handlers;
pub mod models;
pub mod stock_alert;

pub use availability::*;
pub use handlers::*;
pub use models::*;
pub use stock_alert::*;
