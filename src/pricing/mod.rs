pub mod price_calculator;
pub mod totals;

pub use price_calculator::*;
pub use totals::*;
