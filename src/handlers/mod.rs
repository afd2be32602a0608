mod calc;
mod health;
mod metrics;

pub use calc::{add_handler, div_handler, home_handler, mul_handler, sub_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
