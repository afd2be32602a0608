use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("calc_gateway_requests_total", "Requests seen by the admission layer").unwrap();
    pub static ref ADMITTED_TOTAL: Counter =
        register_counter!("calc_gateway_admitted_total", "Requests admitted to a handler").unwrap();
    pub static ref UNAUTHORIZED_TOTAL: Counter =
        register_counter!("calc_gateway_unauthorized_total", "Requests rejected for a missing or invalid API key").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("calc_gateway_rate_limited_total", "Requests rejected by a rate rule").unwrap();
    pub static ref ADMISSION_LATENCY: Histogram = register_histogram!(
        "calc_gateway_admission_seconds",
        "Time spent deciding admission"
    )
    .unwrap();
    pub static ref WINDOW_COUNTERS: Gauge =
        register_gauge!("calc_gateway_window_counters", "Live per-identity window counters").unwrap();
}
