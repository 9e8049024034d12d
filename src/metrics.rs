use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("throttle_requests_total", "Total number of requests").unwrap();
    pub static ref REQUESTS_REJECTED: Counter = register_counter!(
        "throttle_requests_rejected_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref REQUESTS_UNAUTHORIZED: Counter = register_counter!(
        "throttle_requests_unauthorized_total",
        "Requests with a missing or malformed access token"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "throttle_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CALLERS: Gauge =
        register_gauge!("throttle_tracked_callers", "Callers with live limiter state").unwrap();
}

// collectors register on first touch; force it so scrapes before any
// traffic still see every series
pub fn initialize() {
    lazy_static::initialize(&REQUEST_TOTAL);
    lazy_static::initialize(&REQUESTS_REJECTED);
    lazy_static::initialize(&REQUESTS_UNAUTHORIZED);
    lazy_static::initialize(&REQUEST_LATENCY);
    lazy_static::initialize(&TRACKED_CALLERS);
}
