mod health;
mod metrics;
mod not_found;
mod users;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use not_found::not_found_handler;
pub use users::get_users;
