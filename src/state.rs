use crate::config::Config;
use crate::rate_limit::RateLimiter;

// app's shared state
pub struct AppState {
    pub environment: String,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            environment: config.environment.clone(),
            limiter: RateLimiter::new(config.throttling.n, config.window()),
        }
    }
}
