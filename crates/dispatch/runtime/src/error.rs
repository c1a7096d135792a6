//! Dispatcher errors.

use maple_dispatch_router::RouterError;
use maple_dispatch_throttle::ThrottleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher is closed")]
    Closed,

    #[error("Routing failed: {0}")]
    Router(#[from] RouterError),

    #[error("Throttle error: {0}")]
    Throttle(#[from] ThrottleError),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
