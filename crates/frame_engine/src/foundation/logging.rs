//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with a default level
///
/// `RUST_LOG` still takes precedence when it is set.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        log::warn!("Logger already initialized: {}", e);
    }
}
