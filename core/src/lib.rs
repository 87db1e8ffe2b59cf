//! Core configuration and shared plumbing for the FTP sweep engine.

pub mod config;
pub mod error;
pub mod logging;
pub mod ratelimiter;
pub mod sweep_order;

pub use config::{default_exclusions, ScanMode, ScannerConfig};
pub use error::ConfigError;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }
}
