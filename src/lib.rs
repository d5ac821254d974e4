pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod inference;
pub mod light;
pub mod motor;
pub mod remote;
pub mod store;
pub mod stream;
pub mod turret;
#[cfg(test)]
mod tests;

pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Installs the log subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("jetson_remote=info,jetbot_remote=info,jetson_missile=info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}
