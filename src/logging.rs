//! Diagnostic output.
//!
//! Logs go to stderr. `RUST_LOG` overrides the default `info` level.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
