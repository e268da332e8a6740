//! Tracing setup shared by the binaries.
//!
//! Output goes to stderr in compact format. `RUST_LOG` overrides the
//! default filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `default_directive` applies when `RUST_LOG` is unset or invalid, e.g.
/// `"site=info,adem=info"`.
///
/// # Example
/// ```bash
/// RUST_LOG=adem=debug PORT=8080 cargo run -p site
/// ```
pub fn init(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
