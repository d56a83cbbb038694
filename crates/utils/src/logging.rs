//! Tracing setup shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "server=info,services=info,db=info,sqlx=warn";

/// Install a `fmt` subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
    {
        eprintln!("tracing init failed: {err}");
    }
}
