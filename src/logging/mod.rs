use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Env var checked before `RUST_LOG`, so queue logging can be tuned on its own.
pub const LOG_ENV: &str = "BLIPQ_LOG";

/// Install the global subscriber: `BLIPQ_LOG` or `RUST_LOG` filter (default
/// `info`) and a compact formatter with RFC 3339 UTC timestamps.
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter: EnvFilter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .compact();

    let subscriber = Registry::default().with(filter).with(formatting_layer);

    tracing::subscriber::set_global_default(subscriber)
}
