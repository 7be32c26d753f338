//! Tracing initialisation for agentlink binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events the default filter admits at the requested level.
const OWN_TARGETS: &[&str] = &["agentlink_core", "agentlink"];

/// The filter used when `RUST_LOG` is not set: `level` for agentlink's own
/// targets, `warn` for dependencies such as tokio.
pub fn default_filter(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|t| format!("{t}={}", level.as_str().to_lowercase())));
    directives.join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `json` emits newline-delimited JSON, one object per event, including
///   the fields of the enclosing `call` span (call id, worker, depth).
/// * `level` applies to agentlink targets when `RUST_LOG` is not set.
///
/// Logs go to stderr: `agentlink run` prints the call result on stdout.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    let layer = fmt::layer().with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(layer.json().with_current_span(true).with_span_list(false))
            .try_init()
    } else {
        registry.with(layer.with_target(false)).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
