//! Logging setup utilities for the Huddle client.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are enabled at the default level.
const LIBRARY_TARGETS: [&str; 2] = ["huddle_client", "huddle_shared"];

/// Build the default filter directive for the given binary and level.
///
/// Every library crate of the workspace and the binary itself are enabled at
/// `default_log_level`; everything else (reqwest, tungstenite) stays silent.
pub fn default_directive(binary_name: &str, default_log_level: &str) -> String {
    LIBRARY_TARGETS
        .iter()
        .copied()
        .chain(std::iter::once(binary_name))
        .map(|target| format!("{}={}", target.replace('-', "_"), default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "huddle")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use huddle_shared::logger::setup_logger;
///
/// setup_logger("huddle", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false));

    // A second initialization (e.g. in tests) keeps the first subscriber.
    if registry.try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
