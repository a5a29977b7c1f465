pub mod backend; // Registry client, in-memory registry, local mirror
pub mod clinical; // Derived values, alert rules, protocols, guidance
pub mod config;
pub mod models;
pub mod report; // PDF case report
pub mod store; // Form state lifecycle
pub mod validation;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
