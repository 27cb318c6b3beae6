//! Optional stderr diagnostics.
//!
//! Setting `FREELAN_FSCP_DEBUG=1` in the environment enables verbose
//! protocol diagnostics on the standard error stream. Libraries only emit
//! `tracing` events; this helper installs a matching subscriber for
//! integrators and tests that do not bring their own.

use tracing_subscriber::EnvFilter;

/// The environment variable enabling verbose diagnostics.
pub const DEBUG_ENV: &str = "FREELAN_FSCP_DEBUG";

/// Install a debug-level stderr subscriber when [`DEBUG_ENV`] is set to
/// `1`.
///
/// Does nothing when the variable is unset or a global subscriber is
/// already installed. Safe to call more than once.
pub fn init_from_env() {
    if std::env::var(DEBUG_ENV).as_deref() != Ok("1") {
        return;
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_writer(std::io::stderr)
        .try_init();
}
