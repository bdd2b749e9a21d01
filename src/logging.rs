//! Ambient logging init, trimmed of the CLI verbosity-flag plumbing (CLI is
//! out of scope). An embedding application may call this or install its own
//! `tracing` subscriber.

/// Installs a `tracing_subscriber::fmt` subscriber at `level`. Returns an
/// error if a global subscriber is already installed.
pub fn init(level: tracing::Level) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
}
