use thiserror::Error;

/// Pool-level failures. `NoInstanceAvailable` is transient; `ShuttingDown` is
/// terminal for the pool.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("no browser instance available")]
    NoInstanceAvailable,

    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("failed to start pool: {0}")]
    StartupFailed(String),
}

/// Per-instance failures. `RestartFailed` is non-fatal: on make-before-break
/// failure the old instance remains usable.
#[derive(Debug, Clone, Error)]
pub enum InstanceError {
    #[error("browser instance failed to start: {0}")]
    StartFailed(String),

    #[error("browser instance restart failed: {0}")]
    RestartFailed(String),

    #[error("browser instance has been terminated")]
    Terminated,
}

/// Render-pipeline failures. `StatusCaptureFailed` is soft: callers still get
/// a populated `RenderResult` alongside the error.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("hard timeout exceeded")]
    HardTimeout,

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("failed to extract HTML after retries: {0}")]
    ExtractHTMLFailed(String),

    #[error("failed to capture a status code")]
    StatusCaptureFailed,
}

/// SSRF-guard rejection, carrying the human-readable reason.
#[derive(Debug, Clone, Error)]
#[error("blocked by net guard: {0}")]
pub struct NetGuardError(pub String);

/// The crate's top-level error type. Each component error nests here via
/// `#[from]` so callers can match broadly or narrowly as needed.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    NetGuard(#[from] NetGuardError),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl CoreError {
    /// Whether a caller may usefully retry the operation that produced this
    /// error. `ShuttingDown` and `Terminated` are explicitly excluded: no
    /// amount of retrying changes a pool that has been torn down.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Pool(PoolError::NoInstanceAvailable)
                | CoreError::Render(RenderError::HardTimeout)
                | CoreError::Render(RenderError::NavigationFailed(_))
                | CoreError::Render(RenderError::ExtractHTMLFailed(_))
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoreError::Pool(PoolError::ShuttingDown) => ErrorSeverity::High,
            CoreError::Instance(InstanceError::Terminated) => ErrorSeverity::High,
            CoreError::InvalidUrl(_) => ErrorSeverity::Low,
            CoreError::Render(RenderError::StatusCaptureFailed) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}
