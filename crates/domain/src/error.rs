/// Shared error type used across every crate in this workspace.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    /// Credential resolution failed (missing env var, no key configured).
    #[error("auth: {0}")]
    Auth(String),

    /// A plan failed validation (missing tool, unknown dependency,
    /// negative retries, or a cycle). The plan is never attempted.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// A task named a tool that isn't registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A tool's callable raised. Carries the task id for attribution.
    #[error("tool '{tool}' failed on task '{task_id}': {message}")]
    ToolFailure {
        tool: String,
        task_id: String,
        message: String,
    },

    /// The computed rate-limit wait exceeded the hard cap, or a quota
    /// error was non-retryable.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A transient provider error (rate-limited with an advised delay,
    /// or overloaded). The retry handler decides whether to retry;
    /// a `model_retry` event is emitted per attempt regardless.
    #[error("model retryable: {provider}: {message}")]
    ModelRetryable {
        provider: String,
        message: String,
        /// Provider-advised delay before the next attempt, if any.
        retry_after_ms: Option<u64>,
    },

    /// A persisted rate-limit override conflicted with an explicit
    /// environment-sourced limit and was rejected.
    #[error("config conflict: {0}")]
    ConfigConflict(String),

    /// A worker process failed to report ready within the init timeout.
    #[error("worker init failed: {0}")]
    WorkerInitFailure(String),

    /// External cancellation of a task or plan. Not a failure at the
    /// domain level — surfaces as a terminal state, not a propagated error.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// A short, user-facing rendering with no internal detail leaked —
    /// used for the `error` field of terminal events sent to clients.
    pub fn user_facing(&self) -> String {
        match self {
            Error::ToolFailure { tool, message, .. } => format!("{tool}: {message}"),
            Error::ModelRetryable { provider, .. } => {
                format!("provider {provider} is temporarily unavailable")
            }
            other => other.to_string(),
        }
    }
}
