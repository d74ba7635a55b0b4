use thiserror::Error;

/// Errors surfaced by command handlers.
///
/// Every variant is converted into a `{success: false, error}` response at the
/// dispatch boundary; none of them ever escapes a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),
    #[error("sync is not enabled")]
    NotEnabled,
    #[error("conflict not found or already resolved")]
    NotFound,
    #[error("conflict resolution timed out")]
    TimedOut,
    #[error("conflict resolution cancelled")]
    Cancelled,
    #[error("{0}")]
    Engine(String),
}

impl BridgeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code carried next to the message.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotEnabled => "not_enabled",
            Self::NotFound => "not_found",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Engine(_) => "engine_error",
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotEnabled => Self::NotEnabled,
            EngineError::InvalidArgument(msg) => Self::Validation(msg),
            other => Self::Engine(other.to_string()),
        }
    }
}

impl From<ConflictError> for BridgeError {
    fn from(e: ConflictError) -> Self {
        match e {
            ConflictError::NotFound(_) => Self::NotFound,
            ConflictError::TimedOut(_) => Self::TimedOut,
            ConflictError::Cancelled(_) => Self::Cancelled,
        }
    }
}

/// Outcome failures of the conflict rendezvous.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("conflict {0} not found or already resolved")]
    NotFound(String),
    #[error("conflict {0} timed out waiting for a decision")]
    TimedOut(String),
    #[error("conflict {0} was cancelled")]
    Cancelled(String),
}

/// Failures reported by a sync engine implementation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("sync is not enabled")]
    NotEnabled,
    #[error("missing credentials")]
    MissingCredentials,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("sync already in progress")]
    Busy,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
