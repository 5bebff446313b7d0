use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input, or a limit exceeded.
    Validation(String),
    /// Candidate span intersects the named existing booking.
    Conflict(Ulid),
    NotFound(Ulid),
    /// WAL append or flush failed; nothing was applied.
    Storage(String),
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Conflict(_) => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid booking: {msg}"),
            EngineError::Conflict(id) => {
                write!(f, "booking overlaps with an existing booking: {id}")
            }
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
