/// Domain-specific error types for the decision engine.
///
/// Fatal conditions (invalid prices, ledger limit violations, deciding
/// before the calibrator is fitted) surface here and are never silently
/// coerced. Recoverable conditions (insufficient edge, negative Kelly,
/// empty calibration history) are NOT errors -- they resolve to normal
/// zero-stake decisions or flagged default values.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("calibrator not fitted: {0}")]
    NotFitted(String),

    #[error("model fit error: {0}")]
    Fit(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
