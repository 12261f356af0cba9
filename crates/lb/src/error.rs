use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LbError {
    #[error("invalid backend address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("backend already registered: {0}")]
    Duplicate(String),

    #[error("backend not found: {0}")]
    NotFound(String),

    #[error("no backends configured")]
    NoBackends,
}
