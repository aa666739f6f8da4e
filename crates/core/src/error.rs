//! Engine error type.
//!
//! Generation failures are deliberately absent: they are recovered where they
//! happen (see [`crate::llm_client::BestEffort`]). Only missing entities,
//! persistence failures and invalid requests reach callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A session or exercise the caller named does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The store rejected a read or a commit. Nothing from the failed
    /// operation is visible afterwards. Store methods return `anyhow`
    /// errors, so `?` on them lands here.
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),

    /// The request cannot apply to the target, e.g. evaluating a simulation.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let missing = EngineError::not_found("exercise", 42);
        assert_eq!(missing.to_string(), "exercise '42' not found");

        let failed = EngineError::Persistence(anyhow::anyhow!("connection reset"));
        assert_eq!(failed.to_string(), "persistence failure: connection reset");
    }
}
