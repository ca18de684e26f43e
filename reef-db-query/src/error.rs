//! Error types for the stage builder

use thiserror::Error;

/// Stage-builder errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// Error from reef-db-core
    #[error("Core error: {0}")]
    Core(#[from] reef_db_core::Error),

    /// Broken contract between translators (a planner or builder bug).
    ///
    /// Every call site uses a distinct numeric code so a report can be
    /// traced to one line without a backtrace.
    #[error("Internal error {code}: {message}")]
    Internal { code: u32, message: String },

    /// Logical node kind the builder does not translate
    #[error("Unsupported query solution {code}: {message}")]
    Unsupported { code: u32, message: String },
}

impl QueryError {
    /// Create an internal (contract violation) error
    pub fn internal(code: u32, message: impl Into<String>) -> Self {
        QueryError::Internal {
            code,
            message: message.into(),
        }
    }

    /// Create an unsupported-solution error
    pub fn unsupported(code: u32, message: impl Into<String>) -> Self {
        QueryError::Unsupported {
            code,
            message: message.into(),
        }
    }
}

/// Result type for stage building
pub type Result<T> = std::result::Result<T, QueryError>;

/// Fail with a coded internal error unless `cond` holds.
pub(crate) fn ensure(cond: bool, code: u32, message: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(QueryError::internal(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_carries_code() {
        match ensure(false, 620001, "broken") {
            Err(QueryError::Internal { code, .. }) => assert_eq!(code, 620001),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(ensure(true, 620001, "fine").is_ok());
    }
}
