//! Translation and backend errors

use thiserror::Error;

/// Errors of the Z3 facade
#[derive(Debug, Clone, Error)]
pub enum SmtError {
    /// A residual construct the engine should have eliminated reached the
    /// translator
    #[error("cannot translate {0} to the solver")]
    Untranslatable(String),

    /// A model value could not be read back
    #[error("cannot interpret model value: {0}")]
    ModelError(String),
}

pub type SmtResult<T> = Result<T, SmtError>;

impl From<SmtError> for symvl_exec::SolverError {
    fn from(e: SmtError) -> Self {
        symvl_exec::SolverError::Unsupported(e.to_string())
    }
}
