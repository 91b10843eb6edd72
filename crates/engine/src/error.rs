//! Engine error type

use persistence::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid stored value for {field}: {value:?}")]
    InvalidRecord { field: &'static str, value: String },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
