use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("execution id already in use: {0}")]
    DuplicateId(String),
    #[error("coordinator is shutting down")]
    ShuttingDown,
}
