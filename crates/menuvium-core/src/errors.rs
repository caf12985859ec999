use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MenuError {
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("not authenticated")]
    Unauthenticated,
    #[error("api request failed with status {status}")]
    Api { status: u16, detail: Option<String> },
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MenuError>;
