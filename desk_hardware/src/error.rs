use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("desk disconnected")]
    Disconnected,
    #[error("desk response timeout")]
    Timeout,
    #[error("characteristic write failed: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
