use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AgoraError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),
}
