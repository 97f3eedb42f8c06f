use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("{0}")]
    Other(String),
}
