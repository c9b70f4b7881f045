use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Filesystem error: {0}")]
    FilesystemError(String),

    #[error("Bad file handle: {0}")]
    BadHandle(u32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid data")]
    InvalidData,
}

pub type Result<T> = std::result::Result<T, Error>;
