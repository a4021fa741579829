use std::path::PathBuf;

use thiserror::Error;

/// Ошибки инициализации подсистемы логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("global tracing subscriber is already set: {0}")]
    AlreadyInitialized(String),
}
