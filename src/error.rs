use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing source binaries: {}", .0.join(", "))]
    MissingSources(Vec<String>),

    #[error("network error: {0}")]
    Network(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("no binaries could be placed from {0}")]
    NothingPlaced(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
