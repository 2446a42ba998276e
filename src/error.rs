use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Expected structure not found: {0}")]
    StructureNotFound(String),

    #[error("Unparsable market cap value '{raw}' for '{name}'")]
    RowParse { name: String, raw: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Another run holds the lock at {0}")]
    RunLocked(String),
}

impl EtlError {
    /// Per-row and missing-structure failures degrade the run instead of aborting it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EtlError::StructureNotFound(_) | EtlError::RowParse { .. })
    }
}

impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        EtlError::Storage(err.to_string())
    }
}

impl From<csv::Error> for EtlError {
    fn from(err: csv::Error) -> Self {
        if !err.is_io_error() {
            return EtlError::Csv(err.to_string());
        }
        match err.into_kind() {
            csv::ErrorKind::Io(e) => EtlError::Io(e),
            other => EtlError::Csv(format!("{:?}", other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
