use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SourcingError {
    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("input file has no data rows: {0}")]
    EmptyInput(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("part lookup failed: {0}")]
    Lookup(String),

    #[error("part lookup returned status {status}: {message}")]
    LookupStatus { status: u16, message: String },

    #[error("no offer data for any part number in {0}")]
    NoData(String),

    #[error("file transfer failed: {0}")]
    Transfer(String),

    #[error("remote copy failed: {0}")]
    RemoteCopy(String),

    #[error("enterprise notification failed: {0}")]
    Notification(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("directory watch failed: {0}")]
    Watch(String),
}

impl SourcingError {
    /// Missing, empty or unreadable source file.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SourcingError::InputNotFound(_)
                | SourcingError::EmptyInput(_)
                | SourcingError::MalformedInput(_)
        )
    }

    /// A chunk that failed with one of these contributes zero records and the
    /// run carries on with the remaining chunks.
    pub fn is_chunk_recoverable(&self) -> bool {
        matches!(
            self,
            SourcingError::Lookup(_) | SourcingError::LookupStatus { .. }
        )
    }
}
