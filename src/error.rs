/// Error types for this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An expected element or field is absent. Walks use this to detect the
    /// end of a parent; it is not always fatal.
    #[error("No data found")]
    NoDataFound,

    /// Malformed wire encoding.
    #[error("Invalid data: {0}")]
    Invalid(&'static str),

    /// An element extends past its parent or the end of the file.
    #[error("Data truncated")]
    Truncated,

    /// Attempted to serialize an empty required field.
    #[error("No data provided")]
    NoDataProvided,

    /// The operation was cancelled via its progress handle.
    #[error("Operation aborted")]
    OperationAborted,

    /// The declared format version exceeds what this implementation understands.
    #[error("Version not supported: {0}")]
    VersionNotSupported(&'static str),

    /// The driver lacks support for the requested operation.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// A value conversion would discard information.
    #[error("Conversion not possible: {0}")]
    Conversion(&'static str),
}

impl Error {
    /// Whether this error marks the clean end of a sibling walk rather than
    /// a real failure.
    pub fn is_no_data_found(&self) -> bool {
        matches!(self, Error::NoDataFound)
    }
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
