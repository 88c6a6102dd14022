//! XLSX error types

use thiserror::Error;

/// Result type for XLSX operations
pub type XlsxResult<T> = std::result::Result<T, XlsxError>;

/// Errors that can occur during XLSX reading/writing
#[derive(Debug, Error)]
pub enum XlsxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Invalid file format
    #[error("Invalid XLSX format: {0}")]
    InvalidFormat(String),

    /// Missing required part
    #[error("Missing required part: {0}")]
    MissingPart(String),

    /// A part larger than the reader is willing to inflate
    #[error("Part {name} is too large ({size} bytes, limit {limit})")]
    PartTooLarge {
        /// Part name
        name: String,
        /// Declared uncompressed size
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// A repaired package did not contain the restored bytes
    #[error("Repair verification failed for part {0}")]
    RepairVerification(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] flagsheet_core::Error),
}

impl From<quick_xml::events::attributes::AttrError> for XlsxError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        XlsxError::Xml(quick_xml::Error::InvalidAttr(e))
    }
}

impl From<tempfile::PersistError> for XlsxError {
    fn from(e: tempfile::PersistError) -> Self {
        XlsxError::Io(e.error)
    }
}
