//! # flagsheet-xlsx
//!
//! Reads an XLSX package into a [`flagsheet_core::Workbook`], writes it
//! back, and repairs the parts the model does not carry.
//!
//! The model keeps cells, row formatting and the raw XML surrounding each
//! `<sheetData>`, so a read/write cycle leaves most of the package as it
//! was. Two families of parts are not modelled at all: DrawingML
//! (`xl/drawings/`) and external link caches (`xl/externalLinks/`). The
//! reader leaves them out (or whichever prefixes the caller names through
//! [`XlsxReader::read_file_leaving_out`]) and the writer omits them while
//! the relationships pointing at them survive, so a written package must go
//! through [`package::repair`] with the parts captured from the source under
//! the same prefixes before it is handed to a spreadsheet application.

pub mod document;
pub mod error;
pub mod package;
pub mod reader;
pub mod writer;

pub use document::XlsxDocument;
pub use error::{XlsxError, XlsxResult};
pub use package::{CapturedPart, RepairReport};
pub use reader::XlsxReader;
pub use writer::XlsxWriter;

/// Part name prefixes the document model does not carry through a save
pub const UNMODELLED_PREFIXES: &[&str] = &["xl/drawings/", "xl/externalLinks/"];

/// Upper bound on the uncompressed size of a single part the reader will load
pub const MAX_PART_SIZE: u64 = 256 * 1024 * 1024;
