//! # flagsheet-core
//!
//! In-memory model of the worksheets flagsheet edits.
//!
//! The model is deliberately narrow: it keeps cell values, formula text with
//! the cached result the spreadsheet application last stored, and enough
//! per-cell metadata (style index, array/shared formula markers) to write a
//! sheet back without disturbing what it does not understand. It does not
//! evaluate formulas.
//!
//! - [`CellValue`] - cell contents, including formulas and their cached values
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing
//! - [`Worksheet`], [`Workbook`] - the document structures
//!
//! ## Example
//!
//! ```rust
//! use flagsheet_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::empty();
//! let idx = workbook.add_worksheet_with_name("Inspection").unwrap();
//! let sheet = workbook.worksheet_mut(idx).unwrap();
//!
//! // Rows and columns are 0-based
//! sheet.set_value_at(10, 0, CellValue::Number(1.0)).unwrap();
//! sheet.set_value_at(10, 11, CellValue::formula("=A11*2")).unwrap();
//!
//! assert!(sheet.value_at(10, 11).is_formula());
//! ```

pub mod cell;
pub mod error;
pub mod workbook;
pub mod worksheet;

pub use cell::{CellAddress, CellData, CellError, CellRange, CellValue, FormulaKind};
pub use error::{Error, Result};
pub use workbook::{Workbook, WorkbookSettings};
pub use worksheet::{RowAttributes, Worksheet};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
