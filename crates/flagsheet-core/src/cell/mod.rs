//! Cell-related types
//!
//! - [`CellValue`] - what a cell holds
//! - [`CellAddress`] / [`CellRange`] - where it is
//! - [`CellData`] - value plus the metadata carried through a save

mod address;
mod storage;
mod value;

pub use address::{CellAddress, CellRange};
pub use storage::{CellData, CellStorage};
pub use value::{CellError, CellValue, FormulaKind};
pub(crate) use value::EMPTY;
