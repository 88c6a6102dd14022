//! A workbook together with the package it was read from

use std::collections::HashMap;

use flagsheet_core::Workbook;

/// Worksheet part backing one sheet of the workbook
#[derive(Debug, Clone)]
pub(crate) struct SheetPart {
    /// Part name inside the package, e.g. `xl/worksheets/sheet1.xml`
    pub path: String,
    /// Original part bytes; everything outside `<sheetData>` is written back from here
    pub xml: Vec<u8>,
}

/// A workbook read from an XLSX package, plus the package content needed
/// to write it back
#[derive(Debug)]
pub struct XlsxDocument {
    pub(crate) workbook: Workbook,
    /// Parallel to the workbook's worksheets
    pub(crate) sheets: Vec<SheetPart>,
    /// Parts carried through unchanged, in archive order
    pub(crate) parts: Vec<(String, Vec<u8>)>,
    /// Where the shared string table lives, if the source had one
    pub(crate) shared_strings_path: Option<String>,
    /// Original `<si>` XML keyed by its flattened text
    pub(crate) original_strings: HashMap<String, Vec<u8>>,
    /// Parts present in the source that will not be written
    pub(crate) dropped_parts: Vec<String>,
}

impl XlsxDocument {
    /// The workbook model
    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// The workbook model (mutable)
    pub fn workbook_mut(&mut self) -> &mut Workbook {
        &mut self.workbook
    }

    /// Part name of the worksheet at `index`
    pub fn sheet_part_name(&self, index: usize) -> Option<&str> {
        self.sheets.get(index).map(|s| s.path.as_str())
    }

    /// Parts of the source package that the writer will not emit
    pub fn dropped_parts(&self) -> &[String] {
        &self.dropped_parts
    }

    /// Raw bytes of a carried-through part
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Names of the carried-through parts, in archive order
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }
}
