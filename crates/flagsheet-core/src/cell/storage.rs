//! Sparse cell storage
//!
//! Only cells present in the source (or written since) are stored, in a
//! row-major `BTreeMap<row, BTreeMap<col, CellData>>` so iteration order
//! matches the order rows and cells must appear in sheet XML.

use std::collections::BTreeMap;

use super::CellValue;

/// Complete data for a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellData {
    /// The cell's value
    pub value: CellValue,
    /// Index into the workbook's cellXfs (0 = default style)
    pub style_index: u32,
    /// Cell metadata index (`cm`), used by dynamic array formulas
    pub cell_metadata: Option<u32>,
    /// Value metadata index (`vm`)
    pub value_metadata: Option<u32>,
}

impl CellData {
    /// Create a new cell with a value and default style
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Create a new cell with a value and style
    pub fn with_style(value: CellValue, style_index: u32) -> Self {
        Self {
            value,
            style_index,
            ..Self::default()
        }
    }

    /// A cell with no value and no formatting carries nothing worth writing
    pub fn is_blank(&self) -> bool {
        self.value.is_empty()
            && self.style_index == 0
            && self.cell_metadata.is_none()
            && self.value_metadata.is_none()
    }
}

/// Row-major sparse storage for worksheet cells
#[derive(Debug, Default)]
pub struct CellStorage {
    rows: BTreeMap<u32, BTreeMap<u16, CellData>>,
}

impl CellStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cell
    pub fn get(&self, row: u32, col: u16) -> Option<&CellData> {
        self.rows.get(&row).and_then(|cols| cols.get(&col))
    }

    /// Get a cell mutably
    pub fn get_mut(&mut self, row: u32, col: u16) -> Option<&mut CellData> {
        self.rows.get_mut(&row).and_then(|cols| cols.get_mut(&col))
    }

    /// Get a cell, creating a blank one if missing
    pub fn entry(&mut self, row: u32, col: u16) -> &mut CellData {
        self.rows.entry(row).or_default().entry(col).or_default()
    }

    /// Insert or replace a cell
    pub fn insert(&mut self, row: u32, col: u16, data: CellData) {
        self.rows.entry(row).or_default().insert(col, data);
    }

    /// Remove a cell, dropping the row map once it is empty
    pub fn remove(&mut self, row: u32, col: u16) -> Option<CellData> {
        let cols = self.rows.get_mut(&row)?;
        let removed = cols.remove(&col);
        if cols.is_empty() {
            self.rows.remove(&row);
        }
        removed
    }

    /// Number of stored cells
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(|cols| cols.len()).sum()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over all cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.rows
            .iter()
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, cell)| (row, col, cell)))
    }

    /// Iterate over the cells of one row
    pub fn row(&self, row: u32) -> impl Iterator<Item = (u16, &CellData)> {
        self.rows
            .get(&row)
            .into_iter()
            .flat_map(|cols| cols.iter().map(|(&col, cell)| (col, cell)))
    }

    /// Indices of rows holding at least one cell
    pub fn row_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.rows.keys().copied()
    }

    /// Iterate mutably over all cells in row-major order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, u16, &mut CellData)> {
        self.rows.iter_mut().flat_map(|(&row, cols)| {
            cols.iter_mut().map(move |(&col, cell)| (row, col, cell))
        })
    }
}
