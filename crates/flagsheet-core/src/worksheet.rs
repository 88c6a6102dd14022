//! Worksheet type

use std::collections::{BTreeMap, BTreeSet};

use crate::cell::{CellData, CellStorage, CellValue, FormulaKind};
use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};

/// `<row>` attributes the model does not interpret (height, hidden flags,
/// outline level, row style...), kept in document order so the row element
/// can be written back unchanged. The row number itself is not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowAttributes(pub Vec<(String, String)>);

impl RowAttributes {
    /// Look up an attribute value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A worksheet (single sheet in a workbook)
#[derive(Debug)]
pub struct Worksheet {
    /// Sheet name
    name: String,
    /// Cell storage
    cells: CellStorage,
    /// Raw row attributes, keyed by 0-based row
    row_attributes: BTreeMap<u32, RowAttributes>,
}

impl Worksheet {
    /// Create a new worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: CellStorage::new(),
            row_attributes: BTreeMap::new(),
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a cell by 0-based position
    pub fn cell_at(&self, row: u32, col: u16) -> Option<&CellData> {
        self.cells.get(row, col)
    }

    /// Get a cell mutably
    pub fn cell_at_mut(&mut self, row: u32, col: u16) -> Option<&mut CellData> {
        self.cells.get_mut(row, col)
    }

    /// Get the value at a position; missing cells read as [`CellValue::Empty`]
    pub fn value_at(&self, row: u32, col: u16) -> &CellValue {
        self.cells
            .get(row, col)
            .map(|c| &c.value)
            .unwrap_or(&crate::cell::EMPTY)
    }

    /// Set the value at a position, keeping the cell's style index.
    ///
    /// Metadata belonging to the old value (`cm`/`vm`) is cleared, since it
    /// describes a formula result that no longer exists.
    pub fn set_value_at(&mut self, row: u32, col: u16, value: CellValue) -> Result<()> {
        self.validate_cell_position(row, col)?;
        let cell = self.cells.entry(row, col);
        cell.value = value;
        cell.cell_metadata = None;
        cell.value_metadata = None;
        Ok(())
    }

    /// Insert complete cell data as read from a file
    pub fn set_cell_at(&mut self, row: u32, col: u16, data: CellData) -> Result<()> {
        self.validate_cell_position(row, col)?;
        self.cells.insert(row, col, data);
        Ok(())
    }

    /// Remove a cell entirely
    pub fn clear_cell_at(&mut self, row: u32, col: u16) -> Option<CellData> {
        self.cells.remove(row, col)
    }

    /// Get the raw attributes of a row
    pub fn row_attributes(&self, row: u32) -> Option<&RowAttributes> {
        self.row_attributes.get(&row)
    }

    /// Set the raw attributes of a row
    pub fn set_row_attributes(&mut self, row: u32, attrs: RowAttributes) {
        if attrs.0.is_empty() {
            self.row_attributes.remove(&row);
        } else {
            self.row_attributes.insert(row, attrs);
        }
    }

    /// Every row that must appear in sheet XML: rows with cells plus rows
    /// that only carry formatting
    pub fn row_indices(&self) -> Vec<u32> {
        let rows: BTreeSet<u32> = self
            .cells
            .row_indices()
            .chain(self.row_attributes.keys().copied())
            .collect();
        rows.into_iter().collect()
    }

    /// Iterate over the cells of one row
    pub fn cells_in_row(&self, row: u32) -> impl Iterator<Item = (u16, &CellData)> {
        self.cells.row(row)
    }

    /// Get the number of stored cells
    pub fn cell_count(&self) -> usize {
        self.cells.cell_count()
    }

    /// Check if the worksheet has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate over all stored cells
    pub fn iter_cells(&self) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.cells.iter()
    }

    /// Iterate mutably over all stored cells
    pub fn iter_cells_mut(&mut self) -> impl Iterator<Item = (u32, u16, &mut CellData)> {
        self.cells.iter_mut()
    }

    /// Iterate over all formula cells: (row, col, formula_text)
    pub fn formula_cells(&self) -> impl Iterator<Item = (u32, u16, &str)> {
        self.cells
            .iter()
            .filter_map(|(row, col, cell)| cell.value.formula_text().map(|t| (row, col, t)))
    }

    /// Number of cells belonging to shared formula group `index`, master included
    pub fn shared_group_len(&self, index: u32) -> usize {
        self.cells
            .iter()
            .filter(|(_, _, cell)| {
                matches!(
                    cell.value.formula_kind(),
                    Some(FormulaKind::Shared { index: i, .. }) if *i == index
                )
            })
            .count()
    }

    /// Highest 0-based row index holding a cell
    pub fn max_row(&self) -> Option<u32> {
        self.cells.row_indices().last()
    }

    fn validate_cell_position(&self, row: u32, col: u16) -> Result<()> {
        if row >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }
        if col >= MAX_COLS {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
        }
        Ok(())
    }
}
