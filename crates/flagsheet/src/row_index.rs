//! Identifier ↔ row mapping over the measurement grid.

use std::collections::BTreeMap;

use flagsheet_core::{CellValue, Worksheet};

use crate::value::{resolve_identifier, RawValue};

/// Rows `row_min..=row_max` (1-based) taken every `step` rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub row_min: u32,
    pub row_max: u32,
    pub step: u32,
}

impl ScanRange {
    pub fn new(row_min: u32, row_max: u32, step: u32) -> Self {
        Self {
            row_min,
            row_max,
            step,
        }
    }

    /// Grid rows in ascending order
    pub fn rows(&self) -> impl Iterator<Item = u32> {
        (self.row_min..=self.row_max).step_by(self.step.max(1) as usize)
    }

    /// Whether `row` lies on the grid
    pub fn contains(&self, row: u32) -> bool {
        row >= self.row_min
            && row <= self.row_max
            && (row - self.row_min) % self.step.max(1) == 0
    }
}

/// Bidirectional map between measurement identifiers and 1-based rows.
///
/// Built once per operation. When an identifier appears twice, the later
/// row wins and the earlier row is dropped from the inverse map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowIndex {
    by_id: BTreeMap<i64, u32>,
    by_row: BTreeMap<u32, i64>,
}

impl RowIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `column` (0-based) of `sheet` over the grid rows of `scan`.
    ///
    /// Each row resolves from, in order: the formula's cached result, the
    /// value in `batch` for that row (read from the spreadsheet
    /// application), then the literal content or positional inference.
    pub fn build(
        sheet: &Worksheet,
        column: u16,
        scan: ScanRange,
        batch: Option<&BTreeMap<u32, RawValue>>,
    ) -> Self {
        let mut index = Self::new();
        for row in scan.rows() {
            let raw = sheet.value_at(row - 1, column);
            let cached = match raw {
                CellValue::Formula { cached_value, .. } => cached_value
                    .as_deref()
                    .map(RawValue::from)
                    .filter(|v| !v.is_absent())
                    .or_else(|| batch.and_then(|b| b.get(&row)).cloned()),
                _ => None,
            };
            if let Some(id) = resolve_identifier(raw, cached.as_ref(), row, &scan) {
                index.insert(id, row);
            }
        }
        tracing::debug!(
            sheet = sheet.name(),
            identifiers = index.len(),
            "built row index"
        );
        index
    }

    /// Whether any grid row holds a formula with no cached result, so a
    /// batch read from the spreadsheet application would add information
    pub fn needs_batch(sheet: &Worksheet, column: u16, scan: ScanRange) -> bool {
        scan.rows().any(|row| {
            let value = sheet.value_at(row - 1, column);
            value.is_formula()
                && value
                    .cached_value()
                    .map_or(true, |v| RawValue::from(v).is_absent())
        })
    }

    /// Map `id` to `row`, replacing any earlier row for the same id
    pub fn insert(&mut self, id: i64, row: u32) {
        if let Some(old_row) = self.by_id.insert(id, row) {
            if old_row != row {
                tracing::debug!(id, old_row, row, "duplicate identifier, keeping later row");
                self.by_row.remove(&old_row);
            }
        }
        if let Some(old_id) = self.by_row.insert(row, id) {
            if old_id != id {
                self.by_id.remove(&old_id);
            }
        }
    }

    pub fn row_of(&self, id: i64) -> Option<u32> {
        self.by_id.get(&id).copied()
    }

    pub fn id_at(&self, row: u32) -> Option<i64> {
        self.by_row.get(&row).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Identifiers in ascending order
    pub fn identifiers(&self) -> impl Iterator<Item = i64> + '_ {
        self.by_id.keys().copied()
    }

    /// `(identifier, row)` pairs in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (i64, u32)> + '_ {
        self.by_id.iter().map(|(id, row)| (*id, *row))
    }
}
