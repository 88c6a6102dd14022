//! Integer identifiers from loosely-typed cell values.

use std::borrow::Cow;

use flagsheet_core::CellValue;

use crate::row_index::ScanRange;

/// A cell value as the identifier resolver sees it
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Absent,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl RawValue {
    /// Whether the value carries nothing to resolve. Blank text counts as
    /// absent: formula caches written as `<v></v>` read back that way.
    pub fn is_absent(&self) -> bool {
        match self {
            RawValue::Absent => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&CellValue> for RawValue {
    /// Literal view of a cell. Formulas and error values are absent here;
    /// their cached results are converted separately.
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty | CellValue::Error(_) | CellValue::Formula { .. } => RawValue::Absent,
            CellValue::Boolean(b) => RawValue::Boolean(*b),
            CellValue::Number(n) => RawValue::Real(*n),
            CellValue::String(s) => RawValue::Text(s.clone()),
        }
    }
}

/// Resolve a value to an integer.
///
/// Booleans never resolve. Reals truncate toward zero and fail when not
/// finite or out of range. Text parses as a whole, then falls back to its
/// first run of digits. Full-width digits (`０`-`９`) count as digits.
pub fn resolve_integer(value: &RawValue) -> Option<i64> {
    match value {
        RawValue::Absent | RawValue::Boolean(_) => None,
        RawValue::Integer(i) => Some(*i),
        RawValue::Real(f) => {
            if !f.is_finite() {
                return None;
            }
            let t = f.trunc();
            if t < i64::MIN as f64 || t >= i64::MAX as f64 {
                return None;
            }
            Some(t as i64)
        }
        RawValue::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            let s = ascii_digits(s);
            let s = s.as_ref();
            s.parse::<i64>()
                .ok()
                .or_else(|| lazy_regex::regex_find!(r"\d+", s).and_then(|d| d.parse().ok()))
        }
    }
}

/// `s` with full-width digits replaced by their ASCII forms
fn ascii_digits(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }
    s.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (u32::from(c) - u32::from('０')) as u8),
            _ => c,
        })
        .collect::<String>()
        .into()
}

/// Identifier implied by a row's position on the step grid: the first grid
/// row is 1, the next 2, and so on. `None` off the grid.
pub fn infer_positional(row: u32, row_min: u32, row_step: u32) -> Option<i64> {
    if row_step == 0 || row < row_min {
        return None;
    }
    let offset = row - row_min;
    if offset % row_step != 0 {
        return None;
    }
    Some(i64::from(offset / row_step) + 1)
}

/// Resolve the identifier of an identifier-column cell at 1-based `row`.
///
/// `cached` is the evaluated value when one is known (a formula's stored
/// result, or a value read back from the spreadsheet application) and takes
/// precedence. Without it, a formula is inferred from its position and any
/// other content is resolved literally.
pub fn resolve_identifier(
    raw: &CellValue,
    cached: Option<&RawValue>,
    row: u32,
    scan: &ScanRange,
) -> Option<i64> {
    if let Some(value) = cached.filter(|v| !v.is_absent()) {
        return resolve_integer(value);
    }
    match raw {
        CellValue::Formula { .. } => infer_positional(row, scan.row_min, scan.step),
        other => resolve_integer(&RawValue::from(other)),
    }
}
