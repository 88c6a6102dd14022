//! Configuration record for generation and marking runs.
//!
//! A [`FlagConfig`] is deserialized from JSON; every field except
//! `sheet_name` and `tools` has a default matching the standard inspection
//! sheet layout (identifiers in column A from row 11 every 3 rows, tool
//! anchors from row 200, flags in column L). [`FlagConfig::layout`]
//! validates it and resolves column letters into a [`SheetLayout`].
//!
//! ```rust
//! use flagsheet::FlagConfig;
//!
//! let config: FlagConfig = serde_json::from_str(r#"{
//!     "sheet_name": "工程内検査シート",
//!     "tools": [{"name": "Drill", "measures": [1, "5"]}]
//! }"#).unwrap();
//!
//! let layout = config.layout().unwrap();
//! assert_eq!(layout.scan.row_max, 196);
//! assert_eq!(layout.not_required_row, 197);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;

use flagsheet_core::{CellAddress, MAX_ROWS};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::formula::ArgSeparator;
use crate::row_index::ScanRange;
use crate::value::{resolve_integer, RawValue};

/// Default upper bound for auto-data slot indices
pub const DEFAULT_MAX_SLOTS: u32 = 100;

/// A tool's measure identifier as written in configuration: a number, or
/// text that may or may not contain one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "LooseKey", untagged)]
pub enum MeasureKey {
    Id(i64),
    Text(String),
}

impl MeasureKey {
    pub fn id(&self) -> Option<i64> {
        match self {
            MeasureKey::Id(id) => Some(*id),
            MeasureKey::Text(_) => None,
        }
    }
}

impl From<i64> for MeasureKey {
    fn from(id: i64) -> Self {
        MeasureKey::Id(id)
    }
}

impl From<&str> for MeasureKey {
    fn from(text: &str) -> Self {
        let raw = RawValue::Text(text.to_string());
        match resolve_integer(&raw) {
            Some(id) => MeasureKey::Id(id),
            None => MeasureKey::Text(text.trim().to_string()),
        }
    }
}

impl fmt::Display for MeasureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureKey::Id(id) => write!(f, "{id}"),
            MeasureKey::Text(text) => write!(f, "{text:?}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseKey {
    Int(i64),
    Real(f64),
    Bool(bool),
    Text(String),
}

impl From<LooseKey> for MeasureKey {
    fn from(key: LooseKey) -> Self {
        match key {
            LooseKey::Int(i) => MeasureKey::Id(i),
            LooseKey::Real(f) => match resolve_integer(&RawValue::Real(f)) {
                Some(id) => MeasureKey::Id(id),
                None => MeasureKey::Text(f.to_string()),
            },
            LooseKey::Bool(b) => MeasureKey::Text(b.to_string()),
            LooseKey::Text(s) => MeasureKey::from(s.as_str()),
        }
    }
}

/// A named tool and the measures it covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub measures: Vec<MeasureKey>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, measures: impl IntoIterator<Item = i64>) -> Self {
        Self {
            name: name.into(),
            measures: measures.into_iter().map(MeasureKey::Id).collect(),
        }
    }
}

/// Secondary data block mirrored into the measurement rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoDataConfig {
    /// Row of slot 1
    pub data_start_row: u32,
    #[serde(default = "default_max_slots")]
    pub max_slots: u32,
    /// Measure identifier → slot index (1-based)
    #[serde(default)]
    pub slots: BTreeMap<i64, u32>,
}

/// Label and column for the not-required anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotRequiredConfig {
    #[serde(default = "default_not_required_label")]
    pub label: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

impl Default for NotRequiredConfig {
    fn default() -> Self {
        Self {
            label: default_not_required_label(),
            label_column: default_label_column(),
        }
    }
}

/// Everything a run needs to know about the sheet layout and the tools.
/// Rows are 1-based; columns are letters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagConfig {
    pub sheet_name: String,

    /// Column holding measurement identifiers
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_row_min")]
    pub row_min: u32,
    /// Last scanned row; defaults to `tool_start_row - 4`
    #[serde(default)]
    pub row_max: Option<u32>,
    #[serde(default = "default_row_step")]
    pub row_step: u32,

    /// Anchor row of the first tool
    #[serde(default = "default_tool_start_row")]
    pub tool_start_row: u32,
    #[serde(default = "default_label_column")]
    pub tool_label_column: String,
    /// Defaults to `row_step`
    #[serde(default)]
    pub tool_row_step: Option<u32>,

    #[serde(default = "default_flag_column")]
    pub flag_col_start: String,
    #[serde(default = "default_flag_column")]
    pub flag_col_end: String,

    /// Used when the sheet's own formulas do not settle it
    #[serde(default = "default_separator")]
    pub formula_arg_sep: String,

    pub tools: Vec<ToolSpec>,

    #[serde(default)]
    pub auto_data: Option<AutoDataConfig>,

    #[serde(default = "default_request_label")]
    pub request_label: String,

    #[serde(default)]
    pub not_required: NotRequiredConfig,
}

fn default_id_column() -> String {
    "A".into()
}
fn default_row_min() -> u32 {
    11
}
fn default_row_step() -> u32 {
    3
}
fn default_tool_start_row() -> u32 {
    200
}
fn default_label_column() -> String {
    "E".into()
}
fn default_flag_column() -> String {
    "L".into()
}
fn default_separator() -> String {
    ",".into()
}
fn default_request_label() -> String {
    "依頼".into()
}
fn default_not_required_label() -> String {
    "測定不要".into()
}
fn default_max_slots() -> u32 {
    DEFAULT_MAX_SLOTS
}

impl FlagConfig {
    /// A configuration with defaults for everything but the sheet and tools
    pub fn new(sheet_name: impl Into<String>, tools: Vec<ToolSpec>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            id_column: default_id_column(),
            row_min: default_row_min(),
            row_max: None,
            row_step: default_row_step(),
            tool_start_row: default_tool_start_row(),
            tool_label_column: default_label_column(),
            tool_row_step: None,
            flag_col_start: default_flag_column(),
            flag_col_end: default_flag_column(),
            formula_arg_sep: default_separator(),
            tools,
            auto_data: None,
            request_label: default_request_label(),
            not_required: NotRequiredConfig::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    /// Last scanned row
    pub fn row_max(&self) -> u32 {
        self.row_max
            .unwrap_or_else(|| self.tool_start_row.saturating_sub(4))
    }

    pub fn tool_row_step(&self) -> u32 {
        self.tool_row_step.unwrap_or(self.row_step)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout().map(|_| ())
    }

    /// Validate and resolve into sheet coordinates
    pub fn layout(&self) -> Result<SheetLayout, ConfigError> {
        if self.sheet_name.trim().is_empty() {
            return Err(ConfigError::EmptySheetName);
        }
        if self.tools.is_empty() {
            return Err(ConfigError::NoTools);
        }
        for (field, value) in [
            ("row_min", self.row_min),
            ("row_step", self.row_step),
            ("tool_start_row", self.tool_start_row),
            ("tool_row_step", self.tool_row_step()),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        let row_max = self.row_max();
        if row_max < self.row_min {
            return Err(ConfigError::EmptyRowRange {
                min: self.row_min,
                max: row_max,
            });
        }

        let start = column("flag_col_start", &self.flag_col_start)?;
        let end = column("flag_col_end", &self.flag_col_end)?;
        if end < start {
            return Err(ConfigError::ReversedColumns {
                start: self.flag_col_start.clone(),
                end: self.flag_col_end.clone(),
            });
        }

        let separator = ArgSeparator::parse(&self.formula_arg_sep)
            .ok_or_else(|| ConfigError::InvalidSeparator(self.formula_arg_sep.clone()))?;

        let not_required_row = self
            .tool_start_row
            .checked_sub(3)
            .filter(|row| *row >= 1)
            .ok_or(ConfigError::NoNotRequiredRow(self.tool_start_row))?;

        let last_anchor = u32::try_from(self.tools.len() - 1)
            .ok()
            .and_then(|i| i.checked_mul(self.tool_row_step()))
            .and_then(|offset| offset.checked_add(self.tool_start_row))
            .filter(|row| *row <= MAX_ROWS);
        if last_anchor.is_none() {
            return Err(ConfigError::AnchorsOffSheet {
                tools: self.tools.len(),
                start: self.tool_start_row,
                step: self.tool_row_step(),
            });
        }

        let auto_data = match &self.auto_data {
            Some(auto) => {
                if auto.data_start_row == 0 {
                    return Err(ConfigError::Zero {
                        field: "auto_data.data_start_row",
                    });
                }

                if let Some((measure, slot)) = auto
                    .slots
                    .iter()
                    .find(|(_, slot)| **slot == 0 || **slot > auto.max_slots)
                {
                    return Err(ConfigError::SlotOutOfRange {
                        measure: *measure,
                        slot: *slot,
                        max: auto.max_slots,
                    });
                }
                if let Some(slot) = auto.slots.values().max() {
                    let fits = auto
                        .data_start_row
                        .checked_add(slot - 1)
                        .map_or(false, |row| row <= MAX_ROWS);
                    if !fits {
                        return Err(ConfigError::AutoDataOffSheet {
                            start: auto.data_start_row,
                        });
                    }
                }
                Some(AutoDataLayout {
                    data_start_row: auto.data_start_row,
                    slots: auto.slots.clone(),
                })
            }
            None => None,
        };

        Ok(SheetLayout {
            sheet_name: self.sheet_name.clone(),
            id_column: column("id_column", &self.id_column)?,
            scan: ScanRange::new(self.row_min, row_max, self.row_step),
            tool_start_row: self.tool_start_row,
            tool_row_step: self.tool_row_step(),
            tool_label_column: column("tool_label_column", &self.tool_label_column)?,
            flag_columns: start..=end,
            separator,
            request_label: self.request_label.clone(),
            auto_data,
            not_required_row,
            not_required_label: self.not_required.label.clone(),
            not_required_label_column: column(
                "not_required.label_column",
                &self.not_required.label_column,
            )?,
        })
    }
}

fn column(field: &'static str, letters: &str) -> Result<u16, ConfigError> {
    CellAddress::letters_to_column(letters).map_err(|_| ConfigError::InvalidColumn {
        field,
        value: letters.to_string(),
    })
}

/// A validated [`FlagConfig`] in sheet coordinates: 1-based rows, 0-based
/// columns
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub sheet_name: String,
    pub id_column: u16,
    pub scan: ScanRange,
    pub tool_start_row: u32,
    pub tool_row_step: u32,
    pub tool_label_column: u16,
    pub flag_columns: RangeInclusive<u16>,
    /// Configured default; the sheet's own formulas may override it
    pub separator: ArgSeparator,
    pub request_label: String,
    pub auto_data: Option<AutoDataLayout>,
    /// `tool_start_row - 3`
    pub not_required_row: u32,
    pub not_required_label: String,
    pub not_required_label_column: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoDataLayout {
    pub data_start_row: u32,
    pub slots: BTreeMap<i64, u32>,
}

impl AutoDataLayout {
    /// Row mirrored for `slot`
    pub fn source_row(&self, slot: u32) -> u32 {
        self.data_start_row + slot - 1
    }
}

/// Split a typed list of measure numbers such as `"1, 5 9、12"`.
///
/// Separators are runs of commas, semicolons (ASCII or full-width), the
/// ideographic comma and whitespace. A token without digits is an error.
pub fn parse_measure_list(text: &str) -> Result<Vec<i64>, ConfigError> {
    lazy_regex::regex!(r"[,\s、，;；]+")
        .split(text.trim())
        .filter(|token| !token.is_empty())
        .map(|token| {
            resolve_integer(&RawValue::Text(token.to_string()))
                .ok_or_else(|| ConfigError::InvalidMeasure(token.to_string()))
        })
        .collect()
}
