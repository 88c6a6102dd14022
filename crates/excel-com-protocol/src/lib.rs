//! Wire types shared by the client in `flagsheet-excel-com` and the Windows
//! bridge process.
//!
//! One JSON object per line in each direction. The client writes
//! [`Request`]s to the bridge's stdin and reads one [`Response`] per request
//! from its stdout. Bridge diagnostics go to stderr.

use serde::{Deserialize, Serialize};

/// A command sent to the bridge, tagged with an id the response echoes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub command: Command,
}

/// Commands understood by the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and start a hidden Excel instance.
    Init,

    /// Open a workbook by Windows path. Returns a workbook handle.
    OpenWorkbook {
        path: String,
        #[serde(default)]
        read_only: bool,
    },

    /// Read the evaluated values of a range, e.g. `"A11:A196"`. Returns one
    /// inner vector per row.
    ReadRange {
        workbook: u64,
        sheet: SheetRef,
        range: String,
    },

    /// Rebuild the dependency tree and recalculate every open workbook.
    CalculateFull,

    /// Save a workbook in place, keeping its format.
    SaveWorkbook { workbook: u64 },

    /// Close a workbook, saving first when `save` is set.
    CloseWorkbook {
        workbook: u64,
        #[serde(default)]
        save: bool,
    },

    /// Close every workbook without saving, quit Excel and exit.
    Shutdown,
}

/// A worksheet, by 0-based position or by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetRef {
    Index(u32),
    Name(String),
}

impl From<&str> for SheetRef {
    fn from(name: &str) -> Self {
        SheetRef::Name(name.to_string())
    }
}

/// An evaluated cell value as reported by Excel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Error(CellError),
}

/// An Excel error value such as `#N/A`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellError {
    pub code: String,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => write!(f, "<empty>"),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Error(e) => write!(f, "{}", e.code),
        }
    }
}

/// The bridge's answer to one [`Request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request, or 0 when the request line could not be parsed
    pub id: u64,
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ResponseResult {
    pub fn ok() -> Self {
        ResponseResult::Ok { data: None }
    }

    pub fn with_data(data: ResponseData) -> Self {
        ResponseResult::Ok { data: Some(data) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ResponseResult::Error {
            message: message.into(),
        }
    }
}

/// Payload of a successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    WorkbookHandle { workbook: u64 },
    Range { values: Vec<Vec<CellValue>> },
}
