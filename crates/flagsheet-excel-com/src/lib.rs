//! Client for driving Excel through COM from Rust.
//!
//! Excel is automated by `excel-com-bridge.exe`, a small Windows program
//! that reads JSON commands on stdin and answers on stdout. This crate
//! spawns it (under WINE when not on Windows) and wraps the protocol.
//!
//! ```text
//! flagsheet (native)
//!     └── ExcelBridge (this crate)
//!           └── spawns: [wine] excel-com-bridge.exe
//!                 └── COM: Excel.Application
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use flagsheet_excel_com::{ExcelBridge, ExcelBridgeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = ExcelBridge::start(ExcelBridgeConfig::from_env())?;
//!     let wb = bridge.open_workbook(Path::new("/data/inspection.xlsx"), false)?;
//!     bridge.calculate_full()?;
//!     wb.close(true)?;
//!     bridge.shutdown()?;
//!     Ok(())
//! }
//! ```

mod bridge;
mod connection;
mod error;
mod workbook;

pub use bridge::{linux_to_wine_path, ExcelBridge, ExcelBridgeConfig};
pub use error::{BridgeError, BridgeResult};
pub use excel_com_protocol::{CellValue, SheetRef};
pub use workbook::Workbook;
