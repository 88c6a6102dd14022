//! Handle to a workbook opened in the bridge.

use excel_com_protocol::{CellValue, Command, ResponseData, SheetRef};

use crate::bridge::ExcelBridge;
use crate::error::{BridgeError, BridgeResult};

/// An open workbook. Closed without saving on drop unless
/// [`close`](Self::close) was called.
pub struct Workbook<'a> {
    bridge: &'a ExcelBridge,
    handle: u64,
    open: bool,
}

impl<'a> Workbook<'a> {
    pub(crate) fn new(bridge: &'a ExcelBridge, handle: u64) -> Self {
        Self {
            bridge,
            handle,
            open: true,
        }
    }

    /// The bridge's handle id
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Evaluated values of `range` (A1 form), one vector per row
    pub fn read_range(
        &self,
        sheet: impl Into<SheetRef>,
        range: &str,
    ) -> BridgeResult<Vec<Vec<CellValue>>> {
        let data = self.bridge.send_command(Command::ReadRange {
            workbook: self.handle,
            sheet: sheet.into(),
            range: range.to_string(),
        })?;
        match data {
            Some(ResponseData::Range { values }) => Ok(values),
            _ => Err(BridgeError::UnexpectedResponse("ReadRange")),
        }
    }

    /// Save in place
    pub fn save(&self) -> BridgeResult<()> {
        self.bridge.send_command(Command::SaveWorkbook {
            workbook: self.handle,
        })?;
        Ok(())
    }

    /// Close, saving first if `save` is set
    pub fn close(mut self, save: bool) -> BridgeResult<()> {
        self.open = false;
        self.bridge.send_command(Command::CloseWorkbook {
            workbook: self.handle,
            save,
        })?;
        Ok(())
    }
}

impl Drop for Workbook<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let closed = self.bridge.send_command(Command::CloseWorkbook {
            workbook: self.handle,
            save: false,
        });
        if let Err(e) = closed {
            tracing::debug!(handle = self.handle, error = %e, "failed to close workbook");
        }
    }
}
