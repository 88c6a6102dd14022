//! Excel.Application and the workbooks opened through it.

#![cfg(windows)]

use std::collections::HashMap;

use excel_com_protocol::{CellError, CellValue, SheetRef};

use crate::dispatch::{scalar, variant_bool, variant_i32, variant_str, DispatchObject, Scalar};

// Excel's CVErr codes are 0x800A07xx; the low word carries the error number
const XL_ERRORS: &[(i32, &str)] = &[
    (2000, "#NULL!"),
    (2007, "#DIV/0!"),
    (2015, "#VALUE!"),
    (2023, "#REF!"),
    (2029, "#NAME?"),
    (2036, "#NUM!"),
    (2042, "#N/A"),
];

pub struct ExcelApp {
    app: DispatchObject,
    workbooks: HashMap<u64, DispatchObject>,
    next_handle: u64,
}

impl ExcelApp {
    /// Start a hidden Excel with alerts and screen updates off
    pub fn new() -> Result<Self, String> {
        let app = DispatchObject::create("Excel.Application")?;
        app.put("Visible", variant_bool(false))?;
        app.put("DisplayAlerts", variant_bool(false))?;
        app.put("ScreenUpdating", variant_bool(false))?;
        Ok(Self {
            app,
            workbooks: HashMap::new(),
            next_handle: 1,
        })
    }

    pub fn open_workbook(&mut self, path: &str, read_only: bool) -> Result<u64, String> {
        // Workbooks.Open(Filename, UpdateLinks:=0, ReadOnly)
        let wb = self.app.object("Workbooks", &[])?.call_object(
            "Open",
            &[variant_str(path), variant_i32(0), variant_bool(read_only)],
        )?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.workbooks.insert(handle, wb);
        Ok(handle)
    }

    fn workbook(&self, handle: u64) -> Result<&DispatchObject, String> {
        self.workbooks
            .get(&handle)
            .ok_or_else(|| format!("Unknown workbook handle: {handle}"))
    }

    pub fn read_range(
        &self,
        handle: u64,
        sheet: &SheetRef,
        range: &str,
    ) -> Result<Vec<Vec<CellValue>>, String> {
        let index = match sheet {
            // Worksheets are 1-based in Excel
            SheetRef::Index(i) => variant_i32(*i as i32 + 1),
            SheetRef::Name(name) => variant_str(name),
        };
        let ws = self.workbook(handle)?.object("Worksheets", &[index])?;
        let range = ws.object("Range", &[variant_str(range)])?;
        let rows = range.object("Rows", &[])?.get_i32("Count")?;
        let cols = range.object("Columns", &[])?.get_i32("Count")?;

        let mut values = Vec::with_capacity(rows.max(0) as usize);
        for r in 1..=rows {
            let mut row = Vec::with_capacity(cols.max(0) as usize);
            for c in 1..=cols {
                let cell = range.object("Cells", &[variant_i32(r), variant_i32(c)])?;
                row.push(to_cell_value(scalar(&cell.get("Value2")?)));
            }
            values.push(row);
        }
        Ok(values)
    }

    /// Application.CalculateFullRebuild
    pub fn calculate_full(&self) -> Result<(), String> {
        self.app.call("CalculateFullRebuild", &[])?;
        Ok(())
    }

    pub fn save_workbook(&self, handle: u64) -> Result<(), String> {
        self.workbook(handle)?.call("Save", &[])?;
        Ok(())
    }

    pub fn close_workbook(&mut self, handle: u64, save: bool) -> Result<(), String> {
        let wb = self
            .workbooks
            .remove(&handle)
            .ok_or_else(|| format!("Unknown workbook handle: {handle}"))?;
        wb.call("Close", &[variant_bool(save)])?;
        Ok(())
    }

    /// Close everything unsaved and quit
    pub fn shutdown(mut self) -> Result<(), String> {
        let handles: Vec<u64> = self.workbooks.keys().copied().collect();
        for handle in handles {
            if let Err(e) = self.close_workbook(handle, false) {
                eprintln!("[excel-com-bridge] closing workbook {handle}: {e}");
            }
        }
        self.app.call("Quit", &[])?;
        Ok(())
    }
}

fn to_cell_value(value: Scalar) -> CellValue {
    match value {
        Scalar::Empty | Scalar::Other(_) => CellValue::Null,
        Scalar::Bool(b) => CellValue::Bool(b),
        Scalar::Number(n) => CellValue::Number(n),
        Scalar::Text(s) => CellValue::String(s),
        Scalar::Error(scode) => {
            let number = scode & 0xFFFF;
            let code = XL_ERRORS
                .iter()
                .find(|(n, _)| *n == number)
                .map(|(_, code)| code.to_string())
                .unwrap_or_else(|| format!("#ERR({number})"));
            CellValue::Error(CellError { code })
        }
    }
}
