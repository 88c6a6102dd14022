//! Excel COM bridge for flagsheet.
//!
//! Reads one JSON [`Request`](excel_com_protocol::Request) per line on
//! stdin and answers each with one [`Response`](excel_com_protocol::Response)
//! line on stdout. Diagnostics go to stderr only. Cross-compiled from Linux
//! and run under WINE, or run natively on Windows.

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod excel;

#[cfg(not(windows))]
fn main() {
    eprintln!("excel-com-bridge must be built for Windows (--target x86_64-pc-windows-gnu)");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead, Write};

    use excel_com_protocol::{Command, Request, Response, ResponseResult};

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut excel: Option<excel::ExcelApp> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("[excel-com-bridge] stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let (response, shutdown) = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let shutdown = matches!(request.command, Command::Shutdown);
                let result = handle(&mut excel, &request.command);
                let done = shutdown && matches!(result, ResponseResult::Ok { .. });
                (Response { id: request.id, result }, done)
            }
            Err(e) => (
                Response {
                    id: 0,
                    result: ResponseResult::error(format!("bad request: {e}")),
                },
                false,
            ),
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                let _ = writeln!(out, "{json}");
                let _ = out.flush();
            }
            Err(e) => eprintln!("[excel-com-bridge] encoding response: {e}"),
        }
        if shutdown {
            return;
        }
    }

    if let Some(app) = excel.take() {
        eprintln!("[excel-com-bridge] stdin closed, quitting Excel");
        let _ = app.shutdown();
        uninit_com();
    }
}

#[cfg(windows)]
fn handle(
    excel: &mut Option<excel::ExcelApp>,
    command: &excel_com_protocol::Command,
) -> excel_com_protocol::ResponseResult {
    use excel_com_protocol::{Command, ResponseData, ResponseResult};

    if let Command::Init = command {
        return init(excel);
    }
    if let Command::Shutdown = command {
        return match excel.take() {
            Some(app) => {
                let result = app.shutdown();
                uninit_com();
                match result {
                    Ok(()) => ResponseResult::ok(),
                    Err(e) => ResponseResult::error(format!("shutdown: {e}")),
                }
            }
            None => ResponseResult::ok(),
        };
    }

    let Some(app) = excel.as_mut() else {
        return ResponseResult::error("Excel not initialized; send Init first");
    };
    let result = match command {
        Command::OpenWorkbook { path, read_only } => app
            .open_workbook(path, *read_only)
            .map(|workbook| Some(ResponseData::WorkbookHandle { workbook })),
        Command::ReadRange {
            workbook,
            sheet,
            range,
        } => app
            .read_range(*workbook, sheet, range)
            .map(|values| Some(ResponseData::Range { values })),
        Command::CalculateFull => app.calculate_full().map(|()| None),
        Command::SaveWorkbook { workbook } => app.save_workbook(*workbook).map(|()| None),
        Command::CloseWorkbook { workbook, save } => {
            app.close_workbook(*workbook, *save).map(|()| None)
        }
        Command::Init | Command::Shutdown => Ok(None),
    };
    match result {
        Ok(data) => ResponseResult::Ok { data },
        Err(message) => ResponseResult::Error { message },
    }
}

#[cfg(windows)]
fn init(excel: &mut Option<excel::ExcelApp>) -> excel_com_protocol::ResponseResult {
    use excel_com_protocol::ResponseResult;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if excel.is_some() {
        return ResponseResult::ok();
    }
    // Excel requires a single-threaded apartment
    if let Err(e) = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok() {
        return ResponseResult::error(format!("CoInitializeEx failed: {e}"));
    }
    match excel::ExcelApp::new() {
        Ok(app) => {
            *excel = Some(app);
            ResponseResult::ok()
        }
        Err(e) => {
            uninit_com();
            ResponseResult::error(format!("starting Excel.Application: {e}"))
        }
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe { windows::Win32::System::Com::CoUninitialize() };
}
