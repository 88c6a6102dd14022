//! Bridge process lifecycle.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::sync::{Mutex, MutexGuard};

use excel_com_protocol::{Command as BridgeCommand, ResponseData};

use crate::connection::Connection;
use crate::error::{BridgeError, BridgeResult};
use crate::workbook::Workbook;

const BRIDGE_EXE: &str = "excel-com-bridge.exe";

/// Where to find the bridge and how to launch it
#[derive(Debug, Clone)]
pub struct ExcelBridgeConfig {
    /// Path to `excel-com-bridge.exe`. Searched for when `None`.
    pub bridge_exe_path: Option<PathBuf>,

    /// Program that runs the Windows executable, normally `wine`. `None`
    /// runs the bridge directly, which is what happens on Windows.
    pub launcher: Option<PathBuf>,

    /// WINEPREFIX for the launcher
    pub wine_prefix: Option<PathBuf>,
}

impl Default for ExcelBridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe_path: None,
            launcher: if cfg!(windows) {
                None
            } else {
                Some(PathBuf::from("wine"))
            },
            wine_prefix: None,
        }
    }
}

impl ExcelBridgeConfig {
    /// Defaults overridden by `EXCEL_COM_BRIDGE_EXE`, `WINE` and `WINEPREFIX`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(exe) = std::env::var_os("EXCEL_COM_BRIDGE_EXE") {
            config.bridge_exe_path = Some(PathBuf::from(exe));
        }
        if let Some(wine) = std::env::var_os("WINE") {
            config.launcher = Some(PathBuf::from(wine));
        }
        if let Some(prefix) = std::env::var_os("WINEPREFIX") {
            config.wine_prefix = Some(PathBuf::from(prefix));
        }
        config
    }
}

/// A running bridge process with Excel initialized behind it.
///
/// Commands are serialized through one connection; the bridge handles one
/// request at a time. Dropping the bridge kills the process if
/// [`shutdown`](Self::shutdown) was not called.
pub struct ExcelBridge {
    child: Mutex<Child>,
    conn: Mutex<Connection<ChildStdin, BufReader<ChildStdout>>>,
    wine_paths: bool,
}

impl ExcelBridge {
    /// Spawn the bridge and initialize Excel
    pub fn start(config: ExcelBridgeConfig) -> BridgeResult<Self> {
        let exe_path = match config.bridge_exe_path.clone().or_else(find_bridge_exe) {
            Some(path) if path.exists() => path,
            Some(path) => {
                return Err(BridgeError::NotFound(format!(
                    "bridge executable not found at {}",
                    path.display()
                )))
            }
            None => {
                return Err(BridgeError::NotFound(format!(
                    "{BRIDGE_EXE} not found; set EXCEL_COM_BRIDGE_EXE"
                )))
            }
        };

        let mut cmd = match &config.launcher {
            Some(launcher) => {
                let mut cmd = std::process::Command::new(launcher);
                cmd.arg(&exe_path);
                cmd
            }
            None => std::process::Command::new(&exe_path),
        };
        if let Some(prefix) = &config.wine_prefix {
            cmd.env("WINEPREFIX", prefix);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        tracing::debug!(exe = %exe_path.display(), launcher = ?config.launcher, "starting Excel bridge");
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BridgeError::NotFound(format!(
                "cannot launch {}",
                config
                    .launcher
                    .as_deref()
                    .unwrap_or(exe_path.as_path())
                    .display()
            )),
            _ => BridgeError::Spawn(e),
        })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                return Err(BridgeError::NotRunning);
            }
        };

        let bridge = Self {
            child: Mutex::new(child),
            conn: Mutex::new(Connection::new(stdin, BufReader::new(stdout))),
            wine_paths: config.launcher.is_some(),
        };
        bridge.send_command(BridgeCommand::Init)?;
        tracing::debug!("Excel bridge initialized");
        Ok(bridge)
    }

    fn connection(
        &self,
    ) -> BridgeResult<MutexGuard<'_, Connection<ChildStdin, BufReader<ChildStdout>>>> {
        self.conn.lock().map_err(|_| BridgeError::Poisoned)
    }

    pub(crate) fn send_command(&self, command: BridgeCommand) -> BridgeResult<Option<ResponseData>> {
        self.connection()?.send(command)
    }

    /// Open a workbook from a local path
    pub fn open_workbook(&self, path: &Path, read_only: bool) -> BridgeResult<Workbook<'_>> {
        let path = self.bridge_path(path)?;
        match self.send_command(BridgeCommand::OpenWorkbook { path, read_only })? {
            Some(ResponseData::WorkbookHandle { workbook }) => Ok(Workbook::new(self, workbook)),
            _ => Err(BridgeError::UnexpectedResponse("OpenWorkbook")),
        }
    }

    /// Rebuild dependencies and recalculate every open workbook
    pub fn calculate_full(&self) -> BridgeResult<()> {
        self.send_command(BridgeCommand::CalculateFull)?;
        Ok(())
    }

    /// Quit Excel and wait for the bridge to exit
    pub fn shutdown(self) -> BridgeResult<()> {
        let result = self.send_command(BridgeCommand::Shutdown);
        let mut child = self.child.lock().map_err(|_| BridgeError::Poisoned)?;
        child.wait().map_err(BridgeError::Read)?;
        result.map(|_| ())
    }

    /// Translate a local path into the form Excel sees
    fn bridge_path(&self, path: &Path) -> BridgeResult<String> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|_| BridgeError::InvalidPath(path.to_path_buf()))?
                .join(path)
        };
        if self.wine_paths {
            linux_to_wine_path(&abs).ok_or(BridgeError::InvalidPath(abs))
        } else {
            abs.to_str()
                .map(str::to_string)
                .ok_or(BridgeError::InvalidPath(abs))
        }
    }
}

impl Drop for ExcelBridge {
    fn drop(&mut self) {
        if let Ok(child) = self.child.get_mut() {
            if let Ok(None) = child.try_wait() {
                tracing::debug!("killing Excel bridge that was not shut down");
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Map an absolute Unix path onto WINE's `Z:` drive, which exposes `/`.
///
/// Returns `None` for relative or non-UTF-8 paths.
pub fn linux_to_wine_path(path: &Path) -> Option<String> {
    if !path.has_root() {
        return None;
    }
    let text = path.to_str()?;
    Some(format!("Z:{}", text.replace('/', "\\")))
}

/// Look beside the current executable, then in cross-compile target dirs
fn find_bridge_exe() -> Option<PathBuf> {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(BRIDGE_EXE)));

    beside_exe
        .into_iter()
        .chain(
            ["release", "debug"]
                .iter()
                .map(|profile| PathBuf::from(format!("target/x86_64-pc-windows-gnu/{profile}/{BRIDGE_EXE}"))),
        )
        .find(|candidate| candidate.exists())
}
