//! Recalculation through a live spreadsheet application.
//!
//! The editing library cannot evaluate formulas, so after a save the file
//! is optionally opened in the spreadsheet application, fully recalculated
//! and saved in place. The same channel can read back evaluated values of
//! the identifier column when the file carries no cached results.
//!
//! Both uses are best effort: the saved file is valid output without them.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::value::RawValue;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// No application to talk to; retrying will not help
    #[error("automation unavailable: {0}")]
    Unavailable(String),

    #[error("automation failed: {0}")]
    Failed(String),
}

/// An automation interface to a spreadsheet application
pub trait RecalcChannel {
    /// Open `path`, recalculate every sheet and save it in place
    fn recalculate_in_place(&mut self, path: &Path) -> Result<(), ChannelError>;

    /// Evaluated values of `column` (0-based) over the 1-based `rows` of
    /// `sheet`, keyed by row
    fn read_column(
        &mut self,
        path: &Path,
        sheet: &str,
        column: u16,
        rows: RangeInclusive<u32>,
    ) -> Result<BTreeMap<u32, RawValue>, ChannelError>;
}

/// Channel for runs without a spreadsheet application
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecalc;

impl RecalcChannel for NoRecalc {
    fn recalculate_in_place(&mut self, _path: &Path) -> Result<(), ChannelError> {
        Err(ChannelError::Unavailable("disabled".into()))
    }

    fn read_column(
        &mut self,
        _path: &Path,
        _sheet: &str,
        _column: u16,
        _rows: RangeInclusive<u32>,
    ) -> Result<BTreeMap<u32, RawValue>, ChannelError> {
        Err(ChannelError::Unavailable("disabled".into()))
    }
}

/// Attempts and backoff for [`recalculate_with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay after the first failure; doubles after each further one
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalcOutcome {
    Recalculated { attempts: u32 },
    /// Skipped without retrying
    Unavailable(String),
    /// Every attempt failed; the saved file is left as written
    Failed { attempts: u32, last_error: String },
}

/// Recalculate `path` in place, retrying transient failures.
///
/// An unavailable channel ends the stage at once.
pub fn recalculate_with_retry(
    channel: &mut dyn RecalcChannel,
    path: &Path,
    policy: &RetryPolicy,
) -> RecalcOutcome {
    let attempts = policy.attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match channel.recalculate_in_place(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), attempt, "recalculated");
                return RecalcOutcome::Recalculated { attempts: attempt };
            }
            Err(ChannelError::Unavailable(reason)) => {
                tracing::info!(%reason, "recalculation skipped");
                return RecalcOutcome::Unavailable(reason);
            }
            Err(ChannelError::Failed(error)) => {
                tracing::warn!(attempt, %error, "recalculation attempt failed");
                last_error = error;
                if attempt < attempts {
                    std::thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    tracing::info!(attempts, "recalculation gave up; file kept as saved");
    RecalcOutcome::Failed {
        attempts,
        last_error,
    }
}

#[cfg(feature = "excel-com")]
pub use excel::ExcelComChannel;

#[cfg(feature = "excel-com")]
mod excel {
    use super::*;

    use flagsheet_core::CellAddress;
    use flagsheet_excel_com::{BridgeError, CellValue, ExcelBridge, ExcelBridgeConfig};

    fn channel_error(e: BridgeError) -> ChannelError {
        if e.is_unavailable() {
            ChannelError::Unavailable(e.to_string())
        } else {
            ChannelError::Failed(e.to_string())
        }
    }

    /// Excel driven through the COM bridge. A bridge process is started
    /// for each call and shut down afterwards.
    #[derive(Debug, Clone, Default)]
    pub struct ExcelComChannel {
        config: ExcelBridgeConfig,
    }

    impl ExcelComChannel {
        pub fn new(config: ExcelBridgeConfig) -> Self {
            Self { config }
        }

        fn with_bridge<T>(
            &self,
            f: impl FnOnce(&ExcelBridge) -> Result<T, BridgeError>,
        ) -> Result<T, ChannelError> {
            let bridge = ExcelBridge::start(self.config.clone()).map_err(channel_error)?;
            let result = f(&bridge);
            if let Err(e) = bridge.shutdown() {
                tracing::debug!(error = %e, "bridge shutdown failed");
            }
            result.map_err(channel_error)
        }
    }

    impl RecalcChannel for ExcelComChannel {
        fn recalculate_in_place(&mut self, path: &Path) -> Result<(), ChannelError> {
            self.with_bridge(|bridge| {
                let workbook = bridge.open_workbook(path, false)?;
                bridge.calculate_full()?;
                workbook.close(true)
            })
        }

        fn read_column(
            &mut self,
            path: &Path,
            sheet: &str,
            column: u16,
            rows: RangeInclusive<u32>,
        ) -> Result<BTreeMap<u32, RawValue>, ChannelError> {
            let letters = CellAddress::column_to_letters(column);
            let range = format!("{letters}{}:{letters}{}", rows.start(), rows.end());
            let first = *rows.start();
            let values = self.with_bridge(|bridge| {
                let workbook = bridge.open_workbook(path, true)?;
                let values = workbook.read_range(sheet, &range)?;
                workbook.close(false)?;
                Ok(values)
            })?;

            Ok(values
                .into_iter()
                .enumerate()
                .filter_map(|(i, row)| {
                    let value = row.into_iter().next()?;
                    Some((first + i as u32, raw_value(value)))
                })
                .collect())
        }
    }

    fn raw_value(value: CellValue) -> RawValue {
        match value {
            CellValue::Null | CellValue::Error(_) => RawValue::Absent,
            CellValue::Bool(b) => RawValue::Boolean(b),
            CellValue::Number(n) => RawValue::Real(n),
            CellValue::String(s) => RawValue::Text(s),
        }
    }

}
