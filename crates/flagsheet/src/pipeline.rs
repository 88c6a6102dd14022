//! Generation and marking runs, from source file to saved output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use flagsheet_core::Worksheet;
use flagsheet_xlsx::package::{capture_parts, repair};
use flagsheet_xlsx::{CapturedPart, XlsxDocument, XlsxReader};

use crate::association::{associate, ToolAnchor, UnresolvedPair};
use crate::changes::{apply_changes, ApplyReport};
use crate::config::{FlagConfig, SheetLayout};
use crate::error::{ConfigError, ResolutionFailure, Result, UNRESOLVED_SAMPLE};
use crate::formula::{detect_separator, synthesize, ArgSeparator, SEPARATOR_SCAN_ROWS};
use crate::marker::plan_not_required;
use crate::persist::{
    normalize_array_formulas, save_atomic, ArrayWindow, LockRetry, NeverRetry, PersistOptions,
    RepairOutcome,
};
use crate::recalc::{recalculate_with_retry, NoRecalc, RecalcChannel, RecalcOutcome};
use crate::row_index::RowIndex;
use crate::value::RawValue;

/// What happened after the edited document was handed to the save stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceReport {
    /// Single-cell array formulas rewritten as ordinary formulas
    pub normalized_arrays: usize,
    pub repair: RepairOutcome,
    pub recalc: RecalcOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    /// Separator the formulas were written with
    pub separator: ArgSeparator,
    pub identifiers: usize,
    pub anchors: Vec<ToolAnchor>,
    pub affected_rows: usize,
    pub auto_data_rows: usize,
    /// Tool measures with no row in the sheet
    pub unresolved: Vec<UnresolvedPair>,
    pub apply: ApplyReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub saved_path: PathBuf,
    /// Identifier map of the source sheet, reusable for marking the output
    pub row_index: RowIndex,
    pub report: GenerationReport,
    pub persistence: PersistenceReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkOutcome {
    pub saved_path: PathBuf,
    pub anchor: u32,
    pub matched: Vec<(i64, u32)>,
    pub missing: Vec<i64>,
    pub apply: ApplyReport,
    pub persistence: PersistenceReport,
}

/// Runs generation and marking against workbook files.
///
/// The engine owns the collaborators a run may need: the automation
/// channel used for recalculation and identifier reads, and the policy
/// consulted when the destination is locked.
///
/// ```no_run
/// use flagsheet::{Engine, FlagConfig};
///
/// let config = FlagConfig::load("flags.json")?;
/// let outcome = Engine::new().generate("in.xlsx".as_ref(), "out.xlsx".as_ref(), &config)?;
/// println!("{} cells written", outcome.report.apply.written);
/// # Ok::<(), flagsheet::FlagError>(())
/// ```
pub struct Engine {
    channel: Box<dyn RecalcChannel>,
    lock_retry: Box<dyn LockRetry>,
    options: PersistOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// No recalculation channel, no retry on lock conflicts
    pub fn new() -> Self {
        Self {
            channel: Box::new(NoRecalc),
            lock_retry: Box::new(NeverRetry),
            options: PersistOptions::default(),
        }
    }

    pub fn with_channel(mut self, channel: impl RecalcChannel + 'static) -> Self {
        self.channel = Box::new(channel);
        self
    }

    pub fn with_lock_retry(mut self, retry: impl LockRetry + 'static) -> Self {
        self.lock_retry = Box::new(retry);
        self
    }

    pub fn with_options(mut self, options: PersistOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PersistOptions {
        &self.options
    }

    /// Write tool labels, header counts and request formulas into the
    /// configured sheet of `source`, saving the result to `dest`.
    ///
    /// `dest` may equal `source`.
    pub fn generate(&mut self, source: &Path, dest: &Path, config: &FlagConfig) -> Result<GenerationOutcome> {
        let layout = config.layout()?;
        let captured = self.capture(source);
        let mut doc = self.read(source)?;

        let (index, separator, synthesis, associations, apply) = {
            let sheet = sheet_mut(&mut doc, &layout.sheet_name)?;
            let batch = self.batch_identifiers(source, sheet, &layout);
            let index = RowIndex::build(sheet, layout.id_column, layout.scan, batch.as_ref());
            let separator = self.separator_for(sheet, &layout);

            let associations =
                associate(&config.tools, &index, layout.tool_start_row, layout.tool_row_step);
            let synthesis = synthesize(&layout, &index, &associations, separator);
            if synthesis.per_row_formulas() == 0 {
                return Err(ResolutionFailure::NothingToWrite {
                    identifiers: index.len(),
                    tools: config.tools.len(),
                    affected_rows: associations.affected.len(),
                    unresolved_sample: associations
                        .unresolved
                        .iter()
                        .take(UNRESOLVED_SAMPLE)
                        .cloned()
                        .collect(),
                    unresolved_count: associations.unresolved.len(),
                }
                .into());
            }
            let apply = apply_changes(sheet, &synthesis.changes)?;
            (index, separator, synthesis, associations, apply)
        };

        tracing::info!(
            identifiers = index.len(),
            affected_rows = associations.affected.len(),
            written = apply.written,
            unchanged = apply.unchanged,
            skipped = apply.skipped.len(),
            "generated flag formulas"
        );

        let (saved_path, persistence) = self.persist(&mut doc, &layout, dest, captured)?;
        Ok(GenerationOutcome {
            saved_path,
            report: GenerationReport {
                separator,
                identifiers: index.len(),
                anchors: associations.anchors,
                affected_rows: associations.affected.len(),
                auto_data_rows: synthesis.auto_data_rows,
                unresolved: associations.unresolved,
                apply,
            },
            row_index: index,
            persistence,
        })
    }

    /// Write the not-required label and a `"-"` formula on each row of
    /// `measures`, saving the result to `dest`.
    ///
    /// `index` is reused when given, typically the one returned by
    /// [`generate`](Self::generate) for the same sheet; otherwise the
    /// identifier column is scanned again.
    pub fn mark_not_required(
        &mut self,
        source: &Path,
        dest: &Path,
        config: &FlagConfig,
        measures: &[i64],
        index: Option<&RowIndex>,
    ) -> Result<MarkOutcome> {
        let layout = config.layout()?;
        let captured = self.capture(source);
        let mut doc = self.read(source)?;

        let (plan, apply) = {
            let sheet = sheet_mut(&mut doc, &layout.sheet_name)?;
            let index = match index {
                Some(index) => index.clone(),
                None => {
                    let batch = self.batch_identifiers(source, sheet, &layout);
                    RowIndex::build(sheet, layout.id_column, layout.scan, batch.as_ref())
                }
            };
            let separator = self.separator_for(sheet, &layout);
            let plan = plan_not_required(&layout, &index, measures, separator)?;
            let apply = apply_changes(sheet, &plan.changes)?;
            (plan, apply)
        };

        tracing::info!(
            matched = plan.matched.len(),
            missing = plan.missing.len(),
            written = apply.written,
            "marked measures not required"
        );

        let (saved_path, persistence) = self.persist(&mut doc, &layout, dest, captured)?;
        Ok(MarkOutcome {
            saved_path,
            anchor: plan.anchor,
            matched: plan.matched,
            missing: plan.missing,
            apply,
            persistence,
        })
    }

    /// Resolve the identifier map of `source` without writing anything
    pub fn preview(&mut self, source: &Path, config: &FlagConfig) -> Result<RowIndex> {
        let layout = config.layout()?;
        let mut doc = self.read(source)?;
        let sheet = sheet_mut(&mut doc, &layout.sheet_name)?;
        let batch = self.batch_identifiers(source, sheet, &layout);
        Ok(RowIndex::build(sheet, layout.id_column, layout.scan, batch.as_ref()))
    }

    fn fragile_prefixes(&self) -> Vec<&str> {
        self.options.fragile_prefixes.iter().map(String::as_str).collect()
    }

    /// Parts left out of the document are exactly the ones repair restores
    fn read(&self, source: &Path) -> Result<XlsxDocument> {
        Ok(XlsxReader::read_file_leaving_out(source, &self.fragile_prefixes())?)
    }

    fn capture(&self, source: &Path) -> std::result::Result<Vec<CapturedPart>, String> {
        capture_parts(source, &self.fragile_prefixes()).map_err(|e| e.to_string())
    }

    fn separator_for(&self, sheet: &Worksheet, layout: &SheetLayout) -> ArgSeparator {
        match detect_separator(sheet, SEPARATOR_SCAN_ROWS) {
            Some(sep) => {
                tracing::debug!(%sep, "separator detected from existing formulas");
                sep
            }
            None => layout.separator,
        }
    }

    /// Evaluated identifier values from the automation channel, when the
    /// identifier column has formulas without cached results
    fn batch_identifiers(
        &mut self,
        source: &Path,
        sheet: &Worksheet,
        layout: &SheetLayout,
    ) -> Option<BTreeMap<u32, RawValue>> {
        if !RowIndex::needs_batch(sheet, layout.id_column, layout.scan) {
            return None;
        }
        let rows = layout.scan.row_min..=layout.scan.row_max;
        match self
            .channel
            .read_column(source, &layout.sheet_name, layout.id_column, rows)
        {
            Ok(values) => Some(values),
            Err(e) => {
                tracing::info!(error = %e, "identifier formulas have no cached values; inferring by position");
                None
            }
        }
    }

    fn persist(
        &mut self,
        doc: &mut XlsxDocument,
        layout: &SheetLayout,
        dest: &Path,
        captured: std::result::Result<Vec<CapturedPart>, String>,
    ) -> Result<(PathBuf, PersistenceReport)> {
        let window = self.options.array_window.clone().unwrap_or_else(|| ArrayWindow {
            columns: layout.flag_columns.clone(),
            rows: 1..=layout.scan.row_max,
        });
        let normalized_arrays = doc
            .workbook_mut()
            .worksheet_by_name_mut(&layout.sheet_name)
            .map_or(0, |sheet| normalize_array_formulas(sheet, &window));
        doc.workbook_mut().settings_mut().full_calc_on_load = true;

        let saved_path = save_atomic(doc, dest, &mut *self.lock_retry)?;

        let repair = match captured {
            Err(reason) => {
                tracing::info!(%reason, "package repair skipped");
                RepairOutcome::Skipped { reason }
            }
            Ok(parts) if parts.is_empty() => RepairOutcome::Skipped {
                reason: "source has no unmodelled parts".into(),
            },
            Ok(parts) => match repair(&saved_path, &parts) {
                Ok(report) => RepairOutcome::Repaired(report),
                Err(e) => {
                    tracing::warn!(error = %e, "package repair failed; output kept as written");
                    RepairOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };

        let recalc = recalculate_with_retry(&mut *self.channel, &saved_path, &self.options.retry);
        Ok((
            saved_path,
            PersistenceReport {
                normalized_arrays,
                repair,
                recalc,
            },
        ))
    }
}

fn sheet_mut<'a>(doc: &'a mut XlsxDocument, name: &str) -> std::result::Result<&'a mut Worksheet, ConfigError> {
    let available = doc.workbook().sheet_names();
    doc.workbook_mut()
        .worksheet_by_name_mut(name)
        .ok_or_else(|| ConfigError::SheetNotFound {
            name: name.to_string(),
            available,
        })
}
