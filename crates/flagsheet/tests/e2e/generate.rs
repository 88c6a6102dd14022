//! Generation runs: identifier resolution, formula text and write policy.

use std::collections::BTreeMap;

use crate::{
    cell, drill_config, fast_options, formula, read_output, write_workbook, ScriptedChannel,
    SheetXml, SHEET,
};
use flagsheet::{
    AutoDataConfig, ArgSeparator, ConfigError, Engine, FlagError, MeasureKey, RawValue,
    RecalcOutcome, RepairOutcome, ResolutionFailure, SkipReason, SkippedWrite, ToolSpec,
    UnresolvedPair,
};
use flagsheet_core::{CellAddress, CellValue};
use pretty_assertions::assert_eq;

const REQUEST_L200: &str = r#"=IF(OR(L$200<>""),"依頼","")"#;

#[test]
fn test_drill_flags_only_its_rows() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);

    let outcome = Engine::new()
        .generate(&source, &output, &drill_config(&[1, 5]))
        .unwrap();
    assert_eq!(outcome.saved_path, output);
    assert_eq!(outcome.report.identifiers, 5);
    assert_eq!(outcome.report.affected_rows, 2);
    assert_eq!(outcome.report.separator, ArgSeparator::Comma);
    assert!(outcome.report.unresolved.is_empty());
    // One label, three headers, two request formulas
    assert_eq!(outcome.report.apply.written, 6);
    assert_eq!(outcome.row_index.row_of(5), Some(23));

    let doc = read_output(&output);
    assert_eq!(cell(&doc, "E200"), CellValue::string("Drill"));
    assert_eq!(formula(&doc, "L11").as_deref(), Some(REQUEST_L200));
    assert_eq!(formula(&doc, "L23").as_deref(), Some(REQUEST_L200));
    for untouched in ["L14", "L17", "L20"] {
        assert_eq!(cell(&doc, untouched), CellValue::Empty, "{untouched}");
    }
    assert_eq!(
        formula(&doc, "L1").as_deref(),
        Some(r#"=SUMPRODUCT(--(L11:L196<>""),--(MOD(ROW(L11:L196)-11,3)=0))"#)
    );
    assert_eq!(
        formula(&doc, "L3").as_deref(),
        Some(r#"=SUMPRODUCT(--(L13:L196<>""),--(MOD(ROW(L13:L196)-13,3)=0))"#)
    );

    assert_eq!(
        outcome.persistence.recalc,
        RecalcOutcome::Unavailable("disabled".into())
    );
    assert!(matches!(
        outcome.persistence.repair,
        RepairOutcome::Skipped { .. }
    ));
}

#[test]
fn test_second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);
    let config = drill_config(&[1, 5]);

    let mut engine = Engine::new();
    engine.generate(&source, &output, &config).unwrap();
    let first = read_output(&output);

    let again = engine.generate(&output, &output, &config).unwrap();
    assert_eq!(again.report.apply.written, 0);
    assert_eq!(again.report.apply.unchanged, 6);
    assert!(again.report.apply.skipped.is_empty());

    let second = read_output(&output);
    for reference in ["E200", "L1", "L2", "L3", "L11", "L14", "L23"] {
        assert_eq!(cell(&first, reference), cell(&second, reference), "{reference}");
    }
}

#[test]
fn test_literal_values_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    let sheet = SheetXml::numbered(5).number("L14", 5.0).text("L2", "手入力");
    write_workbook(&source, &sheet, false);

    let outcome = Engine::new()
        .generate(&source, &output, &drill_config(&[2, 3]))
        .unwrap();
    assert_eq!(
        outcome.report.apply.skipped,
        vec![
            SkippedWrite {
                address: CellAddress::parse("L2").unwrap(),
                reason: SkipReason::Occupied,
            },
            SkippedWrite {
                address: CellAddress::parse("L14").unwrap(),
                reason: SkipReason::Literal,
            },
        ]
    );

    let doc = read_output(&output);
    assert_eq!(cell(&doc, "L14"), CellValue::Number(5.0));
    assert_eq!(cell(&doc, "L2"), CellValue::string("手入力"));
    assert_eq!(formula(&doc, "L17").as_deref(), Some(REQUEST_L200));
}

#[test]
fn test_uncached_identifier_formulas_resolve_by_position() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    let sheet = SheetXml::new()
        .number("A11", 1.0)
        .formula("A14", "A11+1", None)
        .formula("A17", "A14+1", None);
    write_workbook(&source, &sheet, false);

    let outcome = Engine::new()
        .generate(&source, &output, &drill_config(&[3]))
        .unwrap();
    assert_eq!(outcome.row_index.row_of(3), Some(17));
    assert_eq!(
        formula(&read_output(&output), "L17").as_deref(),
        Some(REQUEST_L200)
    );
}

#[test]
fn test_cached_identifier_wins_over_position() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    let sheet = SheetXml::new().formula("A11", "ROW()-4", Some(7.0));
    write_workbook(&source, &sheet, false);

    let outcome = Engine::new()
        .generate(&source, &output, &drill_config(&[7]))
        .unwrap();
    assert_eq!(outcome.row_index.row_of(7), Some(11));
    assert_eq!(outcome.row_index.row_of(1), None);
}

#[test]
fn test_batch_read_supplies_evaluated_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    let sheet = SheetXml::new()
        .number("A11", 1.0)
        .formula("A14", "A11+39", None);
    write_workbook(&source, &sheet, false);

    let channel = ScriptedChannel::with_column(BTreeMap::from([(14, RawValue::Real(40.0))]));
    let mut engine = Engine::new()
        .with_channel(channel.clone())
        .with_options(fast_options());
    let outcome = engine
        .generate(&source, &output, &drill_config(&[40]))
        .unwrap();

    assert_eq!(outcome.row_index.row_of(40), Some(14));
    assert_eq!(outcome.persistence.recalc, RecalcOutcome::Recalculated { attempts: 1 });
    let script = channel.script();
    assert_eq!(script.reads, vec![(SHEET.to_string(), 0, 11..=196)]);
    assert_eq!(script.recalculated, vec![output.clone()]);
}

#[test]
fn test_semicolon_sheets_get_semicolon_formulas() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    let sheet = SheetXml::numbered(3).formula("M11", "IF(A11>0;1;0)", Some(1.0));
    write_workbook(&source, &sheet, false);

    let outcome = Engine::new()
        .generate(&source, &output, &drill_config(&[1]))
        .unwrap();
    assert_eq!(outcome.report.separator, ArgSeparator::Semicolon);

    let doc = read_output(&output);
    assert_eq!(
        formula(&doc, "L11").as_deref(),
        Some(r#"=IF(OR(L$200<>"");"依頼";"")"#)
    );
    assert_eq!(
        formula(&doc, "L2").as_deref(),
        Some(r#"=SUMPRODUCT(--(L12:L196<>"");--(MOD(ROW(L12:L196)-12;3)=0))"#)
    );
}

#[test]
fn test_tools_share_rows_and_columns() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);

    let mut config = drill_config(&[1]);
    config.tools.push(ToolSpec::new("Tap", [1, 2]));
    config.flag_col_end = "M".into();
    Engine::new().generate(&source, &output, &config).unwrap();

    let doc = read_output(&output);
    assert_eq!(cell(&doc, "E203"), CellValue::string("Tap"));
    assert_eq!(
        formula(&doc, "L11").as_deref(),
        Some(r#"=IF(OR(L$200<>"",L$203<>""),"依頼","")"#)
    );
    assert_eq!(
        formula(&doc, "M14").as_deref(),
        Some(r#"=IF(OR(M$203<>""),"依頼","")"#)
    );
}

#[test]
fn test_auto_data_rows() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);

    let mut config = drill_config(&[1]);
    config.auto_data = Some(AutoDataConfig {
        data_start_row: 250,
        max_slots: 100,
        slots: BTreeMap::from([(1, 3), (2, 1)]),
    });
    let outcome = Engine::new().generate(&source, &output, &config).unwrap();
    assert_eq!(outcome.report.auto_data_rows, 1);

    let doc = read_output(&output);
    assert_eq!(
        formula(&doc, "L11").as_deref(),
        Some(r#"=IF(OR(L$200<>""),"依頼",IFERROR(IF(L$252="","",L$252),""))"#)
    );
    assert_eq!(
        formula(&doc, "L14").as_deref(),
        Some(r#"=IFERROR(IF(L$250="","",L$250),"")"#)
    );
}

#[test]
fn test_unresolved_pairs_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);

    let outcome = Engine::new()
        .generate(&source, &output, &drill_config(&[1, 77]))
        .unwrap();
    assert_eq!(
        outcome.report.unresolved,
        vec![UnresolvedPair {
            tool: "Drill".into(),
            key: MeasureKey::Id(77),
        }]
    );
}

#[test]
fn test_nothing_to_write_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);

    let measures: Vec<i64> = (90..105).collect();
    let err = Engine::new()
        .generate(&source, &output, &drill_config(&measures))
        .unwrap_err();

    let failure = match err {
        FlagError::Resolution(failure) => failure,
        other => panic!("expected a resolution failure, got {other:?}"),
    };
    assert_eq!(
        failure,
        ResolutionFailure::NothingToWrite {
            identifiers: 5,
            tools: 1,
            affected_rows: 0,
            unresolved_sample: (90..100)
                .map(|id| UnresolvedPair {
                    tool: "Drill".into(),
                    key: MeasureKey::Id(id),
                })
                .collect(),
            unresolved_count: 15,
        }
    );
    assert!(!output.exists());
}

#[test]
fn test_missing_sheet_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    write_workbook(&source, &SheetXml::numbered(2), false);

    let mut config = drill_config(&[1]);
    config.sheet_name = "Sheet9".into();
    let err = Engine::new()
        .generate(&source, &dir.path().join("out.xlsx"), &config)
        .unwrap_err();
    match err {
        FlagError::Config(ConfigError::SheetNotFound { name, available }) => {
            assert_eq!(name, "Sheet9");
            assert_eq!(available, vec![SHEET.to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
