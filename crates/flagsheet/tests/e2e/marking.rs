//! Not-required marking, alone and after a generation run.

use crate::{cell, drill_config, formula, read_output, write_workbook, SheetXml};
use flagsheet::{Engine, FlagError, ResolutionFailure, SkipReason};
use flagsheet_core::CellValue;
use pretty_assertions::assert_eq;

const MARK_L197: &str = r#"=IF(L$197<>"","-","")"#;

#[test]
fn test_mark_output_of_generation() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);
    let config = drill_config(&[1]);

    let mut engine = Engine::new();
    let generated = engine.generate(&source, &output, &config).unwrap();
    let marked = engine
        .mark_not_required(
            &generated.saved_path,
            &generated.saved_path,
            &config,
            &[2, 3],
            Some(&generated.row_index),
        )
        .unwrap();

    assert_eq!(marked.anchor, 197);
    assert_eq!(marked.matched, vec![(2, 14), (3, 17)]);
    assert!(marked.missing.is_empty());

    let doc = read_output(&output);
    assert_eq!(cell(&doc, "E197"), CellValue::string("測定不要"));
    assert_eq!(formula(&doc, "L14").as_deref(), Some(MARK_L197));
    assert_eq!(formula(&doc, "L17").as_deref(), Some(MARK_L197));
    assert_eq!(
        formula(&doc, "L11").as_deref(),
        Some(r#"=IF(OR(L$200<>""),"依頼","")"#)
    );
    assert_eq!(cell(&doc, "E200"), CellValue::string("Drill"));
}

#[test]
fn test_mark_scans_identifiers_when_no_index_given() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);

    let marked = Engine::new()
        .mark_not_required(&source, &output, &drill_config(&[1]), &[4, 40], None)
        .unwrap();
    assert_eq!(marked.matched, vec![(4, 20)]);
    assert_eq!(marked.missing, vec![40]);
    assert_eq!(formula(&read_output(&output), "L20").as_deref(), Some(MARK_L197));
}

#[test]
fn test_mark_leaves_typed_content() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    let sheet = SheetXml::numbered(5)
        .text("E197", "備考")
        .number("L14", 0.0);
    write_workbook(&source, &sheet, false);

    let marked = Engine::new()
        .mark_not_required(&source, &output, &drill_config(&[1]), &[2, 3], None)
        .unwrap();
    let reasons: Vec<SkipReason> = marked.apply.skipped.iter().map(|s| s.reason).collect();
    assert_eq!(reasons, vec![SkipReason::Literal, SkipReason::Literal]);
    assert_eq!(marked.apply.written, 1);

    let doc = read_output(&output);
    assert_eq!(cell(&doc, "E197"), CellValue::string("備考"));
    assert_eq!(cell(&doc, "L14"), CellValue::Number(0.0));
    assert_eq!(formula(&doc, "L17").as_deref(), Some(MARK_L197));
}

#[test]
fn test_mark_without_matches_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), false);

    let err = Engine::new()
        .mark_not_required(&source, &output, &drill_config(&[1]), &[500], None)
        .unwrap_err();
    match err {
        FlagError::Resolution(failure) => assert_eq!(
            failure,
            ResolutionFailure::NoMatchingMeasures {
                requested: vec![500],
                available_sample: vec![1, 2, 3, 4, 5],
                available_count: 5,
            }
        ),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_mark_sheet_without_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    write_workbook(&source, &SheetXml::new().text("B11", "見出し"), false);

    let err = Engine::new()
        .mark_not_required(&source, &dir.path().join("out.xlsx"), &drill_config(&[1]), &[1], None)
        .unwrap_err();
    assert!(matches!(
        err,
        FlagError::Resolution(ResolutionFailure::NoIdentifiers { .. })
    ));
}
