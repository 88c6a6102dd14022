//! Save stages: array normalization, recalculation flag, part repair and
//! the recalculation channel.

use crate::{
    cell, drill_config, fast_options, formula, read_entry, read_entry_text, read_output,
    write_workbook, ScriptedChannel, SheetXml, DRAWING_XML, EXTERNAL_LINK_XML,
};
use flagsheet::{ChannelError, Engine, PersistOptions, RecalcOutcome, RepairOutcome};
use flagsheet_core::FormulaKind;
use pretty_assertions::assert_eq;

#[test]
fn test_unmodelled_parts_restored_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    write_workbook(&path, &SheetXml::numbered(5), true);

    let outcome = Engine::new()
        .generate(&path, &path, &drill_config(&[2]))
        .unwrap();

    match &outcome.persistence.repair {
        RepairOutcome::Repaired(report) => {
            assert_eq!(
                report.added,
                vec![
                    "xl/drawings/drawing1.xml".to_string(),
                    "xl/externalLinks/externalLink1.xml".to_string(),
                ]
            );
        }
        other => panic!("expected a repair, got {other:?}"),
    }
    assert_eq!(
        read_entry(&path, "xl/drawings/drawing1.xml").unwrap(),
        DRAWING_XML.as_bytes()
    );
    assert_eq!(
        read_entry(&path, "xl/externalLinks/externalLink1.xml").unwrap(),
        EXTERNAL_LINK_XML.as_bytes()
    );
    assert!(formula(&read_output(&path), "L14").is_some());
}

#[test]
fn test_repair_follows_configured_prefixes() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(5), true);

    let options = PersistOptions {
        fragile_prefixes: vec!["xl/drawings/".into()],
        ..fast_options()
    };
    let outcome = Engine::new()
        .with_options(options)
        .generate(&source, &output, &drill_config(&[2]))
        .unwrap();

    match &outcome.persistence.repair {
        RepairOutcome::Repaired(report) => {
            assert_eq!(report.added, vec!["xl/drawings/drawing1.xml".to_string()]);
        }
        other => panic!("expected a repair, got {other:?}"),
    }
    assert!(read_entry(&output, "xl/drawings/drawing1.xml").is_some());
    // Parts outside the restored prefixes are carried through by the writer
    assert_eq!(
        read_entry(&output, "xl/externalLinks/externalLink1.xml").unwrap(),
        EXTERNAL_LINK_XML.as_bytes()
    );
    let rels = read_entry_text(&output, "xl/_rels/workbook.xml.rels").unwrap();
    assert!(rels.contains("externalLink1.xml"), "{rels}");
}

#[test]
fn test_workbook_flagged_for_full_calculation() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(3), false);

    Engine::new()
        .generate(&source, &output, &drill_config(&[1]))
        .unwrap();
    let workbook_xml = read_entry_text(&output, "xl/workbook.xml").unwrap();
    assert!(workbook_xml.contains(r#"fullCalcOnLoad="1""#), "{workbook_xml}");
}

#[test]
fn test_single_cell_arrays_in_flag_columns_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    let sheet = SheetXml::numbered(3)
        .raw(
            "L5",
            r#"<c r="L5" cm="1"><f t="array" ref="L5">SUM(A11:A17)</f><v>6</v></c>"#.into(),
        )
        .raw(
            "N5",
            r#"<c r="N5"><f t="array" ref="N5">SUM(A11:A17)</f><v>6</v></c>"#.into(),
        );
    write_workbook(&source, &sheet, false);

    let outcome = Engine::new()
        .generate(&source, &output, &drill_config(&[1]))
        .unwrap();
    assert_eq!(outcome.persistence.normalized_arrays, 1);

    let doc = read_output(&output);
    let l5 = cell(&doc, "L5");
    assert_eq!(l5.formula_text(), Some("=SUM(A11:A17)"));
    assert_eq!(l5.formula_kind(), Some(&FormulaKind::Normal));
    assert!(matches!(
        cell(&doc, "N5").formula_kind(),
        Some(FormulaKind::Array { .. })
    ));
}

#[test]
fn test_recalculation_retries_transient_failures() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(3), false);

    let channel = ScriptedChannel::recalc_results(vec![
        Err(ChannelError::Failed("busy".into())),
        Err(ChannelError::Failed("busy".into())),
    ]);
    let outcome = Engine::new()
        .with_channel(channel.clone())
        .with_options(fast_options())
        .generate(&source, &output, &drill_config(&[1]))
        .unwrap();

    assert_eq!(outcome.persistence.recalc, RecalcOutcome::Recalculated { attempts: 3 });
    assert_eq!(channel.script().recalculated.len(), 3);
}

#[test]
fn test_exhausted_recalculation_keeps_saved_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(3), false);

    let channel = ScriptedChannel::recalc_results(
        (1..=4)
            .map(|i| Err(ChannelError::Failed(format!("attempt {i}"))))
            .collect(),
    );
    let outcome = Engine::new()
        .with_channel(channel.clone())
        .with_options(fast_options())
        .generate(&source, &output, &drill_config(&[1]))
        .unwrap();

    assert_eq!(
        outcome.persistence.recalc,
        RecalcOutcome::Failed {
            attempts: 3,
            last_error: "attempt 3".into(),
        }
    );
    assert!(formula(&read_output(&output), "L11").is_some());
}

#[test]
fn test_unavailable_channel_is_tried_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.xlsx");
    let output = dir.path().join("out.xlsx");
    write_workbook(&source, &SheetXml::numbered(3), false);

    let channel =
        ScriptedChannel::recalc_results(vec![Err(ChannelError::Unavailable("no excel".into()))]);
    let outcome = Engine::new()
        .with_channel(channel.clone())
        .with_options(fast_options())
        .generate(&source, &output, &drill_config(&[1]))
        .unwrap();

    assert_eq!(
        outcome.persistence.recalc,
        RecalcOutcome::Unavailable("no excel".into())
    );
    assert_eq!(channel.script().recalculated.len(), 1);
}
