//! Restoring captured parts into a written package.

use crate::{read_entry, write_inspection_fixture, DRAWING_XML, EXTERNAL_LINK_XML};
use flagsheet_core::CellValue;
use flagsheet_xlsx::package::{capture_parts, repair, write_document_to_temp};
use flagsheet_xlsx::{XlsxReader, UNMODELLED_PREFIXES};
use pretty_assertions::assert_eq;

#[test]
fn test_repair_restores_parts_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    write_inspection_fixture(&path);

    // Capture before overwriting the source in place
    let captured = capture_parts(&path, UNMODELLED_PREFIXES).unwrap();
    assert_eq!(captured.len(), 2);

    let mut doc = XlsxReader::read_file(&path).unwrap();
    doc.workbook_mut()
        .worksheet_mut(0)
        .unwrap()
        .set_value_at(13, 11, CellValue::formula("=IF(L$200<>\"\",\"依頼\",\"\")"))
        .unwrap();
    let temp = write_document_to_temp(&doc, &path).unwrap();
    temp.persist(&path).unwrap();
    assert!(read_entry(&path, "xl/drawings/drawing1.xml").is_none());

    let report = repair(&path, &captured).unwrap();
    assert_eq!(
        report.added,
        vec![
            "xl/drawings/drawing1.xml".to_string(),
            "xl/externalLinks/externalLink1.xml".to_string()
        ]
    );
    assert!(report.replaced.is_empty());

    assert_eq!(
        read_entry(&path, "xl/drawings/drawing1.xml").unwrap(),
        DRAWING_XML.as_bytes()
    );
    assert_eq!(
        read_entry(&path, "xl/externalLinks/externalLink1.xml").unwrap(),
        EXTERNAL_LINK_XML.as_bytes()
    );

    // The edit made before the repair is still there
    let reread = XlsxReader::read_file(&path).unwrap();
    assert!(reread
        .workbook()
        .worksheet(0)
        .unwrap()
        .value_at(13, 11)
        .is_formula());
}

#[test]
fn test_second_repair_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    write_inspection_fixture(&path);
    let captured = capture_parts(&path, UNMODELLED_PREFIXES).unwrap();

    let report = repair(&path, &captured).unwrap();
    assert!(!report.modified());
    assert_eq!(report.unchanged.len(), 2);
}
