//! Read/write cycles over the inspection fixture.

use crate::{read_entry_text, write_inspection_fixture};
use flagsheet_core::CellValue;
use flagsheet_xlsx::{XlsxReader, XlsxWriter, UNMODELLED_PREFIXES};
use pretty_assertions::assert_eq;

#[test]
fn test_cells_and_rows_survive_a_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.xlsx");
    let out = dir.path().join("out.xlsx");
    write_inspection_fixture(&src);

    let doc = XlsxReader::read_file(&src).unwrap();
    XlsxWriter::write_file(&doc, &out).unwrap();
    let reread = XlsxReader::read_file(&out).unwrap();

    let sheet = reread.workbook().worksheet_by_name("検査表").unwrap();
    assert_eq!(sheet.value_at(10, 0), &CellValue::Number(1.0));
    assert_eq!(sheet.value_at(10, 4), &CellValue::from("穴径"));
    assert_eq!(sheet.value_at(10, 5), &CellValue::from("Drill"));
    assert_eq!(
        sheet.value_at(10, 11).formula_text(),
        Some("=IF(L$200<>\"\",\"依頼\",\"\")")
    );
    assert_eq!(sheet.cell_at(10, 11).unwrap().style_index, 5);
    assert_eq!(sheet.row_attributes(10).unwrap().get("ht"), Some("20.25"));

    let sheet_xml = read_entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet_xml.contains(r#"<pageMargins left="0.7""#));
    assert!(sheet_xml.contains(r#"<drawing r:id="rId1"/>"#));

    let sst = read_entry_text(&out, "xl/sharedStrings.xml").unwrap();
    assert!(sst.contains("<rPh sb=\"0\" eb=\"2\"><t>アナケイ</t></rPh>"));
}

#[test]
fn test_unmodelled_parts_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.xlsx");
    let out = dir.path().join("out.xlsx");
    write_inspection_fixture(&src);

    let doc = XlsxReader::read_file(&src).unwrap();
    assert_eq!(
        doc.dropped_parts(),
        &["xl/drawings/drawing1.xml", "xl/externalLinks/externalLink1.xml"]
    );
    XlsxWriter::write_file(&doc, &out).unwrap();

    let reread = XlsxReader::read_file(&out).unwrap();
    assert!(reread.dropped_parts().is_empty());
    assert!(reread
        .part_names()
        .all(|name| !UNMODELLED_PREFIXES.iter().any(|p| name.starts_with(p))));

    // Relationships to the missing parts are still there
    let rels = read_entry_text(&out, "xl/worksheets/_rels/sheet1.xml.rels").unwrap();
    assert!(rels.contains("../drawings/drawing1.xml"));
}

#[test]
fn test_full_calc_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.xlsx");
    let out = dir.path().join("out.xlsx");
    write_inspection_fixture(&src);

    let mut doc = XlsxReader::read_file(&src).unwrap();
    doc.workbook_mut().settings_mut().full_calc_on_load = true;
    XlsxWriter::write_file(&doc, &out).unwrap();

    let workbook = read_entry_text(&out, "xl/workbook.xml").unwrap();
    assert!(workbook.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#));
    assert!(read_entry_text(&out, "xl/calcChain.xml").is_none());
    let types = read_entry_text(&out, "[Content_Types].xml").unwrap();
    assert!(!types.contains("calcChain"));
}
