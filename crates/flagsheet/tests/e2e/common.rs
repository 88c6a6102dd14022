//! Common utilities for E2E tests.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flagsheet::{ChannelError, FlagConfig, PersistOptions, RawValue, RecalcChannel, RetryPolicy, ToolSpec};
use flagsheet_core::{CellAddress, CellValue};
use flagsheet_xlsx::{XlsxDocument, XlsxReader};
use zip::write::SimpleFileOptions;

pub const SHEET: &str = "工程内検査シート";

pub const DRAWING_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing"><xdr:oneCellAnchor><xdr:from><xdr:col>6</xdr:col><xdr:row>12</xdr:row></xdr:from><xdr:sp><xdr:nvSpPr><xdr:cNvPr id="3" name="Balloon 2"/></xdr:nvSpPr></xdr:sp><xdr:clientData/></xdr:oneCellAnchor></xdr:wsDr>"#;

pub const EXTERNAL_LINK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<externalLink xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><externalBook r:id="rId1" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetNames><sheetName val="図面"/></sheetNames></externalBook></externalLink>"#;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `<sheetData>` content assembled cell by cell
#[derive(Debug, Clone, Default)]
pub struct SheetXml {
    rows: BTreeMap<u32, BTreeMap<u16, String>>,
}

impl SheetXml {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers `1..=count` in column A from row 11, every third row
    pub fn numbered(count: u32) -> Self {
        (0..count).fold(Self::new(), |sheet, i| {
            sheet.number(&format!("A{}", 11 + i * 3), f64::from(i + 1))
        })
    }

    /// A cell with complete `<c>` XML
    pub fn raw(mut self, cell: &str, xml: String) -> Self {
        let addr = CellAddress::parse(cell).expect("cell reference");
        self.rows.entry(addr.row).or_default().insert(addr.col, xml);
        self
    }

    pub fn number(self, cell: &str, value: f64) -> Self {
        let xml = format!(r#"<c r="{cell}"><v>{value}</v></c>"#);
        self.raw(cell, xml)
    }

    pub fn text(self, cell: &str, value: &str) -> Self {
        let xml = format!(r#"<c r="{cell}" t="inlineStr"><is><t>{}</t></is></c>"#, escape(value));
        self.raw(cell, xml)
    }

    /// Formula without the leading `=`, with an optional cached number
    pub fn formula(self, cell: &str, text: &str, cached: Option<f64>) -> Self {
        let value = cached.map(|v| format!("<v>{v}</v>")).unwrap_or_default();
        let xml = format!(r#"<c r="{cell}"><f>{}</f>{value}</c>"#, escape(text));
        self.raw(cell, xml)
    }

    fn render(&self) -> String {
        let mut out = String::from("<sheetData>");
        for (row, cells) in &self.rows {
            out.push_str(&format!(r#"<row r="{}">"#, row + 1));
            for xml in cells.values() {
                out.push_str(xml);
            }
            out.push_str("</row>");
        }
        out.push_str("</sheetData>");
        out
    }
}

/// Write a one-sheet workbook named [`SHEET`]. With `unmodelled`, the
/// sheet carries a drawing and the workbook an external link.
pub fn write_workbook(path: &Path, sheet: &SheetXml, unmodelled: bool) {
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
    );
    let mut workbook_rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
    );
    let mut external_refs = "";
    let mut drawing_ref = "";
    if unmodelled {
        content_types.push_str(r#"<Override PartName="/xl/drawings/drawing1.xml" ContentType="application/vnd.openxmlformats-officedocument.drawing+xml"/><Override PartName="/xl/externalLinks/externalLink1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.externalLink+xml"/>"#);
        workbook_rels.push_str(r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/externalLink" Target="externalLinks/externalLink1.xml"/>"#);
        external_refs = r#"<externalReferences><externalReference r:id="rId2"/></externalReferences>"#;
        drawing_ref = r#"<drawing r:id="rId1"/>"#;
    }
    content_types.push_str("</Types>");
    workbook_rels.push_str("</Relationships>");

    let mut entries: Vec<(&str, String)> = vec![
        ("[Content_Types].xml", content_types),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{SHEET}" sheetId="1" r:id="rId1"/></sheets>{external_refs}<calcPr calcId="191029"/></workbook>"#
            ),
        ),
        ("xl/_rels/workbook.xml.rels", workbook_rels),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="13.5"/>{}<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>{drawing_ref}</worksheet>"#,
                sheet.render()
            ),
        ),
    ];
    if unmodelled {
        entries.push((
            "xl/worksheets/_rels/sheet1.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/></Relationships>"#
                .to_string(),
        ));
        entries.push(("xl/drawings/drawing1.xml", DRAWING_XML.to_string()));
        entries.push(("xl/externalLinks/externalLink1.xml", EXTERNAL_LINK_XML.to_string()));
    }

    let mut zip = zip::ZipWriter::new(File::create(path).expect("create fixture"));
    for (name, content) in entries {
        zip.start_file(name, SimpleFileOptions::default())
            .expect("start entry");
        zip.write_all(content.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish fixture");
}

/// Read one entry of a package, if present
pub fn read_entry(path: &Path, name: &str) -> Option<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(File::open(path).ok()?).ok()?;
    let mut entry = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data).ok()?;
    Some(data)
}

pub fn read_entry_text(path: &Path, name: &str) -> Option<String> {
    read_entry(path, name).and_then(|data| String::from_utf8(data).ok())
}

/// Read a saved file back
pub fn read_output(path: &Path) -> XlsxDocument {
    XlsxReader::read_file(path).expect("read output")
}

/// Value of an A1 cell on [`SHEET`]
pub fn cell(doc: &XlsxDocument, reference: &str) -> CellValue {
    let addr = CellAddress::parse(reference).expect("cell reference");
    doc.workbook()
        .worksheet_by_name(SHEET)
        .expect("sheet")
        .value_at(addr.row, addr.col)
        .clone()
}

pub fn formula(doc: &XlsxDocument, reference: &str) -> Option<String> {
    cell(doc, reference).formula_text().map(str::to_string)
}

pub fn drill_config(measures: &[i64]) -> FlagConfig {
    FlagConfig::new(SHEET, vec![ToolSpec::new("Drill", measures.iter().copied())])
}

/// Persistence options that never sleep between recalculation attempts
pub fn fast_options() -> PersistOptions {
    PersistOptions {
        retry: RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::ZERO,
        },
        ..PersistOptions::default()
    }
}

/// What a [`ScriptedChannel`] answers and what it was asked
#[derive(Debug, Default)]
pub struct Script {
    /// Answers to successive recalculation calls; `Ok` once exhausted
    pub recalc: VecDeque<Result<(), ChannelError>>,
    /// Column returned by `read_column`; unavailable when `None`
    pub column: Option<BTreeMap<u32, RawValue>>,
    pub recalculated: Vec<PathBuf>,
    pub reads: Vec<(String, u16, RangeInclusive<u32>)>,
}

/// A recalculation channel that plays back a [`Script`]. Clones share it,
/// so a test keeps one clone to inspect after handing the other to an
/// engine.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChannel(pub Arc<Mutex<Script>>);

impl ScriptedChannel {
    pub fn recalc_results(results: Vec<Result<(), ChannelError>>) -> Self {
        let channel = Self::default();
        channel.script().recalc = results.into();
        channel
    }

    pub fn with_column(column: BTreeMap<u32, RawValue>) -> Self {
        let channel = Self::default();
        channel.script().column = Some(column);
        channel
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.0.lock().expect("script lock")
    }
}

impl RecalcChannel for ScriptedChannel {
    fn recalculate_in_place(&mut self, path: &Path) -> Result<(), ChannelError> {
        let mut script = self.script();
        script.recalculated.push(path.to_path_buf());
        script.recalc.pop_front().unwrap_or(Ok(()))
    }

    fn read_column(
        &mut self,
        _path: &Path,
        sheet: &str,
        column: u16,
        rows: RangeInclusive<u32>,
    ) -> Result<BTreeMap<u32, RawValue>, ChannelError> {
        let mut script = self.script();
        script.reads.push((sheet.to_string(), column, rows));
        script
            .column
            .clone()
            .ok_or_else(|| ChannelError::Unavailable("no column scripted".into()))
    }
}
