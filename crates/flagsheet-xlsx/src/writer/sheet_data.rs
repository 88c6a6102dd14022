//! `<sheetData>` generation and splicing into the original worksheet part

use std::collections::HashMap;
use std::fmt::Write as _;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::escape_xml;
use crate::error::{XlsxError, XlsxResult};
use crate::reader::encode_excel_escapes;
use flagsheet_core::{CellAddress, CellData, CellValue, FormulaKind, Worksheet};

/// Shared string table under construction
#[derive(Debug, Default)]
pub(crate) struct SharedStringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
    references: usize,
}

impl SharedStringTable {
    /// Index of `s`, adding it if needed
    pub fn intern(&mut self, s: &str) -> u32 {
        self.references += 1;
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Render `xl/sharedStrings.xml`, reusing original `<si>` markup where
    /// the text is unchanged so rich text and phonetic guides survive
    pub fn render(&self, originals: &HashMap<String, Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.strings.len() * 32 + 256);
        out.extend_from_slice(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
                self.references,
                self.strings.len()
            )
            .as_bytes(),
        );
        for s in &self.strings {
            match originals.get(s) {
                Some(raw) if raw.starts_with(b"<si") => out.extend_from_slice(raw),
                _ => {
                    let space = if needs_preserve(s) {
                        r#" xml:space="preserve""#
                    } else {
                        ""
                    };
                    out.extend_from_slice(
                        format!(
                            "<si><t{}>{}</t></si>",
                            space,
                            escape_xml(&encode_excel_escapes(s))
                        )
                        .as_bytes(),
                    );
                }
            }
        }
        out.extend_from_slice(b"</sst>");
        out
    }
}

fn needs_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) || s.contains('\n')
}

/// Render the `<sheetData>` element for `sheet`, using the namespace
/// `prefix` of the source part (`""` or e.g. `"x:"`)
pub(crate) fn render_sheet_data(
    sheet: &Worksheet,
    prefix: &str,
    strings: &mut SharedStringTable,
) -> String {
    let rows = sheet.row_indices();
    if rows.is_empty() {
        return format!("<{}sheetData/>", prefix);
    }

    let mut content = format!("<{}sheetData>", prefix);
    for row in rows {
        let _ = write!(content, "<{}row r=\"{}\"", prefix, row + 1);
        if let Some(attrs) = sheet.row_attributes(row) {
            for (key, value) in &attrs.0 {
                let _ = write!(content, " {}=\"{}\"", key, escape_xml(value));
            }
        }

        let mut cells = sheet.cells_in_row(row).peekable();
        if cells.peek().is_none() {
            content.push_str("/>");
            continue;
        }
        content.push('>');
        for (col, cell) in cells {
            write_cell(&mut content, prefix, CellAddress::new(row, col), cell, strings);
        }
        let _ = write!(content, "</{}row>", prefix);
    }
    let _ = write!(content, "</{}sheetData>", prefix);
    content
}

fn write_cell(
    content: &mut String,
    prefix: &str,
    addr: CellAddress,
    cell: &CellData,
    strings: &mut SharedStringTable,
) {
    let mut attrs = format!(" r=\"{}\"", addr);
    if cell.style_index != 0 {
        let _ = write!(attrs, " s=\"{}\"", cell.style_index);
    }

    let body = match &cell.value {
        CellValue::Empty => None,
        CellValue::Number(n) if n.is_finite() => Some(format!("<{p}v>{}</{p}v>", n, p = prefix)),
        CellValue::Number(_) => {
            attrs.push_str(" t=\"e\"");
            Some(format!("<{p}v>#NUM!</{p}v>", p = prefix))
        }
        CellValue::String(s) => {
            attrs.push_str(" t=\"s\"");
            Some(format!("<{p}v>{}</{p}v>", strings.intern(s), p = prefix))
        }
        CellValue::Boolean(b) => {
            attrs.push_str(" t=\"b\"");
            Some(format!("<{p}v>{}</{p}v>", u8::from(*b), p = prefix))
        }
        CellValue::Error(e) => {
            attrs.push_str(" t=\"e\"");
            Some(format!("<{p}v>{}</{p}v>", escape_xml(e.as_str()), p = prefix))
        }
        CellValue::Formula {
            text,
            cached_value,
            kind,
        } => {
            let mut body = formula_element(prefix, text, kind);
            match cached_value.as_deref() {
                Some(CellValue::Number(n)) if n.is_finite() => {
                    let _ = write!(body, "<{p}v>{}</{p}v>", n, p = prefix);
                }
                Some(CellValue::String(s)) => {
                    attrs.push_str(" t=\"str\"");
                    let _ = write!(
                        body,
                        "<{p}v>{}</{p}v>",
                        escape_xml(&encode_excel_escapes(s)),
                        p = prefix
                    );
                }
                Some(CellValue::Boolean(b)) => {
                    attrs.push_str(" t=\"b\"");
                    let _ = write!(body, "<{p}v>{}</{p}v>", u8::from(*b), p = prefix);
                }
                Some(CellValue::Error(e)) => {
                    attrs.push_str(" t=\"e\"");
                    let _ = write!(body, "<{p}v>{}</{p}v>", escape_xml(e.as_str()), p = prefix);
                }
                _ => {}
            }
            Some(body)
        }
    };

    if let Some(cm) = cell.cell_metadata {
        let _ = write!(attrs, " cm=\"{}\"", cm);
    }
    if let Some(vm) = cell.value_metadata {
        let _ = write!(attrs, " vm=\"{}\"", vm);
    }

    match body {
        Some(body) => {
            let _ = write!(content, "<{p}c{}>{}</{p}c>", attrs, body, p = prefix);
        }
        None => {
            let _ = write!(content, "<{}c{}/>", prefix, attrs);
        }
    }
}

fn formula_element(prefix: &str, text: &str, kind: &FormulaKind) -> String {
    let text = escape_xml(text.strip_prefix('=').unwrap_or(text));
    match kind {
        FormulaKind::Normal => format!("<{p}f>{}</{p}f>", text, p = prefix),
        FormulaKind::Array { range } => {
            format!("<{p}f t=\"array\" ref=\"{}\">{}</{p}f>", range, text, p = prefix)
        }
        FormulaKind::Shared {
            index,
            range: Some(range),
        } if !text.is_empty() => format!(
            "<{p}f t=\"shared\" ref=\"{}\" si=\"{}\">{}</{p}f>",
            range,
            index,
            text,
            p = prefix
        ),
        FormulaKind::Shared { index, .. } => format!("<{}f t=\"shared\" si=\"{}\"/>", prefix, index),
    }
}

/// Location of `<sheetData>` within a worksheet part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetDataSpan {
    pub start: usize,
    pub end: usize,
    /// Namespace prefix including the colon, or empty
    pub prefix: String,
}

/// Find the byte span of the `<sheetData>` element
pub(crate) fn locate_sheet_data(xml: &[u8]) -> XlsxResult<SheetDataSpan> {
    let mut xml_reader = Reader::from_reader(xml);
    xml_reader.trim_text(false);

    let mut buf = Vec::new();
    let mut start = None;
    let mut prefix = String::new();

    loop {
        let event_start = xml_reader.buffer_position();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheetData" => {
                return Ok(SheetDataSpan {
                    start: event_start,
                    end: xml_reader.buffer_position(),
                    prefix: qualified_prefix(e.name().as_ref()),
                });
            }
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheetData" => {
                start = Some(event_start);
                prefix = qualified_prefix(e.name().as_ref());
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"sheetData" => {
                if let Some(start) = start {
                    return Ok(SheetDataSpan {
                        start,
                        end: xml_reader.buffer_position(),
                        prefix,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Err(XlsxError::InvalidFormat(
        "Worksheet part has no <sheetData> element".into(),
    ))
}

fn qualified_prefix(name: &[u8]) -> String {
    match name.iter().position(|&b| b == b':') {
        Some(i) => String::from_utf8_lossy(&name[..=i]).into_owned(),
        None => String::new(),
    }
}

/// Replace the `<sheetData>` element of `original` with freshly rendered cells
pub(crate) fn splice_sheet(
    original: &[u8],
    sheet: &Worksheet,
    strings: &mut SharedStringTable,
) -> XlsxResult<Vec<u8>> {
    let span = locate_sheet_data(original)?;
    let sheet_data = render_sheet_data(sheet, &span.prefix, strings);

    let mut out = Vec::with_capacity(original.len() - (span.end - span.start) + sheet_data.len());
    out.extend_from_slice(&original[..span.start]);
    out.extend_from_slice(sheet_data.as_bytes());
    out.extend_from_slice(&original[span.end..]);
    Ok(out)
}
