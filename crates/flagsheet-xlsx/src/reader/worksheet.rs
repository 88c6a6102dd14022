//! `<sheetData>` parsing

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::strings::decode_excel_escapes;
use crate::error::{XlsxError, XlsxResult};
use flagsheet_core::{
    CellAddress, CellData, CellError, CellRange, CellValue, FormulaKind, RowAttributes, Worksheet,
};

/// Row attributes the writer regenerates instead of copying
const REGENERATED_ROW_ATTRS: &[&[u8]] = &[b"r", b"spans"];

/// Attributes of a `<c>` element
#[derive(Debug, Default)]
struct CellAttrs {
    address: Option<CellAddress>,
    cell_type: Option<String>,
    style: u32,
    cell_metadata: Option<u32>,
    value_metadata: Option<u32>,
}

/// A `<f>` element
#[derive(Debug, Default)]
struct FormulaElement {
    text: String,
    kind: FormulaKind,
}

/// Content collected while inside a `<c>` element
#[derive(Debug, Default)]
struct PendingCell {
    attrs: CellAttrs,
    value: Option<String>,
    formula: Option<FormulaElement>,
    inline: Option<String>,
}

/// Read the cells and row attributes of a worksheet part into `sheet`
pub(crate) fn read_sheet_data(
    xml: &[u8],
    sheet: &mut Worksheet,
    shared_strings: &[String],
) -> XlsxResult<()> {
    let mut xml_reader = Reader::from_reader(xml);
    xml_reader.trim_text(false);

    let mut buf = Vec::new();
    let mut in_sheet_data = false;
    let mut current_row: Option<u32> = None;
    let mut next_col: u16 = 0;

    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_formula = false;
    let mut in_inline = false;
    let mut in_inline_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = true,
                b"row" if in_sheet_data => {
                    let row = start_row(&e, current_row, sheet)?;
                    current_row = Some(row);
                    next_col = 0;
                }
                b"c" if in_sheet_data => {
                    let attrs = parse_cell_attrs(&e, current_row, next_col)?;
                    if let Some(addr) = attrs.address {
                        next_col = addr.col.saturating_add(1);
                    }
                    cell = Some(PendingCell {
                        attrs,
                        ..Default::default()
                    });
                }
                b"v" if cell.is_some() => {
                    in_value = true;
                    if let Some(c) = cell.as_mut() {
                        c.value.get_or_insert_with(String::new);
                    }
                }
                b"f" if cell.is_some() => {
                    in_formula = true;
                    if let Some(c) = cell.as_mut() {
                        c.formula = Some(parse_formula_attrs(&e)?);
                    }
                }
                b"is" if cell.is_some() => {
                    in_inline = true;
                    if let Some(c) = cell.as_mut() {
                        c.inline.get_or_insert_with(String::new);
                    }
                }
                b"rPh" if in_inline => phonetic_depth += 1,
                b"t" if in_inline && phonetic_depth == 0 => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" if in_sheet_data => {
                    let row = start_row(&e, current_row, sheet)?;
                    current_row = Some(row);
                    next_col = 0;
                }
                b"c" if in_sheet_data => {
                    let attrs = parse_cell_attrs(&e, current_row, next_col)?;
                    if let Some(addr) = attrs.address {
                        next_col = addr.col.saturating_add(1);
                    }
                    finish_cell(
                        sheet,
                        PendingCell {
                            attrs,
                            ..Default::default()
                        },
                        shared_strings,
                    )?;
                }
                b"f" if cell.is_some() => {
                    if let Some(c) = cell.as_mut() {
                        c.formula = Some(parse_formula_attrs(&e)?);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"sheetData" => {
                    in_sheet_data = false;
                }
                b"c" => {
                    if let Some(c) = cell.take() {
                        finish_cell(sheet, c, shared_strings)?;
                    }
                }
                b"v" => in_value = false,
                b"f" => in_formula = false,
                b"is" => {
                    in_inline = false;
                    phonetic_depth = 0;
                }
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_inline_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_value || in_formula || in_inline_text => {
                let text = e.unescape()?;
                if let Some(c) = cell.as_mut() {
                    if in_value {
                        c.value.get_or_insert_with(String::new).push_str(&text);
                    } else if in_formula {
                        if let Some(f) = c.formula.as_mut() {
                            f.text.push_str(&text);
                        }
                    } else {
                        c.inline.get_or_insert_with(String::new).push_str(&text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Record a `<row>` element's attributes and return its 0-based index
fn start_row(e: &BytesStart, previous: Option<u32>, sheet: &mut Worksheet) -> XlsxResult<u32> {
    let mut row = None;
    let mut kept = Vec::new();

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"r" {
            let value = attr.unescape_value()?;
            let n: u32 = value
                .parse()
                .map_err(|_| XlsxError::Parse(format!("Invalid row number '{}'", value)))?;
            if n == 0 {
                return Err(XlsxError::Parse("Row number 0".into()));
            }
            row = Some(n - 1);
        } else if !REGENERATED_ROW_ATTRS.contains(&key) {
            kept.push((
                String::from_utf8_lossy(key).into_owned(),
                attr.unescape_value()?.into_owned(),
            ));
        }
    }

    let row = row.unwrap_or_else(|| previous.map_or(0, |r| r + 1));
    sheet.set_row_attributes(row, RowAttributes(kept));
    Ok(row)
}

fn parse_cell_attrs(
    e: &BytesStart,
    current_row: Option<u32>,
    next_col: u16,
) -> XlsxResult<CellAttrs> {
    let mut attrs = CellAttrs::default();

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"r" => {
                let addr = CellAddress::parse(&value).map_err(|e| {
                    XlsxError::Parse(format!("Invalid cell reference '{}': {}", value, e))
                })?;
                attrs.address = Some(addr);
            }
            b"t" => attrs.cell_type = Some(value.into_owned()),
            b"s" => attrs.style = parse_index(&value, "style")?,
            b"cm" => attrs.cell_metadata = Some(parse_index(&value, "cell metadata")?),
            b"vm" => attrs.value_metadata = Some(parse_index(&value, "value metadata")?),
            _ => {}
        }
    }

    if attrs.address.is_none() {
        let row = current_row
            .ok_or_else(|| XlsxError::Parse("Cell without reference outside a row".into()))?;
        attrs.address = Some(CellAddress::new(row, next_col));
    }
    Ok(attrs)
}

fn parse_formula_attrs(e: &BytesStart) -> XlsxResult<FormulaElement> {
    let mut formula_type = None;
    let mut range = None;
    let mut shared_index = None;

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"t" => formula_type = Some(value.into_owned()),
            b"ref" => {
                let parsed = CellRange::parse(&value).map_err(|e| {
                    XlsxError::Parse(format!("Invalid formula range '{}': {}", value, e))
                })?;
                range = Some(parsed);
            }
            b"si" => shared_index = Some(parse_index(&value, "shared formula")?),
            _ => {}
        }
    }

    let kind = match formula_type.as_deref() {
        Some("array") => match range {
            Some(range) => FormulaKind::Array { range },
            None => return Err(XlsxError::Parse("Array formula without ref".into())),
        },
        Some("shared") => match shared_index {
            Some(index) => FormulaKind::Shared { index, range },
            None => return Err(XlsxError::Parse("Shared formula without si".into())),
        },
        _ => FormulaKind::Normal,
    };

    Ok(FormulaElement {
        text: String::new(),
        kind,
    })
}

fn parse_index(value: &str, what: &str) -> XlsxResult<u32> {
    value
        .parse()
        .map_err(|_| XlsxError::Parse(format!("Invalid {} index '{}'", what, value)))
}

/// Turn collected cell content into a model value and store it
fn finish_cell(
    sheet: &mut Worksheet,
    cell: PendingCell,
    shared_strings: &[String],
) -> XlsxResult<()> {
    let PendingCell {
        attrs,
        value,
        formula,
        inline,
    } = cell;
    let Some(addr) = attrs.address else {
        return Ok(());
    };
    let cell_type = attrs.cell_type.as_deref();

    let value = match formula {
        Some(formula) => {
            let cached = match (cell_type, inline) {
                (Some("inlineStr"), Some(text)) => Some(CellValue::String(text)),
                _ => value
                    .map(|v| typed_value(cell_type, &v, shared_strings))
                    .transpose()?,
            };
            let text = if formula.text.is_empty() {
                String::new()
            } else {
                format!("={}", formula.text)
            };
            CellValue::Formula {
                text,
                cached_value: cached.map(Box::new),
                kind: formula.kind,
            }
        }
        None => match (cell_type, inline, value) {
            (Some("inlineStr"), Some(text), _) => {
                CellValue::String(decode_excel_escapes(&text))
            }
            (_, _, Some(v)) => typed_value(cell_type, &v, shared_strings)?,
            _ => CellValue::Empty,
        },
    };

    sheet.set_cell_at(
        addr.row,
        addr.col,
        CellData {
            value,
            style_index: attrs.style,
            cell_metadata: attrs.cell_metadata,
            value_metadata: attrs.value_metadata,
        },
    )?;
    Ok(())
}

/// Interpret `<v>` text according to the cell's `t` attribute
fn typed_value(
    cell_type: Option<&str>,
    value: &str,
    shared_strings: &[String],
) -> XlsxResult<CellValue> {
    Ok(match cell_type {
        Some("s") => {
            let idx: usize = value.trim().parse().map_err(|_| {
                XlsxError::Parse(format!("Invalid shared string index: {}", value))
            })?;
            let s = shared_strings.get(idx).ok_or_else(|| {
                XlsxError::Parse(format!("Shared string index {} out of bounds", idx))
            })?;
            CellValue::String(s.clone())
        }
        Some("b") => CellValue::Boolean(value.trim() == "1" || value.eq_ignore_ascii_case("true")),
        Some("e") => CellError::parse(value)
            .map(CellValue::Error)
            .unwrap_or_else(|| CellValue::String(value.to_string())),
        Some("str") | Some("inlineStr") => CellValue::String(decode_excel_escapes(value)),
        None | Some("n") => match value.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::String(value.to_string()),
        },
        Some(_) => CellValue::String(value.to_string()),
    })
}
