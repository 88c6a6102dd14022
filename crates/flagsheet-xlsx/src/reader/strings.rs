//! Shared string table and Excel's `_xHHHH_` character escapes

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};

/// Parsed shared string table
#[derive(Debug, Default)]
pub(crate) struct SharedStrings {
    /// Flattened text of each `<si>`, by index
    pub texts: Vec<String>,
    /// Original `<si>` markup keyed by flattened text; first occurrence wins
    pub raw: HashMap<String, Vec<u8>>,
}

/// Read `xl/sharedStrings.xml`.
///
/// Rich-text runs are concatenated. Phonetic guides (`<rPh>`) are not part
/// of the cell text and are skipped, though they are kept in the raw markup.
pub(crate) fn read_shared_strings(xml: &[u8]) -> XlsxResult<SharedStrings> {
    let mut xml_reader = Reader::from_reader(xml);
    xml_reader.trim_text(false);

    let mut strings = SharedStrings::default();
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut si_start: Option<usize> = None;
    let mut in_t = false;
    let mut phonetic_depth = 0usize;

    loop {
        let event_start = xml_reader.buffer_position();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    si_start = Some(event_start);
                    current.clear();
                }
                b"rPh" if si_start.is_some() => phonetic_depth += 1,
                b"t" if si_start.is_some() && phonetic_depth == 0 => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                let end = xml_reader.buffer_position();
                strings.push(String::new(), &xml[event_start..end]);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => {
                    if let Some(start) = si_start.take() {
                        let end = xml_reader.buffer_position();
                        let text = decode_excel_escapes(&current);
                        strings.push(text, &xml[start..end]);
                    }
                    current.clear();
                    phonetic_depth = 0;
                }
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_t => {
                current.push_str(&e.unescape()?);
            }
            Ok(Event::CData(e)) if in_t => {
                current.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    log::debug!("read {} shared strings", strings.texts.len());
    Ok(strings)
}

impl SharedStrings {
    fn push(&mut self, text: String, raw: &[u8]) {
        self.raw
            .entry(text.clone())
            .or_insert_with(|| raw.to_vec());
        self.texts.push(text);
    }
}

/// Decode `_xHHHH_` sequences into the characters they stand for.
///
/// `_x005F_` is how a literal underscore that precedes such a pattern is
/// written. Sequences that are malformed or name an invalid code point are
/// left as they are.
pub(crate) fn decode_excel_escapes(s: &str) -> String {
    if !s.contains("_x") {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match parse_escape(candidate) {
            Some(ch) => {
                out.push(ch);
                rest = &candidate[7..];
            }
            None => {
                out.push('_');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse `_xHHHH_` at the start of `s`
fn parse_escape(s: &str) -> Option<char> {
    let bytes = s.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' {
        return None;
    }
    let hex = s.get(2..6)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

/// Encode text for a `<t>` element: control characters that XML 1.0 cannot
/// carry become `_xHHHH_`, and an underscore that would otherwise read as
/// the start of an escape is itself escaped.
pub(crate) fn encode_excel_escapes(s: &str) -> String {
    let needs_work = s
        .chars()
        .any(|c| (c.is_control() && c != '\t' && c != '\n') || c == '_');
    if !needs_work {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.char_indices() {
        match c {
            '\t' | '\n' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("_x{:04X}_", c as u32));
            }
            '_' if parse_escape(&s[i..]).is_some() => out.push_str("_x005F_"),
            c => out.push(c),
        }
    }
    out
}
