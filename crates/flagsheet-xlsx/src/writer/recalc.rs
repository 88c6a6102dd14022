//! Package metadata edits: forced recalculation, calc chain removal and
//! registration of a newly created shared string part

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{XlsxError, XlsxResult};

pub(crate) const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

const CALC_CHAIN_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
const SHARED_STRINGS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
const SHARED_STRINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";

/// Workbook children that follow `<calcPr>` in schema order
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Set `fullCalcOnLoad="1"` on the workbook's `<calcPr>`, creating the
/// element at its schema position if it is missing
pub(crate) fn force_full_calc_on_load(workbook_xml: &[u8]) -> XlsxResult<Vec<u8>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut prefix = Vec::new();
    let mut saw_calc_pr = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) if depth == 0 => {
                if e.local_name().as_ref() == b"workbook" {
                    prefix = element_prefix(e);
                }
                depth += 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(patched_calc_pr(e)?))?;
            }
            Event::Start(ref e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                depth += 1;
                writer.write_event(Event::Start(patched_calc_pr(e)?))?;
            }
            Event::Start(ref e) if depth == 1 && !saw_calc_pr && follows_calc_pr(e) => {
                saw_calc_pr = true;
                depth += 1;
                writer.write_event(Event::Empty(new_calc_pr(&prefix)))?;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if depth == 1 && !saw_calc_pr && follows_calc_pr(e) => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(new_calc_pr(&prefix)))?;
                writer.write_event(Event::Empty(e.to_owned()))?;
            }
            Event::Start(ref e) => {
                depth += 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) => {
                if depth == 1 && !saw_calc_pr {
                    saw_calc_pr = true;
                    writer.write_event(Event::Empty(new_calc_pr(&prefix)))?;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Event::Eof => break,
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn follows_calc_pr(e: &BytesStart<'_>) -> bool {
    AFTER_CALC_PR.contains(&e.local_name().as_ref())
}

fn element_prefix(e: &BytesStart<'_>) -> Vec<u8> {
    let name = e.name();
    match name.prefix() {
        Some(p) => {
            let mut prefix = p.as_ref().to_vec();
            prefix.push(b':');
            prefix
        }
        None => Vec::new(),
    }
}

fn new_calc_pr(prefix: &[u8]) -> BytesStart<'static> {
    let mut name = String::from_utf8_lossy(prefix).into_owned();
    name.push_str("calcPr");
    let mut calc_pr = BytesStart::new(name);
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    calc_pr
}

fn patched_calc_pr(e: &BytesStart<'_>) -> XlsxResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut calc_pr = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr)
}

/// Copy `xml`, leaving out every `local_name` element for which `matches`
/// returns true (including its children, if any)
fn remove_elements<F>(xml: &[u8], local_name: &[u8], mut matches: F) -> XlsxResult<(Vec<u8>, usize)>
where
    F: FnMut(&BytesStart<'_>) -> XlsxResult<bool>,
{
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut buf = Vec::new();
    let mut skipping = 0usize;
    let mut removed = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(_) if skipping > 0 => skipping += 1,
            Event::End(_) if skipping > 0 => skipping -= 1,
            _ if skipping > 0 => {}
            Event::Start(ref e) if e.local_name().as_ref() == local_name && matches(e)? => {
                removed += 1;
                skipping = 1;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == local_name && matches(e)? => {
                removed += 1;
            }
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), removed))
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> XlsxResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Drop the calc chain relationship from `xl/_rels/workbook.xml.rels`
pub(crate) fn workbook_rels_remove_calc_chain(rels_xml: &[u8]) -> XlsxResult<Vec<u8>> {
    let (xml, removed) = remove_elements(rels_xml, b"Relationship", |e| {
        let is_type = attribute(e, b"Type")?.as_deref() == Some(CALC_CHAIN_REL_TYPE);
        let is_target = attribute(e, b"Target")?
            .is_some_and(|t| t.ends_with("calcChain.xml"));
        Ok(is_type || is_target)
    })?;
    if removed > 0 {
        log::debug!("removed calc chain relationship");
    }
    Ok(xml)
}

/// Drop the calc chain override from `[Content_Types].xml`
pub(crate) fn content_types_remove_calc_chain(content_types_xml: &[u8]) -> XlsxResult<Vec<u8>> {
    let target = format!("/{}", CALC_CHAIN_PART);
    let (xml, _) = remove_elements(content_types_xml, b"Override", |e| {
        Ok(attribute(e, b"PartName")?.is_some_and(|p| p.eq_ignore_ascii_case(&target)))
    })?;
    Ok(xml)
}

/// Insert `snippet` just before the last closing tag named `closing`
fn insert_before_closing(xml: &[u8], closing: &str, snippet: &str) -> XlsxResult<Vec<u8>> {
    let needle = closing.as_bytes();
    let pos = xml
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or_else(|| XlsxError::InvalidFormat(format!("{} not found", closing)))?;

    let mut out = Vec::with_capacity(xml.len() + snippet.len());
    out.extend_from_slice(&xml[..pos]);
    out.extend_from_slice(snippet.as_bytes());
    out.extend_from_slice(&xml[pos..]);
    Ok(out)
}

/// Register a shared string part in the workbook relationships
pub(crate) fn workbook_rels_add_shared_strings(rels_xml: &[u8], target: &str) -> XlsxResult<Vec<u8>> {
    let mut max_id = 0u32;
    let mut reader = Reader::from_reader(rels_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let Some(n) = attribute(&e, b"Id")?
                    .and_then(|id| id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
                {
                    max_id = max_id.max(n);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let snippet = format!(
        r#"<Relationship Id="rId{}" Type="{}" Target="{}"/>"#,
        max_id + 1,
        SHARED_STRINGS_REL_TYPE,
        target
    );
    insert_before_closing(rels_xml, "</Relationships>", &snippet)
}

/// Register a shared string part in `[Content_Types].xml`
pub(crate) fn content_types_add_shared_strings(
    content_types_xml: &[u8],
    part_name: &str,
) -> XlsxResult<Vec<u8>> {
    let snippet = format!(
        r#"<Override PartName="/{}" ContentType="{}"/>"#,
        part_name, SHARED_STRINGS_CONTENT_TYPE
    );
    insert_before_closing(content_types_xml, "</Types>", &snippet)
}
