//! XLSX reader

mod strings;
mod worksheet;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::document::{SheetPart, XlsxDocument};
use crate::error::{XlsxError, XlsxResult};
use crate::{MAX_PART_SIZE, UNMODELLED_PREFIXES};
use flagsheet_core::Workbook;

pub(crate) use strings::encode_excel_escapes;

const REL_WORKSHEET: &str = "/worksheet";
const REL_SHARED_STRINGS: &str = "/sharedStrings";

/// XLSX file reader
pub struct XlsxReader;

/// Relationships of `xl/workbook.xml` that the reader cares about
#[derive(Debug, Default)]
struct WorkbookRels {
    worksheets: HashMap<String, String>,
    shared_strings: Option<String>,
}

impl XlsxReader {
    /// Read a document from a file path
    pub fn read_file<P: AsRef<Path>>(path: P) -> XlsxResult<XlsxDocument> {
        Self::read_file_leaving_out(path, UNMODELLED_PREFIXES)
    }

    /// Read a document from a file path, leaving out the parts under
    /// `unmodelled` instead of [`UNMODELLED_PREFIXES`]
    pub fn read_file_leaving_out<P: AsRef<Path>>(
        path: P,
        unmodelled: &[&str],
    ) -> XlsxResult<XlsxDocument> {
        let file = File::open(path)?;
        Self::read_leaving_out(BufReader::new(file), unmodelled)
    }

    /// Read a document from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<XlsxDocument> {
        Self::read_leaving_out(reader, UNMODELLED_PREFIXES)
    }

    /// Read a document from a reader. Parts whose names start with one of
    /// `unmodelled` are not loaded into the document and will not be
    /// written; every other part is carried through.
    pub fn read_leaving_out<R: Read + Seek>(
        reader: R,
        unmodelled: &[&str],
    ) -> XlsxResult<XlsxDocument> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut parts = Self::load_parts(&mut archive)?;

        if !parts.iter().any(|(name, _)| name == "[Content_Types].xml") {
            return Err(XlsxError::InvalidFormat(
                "Missing [Content_Types].xml".into(),
            ));
        }

        let sheet_info = {
            let xml = find_part(&parts, "xl/workbook.xml")
                .ok_or_else(|| XlsxError::MissingPart("xl/workbook.xml".into()))?;
            Self::read_workbook_xml(xml)?
        };
        let rels = {
            let xml = find_part(&parts, "xl/_rels/workbook.xml.rels")
                .ok_or_else(|| XlsxError::MissingPart("xl/_rels/workbook.xml.rels".into()))?;
            Self::read_workbook_rels(xml)?
        };

        let shared = match rels
            .shared_strings
            .as_deref()
            .and_then(|path| find_part(&parts, path))
        {
            Some(xml) => strings::read_shared_strings(xml)?,
            None => strings::SharedStrings::default(),
        };

        let mut workbook = Workbook::empty();
        let mut sheets = Vec::new();
        for (name, r_id) in &sheet_info {
            // Chartsheets and dialog sheets have no worksheet relationship;
            // their parts pass through untouched.
            let Some(path) = rels.worksheets.get(r_id) else {
                log::debug!("sheet '{}' is not a worksheet, carrying it through", name);
                continue;
            };
            let xml = take_part(&mut parts, path)
                .ok_or_else(|| XlsxError::MissingPart(path.clone()))?;
            let index = workbook.add_worksheet_with_name(name)?;
            let sheet = workbook
                .worksheet_mut(index)
                .ok_or_else(|| XlsxError::InvalidFormat(format!("sheet '{}' vanished", name)))?;
            worksheet::read_sheet_data(&xml, sheet, &shared.texts)?;
            sheets.push(SheetPart {
                path: path.clone(),
                xml,
            });
        }

        if let Some(path) = &rels.shared_strings {
            take_part(&mut parts, path);
        }

        let mut dropped_parts = Vec::new();
        parts.retain(|(name, _)| {
            let dropped = unmodelled.iter().any(|p| name.starts_with(p));
            if dropped {
                dropped_parts.push(name.clone());
            }
            !dropped
        });
        if !dropped_parts.is_empty() {
            log::debug!(
                "{} part(s) are outside the document model: {:?}",
                dropped_parts.len(),
                dropped_parts
            );
        }

        Ok(XlsxDocument {
            workbook,
            sheets,
            parts,
            shared_strings_path: rels.shared_strings,
            original_strings: shared.raw,
            dropped_parts,
        })
    }

    /// Inflate every file entry of the archive, in archive order
    fn load_parts<R: Read + Seek>(
        archive: &mut zip::ZipArchive<R>,
    ) -> XlsxResult<Vec<(String, Vec<u8>)>> {
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            if file.size() > MAX_PART_SIZE {
                return Err(XlsxError::PartTooLarge {
                    name,
                    size: file.size(),
                    limit: MAX_PART_SIZE,
                });
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push((name, data));
        }
        Ok(parts)
    }

    /// Read workbook.xml to get sheet names and rIds
    fn read_workbook_xml(xml: &[u8]) -> XlsxResult<Vec<(String, String)>> {
        let mut xml_reader = Reader::from_reader(xml);
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut sheets = Vec::new();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"sheet" => {
                    let mut name = None;
                    let mut r_id = None;

                    for attr in e.attributes().flatten() {
                        let key = attr.key;
                        if key.as_ref() == b"name" {
                            name = attr.unescape_value().ok().map(|s| s.to_string());
                        } else if key.local_name().as_ref() == b"id"
                            && key.prefix().is_some()
                        {
                            r_id = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                    }

                    if let (Some(name), Some(r_id)) = (name, r_id) {
                        sheets.push((name, r_id));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(sheets)
    }

    /// Read workbook.xml.rels to find worksheet and shared string parts
    fn read_workbook_rels(xml: &[u8]) -> XlsxResult<WorkbookRels> {
        let mut xml_reader = Reader::from_reader(xml);
        xml_reader.trim_text(true);

        let mut buf = Vec::new();
        let mut rels = WorkbookRels::default();

        loop {
            match xml_reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let mut id = None;
                    let mut target = None;
                    let mut rel_type = None;

                    for attr in e.attributes().flatten() {
                        let value = attr.unescape_value().ok().map(|s| s.to_string());
                        match attr.key.as_ref() {
                            b"Id" => id = value,
                            b"Target" => target = value,
                            b"Type" => rel_type = value,
                            _ => {}
                        }
                    }

                    if let (Some(id), Some(target), Some(rel_type)) = (id, target, rel_type) {
                        let path = resolve_target("xl", &target);
                        if rel_type.ends_with(REL_WORKSHEET) {
                            rels.worksheets.insert(id, path);
                        } else if rel_type.ends_with(REL_SHARED_STRINGS) {
                            rels.shared_strings = Some(path);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }
}

fn find_part<'a>(parts: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    parts
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, data)| data.as_slice())
}

fn take_part(parts: &mut Vec<(String, Vec<u8>)>, name: &str) -> Option<Vec<u8>> {
    let pos = parts.iter().position(|(n, _)| n == name)?;
    Some(parts.remove(pos).1)
}

/// Resolve a relationship target against the directory of its source part
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
