//! XLSX writer

mod recalc;
mod sheet_data;

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use crate::document::XlsxDocument;
use crate::error::XlsxResult;
use recalc::CALC_CHAIN_PART;
use sheet_data::SharedStringTable;

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const NEW_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// XLSX file writer
pub struct XlsxWriter;

impl XlsxWriter {
    /// Write a document to a file path
    pub fn write_file<P: AsRef<Path>>(doc: &XlsxDocument, path: P) -> XlsxResult<()> {
        let file = File::create(path)?;
        Self::write(doc, file)
    }

    /// Write a document to a writer.
    ///
    /// Carried-through parts are written first, in their original order,
    /// followed by the worksheets and the shared string table. Parts listed
    /// in [`XlsxDocument::dropped_parts`] are not written.
    pub fn write<W: Write + Seek>(doc: &XlsxDocument, writer: W) -> XlsxResult<()> {
        let mut strings = SharedStringTable::default();
        let mut sheets = Vec::with_capacity(doc.sheets.len());
        for (i, part) in doc.sheets.iter().enumerate() {
            let Some(sheet) = doc.workbook.worksheet(i) else {
                continue;
            };
            let xml = sheet_data::splice_sheet(&part.xml, sheet, &mut strings)?;
            sheets.push((part.path.as_str(), xml));
        }

        let mut parts = doc.parts.clone();
        if doc.workbook.settings().full_calc_on_load {
            Self::request_full_calculation(&mut parts)?;
        }

        let strings_path = match &doc.shared_strings_path {
            Some(path) => Some(path.clone()),
            None if !strings.is_empty() => {
                Self::register_shared_strings(&mut parts)?;
                Some(NEW_SHARED_STRINGS_PART.to_string())
            }
            None => None,
        };

        let mut zip = zip::ZipWriter::new(writer);
        let options = zip::write::SimpleFileOptions::default();

        for (name, data) in &parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        for (name, data) in &sheets {
            zip.start_file(*name, options)?;
            zip.write_all(data)?;
        }
        if let Some(path) = strings_path {
            zip.start_file(path, options)?;
            zip.write_all(&strings.render(&doc.original_strings))?;
        }

        zip.finish()?;

        if !doc.dropped_parts.is_empty() {
            log::debug!(
                "wrote package without {} unmodelled part(s)",
                doc.dropped_parts.len()
            );
        }
        Ok(())
    }

    /// Set `fullCalcOnLoad` and remove the calc chain with every reference to it
    fn request_full_calculation(parts: &mut Vec<(String, Vec<u8>)>) -> XlsxResult<()> {
        parts.retain(|(name, _)| name != CALC_CHAIN_PART);
        for (name, data) in parts.iter_mut() {
            let updated = match name.as_str() {
                WORKBOOK_PART => recalc::force_full_calc_on_load(data)?,
                WORKBOOK_RELS_PART => recalc::workbook_rels_remove_calc_chain(data)?,
                CONTENT_TYPES_PART => recalc::content_types_remove_calc_chain(data)?,
                _ => continue,
            };
            *data = updated;
        }
        Ok(())
    }

    /// Add the relationship and content type override for a shared string
    /// part the source package did not have
    fn register_shared_strings(parts: &mut [(String, Vec<u8>)]) -> XlsxResult<()> {
        for (name, data) in parts.iter_mut() {
            let updated = match name.as_str() {
                WORKBOOK_RELS_PART => {
                    recalc::workbook_rels_add_shared_strings(data, "sharedStrings.xml")?
                }
                CONTENT_TYPES_PART => {
                    recalc::content_types_add_shared_strings(data, NEW_SHARED_STRINGS_PART)?
                }
                _ => continue,
            };
            *data = updated;
        }
        Ok(())
    }
}

/// Escape XML special characters
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
