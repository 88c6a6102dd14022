//! Package-level operations: capturing parts from a source file, writing a
//! document to a temporary file next to its destination, and restoring
//! parts the writer omitted.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::CompressionMethod;

use crate::document::XlsxDocument;
use crate::error::{XlsxError, XlsxResult};
use crate::writer::XlsxWriter;
use crate::MAX_PART_SIZE;

/// A part copied out of a package, to be put back by [`repair`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPart {
    /// Part name inside the package
    pub name: String,
    /// Uncompressed bytes
    pub data: Vec<u8>,
    /// The entry as stored in its package, held as a one-entry archive so
    /// it can be copied without recompression
    entry: Vec<u8>,
}

impl CapturedPart {
    /// A part made from uncompressed bytes rather than captured from a package
    pub fn from_bytes(
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        compression: CompressionMethod,
    ) -> XlsxResult<Self> {
        let name = name.into();
        let data = data.into();
        let mut single = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default().compression_method(compression);
        single.start_file(name.as_str(), options)?;
        single.write_all(&data)?;
        let entry = single.finish()?.into_inner();
        Ok(Self { name, data, entry })
    }

    /// Compression method of the stored entry
    pub fn compression(&self) -> XlsxResult<CompressionMethod> {
        let mut single = zip::ZipArchive::new(Cursor::new(self.entry.as_slice()))?;
        let method = single.by_index_raw(0)?.compression();
        Ok(method)
    }
}

/// What [`repair`] did to each captured part
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Parts present in the output with different bytes, now replaced
    pub replaced: Vec<String>,
    /// Parts missing from the output, now appended
    pub added: Vec<String>,
    /// Parts already present with identical bytes
    pub unchanged: Vec<String>,
}

impl RepairReport {
    /// Whether the output file was rewritten
    pub fn modified(&self) -> bool {
        !self.replaced.is_empty() || !self.added.is_empty()
    }
}

/// Copy every part whose name starts with one of `prefixes` out of the
/// package at `path`
pub fn capture_parts<P: AsRef<Path>>(path: P, prefixes: &[&str]) -> XlsxResult<Vec<CapturedPart>> {
    let file = File::open(path.as_ref())?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    let mut captured = Vec::new();
    for i in 0..archive.len() {
        let (name, data) = {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() || !prefixes.iter().any(|p| entry.name().starts_with(p)) {
                continue;
            }
            if entry.size() > MAX_PART_SIZE {
                return Err(XlsxError::PartTooLarge {
                    name: entry.name().to_string(),
                    size: entry.size(),
                    limit: MAX_PART_SIZE,
                });
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            (entry.name().to_string(), data)
        };

        let mut single = zip::ZipWriter::new(Cursor::new(Vec::new()));
        single.raw_copy_file(archive.by_index_raw(i)?)?;
        let entry = single.finish()?.into_inner();
        captured.push(CapturedPart { name, data, entry });
    }

    log::debug!(
        "captured {} part(s) from {}",
        captured.len(),
        path.as_ref().display()
    );
    Ok(captured)
}

/// Create an empty temporary file in the directory of `dest`, so it can be
/// renamed over `dest` without crossing filesystems
pub fn temp_file_beside(dest: &Path) -> XlsxResult<NamedTempFile> {
    let dir = match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".flagsheet-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    Ok(temp)
}

/// Write `doc` to a temporary file beside `dest`, flushed and synced. The
/// caller persists it.
pub fn write_document_to_temp(doc: &XlsxDocument, dest: &Path) -> XlsxResult<NamedTempFile> {
    let temp = temp_file_beside(dest)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        XlsxWriter::write(doc, &mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Put `captured` parts back into the package at `output`.
///
/// Entries whose bytes already match are left alone; if every captured part
/// matches, the file is not touched. Otherwise the package is rewritten into
/// a sibling temporary file (every entry, restored ones included, is copied
/// without recompression),
/// moved over `output`, and read back to verify the restored bytes.
pub fn repair(output: &Path, captured: &[CapturedPart]) -> XlsxResult<RepairReport> {
    let mut report = RepairReport::default();
    if captured.is_empty() {
        return Ok(report);
    }

    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(output)?))?;
    let mut present = HashSet::new();
    for part in captured {
        match read_entry(&mut archive, &part.name)? {
            Some(existing) if existing == part.data => report.unchanged.push(part.name.clone()),
            Some(_) => {
                present.insert(part.name.as_str());
                report.replaced.push(part.name.clone());
            }
            None => report.added.push(part.name.clone()),
        }
    }

    if !report.modified() {
        log::debug!("all {} captured part(s) already intact", captured.len());
        return Ok(report);
    }

    let temp = temp_file_beside(output)?;
    {
        let mut zip = zip::ZipWriter::new(BufWriter::new(temp.as_file()));
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            let name = entry.name().to_string();
            match captured.iter().find(|p| p.name == name) {
                Some(part) if present.contains(name.as_str()) => {
                    drop(entry);
                    write_part(&mut zip, part)?;
                }
                _ => zip.raw_copy_file(entry)?,
            }
        }
        for part in captured.iter().filter(|p| report.added.contains(&p.name)) {
            write_part(&mut zip, part)?;
        }
        let mut writer = zip.finish()?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    drop(archive);
    temp.persist(output)?;

    verify(output, captured)?;
    log::info!(
        "restored {} part(s) in {} ({} replaced, {} added)",
        report.replaced.len() + report.added.len(),
        output.display(),
        report.replaced.len(),
        report.added.len()
    );
    Ok(report)
}

/// Copy the captured entry into `zip` as stored, without recompressing it
fn write_part<W: Write + Seek>(zip: &mut zip::ZipWriter<W>, part: &CapturedPart) -> XlsxResult<()> {
    let mut single = zip::ZipArchive::new(Cursor::new(part.entry.as_slice()))?;
    zip.raw_copy_file(single.by_index_raw(0)?)?;
    Ok(())
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> XlsxResult<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(Some(data))
}

/// Check that every captured part is present in `path` byte for byte
fn verify(path: &Path, captured: &[CapturedPart]) -> XlsxResult<()> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(path)?))?;
    for part in captured {
        match read_entry(&mut archive, &part.name)? {
            Some(data) if data == part.data => {}
            _ => return Err(XlsxError::RepairVerification(part.name.clone())),
        }
    }
    Ok(())
}
