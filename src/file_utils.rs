use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::logging::JobLog;
use crate::translation::SourceRecord;

// @module: File and directory utilities

/// Written in place of a translation that could not be recovered
pub const MISSING_TRANSLATION_MARKER: &str = "[TRANSLATION_FAILED]";

/// Header of the final translation CSV
pub const OUTPUT_HEADER: [&str; 3] = ["description_id", "english_sentence", "translated_sentence"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One row of the final translation CSV
#[derive(Debug, Serialize)]
pub struct OutputRow<'a> {
    pub description_id: &'a str,
    pub english_sentence: &'a str,
    pub translated_sentence: &'a str,
}

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    // @generates: Output path for a translated CSV
    // @params: input_file, output_dir, language tag, extension
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        language_tag: &str,
        extension: &str,
    ) -> PathBuf {
        let stem = input_file.as_ref().file_stem().unwrap_or_default();

        let mut output_filename = stem.to_string_lossy().to_string();
        output_filename.push('.');
        output_filename.push_str(language_tag);
        output_filename.push('.');
        output_filename.push_str(extension);

        output_dir.as_ref().join(output_filename)
    }

    /// Path next to `output` with an extra suffix, e.g. `out.csv` -> `out.csv.report.json`
    pub fn sibling_path<P: AsRef<Path>>(output: P, suffix: &str) -> PathBuf {
        let output = output.as_ref();
        let mut name = output.file_name().unwrap_or_default().to_os_string();
        name.push(suffix);
        output.with_file_name(name)
    }

    /// Find files with a specific extension in a directory
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        let normalized_ext = extension.trim_start_matches('.');

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension() {
                    if ext.to_string_lossy().eq_ignore_ascii_case(normalized_ext) {
                        result.push(path.to_path_buf());
                    }
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path).with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Replace `path` with `contents` through a temporary file in the same directory
    pub fn write_atomically<P: AsRef<Path>>(path: P, contents: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir(&parent)?;

        let tmp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temporary file in {:?}", parent))?;
        fs::write(tmp.path(), contents)
            .with_context(|| format!("Failed to write temporary file for {:?}", path))?;
        tmp.persist(path)
            .map_err(|e| anyhow!("Failed to replace {:?}: {}", path, e.error))?;
        Ok(())
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        Self::write_atomically(path, content.as_bytes())
    }

    /// Read `description_id,english_sentence` rows, skipping the header
    ///
    /// Rows with fewer than two columns or a blank sentence are logged and skipped.
    pub fn read_source_csv<P: AsRef<Path>>(path: P, log: &JobLog) -> Result<Vec<SourceRecord>> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open input CSV: {:?}", path))?;

        let mut records = Vec::new();
        for (idx, row) in reader.records().enumerate() {
            // Header is line 1
            let line = idx + 2;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    log.warn(format!("Skipping unreadable row at line {}: {}", line, e));
                    continue;
                }
            };

            if row.len() < 2 {
                log.warn(format!("Skipping row at line {}: expected 2 columns, found {}", line, row.len()));
                continue;
            }

            let id = row[0].trim_start_matches('\u{feff}').trim();
            let text = row[1].trim();
            if text.is_empty() {
                log.warn(format!("Skipping row at line {} (id {}): blank sentence", line, id));
                continue;
            }

            records.push(SourceRecord::new(id, text));
        }

        log.info(format!("Read {} records from {:?}", records.len(), path));
        Ok(records)
    }

    /// Write the final translation CSV with a UTF-8 BOM
    pub fn write_translations_csv<P: AsRef<Path>>(path: P, rows: &[OutputRow<'_>]) -> Result<()> {
        let mut buffer = UTF8_BOM.to_vec();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut buffer);
            writer.write_record(OUTPUT_HEADER)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        Self::write_atomically(path, &buffer)
    }
}
