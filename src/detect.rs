//! Input format detection.

use crate::error::{Error, Result};
use crate::ooxml;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Document formats the converter reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocFormat {
    /// Markdown text
    Markdown,
    /// Word package
    Docx,
}

impl DocFormat {
    /// Look up a format by file extension (case-insensitive, without dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" | "mdown" | "mkd" => Some(DocFormat::Markdown),
            "docx" => Some(DocFormat::Docx),
            _ => None,
        }
    }

    /// Preferred file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            DocFormat::Markdown => "md",
            DocFormat::Docx => "docx",
        }
    }

    /// Format name understood by the external converter.
    pub fn tool_name(&self) -> &'static str {
        match self {
            DocFormat::Markdown => "markdown",
            DocFormat::Docx => "docx",
        }
    }
}

impl std::fmt::Display for DocFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocFormat::Markdown => write!(f, "Markdown"),
            DocFormat::Docx => write!(f, "Word (DOCX)"),
        }
    }
}

/// Zip local file header.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Detect the format of a file, by extension first and content second.
///
/// # Example
/// ```no_run
/// use mdocx::detect::{detect_format_from_path, DocFormat};
///
/// let format = detect_format_from_path("report.docx").unwrap();
/// assert_eq!(format, DocFormat::Docx);
/// ```
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<DocFormat> {
    let path = path.as_ref();
    if let Some(format) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(DocFormat::from_extension)
    {
        return Ok(format);
    }
    detect_format_from_bytes(&fs::read(path)?)
}

/// Detect the format from file content.
///
/// A zip container holding `word/document.xml` is a Word package; any other
/// UTF-8 text is Markdown.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<DocFormat> {
    if data.starts_with(ZIP_MAGIC) {
        let archive = zip::ZipArchive::new(Cursor::new(data))?;
        if archive.file_names().any(|n| n == ooxml::PART_DOCUMENT) {
            return Ok(DocFormat::Docx);
        }
        return Err(Error::UnsupportedFormat(
            "zip archive is not a Word package".to_string(),
        ));
    }
    if std::str::from_utf8(data).is_ok() {
        return Ok(DocFormat::Markdown);
    }
    Err(Error::UnsupportedFormat("binary data".to_string()))
}

/// Check if a file is a Word package.
pub fn is_docx<P: AsRef<Path>>(path: P) -> bool {
    matches!(detect_format_from_path(path), Ok(DocFormat::Docx))
}

/// Check if bytes are a Word package.
pub fn is_docx_bytes(data: &[u8]) -> bool {
    matches!(detect_format_from_bytes(data), Ok(DocFormat::Docx))
}
