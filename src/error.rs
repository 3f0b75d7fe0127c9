//! Error types for mdocx library.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mdocx operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during conversion.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The Word package (zip container) could not be read or written.
    #[error("Word package error: {0}")]
    Package(#[from] zip::result::ZipError),

    /// A package part is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input is neither Markdown nor a Word document.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The external conversion tool is not installed or not configured.
    #[error("External tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    /// The external conversion tool ran but did not produce usable output.
    #[error("External tool failed: {0}")]
    ExternalToolFailed(String),

    /// The built-in codecs could not convert the input.
    #[error("Conversion failed: {0}")]
    BuiltinConversionFailed(String),

    /// An artifact or ledger entry could not be written.
    #[error("Failed to persist {}: {source}", path.display())]
    PersistenceFailed {
        /// Destination that could not be written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// No version with this sequence number exists in the lineage.
    #[error("Version {sequence} not found in lineage '{lineage}'")]
    VersionNotFound {
        /// Lineage name
        lineage: String,
        /// Requested sequence number
        sequence: u32,
    },

    /// Lineage name is empty or cannot be used as a directory name.
    #[error("Invalid lineage name: {0:?}")]
    InvalidLineage(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an I/O error raised while writing `path`.
    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::PersistenceFailed {
            path: path.into(),
            source,
        }
    }

    /// Whether the error aborts a conversion outright.
    ///
    /// External tool errors are not fatal: the pipeline falls back to the
    /// built-in codecs when it sees them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::ExternalToolUnavailable(_) | Error::ExternalToolFailed(_)
        )
    }

    /// Diagnostic kind recorded when a non-fatal error is absorbed.
    pub fn diagnostic_kind(&self) -> Option<DiagnosticKind> {
        match self {
            Error::ExternalToolUnavailable(_) => Some(DiagnosticKind::ExternalToolUnavailable),
            Error::ExternalToolFailed(_) => Some(DiagnosticKind::ExternalToolFailed),
            _ => None,
        }
    }
}

/// Kind of a non-fatal problem reported alongside a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Unrecognized syntax fell back to plain text.
    ParseDegraded,
    /// A media reference could not be resolved.
    MediaMissing,
    /// A media reference points to a file type that cannot be embedded.
    MediaUnsupported,
    /// The external tool was not available; the built-in path was used.
    ExternalToolUnavailable,
    /// The external tool failed; the built-in path was used.
    ExternalToolFailed,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagnosticKind::ParseDegraded => "parse-degraded",
            DiagnosticKind::MediaMissing => "missing-media",
            DiagnosticKind::MediaUnsupported => "unsupported-media",
            DiagnosticKind::ExternalToolUnavailable => "external-tool-unavailable",
            DiagnosticKind::ExternalToolFailed => "external-tool-failed",
        };
        f.write_str(name)
    }
}

/// A non-fatal problem, optionally attached to a block by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// What went wrong
    pub kind: DiagnosticKind,

    /// Index of the affected block in the document, if any
    pub block: Option<usize>,

    /// Human-readable detail
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic that is not tied to a block.
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            block: None,
            message: message.into(),
        }
    }

    /// Attach the diagnostic to a block.
    pub fn at_block(mut self, index: usize) -> Self {
        self.block = Some(index);
        self
    }

    /// Build the diagnostic recorded for an absorbed external tool error.
    pub fn from_error(err: &Error) -> Option<Self> {
        err.diagnostic_kind()
            .map(|kind| Diagnostic::new(kind, err.to_string()))
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.block {
            Some(index) => write!(f, "[{}] block {}: {}", self.kind, index, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::VersionNotFound {
            lineage: "report".to_string(),
            sequence: 4,
        };
        assert_eq!(err.to_string(), "Version 4 not found in lineage 'report'");

        let err = Error::persistence(
            "out/report.docx",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("Failed to persist out/report.docx"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::ExternalToolUnavailable("pandoc".into()).is_fatal());
        assert!(!Error::ExternalToolFailed("exit 1".into()).is_fatal());
        assert!(Error::BuiltinConversionFailed("bad".into()).is_fatal());
        assert!(Error::Other("x".into()).is_fatal());
    }

    #[test]
    fn test_diagnostic_from_error() {
        let diag = Diagnostic::from_error(&Error::ExternalToolFailed("exit 2".into())).unwrap();
        assert_eq!(diag.kind, DiagnosticKind::ExternalToolFailed);
        assert!(diag.block.is_none());

        assert!(Diagnostic::from_error(&Error::Other("x".into())).is_none());
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::new(DiagnosticKind::MediaMissing, "img.png not found").at_block(3);
        assert_eq!(diag.to_string(), "[missing-media] block 3: img.png not found");
    }
}
