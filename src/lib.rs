//! # mdocx
//!
//! Bidirectional Markdown and Word (DOCX) conversion for Rust.
//!
//! Markdown text is parsed into a flat block model, image references are
//! normalized into a media directory next to the document, and a Word
//! package is written. Word packages are read back into the same model and
//! serialized as Markdown for editing. Every generated pair can be recorded
//! in an append-only version ledger.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mdocx::Mdocx;
//!
//! fn main() -> mdocx::Result<()> {
//!     let result = Mdocx::new()
//!         .with_document_name("report")
//!         .generate("# Quarterly report\n\n- revenue up\n", "out")?;
//!
//!     println!("{}", result.word_path.display());
//!     for diagnostic in &result.diagnostics {
//!         eprintln!("{}", diagnostic);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Two conversion paths**: pandoc when available, built-in codecs always
//! - **Media normalization**: images copied into `media/` under stable names
//! - **Version history**: immutable snapshots per document lineage
//! - **Atomic writes**: no half-written artifact is ever visible

pub mod convert;
pub mod detect;
pub mod error;
pub mod ledger;
pub mod media;
pub mod model;
pub mod ooxml;
pub mod parser;
pub mod persist;
pub mod render;

// Re-export commonly used types
pub use convert::{
    ConversionJob, ConversionPath, ConvertOptions, DocumentConverter, ExternalToolOptions,
    ExtractResult, GenerateResult, Pipeline, ReviseResult, Stage,
};
pub use detect::{detect_format_from_bytes, detect_format_from_path, is_docx, DocFormat};
pub use error::{Diagnostic, DiagnosticKind, Error, Result};
pub use ledger::{Lineage, SourceOperation, VersionEntry, VersionLedger};
pub use media::{MediaDir, NormalizeReport};
pub use model::{
    Block, Document, ImageFormat, ImageRef, MediaRef, Metadata, Table, TableCell, TableRow,
    TextRun, TextStyle,
};
pub use parser::{DocxReader, MarkdownParser, ParseOptions, Parsed};
pub use render::{DocxWriter, JsonFormat, RenderOptions};

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parse a Markdown or Word file into a document.
///
/// The format is detected from the extension, then the content.
///
/// # Example
///
/// ```no_run
/// use mdocx::parse_file;
///
/// let parsed = parse_file("report.docx").unwrap();
/// println!("Blocks: {}", parsed.document.len());
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Parsed> {
    let path = path.as_ref();
    match detect_format_from_path(path)? {
        DocFormat::Markdown => {
            let text = std::fs::read_to_string(path)?;
            Ok(MarkdownParser::default().parse(&text))
        }
        DocFormat::Docx => DocxReader::default().read_file(path),
    }
}

/// Convert a Markdown or Word file to Markdown text.
///
/// Images embedded in a Word file are not extracted; use
/// [`extract_to_markdown`] for that.
pub fn to_markdown<P: AsRef<Path>>(path: P) -> Result<String> {
    let parsed = parse_file(path)?;
    Ok(render::to_markdown(
        &parsed.document,
        &RenderOptions::default(),
    ))
}

/// Convert a Markdown or Word file to its JSON block model.
pub fn to_json<P: AsRef<Path>>(path: P, format: JsonFormat) -> Result<String> {
    let parsed = parse_file(path)?;
    render::to_json(&parsed.document, format)
}

/// Generate a Markdown and Word pair in `output_dir` with default options.
///
/// Images go to `<output_dir>/media`.
pub fn generate_from_markdown<P: AsRef<Path>>(text: &str, output_dir: P) -> Result<GenerateResult> {
    Mdocx::new().generate(text, output_dir)
}

/// Extract a Word file into Markdown with default options.
///
/// Images go to `<output_dir>/media`, and references in the returned text
/// are relative to `output_dir`.
pub fn extract_to_markdown<P: AsRef<Path>, Q: AsRef<Path>>(
    word_path: P,
    output_dir: Q,
) -> Result<ExtractResult> {
    Mdocx::new().extract(word_path, output_dir)
}

/// Record `revised_text` as a new version of `existing_markdown`.
pub fn revise<P: AsRef<Path>>(existing_markdown: P, revised_text: &str) -> Result<ReviseResult> {
    Mdocx::new().revise(existing_markdown, revised_text)
}

/// Builder-style entry point.
///
/// # Example
///
/// ```no_run
/// use mdocx::Mdocx;
/// use std::time::Duration;
///
/// let result = Mdocx::new()
///     .with_external_tool(true)
///     .with_timeout(Duration::from_secs(30))
///     .without_history()
///     .extract("contract.docx", "work")?;
/// println!("{}", result.markdown);
/// # Ok::<(), mdocx::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Mdocx {
    options: ConvertOptions,
}

impl Mdocx {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try pandoc before the built-in codecs.
    pub fn with_external_tool(mut self, enabled: bool) -> Self {
        self.options.external.enabled = enabled;
        self
    }

    /// Run a specific pandoc executable.
    pub fn with_pandoc(mut self, program: impl Into<PathBuf>) -> Self {
        self.options.external.program = Some(program.into());
        self
    }

    /// Bound each external tool invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.external.timeout = timeout;
        self
    }

    /// Name generated files `<name>.md` and `<name>.docx`.
    pub fn with_document_name(mut self, name: impl Into<String>) -> Self {
        self.options.document_name = Some(name.into());
        self
    }

    /// Use a media directory name other than `media`.
    pub fn with_media_dir_name(mut self, name: impl Into<String>) -> Self {
        self.options.media_dir_name = name.into();
        self
    }

    /// Keep version history in `dir`.
    pub fn with_versions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.versions_dir = Some(dir.into());
        self
    }

    /// Do not record generated documents in the version ledger.
    pub fn without_history(mut self) -> Self {
        self.options.record_versions = false;
        self
    }

    /// Set rendering options.
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.options.render = options;
        self
    }

    /// Set parse options.
    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.options.parse = options;
        self
    }

    /// Options collected so far.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Media directory of documents stored in `output_dir`.
    pub fn media_dir(&self, output_dir: &Path) -> MediaDir {
        MediaDir::with_base(output_dir.join(&self.options.media_dir_name), output_dir)
    }

    /// Build the pipeline.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.options.clone())
    }

    /// Generate a Markdown and Word pair in `output_dir`.
    pub fn generate<P: AsRef<Path>>(&self, text: &str, output_dir: P) -> Result<GenerateResult> {
        let media = self.media_dir(output_dir.as_ref());
        self.pipeline().generate_from_markdown(text, &media)
    }

    /// Extract a Word file, collecting its images under `output_dir`.
    pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        word_path: P,
        output_dir: Q,
    ) -> Result<ExtractResult> {
        let media = self.media_dir(output_dir.as_ref());
        self.pipeline()
            .extract_to_markdown(word_path.as_ref(), &media)
    }

    /// Record `revised_text` as a new version of `existing_markdown`.
    pub fn revise<P: AsRef<Path>>(
        &self,
        existing_markdown: P,
        revised_text: &str,
    ) -> Result<ReviseResult> {
        self.pipeline()
            .revise(existing_markdown.as_ref(), revised_text)
    }
}
