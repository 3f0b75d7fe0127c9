//! Parsing module: Markdown text and Word packages into the block model.

mod docx;
mod inline;
mod markdown;
mod options;

pub use docx::DocxReader;
pub use inline::parse_inline;
pub use markdown::MarkdownParser;
pub(crate) use markdown::fenced_lines;
pub use options::ParseOptions;

use crate::error::Diagnostic;
use crate::model::Document;

/// A parsed document together with the non-fatal problems found on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    /// The document
    pub document: Document,

    /// Degraded constructs and unresolved media
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse Markdown text with default options, discarding diagnostics.
pub fn parse_markdown(text: &str) -> Document {
    MarkdownParser::default().parse(text).document
}

/// Parse Markdown text with default options.
pub fn parse_markdown_with_diagnostics(text: &str) -> Parsed {
    MarkdownParser::default().parse(text)
}
