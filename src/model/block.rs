//! Block-level types.

use super::run::{plain_text, TextRun};
use super::Table;
use serde::{Deserialize, Serialize};

/// Highest heading level representable in both formats.
pub const MAX_HEADING_LEVEL: u8 = 6;

/// One structural unit of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Heading of level 1..=6
    Heading {
        /// Heading level
        level: u8,
        /// Heading text
        runs: Vec<TextRun>,
    },

    /// Normal paragraph
    Paragraph {
        /// Paragraph text
        runs: Vec<TextRun>,
    },

    /// One item of an ordered or unordered list
    ListItem {
        /// Numbered (`1.`) rather than bulleted (`-`)
        ordered: bool,
        /// Nesting level (0 = top level)
        depth: u8,
        /// Item text
        runs: Vec<TextRun>,
    },

    /// Quoted paragraph
    Quote {
        /// Quoted text
        runs: Vec<TextRun>,
    },

    /// Table
    Table(Table),

    /// Verbatim code, line breaks preserved
    CodeBlock {
        /// Info string of the fence
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        /// Raw code text
        code: String,
    },

    /// Reference to a media file
    Image(ImageRef),
}

impl Block {
    /// Create a heading block.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level,
            runs: vec![TextRun::new(text)],
        }
    }

    /// Create a paragraph with plain text.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph {
            runs: vec![TextRun::new(text)],
        }
    }

    /// Create a paragraph from styled runs.
    pub fn paragraph_runs(runs: Vec<TextRun>) -> Self {
        Block::Paragraph { runs }
    }

    /// Create a bulleted list item.
    pub fn bullet(depth: u8, text: impl Into<String>) -> Self {
        Block::ListItem {
            ordered: false,
            depth,
            runs: vec![TextRun::new(text)],
        }
    }

    /// Create a numbered list item.
    pub fn numbered(depth: u8, text: impl Into<String>) -> Self {
        Block::ListItem {
            ordered: true,
            depth,
            runs: vec![TextRun::new(text)],
        }
    }

    /// Create a quoted paragraph with plain text.
    pub fn quote(text: impl Into<String>) -> Self {
        Block::Quote {
            runs: vec![TextRun::new(text)],
        }
    }

    /// Create a code block.
    pub fn code(language: Option<&str>, code: impl Into<String>) -> Self {
        Block::CodeBlock {
            language: language.map(str::to_string),
            code: code.into(),
        }
    }

    /// Create an image reference without caption.
    pub fn image(source: impl Into<String>) -> Self {
        Block::Image(ImageRef::new(source))
    }

    /// Styled runs of the block, for the variants that carry them.
    pub fn runs(&self) -> Option<&[TextRun]> {
        match self {
            Block::Heading { runs, .. }
            | Block::Paragraph { runs }
            | Block::ListItem { runs, .. }
            | Block::Quote { runs } => Some(runs),
            _ => None,
        }
    }

    /// Mutable access to the runs of the block.
    pub fn runs_mut(&mut self) -> Option<&mut Vec<TextRun>> {
        match self {
            Block::Heading { runs, .. }
            | Block::Paragraph { runs }
            | Block::ListItem { runs, .. }
            | Block::Quote { runs } => Some(runs),
            _ => None,
        }
    }

    /// Get plain text content of the block.
    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading { runs, .. }
            | Block::Paragraph { runs }
            | Block::ListItem { runs, .. }
            | Block::Quote { runs } => plain_text(runs),
            Block::Table(table) => table.plain_text(),
            Block::CodeBlock { code, .. } => code.clone(),
            Block::Image(image) => image
                .caption
                .as_deref()
                .map(plain_text)
                .unwrap_or_default(),
        }
    }

    /// Short name of the block type, used in logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Heading { .. } => "heading",
            Block::Paragraph { .. } => "paragraph",
            Block::ListItem { .. } => "list_item",
            Block::Quote { .. } => "quote",
            Block::Table(_) => "table",
            Block::CodeBlock { .. } => "code_block",
            Block::Image(_) => "image",
        }
    }
}

/// Reference to an image file as written in the document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path as written (relative to the document's location, or absolute)
    pub source: String,

    /// Optional caption (the alt text in Markdown)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<Vec<TextRun>>,
}

impl ImageRef {
    /// Create an image reference.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            caption: None,
        }
    }

    /// Set a plain-text caption and return self.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(vec![TextRun::new(caption)]);
        self
    }

    /// Whether the source points to a remote resource rather than a file.
    pub fn is_remote(&self) -> bool {
        let lower = self.source.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
    }
}
