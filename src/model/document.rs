//! Document-level types.

use super::block::MAX_HEADING_LEVEL;
use super::run::{coalesce_runs, plain_text, sanitize_text, TextRun};
use super::Block;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document: blocks in top-to-bottom reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Blocks in reading order
    pub blocks: Vec<Block>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document from blocks.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            metadata: Metadata::default(),
            blocks,
        }
    }

    /// Add a block to the document.
    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Get the number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the document has any blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Title from metadata, or the text of the first heading.
    pub fn title(&self) -> Option<String> {
        if let Some(ref title) = self.metadata.title {
            return Some(title.clone());
        }
        self.blocks.iter().find_map(|b| match b {
            Block::Heading { runs, .. } => {
                let text = plain_text(runs).trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            _ => None,
        })
    }

    /// Image references in reading order, with their block index.
    pub fn images(&self) -> impl Iterator<Item = (usize, &super::ImageRef)> {
        self.blocks.iter().enumerate().filter_map(|(i, b)| match b {
            Block::Image(image) => Some((i, image)),
            _ => None,
        })
    }

    /// Check structural well-formedness without modifying anything.
    pub fn is_well_formed(&self) -> bool {
        self.blocks.iter().all(|b| match b {
            Block::Heading { level, .. } => (1..=MAX_HEADING_LEVEL).contains(level),
            Block::Table(table) => table.is_rectangular(),
            _ => true,
        })
    }

    /// Clamp malformed structure instead of rejecting it.
    ///
    /// Heading levels are clamped into 1..=6, ragged table rows are padded
    /// with empty cells, and control characters are stripped from run text.
    /// Returns the number of corrections made.
    pub fn validate(&mut self) -> usize {
        let mut fixes = 0;
        for block in &mut self.blocks {
            match block {
                Block::Heading { level, .. } => {
                    let clamped = (*level).clamp(1, MAX_HEADING_LEVEL);
                    if clamped != *level {
                        *level = clamped;
                        fixes += 1;
                    }
                }
                Block::Table(table) => {
                    fixes += table.pad_rows();
                    for cell in table.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
                        fixes += sanitize_runs(&mut cell.runs);
                    }
                }
                Block::Image(image) => {
                    if let Some(ref mut caption) = image.caption {
                        fixes += sanitize_runs(caption);
                    }
                }
                _ => {}
            }
            if let Some(runs) = block.runs_mut() {
                fixes += sanitize_runs(runs);
            }
        }
        fixes
    }

    /// Merge adjacent runs with identical formatting everywhere in the document.
    pub fn coalesce(&mut self) {
        for block in &mut self.blocks {
            match block {
                Block::Table(table) => {
                    for cell in table.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
                        cell.runs = coalesce_runs(std::mem::take(&mut cell.runs));
                    }
                }
                Block::Image(image) => {
                    if let Some(caption) = image.caption.take() {
                        let merged = coalesce_runs(caption);
                        image.caption = (!merged.is_empty()).then_some(merged);
                    }
                }
                _ => {}
            }
            if let Some(runs) = block.runs_mut() {
                *runs = coalesce_runs(std::mem::take(runs));
            }
        }
    }

    /// Consume the document and return it with runs merged.
    pub fn coalesced(mut self) -> Self {
        self.coalesce();
        self
    }

    /// Get plain text content of the entire document.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.plain_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Count blocks by kind and words.
    pub fn stats(&self) -> DocumentStats {
        let mut stats = DocumentStats::default();
        for block in &self.blocks {
            match block {
                Block::Heading { .. } => stats.heading_count += 1,
                Block::Paragraph { .. } => stats.paragraph_count += 1,
                Block::ListItem { .. } => stats.list_item_count += 1,
                Block::Quote { .. } => stats.quote_count += 1,
                Block::Table(_) => stats.table_count += 1,
                Block::CodeBlock { .. } => stats.code_block_count += 1,
                Block::Image(_) => stats.image_count += 1,
            }
            stats.count_text(&block.plain_text());
        }
        stats
    }
}

fn sanitize_runs(runs: &mut [TextRun]) -> usize {
    let mut fixes = 0;
    for run in runs {
        let clean = sanitize_text(&run.text);
        if clean != run.text {
            run.text = clean;
            fixes += 1;
        }
    }
    fixes
}

/// Document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Document author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Creation date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Block and word counts of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Number of headings
    pub heading_count: u32,

    /// Number of paragraphs
    pub paragraph_count: u32,

    /// Number of list items
    pub list_item_count: u32,

    /// Number of quoted paragraphs
    #[serde(default)]
    pub quote_count: u32,

    /// Number of tables
    pub table_count: u32,

    /// Number of code blocks
    pub code_block_count: u32,

    /// Number of images
    pub image_count: u32,

    /// Approximate word count (whitespace-separated tokens)
    pub word_count: u32,

    /// Character count (excluding whitespace)
    pub char_count: u32,
}

impl DocumentStats {
    /// Add word and character counts from text.
    pub fn count_text(&mut self, text: &str) {
        self.word_count += text.split_whitespace().count() as u32;
        self.char_count += text.chars().filter(|c| !c.is_whitespace()).count() as u32;
    }
}
