//! Block model for document content.
//!
//! This module defines the intermediate representation shared by the
//! Markdown and Word codecs: an ordered sequence of typed blocks made of
//! styled text runs. The model carries no format-specific detail.

mod block;
mod document;
mod media;
mod run;
mod table;

pub use block::{Block, ImageRef, MAX_HEADING_LEVEL};
pub use document::{Document, DocumentStats, Metadata};
pub use media::{ImageFormat, MediaRef};
pub use run::{coalesce_runs, plain_text, sanitize_text, TextRun, TextStyle};
pub use table::{Table, TableCell, TableRow};
