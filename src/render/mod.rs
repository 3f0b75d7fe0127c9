//! Rendering module for writing documents to Markdown, Word and JSON.

mod docx;
mod json;
mod markdown;
mod options;

pub use docx::{to_docx, DocxPackage, DocxWriter};
pub use json::{from_json, to_json, JsonFormat};
pub use markdown::{to_markdown, MarkdownRenderer};
pub use options::RenderOptions;
