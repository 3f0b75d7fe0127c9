//! JSON rendering of the block model.

use crate::error::Result;
use crate::model::Document;

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

/// Convert a document to JSON.
pub fn to_json(doc: &Document, format: JsonFormat) -> Result<String> {
    let json = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(doc)?,
        JsonFormat::Compact => serde_json::to_string(doc)?,
    };
    Ok(json)
}

/// Read a document back from its JSON dump.
pub fn from_json(json: &str) -> Result<Document> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, TextRun};

    #[test]
    fn test_to_json_pretty() {
        let mut doc = Document::from_blocks(vec![Block::heading(1, "Test")]);
        doc.metadata.title = Some("Test".to_string());

        let json = to_json(&doc, JsonFormat::Pretty).unwrap();
        assert!(json.contains("\"title\""));
        assert!(json.contains("\"type\": \"heading\""));
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_to_json_compact() {
        let doc = Document::from_blocks(vec![Block::paragraph("Hello")]);
        let json = to_json(&doc, JsonFormat::Compact).unwrap();
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_plain_style_is_omitted() {
        let doc = Document::from_blocks(vec![Block::Paragraph {
            runs: vec![TextRun::new("a"), TextRun::bold("b")],
        }]);
        let json = to_json(&doc, JsonFormat::Compact).unwrap();
        assert_eq!(json.matches("\"style\"").count(), 1);
        assert_eq!(from_json(&json).unwrap(), doc);
    }
}
