//! Styled text runs.

use serde::{Deserialize, Serialize};

/// A run of text with consistent styling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    /// The text content
    pub text: String,

    /// Emphasis flags
    #[serde(default, skip_serializing_if = "TextStyle::is_plain")]
    pub style: TextStyle,

    /// Link target, if the run is part of a hyperlink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TextRun {
    /// Create a new text run with default style.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::default(),
            link: None,
        }
    }

    /// Create a run with the given style.
    pub fn styled(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
            link: None,
        }
    }

    /// Create a bold text run.
    pub fn bold(text: impl Into<String>) -> Self {
        Self::styled(text, TextStyle::BOLD)
    }

    /// Create an italic text run.
    pub fn italic(text: impl Into<String>) -> Self {
        Self::styled(text, TextStyle::ITALIC)
    }

    /// Create an inline code run.
    pub fn code(text: impl Into<String>) -> Self {
        Self::styled(text, TextStyle::CODE)
    }

    /// Set the link target and return self.
    pub fn with_link(mut self, target: impl Into<String>) -> Self {
        self.link = Some(target.into());
        self
    }

    /// Check if this run is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether `other` can be merged into this run without changing meaning.
    pub fn same_format(&self, other: &TextRun) -> bool {
        self.style == other.style && self.link == other.link
    }
}

/// Emphasis flags of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextStyle {
    /// Bold text
    #[serde(default)]
    pub bold: bool,

    /// Italic text
    #[serde(default)]
    pub italic: bool,

    /// Inline code (monospace)
    #[serde(default)]
    pub code: bool,
}

impl TextStyle {
    /// No emphasis.
    pub const PLAIN: TextStyle = TextStyle {
        bold: false,
        italic: false,
        code: false,
    };

    /// Bold only.
    pub const BOLD: TextStyle = TextStyle {
        bold: true,
        italic: false,
        code: false,
    };

    /// Italic only.
    pub const ITALIC: TextStyle = TextStyle {
        bold: false,
        italic: true,
        code: false,
    };

    /// Inline code only.
    pub const CODE: TextStyle = TextStyle {
        bold: false,
        italic: false,
        code: true,
    };

    /// Check if any styling is applied.
    pub fn has_styling(&self) -> bool {
        self.bold || self.italic || self.code
    }

    /// Inverse of [`has_styling`](Self::has_styling).
    pub fn is_plain(&self) -> bool {
        !self.has_styling()
    }
}

/// Concatenate the text of a run sequence.
pub fn plain_text(runs: &[TextRun]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect()
}

/// Merge adjacent runs with identical formatting and drop empty runs.
pub fn coalesce_runs(runs: Vec<TextRun>) -> Vec<TextRun> {
    let mut merged: Vec<TextRun> = Vec::with_capacity(runs.len());
    for run in runs {
        if run.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.same_format(&run) => last.text.push_str(&run.text),
            _ => merged.push(run),
        }
    }
    merged
}

/// Remove control characters from run text.
///
/// Tabs survive; line breaks become spaces since a run lives on one line.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\t' => Some(c),
            '\n' | '\r' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let runs = vec![
            TextRun::new("Hello "),
            TextRun::bold("world"),
            TextRun::new("!"),
        ];
        assert_eq!(plain_text(&runs), "Hello world!");
    }

    #[test]
    fn test_coalesce_runs() {
        let runs = vec![
            TextRun::new("a"),
            TextRun::new("b"),
            TextRun::bold("c"),
            TextRun::new(""),
            TextRun::bold("d"),
            TextRun::new("e").with_link("https://x"),
        ];
        let merged = coalesce_runs(runs);
        assert_eq!(
            merged,
            vec![
                TextRun::new("ab"),
                TextRun::bold("cd"),
                TextRun::new("e").with_link("https://x"),
            ]
        );
    }

    #[test]
    fn test_text_style() {
        assert!(!TextStyle::default().has_styling());
        assert!(TextStyle::BOLD.has_styling());
        assert!(TextStyle::PLAIN.is_plain());
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("a\u{0007}b\tc\nd"), "ab\tc d");
    }
}
