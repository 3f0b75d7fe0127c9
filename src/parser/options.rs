//! Parsing options and configuration.

/// Options for reading Markdown and Word input.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Columns of indentation per list nesting level
    pub indent_unit: usize,

    /// Columns a tab counts for when measuring indentation
    pub tab_width: usize,

    /// Whether embedded Word images are copied into the media directory
    pub extract_images: bool,
}

impl ParseOptions {
    /// Create new parse options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the indentation width of one list level.
    pub fn with_indent_unit(mut self, columns: usize) -> Self {
        self.indent_unit = columns.max(1);
        self
    }

    /// Set the tab width.
    pub fn with_tab_width(mut self, columns: usize) -> Self {
        self.tab_width = columns.max(1);
        self
    }

    /// Enable or disable image extraction from Word documents.
    pub fn with_images(mut self, extract: bool) -> Self {
        self.extract_images = extract;
        self
    }

    /// List depth for a run of leading whitespace.
    pub fn depth_of(&self, indent: &str) -> u8 {
        let width: usize = indent
            .chars()
            .map(|c| if c == '\t' { self.tab_width } else { 1 })
            .sum();
        (width / self.indent_unit).min(u8::MAX as usize) as u8
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            indent_unit: 2,
            tab_width: 4,
            extract_images: true,
        }
    }
}
