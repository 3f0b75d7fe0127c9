//! Rendering options and configuration.

/// Options for writing Markdown and Word output.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Character to use for unordered list markers
    pub list_marker: char,

    /// Spaces of indentation per list nesting level
    pub indent_unit: usize,

    /// Width of embedded images in inches
    pub image_width_inches: f64,

    /// Font used for code blocks and inline code in Word output
    pub code_font: String,

    /// Title written to the Word package properties.
    /// Defaults to the document's own title.
    pub title: Option<String>,
}

impl RenderOptions {
    /// Create new render options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the list marker character (`-` or `*`).
    pub fn with_list_marker(mut self, marker: char) -> Self {
        if matches!(marker, '-' | '*') {
            self.list_marker = marker;
        }
        self
    }

    /// Set the indentation width of one list level.
    pub fn with_indent_unit(mut self, spaces: usize) -> Self {
        self.indent_unit = spaces.max(1);
        self
    }

    /// Set the default image width.
    pub fn with_image_width(mut self, inches: f64) -> Self {
        if inches.is_finite() && inches > 0.0 {
            self.image_width_inches = inches;
        }
        self
    }

    /// Set the monospace font.
    pub fn with_code_font(mut self, font: impl Into<String>) -> Self {
        self.code_font = font.into();
        self
    }

    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            list_marker: '-',
            indent_unit: 2,
            image_width_inches: 5.0,
            code_font: "Courier New".to_string(),
            title: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_options_builder() {
        let options = RenderOptions::new()
            .with_list_marker('*')
            .with_indent_unit(4)
            .with_image_width(3.5)
            .with_code_font("Consolas")
            .with_title("Report");

        assert_eq!(options.list_marker, '*');
        assert_eq!(options.indent_unit, 4);
        assert_eq!(options.image_width_inches, 3.5);
        assert_eq!(options.code_font, "Consolas");
        assert_eq!(options.title.as_deref(), Some("Report"));
    }

    #[test]
    fn test_invalid_values_ignored() {
        let options = RenderOptions::new()
            .with_list_marker('+')
            .with_image_width(-1.0)
            .with_indent_unit(0);

        assert_eq!(options.list_marker, '-');
        assert_eq!(options.image_width_inches, 5.0);
        assert_eq!(options.indent_unit, 1);
    }
}
