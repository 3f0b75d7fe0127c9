//! WordprocessingML package constants and the paragraph style table.
//!
//! Shared by the Word writer and reader: part names, namespaces and the
//! explicit mapping from known style identifiers to block kinds.

use std::borrow::Cow;

/// Main WordprocessingML namespace.
pub const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
/// Relationship attribute namespace used in document parts.
pub const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
/// Package relationships part namespace.
pub const NS_PACKAGE_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

pub const PART_CORE: &str = "docProps/core.xml";
pub const PART_DOCUMENT: &str = "word/document.xml";
pub const PART_DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
pub const PART_STYLES: &str = "word/styles.xml";
pub const PART_NUMBERING: &str = "word/numbering.xml";

const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Relationship kinds used inside `word/document.xml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    Styles,
    Numbering,
    Image,
    Hyperlink,
}

impl RelKind {
    /// Full relationship type URI.
    pub fn uri(self) -> String {
        let name = match self {
            RelKind::Styles => "styles",
            RelKind::Numbering => "numbering",
            RelKind::Image => "image",
            RelKind::Hyperlink => "hyperlink",
        };
        format!("{}/{}", REL_BASE, name)
    }

    /// Match a relationship type URI, ignoring the namespace variant.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.rsplit('/').next()? {
            "styles" => Some(RelKind::Styles),
            "numbering" => Some(RelKind::Numbering),
            "image" => Some(RelKind::Image),
            "hyperlink" => Some(RelKind::Hyperlink),
            _ => None,
        }
    }
}

/// English Metric Units per inch.
pub const EMU_PER_INCH: f64 = 914_400.0;

/// Text width of a Letter page with one-inch margins, in twentieths of a point.
pub const TEXT_WIDTH_TWIPS: u32 = 9360;

/// Style ids written by the builder.
pub mod style_id {
    pub const LIST_BULLET: &str = "ListBullet";
    pub const LIST_NUMBER: &str = "ListNumber";
    pub const QUOTE: &str = "Quote";
    pub const SOURCE_CODE: &str = "SourceCode";
    pub const VERBATIM_CHAR: &str = "VerbatimChar";
    pub const CAPTION: &str = "Caption";
    pub const HYPERLINK: &str = "Hyperlink";
    pub const TABLE_GRID: &str = "TableGrid";

    /// Heading style id for a level.
    pub fn heading(level: u8) -> String {
        format!("Heading{}", level)
    }
}

/// What a paragraph style stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleClass {
    /// Heading of the given level
    Heading(u8),
    /// Bulleted list paragraph at the given depth
    ListBullet(u8),
    /// Numbered list paragraph at the given depth
    ListNumber(u8),
    /// Generic list paragraph; numbering properties decide the rest
    ListParagraph,
    /// Monospace code paragraph
    Code,
    /// Figure or table caption
    Caption,
    /// Block quotation
    Quote,
    /// Anything else
    Normal,
}

/// Known paragraph styles, keyed by normalized style id or name.
const STYLE_TABLE: &[(&str, StyleClass)] = &[
    ("heading1", StyleClass::Heading(1)),
    ("heading2", StyleClass::Heading(2)),
    ("heading3", StyleClass::Heading(3)),
    ("heading4", StyleClass::Heading(4)),
    ("heading5", StyleClass::Heading(5)),
    ("heading6", StyleClass::Heading(6)),
    ("heading7", StyleClass::Heading(7)),
    ("heading8", StyleClass::Heading(8)),
    ("heading9", StyleClass::Heading(9)),
    ("title", StyleClass::Heading(1)),
    ("subtitle", StyleClass::Heading(2)),
    ("listbullet", StyleClass::ListBullet(0)),
    ("listbullet2", StyleClass::ListBullet(1)),
    ("listbullet3", StyleClass::ListBullet(2)),
    ("listbullet4", StyleClass::ListBullet(3)),
    ("listbullet5", StyleClass::ListBullet(4)),
    ("listnumber", StyleClass::ListNumber(0)),
    ("listnumber2", StyleClass::ListNumber(1)),
    ("listnumber3", StyleClass::ListNumber(2)),
    ("listnumber4", StyleClass::ListNumber(3)),
    ("listnumber5", StyleClass::ListNumber(4)),
    ("listparagraph", StyleClass::ListParagraph),
    ("sourcecode", StyleClass::Code),
    ("code", StyleClass::Code),
    ("htmlpreformatted", StyleClass::Code),
    ("plaintext", StyleClass::Code),
    ("caption", StyleClass::Caption),
    ("imagecaption", StyleClass::Caption),
    ("tablecaption", StyleClass::Caption),
    ("quote", StyleClass::Quote),
    ("intensequote", StyleClass::Quote),
    ("blocktext", StyleClass::Quote),
];

/// Character styles that mark inline code.
const CODE_CHAR_STYLES: &[&str] = &["verbatimchar", "htmlcode", "sourcecodechar", "codechar"];

/// Fonts treated as monospace when no character style says so.
const MONOSPACE_FONTS: &[&str] = &[
    "courier",
    "couriernew",
    "consolas",
    "menlo",
    "monaco",
    "lucidaconsole",
    "sourcecodepro",
    "dejavusansmono",
];

fn normalize_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Classify a paragraph style id or display name.
pub fn classify_style(name: &str) -> StyleClass {
    let key = normalize_key(name);
    STYLE_TABLE
        .iter()
        .find(|(known, _)| *known == key)
        .map_or(StyleClass::Normal, |(_, class)| *class)
}

/// Whether a character style marks inline code.
pub fn is_code_char_style(name: &str) -> bool {
    CODE_CHAR_STYLES.contains(&normalize_key(name).as_str())
}

/// Whether a font family is monospace.
pub fn is_monospace_font(font: &str) -> bool {
    MONOSPACE_FONTS.contains(&normalize_key(font).as_str())
}

/// Escape text for XML content and attribute values.
///
/// Characters not allowed in XML 1.0 are dropped.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    let clean = |c: char| matches!(c, '\t' | '\n' | '\r') || !c.is_control();
    if !text.chars().any(|c| matches!(c, '&' | '<' | '>' | '"' | '\'') || !clean(c)) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if clean(c) => out.push(c),
            _ => {}
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_style() {
        assert_eq!(classify_style("Heading2"), StyleClass::Heading(2));
        assert_eq!(classify_style("heading 3"), StyleClass::Heading(3));
        assert_eq!(classify_style("Title"), StyleClass::Heading(1));
        assert_eq!(classify_style("List Bullet 2"), StyleClass::ListBullet(1));
        assert_eq!(classify_style("ListNumber"), StyleClass::ListNumber(0));
        assert_eq!(classify_style("Source Code"), StyleClass::Code);
        assert_eq!(classify_style("HTML Preformatted"), StyleClass::Code);
        assert_eq!(classify_style("Image Caption"), StyleClass::Caption);
        assert_eq!(classify_style("Intense Quote"), StyleClass::Quote);
        assert_eq!(classify_style("Block Text"), StyleClass::Quote);
        assert_eq!(classify_style("BodyText"), StyleClass::Normal);
        assert_eq!(classify_style(""), StyleClass::Normal);
    }

    #[test]
    fn test_code_styles_and_fonts() {
        assert!(is_code_char_style("VerbatimChar"));
        assert!(is_code_char_style("HTML Code"));
        assert!(!is_code_char_style("Strong"));
        assert!(is_monospace_font("Courier New"));
        assert!(is_monospace_font("Consolas"));
        assert!(!is_monospace_font("Calibri"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("plain"), "plain");
        assert!(matches!(escape_xml("plain"), Cow::Borrowed(_)));
        assert_eq!(escape_xml("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(escape_xml("bell\u{0007}\tok"), "bell\tok");
    }

    #[test]
    fn test_rel_kind_uri() {
        assert_eq!(RelKind::from_uri(&RelKind::Image.uri()), Some(RelKind::Image));
        assert_eq!(
            RelKind::from_uri("http://purl.oclc.org/ooxml/officeDocument/relationships/hyperlink"),
            Some(RelKind::Hyperlink)
        );
        assert_eq!(RelKind::from_uri("http://example.com/other"), None);
    }
}
