//! Markdown rendering of the block model.

use crate::model::{sanitize_text, Block, Document, ImageRef, Table, TextRun, TextStyle, MAX_HEADING_LEVEL};

use super::RenderOptions;
use std::borrow::Cow;

/// Convert a document to Markdown.
pub fn to_markdown(doc: &Document, options: &RenderOptions) -> String {
    MarkdownRenderer::new(options.clone()).render(doc)
}

/// Markdown renderer.
///
/// Output uses `\n` line endings, separates blocks with one blank line
/// (consecutive list items with a single newline) and ends with a newline.
pub struct MarkdownRenderer {
    options: RenderOptions,
    counters: Vec<u32>,
}

impl MarkdownRenderer {
    /// Create a new Markdown renderer.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            counters: Vec::new(),
        }
    }

    /// Render a document to Markdown.
    pub fn render(mut self, doc: &Document) -> String {
        let mut output = String::new();
        let mut previous_was_list = false;

        for block in &doc.blocks {
            let Some(rendered) = self.render_block(block) else {
                continue;
            };
            let is_list = matches!(block, Block::ListItem { .. });
            if !output.is_empty() {
                output.push_str(if is_list && previous_was_list { "\n" } else { "\n\n" });
            }
            output.push_str(&rendered);
            previous_was_list = is_list;
        }

        if !output.is_empty() {
            output.push('\n');
        }
        output
    }

    fn render_block(&mut self, block: &Block) -> Option<String> {
        if !matches!(block, Block::ListItem { .. }) {
            self.counters.clear();
        }

        match block {
            Block::Heading { level, runs } => {
                let hashes = "#".repeat((*level).clamp(1, MAX_HEADING_LEVEL) as usize);
                let text = render_runs(runs, false);
                if text.is_empty() {
                    Some(hashes)
                } else {
                    Some(format!("{} {}", hashes, text))
                }
            }
            Block::Paragraph { runs } => {
                let text = render_runs(runs, false);
                (!text.trim().is_empty()).then(|| escape_line_start(&text))
            }
            Block::ListItem {
                ordered,
                depth,
                runs,
            } => Some(self.render_list_item(*ordered, *depth, runs)),
            Block::Quote { runs } => {
                let text = render_runs(runs, false);
                if text.is_empty() {
                    Some(">".to_string())
                } else {
                    Some(format!("> {}", text))
                }
            }
            Block::Table(table) => render_table(table),
            Block::CodeBlock { language, code } => Some(render_code_block(language.as_deref(), code)),
            Block::Image(image) => Some(render_image(image)),
        }
    }

    fn render_list_item(&mut self, ordered: bool, depth: u8, runs: &[TextRun]) -> String {
        let depth = depth as usize;
        self.counters.resize(depth + 1, 0);
        let marker = if ordered {
            self.counters[depth] += 1;
            format!("{}.", self.counters[depth])
        } else {
            self.counters[depth] = 0;
            self.options.list_marker.to_string()
        };

        let indent = " ".repeat(depth * self.options.indent_unit);
        let text = render_runs(runs, false);
        if text.is_empty() {
            format!("{}{}", indent, marker)
        } else {
            format!("{}{} {}", indent, marker, text)
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Bold,
    Italic,
}

impl Marker {
    fn as_str(self) -> &'static str {
        match self {
            Marker::Bold => "**",
            Marker::Italic => "*",
        }
    }

    fn wanted(self, style: TextStyle) -> bool {
        match self {
            Marker::Bold => style.bold,
            Marker::Italic => style.italic,
        }
    }
}

/// A delimiter run at the end of the output, not yet followed by text.
#[derive(Debug, Clone, Copy)]
struct DelimRun {
    start: usize,
    opens: bool,
    closes: bool,
}

/// Render styled runs as inline Markdown.
///
/// Emphasis markers are kept open across runs that share them. Link groups
/// are rendered with all outer markers closed.
fn render_runs(runs: &[TextRun], in_cell: bool) -> String {
    let mut out = String::new();
    let mut open: Vec<Marker> = Vec::new();
    let mut i = 0;

    while i < runs.len() {
        let run = &runs[i];
        if let Some(ref target) = run.link {
            close_markers(&mut out, &mut open, 0);
            let end = runs[i..]
                .iter()
                .position(|r| r.link.as_ref() != Some(target))
                .map_or(runs.len(), |p| i + p);
            let label: Vec<TextRun> = runs[i..end]
                .iter()
                .map(|r| TextRun::styled(r.text.clone(), r.style))
                .collect();
            // `![` would start an image.
            if out.ends_with('!') {
                out.insert(out.len() - 1, '\\');
            }
            out.push('[');
            out.push_str(&render_runs(&label, in_cell));
            out.push_str("](");
            out.push_str(&link_target(target));
            out.push(')');
            i = end;
            continue;
        }

        let text = sanitize_text(&run.text);
        if text.is_empty() {
            i += 1;
            continue;
        }

        // Whitespace needs no emphasis of its own.
        if !run.style.code && text.trim().is_empty() {
            out.push_str(&text);
            i += 1;
            continue;
        }

        let mut delims = None;
        if let Some(pos) = open.iter().position(|m| !m.wanted(run.style)) {
            delims = close_markers(&mut out, &mut open, pos);
        }

        let body = if run.style.code {
            code_span(&text, in_cell)
        } else {
            escape_markdown(&text, in_cell)
        };
        let leading = body.len() - body.trim_start().len();
        if leading > 0 {
            out.push_str(&body[..leading]);
            delims = None;
        }
        for marker in [Marker::Bold, Marker::Italic] {
            if marker.wanted(run.style) && !open.contains(&marker) {
                let delim = delims.get_or_insert(DelimRun {
                    start: out.len(),
                    opens: false,
                    closes: false,
                });
                delim.opens = true;
                out.push_str(marker.as_str());
                open.push(marker);
            }
        }
        let content = &body[leading..];
        match delims {
            Some(delim) => {
                let content = keep_flanking(&mut out, delim, content);
                out.push_str(&content);
            }
            None => out.push_str(content),
        }
        i += 1;
    }

    close_markers(&mut out, &mut open, 0);
    out
}

/// Close markers from the top of the stack down to `keep`, moving trailing
/// whitespace outside the closers.
///
/// Returns the closers when they end the output.
fn close_markers(out: &mut String, open: &mut Vec<Marker>, keep: usize) -> Option<DelimRun> {
    if open.len() <= keep {
        return None;
    }
    let trimmed = out.trim_end().len();
    let trailing = out.split_off(trimmed);
    let start = out.len();
    while open.len() > keep {
        if let Some(marker) = open.pop() {
            out.push_str(marker.as_str());
        }
    }
    out.push_str(&trailing);
    trailing.is_empty().then_some(DelimRun {
        start,
        opens: false,
        closes: true,
    })
}

fn is_punct(c: char) -> bool {
    c.is_ascii_punctuation()
}

/// Make the delimiter run ending `out` flank the way it is used.
///
/// A closer between punctuation and a word character is not right-flanking,
/// and an opener between a word character and punctuation is not
/// left-flanking. Writing the outer word character as a numeric character
/// reference puts punctuation on that side instead.
fn keep_flanking<'a>(out: &mut String, run: DelimRun, content: &'a str) -> Cow<'a, str> {
    let Some(after) = content.chars().next() else {
        return Cow::Borrowed(content);
    };
    let before = out[..run.start].chars().next_back();
    let word = |c: char| !c.is_whitespace() && !is_punct(c);

    if run.closes && before.is_some_and(is_punct) && word(after) {
        return Cow::Owned(format!(
            "{}{}",
            char_reference(after),
            &content[after.len_utf8()..]
        ));
    }
    if run.opens && is_punct(after) {
        if let Some(before) = before.filter(|&c| word(c)) {
            out.replace_range(run.start - before.len_utf8()..run.start, &char_reference(before));
        }
    }
    Cow::Borrowed(content)
}

fn char_reference(c: char) -> String {
    format!("&#{};", u32::from(c))
}

fn code_span(text: &str, in_cell: bool) -> String {
    let longest = longest_run(text, '`');
    let fence = "`".repeat(longest + 1);
    let text = if in_cell {
        text.replace('|', "\\|")
    } else {
        text.to_string()
    };
    let pad = text.starts_with('`')
        || text.ends_with('`')
        || (text.starts_with(' ') && text.ends_with(' ') && !text.trim().is_empty());
    if pad {
        format!("{} {} {}", fence, text, fence)
    } else {
        format!("{}{}{}", fence, text, fence)
    }
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Escape characters that would be read back as inline syntax.
fn escape_markdown(text: &str, in_cell: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let escape = match c {
            '\\' | '`' | '*' | '[' | ']' => true,
            '&' => looks_like_reference(&chars[i + 1..]),
            '|' => in_cell,
            // Intraword underscores are never emphasis.
            '_' => {
                let before = i.checked_sub(1).and_then(|p| chars.get(p));
                let after = chars.get(i + 1);
                !(before.is_some_and(|b| b.is_alphanumeric())
                    && after.is_some_and(|a| a.is_alphanumeric()))
            }
            _ => false,
        };
        if escape {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// Whether `&` followed by `rest` reads as a character reference.
fn looks_like_reference(rest: &[char]) -> bool {
    let name = rest
        .iter()
        .take_while(|c| c.is_ascii_alphanumeric() || **c == '#')
        .count();
    name > 0 && rest.get(name) == Some(&';')
}

/// Escape a paragraph start that would otherwise parse as another block.
fn escape_line_start(text: &str) -> String {
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && text[digits..].starts_with('.') {
        return format!("{}\\{}", &text[..digits], &text[digits..]);
    }
    match text.chars().next() {
        Some('#' | '-' | '+' | '>' | '<' | '~' | '=') => format!("\\{}", text),
        _ => text.to_string(),
    }
}

fn link_target(target: &str) -> String {
    if needs_angle_brackets(target) {
        format!("<{}>", target)
    } else {
        target.to_string()
    }
}

fn needs_angle_brackets(path: &str) -> bool {
    path.is_empty() || path.chars().any(|c| c.is_whitespace() || c == '(' || c == ')')
}

fn render_table(table: &Table) -> Option<String> {
    let columns = table.column_count();
    if columns == 0 {
        return None;
    }

    let mut lines = Vec::with_capacity(table.row_count() + 1);
    for (i, row) in table.rows.iter().enumerate() {
        let mut line = String::from("|");
        for col in 0..columns {
            let content = row
                .cells
                .get(col)
                .map(|cell| render_runs(&cell.runs, true))
                .unwrap_or_default();
            line.push(' ');
            line.push_str(content.trim());
            line.push_str(" |");
        }
        lines.push(line);

        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(columns)));
        }
    }
    Some(lines.join("\n"))
}

fn render_code_block(language: Option<&str>, code: &str) -> String {
    let language = language.unwrap_or("").trim();
    let marker = if language.contains('`') { '~' } else { '`' };
    let fence = marker.to_string().repeat(longest_run(code, marker).max(2) + 1);
    if code.is_empty() {
        format!("{}{}\n{}", fence, language, fence)
    } else {
        format!("{}{}\n{}\n{}", fence, language, code, fence)
    }
}

fn render_image(image: &ImageRef) -> String {
    let caption = image
        .caption
        .as_deref()
        .map(|runs| render_runs(runs, false))
        .unwrap_or_default();
    format!("![{}]({})", caption, link_target(&image.source))
}
