//! Markdown parser.
//!
//! A single left-to-right scan over lines. Each line (or run of lines) is
//! classified into exactly one block with a fixed precedence: code fences,
//! headings, tables, thematic breaks, list items, quotes, then paragraphs.
//! Anything unrecognized ends up as paragraph text, so parsing never fails.

use super::inline::parse_inline;
use super::{ParseOptions, Parsed};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::model::{Block, Document, ImageRef, Table, TableCell, TableRow, TextRun};
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ {0,3}(#+)(?:[ \t]+(.*?))?[ \t]*$").unwrap())
}

fn list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([ \t]*)([-*]|\d{1,9}\.)(?:[ \t]+(.*?))?[ \t]*$").unwrap())
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})[ \t]*(.*?)[ \t]*$").unwrap())
}

fn quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ {0,3}>[ \t]?(.*?)[ \t]*$").unwrap())
}

fn separator_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^:?-+:?$").unwrap())
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"!\[((?:\\.|[^\]\\])*)\]\([ \t]*(<[^>]*>|[^\s)]+)(?:[ \t]+"[^"]*")?[ \t]*\)"#)
            .unwrap()
    })
}

/// Markdown parser.
pub struct MarkdownParser {
    options: ParseOptions,
}

impl MarkdownParser {
    /// Create a parser with the given options.
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parse Markdown text into a document.
    ///
    /// Never fails. Constructs that fall back to plain text are reported as
    /// [`DiagnosticKind::ParseDegraded`].
    pub fn parse(&self, text: &str) -> Parsed {
        let mut state = ScanState::default();
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if line.trim().is_empty() {
                i += 1;
                continue;
            }

            if let Some(fence) = Fence::open(line) {
                i = self.code_block(&lines, i, fence, &mut state);
                continue;
            }

            if let Some(caps) = heading_re().captures(line) {
                let hashes = caps[1].len();
                let text = caps.get(2).map_or("", |m| m.as_str());
                if hashes <= 6 {
                    let (text, images) = take_images(text);
                    state.push(Block::Heading {
                        level: hashes as u8,
                        runs: parse_inline(&text),
                    });
                    state.displaced(images, "heading");
                    i += 1;
                    continue;
                }
                if caps.get(2).is_some() {
                    state.degraded(line, "heading deeper than level 6");
                    i += 1;
                    continue;
                }
            }

            if is_table_row(line) && lines.get(i + 1).is_some_and(|next| is_separator_row(next)) {
                i = self.table(&lines, i, &mut state);
                continue;
            }

            if is_thematic_break(line) {
                state.degraded(line, "thematic break");
                i += 1;
                continue;
            }

            if let Some(caps) = list_re().captures(line) {
                let depth = self.options.depth_of(&caps[1]);
                let ordered = caps[2].ends_with('.');
                let (text, images) = take_images(caps.get(3).map_or("", |m| m.as_str()));
                state.push(Block::ListItem {
                    ordered,
                    depth,
                    runs: parse_inline(&text),
                });
                state.displaced(images, "list item");
                i += 1;
                continue;
            }

            if let Some(caps) = quote_re().captures(line) {
                let (text, images) = take_images(caps.get(1).map_or("", |m| m.as_str()));
                state.push(Block::Quote {
                    runs: parse_inline(&text),
                });
                state.displaced(images, "quote");
                i += 1;
                continue;
            }

            let trimmed = line.trim();
            if is_html_line(trimmed) {
                state.degraded(line, "HTML block");
            } else {
                paragraph_line(trimmed, &mut state);
            }
            i += 1;
        }

        Parsed {
            document: Document::from_blocks(state.blocks),
            diagnostics: state.diagnostics,
        }
    }

    /// Consume a fenced code block; returns the index of the first line after it.
    fn code_block(&self, lines: &[&str], start: usize, fence: Fence, state: &mut ScanState) -> usize {
        let mut body = Vec::new();
        let mut i = start + 1;
        let mut closed = false;

        while i < lines.len() {
            if fence.is_closed_by(lines[i]) {
                closed = true;
                i += 1;
                break;
            }
            body.push(lines[i]);
            i += 1;
        }

        let index = state.push(Block::CodeBlock {
            language: fence.language,
            code: body.join("\n"),
        });
        if !closed {
            state.diagnose(
                Diagnostic::new(DiagnosticKind::ParseDegraded, "unterminated code fence")
                    .at_block(index),
            );
        }
        i
    }

    /// Consume a table starting at a header row.
    fn table(&self, lines: &[&str], start: usize, state: &mut ScanState) -> usize {
        let mut table = Table::new();
        let mut images = Vec::new();
        table.add_row(parse_row(lines[start], &mut images));

        let mut i = start + 2;
        while i < lines.len() && !lines[i].trim().is_empty() && is_table_row(lines[i]) {
            table.add_row(parse_row(lines[i], &mut images));
            i += 1;
        }

        // The separator row sets a minimum width.
        let separator_width = split_cells(lines[start + 1]).len();
        if let Some(first) = table.rows.first_mut() {
            while first.cells.len() < separator_width {
                first.cells.push(TableCell::empty());
            }
        }
        table.pad_rows();
        state.push(Block::Table(table));
        state.displaced(images, "table cell");
        i
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

#[derive(Default)]
struct ScanState {
    blocks: Vec<Block>,
    diagnostics: Vec<Diagnostic>,
}

impl ScanState {
    fn push(&mut self, block: Block) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    fn diagnose(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// Place images found inside another block right after it.
    fn displaced(&mut self, images: Vec<ImageRef>, inside: &str) {
        for image in images {
            let index = self.push(Block::Image(image));
            self.diagnose(
                Diagnostic::new(
                    DiagnosticKind::ParseDegraded,
                    format!("image inside a {} moved after it", inside),
                )
                .at_block(index),
            );
        }
    }

    /// Keep the raw line as paragraph text and report it.
    fn degraded(&mut self, line: &str, what: &str) {
        let index = self.push(Block::Paragraph {
            runs: vec![TextRun::new(line.trim())],
        });
        self.diagnose(
            Diagnostic::new(
                DiagnosticKind::ParseDegraded,
                format!("{} kept as plain text", what),
            )
            .at_block(index),
        );
    }
}

struct Fence {
    marker: char,
    len: usize,
    language: Option<String>,
}

impl Fence {
    fn open(line: &str) -> Option<Fence> {
        let caps = fence_re().captures(line)?;
        let run = &caps[1];
        let info = caps.get(2).map_or("", |m| m.as_str());
        let marker = run.chars().next()?;
        if marker == '`' && info.contains('`') {
            return None;
        }
        let language = info.split_whitespace().next().map(str::to_string);
        Some(Fence {
            marker,
            len: run.chars().count(),
            language,
        })
    }

    fn is_closed_by(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let run = trimmed.chars().take_while(|&c| c == self.marker).count();
        run >= self.len && trimmed.chars().count() == run
    }
}

fn is_thematic_break(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(marker) = trimmed.chars().next() else {
        return false;
    };
    matches!(marker, '-' | '*' | '_')
        && trimmed.chars().filter(|&c| c == marker).count() >= 3
        && trimmed.chars().all(|c| c == marker || c == ' ' || c == '\t')
}

fn is_html_line(trimmed: &str) -> bool {
    let mut chars = trimmed.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!')
}

/// Whether a line contains an unescaped `|`.
fn is_table_row(line: &str) -> bool {
    let mut escaped = false;
    for c in line.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '|' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

fn is_separator_row(line: &str) -> bool {
    if !is_table_row(line) {
        return false;
    }
    let cells = split_cells(line);
    !cells.is_empty() && cells.iter().all(|c| separator_cell_re().is_match(c.trim()))
}

/// Split a table row into raw cell texts.
///
/// Outer pipes are optional. `\|` becomes a literal pipe; other escapes are
/// left for the inline parser.
fn split_cells(line: &str) -> Vec<String> {
    let mut row = line.trim();
    if let Some(rest) = row.strip_prefix('|') {
        row = rest;
    }
    if row.ends_with('|') && !row.ends_with("\\|") {
        row = &row[..row.len() - 1];
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = row.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '|' => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

fn parse_row(line: &str, images: &mut Vec<ImageRef>) -> TableRow {
    TableRow::new(
        split_cells(line)
            .iter()
            .map(|cell| {
                let (text, found) = take_images(cell.trim());
                images.extend(found);
                TableCell::with_runs(parse_inline(text.trim()))
            })
            .collect(),
    )
}

/// Image syntax in a line, skipping escaped `\!` and code spans.
fn find_images(line: &str) -> Vec<(Range<usize>, ImageRef)> {
    let mut found = Vec::new();
    for caps in image_re().captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        let before = &line[..whole.start()];
        if before.matches('`').count() % 2 == 1 {
            continue;
        }
        if before.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1 {
            continue;
        }

        let target = &caps[2];
        let source = target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(target);
        let caption = parse_inline(&caps[1]);
        found.push((
            whole.range(),
            ImageRef {
                source: source.to_string(),
                caption: (!caption.is_empty()).then_some(caption),
            },
        ));
    }
    found
}

/// Remove image syntax from text that cannot hold an image.
fn take_images(text: &str) -> (String, Vec<ImageRef>) {
    let found = find_images(text);
    if found.is_empty() {
        return (text.to_string(), Vec::new());
    }
    let mut rest = String::with_capacity(text.len());
    let mut last = 0;
    let mut images = Vec::with_capacity(found.len());
    for (range, image) in found {
        rest.push_str(&text[last..range.start]);
        last = range.end;
        images.push(image);
    }
    rest.push_str(&text[last..]);
    (rest.trim().to_string(), images)
}

/// Split a paragraph line around image syntax.
fn paragraph_line(line: &str, state: &mut ScanState) {
    let mut last = 0;
    for (range, image) in find_images(line) {
        push_paragraph(&line[last..range.start], state);
        state.push(Block::Image(image));
        last = range.end;
    }
    push_paragraph(&line[last..], state);
}

fn push_paragraph(text: &str, state: &mut ScanState) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let runs = parse_inline(text);
    if !runs.is_empty() {
        state.push(Block::Paragraph { runs });
    }
}

/// Flags the lines of `text` that belong to fenced code blocks, fences
/// included. Lines are counted as [`str::lines`] counts them.
pub(crate) fn fenced_lines(text: &str) -> Vec<bool> {
    let mut flags = Vec::new();
    let mut open: Option<Fence> = None;
    for line in text.lines() {
        match &open {
            Some(fence) => {
                if fence.is_closed_by(line) {
                    open = None;
                }
                flags.push(true);
            }
            None => {
                open = Fence::open(line);
                flags.push(open.is_some());
            }
        }
    }
    flags
}
