//! Word (DOCX) package builder.
//!
//! The document is assembled with `docx-rs`. Every block maps to a
//! Word-native construct: headings and list items use paragraph styles,
//! tables become native tables and images are embedded inline.

use super::RenderOptions;
use crate::error::{Diagnostic, DiagnosticKind, Error, Result};
use crate::model::{
    sanitize_text, Block, Document, ImageFormat, ImageRef, Table as BlockTable, TextRun,
    MAX_HEADING_LEVEL,
};
use crate::ooxml::{self, escape_xml, style_id};
use crate::persist;
use chrono::{DateTime, Utc};
use docx_rs::*;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Deepest list level Word numbering definitions support.
const MAX_LIST_LEVEL: u8 = 8;

// docx-rs emits its own default list under id 1.
const BULLET_ABSTRACT_ID: usize = 2;
const ORDERED_ABSTRACT_ID: usize = 3;
const BULLET_NUM_ID: usize = 2;

/// EMUs per pixel at 96 DPI.
const EMU_PER_PIXEL: u64 = 9525;

/// A Word package built in memory.
#[derive(Debug)]
pub struct DocxPackage {
    /// The zip container
    pub bytes: Vec<u8>,

    /// Non-fatal problems found while building
    pub diagnostics: Vec<Diagnostic>,
}

/// Build a Word package, resolving relative image paths against `resource_dirs`.
pub fn to_docx(
    doc: &Document,
    options: &RenderOptions,
    resource_dirs: &[PathBuf],
) -> Result<DocxPackage> {
    DocxWriter::new(options.clone())
        .with_resource_dirs(resource_dirs.iter().cloned())
        .build(doc)
}

/// Word package writer.
pub struct DocxWriter {
    options: RenderOptions,
    resource_dirs: Vec<PathBuf>,
}

impl DocxWriter {
    /// Create a new writer.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            resource_dirs: Vec::new(),
        }
    }

    /// Add a directory that relative image paths are resolved against.
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dirs.push(dir.into());
        self
    }

    /// Add several resource directories, searched in order.
    pub fn with_resource_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.resource_dirs.extend(dirs);
        self
    }

    /// Build the package in memory.
    pub fn build(&self, doc: &Document) -> Result<DocxPackage> {
        let mut body = BodyWriter::new(self);
        for (index, block) in doc.blocks.iter().enumerate() {
            body.block(index, block);
        }
        log::debug!(
            "built Word body: {} blocks, {} images, {} diagnostics",
            doc.blocks.len(),
            body.embedded,
            body.diagnostics.len()
        );

        let docx = add_numbering(body.docx, &body.ordered_lists);
        let mut packed = Vec::new();
        docx.build()
            .pack(&mut Cursor::new(&mut packed))
            .map_err(|e| {
                Error::BuiltinConversionFailed(format!("cannot pack Word package: {}", e))
            })?;

        let core = CoreProperties {
            title: self.options.title.clone().or_else(|| doc.title()),
            author: doc.metadata.author.clone(),
            created: doc.metadata.created.unwrap_or_else(Utc::now),
        };
        Ok(DocxPackage {
            bytes: replace_core_part(packed, &core.to_xml())?,
            diagnostics: body.diagnostics,
        })
    }

    /// Build the package and write it atomically to `path`.
    pub fn write(&self, doc: &Document, path: &Path) -> Result<Vec<Diagnostic>> {
        let package = self.build(doc)?;
        persist::write_atomic(path, &package.bytes)?;
        Ok(package.diagnostics)
    }

    fn resolve(&self, image: &ImageRef) -> Option<PathBuf> {
        if image.is_remote() {
            return None;
        }
        let path = Path::new(&image.source);
        if path.is_absolute() || self.resource_dirs.is_empty() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.resource_dirs
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }
}

impl Default for DocxWriter {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

/// Accumulates body content on a [`Docx`].
struct BodyWriter<'a> {
    writer: &'a DocxWriter,
    docx: Docx,
    ordered_lists: Vec<usize>,
    current_list: Option<usize>,
    last_was_table: bool,
    embedded: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> BodyWriter<'a> {
    fn new(writer: &'a DocxWriter) -> Self {
        Self {
            writer,
            docx: add_styles(Docx::new(), &writer.options.code_font),
            ordered_lists: Vec::new(),
            current_list: None,
            last_was_table: false,
            embedded: 0,
            diagnostics: Vec::new(),
        }
    }

    fn push(&mut self, paragraph: Paragraph) {
        let docx = std::mem::take(&mut self.docx);
        self.docx = docx.add_paragraph(paragraph);
    }

    fn block(&mut self, index: usize, block: &Block) {
        if !matches!(block, Block::ListItem { .. }) {
            self.current_list = None;
        }
        let is_table = matches!(block, Block::Table(_));
        // Word merges adjacent tables.
        if is_table && self.last_was_table {
            self.push(Paragraph::new());
        }
        self.last_was_table = is_table;

        match block {
            Block::Heading { level, runs } => {
                let style = style_id::heading((*level).clamp(1, MAX_HEADING_LEVEL));
                self.push(add_runs(Paragraph::new().style(&style), runs));
            }
            Block::Paragraph { runs } => self.push(add_runs(Paragraph::new(), runs)),
            Block::ListItem {
                ordered,
                depth,
                runs,
            } => {
                let (style, num_id) = if *ordered {
                    (style_id::LIST_NUMBER, self.ordered_list_id())
                } else {
                    (style_id::LIST_BULLET, BULLET_NUM_ID)
                };
                let level = usize::from((*depth).min(MAX_LIST_LEVEL));
                let paragraph = Paragraph::new()
                    .style(style)
                    .numbering(NumberingId::new(num_id), IndentLevel::new(level));
                self.push(add_runs(paragraph, runs));
            }
            Block::Quote { runs } => {
                self.push(add_runs(Paragraph::new().style(style_id::QUOTE), runs));
            }
            Block::Table(table) => self.table(table),
            Block::CodeBlock { code, .. } => self.push(code_paragraph(code)),
            Block::Image(image) => self.image(index, image),
        }
    }

    /// Each ordered list gets its own numbering instance so it restarts at 1.
    fn ordered_list_id(&mut self) -> usize {
        if let Some(id) = self.current_list {
            return id;
        }
        let id = BULLET_NUM_ID + 1 + self.ordered_lists.len();
        self.ordered_lists.push(id);
        self.current_list = Some(id);
        id
    }

    fn table(&mut self, table: &BlockTable) {
        let columns = table.column_count();
        if columns == 0 {
            return;
        }
        let width = ooxml::TEXT_WIDTH_TWIPS as usize / columns;

        let rows = table
            .rows
            .iter()
            .map(|row| {
                let cells = (0..columns)
                    .map(|col| {
                        let runs = row.cells.get(col).map_or(&[][..], |cell| &cell.runs[..]);
                        TableCell::new()
                            .width(width, WidthType::Dxa)
                            .add_paragraph(add_runs(Paragraph::new(), runs))
                    })
                    .collect();
                TableRow::new(cells)
            })
            .collect();

        let table = Table::new(rows)
            .style(style_id::TABLE_GRID)
            .set_grid(vec![width; columns]);
        let docx = std::mem::take(&mut self.docx);
        self.docx = docx.add_table(table);
    }

    fn image(&mut self, index: usize, image: &ImageRef) {
        let Some(path) = self.writer.resolve(image) else {
            let reason = if image.is_remote() {
                "remote image is not stored locally"
            } else {
                "file not found"
            };
            self.missing_image(index, image, DiagnosticKind::MediaMissing, reason);
            return;
        };

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                let reason = e.to_string();
                self.missing_image(index, image, DiagnosticKind::MediaMissing, &reason);
                return;
            }
        };
        if ImageFormat::detect(&data).is_none() {
            self.missing_image(
                index,
                image,
                DiagnosticKind::MediaUnsupported,
                "not a PNG, JPEG, GIF, BMP or WEBP image",
            );
            return;
        }

        let cx = (self.writer.options.image_width_inches * ooxml::EMU_PER_INCH).round() as u64;
        let (pixels, cy) = match ImageFormat::dimensions(&data) {
            Some((w, h)) => ((w, h), cx * u64::from(h) / u64::from(w)),
            None => {
                let cy = cx * 3 / 4;
                let px = |emu: u64| u32::try_from(emu / EMU_PER_PIXEL).unwrap_or(u32::MAX);
                ((px(cx), px(cy)), cy)
            }
        };
        let emu = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
        let pic = Pic::new_with_dimensions(data, pixels.0, pixels.1).size(emu(cx), emu(cy));
        self.embedded += 1;

        self.push(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(Run::new().add_image(pic)),
        );
        if let Some(caption) = image.caption.as_deref().filter(|c| !c.is_empty()) {
            self.push(add_runs(Paragraph::new().style(style_id::CAPTION), caption));
        }
    }

    fn missing_image(&mut self, index: usize, image: &ImageRef, kind: DiagnosticKind, reason: &str) {
        let diagnostic =
            Diagnostic::new(kind, format!("{}: {}", image.source, reason)).at_block(index);
        log::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
        let placeholder = format!("[missing image: {}]", image.source);
        self.push(Paragraph::new().add_run(Run::new().add_text(placeholder)));
    }
}

/// Add styled runs to a paragraph. Consecutive runs sharing a link target
/// become one hyperlink.
fn add_runs(mut paragraph: Paragraph, runs: &[TextRun]) -> Paragraph {
    let mut i = 0;
    while i < runs.len() {
        let Some(target) = runs[i].link.as_ref() else {
            if let Some(run) = styled_run(&runs[i], false) {
                paragraph = paragraph.add_run(run);
            }
            i += 1;
            continue;
        };

        let end = runs[i..]
            .iter()
            .position(|r| r.link.as_ref() != Some(target))
            .map_or(runs.len(), |p| i + p);
        let mut hyperlink = match target.strip_prefix('#') {
            Some(anchor) => Hyperlink::new(anchor, HyperlinkType::Anchor),
            None => Hyperlink::new(target, HyperlinkType::External),
        };
        for run in runs[i..end].iter().filter_map(|r| styled_run(r, true)) {
            hyperlink = hyperlink.add_run(run);
        }
        paragraph = paragraph.add_hyperlink(hyperlink);
        i = end;
    }
    paragraph
}

fn styled_run(run: &TextRun, linked: bool) -> Option<Run> {
    let text = sanitize_text(&run.text);
    if text.is_empty() {
        return None;
    }

    let mut out = Run::new();
    if run.style.code {
        out = out.style(style_id::VERBATIM_CHAR);
    } else if linked {
        out = out.style(style_id::HYPERLINK);
    }
    if run.style.bold {
        out = out.bold();
    }
    if run.style.italic {
        out = out.italic();
    }
    Some(add_text(out, &text))
}

/// Append text to a run. Line feeds become breaks and tabs become tab stops.
fn add_text(mut run: Run, text: &str) -> Run {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        for (j, part) in line.split('\t').enumerate() {
            if j > 0 {
                run = run.add_tab();
            }
            if !part.is_empty() {
                run = run.add_text(part);
            }
        }
    }
    run
}

/// One paragraph, lines joined by explicit breaks.
fn code_paragraph(code: &str) -> Paragraph {
    let paragraph = Paragraph::new().style(style_id::SOURCE_CODE);
    if code.is_empty() {
        return paragraph;
    }
    paragraph.add_run(add_text(Run::new(), code))
}

fn add_styles(mut docx: Docx, code_font: &str) -> Docx {
    const HEADING_SIZES: [usize; 6] = [32, 28, 26, 24, 22, 22];
    for level in 1..=MAX_HEADING_LEVEL {
        let heading = Style::new(style_id::heading(level), StyleType::Paragraph)
            .name(format!("heading {}", level))
            .size(HEADING_SIZES[usize::from(level - 1)])
            .bold();
        docx = docx.add_style(heading);
    }

    let mono = RunFonts::new()
        .ascii(code_font)
        .hi_ansi(code_font)
        .east_asia(code_font)
        .cs(code_font);

    docx.add_style(Style::new(style_id::LIST_BULLET, StyleType::Paragraph).name("List Bullet"))
        .add_style(Style::new(style_id::LIST_NUMBER, StyleType::Paragraph).name("List Number"))
        .add_style(
            Style::new(style_id::QUOTE, StyleType::Paragraph)
                .name("Quote")
                .indent(Some(720), None, None, None)
                .italic(),
        )
        .add_style(
            Style::new(style_id::SOURCE_CODE, StyleType::Paragraph)
                .name("Source Code")
                .fonts(mono.clone())
                .size(20),
        )
        .add_style(
            Style::new(style_id::VERBATIM_CHAR, StyleType::Character)
                .name("Verbatim Char")
                .fonts(mono)
                .size(20),
        )
        .add_style(
            Style::new(style_id::CAPTION, StyleType::Paragraph)
                .name("caption")
                .italic()
                .color("44546A")
                .size(18)
                .align(AlignmentType::Center),
        )
        .add_style(
            Style::new(style_id::HYPERLINK, StyleType::Character)
                .name("Hyperlink")
                .color("0563C1")
                .underline("single"),
        )
        .add_style(Style::new(style_id::TABLE_GRID, StyleType::Table).name("Table Grid"))
}

fn list_level(level: usize, format: &str, text: &str) -> Level {
    Level::new(
        level,
        Start::new(1),
        NumberFormat::new(format),
        LevelText::new(text),
        LevelJc::new("left"),
    )
    .indent(
        Some(720 * (level as i32 + 1)),
        Some(SpecialIndentType::Hanging(360)),
        None,
        None,
    )
}

fn add_numbering(docx: Docx, ordered_lists: &[usize]) -> Docx {
    const BULLETS: [&str; 3] = ["\u{2022}", "\u{25E6}", "\u{25AA}"];
    let levels = 0..=usize::from(MAX_LIST_LEVEL);

    let bullets = levels
        .clone()
        .fold(AbstractNumbering::new(BULLET_ABSTRACT_ID), |abs, level| {
            abs.add_level(list_level(level, "bullet", BULLETS[level % BULLETS.len()]))
        });
    let ordered = levels
        .clone()
        .fold(AbstractNumbering::new(ORDERED_ABSTRACT_ID), |abs, level| {
            abs.add_level(list_level(level, "decimal", &format!("%{}.", level + 1)))
        });

    let mut docx = docx
        .add_abstract_numbering(bullets)
        .add_abstract_numbering(ordered)
        .add_numbering(Numbering::new(BULLET_NUM_ID, BULLET_ABSTRACT_ID));
    for &id in ordered_lists {
        let numbering = levels
            .clone()
            .fold(Numbering::new(id, ORDERED_ABSTRACT_ID), |num, level| {
                num.add_override(LevelOverride::new(level).start(1))
            });
        docx = docx.add_numbering(numbering);
    }
    docx
}

/// Metadata written to `docProps/core.xml`.
struct CoreProperties {
    title: Option<String>,
    author: Option<String>,
    created: DateTime<Utc>,
}

impl CoreProperties {
    fn to_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<cp:coreProperties \
             xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
             xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
             xmlns:dcmitype=\"http://purl.org/dc/dcmitype/\" \
             xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">",
        );
        if let Some(title) = &self.title {
            xml.push_str(&format!("<dc:title>{}</dc:title>", escape_xml(title)));
        }
        if let Some(author) = &self.author {
            xml.push_str(&format!("<dc:creator>{}</dc:creator>", escape_xml(author)));
        }
        let stamp = self.created.format("%Y-%m-%dT%H:%M:%SZ");
        xml.push_str(&format!(
            "<dcterms:created xsi:type=\"dcterms:W3CDTF\">{stamp}</dcterms:created>\
             <dcterms:modified xsi:type=\"dcterms:W3CDTF\">{stamp}</dcterms:modified>\
             </cp:coreProperties>"
        ));
        xml
    }
}

/// Swap the core properties part of a packed document; docx-rs has no
/// setter for the title or creator.
fn replace_core_part(packed: Vec<u8>, core: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(packed))?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        if file.name() == ooxml::PART_CORE {
            continue;
        }
        zip.raw_copy_file(file)?;
    }
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(ooxml::PART_CORE, options)?;
    zip.write_all(core.as_bytes())?;
    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TableRow as BlockRow, TextStyle};
    use crate::parser::DocxReader;
    use regex::Regex;
    use std::io::Read;

    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut xml = String::new();
        file.read_to_string(&mut xml).unwrap();
        xml
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        data
    }

    fn read_back(bytes: &[u8]) -> Vec<Block> {
        DocxReader::default().read_bytes(bytes).unwrap().document.blocks
    }

    #[test]
    fn test_package_parts() {
        let doc = Document::from_blocks(vec![Block::heading(1, "Title")]);
        let package = DocxWriter::default().build(&doc).unwrap();

        let archive = ZipArchive::new(Cursor::new(&package.bytes)).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for required in [
            ooxml::PART_CORE,
            ooxml::PART_DOCUMENT,
            ooxml::PART_DOCUMENT_RELS,
            ooxml::PART_STYLES,
            ooxml::PART_NUMBERING,
        ] {
            assert!(names.contains(&required), "missing {}", required);
        }
        assert_eq!(names.iter().filter(|n| **n == ooxml::PART_CORE).count(), 1);

        let core = part(&package.bytes, ooxml::PART_CORE);
        assert!(core.contains("<dc:title>Title</dc:title>"));
    }

    #[test]
    fn test_block_mapping() {
        let link = "https://example.com?a=1&b=2";
        let runs = vec![
            TextRun::bold("b"),
            TextRun::styled("i", TextStyle::ITALIC),
            TextRun::code("c"),
            TextRun::new("site").with_link(link),
        ];
        let doc = Document::from_blocks(vec![
            Block::heading(8, "Deep"),
            Block::Paragraph { runs: runs.clone() },
            Block::numbered(1, "step"),
            Block::bullet(12, "deep bullet"),
            Block::quote("said"),
            Block::code(Some("sh"), "a\n\tb"),
        ]);
        let package = DocxWriter::default().build(&doc).unwrap();

        assert_eq!(
            read_back(&package.bytes),
            vec![
                Block::heading(6, "Deep"),
                Block::Paragraph { runs },
                Block::numbered(1, "step"),
                Block::bullet(8, "deep bullet"),
                Block::quote("said"),
                Block::code(None, "a\n\tb"),
            ]
        );
    }

    #[test]
    fn test_ordered_lists_restart() {
        let doc = Document::from_blocks(vec![
            Block::numbered(0, "a"),
            Block::numbered(0, "b"),
            Block::bullet(0, "x"),
            Block::paragraph("break"),
            Block::numbered(0, "c"),
        ]);
        let package = DocxWriter::default().build(&doc).unwrap();
        let xml = part(&package.bytes, ooxml::PART_DOCUMENT);

        let num_id = Regex::new(r#"w:numId w:val="(\d+)""#).unwrap();
        let ids: Vec<usize> = num_id
            .captures_iter(&xml)
            .map(|c| c[1].parse().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 3, BULLET_NUM_ID, 4]);
    }

    #[test]
    fn test_table_grid() {
        let table = BlockTable::with_rows(vec![
            BlockRow::from_strings(["A", "B"]),
            BlockRow::from_strings(["1"]),
        ]);
        let doc = Document::from_blocks(vec![
            Block::Table(table.clone()),
            Block::Table(table.clone()),
        ]);
        let package = DocxWriter::default().build(&doc).unwrap();

        let mut padded = table;
        padded.pad_rows();
        assert_eq!(
            read_back(&package.bytes),
            vec![Block::Table(padded.clone()), Block::Table(padded)]
        );
    }

    #[test]
    fn test_image_embedded_with_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("wide.png"), png(200, 100)).unwrap();

        let doc = Document::from_blocks(vec![
            Block::Image(ImageRef::new("wide.png").with_caption("Wide")),
            Block::image("wide.png"),
        ]);
        let package = DocxWriter::default()
            .with_resource_dir(dir.path())
            .build(&doc)
            .unwrap();
        assert!(package.diagnostics.is_empty());

        let xml = part(&package.bytes, ooxml::PART_DOCUMENT);
        assert!(xml.contains("cx=\"4572000\""));
        assert!(xml.contains("cy=\"2286000\""));

        let blocks = read_back(&package.bytes);
        assert_eq!(blocks.len(), 2);
        let Block::Image(first) = &blocks[0] else {
            panic!("expected an image, got {:?}", blocks[0]);
        };
        assert_eq!(first.caption, Some(vec![TextRun::new("Wide")]));
        assert!(matches!(&blocks[1], Block::Image(second) if second.caption.is_none()));
    }

    #[test]
    fn test_missing_image_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "text").unwrap();
        let doc = Document::from_blocks(vec![
            Block::paragraph("intro"),
            Block::image("gone.png"),
            Block::image("notes.txt"),
        ]);
        let package = DocxWriter::default()
            .with_resource_dir(dir.path())
            .build(&doc)
            .unwrap();

        assert_eq!(package.diagnostics.len(), 2);
        assert_eq!(package.diagnostics[0].kind, DiagnosticKind::MediaMissing);
        assert_eq!(package.diagnostics[0].block, Some(1));
        assert_eq!(package.diagnostics[1].kind, DiagnosticKind::MediaUnsupported);

        let blocks = read_back(&package.bytes);
        assert_eq!(blocks[1], Block::paragraph("[missing image: gone.png]"));
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        let diagnostics = DocxWriter::default()
            .write(&Document::from_blocks(vec![Block::paragraph("x")]), &path)
            .unwrap();
        assert!(diagnostics.is_empty());
        assert!(fs::read(&path).unwrap().starts_with(b"PK"));
    }
}
