//! Word (DOCX) document reader.
//!
//! Extraction is best-effort: paragraph styles are classified through the
//! explicit table in [`crate::ooxml`], anything unrecognized becomes a plain
//! paragraph, and embedded images are copied out to the media directory.

use super::{ParseOptions, Parsed};
use crate::error::{Diagnostic, DiagnosticKind, Error, Result};
use crate::media::{content_digest, store_media_bytes, MediaDir};
use crate::model::{
    coalesce_runs, sanitize_text, Block, Document, ImageFormat, ImageRef, Table, TableCell, TableRow, TextRun,
    TextStyle, MAX_HEADING_LEVEL,
};
use crate::ooxml::{self, classify_style, is_code_char_style, is_monospace_font, RelKind, StyleClass};
use roxmltree::Node;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Strict OOXML flavor of the main namespace.
const NS_W_STRICT: &str = "http://purl.oclc.org/ooxml/wordprocessingml/main";

fn is_wml(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && matches!(node.tag_name().namespace(), Some(ooxml::NS_W) | Some(NS_W_STRICT))
}

fn wml<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_wml(*n, name))
}

/// Attribute by local name, whatever its namespace prefix.
fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| a.value())
}

fn wml_val<'a>(node: Node<'a, '_>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| attr(n, "val"))
}

/// A toggle property such as `w:b`: present without `w:val`, or with a true value.
fn wml_bool(node: Node<'_, '_>, name: &str) -> bool {
    wml(node, name).is_some_and(|n| {
        attr(n, "val").map_or(true, |v| !matches!(v, "0" | "false" | "off"))
    })
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(Some(data))
}

fn read_xml_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    match read_part(archive, name)? {
        Some(data) => String::from_utf8(data)
            .map(Some)
            .map_err(|_| Error::BuiltinConversionFailed(format!("{} is not UTF-8", name))),
        None => Ok(None),
    }
}

#[derive(Debug)]
struct Relationship {
    kind: Option<RelKind>,
    target: String,
    external: bool,
}

/// Word document reader.
pub struct DocxReader {
    options: ParseOptions,
    media: Option<MediaDir>,
}

impl DocxReader {
    /// Create a reader with the given options.
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            media: None,
        }
    }

    /// Copy embedded images into `media`.
    ///
    /// Without a media directory, images keep their package-internal paths.
    pub fn with_media_dir(mut self, media: MediaDir) -> Self {
        self.media = Some(media);
        self
    }

    /// Read a Word document from a file.
    pub fn read_file(&self, path: &Path) -> Result<Parsed> {
        let file = File::open(path)?;
        log::debug!("reading Word document {}", path.display());
        self.read(ZipArchive::new(file)?)
    }

    /// Read a Word document from memory.
    pub fn read_bytes(&self, data: &[u8]) -> Result<Parsed> {
        self.read(ZipArchive::new(Cursor::new(data))?)
    }

    fn read<R: Read + Seek>(&self, mut archive: ZipArchive<R>) -> Result<Parsed> {
        let document_xml = read_xml_part(&mut archive, ooxml::PART_DOCUMENT)?.ok_or_else(|| {
            Error::UnsupportedFormat(format!("package has no {}", ooxml::PART_DOCUMENT))
        })?;

        let rels = match read_xml_part(&mut archive, ooxml::PART_DOCUMENT_RELS)? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        };
        let styles = match read_xml_part(&mut archive, ooxml::PART_STYLES)? {
            Some(xml) => parse_style_names(&xml)?,
            None => HashMap::new(),
        };
        let numbering = match read_xml_part(&mut archive, ooxml::PART_NUMBERING)? {
            Some(xml) => parse_numbering(&xml)?,
            None => HashMap::new(),
        };
        let core = match read_xml_part(&mut archive, ooxml::PART_CORE)? {
            Some(xml) => parse_core(&xml)?,
            None => CoreProperties::default(),
        };

        let xml = roxmltree::Document::parse(&document_xml)?;
        let body = wml(xml.root_element(), "body")
            .ok_or_else(|| Error::BuiltinConversionFailed("document has no body".to_string()))?;

        let mut extraction = Extraction {
            reader: self,
            archive: &mut archive,
            rels,
            styles,
            numbering,
            images: HashMap::new(),
            stored: HashMap::new(),
            blocks: Vec::new(),
            diagnostics: Vec::new(),
            in_code: false,
        };
        extraction.body(body)?;

        let mut document = Document::from_blocks(extraction.blocks);
        let diagnostics = extraction.diagnostics;
        document.metadata.title = core.title;
        document.metadata.author = core.author;
        let clamped = document.validate();
        if clamped > 0 {
            log::debug!("clamped {} out-of-range values in extracted document", clamped);
        }
        log::debug!(
            "extracted {} blocks, {} diagnostics",
            document.len(),
            diagnostics.len()
        );

        Ok(Parsed {
            document,
            diagnostics,
        })
    }
}

impl Default for DocxReader {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, Relationship>> {
    let doc = roxmltree::Document::parse(xml)?;
    let rels = doc
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .filter_map(|n| {
            let id = n.attribute("Id")?;
            let target = n.attribute("Target")?;
            let rel = Relationship {
                kind: n.attribute("Type").and_then(RelKind::from_uri),
                target: target.to_string(),
                external: n.attribute("TargetMode") == Some("External"),
            };
            Some((id.to_string(), rel))
        })
        .collect();
    Ok(rels)
}

/// Style id to display name, for styles whose id says nothing useful.
fn parse_style_names(xml: &str) -> Result<HashMap<String, String>> {
    let doc = roxmltree::Document::parse(xml)?;
    let names = doc
        .root_element()
        .children()
        .filter(|n| is_wml(*n, "style"))
        .filter_map(|n| {
            let id = attr(n, "styleId")?;
            let name = wml_val(n, "name")?;
            Some((id.to_string(), name.to_string()))
        })
        .collect();
    Ok(names)
}

/// numId -> (level -> ordered)
fn parse_numbering(xml: &str) -> Result<HashMap<String, HashMap<u8, bool>>> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    let mut abstract_nums: HashMap<&str, HashMap<u8, bool>> = HashMap::new();
    for node in root.children().filter(|n| is_wml(*n, "abstractNum")) {
        let Some(id) = attr(node, "abstractNumId") else {
            continue;
        };
        let levels = node
            .children()
            .filter(|n| is_wml(*n, "lvl"))
            .filter_map(|lvl| {
                let level = attr(lvl, "ilvl")?.parse::<u8>().ok()?;
                let format = wml_val(lvl, "numFmt").unwrap_or("bullet");
                Some((level, !matches!(format, "bullet" | "none")))
            })
            .collect();
        abstract_nums.insert(id, levels);
    }

    let mut numbering = HashMap::new();
    for node in root.children().filter(|n| is_wml(*n, "num")) {
        let (Some(num_id), Some(abstract_id)) = (attr(node, "numId"), wml_val(node, "abstractNumId"))
        else {
            continue;
        };
        if let Some(levels) = abstract_nums.get(abstract_id) {
            numbering.insert(num_id.to_string(), levels.clone());
        }
    }
    Ok(numbering)
}

#[derive(Debug, Default)]
struct CoreProperties {
    title: Option<String>,
    author: Option<String>,
}

fn parse_core(xml: &str) -> Result<CoreProperties> {
    let doc = roxmltree::Document::parse(xml)?;
    let text = |name: &str| {
        doc.descendants()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
    };
    Ok(CoreProperties {
        title: text("title"),
        author: text("creator"),
    })
}

/// Paragraph content in reading order.
enum Inline {
    Run(TextRun),
    Image(String),
}

struct Extraction<'a, R> {
    reader: &'a DocxReader,
    archive: &'a mut ZipArchive<R>,
    rels: HashMap<String, Relationship>,
    styles: HashMap<String, String>,
    numbering: HashMap<String, HashMap<u8, bool>>,
    /// Package part name -> as-written path of the extracted copy
    images: HashMap<String, String>,
    /// Written path per content digest
    stored: HashMap<String, String>,
    blocks: Vec<Block>,
    diagnostics: Vec<Diagnostic>,
    /// Whether the last block came from a code paragraph
    in_code: bool,
}

impl<R: Read + Seek> Extraction<'_, R> {
    fn body(&mut self, parent: Node<'_, '_>) -> Result<()> {
        for child in parent.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "p" if is_wml(child, "p") => self.paragraph(child)?,
                "tbl" if is_wml(child, "tbl") => {
                    self.in_code = false;
                    let table = self.table(child);
                    if !table.is_empty() {
                        self.blocks.push(Block::Table(table));
                    }
                }
                "sdt" => {
                    if let Some(content) = wml(child, "sdtContent") {
                        self.body(content)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn classify(&self, style_id: &str) -> StyleClass {
        match classify_style(style_id) {
            StyleClass::Normal => self
                .styles
                .get(style_id)
                .map_or(StyleClass::Normal, |name| classify_style(name)),
            class => class,
        }
    }

    fn is_code_style(&self, style_id: &str) -> bool {
        is_code_char_style(style_id)
            || self
                .styles
                .get(style_id)
                .is_some_and(|name| is_code_char_style(name))
    }

    fn paragraph(&mut self, p: Node<'_, '_>) -> Result<()> {
        let ppr = wml(p, "pPr");
        let class = ppr
            .and_then(|n| wml_val(n, "pStyle"))
            .map_or(StyleClass::Normal, |id| self.classify(id));

        let mut inlines = Vec::new();
        self.inlines(p, None, &mut inlines);

        if class == StyleClass::Code {
            self.code_paragraph(&inlines);
            return Ok(());
        }
        self.in_code = false;

        if class == StyleClass::Caption && self.attach_caption(&inlines) {
            return Ok(());
        }

        let list = ppr.and_then(|n| wml(n, "numPr")).and_then(|num_pr| {
            let level = wml_val(num_pr, "ilvl")
                .and_then(|v| v.parse::<u8>().ok())
                .unwrap_or(0);
            let num_id = wml_val(num_pr, "numId")?;
            // numId 0 removes numbering
            if num_id == "0" {
                return None;
            }
            let ordered = self
                .numbering
                .get(num_id)
                .and_then(|levels| levels.get(&level).copied());
            Some((level, ordered))
        });

        let make = |runs: Vec<TextRun>| -> Block {
            match (class, list) {
                (StyleClass::Heading(level), _) => Block::Heading {
                    level: level.min(MAX_HEADING_LEVEL),
                    runs,
                },
                (StyleClass::Quote, None) => Block::Quote { runs },
                (StyleClass::ListBullet(depth), None) => Block::ListItem {
                    ordered: false,
                    depth,
                    runs,
                },
                (StyleClass::ListNumber(depth), None) => Block::ListItem {
                    ordered: true,
                    depth,
                    runs,
                },
                (_, Some((depth, ordered))) => Block::ListItem {
                    ordered: ordered.unwrap_or(matches!(class, StyleClass::ListNumber(_))),
                    depth,
                    runs,
                },
                _ => Block::Paragraph { runs },
            }
        };

        // Images split the paragraph into siblings in reading order.
        let mut runs = Vec::new();
        for inline in inlines {
            match inline {
                Inline::Run(run) => runs.push(run),
                Inline::Image(rel_id) => {
                    self.push_text_block(std::mem::take(&mut runs), &make);
                    if let Some(image) = self.image(&rel_id)? {
                        self.blocks.push(Block::Image(image));
                    }
                }
            }
        }
        self.push_text_block(runs, &make);
        Ok(())
    }

    fn push_text_block(&mut self, runs: Vec<TextRun>, make: &dyn Fn(Vec<TextRun>) -> Block) {
        let runs = clean_runs(runs);
        if runs.iter().all(|r| r.text.trim().is_empty()) {
            return;
        }
        self.blocks.push(make(runs));
    }

    /// Consecutive code paragraphs form one code block.
    fn code_paragraph(&mut self, inlines: &[Inline]) {
        let text: String = inlines
            .iter()
            .filter_map(|inline| match inline {
                Inline::Run(run) => Some(run.text.as_str()),
                Inline::Image(_) => None,
            })
            .collect();

        if self.in_code {
            if let Some(Block::CodeBlock { code, .. }) = self.blocks.last_mut() {
                code.push('\n');
                code.push_str(&text);
                return;
            }
        }
        self.blocks.push(Block::CodeBlock {
            language: None,
            code: text,
        });
        self.in_code = true;
    }

    fn attach_caption(&mut self, inlines: &[Inline]) -> bool {
        let runs: Vec<TextRun> = inlines
            .iter()
            .filter_map(|inline| match inline {
                Inline::Run(run) => Some(run.clone()),
                Inline::Image(_) => None,
            })
            .collect();
        match self.blocks.last_mut() {
            Some(Block::Image(image)) if image.caption.is_none() => {
                let runs = clean_runs(runs);
                if !runs.is_empty() {
                    image.caption = Some(runs);
                }
                true
            }
            _ => false,
        }
    }

    fn inlines(&self, parent: Node<'_, '_>, link: Option<&str>, out: &mut Vec<Inline>) {
        for child in parent.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "r" => self.run(child, link, out),
                "hyperlink" => {
                    let target = match (attr(child, "id"), attr(child, "anchor")) {
                        (Some(id), _) => self.rels.get(id).map(|rel| rel.target.clone()),
                        (None, Some(anchor)) => Some(format!("#{}", anchor)),
                        (None, None) => None,
                    };
                    self.inlines(child, target.as_deref().or(link), out);
                }
                "ins" | "smartTag" | "fldSimple" | "sdt" | "sdtContent" => {
                    self.inlines(child, link, out)
                }
                _ => {}
            }
        }
    }

    fn run(&self, r: Node<'_, '_>, link: Option<&str>, out: &mut Vec<Inline>) {
        let rpr = wml(r, "rPr");
        let code = rpr.is_some_and(|n| {
            wml_val(n, "rStyle").is_some_and(|id| self.is_code_style(id))
                || wml(n, "rFonts").is_some_and(|fonts| {
                    attr(fonts, "ascii")
                        .or_else(|| attr(fonts, "hAnsi"))
                        .is_some_and(is_monospace_font)
                })
        });
        let style = TextStyle {
            bold: rpr.is_some_and(|n| wml_bool(n, "b")),
            italic: rpr.is_some_and(|n| wml_bool(n, "i")),
            code,
        };

        let mut text = String::new();
        let flush = |text: &mut String, out: &mut Vec<Inline>| {
            if !text.is_empty() {
                let mut run = TextRun::styled(std::mem::take(text), style);
                run.link = link.map(String::from);
                out.push(Inline::Run(run));
            }
        };

        for child in r.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "t" => text.push_str(child.text().unwrap_or("")),
                "tab" => text.push('\t'),
                "br" | "cr" => text.push('\n'),
                "noBreakHyphen" => text.push('-'),
                "drawing" | "pict" => {
                    flush(&mut text, out);
                    let rel = child.descendants().find_map(|n| match n.tag_name().name() {
                        "blip" => attr(n, "embed").or_else(|| attr(n, "link")),
                        "imagedata" => attr(n, "id"),
                        _ => None,
                    });
                    if let Some(rel) = rel {
                        out.push(Inline::Image(rel.to_string()));
                    }
                }
                _ => {}
            }
        }
        flush(&mut text, out);
    }

    fn table(&self, tbl: Node<'_, '_>) -> Table {
        let mut table = Table::new();
        for tr in tbl.children().filter(|n| is_wml(*n, "tr")) {
            let mut cells = Vec::new();
            for tc in tr.children().filter(|n| is_wml(*n, "tc")) {
                let mut runs = Vec::new();
                for (i, p) in tc.children().filter(|n| is_wml(*n, "p")).enumerate() {
                    let mut inlines = Vec::new();
                    self.inlines(p, None, &mut inlines);
                    if i > 0 {
                        runs.push(TextRun::new(" "));
                    }
                    runs.extend(inlines.into_iter().filter_map(|inline| match inline {
                        Inline::Run(run) => Some(run),
                        Inline::Image(_) => None,
                    }));
                }
                cells.push(TableCell::with_runs(clean_runs(runs)));

                // Merged cells keep the row rectangular.
                let span = tc
                    .children()
                    .find(|n| is_wml(*n, "tcPr"))
                    .and_then(|pr| wml_val(pr, "gridSpan"))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(1);
                cells.extend((1..span).map(|_| TableCell::empty()));
            }
            table.add_row(TableRow::new(cells));
        }
        table.pad_rows();
        table
    }

    fn image(&mut self, rel_id: &str) -> Result<Option<ImageRef>> {
        let Some(rel) = self.rels.get(rel_id) else {
            self.missing(format!("image relationship {} not found", rel_id));
            return Ok(None);
        };
        if rel.kind.is_some_and(|k| k != RelKind::Image) {
            return Ok(None);
        }
        let target = rel.target.clone();
        if rel.external || !self.reader.options.extract_images {
            return Ok(Some(ImageRef::new(target)));
        }

        let part = resolve_part(&target);
        if let Some(written) = self.images.get(&part) {
            return Ok(Some(ImageRef::new(written.clone())));
        }

        let Some(data) = read_part(&mut *self.archive, &part)? else {
            self.missing(format!("{} is not in the package", part));
            return Ok(None);
        };
        let written = match &self.reader.media {
            Some(media) => {
                let digest = content_digest(&data);
                match self.stored.get(&digest) {
                    Some(written) => written.clone(),
                    None => {
                        // Writers name parts freely; the content decides the extension.
                        let ext = ImageFormat::detect(&data)
                            .map(|f| f.extension().to_string())
                            .or_else(|| {
                                Path::new(&part)
                                    .extension()
                                    .and_then(|e| e.to_str())
                                    .map(str::to_ascii_lowercase)
                            })
                            .unwrap_or_else(|| "bin".to_string());
                        let name = format!("image{}.{}", self.stored.len() + 1, ext);
                        let written = store_media_bytes(media, &name, &data)?;
                        self.stored.insert(digest, written.clone());
                        written
                    }
                }
            }
            None => target,
        };
        self.images.insert(part, written.clone());
        Ok(Some(ImageRef::new(written)))
    }

    fn missing(&mut self, message: String) {
        let diagnostic =
            Diagnostic::new(DiagnosticKind::MediaMissing, message).at_block(self.blocks.len());
        log::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

/// Strip control characters and merge runs with equal formatting.
fn clean_runs(runs: Vec<TextRun>) -> Vec<TextRun> {
    coalesce_runs(
        runs.into_iter()
            .map(|mut run| {
                run.text = sanitize_text(&run.text);
                run
            })
            .collect(),
    )
}

/// Package part name for a relationship target of `word/document.xml`.
fn resolve_part(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = vec!["word"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DocxWriter, RenderOptions};
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn body(content: &str) -> String {
        format!(
            r#"<w:document xmlns:w="{}" xmlns:r="{}"><w:body>{}</w:body></w:document>"#,
            ooxml::NS_W,
            ooxml::NS_R,
            content
        )
    }

    #[test]
    fn test_style_names_classify() {
        let styles = format!(
            r#"<w:styles xmlns:w="{}">
                <w:style w:type="paragraph" w:styleId="a1"><w:name w:val="heading 2"/></w:style>
                <w:style w:type="paragraph" w:styleId="Fancy"><w:name w:val="Fancy Body"/></w:style>
            </w:styles>"#,
            ooxml::NS_W
        );
        let document = body(
            r#"<w:p><w:pPr><w:pStyle w:val="a1"/></w:pPr><w:r><w:t>Section</w:t></w:r></w:p>
               <w:p><w:pPr><w:pStyle w:val="Fancy"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>Body</w:t></w:r></w:p>
               <w:p><w:r><w:t xml:space="preserve">   </w:t></w:r></w:p>"#,
        );
        let data = package(&[
            (ooxml::PART_DOCUMENT, &document),
            (ooxml::PART_STYLES, &styles),
        ]);

        let parsed = DocxReader::default().read_bytes(&data).unwrap();
        assert_eq!(
            parsed.document.blocks,
            vec![
                Block::heading(2, "Section"),
                Block::paragraph_runs(vec![TextRun::bold("Body")]),
            ]
        );
    }

    #[test]
    fn test_numbering_decides_ordered() {
        let numbering = format!(
            r#"<w:numbering xmlns:w="{}">
                <w:abstractNum w:abstractNumId="7"><w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/></w:lvl>
                    <w:lvl w:ilvl="1"><w:numFmt w:val="bullet"/></w:lvl></w:abstractNum>
                <w:num w:numId="3"><w:abstractNumId w:val="7"/></w:num>
            </w:numbering>"#,
            ooxml::NS_W
        );
        let document = body(
            r#"<w:p><w:pPr><w:pStyle w:val="ListParagraph"/><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr></w:pPr><w:r><w:t>one</w:t></w:r></w:p>
               <w:p><w:pPr><w:numPr><w:ilvl w:val="1"/><w:numId w:val="3"/></w:numPr></w:pPr><w:r><w:t>sub</w:t></w:r></w:p>"#,
        );
        let data = package(&[
            (ooxml::PART_DOCUMENT, &document),
            (ooxml::PART_NUMBERING, &numbering),
        ]);

        let parsed = DocxReader::default().read_bytes(&data).unwrap();
        assert_eq!(
            parsed.document.blocks,
            vec![Block::numbered(0, "one"), Block::bullet(1, "sub")]
        );
    }

    #[test]
    fn test_code_paragraphs_merge() {
        let document = body(
            r#"<w:p><w:pPr><w:pStyle w:val="HTMLPreformatted"/></w:pPr><w:r><w:t>fn main() {</w:t></w:r></w:p>
               <w:p><w:pPr><w:pStyle w:val="HTMLPreformatted"/></w:pPr><w:r><w:tab/><w:t>run();</w:t></w:r></w:p>
               <w:p><w:pPr><w:pStyle w:val="HTMLPreformatted"/></w:pPr><w:r><w:t>}</w:t></w:r></w:p>
               <w:p><w:r><w:rPr><w:rFonts w:ascii="Consolas"/></w:rPr><w:t>x</w:t></w:r></w:p>"#,
        );
        let data = package(&[(ooxml::PART_DOCUMENT, &document)]);

        let parsed = DocxReader::default().read_bytes(&data).unwrap();
        assert_eq!(
            parsed.document.blocks,
            vec![
                Block::code(None, "fn main() {\n\trun();\n}"),
                Block::paragraph_runs(vec![TextRun::code("x")]),
            ]
        );
    }

    #[test]
    fn test_hyperlinks_and_anchor() {
        let rels = format!(
            r#"<Relationships xmlns="{}"><Relationship Id="rId9" Type="{}" Target="https://example.com" TargetMode="External"/></Relationships>"#,
            ooxml::NS_PACKAGE_RELS,
            RelKind::Hyperlink.uri()
        );
        let document = body(
            r#"<w:p><w:r><w:t xml:space="preserve">See </w:t></w:r><w:hyperlink r:id="rId9"><w:r><w:t>site</w:t></w:r></w:hyperlink>
               <w:hyperlink w:anchor="intro"><w:r><w:t>intro</w:t></w:r></w:hyperlink></w:p>"#,
        );
        let data = package(&[
            (ooxml::PART_DOCUMENT, &document),
            (ooxml::PART_DOCUMENT_RELS, &rels),
        ]);

        let parsed = DocxReader::default().read_bytes(&data).unwrap();
        assert_eq!(
            parsed.document.blocks,
            vec![Block::paragraph_runs(vec![
                TextRun::new("See "),
                TextRun::new("site").with_link("https://example.com"),
                TextRun::new("intro").with_link("#intro"),
            ])]
        );
    }

    #[test]
    fn test_table_grid_span() {
        let document = body(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>A</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>B</w:t></w:r></w:p></w:tc></w:tr>
               <w:tr><w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr><w:p><w:r><w:rPr><w:i/></w:rPr><w:t>wide</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let data = package(&[(ooxml::PART_DOCUMENT, &document)]);

        let parsed = DocxReader::default().read_bytes(&data).unwrap();
        let Block::Table(table) = &parsed.document.blocks[0] else {
            panic!("expected a table");
        };
        assert!(table.is_rectangular());
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.rows[1].cells[0].runs, vec![TextRun::italic("wide")]);
        assert!(table.rows[1].cells[1].is_empty());
    }

    #[test]
    fn test_not_a_package() {
        let err = DocxReader::default().read_bytes(b"plain text").unwrap_err();
        assert!(matches!(err, Error::Package(_)));

        let data = package(&[("other.xml", "<x/>")]);
        let err = DocxReader::default().read_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_reads_built_package() {
        let mut doc = Document::from_blocks(vec![
            Block::heading(1, "Report"),
            Block::bullet(0, "point"),
            Block::numbered(1, "step"),
            Block::code(Some("rust"), "let x = 1;\n\nlet y = 2;"),
        ]);
        doc.metadata.author = Some("Ada".to_string());
        let package = DocxWriter::new(RenderOptions::default()).build(&doc).unwrap();

        let parsed = DocxReader::default().read_bytes(&package.bytes).unwrap();
        assert_eq!(parsed.document.metadata.title.as_deref(), Some("Report"));
        assert_eq!(parsed.document.metadata.author.as_deref(), Some("Ada"));
        assert_eq!(
            parsed.document.blocks,
            vec![
                Block::heading(1, "Report"),
                Block::bullet(0, "point"),
                Block::numbered(1, "step"),
                Block::code(None, "let x = 1;\n\nlet y = 2;"),
            ]
        );
    }

    #[test]
    fn test_extracted_images_named_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut png = Vec::new();
        image::RgbImage::new(4, 2)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let mut jpeg = Vec::new();
        image::RgbImage::new(3, 3)
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();
        std::fs::write(dir.path().join("a.png"), &png).unwrap();
        std::fs::write(dir.path().join("b.jpg"), &jpeg).unwrap();

        let doc = Document::from_blocks(vec![
            Block::image("a.png"),
            Block::image("b.jpg"),
            Block::image("a.png"),
        ]);
        let package = DocxWriter::default()
            .with_resource_dir(dir.path())
            .build(&doc)
            .unwrap();

        let media = MediaDir::new(dir.path().join("out/media"));
        let parsed = DocxReader::default()
            .with_media_dir(media.clone())
            .read_bytes(&package.bytes)
            .unwrap();
        let sources: Vec<&str> = parsed
            .document
            .images()
            .map(|(_, i)| i.source.as_str())
            .collect();
        assert_eq!(
            sources,
            vec!["media/image1.png", "media/image2.jpeg", "media/image1.png"]
        );
        assert_eq!(std::fs::read_dir(media.root()).unwrap().count(), 2);
        assert_eq!(std::fs::read(media.root().join("image1.png")).unwrap(), png);
    }

    #[test]
    fn test_quote_styles() {
        let document = body(
            r#"<w:p><w:pPr><w:pStyle w:val="IntenseQuote"/></w:pPr><w:r><w:t>said</w:t></w:r></w:p>
               <w:p><w:pPr><w:pStyle w:val="Quote"/></w:pPr><w:r><w:t>again</w:t></w:r></w:p>"#,
        );
        let data = package(&[(ooxml::PART_DOCUMENT, &document)]);
        let parsed = DocxReader::default().read_bytes(&data).unwrap();
        assert_eq!(
            parsed.document.blocks,
            vec![Block::quote("said"), Block::quote("again")]
        );
    }

    #[test]
    fn test_resolve_part() {
        assert_eq!(resolve_part("media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_part("../media/a.png"), "media/a.png");
        assert_eq!(resolve_part("/word/media/b.png"), "word/media/b.png");
    }
}
