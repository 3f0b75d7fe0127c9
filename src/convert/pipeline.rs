//! The conversion pipeline: validation, external attempt with fallback,
//! media normalization and version recording.

use super::{
    default_document_name, BuiltinConverter, ConversionJob, ConversionPath, ConvertOptions,
    DocumentConverter, PandocConverter, Stage,
};
use crate::detect::{detect_format_from_path, DocFormat};
use crate::error::{Diagnostic, DiagnosticKind, Error, Result};
use crate::ledger::{Lineage, SourceOperation, VersionEntry, VersionLedger};
use crate::media::{self, MediaDir};
use crate::model::{Block, Document};
use crate::parser::MarkdownParser;
use crate::persist;
use crate::render::to_markdown;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of [`Pipeline::generate_from_markdown`].
#[derive(Debug, Clone)]
pub struct GenerateResult {
    /// Normalized Markdown file
    pub markdown_path: PathBuf,

    /// Generated Word file
    pub word_path: PathBuf,

    /// Recorded version, when history is enabled
    pub version: Option<VersionEntry>,

    /// Non-fatal problems
    pub diagnostics: Vec<Diagnostic>,

    /// Strategy that produced the Word file
    pub path_taken: ConversionPath,

    /// Stages passed through, in order
    pub stages: Vec<Stage>,
}

/// Outcome of [`Pipeline::extract_to_markdown`].
#[derive(Debug, Clone)]
pub struct ExtractResult {
    /// Markdown text with image references inside the media directory
    pub markdown: String,

    /// Extracted document
    pub document: Document,

    /// Non-fatal problems
    pub diagnostics: Vec<Diagnostic>,

    /// Strategy that read the Word file
    pub path_taken: ConversionPath,

    /// Stages passed through, in order
    pub stages: Vec<Stage>,
}

/// Outcome of [`Pipeline::revise`].
#[derive(Debug, Clone)]
pub struct ReviseResult {
    /// The version recorded for the revision
    pub entry: VersionEntry,

    /// The regeneration that produced it
    pub generate: GenerateResult,
}

/// Stage trail and accumulated diagnostics of one request.
#[derive(Debug)]
struct Trail {
    stages: Vec<Stage>,
    diagnostics: Vec<Diagnostic>,
}

impl Trail {
    fn new() -> Self {
        Self {
            stages: vec![Stage::Idle],
            diagnostics: Vec::new(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("pipeline: {}", stage);
        self.stages.push(stage);
    }

    fn note(&mut self, diagnostic: Diagnostic) {
        let duplicate = self.diagnostics.iter().any(|d| {
            d.kind == diagnostic.kind
                && (d.message == diagnostic.message
                    || (d.block.is_some() && d.block == diagnostic.block))
        });
        if !duplicate {
            self.diagnostics.push(diagnostic);
        }
    }

    fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.note(diagnostic);
        }
    }

    fn fail(&mut self, err: &Error) {
        self.enter(Stage::Failed);
        let trail: Vec<String> = self.stages.iter().map(Stage::to_string).collect();
        log::debug!("pipeline failed after {}: {}", trail.join(" -> "), err);
    }
}

/// Conversion pipeline.
///
/// Stateless between requests; one pipeline can serve any number of
/// sequential conversions.
pub struct Pipeline {
    options: ConvertOptions,
    external: Option<Box<dyn DocumentConverter>>,
    builtin: BuiltinConverter,
}

impl Pipeline {
    /// Create a pipeline.
    pub fn new(options: ConvertOptions) -> Self {
        let builtin = BuiltinConverter::new(options.parse.clone(), options.render.clone());
        Self {
            options,
            external: None,
            builtin,
        }
    }

    /// Use `converter` for the external attempt instead of discovering pandoc.
    pub fn with_external_converter(mut self, converter: Box<dyn DocumentConverter>) -> Self {
        self.external = Some(converter);
        self
    }

    /// Options in use.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Ledger for documents stored in `dir`.
    pub fn ledger_for(&self, dir: &Path) -> VersionLedger {
        match &self.options.versions_dir {
            Some(root) => VersionLedger::open(root),
            None => VersionLedger::open(dir.join("versions")),
        }
    }

    fn external_enabled(&self) -> bool {
        self.external.is_some() || self.options.external.enabled
    }

    fn run_external(&self, job: &ConversionJob) -> Result<Vec<Diagnostic>> {
        let discovered;
        let converter: &dyn DocumentConverter = match &self.external {
            Some(converter) => converter.as_ref(),
            None => {
                discovered = PandocConverter::discover(&self.options.external)?;
                &discovered
            }
        };
        if !converter.supports(job.source, job.target) {
            return Err(Error::ExternalToolUnavailable(format!(
                "{} cannot convert {} to {}",
                converter.name(),
                job.source,
                job.target
            )));
        }
        converter.convert(job)
    }

    /// Run the external tool when enabled. A failure is recorded and
    /// reported as `false` so the caller can fall back.
    fn try_external(&self, job: &ConversionJob, trail: &mut Trail) -> bool {
        if !self.external_enabled() {
            return false;
        }
        trail.enter(Stage::ExternalAttempt);
        match self.run_external(job) {
            Ok(diagnostics) => {
                trail.extend(diagnostics);
                true
            }
            Err(e) => {
                log::warn!("external conversion failed, using built-in codecs: {}", e);
                trail.note(Diagnostic::from_error(&e).unwrap_or_else(|| {
                    Diagnostic::new(DiagnosticKind::ExternalToolFailed, e.to_string())
                }));
                false
            }
        }
    }

    /// Convert one file, preferring the external tool and falling back to
    /// the built-in codecs on any external failure.
    fn convert(&self, job: &ConversionJob, trail: &mut Trail) -> Result<ConversionPath> {
        if self.try_external(job, trail) {
            return Ok(ConversionPath::External);
        }
        trail.enter(Stage::BuiltinConvert);
        let diagnostics = self.builtin.convert(job)?;
        trail.extend(diagnostics);
        Ok(ConversionPath::Builtin)
    }

    /// Write `text` as a Markdown file and generate its Word counterpart.
    ///
    /// Both files land in `media.base()`. Image references are normalized
    /// into `media` first, so the Markdown file and the Word file agree on
    /// every image.
    pub fn generate_from_markdown(&self, text: &str, media: &MediaDir) -> Result<GenerateResult> {
        let name = self
            .options
            .document_name
            .clone()
            .unwrap_or_else(default_document_name);
        let operation = self
            .options
            .record_versions
            .then_some(SourceOperation::Generate);

        let mut trail = Trail::new();
        self.generate(text, media, &name, operation, &mut trail)
            .map_err(|e| {
                trail.fail(&e);
                e
            })
    }

    fn generate(
        &self,
        text: &str,
        media: &MediaDir,
        name: &str,
        record: Option<SourceOperation>,
        trail: &mut Trail,
    ) -> Result<GenerateResult> {
        trail.enter(Stage::Validating);
        let lineage = Lineage::new(name)?;
        let parsed = MarkdownParser::new(self.options.parse.clone()).parse(text);
        let mut document = parsed.document;
        let repaired = document.validate();
        if repaired > 0 {
            log::debug!("repaired {} blocks", repaired);
        }
        trail.extend(parsed.diagnostics);

        trail.enter(Stage::Normalizing);
        let (normalized, report) = media::normalize_markdown(text, &mut document, media)?;
        trail.extend(report.diagnostics);

        let dir = media.base().to_path_buf();
        let markdown_path = dir.join(format!("{}.md", name));
        let word_path = dir.join(format!("{}.docx", name));

        // Both files reach their final place only once the conversion worked.
        let scratch = tempfile::tempdir()?;
        let scratch_md = scratch.path().join(format!("{}.md", name));
        let scratch_docx = scratch.path().join(format!("{}.docx", name));
        persist::write_atomic(&scratch_md, normalized.as_bytes())?;

        let job = ConversionJob::new(&scratch_md, DocFormat::Markdown, &scratch_docx, DocFormat::Docx)
            .with_resource_dir(&dir)
            .with_working_dir(&dir);
        let path_taken = self.convert(&job, trail)?;

        persist::copy_atomic(&scratch_docx, &word_path)?;
        if let Err(e) = persist::write_atomic(&markdown_path, normalized.as_bytes()) {
            if let Err(cleanup) = fs::remove_file(&word_path) {
                log::warn!("cannot remove {}: {}", word_path.display(), cleanup);
            }
            return Err(e);
        }

        let version = match record {
            Some(operation) => {
                trail.enter(Stage::Persisted);
                let media_dir = media.root().is_dir().then(|| media.root());
                Some(self.ledger_for(&dir).record(
                    &lineage,
                    &markdown_path,
                    &word_path,
                    media_dir,
                    operation,
                )?)
            }
            None => None,
        };

        log::info!(
            "generated {} via {}",
            word_path.display(),
            path_taken
        );
        Ok(GenerateResult {
            markdown_path,
            word_path,
            version,
            diagnostics: std::mem::take(&mut trail.diagnostics),
            path_taken,
            stages: std::mem::take(&mut trail.stages),
        })
    }

    /// Extract a Word file into Markdown text, collecting its images into
    /// `media`.
    pub fn extract_to_markdown(&self, word_path: &Path, media: &MediaDir) -> Result<ExtractResult> {
        let mut trail = Trail::new();
        self.extract(word_path, media, &mut trail).map_err(|e| {
            trail.fail(&e);
            e
        })
    }

    fn extract(&self, word_path: &Path, media: &MediaDir, trail: &mut Trail) -> Result<ExtractResult> {
        trail.enter(Stage::Validating);
        let format = detect_format_from_path(word_path)?;
        if format != DocFormat::Docx {
            return Err(Error::UnsupportedFormat(format!(
                "{} is not a Word document",
                word_path.display()
            )));
        }

        // Converters write into a scratch directory; normalization then
        // copies only the referenced images into `media`.
        let scratch = tempfile::tempdir()?;
        let scratch_md = scratch.path().join("extracted.md");
        let scratch_media = MediaDir::with_base(scratch.path().join("media"), scratch.path());
        let job = ConversionJob::new(word_path, DocFormat::Docx, &scratch_md, DocFormat::Markdown)
            .with_media_dir(scratch_media)
            .with_working_dir(scratch.path());
        let (mut document, path_taken) = if self.try_external(&job, trail) {
            let text = fs::read_to_string(&scratch_md)?;
            let parsed = MarkdownParser::new(self.options.parse.clone()).parse(&text);
            trail.extend(parsed.diagnostics);
            (parsed.document, ConversionPath::External)
        } else {
            // The reader's model is used as is; no Markdown round trip.
            trail.enter(Stage::BuiltinConvert);
            let parsed = self.builtin.read_docx(word_path, job.media_dir.as_ref())?;
            trail.extend(parsed.diagnostics);
            (parsed.document, ConversionPath::Builtin)
        };

        trail.enter(Stage::Normalizing);
        anchor_images(&mut document, scratch.path());
        let report = media::normalize(&mut document, media)?;
        trail.extend(report.diagnostics);

        let markdown = to_markdown(&document, &self.options.render);
        log::info!(
            "extracted {} ({} blocks) via {}",
            word_path.display(),
            document.len(),
            path_taken
        );
        Ok(ExtractResult {
            markdown,
            document,
            diagnostics: std::mem::take(&mut trail.diagnostics),
            path_taken,
            stages: std::mem::take(&mut trail.stages),
        })
    }

    /// Save `revised_text` as a new revision of `existing_markdown`.
    ///
    /// The working copy next to `existing_markdown` (and its Word file) is
    /// regenerated and a `revise` version recorded. A document with no
    /// history yet gets its current state recorded first, so the revision
    /// never loses the original.
    pub fn revise(&self, existing_markdown: &Path, revised_text: &str) -> Result<ReviseResult> {
        let mut trail = Trail::new();
        self.revise_in(existing_markdown, revised_text, &mut trail)
            .map_err(|e| {
                trail.fail(&e);
                e
            })
    }

    fn revise_in(
        &self,
        existing_markdown: &Path,
        revised_text: &str,
        trail: &mut Trail,
    ) -> Result<ReviseResult> {
        let lineage = Lineage::from_path(existing_markdown)?;
        let name = existing_markdown
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::InvalidLineage(existing_markdown.display().to_string()))?;
        let dir = match existing_markdown.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let media = MediaDir::with_base(dir.join(&self.options.media_dir_name), &dir);

        let ledger = self.ledger_for(&dir);
        let word = existing_markdown.with_extension("docx");
        if ledger.latest(&lineage)?.is_none() && existing_markdown.is_file() && word.is_file() {
            let media_dir = media.root().is_dir().then(|| media.root());
            ledger.record(
                &lineage,
                existing_markdown,
                &word,
                media_dir,
                SourceOperation::Generate,
            )?;
        }

        let generate = self.generate(
            revised_text,
            &media,
            name,
            Some(SourceOperation::Revise),
            trail,
        )?;
        let entry = generate
            .version
            .clone()
            .ok_or_else(|| Error::Other("revision was not recorded".to_string()))?;
        Ok(ReviseResult { entry, generate })
    }
}

/// Make relative image paths absolute under `dir`, where the converter
/// left the extracted files.
fn anchor_images(document: &mut Document, dir: &Path) {
    for block in &mut document.blocks {
        if let Block::Image(image) = block {
            if image.is_remote() || Path::new(&image.source).is_absolute() {
                continue;
            }
            let candidate = dir.join(&image.source);
            if candidate.is_file() {
                image.source = candidate.to_string_lossy().into_owned();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::is_docx;
    use crate::model::TextRun;

    struct FailingConverter;

    impl DocumentConverter for FailingConverter {
        fn name(&self) -> &str {
            "failing"
        }

        fn supports(&self, _: DocFormat, _: DocFormat) -> bool {
            true
        }

        fn convert(&self, _: &ConversionJob) -> Result<Vec<Diagnostic>> {
            Err(Error::ExternalToolFailed("exit status: 1".to_string()))
        }
    }

    fn options() -> ConvertOptions {
        ConvertOptions::new().with_document_name("doc")
    }

    #[test]
    fn test_generate_builtin_path() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaDir::new(dir.path().join("media"));
        let result = Pipeline::new(options())
            .generate_from_markdown("# Title\n\nBody.\n", &media)
            .unwrap();

        assert_eq!(result.path_taken, ConversionPath::Builtin);
        assert!(is_docx(&result.word_path));
        assert_eq!(result.markdown_path, dir.path().join("doc.md"));
        assert_eq!(
            result.stages,
            vec![
                Stage::Idle,
                Stage::Validating,
                Stage::Normalizing,
                Stage::BuiltinConvert,
                Stage::Persisted
            ]
        );
        assert_eq!(result.version.unwrap().sequence, 1);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_external_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaDir::new(dir.path().join("media"));
        let result = Pipeline::new(options().with_history(false))
            .with_external_converter(Box::new(FailingConverter))
            .generate_from_markdown("Text\n", &media)
            .unwrap();

        assert_eq!(result.path_taken, ConversionPath::Builtin);
        assert!(result.stages.contains(&Stage::ExternalAttempt));
        assert!(result.version.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::ExternalToolFailed);
    }

    #[test]
    fn test_missing_image_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaDir::new(dir.path().join("media"));
        let result = Pipeline::new(options().with_history(false))
            .generate_from_markdown("![x](nowhere.png)\n", &media)
            .unwrap();

        assert!(is_docx(&result.word_path));
        let missing: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::MediaMissing)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].block, Some(0));
    }

    #[test]
    fn test_extract_rejects_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, "# x\n").unwrap();
        let err = Pipeline::new(options())
            .extract_to_markdown(&path, &MediaDir::new(dir.path().join("media")))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_failed_persist_leaves_no_markdown() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("doc.docx/locked")).unwrap();
        let media = MediaDir::new(dir.path().join("media"));

        let err = Pipeline::new(options().with_history(false))
            .generate_from_markdown("# Title\n", &media)
            .unwrap_err();
        assert!(matches!(err, Error::PersistenceFailed { .. }));
        assert!(!dir.path().join("doc.md").exists());
        assert!(dir.path().join("doc.docx").is_dir());
    }

    #[test]
    fn test_extract_keeps_bold_before_text() {
        let dir = tempfile::tempdir().unwrap();
        let word = dir.path().join("note.docx");
        let doc = Document::from_blocks(vec![Block::paragraph_runs(vec![
            TextRun::bold("Note:"),
            TextRun::new("text"),
        ])]);
        crate::render::DocxWriter::default().write(&doc, &word).unwrap();

        let result = Pipeline::new(options())
            .extract_to_markdown(&word, &MediaDir::new(dir.path().join("media")))
            .unwrap();
        assert_eq!(result.path_taken, ConversionPath::Builtin);
        assert_eq!(result.document.blocks, doc.blocks);
        assert_eq!(result.markdown, "**Note:**&#116;ext\n");
    }

    #[test]
    fn test_anchor_images() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("media")).unwrap();
        fs::write(dir.path().join("media/a.png"), b"png").unwrap();
        let mut doc = Document::from_blocks(vec![
            Block::image("media/a.png"),
            Block::image("media/gone.png"),
            Block::image("https://example.com/b.png"),
        ]);
        anchor_images(&mut doc, dir.path());

        let sources: Vec<&str> = doc.images().map(|(_, i)| i.source.as_str()).collect();
        assert!(Path::new(sources[0]).is_absolute());
        assert_eq!(sources[1], "media/gone.png");
        assert_eq!(sources[2], "https://example.com/b.png");
    }
}
