//! Conversion with the built-in Markdown and Word codecs.

use super::{ConversionJob, DocumentConverter};
use crate::detect::DocFormat;
use crate::error::{Diagnostic, Error, Result};
use crate::media::MediaDir;
use crate::parser::{DocxReader, MarkdownParser, ParseOptions, Parsed};
use crate::persist;
use crate::render::{to_markdown, DocxWriter, RenderOptions};
use std::fs;
use std::path::Path;

/// Converter backed by the in-process codecs.
///
/// Always available; the pipeline falls back to it whenever the external
/// tool cannot be used.
#[derive(Debug, Clone, Default)]
pub struct BuiltinConverter {
    parse: ParseOptions,
    render: RenderOptions,
}

impl BuiltinConverter {
    /// Create a converter with the given codec options.
    pub fn new(parse: ParseOptions, render: RenderOptions) -> Self {
        Self { parse, render }
    }

    fn markdown_to_docx(&self, job: &ConversionJob) -> Result<Vec<Diagnostic>> {
        let text = fs::read_to_string(&job.input)?;
        let parsed = MarkdownParser::new(self.parse.clone()).parse(&text);

        let mut resource_dirs = job.resource_dirs.clone();
        if resource_dirs.is_empty() {
            if let Some(dir) = job.working_dir.clone().or_else(|| input_dir(job)) {
                resource_dirs.push(dir);
            }
        }

        let mut diagnostics = parsed.diagnostics;
        diagnostics.extend(
            DocxWriter::new(self.render.clone())
                .with_resource_dirs(resource_dirs)
                .write(&parsed.document, &job.output)?,
        );
        Ok(diagnostics)
    }

    /// Read a Word file straight into the block model, copying its images
    /// into `media` when given.
    pub fn read_docx(&self, input: &Path, media: Option<&MediaDir>) -> Result<Parsed> {
        self.read(input, media).map_err(|e| failure(input, e))
    }

    fn read(&self, input: &Path, media: Option<&MediaDir>) -> Result<Parsed> {
        let mut reader = DocxReader::new(self.parse.clone());
        if let Some(media) = media {
            reader = reader.with_media_dir(media.clone());
        }
        reader.read_file(input)
    }

    fn docx_to_markdown(&self, job: &ConversionJob) -> Result<Vec<Diagnostic>> {
        let parsed = self.read(&job.input, job.media_dir.as_ref())?;
        let markdown = to_markdown(&parsed.document, &self.render);
        persist::write_atomic(&job.output, markdown.as_bytes())?;
        Ok(parsed.diagnostics)
    }
}

/// Persistence errors pass through; anything else means the codec failed.
fn failure(input: &Path, err: Error) -> Error {
    match err {
        Error::PersistenceFailed { .. } => err,
        other => Error::BuiltinConversionFailed(format!("{}: {}", input.display(), other)),
    }
}

fn input_dir(job: &ConversionJob) -> Option<std::path::PathBuf> {
    job.input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
}

impl DocumentConverter for BuiltinConverter {
    fn name(&self) -> &str {
        "builtin"
    }

    fn supports(&self, _source: DocFormat, _target: DocFormat) -> bool {
        true
    }

    fn convert(&self, job: &ConversionJob) -> Result<Vec<Diagnostic>> {
        log::debug!(
            "builtin: {} ({}) -> {} ({})",
            job.input.display(),
            job.source,
            job.output.display(),
            job.target
        );

        let result = match (job.source, job.target) {
            (DocFormat::Markdown, DocFormat::Docx) => self.markdown_to_docx(job),
            (DocFormat::Docx, DocFormat::Markdown) => self.docx_to_markdown(job),
            _ => persist::copy_atomic(&job.input, &job.output).map(|_| Vec::new()),
        };

        result.map_err(|e| failure(&job.input, e))
    }
}
