//! Conversion orchestration.
//!
//! Two interchangeable strategies implement [`DocumentConverter`]: the
//! built-in codecs ([`BuiltinConverter`]) and an external high-fidelity tool
//! run as a subprocess ([`PandocConverter`]). The [`Pipeline`] prefers the
//! external tool when it is enabled and falls back to the built-in codecs on
//! any external failure.
//!
//! # Example
//!
//! ```no_run
//! use mdocx::convert::{ConvertOptions, Pipeline};
//! use mdocx::media::MediaDir;
//!
//! fn main() -> mdocx::Result<()> {
//!     let pipeline = Pipeline::new(ConvertOptions::default());
//!     let result = pipeline.generate_from_markdown("# Report\n", &MediaDir::new("out/media"))?;
//!     println!("{} via {}", result.word_path.display(), result.path_taken);
//!     Ok(())
//! }
//! ```

mod builtin;
mod external;
mod pipeline;

pub use builtin::BuiltinConverter;
pub use external::PandocConverter;
pub use pipeline::{ExtractResult, GenerateResult, Pipeline, ReviseResult};

use crate::detect::DocFormat;
use crate::error::{Diagnostic, Result};
use crate::media::MediaDir;
use crate::parser::ParseOptions;
use crate::render::RenderOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings of the external conversion tool.
#[derive(Debug, Clone)]
pub struct ExternalToolOptions {
    /// Whether the external tool is tried at all
    pub enabled: bool,

    /// Program to run; `pandoc` is looked up on `PATH` when unset
    pub program: Option<PathBuf>,

    /// Upper bound on one tool invocation
    pub timeout: Duration,
}

impl ExternalToolOptions {
    /// Default per-invocation timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create options with the tool disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the tool.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Use a specific program.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ExternalToolOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            program: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Options for the conversion pipeline.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Markdown and Word reading options
    pub parse: ParseOptions,

    /// Markdown and Word writing options
    pub render: RenderOptions,

    /// External tool settings
    pub external: ExternalToolOptions,

    /// Name of the media directory next to a document
    pub media_dir_name: String,

    /// Where version history is kept; `<document dir>/versions` when unset
    pub versions_dir: Option<PathBuf>,

    /// Whether generated artifacts are recorded in the version ledger
    pub record_versions: bool,

    /// Base name of generated files; timestamped when unset
    pub document_name: Option<String>,
}

impl ConvertOptions {
    /// Create new conversion options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set parse options.
    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse = options;
        self
    }

    /// Set rendering options.
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render = options;
        self
    }

    /// Set external tool options.
    pub fn with_external(mut self, options: ExternalToolOptions) -> Self {
        self.external = options;
        self
    }

    /// Set the version history directory.
    pub fn with_versions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.versions_dir = Some(dir.into());
        self
    }

    /// Enable or disable version recording.
    pub fn with_history(mut self, record: bool) -> Self {
        self.record_versions = record;
        self
    }

    /// Set the base name of generated files.
    pub fn with_document_name(mut self, name: impl Into<String>) -> Self {
        self.document_name = Some(name.into());
        self
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            render: RenderOptions::default(),
            external: ExternalToolOptions::default(),
            media_dir_name: "media".to_string(),
            versions_dir: None,
            record_versions: true,
            document_name: None,
        }
    }
}

/// Timestamped document name, `document_YYYYMMDD_HHMMSS`.
pub fn default_document_name() -> String {
    chrono::Local::now()
        .format("document_%Y%m%d_%H%M%S")
        .to_string()
}

/// One file-to-file conversion.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Source file
    pub input: PathBuf,

    /// Source format
    pub source: DocFormat,

    /// Destination file, replaced atomically
    pub output: PathBuf,

    /// Destination format
    pub target: DocFormat,

    /// Directories relative image paths are resolved against
    pub resource_dirs: Vec<PathBuf>,

    /// Where images extracted from a Word source go
    pub media_dir: Option<MediaDir>,

    /// Working directory of the conversion
    pub working_dir: Option<PathBuf>,
}

impl ConversionJob {
    /// Create a job converting `input` to `output`.
    pub fn new(
        input: impl Into<PathBuf>,
        source: DocFormat,
        output: impl Into<PathBuf>,
        target: DocFormat,
    ) -> Self {
        Self {
            input: input.into(),
            source,
            output: output.into(),
            target,
            resource_dirs: Vec::new(),
            media_dir: None,
            working_dir: None,
        }
    }

    /// Add a resource directory.
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dirs.push(dir.into());
        self
    }

    /// Set the media directory for extracted images.
    pub fn with_media_dir(mut self, media: MediaDir) -> Self {
        self.media_dir = Some(media);
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// A conversion strategy.
///
/// Implementations write `job.output` atomically and return the non-fatal
/// problems they met.
pub trait DocumentConverter: Send + Sync {
    /// Get the name of this converter.
    fn name(&self) -> &str;

    /// Check if this converter handles the given direction.
    fn supports(&self, source: DocFormat, target: DocFormat) -> bool;

    /// Run one conversion.
    fn convert(&self, job: &ConversionJob) -> Result<Vec<Diagnostic>>;
}

/// Which strategy produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionPath {
    /// The external tool
    External,
    /// The built-in codecs
    Builtin,
}

impl std::fmt::Display for ConversionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionPath::External => write!(f, "external tool"),
            ConversionPath::Builtin => write!(f, "built-in codecs"),
        }
    }
}

/// Pipeline states, in the order a request passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Validating,
    ExternalAttempt,
    BuiltinConvert,
    Normalizing,
    Persisted,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Validating => "validating",
            Stage::ExternalAttempt => "external-attempt",
            Stage::BuiltinConvert => "builtin-convert",
            Stage::Normalizing => "normalizing",
            Stage::Persisted => "persisted",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_options_builder() {
        let options = ConvertOptions::new()
            .with_history(false)
            .with_document_name("report")
            .with_external(
                ExternalToolOptions::new()
                    .enabled(true)
                    .with_timeout(Duration::from_secs(5)),
            );

        assert!(!options.record_versions);
        assert_eq!(options.document_name.as_deref(), Some("report"));
        assert!(options.external.enabled);
        assert_eq!(options.external.timeout, Duration::from_secs(5));
        assert_eq!(options.media_dir_name, "media");
    }

    #[test]
    fn test_external_disabled_by_default() {
        let options = ConvertOptions::default();
        assert!(!options.external.enabled);
        assert_eq!(options.external.timeout, ExternalToolOptions::DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_default_document_name() {
        let name = default_document_name();
        assert!(name.starts_with("document_"));
        assert_eq!(name.len(), "document_20240101_120000".len());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::ExternalAttempt.to_string(), "external-attempt");
        assert_eq!(ConversionPath::Builtin.to_string(), "built-in codecs");
    }
}
