//! Conversion through an external tool (pandoc) run as a subprocess.
//!
//! The tool is untrusted: it runs under a timeout, writes to a temporary
//! file next to the destination, and its output is checked before it is
//! renamed into place.

use super::{ConversionJob, DocumentConverter, ExternalToolOptions};
use crate::detect::{is_docx_bytes, DocFormat};
use crate::error::{Diagnostic, Error, Result};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest stderr excerpt carried in an error message.
const STDERR_LIMIT: usize = 2000;

/// Converter that shells out to pandoc.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
    timeout: Duration,
}

impl PandocConverter {
    /// Create a converter running `program`.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Locate the tool: the configured program, or `pandoc` on `PATH`.
    pub fn discover(options: &ExternalToolOptions) -> Result<Self> {
        if let Some(program) = &options.program {
            return Ok(Self::new(program, options.timeout));
        }
        Self::find_on_path().map(|program| Self::new(program, options.timeout))
    }

    #[cfg(feature = "external-tool")]
    fn find_on_path() -> Result<PathBuf> {
        which::which("pandoc").map_err(|e| {
            Error::ExternalToolUnavailable(format!("pandoc not found on PATH: {}", e))
        })
    }

    #[cfg(not(feature = "external-tool"))]
    fn find_on_path() -> Result<PathBuf> {
        Err(Error::ExternalToolUnavailable(
            "no program configured and PATH lookup is disabled".to_string(),
        ))
    }

    /// Program this converter runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, job: &ConversionJob, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&job.input)
            .arg("-f")
            .arg(job.source.tool_name())
            .arg("-t")
            .arg(match job.target {
                DocFormat::Markdown => "gfm",
                DocFormat::Docx => "docx",
            })
            .arg("-o")
            .arg(output);

        if !job.resource_dirs.is_empty() {
            if let Ok(joined) = std::env::join_paths(&job.resource_dirs) {
                let mut arg = OsString::from("--resource-path=");
                arg.push(joined);
                cmd.arg(arg);
            }
        }
        if job.target == DocFormat::Markdown {
            if let Some(media) = &job.media_dir {
                let mut arg = OsString::from("--extract-media=");
                arg.push(media.root());
                cmd.arg(arg);
            }
        }
        if let Some(dir) = &job.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= self.timeout {
                // Already exited between the poll and the kill is fine
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ExternalToolFailed(format!(
                    "{} timed out after {:?}",
                    self.program.display(),
                    self.timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn read_stderr(file: &mut fs::File) -> String {
    let mut text = String::new();
    if file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = file.read_to_string(&mut text);
    }
    let mut text = text.trim().to_string();
    if text.len() > STDERR_LIMIT {
        let mut cut = STDERR_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn validate(target: DocFormat, data: &[u8]) -> Result<()> {
    let ok = match target {
        DocFormat::Docx => is_docx_bytes(data),
        DocFormat::Markdown => std::str::from_utf8(data).is_ok(),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::ExternalToolFailed(format!(
            "output is not a valid {} file",
            target
        )))
    }
}

impl DocumentConverter for PandocConverter {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn supports(&self, source: DocFormat, target: DocFormat) -> bool {
        source != target
    }

    fn convert(&self, job: &ConversionJob) -> Result<Vec<Diagnostic>> {
        let dir = match job.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;

        let tmp = tempfile::Builder::new()
            .prefix(".mdocx-")
            .suffix(&format!(".{}", job.target.extension()))
            .tempfile_in(&dir)
            .map_err(|e| Error::persistence(&job.output, e))?;
        let mut stderr = tempfile::tempfile()?;

        log::debug!(
            "running {} on {} -> {}",
            self.program.display(),
            job.input.display(),
            job.target
        );
        let mut child = self
            .command(job, tmp.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    Error::ExternalToolUnavailable(format!(
                        "cannot run {}: {}",
                        self.program.display(),
                        e
                    ))
                }
                _ => Error::ExternalToolFailed(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                )),
            })?;

        let status = self.wait(&mut child)?;
        if !status.success() {
            let detail = read_stderr(&mut stderr);
            return Err(Error::ExternalToolFailed(if detail.is_empty() {
                format!("{} exited with {}", self.program.display(), status)
            } else {
                format!("{} exited with {}: {}", self.program.display(), status, detail)
            }));
        }

        let data = fs::read(tmp.path())?;
        validate(job.target, &data)?;
        tmp.persist(&job.output)
            .map_err(|e| Error::persistence(&job.output, e.error))?;
        Ok(Vec::new())
    }
}
