//! Version ledger.
//!
//! Every persisted conversion is snapshotted as an immutable version:
//!
//! ```text
//! <root>/<lineage>/v0001/entry.json
//!                       /<name>.md
//!                       /<name>.docx
//!                       /media/...
//! ```
//!
//! A snapshot is assembled in a hidden staging directory and renamed into
//! place, so a version directory is either complete or absent. Entries are
//! never rewritten once published.

use crate::error::{Error, Result};
use crate::persist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ENTRY_FILE: &str = "entry.json";

/// Rename attempts before giving up on a contended sequence number.
const MAX_PUBLISH_ATTEMPTS: u32 = 64;

/// What produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOperation {
    /// Initial generation from Markdown
    Generate,
    /// A revision of an existing document
    Revise,
}

impl std::fmt::Display for SourceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceOperation::Generate => write!(f, "generate"),
            SourceOperation::Revise => write!(f, "revise"),
        }
    }
}

/// Name grouping all versions derived from one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lineage(String);

impl Lineage {
    /// Create a lineage name usable as a directory name.
    ///
    /// Characters outside `[A-Za-z0-9._-]` become `_`.
    pub fn new(name: &str) -> Result<Self> {
        let sanitized: String = name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.is_empty() || sanitized.starts_with('.') {
            return Err(Error::InvalidLineage(name.to_string()));
        }
        Ok(Self(sanitized))
    }

    /// Lineage of a document file: its file stem.
    pub fn from_path(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::InvalidLineage(path.display().to_string()))?;
        Self::new(stem)
    }

    /// The name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Lineage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable snapshot of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Lineage name
    pub lineage: String,

    /// Position in the lineage, starting at 1
    pub sequence: u32,

    /// Markdown snapshot
    pub markdown: PathBuf,

    /// Word snapshot
    pub word: PathBuf,

    /// Media directory snapshot, if the document had media
    pub media: Option<PathBuf>,

    /// When the version was recorded
    pub created: DateTime<Utc>,

    /// What produced the version
    pub operation: SourceOperation,
}

impl VersionEntry {
    /// Directory holding the snapshot.
    pub fn dir(&self) -> Option<&Path> {
        self.markdown.parent()
    }

    fn resolved_in(mut self, dir: &Path) -> Self {
        self.markdown = dir.join(&self.markdown);
        self.word = dir.join(&self.word);
        self.media = self.media.map(|m| dir.join(m));
        self
    }
}

fn version_dir_name(sequence: u32) -> String {
    format!("v{:04}", sequence)
}

fn parse_version_dir(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Append-only store of version entries.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    root: PathBuf,
}

impl VersionLedger {
    /// Open a ledger rooted at `root`. Nothing is created until a version is
    /// recorded.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ledger root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lineage_dir(&self, lineage: &Lineage) -> PathBuf {
        self.root.join(lineage.as_str())
    }

    fn sequences(&self, lineage: &Lineage) -> Result<Vec<u32>> {
        let dir = self.lineage_dir(lineage);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut sequences = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(seq) = entry.file_name().to_str().and_then(parse_version_dir) {
                sequences.push(seq);
            }
        }
        sequences.sort_unstable();
        Ok(sequences)
    }

    /// Snapshot the artifacts as the next version of `lineage`.
    ///
    /// Files are copied, so later edits to the working copies never change
    /// a recorded version.
    pub fn record(
        &self,
        lineage: &Lineage,
        markdown: &Path,
        word: &Path,
        media_dir: Option<&Path>,
        operation: SourceOperation,
    ) -> Result<VersionEntry> {
        let lineage_dir = self.lineage_dir(lineage);
        fs::create_dir_all(&lineage_dir).map_err(|e| Error::persistence(&lineage_dir, e))?;

        let staged = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&lineage_dir)
            .map_err(|e| Error::persistence(&lineage_dir, e))?;

        let file_name = |p: &Path| -> Result<PathBuf> {
            p.file_name()
                .map(PathBuf::from)
                .ok_or_else(|| Error::Other(format!("not a file path: {}", p.display())))
        };
        let md_name = file_name(markdown)?;
        let word_name = file_name(word)?;
        persist::copy_atomic(markdown, &staged.path().join(&md_name))?;
        persist::copy_atomic(word, &staged.path().join(&word_name))?;

        let media_name = match media_dir {
            Some(dir) if dir.is_dir() => {
                let name = file_name(dir)?;
                persist::copy_dir(dir, &staged.path().join(&name))?;
                Some(name)
            }
            _ => None,
        };

        let mut entry = VersionEntry {
            lineage: lineage.to_string(),
            sequence: self.sequences(lineage)?.last().map_or(1, |s| s + 1),
            markdown: md_name,
            word: word_name,
            media: media_name,
            created: Utc::now(),
            operation,
        };

        for _ in 0..MAX_PUBLISH_ATTEMPTS {
            let entry_path = staged.path().join(ENTRY_FILE);
            persist::write_atomic(&entry_path, &serde_json::to_vec_pretty(&entry)?)?;

            let target = lineage_dir.join(version_dir_name(entry.sequence));
            if target.exists() {
                entry.sequence += 1;
                continue;
            }
            match fs::rename(staged.path(), &target) {
                Ok(()) => {
                    log::info!(
                        "recorded {} v{} ({})",
                        lineage,
                        entry.sequence,
                        entry.operation
                    );
                    return Ok(entry.resolved_in(&target));
                }
                // Lost a race for this sequence number
                Err(_) if target.exists() => entry.sequence += 1,
                Err(e) => return Err(Error::persistence(&target, e)),
            }
        }
        Err(Error::persistence(
            &lineage_dir,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "could not allocate a version number",
            ),
        ))
    }

    fn load(&self, lineage: &Lineage, sequence: u32) -> Result<VersionEntry> {
        let dir = self.lineage_dir(lineage).join(version_dir_name(sequence));
        let data = fs::read(dir.join(ENTRY_FILE))?;
        let entry: VersionEntry = serde_json::from_slice(&data)?;
        Ok(entry.resolved_in(&dir))
    }

    /// All versions of `lineage`, oldest first.
    pub fn list(&self, lineage: &Lineage) -> Result<Vec<VersionEntry>> {
        let mut entries = Vec::new();
        for sequence in self.sequences(lineage)? {
            match self.load(lineage, sequence) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("skipping {} v{}: {}", lineage, sequence, e),
            }
        }
        Ok(entries)
    }

    /// One version of `lineage`.
    pub fn get(&self, lineage: &Lineage, sequence: u32) -> Result<VersionEntry> {
        let dir = self.lineage_dir(lineage).join(version_dir_name(sequence));
        if !dir.join(ENTRY_FILE).is_file() {
            return Err(Error::VersionNotFound {
                lineage: lineage.to_string(),
                sequence,
            });
        }
        self.load(lineage, sequence)
    }

    /// Most recent version of `lineage`, if any.
    pub fn latest(&self, lineage: &Lineage) -> Result<Option<VersionEntry>> {
        match self.sequences(lineage)?.last() {
            Some(&sequence) => self.load(lineage, sequence).map(Some),
            None => Ok(None),
        }
    }

    /// Names of all lineages with at least one version directory.
    pub fn lineages(&self) -> Result<Vec<Lineage>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lineages = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(lineage) = Lineage::new(&name) {
                if lineage.as_str() == name && !self.sequences(&lineage)?.is_empty() {
                    lineages.push(lineage);
                }
            }
        }
        lineages.sort();
        Ok(lineages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let md = dir.join("report.md");
        let docx = dir.join("report.docx");
        let media = dir.join("media");
        fs::write(&md, "# Report\n").unwrap();
        fs::write(&docx, b"PK").unwrap();
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("a.png"), b"png").unwrap();
        (md, docx, media)
    }

    #[test]
    fn test_lineage_names() {
        assert_eq!(Lineage::new("my report v2").unwrap().as_str(), "my_report_v2");
        assert_eq!(Lineage::new("a.b-c_d").unwrap().as_str(), "a.b-c_d");
        assert!(matches!(Lineage::new(""), Err(Error::InvalidLineage(_))));
        assert!(Lineage::new(".hidden").is_err());
        assert!(Lineage::new("..").is_err());
        assert_eq!(
            Lineage::from_path(Path::new("out/notes.md")).unwrap().as_str(),
            "notes"
        );
    }

    #[test]
    fn test_record_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (md, docx, media) = artifacts(dir.path());
        let ledger = VersionLedger::open(dir.path().join("versions"));
        let lineage = Lineage::new("report").unwrap();

        let first = ledger
            .record(&lineage, &md, &docx, Some(&media), SourceOperation::Generate)
            .unwrap();
        let second = ledger
            .record(&lineage, &md, &docx, None, SourceOperation::Revise)
            .unwrap();
        let third = ledger
            .record(&lineage, &md, &docx, None, SourceOperation::Revise)
            .unwrap();

        assert_eq!(
            [first.sequence, second.sequence, third.sequence],
            [1, 2, 3]
        );
        assert!(first.dir().unwrap().ends_with("v0001"));
        assert!(first.media.as_ref().unwrap().join("a.png").is_file());
        assert!(second.media.is_none());
    }

    #[test]
    fn test_snapshot_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let (md, docx, _) = artifacts(dir.path());
        let ledger = VersionLedger::open(dir.path().join("versions"));
        let lineage = Lineage::new("report").unwrap();

        let entry = ledger
            .record(&lineage, &md, &docx, None, SourceOperation::Generate)
            .unwrap();
        fs::write(&md, "# Changed\n").unwrap();

        let loaded = ledger.get(&lineage, 1).unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(fs::read_to_string(&loaded.markdown).unwrap(), "# Report\n");
    }

    #[test]
    fn test_list_get_latest() {
        let dir = tempfile::tempdir().unwrap();
        let (md, docx, _) = artifacts(dir.path());
        let ledger = VersionLedger::open(dir.path().join("versions"));
        let lineage = Lineage::new("report").unwrap();

        assert!(ledger.list(&lineage).unwrap().is_empty());
        assert!(ledger.latest(&lineage).unwrap().is_none());
        assert!(ledger.lineages().unwrap().is_empty());

        for op in [SourceOperation::Generate, SourceOperation::Revise] {
            ledger.record(&lineage, &md, &docx, None, op).unwrap();
        }

        let list = ledger.list(&lineage).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].operation, SourceOperation::Generate);
        assert_eq!(list[1].operation, SourceOperation::Revise);
        assert_eq!(ledger.latest(&lineage).unwrap().unwrap().sequence, 2);
        assert_eq!(ledger.lineages().unwrap(), vec![lineage.clone()]);

        assert!(matches!(
            ledger.get(&lineage, 9),
            Err(Error::VersionNotFound { sequence: 9, .. })
        ));
    }

    #[test]
    fn test_no_staging_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let (md, docx, _) = artifacts(dir.path());
        let ledger = VersionLedger::open(dir.path().join("versions"));
        let lineage = Lineage::new("report").unwrap();
        ledger
            .record(&lineage, &md, &docx, None, SourceOperation::Generate)
            .unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("versions/report"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["v0001".to_string()]);
    }

    #[test]
    fn test_entry_json_is_relative() {
        let dir = tempfile::tempdir().unwrap();
        let (md, docx, _) = artifacts(dir.path());
        let ledger = VersionLedger::open(dir.path().join("versions"));
        let lineage = Lineage::new("report").unwrap();
        let entry = ledger
            .record(&lineage, &md, &docx, None, SourceOperation::Generate)
            .unwrap();

        let raw: serde_json::Value = serde_json::from_slice(
            &fs::read(entry.dir().unwrap().join(ENTRY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["markdown"], "report.md");
        assert_eq!(raw["operation"], "generate");
    }

    #[test]
    fn test_parse_version_dir() {
        assert_eq!(parse_version_dir("v0012"), Some(12));
        assert_eq!(parse_version_dir("v"), None);
        assert_eq!(parse_version_dir(".staging-x"), None);
        assert_eq!(version_dir_name(3), "v0003");
    }
}
