//! Media normalization.
//!
//! Keeps every image reference of a document resolvable inside the
//! document's media directory. Files living elsewhere are copied in under a
//! collision-free name and the reference is rewritten; references that
//! already resolve inside the directory are left alone, so normalizing twice
//! changes nothing.

use crate::error::{Diagnostic, DiagnosticKind, Error, Result};
use crate::model::{Block, Document, ImageFormat, ImageRef, MediaRef};
use crate::parser::{fenced_lines, parse_markdown};
use crate::persist;
use md5::{Digest, Md5};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// A document's media directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDir {
    root: PathBuf,
    base: PathBuf,
}

impl MediaDir {
    /// Media directory `root`, with references written relative to its parent.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let base = match root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self { root, base }
    }

    /// Media directory `root`, with references written relative to `base`.
    pub fn with_base(root: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base: base.into(),
        }
    }

    /// The directory holding the media files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory references are relative to.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Relative path from the base to the media directory, with `/` separators.
    pub fn prefix(&self) -> String {
        let root = absolute(&self.root);
        let base = absolute(&self.base);
        pathdiff::diff_paths(&root, &base)
            .map(|rel| {
                rel.components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                        Component::ParentDir => Some("..".to_string()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|| root.to_string_lossy().into_owned())
    }

    /// How a file named `name` inside the media directory is referenced.
    pub fn written_path(&self, name: &str) -> String {
        let prefix = self.prefix();
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// Where an as-written reference points on disk.
    pub fn resolve(&self, written: &str) -> PathBuf {
        let path = Path::new(written);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }

    /// Whether `path` lies inside the media directory.
    pub fn contains(&self, path: &Path) -> bool {
        absolute(path).starts_with(absolute(&self.root))
    }

    /// Create the directory if needed.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::persistence(&self.root, e))
    }
}

/// Absolute, lexically normalized form of a path.
fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            c => out.push(c.as_os_str()),
        }
    }
    out
}

/// What a normalization pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    /// Every image reference that resolves, after rewriting
    pub references: Vec<MediaRef>,

    /// Files copied into the media directory
    pub copied: usize,

    /// References whose as-written path changed
    pub rewritten: usize,

    /// Missing and unsupported media
    pub diagnostics: Vec<Diagnostic>,
}

impl NormalizeReport {
    /// Whether the pass changed the document.
    pub fn changed(&self) -> bool {
        self.rewritten > 0
    }
}

enum Resolution {
    Kept(PathBuf),
    Rewritten {
        written: String,
        resolved: PathBuf,
        copied: bool,
    },
    Missing(String),
    Unsupported(PathBuf),
}

/// Make every image reference in `doc` resolve inside `media`.
///
/// Problems with individual references become diagnostics; only I/O errors
/// while copying abort.
pub fn normalize(doc: &mut Document, media: &MediaDir) -> Result<NormalizeReport> {
    let mut report = NormalizeReport::default();
    let mut imported: HashMap<PathBuf, String> = HashMap::new();

    for (index, block) in doc.blocks.iter_mut().enumerate() {
        let Block::Image(image) = block else {
            continue;
        };

        match resolve_image(image, media, &mut imported)? {
            Resolution::Kept(resolved) => {
                report
                    .references
                    .push(MediaRef::new(image.source.clone(), resolved));
            }
            Resolution::Rewritten {
                written,
                resolved,
                copied,
            } => {
                log::debug!("media: {} -> {}", image.source, written);
                image.source = written;
                report.rewritten += 1;
                if copied {
                    report.copied += 1;
                }
                report
                    .references
                    .push(MediaRef::new(image.source.clone(), resolved));
            }
            Resolution::Missing(reason) => {
                let diagnostic = Diagnostic::new(
                    DiagnosticKind::MediaMissing,
                    format!("{}: {}", image.source, reason),
                )
                .at_block(index);
                log::warn!("{}", diagnostic);
                report.diagnostics.push(diagnostic);
            }
            Resolution::Unsupported(path) => {
                let diagnostic = Diagnostic::new(
                    DiagnosticKind::MediaUnsupported,
                    format!("{}: unsupported image type", path.display()),
                )
                .at_block(index);
                log::warn!("{}", diagnostic);
                report.diagnostics.push(diagnostic);
            }
        }
    }

    if report.copied > 0 || report.rewritten > 0 {
        log::info!(
            "normalized media into {}: {} copied, {} rewritten",
            media.root().display(),
            report.copied,
            report.rewritten
        );
    }
    Ok(report)
}

fn is_supported(path: &Path) -> bool {
    if ImageFormat::from_path(path).is_some() {
        return true;
    }
    let mut header = [0u8; 32];
    let read = fs::File::open(path).and_then(|mut f| std::io::Read::read(&mut f, &mut header));
    matches!(read, Ok(n) if ImageFormat::detect(&header[..n]).is_some())
}

fn resolve_image(
    image: &ImageRef,
    media: &MediaDir,
    imported: &mut HashMap<PathBuf, String>,
) -> Result<Resolution> {
    if image.is_remote() {
        return Ok(Resolution::Missing(
            "remote image is not stored locally".to_string(),
        ));
    }

    let path = media.resolve(&image.source);
    if path.is_file() {
        if !is_supported(&path) {
            return Ok(Resolution::Unsupported(path));
        }
        if media.contains(&path) {
            return Ok(Resolution::Kept(path));
        }

        let key = absolute(&path);
        if let Some(written) = imported.get(&key) {
            return Ok(Resolution::Rewritten {
                written: written.clone(),
                resolved: media.resolve(written),
                copied: false,
            });
        }
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) => return Ok(Resolution::Missing(format!("unreadable: {}", e))),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image");
        let (stored, copied) = store(media, name, &data)?;
        let written = media.written_path(&stored);
        imported.insert(key, written.clone());
        return Ok(Resolution::Rewritten {
            resolved: media.root().join(&stored),
            written,
            copied,
        });
    }

    // A bare file name that only exists in the media directory.
    let bare = !image.source.contains(['/', '\\']);
    let candidate = media.root().join(&image.source);
    if bare && candidate.is_file() {
        if !is_supported(&candidate) {
            return Ok(Resolution::Unsupported(candidate));
        }
        return Ok(Resolution::Rewritten {
            written: media.written_path(&image.source),
            resolved: candidate,
            copied: false,
        });
    }

    Ok(Resolution::Missing("file not found".to_string()))
}

/// Store image bytes in the media directory and return the as-written path.
///
/// Identical content already present is reused rather than copied again.
pub fn store_media_bytes(media: &MediaDir, name: &str, data: &[u8]) -> Result<String> {
    let (stored, _) = store(media, name, data)?;
    Ok(media.written_path(&stored))
}

/// Returns the stored file name and whether a new file was written.
fn store(media: &MediaDir, name: &str, data: &[u8]) -> Result<(String, bool)> {
    media.ensure()?;
    let name = safe_file_name(name);

    let mut candidates = vec![name.clone(), hashed_name(&name, data, None)];
    candidates.extend((2..).take(100).map(|n| hashed_name(&name, data, Some(n))));

    for candidate in candidates {
        let target = media.root().join(&candidate);
        if !target.exists() {
            persist::write_atomic(&target, data)?;
            return Ok((candidate, true));
        }
        if fs::read(&target)? == data {
            return Ok((candidate, false));
        }
    }
    Err(Error::Other(format!(
        "no free file name for {} in {}",
        name,
        media.root().display()
    )))
}

/// Hex MD5 digest of file content.
pub(crate) fn content_digest(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

fn hashed_name(name: &str, data: &[u8], counter: Option<u32>) -> String {
    let digest = content_digest(data);
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let mut hashed = format!("{}-{}", stem, &digest[..8]);
    if let Some(n) = counter {
        hashed.push_str(&format!("-{}", n));
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hashed.push('.');
        hashed.push_str(ext);
    }
    hashed
}

fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

fn image_target_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(!\[(?:\\.|[^\]\\])*\]\([ \t]*)(<[^>]*>|[^\s)]+)").unwrap()
    })
}

/// Normalize `doc`, parsed from `text`, and rewrite the image targets of
/// `text` to match.
///
/// Only image targets change; the rest of the text is kept as written.
pub fn normalize_markdown(
    text: &str,
    doc: &mut Document,
    media: &MediaDir,
) -> Result<(String, NormalizeReport)> {
    let before: Vec<String> = doc.images().map(|(_, i)| i.source.clone()).collect();
    let report = normalize(doc, media)?;

    let rewrites: HashMap<String, String> = before
        .into_iter()
        .zip(doc.images().map(|(_, i)| i.source.clone()))
        .filter(|(old, new)| old != new)
        .collect();
    if rewrites.is_empty() {
        return Ok((text.to_string(), report));
    }

    let rewrite = |caps: &Captures<'_>| {
        let target = &caps[2];
        let bare = target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(target);
        match rewrites.get(bare) {
            Some(new) if new.contains(' ') => format!("{}<{}>", &caps[1], new),
            Some(new) => format!("{}{}", &caps[1], new),
            None => caps[0].to_string(),
        }
    };

    // Fenced code is kept byte for byte.
    let mut updated = String::with_capacity(text.len());
    for (line, fenced) in text.split_inclusive('\n').zip(fenced_lines(text)) {
        if fenced {
            updated.push_str(line);
        } else {
            updated.push_str(&image_target_re().replace_all(line, &rewrite));
        }
    }
    Ok((updated, report))
}

/// Normalize the image references of a Markdown file in place.
///
/// The file is written only when a reference changed.
pub fn normalize_markdown_file(path: &Path, media: &MediaDir) -> Result<NormalizeReport> {
    let text = fs::read_to_string(path)?;
    let mut doc = parse_markdown(&text);
    let (updated, report) = normalize_markdown(&text, &mut doc, media)?;
    if report.changed() {
        persist::write_atomic(path, updated.as_bytes())?;
        log::info!(
            "rewrote {} image references in {}",
            report.rewritten,
            path.display()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn setup() -> (tempfile::TempDir, MediaDir) {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaDir::new(dir.path().join("out/media"));
        (dir, media)
    }

    #[test]
    fn test_prefix() {
        let media = MediaDir::with_base("/tmp/doc/media", "/tmp/doc");
        assert_eq!(media.prefix(), "media");
        assert_eq!(media.written_path("a.png"), "media/a.png");

        let media = MediaDir::with_base("/tmp/doc", "/tmp/doc");
        assert_eq!(media.written_path("a.png"), "a.png");

        let media = MediaDir::with_base("/tmp/assets", "/tmp/doc");
        assert_eq!(media.prefix(), "../assets");
    }

    #[test]
    fn test_outside_file_is_copied_and_idempotent() {
        let (dir, media) = setup();
        let outside = dir.path().join("elsewhere/chart.png");
        fs::create_dir_all(outside.parent().unwrap()).unwrap();
        fs::write(&outside, PNG).unwrap();

        let mut doc = Document::from_blocks(vec![Block::image(outside.to_string_lossy())]);
        let report = normalize(&mut doc, &media).unwrap();
        assert_eq!(report.copied, 1);
        assert_eq!(report.rewritten, 1);
        assert_eq!(doc.images().next().unwrap().1.source, "media/chart.png");
        assert!(media.root().join("chart.png").is_file());

        let once = doc.clone();
        let report = normalize(&mut doc, &media).unwrap();
        assert_eq!(report.copied, 0);
        assert_eq!(report.rewritten, 0);
        assert_eq!(doc, once);
        assert_eq!(report.references.len(), 1);
    }

    #[test]
    fn test_name_collision() {
        let (dir, media) = setup();
        media.ensure().unwrap();
        fs::write(media.root().join("a.png"), b"GIF89a-other").unwrap();

        let outside = dir.path().join("a.png");
        fs::write(&outside, PNG).unwrap();
        let mut doc = Document::from_blocks(vec![
            Block::image(outside.to_string_lossy()),
            Block::image(outside.to_string_lossy()),
        ]);
        let report = normalize(&mut doc, &media).unwrap();

        let sources: Vec<&str> = doc.images().map(|(_, i)| i.source.as_str()).collect();
        assert!(sources[0].starts_with("media/a-"));
        assert!(sources[0].ends_with(".png"));
        assert_eq!(sources[0], sources[1]);
        assert_eq!(report.copied, 1);
        assert_eq!(fs::read(media.root().join("a.png")).unwrap(), b"GIF89a-other");
    }

    #[test]
    fn test_identical_content_is_reused() {
        let (dir, media) = setup();
        media.ensure().unwrap();
        fs::write(media.root().join("logo.png"), PNG).unwrap();
        let outside = dir.path().join("logo.png");
        fs::write(&outside, PNG).unwrap();

        let mut doc = Document::from_blocks(vec![Block::image(outside.to_string_lossy())]);
        let report = normalize(&mut doc, &media).unwrap();
        assert_eq!(report.copied, 0);
        assert_eq!(report.rewritten, 1);
        assert_eq!(doc.images().next().unwrap().1.source, "media/logo.png");
    }

    #[test]
    fn test_bare_name_in_media_dir() {
        let (_dir, media) = setup();
        media.ensure().unwrap();
        fs::write(media.root().join("photo.jpg"), [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

        let mut doc = Document::from_blocks(vec![Block::image("photo.jpg")]);
        let report = normalize(&mut doc, &media).unwrap();
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.copied, 0);
        assert_eq!(doc.images().next().unwrap().1.source, "media/photo.jpg");
    }

    #[test]
    fn test_missing_remote_and_unsupported() {
        let (dir, media) = setup();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "text").unwrap();

        let mut doc = Document::from_blocks(vec![
            Block::paragraph("intro"),
            Block::image("nowhere.png"),
            Block::image("https://example.com/a.png"),
            Block::image(notes.to_string_lossy()),
        ]);
        let before = doc.clone();
        let report = normalize(&mut doc, &media).unwrap();

        let kinds: Vec<(DiagnosticKind, Option<usize>)> =
            report.diagnostics.iter().map(|d| (d.kind, d.block)).collect();
        assert_eq!(
            kinds,
            vec![
                (DiagnosticKind::MediaMissing, Some(1)),
                (DiagnosticKind::MediaMissing, Some(2)),
                (DiagnosticKind::MediaUnsupported, Some(3)),
            ]
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_fenced_image_syntax_untouched() {
        let (_dir, media) = setup();
        media.ensure().unwrap();
        fs::write(media.root().join("fig.png"), PNG).unwrap();

        let text = "![F](fig.png)\n\n```md\n![F](fig.png)\n```\n";
        let mut doc = parse_markdown(text);
        let (updated, report) = normalize_markdown(text, &mut doc, &media).unwrap();
        assert_eq!(report.rewritten, 1);
        assert_eq!(
            updated,
            "![F](media/fig.png)\n\n```md\n![F](fig.png)\n```\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_image_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, media) = setup();
        let locked = dir.path().join("locked.png");
        fs::write(&locked, PNG).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&locked).is_ok() {
            // Permission bits do not bind this user (root).
            return;
        }

        let mut doc = Document::from_blocks(vec![
            Block::image(locked.to_string_lossy()),
            Block::paragraph("after"),
        ]);
        let report = normalize(&mut doc, &media).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::MediaMissing);
        assert!(report.diagnostics[0].message.contains("unreadable"));
        assert_eq!(report.copied, 0);
    }

    #[test]
    fn test_store_media_bytes() {
        let (_dir, media) = setup();
        let first = store_media_bytes(&media, "image1.png", PNG).unwrap();
        let again = store_media_bytes(&media, "image1.png", PNG).unwrap();
        assert_eq!(first, "media/image1.png");
        assert_eq!(first, again);
        assert_eq!(fs::read_dir(media.root()).unwrap().count(), 1);
    }

    #[test]
    fn test_normalize_markdown_file() {
        let (dir, media) = setup();
        media.ensure().unwrap();
        fs::write(media.root().join("fig.png"), PNG).unwrap();

        let path = dir.path().join("out/doc.md");
        let text = "# Doc\n\nSome *text*.\n\n![Figure](fig.png)\n\n![Gone](gone.png)\n";
        fs::write(&path, text).unwrap();

        let report = normalize_markdown_file(&path, &media).unwrap();
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Doc\n\nSome *text*.\n\n![Figure](media/fig.png)\n\n![Gone](gone.png)\n"
        );

        let report = normalize_markdown_file(&path, &media).unwrap();
        assert!(!report.changed());
    }
}
