//! Atomic file writes.
//!
//! Every artifact is written to a temporary file in its destination
//! directory and renamed into place, so readers never observe a
//! half-written file.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write `data` to `path` through a temporary file and an atomic rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| Error::persistence(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(path, e))?;
    tmp.write_all(data).map_err(|e| Error::persistence(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| Error::persistence(path, e.error))?;

    log::debug!("wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}

/// Copy a file atomically. Returns the number of bytes copied.
pub fn copy_atomic(from: &Path, to: &Path) -> Result<u64> {
    let data = fs::read(from)?;
    write_atomic(to, &data)?;
    Ok(data.len() as u64)
}

/// Recursively copy a directory tree. Files are copied atomically.
pub fn copy_dir(from: &Path, to: &Path) -> Result<u64> {
    fs::create_dir_all(to).map_err(|e| Error::persistence(to, e))?;
    let mut total = 0;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            total += copy_dir(&entry.path(), &target)?;
        } else {
            total += copy_atomic(&entry.path(), &target)?;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");

        // Overwrite leaves no temp files behind
        write_atomic(&path, b"again").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "again");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        fs::write(&src, [1u8, 2, 3]).unwrap();
        let copied = copy_atomic(&src, &dir.path().join("dst.bin")).unwrap();
        assert_eq!(copied, 3);
    }

    #[test]
    fn test_copy_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_atomic(&dir.path().join("nope"), &dir.path().join("dst")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_copy_dir() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        fs::write(src.join("nested/b.txt"), "bb").unwrap();

        let total = copy_dir(&src, &dir.path().join("dst")).unwrap();
        assert_eq!(total, 3);
        assert!(dir.path().join("dst/nested/b.txt").exists());
    }
}
