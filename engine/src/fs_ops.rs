//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Walking the source tree lazily
//! - Mirroring source directories under the destination root
//! - Copying files with metadata preservation (via a temporary name)
//! - Moving files, with a copy-then-delete fallback
//! - Probing whether a directory is writable

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::EngineError;
use crate::profile::FilesystemProfile;
use crate::sanitize::{sanitize_os, Sanitized};

/// One item produced by [`walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEntry {
    /// A directory, relative to the source root ("" for the root itself)
    Directory { relative: PathBuf },
    /// A file; `size` is None when it could not be stat'd
    File {
        relative_dir: PathBuf,
        name: OsString,
        size: Option<u64>,
    },
    /// An entry the walk could not read, or one that is neither a directory
    /// nor a regular file; the walk carries on past it
    Unreadable { path: PathBuf, reason: String },
}

/// Lazy, single-use traversal of a source tree.
///
/// Directories are yielded before anything inside them. Entries within a
/// directory come in filesystem listing order. Symlinks are not followed;
/// a symlink to a file is yielded as a file (its target gets copied), a
/// symlink to a directory is passed over. FIFOs, sockets and device nodes
/// come back as [`WalkEntry::Unreadable`].
pub struct SourceWalk {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

/// Start walking `source_root`.
pub fn walk(source_root: &Path) -> SourceWalk {
    SourceWalk {
        root: source_root.to_path_buf(),
        inner: WalkDir::new(source_root).follow_links(false).into_iter(),
    }
}

impl Iterator for SourceWalk {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(WalkEntry::Unreadable {
                        path,
                        reason: e.to_string(),
                    });
                }
            };

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();

            if entry.file_type().is_dir() {
                return Some(WalkEntry::Directory { relative });
            }

            // Stat through symlinks, like the copy itself will
            let metadata = fs::metadata(entry.path());
            match &metadata {
                Ok(m) if m.is_dir() => {
                    debug!(path = %entry.path().display(), "skipping symlink to directory");
                    continue;
                }
                // FIFOs, sockets and device nodes; opening a FIFO blocks
                Ok(m) if !m.is_file() => {
                    return Some(WalkEntry::Unreadable {
                        path: entry.path().to_path_buf(),
                        reason: "not a regular file (FIFO, socket or device)".to_string(),
                    });
                }
                _ => {}
            }

            return Some(WalkEntry::File {
                relative_dir: relative.parent().map(Path::to_path_buf).unwrap_or_default(),
                name: entry.file_name().to_os_string(),
                size: metadata.ok().map(|m| m.len()),
            });
        }
    }
}

/// A mirrored destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredDir {
    pub destination: PathBuf,
    /// Set when the last path component had to be sanitized
    pub renamed: Option<(String, Sanitized)>,
}

/// Recreates source directories under the destination root.
///
/// Every path component is sanitized against the destination profile.
/// Results are remembered per source-relative directory, so once a
/// directory fails, everything below it fails without touching the disk.
pub struct Mirror {
    destination_root: PathBuf,
    profile: &'static FilesystemProfile,
    dirs: HashMap<PathBuf, Result<PathBuf, String>>,
}

impl Mirror {
    pub fn new(destination_root: &Path, profile: &'static FilesystemProfile) -> Self {
        Mirror {
            destination_root: destination_root.to_path_buf(),
            profile,
            dirs: HashMap::new(),
        }
    }

    /// Make sure the destination counterpart of `relative` exists.
    ///
    /// Returns the failure reason if it (or any ancestor) could not be created.
    pub fn ensure(&mut self, relative: &Path) -> Result<MirroredDir, String> {
        if let Some(known) = self.dirs.get(relative) {
            return known.clone().map(|destination| MirroredDir {
                destination,
                renamed: None,
            });
        }

        let (target, renamed) = match (relative.parent(), relative.file_name()) {
            (Some(parent), Some(name)) => {
                let parent_dest = match self.ensure(parent) {
                    Ok(dir) => dir.destination,
                    Err(reason) => {
                        self.dirs.insert(relative.to_path_buf(), Err(reason.clone()));
                        return Err(reason);
                    }
                };
                let sanitized = sanitize_os(name, self.profile);
                let renamed = sanitized
                    .changed
                    .then(|| (name.to_string_lossy().into_owned(), sanitized.clone()));
                (parent_dest.join(&sanitized.name), renamed)
            }
            _ => (self.destination_root.clone(), None),
        };

        let result = fs::create_dir_all(&target)
            .map(|_| target.clone())
            .map_err(|e| {
                warn!(path = %target.display(), error = %e, "failed to create directory");
                format!("Failed to create directory {}: {}", target.display(), e)
            });
        self.dirs.insert(relative.to_path_buf(), result.clone());
        result.map(|destination| MirroredDir {
            destination,
            renamed,
        })
    }

    /// Destination directory for files whose source directory is `relative`.
    pub fn resolve(&mut self, relative: &Path) -> Result<PathBuf, String> {
        self.ensure(relative).map(|dir| dir.destination)
    }
}

/// Check that files can be created in `dir`.
///
/// Creates and immediately drops an anonymous temporary file. Permission
/// bits alone do not reveal read-only mounts.
pub fn check_writable(dir: &Path) -> io::Result<()> {
    tempfile::tempfile_in(dir).map(drop)
}

/// Temporary sibling used while `dst` is being written.
///
/// The name is built from characters every profile accepts.
fn temporary_path(dst: &Path) -> PathBuf {
    let name = format!("~{}.tmp", Uuid::new_v4().simple());
    match dst.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Copy a file from source to destination with metadata preservation.
///
/// Data is written to a temporary sibling and renamed onto `dst` only once
/// complete, so `dst` never holds a partial file. Modification and access
/// times and permission bits are carried over on a best-effort basis.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns EngineError if the copy fails; the temporary file is removed.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let read_error = |e: io::Error| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    };
    if !fs::metadata(src).map_err(read_error)?.is_file() {
        return Err(read_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let tmp = temporary_path(dst);
    let result = write_temporary(src, &mut src_file, &src_metadata, &tmp).and_then(|bytes| {
        fs::rename(&tmp, dst).map_err(|e| EngineError::WriteError {
            path: dst.to_path_buf(),
            source: e,
        })?;
        Ok(bytes)
    });

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_temporary(
    src: &Path,
    src_file: &mut fs::File,
    src_metadata: &fs::Metadata,
    tmp: &Path,
) -> Result<u64, EngineError> {
    let mut tmp_file = fs::File::create(tmp).map_err(|e| EngineError::WriteError {
        path: tmp.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(src_file, &mut tmp_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: tmp.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;

    tmp_file.sync_all().map_err(|e| EngineError::WriteError {
        path: tmp.to_path_buf(),
        source: e,
    })?;
    drop(tmp_file);

    let atime = filetime::FileTime::from_last_access_time(src_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(src_metadata);
    if let Err(e) = filetime::set_file_times(tmp, atime, mtime) {
        debug!(path = %tmp.display(), error = %e, "could not preserve timestamps");
    }
    if let Err(e) = fs::set_permissions(tmp, src_metadata.permissions()) {
        debug!(path = %tmp.display(), error = %e, "could not preserve permissions");
    }

    Ok(bytes_copied)
}

/// Move a file, falling back to copy-then-delete.
///
/// A plain rename is tried first. If it fails (typically across devices)
/// the file is copied with [`copy_file_with_metadata`] and the source is
/// removed afterwards; the move only succeeds once the source is gone.
///
/// # Returns
/// Size of the moved file in bytes
pub fn move_file(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let size = fs::metadata(src)
        .map_err(|e| EngineError::ReadError {
            path: src.to_path_buf(),
            source: e,
        })?
        .len();

    match fs::rename(src, dst) {
        Ok(()) => return Ok(size),
        Err(e) => {
            debug!(src = %src.display(), error = %e, "rename failed, copying instead");
        }
    }

    copy_then_remove(src, dst)
}

/// Move fallback for when a rename is not possible, e.g. across devices.
///
/// `dst` is fully in place before `src` is removed.
pub(crate) fn copy_then_remove(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let bytes = copy_file_with_metadata(src, dst)?;
    fs::remove_file(src).map_err(|e| EngineError::SourceRemovalFailed {
        path: src.to_path_buf(),
        source: e,
    })?;
    Ok(bytes)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if directory creation fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile_for;
    use std::io::Write;

    fn write(path: &Path, contents: &[u8]) {
        let mut file = fs::File::create(path).expect("Failed to create file");
        file.write_all(contents).expect("Failed to write file");
    }

    #[test]
    fn test_walk_flat_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path();
        write(&src.join("file1.txt"), b"test data 1");
        write(&src.join("file2.txt"), b"test data 2");

        let entries: Vec<_> = walk(src).collect();
        assert_eq!(
            entries[0],
            WalkEntry::Directory {
                relative: PathBuf::new()
            }
        );

        let sizes: Vec<u64> = entries
            .iter()
            .filter_map(|e| match e {
                WalkEntry::File { size, .. } => *size,
                _ => None,
            })
            .collect();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes.iter().sum::<u64>(), 22);
    }

    #[test]
    fn test_walk_yields_directory_before_its_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path();
        fs::create_dir_all(src.join("a/b")).expect("Failed to create dirs");
        write(&src.join("a/b/deep.txt"), b"x");

        let entries: Vec<_> = walk(src).collect();
        let dir_pos = entries
            .iter()
            .position(|e| *e == WalkEntry::Directory { relative: PathBuf::from("a/b") })
            .expect("a/b should be walked");
        let file_pos = entries
            .iter()
            .position(|e| matches!(e, WalkEntry::File { relative_dir, .. } if relative_dir == Path::new("a/b")))
            .expect("deep.txt should be walked");
        assert!(dir_pos < file_pos);
    }

    #[test]
    fn test_walk_missing_root_is_unreadable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let entries: Vec<_> = walk(&temp_dir.path().join("nonexistent")).collect();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], WalkEntry::Unreadable { .. }));
    }

    #[test]
    fn test_mirror_sanitizes_directory_names() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("dst");
        let mut mirror = Mirror::new(&dst, profile_for("FAT32").unwrap());

        let root = mirror.ensure(Path::new("")).expect("root should be created");
        assert_eq!(root.destination, dst);
        assert!(dst.is_dir());

        let dir = mirror
            .ensure(Path::new("2024:archive"))
            .expect("directory should be created");
        assert_eq!(dir.destination, dst.join("2024_archive"));
        let (original, sanitized) = dir.renamed.expect("directory should be renamed");
        assert_eq!(original, "2024:archive");
        assert_eq!(sanitized.name, "2024_archive");
        assert!(dst.join("2024_archive").is_dir());

        // Second lookup does not report the rename again
        let again = mirror.ensure(Path::new("2024:archive")).unwrap();
        assert!(again.renamed.is_none());
    }

    #[test]
    fn test_mirror_failure_covers_subtree() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&dst).unwrap();
        // A file where a directory should go
        write(&dst.join("blocked"), b"not a directory");

        let mut mirror = Mirror::new(&dst, profile_for("ext4").unwrap());
        assert!(mirror.ensure(Path::new("blocked")).is_err());
        assert!(mirror.resolve(Path::new("blocked/inner")).is_err());
        assert!(!dst.join("blocked/inner").exists());
        assert!(mirror.resolve(Path::new("fine")).is_ok());
    }

    #[test]
    fn test_copy_file_with_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        write(&src_file, b"test content");

        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src_file, old).expect("Failed to set mtime");

        let bytes = copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(&dst_file).expect("Failed to read dest");
        assert_eq!(content, "test content");

        let dst_meta = fs::metadata(&dst_file).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&dst_meta), old);

        // No temporary files left behind
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_copy_missing_source_leaves_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst_file = temp_dir.path().join("dest.txt");

        let result = copy_file_with_metadata(&temp_dir.path().join("gone.txt"), &dst_file);
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
        assert!(!dst_file.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_move_file_removes_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("moved.txt");
        write(&src_file, b"moving");

        let bytes = move_file(&src_file, &dst_file).expect("Failed to move");
        assert_eq!(bytes, 6);
        assert!(!src_file.exists());
        assert_eq!(fs::read_to_string(&dst_file).unwrap(), "moving");
    }

    #[test]
    fn test_copy_then_remove() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("other").join("moved.txt");
        write(&src_file, b"cross device");
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src_file, old).expect("Failed to set mtime");

        let bytes = copy_then_remove(&src_file, &dst_file).expect("Failed to copy and remove");
        assert_eq!(bytes, 12);
        assert!(!src_file.exists(), "source should be removed");
        assert_eq!(fs::read_to_string(&dst_file).unwrap(), "cross device");
        let dst_meta = fs::metadata(&dst_file).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&dst_meta), old);
    }

    #[test]
    fn test_copy_then_remove_keeps_source_when_copy_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        write(&src_file, b"stay");
        // A file where the destination's parent directory should be
        let blocker = temp_dir.path().join("blocker");
        write(&blocker, b"");

        let result = copy_then_remove(&src_file, &blocker.join("moved.txt"));
        assert!(matches!(result, Err(EngineError::DirectoryCreationFailed { .. })));
        assert_eq!(fs::read_to_string(&src_file).unwrap(), "stay");
    }

    #[cfg(unix)]
    fn make_fifo(path: &Path) -> bool {
        std::process::Command::new("mkfifo")
            .arg(path)
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_reports_fifo_as_unreadable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path();
        write(&src.join("a.txt"), b"regular");
        if !make_fifo(&src.join("pipe")) {
            eprintln!("mkfifo unavailable; skipping");
            return;
        }

        let entries: Vec<_> = walk(src).collect();
        let files: Vec<_> = entries
            .iter()
            .filter_map(|e| match e {
                WalkEntry::File { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("a.txt")]);
        assert!(entries.iter().any(|e| matches!(
            e,
            WalkEntry::Unreadable { path, .. } if path.ends_with("pipe")
        )));
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_refuses_fifo() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fifo = temp_dir.path().join("pipe");
        if !make_fifo(&fifo) {
            eprintln!("mkfifo unavailable; skipping");
            return;
        }

        let dst_file = temp_dir.path().join("copy");
        let result = copy_file_with_metadata(&fifo, &dst_file);
        assert!(matches!(result, Err(EngineError::ReadError { .. })));
        assert!(!dst_file.exists());
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_check_writable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        check_writable(temp_dir.path()).expect("temp dir should be writable");
        assert!(check_writable(&temp_dir.path().join("missing")).is_err());
        // The check leaves nothing behind
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
