use crate::error::{Error, Result};
use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

/// Hard ceiling on directory nesting. Mod archives and game directories are
/// shallow in practice; anything deeper is a packaging error or a loop.
pub const MAX_SCAN_DEPTH: usize = 64;

/// One regular file found by a scan. `relative` always uses forward slashes
/// and preserves the on-disk casing; cross-entry matching goes through
/// [`fold_key`], never raw equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub relative: String,
    pub absolute: PathBuf,
    pub size: u64,
}

/// Point-in-time listing of the regular files under one root. Not
/// re-validated after construction; rescan to observe later mutations.
#[derive(Debug)]
pub struct DirectoryTree {
    pub root: PathBuf,
    pub files: Vec<FileEntry>,
}

impl DirectoryTree {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|entry| entry.size).sum()
    }
}

/// Case-fold key for a normalized relative path. Idempotent and
/// locale-independent: plain Unicode lowercasing, no locale tables.
pub fn fold_key(relative: &str) -> String {
    relative.to_lowercase()
}

/// Rebuild a platform path from a forward-slash relative path.
pub fn rel_to_path(relative: &str) -> PathBuf {
    relative.split('/').collect()
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Scan every regular file under `root`.
pub fn scan(root: &Path) -> Result<DirectoryTree> {
    scan_impl(root, false)
}

/// Scan a mod payload, skipping archive junk (`__MACOSX`, `.DS_Store`,
/// VCS directories) that should never land in a game directory.
pub fn scan_payload(root: &Path) -> Result<DirectoryTree> {
    scan_impl(root, true)
}

fn scan_impl(root: &Path, skip_junk: bool) -> Result<DirectoryTree> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .max_depth(MAX_SCAN_DEPTH)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(walk_error(root))?;
        if skip_junk && is_junk_path(entry.path().strip_prefix(root).unwrap_or(entry.path())) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        if entry.file_type().is_dir() {
            // Guard against bind mounts and hardlinked directory cycles that
            // a symlink check alone cannot catch.
            if !visited.insert(dir_identity(entry.path())?) {
                walker.skip_current_dir();
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = relative_key(root, entry.path()) else {
            continue;
        };
        let size = entry
            .metadata()
            .map_err(walk_error(entry.path()))?
            .len();
        files.push(FileEntry {
            relative,
            absolute: entry.path().to_path_buf(),
            size,
        });
    }

    Ok(DirectoryTree {
        root: root.to_path_buf(),
        files,
    })
}

fn walk_error(fallback: &Path) -> impl Fn(walkdir::Error) -> Error + '_ {
    move |err| {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| fallback.to_path_buf());
        let source = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk aborted"));
        Error::fs("scan", path, source)
    }
}

/// Paths that archive tools and editors leave behind.
pub fn is_junk_path(path: &Path) -> bool {
    path.components().any(|component| {
        let part = component.as_os_str().to_string_lossy();
        part.eq_ignore_ascii_case("__MACOSX")
            || part.eq_ignore_ascii_case(".ds_store")
            || part.eq_ignore_ascii_case("thumbs.db")
            || part == ".git"
            || part == ".svn"
    })
}

#[cfg(unix)]
fn dir_identity(path: &Path) -> Result<String> {
    let meta = fs::metadata(path).map_err(|err| Error::fs("stat", path, err))?;
    Ok(format!("{}:{}", meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn dir_identity(path: &Path) -> Result<String> {
    let canonical = fs::canonicalize(path).map_err(|err| Error::fs("stat", path, err))?;
    Ok(canonical.to_string_lossy().into_owned())
}
