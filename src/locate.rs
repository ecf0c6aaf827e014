use crate::error::{Error, Result};
use crate::scan::MAX_SCAN_DEPTH;
use glob::{MatchOptions, Pattern};
use std::{
    collections::{HashSet, VecDeque},
    fs,
    path::{Path, PathBuf},
};

/// What identifies a directory as a mod's data payload.
///
/// Directory names are matched case-sensitively because they are harvested
/// from the authoritative destination tree; file patterns are
/// case-insensitive globs since mod authors case plugin names freely.
#[derive(Debug)]
pub struct Markers {
    dir_names: HashSet<String>,
    file_patterns: Vec<Pattern>,
}

const FOLD_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl Markers {
    pub fn new(dir_names: HashSet<String>, file_patterns: &[String]) -> Result<Self> {
        let file_patterns = file_patterns
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|source| Error::MarkerPattern {
                    pattern: raw.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Markers {
            dir_names,
            file_patterns,
        })
    }

    fn matches_dir(&self, name: &str) -> bool {
        self.dir_names.contains(name)
    }

    fn matches_file(&self, name: &str) -> bool {
        self.file_patterns
            .iter()
            .any(|pattern| pattern.matches_with(name, FOLD_MATCH))
    }
}

/// Marker directory names for a destination: the immediate subdirectory
/// names of the live data directory, casing as found on disk.
pub fn harvest_marker_dirs(data_dir: &Path) -> Result<HashSet<String>> {
    let mut names = HashSet::new();
    let entries = fs::read_dir(data_dir).map_err(|err| Error::fs("read dir", data_dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::fs("read dir", data_dir, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| Error::fs("stat", entry.path(), err))?;
        if file_type.is_dir() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Find the data root inside an extracted mod tree.
///
/// Breadth-first by depth, same-depth directories in lexicographic order, so
/// the shallowest match always wins; a depth-first walk could descend into an
/// unrelated subtree holding a stray marker file before checking shallower
/// candidates. Read failures abort with a filesystem error, which is distinct
/// from an exhaustive search finding nothing.
pub fn locate_data_root(root: &Path, markers: &Markers) -> Result<PathBuf> {
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back((root.to_path_buf(), 0usize));

    while let Some((dir, depth)) = queue.pop_front() {
        if !visited.insert(canonical_id(&dir)?) {
            continue;
        }

        let mut subdirs = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|err| Error::fs("read dir", &dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| Error::fs("read dir", &dir, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .map_err(|err| Error::fs("stat", entry.path(), err))?;
            if file_type.is_dir() {
                if markers.matches_dir(&name) {
                    tracing::debug!(dir = %dir.display(), marker = %name, "data root via directory marker");
                    return Ok(dir);
                }
                subdirs.push((name, entry.path()));
            } else if file_type.is_file() && markers.matches_file(&name) {
                tracing::debug!(dir = %dir.display(), marker = %name, "data root via file marker");
                return Ok(dir);
            }
        }

        if depth + 1 <= MAX_SCAN_DEPTH {
            subdirs.sort_by(|a, b| a.0.cmp(&b.0));
            for (_, path) in subdirs {
                queue.push_back((path, depth + 1));
            }
        }
    }

    Err(Error::DataRootNotFound {
        root: root.to_path_buf(),
    })
}

#[cfg(unix)]
fn canonical_id(path: &Path) -> Result<String> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path).map_err(|err| Error::fs("stat", path, err))?;
    Ok(format!("{}:{}", meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn canonical_id(path: &Path) -> Result<String> {
    let canonical = fs::canonicalize(path).map_err(|err| Error::fs("stat", path, err))?;
    Ok(canonical.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn markers(dirs: &[&str], patterns: &[&str]) -> Markers {
        let dir_names = dirs.iter().map(|s| s.to_string()).collect();
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        Markers::new(dir_names, &patterns).unwrap()
    }

    #[test]
    fn shallowest_match_wins_over_deep_decoy() {
        let dir = tempfile::tempdir().unwrap();
        // real payload at depth 2
        let payload = dir.path().join("Archive").join("Data Files");
        fs::create_dir_all(&payload).unwrap();
        fs::write(payload.join("mod.esp"), "p").unwrap();
        // decoy marker at depth 4 under an unrelated subtree that sorts first
        let decoy = dir.path().join("Aaa").join("docs").join("old").join("backup");
        fs::create_dir_all(&decoy).unwrap();
        fs::write(decoy.join("stray.esp"), "d").unwrap();

        let found = locate_data_root(dir.path(), &markers(&[], &["*.esp"])).unwrap();
        assert_eq!(found, payload);
    }

    #[test]
    fn marker_directory_names_are_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("pack");
        fs::create_dir_all(payload.join("meshes")).unwrap();

        let miss = locate_data_root(dir.path(), &markers(&["Meshes"], &[]));
        assert!(matches!(miss, Err(Error::DataRootNotFound { .. })));

        let found = locate_data_root(dir.path(), &markers(&["meshes"], &[])).unwrap();
        assert_eq!(found, payload);
    }

    #[test]
    fn marker_file_patterns_fold_case() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("PLUGIN.ESM"), "p").unwrap();

        let found = locate_data_root(dir.path(), &markers(&[], &["*.esm"])).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn empty_tree_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("readme")).unwrap();
        let err = locate_data_root(dir.path(), &markers(&["Meshes"], &["*.esp"])).unwrap_err();
        assert!(matches!(err, Error::DataRootNotFound { .. }));
    }
}
