use crate::config::Config;
use crate::error::{Error, Result};
use crate::scan::{self, rel_to_path, FileEntry};
use filetime::{set_file_mtime, FileTime};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use time::{macros::format_description, OffsetDateTime};

/// Marker written into a snapshot only after its copy has verified. A
/// directory without it is not a trustworthy snapshot.
pub const META_FILE: &str = "balmora-snapshot.json";

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub label: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub saved_at: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotReport {
    pub label: String,
    pub path: PathBuf,
    pub file_count: usize,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

/// On-disk home of a snapshot: `"<live_game_dir_name> (<label>)"` under the
/// snapshot parent directory.
pub fn snapshot_dir(config: &Config, label: &str) -> Result<PathBuf> {
    validate_label(label)?;
    let name = config.live_dir_name()?;
    Ok(config.snapshot_parent()?.join(format!("{name} ({label})")))
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label == "." || label == ".." || label.contains(['/', '\\', ')']) {
        return Err(Error::InvalidLabel {
            label: label.to_string(),
        });
    }
    Ok(())
}

/// Save the live game directory under `label`, replacing any prior snapshot
/// with that label.
///
/// The copy lands in a staging directory first and is verified against
/// the source scan before the old snapshot is touched, so an interruption
/// leaves either the previous snapshot or the new one intact, never a
/// half-written directory under the snapshot's real name.
pub fn save(config: &Config, label: &str, reason: Option<&str>) -> Result<SnapshotReport> {
    let live = config.live_dir()?;
    let final_dir = snapshot_dir(config, label)?;
    let parent = config.snapshot_parent()?;
    fs::create_dir_all(parent).map_err(|err| Error::fs("create dir", parent, err))?;

    let source_tree = scan::scan(live)?;
    let staging = staging_path(parent, &final_dir, "staging");

    let staged = copy_entries(&source_tree.files, &staging)
        .and_then(|()| verify_staged(&staging, label, source_tree.len(), source_tree.total_bytes()));
    if let Err(err) = staged {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    let saved_at = unix_now();
    let meta = SnapshotMeta {
        label: label.to_string(),
        file_count: source_tree.len(),
        total_bytes: source_tree.total_bytes(),
        saved_at,
        reason: reason.map(str::to_string),
    };
    if let Err(err) = write_meta(&staging, &meta) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    swap_into_place(&staging, &final_dir)?;
    tracing::info!(
        label,
        path = %final_dir.display(),
        files = meta.file_count,
        bytes = meta.total_bytes,
        "snapshot saved"
    );
    Ok(SnapshotReport {
        label: label.to_string(),
        path: final_dir,
        file_count: meta.file_count,
        total_bytes: meta.total_bytes,
        saved_at: format_unix(saved_at),
    })
}

/// Replace the live game directory with the snapshot saved under `label`.
/// The snapshot itself is left intact. Refuses to touch the live directory
/// unless the snapshot passes its integrity check.
pub fn restore(config: &Config, label: &str) -> Result<SnapshotReport> {
    let live = config.live_dir()?;
    let snap = snapshot_dir(config, label)?;
    if !snap.is_dir() {
        return Err(Error::SnapshotMissing {
            label: label.to_string(),
            path: snap,
        });
    }

    let meta = read_meta(&snap, label)?;
    let files = snapshot_files(&snap)?;
    check_integrity(label, &meta, &files)?;

    let live_parent = live.parent().ok_or_else(|| {
        Error::fs(
            "resolve parent",
            live,
            io::Error::new(io::ErrorKind::NotFound, "live directory has no parent"),
        )
    })?;
    let staging = staging_path(live_parent, live, "restore");

    let staged = copy_entries(&files, &staging)
        .and_then(|()| verify_staged(&staging, label, meta.file_count, meta.total_bytes));
    if let Err(err) = staged {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    swap_into_place(&staging, live)?;
    tracing::info!(label, live = %live.display(), "snapshot restored");
    Ok(SnapshotReport {
        label: label.to_string(),
        path: snap,
        file_count: meta.file_count,
        total_bytes: meta.total_bytes,
        saved_at: format_unix(meta.saved_at),
    })
}

/// Snapshots found under the snapshot parent directory, sorted by label.
pub fn list(config: &Config) -> Result<Vec<SnapshotReport>> {
    let parent = config.snapshot_parent()?;
    let prefix = format!("{} (", config.live_dir_name()?);
    if !parent.is_dir() {
        return Ok(Vec::new());
    }

    let mut reports = Vec::new();
    let entries = fs::read_dir(parent).map_err(|err| Error::fs("read dir", parent, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::fs("read dir", parent, err))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(label) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(')'))
        else {
            continue;
        };
        let report = match read_meta(&entry.path(), label) {
            Ok(meta) => SnapshotReport {
                label: label.to_string(),
                path: entry.path(),
                file_count: meta.file_count,
                total_bytes: meta.total_bytes,
                saved_at: format_unix(meta.saved_at),
            },
            // partial or pre-meta snapshot: list it, but with what is
            // actually on disk and no timestamp
            Err(_) => {
                let tree = scan::scan(&entry.path())?;
                SnapshotReport {
                    label: label.to_string(),
                    path: entry.path(),
                    file_count: tree.len(),
                    total_bytes: tree.total_bytes(),
                    saved_at: None,
                }
            }
        };
        reports.push(report);
    }
    reports.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(reports)
}

/// Files inside a snapshot, meta marker excluded.
fn snapshot_files(snap: &Path) -> Result<Vec<FileEntry>> {
    let tree = scan::scan(snap)?;
    Ok(tree
        .files
        .into_iter()
        .filter(|entry| entry.relative != META_FILE)
        .collect())
}

fn check_integrity(label: &str, meta: &SnapshotMeta, files: &[FileEntry]) -> Result<()> {
    let total: u64 = files.iter().map(|entry| entry.size).sum();
    if files.len() != meta.file_count || total != meta.total_bytes {
        return Err(Error::SnapshotIncomplete {
            label: label.to_string(),
            detail: format!(
                "on disk {} files / {} bytes, recorded {} files / {} bytes",
                files.len(),
                total,
                meta.file_count,
                meta.total_bytes
            ),
        });
    }
    Ok(())
}

fn verify_staged(staging: &Path, label: &str, file_count: usize, total_bytes: u64) -> Result<()> {
    let staged = scan::scan(staging)?;
    if staged.len() != file_count || staged.total_bytes() != total_bytes {
        return Err(Error::SnapshotIncomplete {
            label: label.to_string(),
            detail: format!(
                "staged copy has {} files / {} bytes, expected {} files / {} bytes",
                staged.len(),
                staged.total_bytes(),
                file_count,
                total_bytes
            ),
        });
    }
    Ok(())
}

fn copy_entries(files: &[FileEntry], dest_root: &Path) -> Result<()> {
    fs::create_dir_all(dest_root).map_err(|err| Error::fs("create dir", dest_root, err))?;
    for entry in files {
        let dest = dest_root.join(rel_to_path(&entry.relative));
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir).map_err(|err| Error::fs("create dir", dir, err))?;
        }
        fs::copy(&entry.absolute, &dest).map_err(|err| Error::fs("copy", &dest, err))?;
        if let Ok(meta) = fs::metadata(&entry.absolute) {
            let _ = set_file_mtime(&dest, FileTime::from_last_modification_time(&meta));
        }
    }
    Ok(())
}

/// Unique sibling path for staged copies. Plain suffix first, nanosecond
/// stamp if a stale one is in the way.
fn staging_path(parent: &Path, target: &Path, tag: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| tag.to_string());
    let candidate = parent.join(format!("{name}.{tag}"));
    if !candidate.exists() {
        return candidate;
    }
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    parent.join(format!("{name}.{stamp}.{tag}"))
}

/// Rename the verified staging directory over `target`: rename the old state
/// away, rename the new one in, then drop the old. The window where neither
/// state exists under `target` is a single rename, not a long copy.
fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let old = if target.exists() {
        let path = staging_path(parent, target, "old");
        fs::rename(target, &path).map_err(|err| Error::fs("rename", target, err))?;
        Some(path)
    } else {
        None
    };

    if let Err(err) = fs::rename(staging, target) {
        if let Some(old) = &old {
            let _ = fs::rename(old, target);
        }
        let _ = fs::remove_dir_all(staging);
        return Err(Error::fs("rename", staging, err));
    }

    if let Some(old) = old {
        if let Err(err) = fs::remove_dir_all(&old) {
            tracing::warn!(path = %old.display(), %err, "could not remove replaced directory");
        }
    }
    Ok(())
}

fn write_meta(dir: &Path, meta: &SnapshotMeta) -> Result<()> {
    let path = dir.join(META_FILE);
    let raw = serde_json::to_string_pretty(meta).map_err(|source| Error::ConfigParse {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, raw).map_err(|err| Error::fs("write meta", &path, err))
}

fn read_meta(dir: &Path, label: &str) -> Result<SnapshotMeta> {
    let path = dir.join(META_FILE);
    let raw = fs::read_to_string(&path).map_err(|_| Error::SnapshotIncomplete {
        label: label.to_string(),
        detail: "meta marker missing; the snapshot may be a partial copy".to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|_| Error::SnapshotIncomplete {
        label: label.to_string(),
        detail: "meta marker unreadable".to_string(),
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

fn format_unix(secs: i64) -> Option<String> {
    let stamp = OffsetDateTime::from_unix_timestamp(secs).ok()?;
    let description = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    stamp.format(&description).ok()
}
