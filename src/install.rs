use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::CaseFoldIndex;
use crate::locate::{self, Markers};
use crate::plan::{self, ConflictPolicy, MergeAction, MergePlan};
use crate::scan::{self, rel_to_path, FileEntry};
use filetime::{set_file_mtime, FileTime};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    Case,
    Multiple,
}

/// A naming conflict recorded for the caller. Never fatal.
#[derive(Debug, Serialize)]
pub struct ConflictRecord {
    pub kind: ConflictKind,
    pub source: String,
    pub existing: Vec<String>,
    /// True when `prefer-source` overwrote the destination's content.
    pub resolved: bool,
}

#[derive(Debug, Serialize)]
pub struct CopyFailure {
    pub relative: String,
    pub message: String,
}

/// Structured outcome of one install. Rendering is the CLI's job.
#[derive(Debug, Default, Serialize)]
pub struct InstallReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
    pub copied: usize,
    pub skipped: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub errors: Vec<CopyFailure>,
}

/// Merge one extracted mod into the configured data directory.
///
/// Locates the payload, rescans the destination (an earlier install may have
/// mutated it), plans, then applies. Aborts only when no data root exists or
/// required config is missing; everything past that point is best-effort.
pub fn install_mod(
    config: &Config,
    source: &Path,
    policy_override: Option<ConflictPolicy>,
) -> Result<InstallReport> {
    let data_dir = config.data_files_dir()?;
    let policy = policy_override.unwrap_or(config.conflict_policy);

    let marker_dirs = locate::harvest_marker_dirs(data_dir)?;
    let markers = Markers::new(marker_dirs, &config.marker_file_patterns)?;
    let data_root = locate::locate_data_root(source, &markers)?;
    tracing::info!(data_root = %data_root.display(), "located mod payload");

    let source_tree = scan::scan_payload(&data_root)?;
    let dest_tree = scan::scan(data_dir)?;
    let dest_index = CaseFoldIndex::build(&dest_tree);
    tracing::debug!(
        source_files = source_tree.len(),
        dest_names = dest_index.len(),
        "planning merge"
    );
    let merge_plan = plan::plan(&source_tree, &dest_index, policy);

    let mut report = apply(&merge_plan, data_dir);
    report.data_root = Some(data_root);
    tracing::info!(
        copied = report.copied,
        skipped = report.skipped,
        conflicts = report.conflicts.len(),
        errors = report.errors.len(),
        "install finished"
    );
    Ok(report)
}

/// Execute a merge plan against `dest_root`. Never deletes; never renames a
/// destination file. A failed copy is recorded and the rest of the plan still
/// runs, since a partially merged mod is worth keeping and a re-run converges.
pub fn apply(plan: &MergePlan, dest_root: &Path) -> InstallReport {
    let mut report = InstallReport::default();

    for action in &plan.actions {
        match action {
            MergeAction::Copy { source } => {
                let dest = dest_root.join(rel_to_path(&source.relative));
                match copy_file(source, &dest) {
                    Ok(()) => report.copied += 1,
                    Err(err) => report.errors.push(CopyFailure {
                        relative: source.relative.clone(),
                        message: err.to_string(),
                    }),
                }
            }
            MergeAction::SkipIdentical { .. } => report.skipped += 1,
            MergeAction::ConflictCase { source, existing } => match plan.policy {
                ConflictPolicy::ReportOnly => report.conflicts.push(ConflictRecord {
                    kind: ConflictKind::Case,
                    source: source.relative.clone(),
                    existing: vec![existing.relative.clone()],
                    resolved: false,
                }),
                ConflictPolicy::PreferSource => {
                    // Overwrite content at the destination's casing; the
                    // destination tree keeps naming authority.
                    match copy_file(source, &existing.absolute) {
                        Ok(()) => {
                            report.copied += 1;
                            report.conflicts.push(ConflictRecord {
                                kind: ConflictKind::Case,
                                source: source.relative.clone(),
                                existing: vec![existing.relative.clone()],
                                resolved: true,
                            });
                        }
                        Err(err) => report.errors.push(CopyFailure {
                            relative: source.relative.clone(),
                            message: err.to_string(),
                        }),
                    }
                }
                ConflictPolicy::PreferDestination => report.skipped += 1,
            },
            MergeAction::ConflictMultiple { source, existing } => {
                report.conflicts.push(ConflictRecord {
                    kind: ConflictKind::Multiple,
                    source: source.relative.clone(),
                    existing: existing.iter().map(|e| e.relative.clone()).collect(),
                    resolved: false,
                });
            }
        }
    }

    report
}

fn copy_file(source: &FileEntry, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::fs("create dir", parent, err))?;
    }
    fs::copy(&source.absolute, dest).map_err(|err| Error::fs("copy", dest, err))?;
    // Keep source mtimes so the engine's archive-vs-loose-file staleness
    // checks behave as the mod author intended. Best effort.
    if let Ok(meta) = fs::metadata(&source.absolute) {
        let _ = set_file_mtime(dest, FileTime::from_last_modification_time(&meta));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel_to_path(rel));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn plan_for(
        source_root: &Path,
        dest_root: &Path,
        policy: ConflictPolicy,
    ) -> MergePlan {
        let source_tree = scan(source_root).unwrap();
        let dest_tree = scan(dest_root).unwrap();
        plan::plan(&source_tree, &CaseFoldIndex::build(&dest_tree), policy)
    }

    #[test]
    fn copies_into_created_subdirectories() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "Meshes/Armor/glass.nif", "nif");
        write(source.path(), "mod.esp", "esp");

        let plan = plan_for(source.path(), dest.path(), ConflictPolicy::ReportOnly);
        let report = apply(&plan, dest.path());
        assert_eq!(report.copied, 2);
        assert!(report.errors.is_empty());
        assert_eq!(
            fs::read_to_string(dest.path().join("Meshes/Armor/glass.nif")).unwrap(),
            "nif"
        );
    }

    #[test]
    fn identical_install_is_all_skips_and_rerun_is_idempotent() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a/b.esp", "new");
        write(dest.path(), "a/b.esp", "old");

        for _ in 0..2 {
            let plan = plan_for(source.path(), dest.path(), ConflictPolicy::ReportOnly);
            let report = apply(&plan, dest.path());
            assert_eq!((report.copied, report.skipped), (0, 1));
            assert!(report.conflicts.is_empty());
        }
        // skip means skip: destination content untouched
        assert_eq!(fs::read_to_string(dest.path().join("a/b.esp")).unwrap(), "old");
    }

    #[test]
    fn case_conflict_report_only_copies_nothing() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a/B.ESP", "new");
        write(dest.path(), "a/b.esp", "old");

        for _ in 0..2 {
            let plan = plan_for(source.path(), dest.path(), ConflictPolicy::ReportOnly);
            let report = apply(&plan, dest.path());
            assert_eq!(report.copied, 0);
            assert_eq!(report.conflicts.len(), 1);
            assert_eq!(report.conflicts[0].kind, ConflictKind::Case);
            assert!(!report.conflicts[0].resolved);
        }
        assert_eq!(fs::read_to_string(dest.path().join("a/b.esp")).unwrap(), "old");
        assert!(!dest.path().join("a/B.ESP").exists());
    }

    #[test]
    fn prefer_source_overwrites_content_but_keeps_destination_casing() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a/B.ESP", "new");
        write(dest.path(), "a/b.esp", "old");

        let plan = plan_for(source.path(), dest.path(), ConflictPolicy::PreferSource);
        let report = apply(&plan, dest.path());
        assert_eq!(report.copied, 1);
        assert!(report.conflicts[0].resolved);
        assert_eq!(fs::read_to_string(dest.path().join("a/b.esp")).unwrap(), "new");
        assert!(!dest.path().join("a/B.ESP").exists());
    }

    #[test]
    fn prefer_destination_is_silent() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a/B.ESP", "new");
        write(dest.path(), "a/b.esp", "old");

        let plan = plan_for(source.path(), dest.path(), ConflictPolicy::PreferDestination);
        let report = apply(&plan, dest.path());
        assert_eq!((report.copied, report.skipped), (0, 1));
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn preexisting_duplicates_are_reported_under_every_policy() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a/b.esp", "new");
        write(dest.path(), "a/b.esp", "one");
        write(dest.path(), "a/B.esp", "two");

        let plan = plan_for(source.path(), dest.path(), ConflictPolicy::PreferSource);
        let report = apply(&plan, dest.path());
        assert_eq!(report.copied, 0);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind, ConflictKind::Multiple);
        assert_eq!(fs::read_to_string(dest.path().join("a/b.esp")).unwrap(), "one");
        assert_eq!(fs::read_to_string(dest.path().join("a/B.esp")).unwrap(), "two");
    }

    #[test]
    fn one_failed_copy_does_not_abort_the_rest() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(source.path(), "a.esp", "a");
        write(source.path(), "b.esp", "b");
        write(source.path(), "c.esp", "c");

        let mut plan = plan_for(source.path(), dest.path(), ConflictPolicy::ReportOnly);
        // sabotage the middle action's source path
        if let MergeAction::Copy { source } = &mut plan.actions[1] {
            source.absolute = source.absolute.with_extension("missing");
        } else {
            panic!("expected Copy action");
        }

        let report = apply(&plan, dest.path());
        assert_eq!(report.copied, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].relative, "b.esp");
        assert!(dest.path().join("a.esp").exists());
        assert!(dest.path().join("c.esp").exists());
    }

    #[test]
    fn install_mod_locates_payload_and_merges() {
        let mod_dir = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        // destination provides the authoritative marker directory names
        fs::create_dir_all(dest.path().join("Meshes")).unwrap();
        // payload nested one level down, discovered via the Meshes marker
        write(mod_dir.path(), "SomeMod v2/Meshes/armor.nif", "nif");

        let mut config = Config::default();
        config.game_data_files_dir = dest.path().to_path_buf();

        let report = install_mod(&config, mod_dir.path(), None).unwrap();
        assert_eq!(report.copied, 1);
        assert_eq!(
            report.data_root.as_deref(),
            Some(mod_dir.path().join("SomeMod v2").as_path())
        );
        assert!(dest.path().join("Meshes/armor.nif").exists());
    }

    #[test]
    fn install_mod_without_data_root_aborts() {
        let mod_dir = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::create_dir_all(mod_dir.path().join("docs")).unwrap();

        let mut config = Config::default();
        config.game_data_files_dir = dest.path().to_path_buf();

        let err = install_mod(&config, mod_dir.path(), None).unwrap_err();
        assert!(matches!(err, Error::DataRootNotFound { .. }));
    }

    #[test]
    fn install_mod_requires_configured_destination() {
        let mod_dir = tempfile::tempdir().unwrap();
        let err = install_mod(&Config::default(), mod_dir.path(), None).unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { .. }));
    }
}
