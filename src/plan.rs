use crate::index::CaseFoldIndex;
use crate::scan::{fold_key, DirectoryTree, FileEntry};
use serde::{Deserialize, Serialize};

/// How a case conflict between source and destination is resolved.
///
/// No policy ever deletes or renames an existing destination file;
/// `prefer-source` overwrites content at the destination's existing casing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    ReportOnly,
    PreferSource,
    PreferDestination,
}

/// Planned handling for one source file.
#[derive(Debug, Clone)]
pub enum MergeAction {
    /// No destination match at all.
    Copy { source: FileEntry },
    /// Destination has the same relative path, identical case.
    SkipIdentical { source: FileEntry },
    /// Exactly one destination entry shares the fold key but differs in case.
    ConflictCase {
        source: FileEntry,
        existing: FileEntry,
    },
    /// The destination already holds 2+ case-variants for this fold key, a
    /// pre-existing inconsistency the source file cannot disambiguate.
    /// Report-only under every policy.
    ConflictMultiple {
        source: FileEntry,
        existing: Vec<FileEntry>,
    },
}

/// One action per source file, in source scan order. Produced once and
/// applied once; rebuild from fresh scans rather than updating in place.
#[derive(Debug)]
pub struct MergePlan {
    pub actions: Vec<MergeAction>,
    pub policy: ConflictPolicy,
}

pub fn plan(source: &DirectoryTree, dest: &CaseFoldIndex, policy: ConflictPolicy) -> MergePlan {
    let mut actions = Vec::with_capacity(source.files.len());
    for entry in &source.files {
        let matches = dest.lookup(&fold_key(&entry.relative));
        let action = match matches {
            [] => MergeAction::Copy {
                source: entry.clone(),
            },
            [existing] if existing.relative == entry.relative => MergeAction::SkipIdentical {
                source: entry.clone(),
            },
            [existing] => MergeAction::ConflictCase {
                source: entry.clone(),
                existing: existing.clone(),
            },
            _ => MergeAction::ConflictMultiple {
                source: entry.clone(),
                existing: matches.to_vec(),
            },
        };
        actions.push(action);
    }
    MergePlan { actions, policy }
}
