use crate::scan::{fold_key, DirectoryTree, FileEntry};
use std::collections::HashMap;

/// Case-insensitive lookup over one destination scan. One fold key can map
/// to several entries when the destination already contains case-duplicate
/// files; the planner treats that as a pre-existing inconsistency.
#[derive(Debug, Default)]
pub struct CaseFoldIndex {
    map: HashMap<String, Vec<FileEntry>>,
}

impl CaseFoldIndex {
    pub fn build(tree: &DirectoryTree) -> Self {
        let mut map: HashMap<String, Vec<FileEntry>> = HashMap::new();
        for entry in &tree.files {
            map.entry(fold_key(&entry.relative))
                .or_default()
                .push(entry.clone());
        }
        CaseFoldIndex { map }
    }

    pub fn lookup(&self, key: &str) -> &[FileEntry] {
        self.map.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
