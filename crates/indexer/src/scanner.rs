//! Deterministic project walk producing eligible files.

use crate::filter::PathFilter;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

pub struct FileScanner<'a> {
    root: &'a Path,
    filter: &'a PathFilter,
}

impl<'a> FileScanner<'a> {
    pub fn new(root: &'a Path, filter: &'a PathFilter) -> Self {
        Self { root, filter }
    }

    /// Eligible absolute paths in lexicographic order. Unreadable entries
    /// are logged and skipped; the walk continues.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(self.root);
        // Eligibility is decided by the configured ignore patterns, not by
        // gitignore files.
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_path(|a, b| a.cmp(b));

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Walk error under {}: {err}", self.root.display());
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.into_path();
            match self.filter.is_eligible(&path) {
                Ok(true) => files.push(path),
                Ok(false) => {}
                Err(err) => log::warn!("Skipping {}: {err}", path.display()),
            }
        }

        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_is_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "beta").unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("skip.log"), "log").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.txt"), "gamma").unwrap();
        fs::write(dir.path().join("sub/blob.bin"), b"\0\0").unwrap();

        let filter = PathFilter::new(dir.path(), &["*.log".to_string()], None).unwrap();
        let files = FileScanner::new(dir.path(), &filter).scan();

        let relative: Vec<String> = files
            .iter()
            .filter_map(|path| filter.relative(path))
            .collect();
        assert_eq!(relative, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }
}
