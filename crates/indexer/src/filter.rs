//! Path eligibility rules for indexing.

use crate::error::{IndexerError, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Bytes sniffed from the head of a file for the binary heuristic.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

enum CompiledPattern {
    /// Pattern without `/`, matched against every path component (so `.*`
    /// and `*.log` behave like the historical gitwildmatch matcher).
    Component(GlobMatcher),
    /// Pattern with `/`, matched against the whole relative path. `*` does
    /// not cross `/`; `**` does.
    Path(GlobMatcher),
    /// `dir/*` also rejects deeper descendants of `dir`.
    DirPrefix(String),
}

/// Decides whether a path is eligible for indexing. The pattern matching is
/// a pure function of the relative path and the configured patterns; the
/// full eligibility check additionally consults the filesystem.
pub struct PathFilter {
    root: PathBuf,
    patterns: Vec<CompiledPattern>,
    database_path: Option<PathBuf>,
}

impl PathFilter {
    pub fn new(
        root: &Path,
        ignore_patterns: &[String],
        database_path: Option<&Path>,
    ) -> Result<Self> {
        let mut patterns = Vec::new();
        for raw in ignore_patterns {
            let pattern = raw.trim();
            if pattern.is_empty() {
                continue;
            }

            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| IndexerError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })?;

            if pattern.contains('/') {
                patterns.push(CompiledPattern::Path(glob.compile_matcher()));
                if let Some(dir) = pattern.strip_suffix("/*") {
                    patterns.push(CompiledPattern::DirPrefix(format!("{dir}/")));
                }
            } else {
                patterns.push(CompiledPattern::Component(glob.compile_matcher()));
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            patterns,
            database_path: database_path.map(Path::to_path_buf),
        })
    }

    /// Project-relative path with forward slashes, or `None` when `abs`
    /// lies outside the project root.
    pub fn relative(&self, abs: &Path) -> Option<String> {
        let relative = abs.strip_prefix(&self.root).ok()?;
        let mut normalized = relative.to_string_lossy().to_string();
        if normalized.contains('\\') {
            normalized = normalized.replace('\\', "/");
        }
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }

    /// Whether any configured ignore pattern rejects `relative_path`.
    pub fn matches_ignore(&self, relative_path: &str) -> bool {
        for pattern in &self.patterns {
            let rejected = match pattern {
                CompiledPattern::Component(matcher) => relative_path
                    .split('/')
                    .any(|component| matcher.is_match(component)),
                CompiledPattern::Path(matcher) => matcher.is_match(relative_path),
                CompiledPattern::DirPrefix(prefix) => relative_path.starts_with(prefix.as_str()),
            };
            if rejected {
                return true;
            }
        }
        false
    }

    /// Full eligibility check: regular file, inside the root, not the
    /// store's own database, not ignored, not binary.
    pub fn is_eligible(&self, abs: &Path) -> io::Result<bool> {
        let metadata = match std::fs::metadata(abs) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if !metadata.is_file() {
            return Ok(false);
        }

        if self.is_database_path(abs) {
            return Ok(false);
        }

        let Some(relative) = self.relative(abs) else {
            return Ok(false);
        };
        if self.matches_ignore(&relative) {
            return Ok(false);
        }

        Ok(!is_binary_file(abs)?)
    }

    /// The index must never index its own database or SQLite side files
    /// (`-wal`, `-shm`).
    fn is_database_path(&self, abs: &Path) -> bool {
        let Some(database_path) = &self.database_path else {
            return false;
        };
        abs.starts_with(database_path)
            || abs
                .to_string_lossy()
                .starts_with(database_path.to_string_lossy().as_ref())
    }
}

fn is_binary_file(path: &Path) -> io::Result<bool> {
    let mut head = [0u8; BINARY_SNIFF_BYTES];
    let mut file = File::open(path)?;
    let mut filled = 0;
    loop {
        let read = file.read(&mut head[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
        if filled == head.len() {
            break;
        }
    }
    Ok(head[..filled].contains(&0))
}
