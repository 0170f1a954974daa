//! Candidate discovery: walk a source root and pick the files to index.
//!
//! A file is a candidate when:
//! - no path component below the root starts with `.`
//! - it is not inside `node_modules`, `__pycache__` or `target`
//! - its path relative to the root matches none of `index.exclude_globs`
//! - its extension is one of `index.extensions` (case-insensitive)
//!
//! Candidates come back sorted by path so runs are deterministic.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::IndexConfig;
use crate::error::{Error, Result};

const DENIED_DIRS: &[&str] = &["node_modules", "__pycache__", "target"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub size: u64,
}

/// Resolve `root` to an absolute, existing directory.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let resolved = root.canonicalize().map_err(|e| {
        Error::InvalidInput(format!("source root {}: {}", root.display(), e))
    })?;
    if !resolved.is_dir() {
        return Err(Error::InvalidInput(format!(
            "source root is not a directory: {}",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// List candidate files under an already-resolved `root`.
pub fn discover(root: &Path, config: &IndexConfig) -> Result<Vec<Candidate>> {
    let exclude_set = build_globset(&config.exclude_globs)?;
    let extensions: Vec<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut candidates = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir_entry(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if !ext.is_some_and(|ext| extensions.contains(&ext)) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push(Candidate {
            path: path.to_path_buf(),
            size,
        });
    }

    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(candidates)
}

fn is_skipped_dir_entry(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && DENIED_DIRS.contains(&name.as_ref())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::InvalidInput(format!("exclude glob {:?}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::InvalidInput(format!("exclude globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(root: &Path, found: &[Candidate]) -> Vec<String> {
        found
            .iter()
            .map(|c| {
                c.path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn filters_hidden_denied_and_extensions() {
        let tmp = TempDir::new().unwrap();
        let root = resolve_root(tmp.path()).unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.MD"), "a").unwrap();
        fs::write(root.join("sub/c.txt"), "c").unwrap();
        fs::write(root.join("image.png"), "x").unwrap();
        fs::write(root.join(".hidden.txt"), "h").unwrap();
        fs::write(root.join(".git/config.txt"), "g").unwrap();
        fs::write(root.join("node_modules/pkg/readme.md"), "n").unwrap();

        let found = discover(&root, &IndexConfig::default()).unwrap();
        assert_eq!(names(&root, &found), vec!["a.MD", "b.txt", "sub/c.txt"]);
        assert_eq!(found[1].size, 1);
    }

    #[test]
    fn exclude_globs_apply_to_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let root = resolve_root(tmp.path()).unwrap();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("keep.txt"), "k").unwrap();
        fs::write(root.join("drafts/skip.txt"), "s").unwrap();

        let config = IndexConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..IndexConfig::default()
        };
        let found = discover(&root, &config).unwrap();
        assert_eq!(names(&root, &found), vec!["keep.txt"]);
    }

    #[test]
    fn bad_glob_is_invalid_input() {
        let tmp = TempDir::new().unwrap();
        let config = IndexConfig {
            exclude_globs: vec!["[".to_string()],
            ..IndexConfig::default()
        };
        assert!(matches!(
            discover(tmp.path(), &config).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn missing_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(resolve_root(&tmp.path().join("nope")).is_err());
    }
}
