//! Source file discovery for the summarize and explain commands
//!
//! Walks with the `ignore` crate (respects .gitignore, skips hidden entries)
//! and filters by extension and exclude globs matched against the path
//! relative to the repository root.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use condense_engine::SourceFile;

/// Walk options
pub(crate) struct ScanConfig {
    /// File extensions to keep, without the dot
    pub extensions: Vec<String>,
    /// Glob patterns matched against the relative path
    pub exclude: Vec<String>,
    /// Include hidden files (starting with .)
    pub include_hidden: bool,
    /// Respect .gitignore files
    pub respect_gitignore: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_owned()],
            exclude: Vec::new(),
            include_hidden: false,
            respect_gitignore: true,
        }
    }
}

/// A discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScannedFile {
    pub path: PathBuf,
    /// `/`-separated path relative to the walk root
    pub relative_path: String,
}

/// Matching files under `base`, sorted by relative path
pub(crate) fn collect_files(base: &Path, config: &ScanConfig) -> Result<Vec<ScannedFile>> {
    if !base.is_dir() {
        anyhow::bail!("Not a directory: {}", base.display());
    }

    let patterns: Vec<glob::Pattern> = config
        .exclude
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                log::warn!("Ignoring invalid exclude pattern '{}': {}", p, e);
                None
            },
        })
        .collect();

    let walker = WalkBuilder::new(base)
        .hidden(!config.include_hidden)
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut files = Vec::new();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| config.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
        if !matches_ext {
            continue;
        }

        let relative_path = path
            .strip_prefix(base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if patterns.iter().any(|p| p.matches(&relative_path)) {
            log::debug!("Excluded {}", relative_path);
            continue;
        }

        files.push(ScannedFile { path: path.to_path_buf(), relative_path });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Read scanned files as UTF-8. Unreadable files are skipped with a warning.
pub(crate) fn read_sources(files: &[ScannedFile]) -> Vec<SourceFile> {
    files
        .iter()
        .filter_map(|file| match std::fs::read_to_string(&file.path) {
            Ok(content) => Some(SourceFile {
                relative_path: file.relative_path.clone(),
                content,
            }),
            Err(e) => {
                log::warn!("Skipping {}: {}", file.path.display(), e);
                None
            },
        })
        .collect()
}

/// Total bytes of `files`, for status output
pub(crate) fn total_size(files: &[ScannedFile]) -> Result<u64> {
    files.iter().try_fold(0u64, |acc, f| {
        let len = f
            .path
            .metadata()
            .with_context(|| format!("Failed to stat {}", f.path.display()))?
            .len();
        Ok(acc + len)
    })
}
