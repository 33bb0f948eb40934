//! Path filter: include/exclude globs plus gitignore semantics.
//!
//! Built once from configuration, then used as a pure, thread-safe
//! predicate by the walker, the scheduler, and the watcher. Glob matching
//! uses `globset`; gitignore matching (negation, anchoring, directory-only
//! patterns, later-pattern-wins ordering) uses the `ignore` crate's
//! gitignore engine.

use crate::error::IndexError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// A source of gitignore patterns fed into [`PathFilter::build`].
#[derive(Debug, Clone)]
pub enum GitignoreSource {
    /// A gitignore file on disk (e.g. `<root>/.gitignore`).
    File(PathBuf),
    /// A single pattern line, as it would appear in a gitignore file.
    Line(String),
}

/// Pure predicate over project paths.
#[derive(Debug)]
pub struct PathFilter {
    root: PathBuf,
    include: Option<GlobSet>,
    exclude: GlobSet,
    gitignore: Gitignore,
}

impl PathFilter {
    /// Build the predicate from include globs, exclude globs, and ordered
    /// gitignore sources. An empty include list means "everything".
    pub fn build(
        root: &Path,
        include_globs: &[String],
        exclude_globs: &[String],
        gitignore_sources: &[GitignoreSource],
    ) -> Result<Self, IndexError> {
        let include = if include_globs.is_empty() {
            None
        } else {
            Some(build_glob_set(include_globs)?)
        };
        let exclude = build_glob_set(exclude_globs)?;

        let mut builder = GitignoreBuilder::new(root);
        for source in gitignore_sources {
            match source {
                GitignoreSource::File(path) => {
                    // Missing files are fine: a project without a
                    // .gitignore just has no ignore rules.
                    if path.exists() {
                        if let Some(e) = builder.add(path) {
                            tracing::warn!("[filter] skipping {}: {e}", path.display());
                        }
                    }
                }
                GitignoreSource::Line(line) => {
                    builder
                        .add_line(None, line)
                        .map_err(|e| IndexError::ConfigInvalid {
                            reason: format!("bad ignore pattern '{line}': {e}"),
                        })?;
                }
            }
        }
        let gitignore = builder.build().map_err(|e| IndexError::ConfigInvalid {
            reason: format!("failed to build ignore rules: {e}"),
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            include,
            exclude,
            gitignore,
        })
    }

    /// Should this path be indexed (or, for a directory, descended into)?
    pub fn should_index(&self, path: &Path, is_dir: bool) -> bool {
        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => rel,
            // Paths outside the root are never indexed.
            Err(_) if path.is_absolute() => return false,
            Err(_) => path,
        };
        if relative.as_os_str().is_empty() {
            // The root itself is always walkable.
            return is_dir;
        }

        if self.exclude.is_match(relative) {
            return false;
        }
        if self
            .gitignore
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
        {
            return false;
        }
        // Include globs constrain files only; directories must stay
        // walkable so nested matches can be reached.
        if !is_dir {
            if let Some(include) = &self.include {
                return include.is_match(relative);
            }
        }
        true
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, IndexError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| IndexError::ConfigInvalid {
            reason: format!("bad glob '{pattern}': {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| IndexError::ConfigInvalid {
        reason: format!("failed to compile globs: {e}"),
    })
}
