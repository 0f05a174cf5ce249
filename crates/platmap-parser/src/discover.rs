//! Source discovery
//!
//! Decides which files under the analysis root take part in a run:
//! matching extension, and not matched by any exclusion glob.

use globset::{Glob, GlobSet, GlobSetBuilder};
use platmap_core::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Filter for files under a root directory
#[derive(Debug, Clone)]
pub struct SourceFilter {
    root: PathBuf,
    extensions: HashSet<String>,
    exclude: GlobSet,
}

impl SourceFilter {
    /// Create a filter.
    ///
    /// `root` is canonicalized so paths from compilation databases can be
    /// compared against it. Exclusion patterns are globs relative to it.
    pub fn new(root: &Path, extensions: &[String], exclude: &[String]) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            Error::Config(format!("cannot open root directory {}: {}", root.display(), e))
        })?;

        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Config(format!("invalid exclude pattern '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        let exclude = builder
            .build()
            .map_err(|e| Error::Config(format!("invalid exclude patterns: {}", e)))?;

        Ok(Self {
            root,
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            exclude,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the root, if the path is under it
    pub fn relative<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(&self.root).ok()
    }

    /// Whether a (canonical) path should be analyzed
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(relative) = self.relative(path) else {
            return false;
        };
        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false);
        has_extension && !self.exclude.is_match(relative)
    }

    /// Walk the root and return every accepted file, sorted.
    ///
    /// Paths are canonical so they compare equal to compilation database
    /// entries; files reached through symlinks that resolve outside the
    /// root are skipped.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|path| {
                let accepted = self.accepts(path);
                if !accepted {
                    debug!("Skipping {:?}", path);
                }
                accepted
            })
            .filter_map(|path| match path.canonicalize() {
                Ok(canonical) if self.relative(&canonical).is_some() => Some(canonical),
                Ok(canonical) => {
                    debug!("Skipping {:?}: resolves to {:?} outside the root", path, canonical);
                    None
                }
                Err(e) => {
                    debug!("Skipping {:?}: {}", path, e);
                    None
                }
            })
            .collect();
        files.sort();
        files.dedup();

        info!("Found {} source files under {}", files.len(), self.root.display());
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(dir: &Path, relative: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "int x;\n").unwrap();
    }

    #[test]
    fn test_discover_filters() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "main.cpp");
        touch(dir.path(), "kernel.CU");
        touch(dir.path(), "README.md");
        touch(dir.path(), "third_party/lib.c");
        touch(dir.path(), "src/util.h");

        let filter = SourceFilter::new(
            dir.path(),
            &["cpp".into(), "cu".into(), "c".into(), "h".into()],
            &["third_party/**".into()],
        )
        .unwrap();

        let found: Vec<_> = filter
            .discover()
            .iter()
            .map(|p| filter.relative(p).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(found, vec!["kernel.CU", "main.cpp", "src/util.h"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_yields_canonical_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "real/a.c");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let filter = SourceFilter::new(dir.path(), &["c".into()], &[]).unwrap();
        let found = filter.discover();
        assert_eq!(found, vec![filter.root().join("real/a.c")]);
        assert_eq!(found[0], dir.path().join("link/a.c").canonicalize().unwrap());
    }

    #[test]
    fn test_outside_root_not_accepted() {
        let dir = TempDir::new().unwrap();
        let filter = SourceFilter::new(dir.path(), &["c".into()], &[]).unwrap();
        assert!(!filter.accepts(Path::new("/elsewhere/file.c")));
        assert!(filter.accepts(&filter.root().join("file.c")));
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let result = SourceFilter::new(dir.path(), &["c".into()], &["a[".into()]);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
