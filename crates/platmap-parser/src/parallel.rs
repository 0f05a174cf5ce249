//! Parallel tree building using rayon
//!
//! Reads and parses many files at once. Files have no dependencies on each
//! other, so every file is parsed independently and the results are
//! collected in input order.

use crate::tree::{content_id, ConditionalTree};
use platmap_core::{Category, Diagnostics, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Trees for a set of files
#[derive(Debug, Default)]
pub struct TreeSet {
    /// Trees of readable files, in input order
    pub trees: Vec<ConditionalTree>,
    pub diagnostics: Diagnostics,
}

/// Parallel tree builder
#[derive(Debug, Default)]
pub struct TreeBuilder;

impl TreeBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse one file.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the content id is
    /// still taken over the raw bytes.
    pub fn build_file(&self, path: &Path) -> Result<(ConditionalTree, Diagnostics)> {
        let bytes = std::fs::read(path)?;
        let source = String::from_utf8_lossy(&bytes);
        debug!("Parsing {:?}", path);
        let (mut tree, diagnostics) = ConditionalTree::parse(path, &source);
        tree.set_content_id(content_id(&bytes));
        Ok((tree, diagnostics))
    }

    /// Parse multiple files in parallel.
    ///
    /// Unreadable files are skipped with a resource warning.
    pub fn build_files(&self, paths: &[PathBuf]) -> TreeSet {
        let results: Vec<_> = paths
            .par_iter()
            .map(|path| (path, self.build_file(path)))
            .collect();

        let mut set = TreeSet::default();
        for (path, result) in results {
            match result {
                Ok((tree, diagnostics)) => {
                    set.trees.push(tree);
                    set.diagnostics.extend(diagnostics);
                }
                Err(e) => set.diagnostics.warn(
                    Category::Resource,
                    Some(path.as_path()),
                    None,
                    format!("cannot read file: {}", e),
                ),
            }
        }

        info!("Parsed {} of {} files", set.trees.len(), paths.len());
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parallel_build() {
        let dir = TempDir::new().unwrap();

        let mut paths = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("test{}.c", i));
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#ifdef F{}\nvoid func{}(void) {{}}\n#endif", i, i).unwrap();
            paths.push(path);
        }

        let set = TreeBuilder::new().build_files(&paths);
        assert_eq!(set.trees.len(), 5);
        assert!(set.diagnostics.is_empty());
        for (tree, path) in set.trees.iter().zip(&paths) {
            assert_eq!(tree.path(), path.as_path());
            assert_eq!(tree.line_count(), 3);
        }
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.c");
        std::fs::write(&good, "int x;\n").unwrap();
        let missing = dir.path().join("missing.c");

        let set = TreeBuilder::new().build_files(&[good, missing.clone()]);
        assert_eq!(set.trees.len(), 1);
        let diag = set.diagnostics.iter().next().unwrap();
        assert_eq!(diag.category, Category::Resource);
        assert_eq!(diag.file.as_deref(), Some(missing.as_path()));
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.c");
        let bytes = b"/* caf\xe9 */\nint x;\n";
        std::fs::write(&path, bytes).unwrap();

        let (tree, _) = TreeBuilder::new().build_file(&path).unwrap();
        assert_eq!(tree.line_count(), 2);
        assert_eq!(tree.sloc(), 1);
        assert_eq!(tree.content_id(), content_id(bytes));
    }

    #[test]
    fn test_content_id_is_sha512_of_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bar.h");
        std::fs::write(&path, "unguarded();").unwrap();

        let (tree, _) = TreeBuilder::new().build_file(&path).unwrap();
        assert_eq!(
            tree.content_id(),
            "3ba8372282f8f1bafc59bb3d0472dcd7ecd5f13a54f17585c6012bfc40bfba7b9afb905f24ccea087546f4c90363bba97d988e4067ec880f619d0ab623c3a7a1"
        );
    }
}
