//! Analysis results and the views built from them

use crate::clustering::{self, Dendrogram};
use crate::plan::LeafContexts;
use crate::setmap::{MemberIndex, MemberSet, SetMap};
use crate::stats::Summary;
use platmap_compilers::ContextTable;
use platmap_core::{ContextIndex, Diagnostics, Error, Granularity, LineMetric, LineRange, Result};
use platmap_parser::tree::Leaf;
use platmap_parser::ConditionalTree;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One analyzed file with the contexts of each leaf
#[derive(Debug, Clone)]
pub struct FileResult {
    pub tree: ConditionalTree,
    /// Indexed by leaf id
    pub leaves: LeafContexts,
}

impl FileResult {
    /// Contexts under which a line is active
    pub fn line_contexts(&self, line: u32) -> Option<&BTreeSet<ContextIndex>> {
        self.tree
            .leaves()
            .iter()
            .position(|leaf| leaf.lines.contains(line))
            .map(|id| &self.leaves[id])
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct Analysis {
    /// Canonical analysis root
    pub root: PathBuf,
    /// Platform names in declaration order
    pub platforms: Vec<String>,
    pub contexts: ContextTable,
    /// Analyzed files, sorted by path
    pub files: Vec<FileResult>,
    pub metric: LineMetric,
    pub diagnostics: Diagnostics,
}

/// Member names and the member of each context
struct Membership {
    members: Vec<String>,
    of_context: Vec<Option<MemberIndex>>,
}

impl Analysis {
    fn membership(&self, granularity: Granularity) -> Membership {
        match granularity {
            Granularity::Platform => Membership {
                members: self.platforms.clone(),
                of_context: self
                    .contexts
                    .iter()
                    .map(|(_, id)| self.platforms.iter().position(|p| *p == id.platform))
                    .collect(),
            },
            Granularity::Pass => Membership {
                members: self.contexts.iter().map(|(_, id)| id.label()).collect(),
                of_context: self.contexts.iter().map(|(index, _)| Some(index)).collect(),
            },
        }
    }

    fn leaf_count(&self, leaf: &Leaf) -> u64 {
        match self.metric {
            LineMetric::Lines => u64::from(leaf.lines.len()),
            LineMetric::Sloc => u64::from(leaf.sloc),
        }
    }

    /// Lines per exact member set
    pub fn setmap(&self, granularity: Granularity) -> SetMap {
        let membership = self.membership(granularity);
        let mut setmap = SetMap::new(membership.members.clone());
        for file in &self.files {
            for (leaf, contexts) in file.tree.leaves().iter().zip(&file.leaves) {
                let members: MemberSet = contexts
                    .iter()
                    .filter_map(|&c| membership.of_context.get(c).copied().flatten())
                    .collect();
                setmap.add(members, self.leaf_count(leaf));
            }
        }
        setmap
    }

    pub fn summary(&self, granularity: Granularity) -> Summary {
        Summary::from_setmap(&self.setmap(granularity))
    }

    /// Resolve member names, in the order given
    pub fn member_indices(
        &self,
        names: &[String],
        granularity: Granularity,
    ) -> Result<Vec<MemberIndex>> {
        let membership = self.membership(granularity);
        names
            .iter()
            .map(|name| {
                membership
                    .members
                    .iter()
                    .position(|m| m == name)
                    .ok_or_else(|| Error::UnknownPlatform(name.clone()))
            })
            .collect()
    }

    /// Clustering of the named members, or of all members when `subset` is
    /// `None`. `Ok(None)` with fewer than two.
    pub fn dendrogram(
        &self,
        granularity: Granularity,
        subset: Option<&[String]>,
    ) -> Result<Option<Dendrogram>> {
        let setmap = self.setmap(granularity);
        let members: Vec<MemberIndex> = match subset {
            Some(names) => {
                let mut members = self.member_indices(names, granularity)?;
                members.sort_unstable();
                members.dedup();
                members
            }
            None => (0..setmap.members().len()).collect(),
        };
        Ok(clustering::cluster(&setmap, &members))
    }

    /// Lines active for one member, counted directly from the leaves
    pub fn member_lines(&self, member: &str, granularity: Granularity) -> u64 {
        let membership = self.membership(granularity);
        let Some(target) = membership.members.iter().position(|m| m == member) else {
            return 0;
        };
        self.files
            .iter()
            .flat_map(|file| file.tree.leaves().iter().zip(&file.leaves))
            .filter(|(_, contexts)| {
                contexts
                    .iter()
                    .any(|&c| membership.of_context.get(c).copied().flatten() == Some(target))
            })
            .map(|(leaf, _)| self.leaf_count(leaf))
            .sum()
    }

    /// Path relative to the root, or unchanged when outside it
    pub fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// Find a file by path, absolute or relative to the root
    pub fn file(&self, path: &Path) -> Option<&FileResult> {
        let absolute = if path.is_absolute() {
            path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
        } else {
            let joined = self.root.join(path);
            joined.canonicalize().unwrap_or(joined)
        };
        self.files.iter().find(|f| f.tree.path() == absolute)
    }

    /// Lossless dump of one file's tree with the contexts of each leaf
    pub fn tree_dump<'a>(&'a self, file: &'a FileResult) -> TreeDump<'a> {
        TreeDump {
            file: self.relative(file.tree.path()),
            contexts: self.contexts.iter().map(|(_, id)| id.label()).collect(),
            tree: &file.tree,
            associations: file
                .tree
                .leaves()
                .iter()
                .zip(&file.leaves)
                .enumerate()
                .map(|(leaf, (l, contexts))| LeafAssociation {
                    leaf,
                    lines: l.lines,
                    contexts: contexts.iter().copied().collect(),
                })
                .collect(),
        }
    }

    /// Lines active under at least one context, per file
    pub fn coverage(&self) -> Vec<CoverageEntry> {
        self.files
            .iter()
            .map(|file| CoverageEntry {
                file: self.relative(file.tree.path()).to_path_buf(),
                id: file.tree.content_id().to_string(),
                lines: file
                    .tree
                    .leaves()
                    .iter()
                    .zip(&file.leaves)
                    .filter(|(_, contexts)| !contexts.is_empty())
                    .flat_map(|(leaf, _)| leaf.lines.lines())
                    .collect(),
            })
            .collect()
    }
}

/// Contexts of one leaf, as indices into [`TreeDump::contexts`]
#[derive(Debug, Clone, Serialize)]
pub struct LeafAssociation {
    pub leaf: usize,
    pub lines: LineRange,
    pub contexts: Vec<ContextIndex>,
}

#[derive(Debug, Serialize)]
pub struct TreeDump<'a> {
    pub file: &'a Path,
    /// Context labels, indexed by context
    pub contexts: Vec<String>,
    pub tree: &'a ConditionalTree,
    pub associations: Vec<LeafAssociation>,
}

/// Covered lines of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageEntry {
    pub file: PathBuf,
    /// Hex SHA-512 of the file contents
    pub id: String,
    pub lines: Vec<u32>,
}
