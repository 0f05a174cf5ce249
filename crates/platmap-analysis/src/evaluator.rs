//! Conditional tree evaluation
//!
//! Walks one file's [`ConditionalTree`] under one context's symbol table and
//! reports which leaves are active. The walk owns its symbol table, so
//! `#define` and `#undef` lines in the file only affect the rest of that
//! walk.

use platmap_core::{Category, Diagnostics};
use platmap_parser::preprocessor::SymbolTable;
use platmap_parser::tree::{Condition, Region};
use platmap_parser::{ConditionalTree, LeafId, LeafKind, Node, NodeId};

/// Result of walking one tree in one context
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Active leaves in document order
    pub active: Vec<LeafId>,
    pub diagnostics: Diagnostics,
}

/// Evaluate a tree under a symbol table
pub fn evaluate(tree: &ConditionalTree, symbols: SymbolTable) -> Evaluation {
    let mut walker = Walker {
        tree,
        symbols,
        result: Evaluation::default(),
    };
    walker.walk(tree.roots());
    walker.result
}

struct Walker<'t> {
    tree: &'t ConditionalTree,
    symbols: SymbolTable,
    result: Evaluation,
}

impl<'t> Walker<'t> {
    fn walk(&mut self, nodes: &'t [NodeId]) {
        for &id in nodes {
            match self.tree.node(id) {
                Node::Code { leaf } => self.activate(*leaf),
                Node::Region(region) => self.walk_region(region),
            }
        }
    }

    fn activate(&mut self, id: LeafId) {
        let leaf = self.tree.leaf(id);
        if leaf.kind == LeafKind::Unreachable {
            return;
        }
        if let Some(edit) = leaf.edit() {
            self.symbols.apply(&edit);
        }
        self.result.active.push(id);
    }

    /// Every directive line of a reached region is active; only the first
    /// branch whose condition holds is descended into.
    fn walk_region(&mut self, region: &'t Region) {
        let mut taken = false;
        for branch in &region.branches {
            self.activate(branch.directive);
            if taken {
                continue;
            }
            if self.decide(branch.directive, &branch.condition) {
                taken = true;
                self.walk(&branch.children);
            }
        }
        self.activate(region.end);
    }

    fn decide(&mut self, directive: LeafId, condition: &Condition) -> bool {
        match condition.evaluate(&self.symbols) {
            Ok(value) => value,
            Err(e) => {
                let line = self.tree.leaf(directive).lines.start;
                self.result.diagnostics.warn(
                    Category::Evaluation,
                    Some(self.tree.path()),
                    Some(line),
                    format!("cannot evaluate condition '{}': {}; treated as false", condition.text, e),
                );
                false
            }
        }
    }
}
