//! Evaluation plan
//!
//! Pairs every analyzed tree with each context it is compiled in. Units
//! are evaluated in parallel; each returns its own active leaves, which
//! are then reduced into per-leaf context sets on one thread.

use crate::evaluator::{evaluate, Evaluation};
use platmap_compilers::PlatformModel;
use platmap_core::{ContextIndex, Diagnostics};
use platmap_parser::preprocessor::SymbolTable;
use platmap_parser::ConditionalTree;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// One tree evaluated in one context
#[derive(Debug, Clone, Copy)]
pub struct EvaluationUnit<'m> {
    /// Index into the analyzed trees
    pub tree: usize,
    pub context: ContextIndex,
    pub symbols: &'m SymbolTable,
}

/// All units of a run
#[derive(Debug, Default)]
pub struct EvaluationPlan<'m> {
    units: Vec<EvaluationUnit<'m>>,
}

/// Contexts under which each leaf of a tree is active, by leaf id
pub type LeafContexts = Vec<BTreeSet<ContextIndex>>;

impl<'m> EvaluationPlan<'m> {
    /// Plan one unit per (compiled file, context) whose file was analyzed
    pub fn new(trees: &[ConditionalTree], model: &'m PlatformModel) -> Self {
        let by_path: HashMap<&Path, usize> = trees
            .iter()
            .enumerate()
            .map(|(index, tree)| (tree.path(), index))
            .collect();

        let mut units = Vec::new();
        for file in &model.files {
            match by_path.get(file.file.as_path()) {
                Some(&tree) => units.push(EvaluationUnit {
                    tree,
                    context: file.context,
                    symbols: &file.symbols,
                }),
                None => debug!("No tree for compiled file {}", file.file.display()),
            }
        }

        info!("Planned {} evaluations over {} files", units.len(), trees.len());
        Self { units }
    }

    pub fn units(&self) -> &[EvaluationUnit<'m>] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Evaluate every unit in parallel, in the current rayon pool
    pub fn run(&self, trees: &[ConditionalTree]) -> Vec<(EvaluationUnit<'m>, Evaluation)> {
        self.units
            .par_iter()
            .map(|unit| (*unit, evaluate(&trees[unit.tree], unit.symbols.clone())))
            .collect()
    }
}

/// Fold unit results into per-leaf context sets, one entry per tree
pub fn reduce(
    trees: &[ConditionalTree],
    results: Vec<(EvaluationUnit<'_>, Evaluation)>,
) -> (Vec<LeafContexts>, Diagnostics) {
    let mut associations: Vec<LeafContexts> = trees
        .iter()
        .map(|tree| vec![BTreeSet::new(); tree.leaves().len()])
        .collect();
    let mut diagnostics = Diagnostics::new();

    for (unit, evaluation) in results {
        let leaves = &mut associations[unit.tree];
        for leaf in evaluation.active {
            leaves[leaf].insert(unit.context);
        }
        diagnostics.extend(evaluation.diagnostics);
    }
    (associations, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use platmap_compilers::{ContextTable, FileContext};
    use platmap_core::ContextId;
    use platmap_parser::preprocessor::MacroDefinition;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_plan_and_reduce() {
        let (tree, _) = ConditionalTree::parse("/src/a.c", "#ifdef GPU\ngpu\n#else\ncpu\n#endif\n");
        let trees = vec![tree];

        let mut contexts = ContextTable::new();
        let cpu = contexts.intern(ContextId::new("cpu", None));
        let gpu = contexts.intern(ContextId::new("gpu", None));
        let model = PlatformModel {
            platforms: vec!["cpu".into(), "gpu".into()],
            contexts,
            files: vec![
                FileContext {
                    file: PathBuf::from("/src/a.c"),
                    context: cpu,
                    symbols: SymbolTable::new(),
                },
                FileContext {
                    file: PathBuf::from("/src/a.c"),
                    context: gpu,
                    symbols: SymbolTable::from_definitions([MacroDefinition::defined("GPU")]),
                },
                FileContext {
                    file: PathBuf::from("/elsewhere/b.c"),
                    context: gpu,
                    symbols: SymbolTable::new(),
                },
            ],
        };

        let plan = EvaluationPlan::new(&trees, &model);
        assert_eq!(plan.len(), 2);

        let (associations, diagnostics) = reduce(&trees, plan.run(&trees));
        assert!(diagnostics.is_empty());
        let both: BTreeSet<_> = [cpu, gpu].into_iter().collect();
        assert_eq!(
            associations[0],
            vec![
                both.clone(),
                [gpu].into_iter().collect(),
                both.clone(),
                [cpu].into_iter().collect(),
                both,
            ]
        );
    }
}
