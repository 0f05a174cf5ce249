//! platmap Analysis Engine
//!
//! Turns conditional trees and resolved platform contexts into line
//! associations:
//! - Evaluation of each tree under each context it is compiled in
//! - Set maps of lines per exact member set
//! - Summary statistics and similarity clustering
//! - Coverage and tree exports

pub mod clustering;
pub mod evaluator;
pub mod plan;
pub mod report;
pub mod setmap;
pub mod stats;

pub use clustering::{Dendrogram, Merge};
pub use evaluator::{evaluate, Evaluation};
pub use plan::{EvaluationPlan, LeafContexts};
pub use report::{Analysis, CoverageEntry, FileResult, TreeDump};
pub use setmap::{MemberIndex, MemberSet, SetMap};
pub use stats::{MemberSummary, Summary};

use platmap_compilers::{CompilationDatabase, CompilerTable, Platform, PlatformModel};
use platmap_core::config::Config;
use platmap_core::{Category, Diagnostics, Error, Result};
use platmap_parser::{SourceFilter, TreeBuilder};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Main analyzer
pub struct Analyzer {
    config: Config,
    compilers: CompilerTable,
}

impl Analyzer {
    /// Create an analyzer with the built-in compilers plus any the
    /// configuration names
    pub fn new(config: Config) -> Result<Self> {
        let compilers = CompilerTable::with_user_files(&config.compilers)?;
        Ok(Self { config, compilers })
    }

    /// Replace the compiler table
    pub fn with_compilers(mut self, compilers: CompilerTable) -> Self {
        self.compilers = compilers;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the whole analysis.
    ///
    /// Configuration and database errors abort the run; everything else
    /// is reported through [`Analysis::diagnostics`].
    pub fn run(&self) -> Result<Analysis> {
        let config = &self.config;
        config.validate()?;
        if config.platforms.is_empty() {
            return Err(Error::Config("no platforms configured".into()));
        }

        let filter = SourceFilter::new(&config.root, &config.extensions, &config.exclude)?;
        let mut diagnostics = Diagnostics::new();

        let mut platforms = Vec::with_capacity(config.platforms.len());
        for platform in &config.platforms {
            let database = CompilationDatabase::load(&platform.commands)?;
            info!("Platform {}: {} commands", platform.name, database.len());
            platforms.push(Platform {
                name: platform.name.clone(),
                database,
            });
        }
        let model = PlatformModel::build(&platforms, &self.compilers, &mut diagnostics);

        let files = self.collect_files(&filter, &model, &mut diagnostics);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.unwrap_or(0))
            .build()
            .map_err(|e| Error::Config(format!("cannot start worker threads: {}", e)))?;

        let (trees, associations) = pool.install(|| {
            let set = TreeBuilder::new().build_files(&files);
            diagnostics.extend(set.diagnostics);
            if set.trees.is_empty() {
                return Err(Error::NoAnalyzableFiles);
            }

            let plan = EvaluationPlan::new(&set.trees, &model);
            let results = plan.run(&set.trees);
            let (associations, evaluation) = plan::reduce(&set.trees, results);
            diagnostics.extend(evaluation);
            Ok((set.trees, associations))
        })?;

        Ok(Analysis {
            root: filter.root().to_path_buf(),
            platforms: model.platforms,
            contexts: model.contexts,
            files: trees
                .into_iter()
                .zip(associations)
                .map(|(tree, leaves)| FileResult { tree, leaves })
                .collect(),
            metric: config.count,
            diagnostics,
        })
    }

    /// Files under the root plus compiled files the filter accepts
    fn collect_files(
        &self,
        filter: &SourceFilter,
        model: &PlatformModel,
        diagnostics: &mut Diagnostics,
    ) -> Vec<PathBuf> {
        let mut files: BTreeSet<PathBuf> = filter.discover().into_iter().collect();
        for compiled in &model.files {
            if files.contains(&compiled.file) {
                continue;
            }
            if filter.relative(&compiled.file).is_none() {
                diagnostics.warn(
                    Category::Resource,
                    Some(compiled.file.as_path()),
                    None,
                    format!("compiled file is outside the root {}; ignored", filter.root().display()),
                );
            } else if filter.accepts(&compiled.file) {
                files.insert(compiled.file.clone());
            } else {
                debug!("Compiled file {:?} is excluded", compiled.file);
            }
        }
        files.into_iter().collect()
    }
}
