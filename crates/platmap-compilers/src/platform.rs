//! Platform contexts
//!
//! Every platform's compile commands are resolved once against the compiler
//! table. Each resolved pass becomes a (platform, pass) context, and every
//! compiled file gets the symbol table of each context it is built in.

use crate::database::CompilationDatabase;
use crate::table::{executable_name, CompilerTable};
use platmap_core::{Category, ContextId, ContextIndex, Diagnostics};
use platmap_parser::preprocessor::SymbolTable;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// All evaluation contexts of a run, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ContextTable {
    contexts: Vec<ContextId>,
    index: HashMap<ContextId, ContextIndex>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of a context, adding it if it is new
    pub fn intern(&mut self, context: ContextId) -> ContextIndex {
        if let Some(&index) = self.index.get(&context) {
            return index;
        }
        let index = self.contexts.len();
        self.index.insert(context.clone(), index);
        self.contexts.push(context);
        index
    }

    pub fn get(&self, index: ContextIndex) -> Option<&ContextId> {
        self.contexts.get(index)
    }

    pub fn index_of(&self, context: &ContextId) -> Option<ContextIndex> {
        self.index.get(context).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContextIndex, &ContextId)> {
        self.contexts.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// A platform and its compilation database
#[derive(Debug, Clone)]
pub struct Platform {
    pub name: String,
    pub database: CompilationDatabase,
}

/// One file compiled in one context
#[derive(Debug, Clone)]
pub struct FileContext {
    pub file: PathBuf,
    pub context: ContextIndex,
    pub symbols: SymbolTable,
}

/// Resolved contexts and compiled files for all platforms
#[derive(Debug, Clone, Default)]
pub struct PlatformModel {
    /// Platform names in declaration order
    pub platforms: Vec<String>,
    pub contexts: ContextTable,
    pub files: Vec<FileContext>,
}

impl PlatformModel {
    /// Resolve every command of every platform.
    ///
    /// Commands whose compiler has no specification are skipped with a
    /// resolution warning.
    pub fn build(platforms: &[Platform], compilers: &CompilerTable, diagnostics: &mut Diagnostics) -> Self {
        let mut model = Self::default();

        for platform in platforms {
            model.platforms.push(platform.name.clone());
            for command in platform.database.commands() {
                let Some(spec) = compilers.lookup(command.executable()) else {
                    diagnostics.warn(
                        Category::Resolution,
                        Some(command.file.as_path()),
                        None,
                        format!(
                            "no compiler specification for '{}' on platform '{}'; command skipped",
                            executable_name(command.executable()),
                            platform.name
                        ),
                    );
                    continue;
                };

                let resolved = spec.resolve(command.args());
                debug!(
                    "{} on {}: modes {:?}, passes {:?}",
                    command.file.display(),
                    platform.name,
                    resolved.modes,
                    resolved.passes
                );
                for (what, name) in spec.undeclared(&resolved) {
                    diagnostics.warn(
                        Category::Resolution,
                        None,
                        None,
                        format!(
                            "compiler '{}' declares no {} named '{}'; it adds no macros",
                            spec.name, what, name
                        ),
                    );
                }

                for pass in resolved.pass_list() {
                    let id = ContextId::new(&platform.name, pass.map(str::to_string));
                    let context = model.contexts.intern(id);
                    model.files.push(FileContext {
                        file: command.file.clone(),
                        context,
                        symbols: spec.symbol_table(&resolved, pass),
                    });
                }
            }
        }

        info!(
            "Resolved {} platforms into {} contexts over {} compiled files",
            model.platforms.len(),
            model.contexts.len(),
            model.files.len()
        );
        model
    }

    /// Context indices belonging to a platform
    pub fn platform_contexts<'a>(&'a self, platform: &'a str) -> impl Iterator<Item = ContextIndex> + 'a {
        self.contexts
            .iter()
            .filter(move |(_, id)| id.platform == platform)
            .map(|(index, _)| index)
    }
}
