//! Compiler table
//!
//! The built-in specifications compiled into the binary, with user files
//! merged on top. Lookups go by executable name.

use crate::spec::CompilerSpec;
use platmap_core::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BUILTIN_COMPILERS: &str = include_str!("../data/compilers.yaml");

/// Compiler specifications by name and alias
#[derive(Debug, Clone, Default)]
pub struct CompilerTable {
    specs: BTreeMap<String, Arc<CompilerSpec>>,
    aliases: HashMap<String, String>,
}

impl CompilerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_COMPILERS)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut table = Self::new();
        for spec in CompilerSpec::parse_yaml(text)? {
            table.insert(spec);
        }
        Ok(table)
    }

    pub fn load_yaml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// The built-in table with each user file merged on top, in order
    pub fn with_user_files(paths: &[PathBuf]) -> Result<Self> {
        let mut table = Self::builtin()?;
        for path in paths {
            info!("Loading compiler specifications from {}", path.display());
            table.merge(Self::load_yaml(path)?);
        }
        Ok(table)
    }

    /// Add a specification, replacing any entry of the same name along with
    /// the aliases that pointed at it
    pub fn insert(&mut self, spec: CompilerSpec) {
        let name = spec.name.clone();
        if self.specs.contains_key(&name) {
            debug!("Replacing compiler specification '{}'", name);
            self.aliases.retain(|_, target| *target != name);
        }
        for alias in &spec.aliases {
            self.aliases.insert(alias.clone(), name.clone());
        }
        self.specs.insert(name, Arc::new(spec));
    }

    /// Merge another table over this one
    pub fn merge(&mut self, other: CompilerTable) {
        for (_, spec) in other.specs {
            let spec = Arc::try_unwrap(spec).unwrap_or_else(|shared| (*shared).clone());
            self.insert(spec);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CompilerSpec>> {
        self.specs
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|target| self.specs.get(target)))
    }

    /// Find the specification for a compiler executable.
    ///
    /// The directory and any `.exe` extension are dropped first. If the
    /// name is not known as-is, a version suffix (`gcc-12`, `clang++-17.0`)
    /// and then a cross-compiler target prefix (`aarch64-linux-gnu-gcc`)
    /// are removed in turn.
    pub fn lookup(&self, executable: &str) -> Option<&Arc<CompilerSpec>> {
        let name = executable_name(executable);
        if let Some(spec) = self.get(name) {
            return Some(spec);
        }
        let unversioned = strip_version(name);
        if let Some(spec) = self.get(unversioned) {
            return Some(spec);
        }
        unversioned
            .rsplit_once('-')
            .and_then(|(_, tool)| self.get(tool))
    }

    /// Compiler names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// File name of an executable path, without `.exe`
pub fn executable_name(executable: &str) -> &str {
    let file = executable.rsplit(['/', '\\']).next().unwrap_or(executable);
    file.strip_suffix(".exe").unwrap_or(file)
}

fn strip_version(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((base, version))
            if !base.is_empty()
                && version.starts_with(|c: char| c.is_ascii_digit())
                && version.chars().all(|c| c.is_ascii_digit() || c == '.') =>
        {
            base
        }
        _ => name,
    }
}
