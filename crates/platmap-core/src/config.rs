//! Configuration types

use crate::error::{Error, Result};
use crate::types::LineMetric;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// platmap analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the source tree
    pub root: PathBuf,

    /// Platforms in declaration order
    pub platforms: Vec<PlatformConfig>,

    /// Extra compiler specification files, merged over the built-in table
    pub compilers: Vec<PathBuf>,

    /// Glob patterns (relative to `root`) of files to leave out
    pub exclude: Vec<String>,

    /// File extensions to analyze
    pub extensions: Vec<String>,

    /// Worker threads; `None` uses the available parallelism
    pub jobs: Option<usize>,

    /// Line counting mode
    pub count: LineMetric,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            platforms: vec![],
            compilers: vec![],
            exclude: vec![],
            extensions: default_extensions(),
            jobs: None,
            count: LineMetric::default(),
        }
    }
}

/// A platform and the compilation database describing its build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Platform name
    pub name: String,
    /// Path to a `compile_commands.json`
    pub commands: PathBuf,
}

fn default_extensions() -> Vec<String> {
    [
        "c", "h", "cc", "cpp", "cxx", "c++", "hh", "hpp", "hxx", "h++", "cu", "cuh", "inc",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

impl Config {
    /// Load a configuration file (YAML, or JSON for `.json` files).
    ///
    /// Relative paths inside the file are resolved against the directory
    /// holding it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Make every relative path absolute with respect to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.root.is_relative() {
            self.root = base.join(&self.root);
        }
        for platform in &mut self.platforms {
            if platform.commands.is_relative() {
                platform.commands = base.join(&platform.commands);
            }
        }
        for compiler in &mut self.compilers {
            if compiler.is_relative() {
                *compiler = base.join(&*compiler);
            }
        }
    }

    /// Check the configuration for problems that would abort a run
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for platform in &self.platforms {
            if platform.name.trim().is_empty() {
                return Err(Error::Config("platform with an empty name".into()));
            }
            if platform.name.contains('/') {
                return Err(Error::Config(format!(
                    "platform name '{}' must not contain '/'",
                    platform.name
                )));
            }
            if !names.insert(platform.name.as_str()) {
                return Err(Error::Config(format!(
                    "platform '{}' is declared more than once",
                    platform.name
                )));
            }
        }
        if self.jobs == Some(0) {
            return Err(Error::Config("jobs must be at least 1".into()));
        }
        if self.extensions.is_empty() {
            return Err(Error::Config("no file extensions to analyze".into()));
        }
        Ok(())
    }

    /// Names of the configured platforms, in declaration order
    pub fn platform_names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_load_yaml_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("platmap.yaml");
        std::fs::write(
            &path,
            r#"
root: src
platforms:
  - name: cpu
    commands: build-cpu/compile_commands.json
  - name: gpu
    commands: /abs/compile_commands.json
exclude: ["third_party/**"]
count: sloc
"#,
        )
        .unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.root, dir.path().join("src"));
        assert_eq!(config.platform_names(), vec!["cpu", "gpu"]);
        assert_eq!(
            config.platforms[0].commands,
            dir.path().join("build-cpu/compile_commands.json")
        );
        assert_eq!(config.platforms[1].commands, PathBuf::from("/abs/compile_commands.json"));
        assert_eq!(config.count, LineMetric::Sloc);
        assert!(config.extensions.contains(&"cu".to_string()));
    }

    #[test]
    fn test_duplicate_platform_rejected() {
        let config = Config {
            platforms: vec![
                PlatformConfig { name: "cpu".into(), commands: "a.json".into() },
                PlatformConfig { name: "cpu".into(), commands: "b.json".into() },
            ],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("platmap.json");
        std::fs::write(&path, r#"{"root": ".", "platfroms": []}"#).unwrap();
        assert!(matches!(Config::from_path(&path), Err(Error::Json(_))));
    }
}
