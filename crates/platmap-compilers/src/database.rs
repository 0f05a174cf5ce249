//! Compilation databases
//!
//! Loads `compile_commands.json` files. Entries give the compiler arguments
//! either as an `arguments` list or as one shell-quoted `command` string.

use platmap_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// One compile command with absolute paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileCommand {
    /// Working directory of the command
    pub directory: PathBuf,
    /// Source file being compiled
    pub file: PathBuf,
    /// Executable followed by its arguments
    pub arguments: Vec<String>,
}

impl CompileCommand {
    pub fn executable(&self) -> &str {
        self.arguments.first().map(String::as_str).unwrap_or("")
    }

    /// Arguments after the executable
    pub fn args(&self) -> &[String] {
        self.arguments.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    directory: Option<PathBuf>,
    file: PathBuf,
    arguments: Option<Vec<String>>,
    command: Option<String>,
}

/// A loaded `compile_commands.json`
#[derive(Debug, Clone)]
pub struct CompilationDatabase {
    path: PathBuf,
    commands: Vec<CompileCommand>,
}

impl CompilationDatabase {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Database {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let base = path.parent().unwrap_or(Path::new("."));
        let database = Self::from_json_str(path, &content, base)?;
        info!("Loaded {} commands from {}", database.commands.len(), path.display());
        Ok(database)
    }

    /// Parse database content. Relative (or missing) `directory` values are
    /// resolved against `base`; relative `file` values against their
    /// directory.
    pub fn from_json_str(path: &Path, content: &str, base: &Path) -> Result<Self> {
        let invalid = |message: String| Error::Database {
            path: path.to_path_buf(),
            message,
        };

        let entries: Vec<RawEntry> =
            serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;

        let mut commands = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let arguments = match (entry.arguments, entry.command) {
                (Some(arguments), _) => arguments,
                (None, Some(command)) => split_command(&command)
                    .map_err(|e| invalid(format!("entry {}: {}", index + 1, e)))?,
                (None, None) => {
                    return Err(invalid(format!(
                        "entry {} has neither 'arguments' nor 'command'",
                        index + 1
                    )))
                }
            };
            if arguments.is_empty() {
                return Err(invalid(format!("entry {} has an empty command", index + 1)));
            }

            let directory = match &entry.directory {
                Some(directory) => normalize(&base.join(directory)),
                None => normalize(base),
            };
            let file = normalize(&directory.join(&entry.file));
            commands.push(CompileCommand {
                directory,
                file,
                arguments,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            commands,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commands(&self) -> &[CompileCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Canonical path when the file exists, otherwise a lexical cleanup of
/// `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Split a command string into arguments the way a POSIX shell would,
/// without expansion.
pub fn split_command(command: &str) -> std::result::Result<Vec<String>, String> {
    shlex::split(command)
        .ok_or_else(|| "unbalanced quotes or trailing backslash in command".to_string())
}
