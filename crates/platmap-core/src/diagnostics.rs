//! Non-fatal diagnostics
//!
//! Recoverable problems (malformed directives, undecidable conditions,
//! unknown compilers, unreadable files) are collected here and returned
//! next to the normal results so a batch run can continue and tests can
//! assert on them.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// What kind of degradation a diagnostic describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Unbalanced, unterminated or ill-formed conditional directives
    MalformedFile,
    /// A condition that could not be evaluated and was treated as false
    Evaluation,
    /// A compile command that could not be resolved to a compiler
    Resolution,
    /// An unreadable file or a file missing from the analyzed set
    Resource,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::MalformedFile => "malformed file",
            Category::Evaluation => "evaluation",
            Category::Resolution => "resolution",
            Category::Resource => "resource",
        };
        f.write_str(name)
    }
}

/// A single recorded problem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: ", file.display(), line)?,
            (Some(file), None) => write!(f, "{}: ", file.display())?,
            _ => {}
        }
        write!(f, "{} ({})", self.message, self.category)
    }
}

/// Ordered, duplicate-free collection of diagnostics
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    seen: HashSet<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic; an identical one recorded earlier is kept once
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.seen.insert(diagnostic.clone()) {
            self.items.push(diagnostic);
        }
    }

    /// Record a warning
    pub fn warn(
        &mut self,
        category: Category,
        file: Option<&Path>,
        line: Option<u32>,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            category,
            file: file.map(Path::to_path_buf),
            line,
            message: message.into(),
        });
    }

    /// Merge another collector, preserving its order
    pub fn extend(&mut self, other: Diagnostics) {
        for diagnostic in other.items {
            self.push(diagnostic);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Diagnostics of one category
    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.category == category)
    }

    /// Emit every diagnostic through `tracing`
    pub fn log(&self) {
        for diagnostic in &self.items {
            match diagnostic.severity {
                Severity::Warning => tracing::warn!("{}", diagnostic),
                Severity::Info => tracing::info!("{}", diagnostic),
            }
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_kept_once() {
        let mut diags = Diagnostics::new();
        let file = Path::new("a.c");
        diags.warn(Category::Evaluation, Some(file), Some(3), "division by zero");
        diags.warn(Category::Evaluation, Some(file), Some(3), "division by zero");
        diags.warn(Category::Evaluation, Some(file), Some(4), "division by zero");
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_extend_and_filter() {
        let mut a = Diagnostics::new();
        a.warn(Category::Resource, None, None, "cannot read x.c");

        let mut b = Diagnostics::new();
        b.warn(Category::MalformedFile, Some(Path::new("y.c")), Some(9), "unterminated #if");
        b.warn(Category::Resource, None, None, "cannot read x.c");

        a.extend(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.by_category(Category::MalformedFile).count(), 1);

        let text = a.iter().nth(1).unwrap().to_string();
        assert_eq!(text, "y.c:9: unterminated #if (malformed file)");
    }
}
