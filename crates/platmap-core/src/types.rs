//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// One evaluation context: a platform compiled for at most one pass.
///
/// Passes of the same platform are mutually exclusive, so a platform that
/// resolves to several passes owns several contexts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId {
    /// Platform name as declared in the configuration
    pub platform: String,
    /// Pass name, `None` when the compiler resolved no passes
    pub pass: Option<String>,
}

impl ContextId {
    pub fn new(platform: impl Into<String>, pass: Option<String>) -> Self {
        Self {
            platform: platform.into(),
            pass,
        }
    }

    /// Label used when passes are reported as pseudo-platforms
    pub fn label(&self) -> String {
        match &self.pass {
            Some(pass) => format!("{}/{}", self.platform, pass),
            None => self.platform.clone(),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Index of a [`ContextId`] in the run's context table
pub type ContextIndex = usize;

/// How lines are counted when aggregating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMetric {
    /// Physical lines, blank and comment lines included
    #[default]
    Lines,
    /// Source lines of code: lines with non-comment content
    Sloc,
}

/// Which identifiers make up a set in the set map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Passes are folded back into their platform
    #[default]
    Platform,
    /// Every (platform, pass) context is a member of its own
    Pass,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_label() {
        let plain = ContextId::new("cpu", None);
        assert_eq!(plain.label(), "cpu");

        let pass = ContextId::new("gpu", Some("sm_80".to_string()));
        assert_eq!(pass.label(), "gpu/sm_80");
        assert_eq!(pass.to_string(), "gpu/sm_80");
    }

    #[test]
    fn test_metric_serde() {
        let metric: LineMetric = serde_json::from_str("\"sloc\"").unwrap();
        assert_eq!(metric, LineMetric::Sloc);
        assert_eq!(LineMetric::default(), LineMetric::Lines);
    }
}
