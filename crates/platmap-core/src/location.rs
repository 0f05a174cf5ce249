//! Source line ranges

use serde::{Deserialize, Serialize};

/// Half-open range of physical source lines, 1-based.
///
/// `start` is the first line in the range, `end` is one past the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    /// Create a new range covering `start..end`
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "inverted line range {}..{}", start, end);
        Self { start, end }
    }

    /// Range covering a single line
    pub fn line(line: u32) -> Self {
        Self::new(line, line + 1)
    }

    /// Number of physical lines in the range
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line < self.end
    }

    /// Iterate over the line numbers in the range
    pub fn lines(&self) -> impl Iterator<Item = u32> {
        self.start..self.end
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.len() == 1 {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end.saturating_sub(1))
        }
    }
}
