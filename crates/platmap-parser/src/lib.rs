//! platmap Parser
//!
//! Builds platform-independent conditional-compilation trees from C-family
//! sources.
//!
//! ## Modules
//!
//! - `source` - Logical line scanning (continuations, comments, SLOC)
//! - `preprocessor` - Directives, `#if` expressions and symbol tables
//! - `tree` - The per-file conditional tree arena
//! - `discover` - Source file discovery with exclusion patterns
//! - `parallel` - Parallel tree building using rayon

pub mod discover;
pub mod parallel;
pub mod preprocessor;
pub mod source;
pub mod tree;

pub use discover::SourceFilter;
pub use parallel::TreeBuilder;
pub use tree::{ConditionalTree, LeafId, LeafKind, Node, NodeId};

#[cfg(test)]
mod tests;
