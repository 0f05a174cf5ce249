//! platmap Compilers
//!
//! Knows how compilers turn command lines into preprocessor macros.
//!
//! - `spec` - Declarative compiler specifications (YAML)
//! - `table` - Built-in and user specifications, looked up by executable
//! - `resolve` - The invocation rule engine
//! - `database` - `compile_commands.json` loading
//! - `platform` - (platform, pass) contexts and per-file symbol tables

pub mod database;
pub mod platform;
pub mod resolve;
pub mod spec;
pub mod table;

pub use database::{CompilationDatabase, CompileCommand};
pub use platform::{ContextTable, FileContext, Platform, PlatformModel};
pub use resolve::ResolvedConfiguration;
pub use spec::{ArgRule, CompilerSpec, RuleAction, RuleDest};
pub use table::CompilerTable;
