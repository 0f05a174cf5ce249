//! platmap Core
//!
//! Core types shared by every platmap crate: the error type, the
//! diagnostics side channel, evaluation context ids, line ranges, and the
//! analysis configuration.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod location;
pub mod types;

pub use diagnostics::{Category, Diagnostic, Diagnostics, Severity};
pub use error::{Error, Result};
pub use location::LineRange;
pub use types::*;
