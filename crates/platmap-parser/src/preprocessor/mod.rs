//! C preprocessor support
//!
//! Directive parsing, `#if` expression evaluation, and the macro symbol
//! tables conditions are evaluated against. No macro expansion is done;
//! only the information needed to decide conditional inclusion.

pub mod directive;
pub mod expr;
pub mod symbols;

pub use directive::Directive;
pub use expr::{parse_expression, Expr, ExprError};
pub use symbols::{is_identifier, parse_integer_literal, DefineError, MacroDefinition, MacroEdit, SymbolTable};
