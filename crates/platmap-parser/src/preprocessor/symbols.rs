//! Macro definitions and symbol tables
//!
//! A [`SymbolTable`] holds the macros visible while evaluating conditional
//! directives for one evaluation context. Tables are cheap to clone so every
//! walk over a file can own a private copy and apply the file's own
//! `#define`/`#undef` lines without affecting other walks.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// A macro definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroDefinition {
    pub name: String,
    /// Parameter names for function-like macros
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    /// Replacement text; `None` for `#define NAME` with nothing after it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Errors raised while reading a macro definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefineError {
    #[error("Invalid macro name: '{0}'")]
    InvalidName(String),

    #[error("Unterminated parameter list in definition of '{0}'")]
    UnterminatedParams(String),
}

impl MacroDefinition {
    /// Create a macro that is simply defined (no replacement text)
    pub fn defined(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: None,
            value: None,
        }
    }

    /// Create a macro with a specific value
    pub fn with_value(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            params: None,
            value: Some(value.to_string()),
        }
    }

    /// Parse the command-line form `NAME` or `NAME=VALUE`.
    ///
    /// Like `-DNAME`, a bare name is defined to `1`.
    pub fn from_define_flag(spec: &str) -> Result<Self, DefineError> {
        let (name, value) = match spec.split_once('=') {
            Some((name, value)) => (name.trim(), value),
            None => (spec.trim(), "1"),
        };
        if !is_identifier(name) {
            return Err(DefineError::InvalidName(name.to_string()));
        }
        Ok(Self::with_value(name, value))
    }

    /// Parse the text following `#define`
    pub fn from_directive(text: &str) -> Result<Self, DefineError> {
        let text = text.trim_start();
        let name_len = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len());
        let name = &text[..name_len];
        if !is_identifier(name) {
            return Err(DefineError::InvalidName(name.to_string()));
        }

        let rest = &text[name_len..];
        // Function-like only when `(` immediately follows the name.
        let (params, body) = match rest.strip_prefix('(') {
            Some(after) => {
                let close = after
                    .find(')')
                    .ok_or_else(|| DefineError::UnterminatedParams(name.to_string()))?;
                let params = after[..close]
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
                (Some(params), &after[close + 1..])
            }
            None => (None, rest),
        };

        let body = body.trim();
        Ok(Self {
            name: name.to_string(),
            params,
            value: if body.is_empty() { None } else { Some(body.to_string()) },
        })
    }

    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }

    /// Integer value used when the macro appears in an `#if` expression.
    ///
    /// Replacement text that is not an integer literal (or is missing)
    /// counts as 1.
    pub fn numeric_value(&self) -> i64 {
        self.value
            .as_deref()
            .and_then(parse_macro_integer)
            .unwrap_or(1)
    }
}

/// A change to a symbol table, from `-D`/`-U` flags or `#define`/`#undef`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MacroEdit {
    Define(MacroDefinition),
    Undef { name: String },
}

/// Macros visible in one evaluation context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    macros: HashMap<String, MacroDefinition>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from definitions; later definitions win
    pub fn from_definitions(defs: impl IntoIterator<Item = MacroDefinition>) -> Self {
        let mut table = Self::new();
        for def in defs {
            table.define(def);
        }
        table
    }

    pub fn define(&mut self, def: MacroDefinition) {
        self.macros.insert(def.name.clone(), def);
    }

    pub fn undefine(&mut self, name: &str) {
        self.macros.remove(name);
    }

    /// Apply a define or undef
    pub fn apply(&mut self, edit: &MacroEdit) {
        match edit {
            MacroEdit::Define(def) => self.define(def.clone()),
            MacroEdit::Undef { name } => self.undefine(name),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Definitions sorted by name
    pub fn definitions(&self) -> Vec<&MacroDefinition> {
        let mut defs: Vec<_> = self.macros.values().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// Check if a string is a C identifier
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Parse an integer literal with C syntax: decimal, `0x` hex, `0b` binary or
/// leading-zero octal, `'` digit separators, `u`/`l`/`z` suffixes ignored.
pub fn parse_integer_literal(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|&c| c != '\'').collect();
    let digits = cleaned.trim_end_matches(['u', 'U', 'l', 'L', 'z', 'Z']);
    if digits.is_empty() {
        return None;
    }

    let (radix, body) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if let Some(bin) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        (2, bin)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    // Values beyond i64 wrap like the unsigned arithmetic they denote.
    u64::from_str_radix(body, radix).ok().map(|v| v as i64)
}

/// Integer value of a macro's replacement text: an optionally signed,
/// optionally parenthesized integer literal.
fn parse_macro_integer(value: &str) -> Option<i64> {
    let mut text = value.trim();
    while let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        text = inner.trim();
    }
    if let Some(rest) = text.strip_prefix('-') {
        return parse_integer_literal(rest.trim()).map(i64::wrapping_neg);
    }
    let text = text.strip_prefix('+').map(str::trim).unwrap_or(text);
    parse_integer_literal(text)
}
