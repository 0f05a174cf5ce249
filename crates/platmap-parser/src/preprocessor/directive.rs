//! Directive parsing
//!
//! Turns the text of a directive line (everything after `#`) into a
//! [`Directive`]. Only conditionals and macro definitions carry meaning;
//! every other directive is kept as opaque text.

use super::symbols::{is_identifier, MacroDefinition};

/// A parsed preprocessor directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    If(String),
    Ifdef(String),
    Ifndef(String),
    Elif(String),
    Elifdef(String),
    Elifndef(String),
    Else,
    Endif,
    Define(MacroDefinition),
    Undef(String),
    /// `#include`, `#pragma`, `#error`, malformed `#define`, and so on
    Other { name: String, rest: String },
}

impl Directive {
    /// Parse the text following `#`
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let name_len = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len());
        let (name, rest) = text.split_at(name_len);
        let rest = rest.trim();

        match name {
            "if" => Directive::If(rest.to_string()),
            "ifdef" => Directive::Ifdef(rest.to_string()),
            "ifndef" => Directive::Ifndef(rest.to_string()),
            "elif" => Directive::Elif(rest.to_string()),
            "elifdef" => Directive::Elifdef(rest.to_string()),
            "elifndef" => Directive::Elifndef(rest.to_string()),
            "else" => Directive::Else,
            "endif" => Directive::Endif,
            "define" => match MacroDefinition::from_directive(rest) {
                Ok(def) => Directive::Define(def),
                Err(_) => Directive::Other {
                    name: name.to_string(),
                    rest: rest.to_string(),
                },
            },
            "undef" if is_identifier(first_word(rest)) => {
                Directive::Undef(first_word(rest).to_string())
            }
            _ => Directive::Other {
                name: name.to_string(),
                rest: rest.to_string(),
            },
        }
    }

    /// Whether this directive opens a conditional region
    pub fn opens_region(&self) -> bool {
        matches!(
            self,
            Directive::If(_) | Directive::Ifdef(_) | Directive::Ifndef(_)
        )
    }

    /// Whether this directive starts a later branch of a region
    pub fn continues_region(&self) -> bool {
        matches!(
            self,
            Directive::Elif(_) | Directive::Elifdef(_) | Directive::Elifndef(_) | Directive::Else
        )
    }
}

fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}
