//! Compiler specifications
//!
//! A [`CompilerSpec`] describes one compiler family: the macros it always
//! defines, the rules that turn its command-line flags into modes and
//! passes, and the macros each mode and pass adds. Specifications are
//! written in YAML and validated completely when loaded, so a table that
//! loads can always be applied.

use platmap_core::{Error, Result};
use platmap_parser::preprocessor::{is_identifier, MacroDefinition, MacroEdit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a rule does with the flags it recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Add a fixed name when one of the flags is present
    AppendConst,
    /// Add a name built from each pattern match
    ExtendMatch,
}

/// Where a rule's names go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDest {
    Modes,
    Passes,
}

/// How a rule recognizes tokens
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Literal flags, matched exactly or as `flag=value`
    Flags(Vec<String>),
    Pattern(Regex),
}

/// Validated rule action with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AppendConst(String),
    /// `format` contains `$value`, replaced by the captured text
    ExtendMatch { format: String },
}

/// One command-line rule of a compiler
#[derive(Debug, Clone)]
pub struct ArgRule {
    pub matcher: Matcher,
    pub action: Action,
    pub dest: RuleDest,
    /// Names used when the rule matches nothing
    pub default: Vec<String>,
    /// Whether real matches replace the default instead of joining it
    pub override_default: bool,
}

/// One compiler family
#[derive(Debug, Clone)]
pub struct CompilerSpec {
    pub name: String,
    /// Other executable names handled by this entry
    pub aliases: Vec<String>,
    /// Always-on macro edits
    pub options: Vec<MacroEdit>,
    /// Always-on flags, seen by the rules before the invocation's own tokens
    pub flags: Vec<String>,
    pub rules: Vec<ArgRule>,
    pub modes: BTreeMap<String, Vec<MacroDefinition>>,
    pub passes: BTreeMap<String, Vec<MacroDefinition>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default)]
    flags: Vec<String>,
    pattern: Option<String>,
    action: RuleAction,
    dest: RuleDest,
    #[serde(rename = "const")]
    constant: Option<String>,
    format: Option<String>,
    default: Option<Vec<String>>,
    #[serde(rename = "override", default)]
    override_default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNamedDefines {
    name: String,
    #[serde(default)]
    defines: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawCompiler {
    aliases: Vec<String>,
    options: Vec<String>,
    parser: Vec<RawRule>,
    modes: Vec<RawNamedDefines>,
    passes: Vec<RawNamedDefines>,
}

impl CompilerSpec {
    /// Parse every entry of a YAML document keyed by compiler name
    pub fn parse_yaml(text: &str) -> Result<Vec<CompilerSpec>> {
        let entries: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(text)?;
        entries
            .into_iter()
            .map(|(name, value)| {
                let raw: RawCompiler = serde_yaml::from_value(value)
                    .map_err(|e| Error::compiler_spec(&name, e.to_string()))?;
                Self::from_raw(name, raw)
            })
            .collect()
    }

    fn from_raw(name: String, raw: RawCompiler) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::compiler_spec(name, "compiler name is empty"));
        }

        let mut options = Vec::new();
        let mut flags = Vec::new();
        for entry in &raw.options {
            if let Some(rest) = entry.strip_prefix("-D") {
                options.push(MacroEdit::Define(parse_define(&name, rest)?));
            } else if let Some(rest) = entry.strip_prefix("-U") {
                let macro_name = rest.trim();
                if !is_identifier(macro_name) {
                    return Err(Error::compiler_spec(
                        &name,
                        format!("invalid macro name in option '{}'", entry),
                    ));
                }
                options.push(MacroEdit::Undef {
                    name: macro_name.to_string(),
                });
            } else if entry.starts_with('-') {
                flags.push(entry.clone());
            } else {
                options.push(MacroEdit::Define(parse_define(&name, entry)?));
            }
        }

        let rules = raw
            .parser
            .into_iter()
            .enumerate()
            .map(|(index, rule)| ArgRule::from_raw(&name, index, rule))
            .collect::<Result<Vec<_>>>()?;

        let modes = named_defines(&name, "mode", raw.modes)?;
        let passes = named_defines(&name, "pass", raw.passes)?;

        Ok(Self {
            name,
            aliases: raw.aliases,
            options,
            flags,
            rules,
            modes,
            passes,
        })
    }
}

impl ArgRule {
    fn from_raw(compiler: &str, index: usize, raw: RawRule) -> Result<Self> {
        let invalid = |message: String| Error::compiler_spec(compiler, format!("rule {}: {}", index + 1, message));

        let matcher = match (raw.flags.is_empty(), raw.pattern) {
            (false, Some(_)) => return Err(invalid("give either 'flags' or 'pattern', not both".into())),
            (true, None) => return Err(invalid("needs 'flags' or 'pattern'".into())),
            (false, None) => Matcher::Flags(raw.flags),
            (true, Some(pattern)) => Matcher::Pattern(
                Regex::new(&pattern).map_err(|e| invalid(format!("invalid pattern '{}': {}", pattern, e)))?,
            ),
        };

        let action = match raw.action {
            RuleAction::AppendConst => {
                if raw.format.is_some() {
                    return Err(invalid("'format' only applies to extend_match".into()));
                }
                let constant = raw
                    .constant
                    .ok_or_else(|| invalid("append_const needs 'const'".into()))?;
                Action::AppendConst(constant)
            }
            RuleAction::ExtendMatch => {
                if raw.constant.is_some() {
                    return Err(invalid("'const' only applies to append_const".into()));
                }
                if matches!(matcher, Matcher::Flags(_)) {
                    return Err(invalid("extend_match needs a 'pattern'".into()));
                }
                let format = raw
                    .format
                    .ok_or_else(|| invalid("extend_match needs 'format'".into()))?;
                if !format.contains("$value") {
                    return Err(invalid(format!("format '{}' has no $value placeholder", format)));
                }
                Action::ExtendMatch { format }
            }
        };

        Ok(Self {
            matcher,
            action,
            dest: raw.dest,
            default: raw.default.unwrap_or_default(),
            override_default: raw.override_default,
        })
    }
}

fn parse_define(compiler: &str, text: &str) -> Result<MacroDefinition> {
    MacroDefinition::from_define_flag(text)
        .map_err(|e| Error::compiler_spec(compiler, format!("define '{}': {}", text, e)))
}

fn named_defines(
    compiler: &str,
    what: &str,
    entries: Vec<RawNamedDefines>,
) -> Result<BTreeMap<String, Vec<MacroDefinition>>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let defines = entry
            .defines
            .iter()
            .map(|d| parse_define(compiler, d))
            .collect::<Result<Vec<_>>>()?;
        if map.insert(entry.name.clone(), defines).is_some() {
            return Err(Error::compiler_spec(
                compiler,
                format!("{} '{}' is declared twice", what, entry.name),
            ));
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_one(text: &str) -> Result<CompilerSpec> {
        CompilerSpec::parse_yaml(text).map(|mut specs| specs.remove(0))
    }

    #[test]
    fn test_parse_full_entry() {
        let spec = parse_one(
            r#"
nvcc:
  aliases: [nvcc-wrapper]
  options: [__NVCC__, -DFAST=2, -UNDEBUG, -Xcompiler]
  parser:
    - pattern: 'sm_(\d+)'
      format: sm_$value
      action: extend_match
      dest: passes
      default: [sm_70]
      override: true
  passes:
    - name: sm_70
      defines: [__CUDA_ARCH__=700]
"#,
        )
        .unwrap();

        assert_eq!(spec.name, "nvcc");
        assert_eq!(spec.aliases, vec!["nvcc-wrapper"]);
        assert_eq!(spec.flags, vec!["-Xcompiler"]);
        assert_eq!(
            spec.options,
            vec![
                MacroEdit::Define(MacroDefinition::with_value("__NVCC__", "1")),
                MacroEdit::Define(MacroDefinition::with_value("FAST", "2")),
                MacroEdit::Undef { name: "NDEBUG".into() },
            ]
        );
        assert_eq!(spec.rules.len(), 1);
        assert_eq!(spec.rules[0].dest, RuleDest::Passes);
        assert!(spec.rules[0].override_default);
        assert_eq!(spec.rules[0].default, vec!["sm_70"]);
        assert_eq!(
            spec.passes["sm_70"],
            vec![MacroDefinition::with_value("__CUDA_ARCH__", "700")]
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = parse_one(
            "gnu:\n  parser:\n    - flags: [-x]\n      action: store_true\n      dest: modes\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::CompilerSpec { ref compiler, .. } if compiler == "gnu"));
    }

    #[test]
    fn test_unknown_dest_rejected() {
        let err = parse_one(
            "gnu:\n  parser:\n    - flags: [-x]\n      action: append_const\n      const: x\n      dest: targets\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::CompilerSpec { .. }));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = parse_one(
            "nvcc:\n  parser:\n    - pattern: 'sm_(\\d+'\n      format: $value\n      action: extend_match\n      dest: passes\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let cases = [
            // append_const without const
            "c:\n  parser:\n    - flags: [-x]\n      action: append_const\n      dest: modes\n",
            // extend_match without format
            "c:\n  parser:\n    - pattern: 'x'\n      action: extend_match\n      dest: modes\n",
            // extend_match with literal flags
            "c:\n  parser:\n    - flags: [-x]\n      format: $value\n      action: extend_match\n      dest: modes\n",
            // neither flags nor pattern
            "c:\n  parser:\n    - action: append_const\n      const: x\n      dest: modes\n",
            // format without placeholder
            "c:\n  parser:\n    - pattern: 'x'\n      format: fixed\n      action: extend_match\n      dest: modes\n",
            // bad define
            "c:\n  modes:\n    - name: m\n      defines: ['1BAD']\n",
            // duplicate mode
            "c:\n  modes:\n    - name: m\n    - name: m\n",
            // unknown field
            "c:\n  flavour: sweet\n",
        ];
        for case in cases {
            assert!(
                matches!(parse_one(case), Err(Error::CompilerSpec { .. })),
                "accepted: {}",
                case
            );
        }
    }
}
