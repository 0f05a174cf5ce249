//! Invocation rule engine
//!
//! Applies a compiler's rules to the tokens of one compile command. The
//! result names the active modes and passes plus the command's own `-D` and
//! `-U` edits; [`CompilerSpec::symbol_table`] turns it into the symbol
//! table for a single pass.

use crate::spec::{Action, ArgRule, CompilerSpec, Matcher, RuleDest};
use platmap_parser::preprocessor::{is_identifier, MacroDefinition, MacroEdit, SymbolTable};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Modes, passes and macro edits implied by one compile command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedConfiguration {
    pub modes: BTreeSet<String>,
    /// Mutually exclusive; each pass is evaluated on its own
    pub passes: BTreeSet<String>,
    /// `-D`/`-U` edits in command-line order
    pub edits: Vec<MacroEdit>,
}

impl ResolvedConfiguration {
    /// Pass names to evaluate, or a single `None` when there are none
    pub fn pass_list(&self) -> Vec<Option<&str>> {
        if self.passes.is_empty() {
            vec![None]
        } else {
            self.passes.iter().map(|p| Some(p.as_str())).collect()
        }
    }
}

impl ArgRule {
    /// Names this rule produces for the given tokens, default included
    pub fn apply(&self, tokens: &[String]) -> Vec<String> {
        let matches = self.matches(tokens);
        if matches.is_empty() {
            return self.default.clone();
        }
        if self.override_default {
            matches
        } else {
            let mut names = self.default.clone();
            names.extend(matches);
            names
        }
    }

    fn matches(&self, tokens: &[String]) -> Vec<String> {
        match (&self.action, &self.matcher) {
            (Action::AppendConst(constant), matcher) => {
                let present = tokens.iter().any(|token| match matcher {
                    Matcher::Flags(flags) => flags.iter().any(|flag| flag_matches(flag, token)),
                    Matcher::Pattern(regex) => regex.is_match(token),
                });
                if present {
                    vec![constant.clone()]
                } else {
                    Vec::new()
                }
            }
            (Action::ExtendMatch { format }, Matcher::Pattern(regex)) => tokens
                .iter()
                .flat_map(|token| regex.captures_iter(token))
                .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|value| format.replace("$value", value.as_str()))
                .collect(),
            // Rejected when the rule is loaded.
            (Action::ExtendMatch { .. }, Matcher::Flags(_)) => Vec::new(),
        }
    }
}

fn flag_matches(flag: &str, token: &str) -> bool {
    match token.strip_prefix(flag) {
        Some(rest) => rest.is_empty() || rest.starts_with('='),
        None => false,
    }
}

impl CompilerSpec {
    /// Resolve the arguments of one invocation (without the executable).
    ///
    /// The compiler's always-on flags are seen before the arguments. Rules
    /// are applied in order and merge by union within each destination.
    pub fn resolve(&self, args: &[String]) -> ResolvedConfiguration {
        let tokens: Vec<String> = self.flags.iter().chain(args).cloned().collect();

        let mut resolved = ResolvedConfiguration::default();
        for rule in &self.rules {
            let names = rule.apply(&tokens);
            match rule.dest {
                RuleDest::Modes => resolved.modes.extend(names),
                RuleDest::Passes => resolved.passes.extend(names),
            }
        }
        resolved.edits = macro_edits(args);
        resolved
    }

    /// Symbol table for one pass of a resolved invocation.
    ///
    /// Built from the always-on options, every active mode, the given pass,
    /// then the invocation's own edits. Modes and passes without an entry
    /// contribute nothing; see [`CompilerSpec::undeclared`].
    pub fn symbol_table(&self, resolved: &ResolvedConfiguration, pass: Option<&str>) -> SymbolTable {
        let mut table = SymbolTable::new();
        for edit in &self.options {
            table.apply(edit);
        }
        for mode in &resolved.modes {
            for def in self.modes.get(mode).into_iter().flatten() {
                table.define(def.clone());
            }
        }
        if let Some(pass) = pass {
            for def in self.passes.get(pass).into_iter().flatten() {
                table.define(def.clone());
            }
        }
        for edit in &resolved.edits {
            table.apply(edit);
        }
        table
    }

    /// Resolved mode and pass names this specification declares no defines
    /// for, as `("mode" | "pass", name)`
    pub fn undeclared<'r>(&self, resolved: &'r ResolvedConfiguration) -> Vec<(&'static str, &'r str)> {
        let modes = resolved
            .modes
            .iter()
            .filter(|m| !self.modes.contains_key(*m))
            .map(|m| ("mode", m.as_str()));
        let passes = resolved
            .passes
            .iter()
            .filter(|p| !self.passes.contains_key(*p))
            .map(|p| ("pass", p.as_str()));
        modes.chain(passes).collect()
    }
}

/// Collect `-DNAME[=V]`, `-D NAME[=V]`, `-UNAME` and `-U NAME` edits
pub fn macro_edits(args: &[String]) -> Vec<MacroEdit> {
    let mut edits = Vec::new();
    let mut tokens = args.iter();
    while let Some(token) = tokens.next() {
        let (is_define, inline) = if let Some(rest) = token.strip_prefix("-D") {
            (true, rest)
        } else if let Some(rest) = token.strip_prefix("-U") {
            (false, rest)
        } else {
            continue;
        };
        let operand = if inline.is_empty() {
            match tokens.next() {
                Some(next) => next.as_str(),
                None => break,
            }
        } else {
            inline
        };

        if is_define {
            match MacroDefinition::from_define_flag(operand) {
                Ok(def) => edits.push(MacroEdit::Define(def)),
                Err(e) => debug!("Ignoring -D{}: {}", operand, e),
            }
        } else if is_identifier(operand) {
            edits.push(MacroEdit::Undef {
                name: operand.to_string(),
            });
        } else {
            debug!("Ignoring -U{}", operand);
        }
    }
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CompilerTable;
    use pretty_assertions::assert_eq;

    fn tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    fn spec(yaml: &str) -> CompilerSpec {
        CompilerSpec::parse_yaml(yaml).unwrap().remove(0)
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    const NVCC: &str = r#"
nvcc:
  parser:
    - pattern: '(?:sm_|compute_)(\d+)'
      format: sm_$value
      action: extend_match
      dest: passes
      default: [sm_70]
      override: true
"#;

    #[test]
    fn test_append_const() {
        let gnu = spec(
            "gnu:\n  parser:\n    - flags: [-fopenmp]\n      action: append_const\n      dest: modes\n      const: openmp\n",
        );
        let resolved = gnu.resolve(&tokens(&["-fopenmp"]));
        assert_eq!(resolved.modes, set(&["openmp"]));
        assert!(resolved.passes.is_empty());

        let resolved = gnu.resolve(&tokens(&["-fopenmp=libomp", "-c", "a.c"]));
        assert_eq!(resolved.modes, set(&["openmp"]));
        assert!(gnu.resolve(&tokens(&["-fopenmp-simd"])).modes.is_empty());
    }

    #[test]
    fn test_extend_match_override() {
        let nvcc = spec(NVCC);
        let resolved = nvcc.resolve(&tokens(&["--gpu-architecture", "sm_80"]));
        assert_eq!(resolved.passes, set(&["sm_80"]));

        let resolved = nvcc.resolve(&tokens(&["-c", "kernel.cu"]));
        assert_eq!(resolved.passes, set(&["sm_70"]));

        let resolved = nvcc.resolve(&tokens(&["-gencode=arch=compute_60,code=sm_60", "-arch=sm_90"]));
        assert_eq!(resolved.passes, set(&["sm_60", "sm_90"]));
    }

    #[test]
    fn test_extend_match_without_override_keeps_default() {
        let nvcc = spec(&NVCC.replace("      override: true\n", ""));
        let resolved = nvcc.resolve(&tokens(&["-arch=sm_80"]));
        assert_eq!(resolved.passes, set(&["sm_70", "sm_80"]));
    }

    #[test]
    fn test_default_does_not_suppress_other_rules() {
        let multi = spec(
            r#"
multi:
  parser:
    - flags: [-fsycl]
      action: append_const
      dest: passes
      const: spir64
    - pattern: 'gfx(\d+)'
      format: gfx$value
      action: extend_match
      dest: passes
      default: [host]
"#,
        );
        let resolved = multi.resolve(&tokens(&["-fsycl"]));
        assert_eq!(resolved.passes, set(&["host", "spir64"]));
    }

    #[test]
    fn test_pattern_without_groups_uses_whole_match() {
        let s = spec(
            "s:\n  parser:\n    - pattern: 'avx\\d+'\n      format: $value\n      action: extend_match\n      dest: modes\n",
        );
        assert_eq!(s.resolve(&tokens(&["-mavx512f"])).modes, set(&["avx512"]));
    }

    #[test]
    fn test_always_on_flags_reach_rules() {
        let s = spec(
            "omp:\n  options: [-fopenmp]\n  parser:\n    - flags: [-fopenmp]\n      action: append_const\n      dest: modes\n      const: openmp\n",
        );
        assert_eq!(s.resolve(&[]).modes, set(&["openmp"]));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let table = CompilerTable::builtin().unwrap();
        let nvcc = table.get("nvcc").unwrap();
        let args = tokens(&["-arch=sm_80", "-DN=4", "-c", "k.cu"]);
        assert_eq!(nvcc.resolve(&args), nvcc.resolve(&args));
    }

    #[test]
    fn test_macro_edits() {
        let edits = macro_edits(&tokens(&["-DA", "-D", "B=2", "-UC", "-U", "D", "-O2", "-D"]));
        assert_eq!(
            edits,
            vec![
                MacroEdit::Define(MacroDefinition::with_value("A", "1")),
                MacroEdit::Define(MacroDefinition::with_value("B", "2")),
                MacroEdit::Undef { name: "C".into() },
                MacroEdit::Undef { name: "D".into() },
            ]
        );
    }

    #[test]
    fn test_symbol_table_layers() {
        let table = CompilerTable::builtin().unwrap();
        let nvcc = table.get("nvcc").unwrap();
        let resolved = nvcc.resolve(&tokens(&["-arch=sm_80", "-U__NVCC__", "-DEXTRA"]));

        let symbols = nvcc.symbol_table(&resolved, Some("sm_80"));
        assert!(symbols.is_defined("__CUDACC__"));
        assert!(!symbols.is_defined("__NVCC__"));
        assert!(symbols.is_defined("EXTRA"));
        assert_eq!(symbols.get("__CUDA_ARCH__").unwrap().numeric_value(), 800);
    }

    #[test]
    fn test_modes_carry_always_on_defines() {
        let table = CompilerTable::builtin().unwrap();
        let gnu = table.get("gnu").unwrap();
        let resolved = gnu.resolve(&tokens(&["-fopenmp"]));
        let symbols = gnu.symbol_table(&resolved, None);
        assert!(symbols.is_defined("_OPENMP"));
        assert!(symbols.is_defined("__GNUC__"));
    }

    #[test]
    fn test_undeclared_names() {
        let nvcc = spec(NVCC);
        let resolved = nvcc.resolve(&tokens(&["-arch=sm_99"]));
        assert_eq!(nvcc.undeclared(&resolved), vec![("pass", "sm_99")]);
        assert_eq!(resolved.pass_list(), vec![Some("sm_99")]);
        assert_eq!(ResolvedConfiguration::default().pass_list(), vec![None]);
    }
}
