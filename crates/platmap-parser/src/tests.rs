//! Extended tests for the platmap parser
//!
//! These tests run whole files through scanning, directive parsing and tree
//! construction, using patterns commonly found in portable C and C++ code.

use super::*;
use crate::preprocessor::{MacroDefinition, MacroEdit, SymbolTable};
use crate::tree::{ConditionKind, Region};
use platmap_core::{Category, LineRange};
use pretty_assertions::assert_eq;

fn parse(source: &str) -> ConditionalTree {
    let (tree, diagnostics) = ConditionalTree::parse("test.c", source);
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {:?}", diagnostics);
    assert!(tree.is_partition());
    tree
}

fn region(tree: &ConditionalTree, id: NodeId) -> &Region {
    match tree.node(id) {
        Node::Region(region) => region,
        other => panic!("expected a region, got {:?}", other),
    }
}

/// Include guard wrapping the whole header
#[test]
fn test_include_guard() {
    let source = r#"#ifndef CONFIG_H
#define CONFIG_H

#include <stddef.h>

typedef struct { int x; } point_t;

#endif /* CONFIG_H */
"#;
    let tree = parse(source);
    assert_eq!(tree.roots().len(), 1);

    let guard = region(&tree, tree.roots()[0]);
    assert_eq!(guard.lines, LineRange::new(1, 9));
    assert_eq!(guard.branches.len(), 1);
    assert_eq!(guard.branches[0].condition.kind, ConditionKind::Ifndef);
    assert_eq!(guard.branches[0].condition.text, "CONFIG_H");

    let kinds: Vec<_> = tree.leaves().iter().map(|l| l.kind.clone()).collect();
    assert_eq!(
        kinds[1],
        LeafKind::Define(MacroDefinition::defined("CONFIG_H"))
    );
    assert_eq!(
        kinds[3],
        LeafKind::Directive {
            text: "include <stddef.h>".into()
        }
    );
}

/// Vendor dispatch chain with one arm per toolchain
#[test]
fn test_vendor_dispatch_chain() {
    let source = r#"#if defined(__CUDACC__)
#define DEVICE __device__
#elif defined(__HIPCC__)
#define DEVICE __device__
#elif defined(_OPENMP) && _OPENMP >= 201811
#define DEVICE
#else
#define DEVICE
#endif
DEVICE int square(int x) { return x * x; }
"#;
    let tree = parse(source);
    let chain = region(&tree, tree.roots()[0]);
    let kinds: Vec<_> = chain.branches.iter().map(|b| b.condition.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ConditionKind::If,
            ConditionKind::Elif,
            ConditionKind::Elif,
            ConditionKind::Else
        ]
    );

    let openmp = SymbolTable::from_definitions([MacroDefinition::with_value("_OPENMP", "201811")]);
    let decisions: Vec<_> = chain
        .branches
        .iter()
        .map(|b| b.condition.evaluate(&openmp).unwrap())
        .collect();
    assert_eq!(decisions, vec![false, false, true, true]);
}

/// Multi-line conditions joined by backslashes stay one directive leaf
#[test]
fn test_continued_condition() {
    let source = "#if defined(A) && \\\n    defined(B)\nboth\n#endif\n";
    let tree = parse(source);
    assert_eq!(tree.line_count(), 4);
    assert_eq!(tree.leaf(0).lines, LineRange::new(1, 3));

    let guard = region(&tree, tree.roots()[0]);
    let symbols = SymbolTable::from_definitions([
        MacroDefinition::defined("A"),
        MacroDefinition::defined("B"),
    ]);
    assert_eq!(guard.branches[0].condition.evaluate(&symbols), Ok(true));
}

/// Directives hidden in comments and strings do not open regions
#[test]
fn test_hidden_directives() {
    let source = r##"/*
#if 0
*/
const char *s = "#endif";
// #else
int x;
"##;
    let tree = parse(source);
    assert_eq!(tree.roots().len(), 1);
    assert_eq!(tree.leaves().len(), 1);
    assert_eq!(tree.leaf(0).kind, LeafKind::Code);
    assert_eq!(tree.leaf(0).sloc, 2);
}

/// Macro edits inside branches are recorded on their own leaves
#[test]
fn test_local_define_and_undef() {
    let source = "#define USE_FAST 1\n#ifdef LEGACY\n#undef USE_FAST\n#endif\n#if USE_FAST\nfast();\n#endif\n";
    let tree = parse(source);
    let edits: Vec<_> = tree.leaves().iter().filter_map(|l| l.edit()).collect();
    assert_eq!(
        edits,
        vec![
            MacroEdit::Define(MacroDefinition::with_value("USE_FAST", "1")),
            MacroEdit::Undef {
                name: "USE_FAST".into()
            },
        ]
    );
}

/// `#elifdef`/`#elifndef` from C23
#[test]
fn test_elifdef() {
    let tree = parse("#ifdef A\na\n#elifdef B\nb\n#elifndef C\nc\n#endif\n");
    let chain = region(&tree, tree.roots()[0]);
    let kinds: Vec<_> = chain.branches.iter().map(|b| b.condition.kind).collect();
    assert_eq!(
        kinds,
        vec![ConditionKind::Ifdef, ConditionKind::Elifdef, ConditionKind::Elifndef]
    );
}

/// Leaves partition the file whatever the shape of the input
#[test]
fn test_partition_property() {
    let sources = [
        "",
        "\n",
        "int a;",
        "#if 1\n#endif",
        "#if A\n#if B\n#if C\nx\n#endif\n#endif\n#endif\n\n\n",
        "a\n\n#pragma once\n\nb\n#error stop\r\nc\r\n",
        "#if X\n/* multi\nline */\n#else\nx\n#endif\n",
        "#if A\n#else\n#endif\n#if B\n#endif\n",
    ];
    for source in sources {
        let tree = parse(source);
        assert!(tree.is_partition(), "not a partition: {:?}", source);
        for leaf in tree.leaves() {
            assert!(leaf.sloc <= leaf.lines.len(), "sloc exceeds lines in {:?}", source);
        }
    }
}

/// Broken nesting still yields a partition with an unreachable tail
#[test]
fn test_malformed_files_recover() {
    let sources = [
        "#else\nx\n",
        "#elif A\n",
        "a\n#if A\nb\n",
        "#if A\n#else\n#else\n#endif\n",
        "#endif\n#endif\n",
    ];
    for source in sources {
        let (tree, diagnostics) = ConditionalTree::parse("bad.c", source);
        assert!(tree.is_partition(), "not a partition: {:?}", source);
        assert_eq!(diagnostics.len(), 1, "expected one diagnostic for {:?}", source);
        let diagnostic = diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.category, Category::MalformedFile);
        assert_eq!(
            tree.leaves().last().map(|l| &l.kind),
            Some(&LeafKind::Unreachable)
        );
    }
}

/// The tree dump is stable JSON with verbatim condition text
#[test]
fn test_tree_serializes() {
    let tree = parse("#if A > 1\nx\n#endif\n");
    let json = serde_json::to_value(&tree).unwrap();
    assert_eq!(json["line_count"], 3);
    assert_eq!(json["leaves"][0]["kind"], "directive");
    assert_eq!(json["leaves"][1]["kind"], "code");
    assert_eq!(json["nodes"][1]["node"], "region");
    assert_eq!(json["nodes"][1]["branches"][0]["condition"]["kind"], "if");
    assert_eq!(json["nodes"][1]["branches"][0]["condition"]["text"], "A > 1");
}
