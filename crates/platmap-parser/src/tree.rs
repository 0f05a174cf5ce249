//! Conditional-compilation tree
//!
//! Every file is parsed once into a [`ConditionalTree`], independent of any
//! platform. The tree is an arena: nodes and leaves are addressed by index,
//! so it can be shared read-only between parallel evaluations.
//!
//! Leaves partition the file's physical lines. Consecutive code lines form
//! one leaf; every directive line (including each `#elif`, `#else` and
//! `#endif`) is a leaf of its own.

use crate::preprocessor::{parse_expression, Directive, Expr, ExprError, MacroDefinition, MacroEdit, SymbolTable};
use crate::source::{scan, LineKind, LogicalLine};
use platmap_core::{Category, Diagnostics, LineRange};
use serde::Serialize;
use sha2::{Digest, Sha512};
use std::path::{Path, PathBuf};

/// Index of a node in [`ConditionalTree::nodes`]
pub type NodeId = usize;

/// Index of a leaf in [`ConditionalTree::leaves`]
pub type LeafId = usize;

/// Which directive introduced a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    If,
    Ifdef,
    Ifndef,
    Elif,
    Elifdef,
    Elifndef,
    Else,
}

#[derive(Debug, Clone)]
enum Test {
    Expr(Result<Expr, ExprError>),
    Defined(String),
    NotDefined(String),
    Always,
}

/// Branch condition: verbatim text plus its parse
#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub text: String,
    #[serde(skip)]
    test: Test,
}

impl Condition {
    fn from_directive(directive: &Directive) -> Option<Self> {
        let (kind, text) = match directive {
            Directive::If(t) => (ConditionKind::If, t),
            Directive::Ifdef(t) => (ConditionKind::Ifdef, t),
            Directive::Ifndef(t) => (ConditionKind::Ifndef, t),
            Directive::Elif(t) => (ConditionKind::Elif, t),
            Directive::Elifdef(t) => (ConditionKind::Elifdef, t),
            Directive::Elifndef(t) => (ConditionKind::Elifndef, t),
            Directive::Else => {
                return Some(Self {
                    kind: ConditionKind::Else,
                    text: String::new(),
                    test: Test::Always,
                })
            }
            _ => return None,
        };

        // Extra tokens after the name are ignored, as compilers do.
        let name = || match text.split_whitespace().next() {
            Some(name) if crate::preprocessor::is_identifier(name) => Ok(name.to_string()),
            _ => Err(ExprError::InvalidDefined),
        };
        let test = match kind {
            ConditionKind::If | ConditionKind::Elif => Test::Expr(parse_expression(text)),
            ConditionKind::Ifdef | ConditionKind::Elifdef => match name() {
                Ok(name) => Test::Defined(name),
                Err(e) => Test::Expr(Err(e)),
            },
            ConditionKind::Ifndef | ConditionKind::Elifndef => match name() {
                Ok(name) => Test::NotDefined(name),
                Err(e) => Test::Expr(Err(e)),
            },
            ConditionKind::Else => Test::Always,
        };

        Some(Self {
            kind,
            text: text.clone(),
            test,
        })
    }

    /// Tokens following the macro name of an `#ifdef`-style condition
    pub fn trailing_tokens(&self) -> Option<&str> {
        match self.test {
            Test::Defined(_) | Test::NotDefined(_) => {
                let rest = self.text.trim_start();
                let rest = rest[rest.find(char::is_whitespace)?..].trim();
                (!rest.is_empty()).then_some(rest)
            }
            _ => None,
        }
    }

    /// Decide the condition under a symbol table
    pub fn evaluate(&self, symbols: &SymbolTable) -> Result<bool, ExprError> {
        match &self.test {
            Test::Expr(Ok(expr)) => Ok(expr.evaluate(symbols)? != 0),
            Test::Expr(Err(e)) => Err(e.clone()),
            Test::Defined(name) => Ok(symbols.is_defined(name)),
            Test::NotDefined(name) => Ok(!symbols.is_defined(name)),
            Test::Always => Ok(true),
        }
    }
}

/// What a leaf holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeafKind {
    Code,
    /// Conditional or opaque directive line
    Directive { text: String },
    Define(MacroDefinition),
    Undef { name: String },
    /// Lines after a malformed directive; never active
    Unreachable,
}

/// A run of lines that is included or excluded as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaf {
    pub lines: LineRange,
    pub sloc: u32,
    #[serde(flatten)]
    pub kind: LeafKind,
}

impl Leaf {
    /// The symbol table change made by this leaf when it is active
    pub fn edit(&self) -> Option<MacroEdit> {
        match &self.kind {
            LeafKind::Define(def) => Some(MacroEdit::Define(def.clone())),
            LeafKind::Undef { name } => Some(MacroEdit::Undef { name: name.clone() }),
            _ => None,
        }
    }
}

/// One `#if`/`#elif`/`#else` arm of a region
#[derive(Debug, Clone, Serialize)]
pub struct Branch {
    pub condition: Condition,
    /// Leaf of the directive line opening this branch
    pub directive: LeafId,
    pub children: Vec<NodeId>,
}

/// A complete `#if` ... `#endif` block
#[derive(Debug, Clone, Serialize)]
pub struct Region {
    pub lines: LineRange,
    pub branches: Vec<Branch>,
    /// Leaf of the `#endif` line
    pub end: LeafId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Code { leaf: LeafId },
    Region(Region),
}

/// Per-file conditional-compilation tree
#[derive(Debug, Clone, Serialize)]
pub struct ConditionalTree {
    path: PathBuf,
    /// Hex SHA-512 of the file contents
    content_id: String,
    line_count: u32,
    nodes: Vec<Node>,
    leaves: Vec<Leaf>,
    roots: Vec<NodeId>,
}

impl ConditionalTree {
    /// Parse file content into a tree.
    ///
    /// Malformed conditional nesting is reported in the returned
    /// diagnostics; lines from the failure point on become an
    /// [`LeafKind::Unreachable`] leaf.
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> (Self, Diagnostics) {
        let path = path.into();
        let scanned = scan(source);
        let mut builder = Builder::new(&path, &scanned.lines, scanned.physical_lines);
        builder.run();
        let (mut tree, diagnostics) = builder.finish();
        tree.content_id = content_id(source.as_bytes());
        (tree, diagnostics)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub(crate) fn set_content_id(&mut self, id: String) {
        self.content_id = id;
    }

    /// Physical lines in the file
    pub fn line_count(&self) -> u32 {
        self.line_count
    }

    /// SLOC of the whole file
    pub fn sloc(&self) -> u32 {
        self.leaves.iter().map(|l| l.sloc).sum()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Leaves in document order
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn leaf(&self, id: LeafId) -> &Leaf {
        &self.leaves[id]
    }

    /// Top-level nodes in document order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Whether the leaves cover lines `1..=line_count` without gaps or
    /// overlaps
    pub fn is_partition(&self) -> bool {
        let mut next = 1;
        for leaf in &self.leaves {
            if leaf.lines.start != next || leaf.lines.is_empty() {
                return false;
            }
            next = leaf.lines.end;
        }
        next == self.line_count + 1
    }
}

enum Item {
    Leaf(Leaf),
    Region(ClosedRegion),
}

struct PendingBranch {
    condition: Condition,
    directive: Leaf,
    items: Vec<Item>,
}

struct ClosedRegion {
    branches: Vec<PendingBranch>,
    end: Leaf,
}

struct OpenRegion {
    branches: Vec<PendingBranch>,
}

impl OpenRegion {
    fn start(&self) -> u32 {
        self.branches[0].directive.lines.start
    }

    fn has_else(&self) -> bool {
        self.branches
            .last()
            .is_some_and(|b| b.condition.kind == ConditionKind::Else)
    }
}

struct Builder<'a> {
    path: &'a Path,
    lines: &'a [LogicalLine],
    physical_lines: u32,
    root: Vec<Item>,
    open: Vec<OpenRegion>,
    code: Option<Leaf>,
    diagnostics: Diagnostics,
}

impl<'a> Builder<'a> {
    fn new(path: &'a Path, lines: &'a [LogicalLine], physical_lines: u32) -> Self {
        Self {
            path,
            lines,
            physical_lines,
            root: Vec::new(),
            open: Vec::new(),
            code: None,
            diagnostics: Diagnostics::new(),
        }
    }

    fn run(&mut self) {
        for line in self.lines {
            match &line.kind {
                LineKind::Code => self.push_code(line),
                LineKind::Directive(text) => {
                    self.flush_code();
                    if !self.directive(line, text) {
                        return;
                    }
                }
            }
        }
        self.flush_code();

        if let Some(outer) = self.open.first() {
            let start = outer.start();
            let innermost = self.open.last().map(OpenRegion::start).unwrap_or(start);
            self.malformed(innermost, "unterminated conditional directive (missing #endif)");
            self.abandon(start);
        }
    }

    fn push_item(&mut self, item: Item) {
        match self.open.last_mut() {
            Some(region) => {
                if let Some(branch) = region.branches.last_mut() {
                    branch.items.push(item);
                }
            }
            None => self.root.push(item),
        }
    }

    fn push_code(&mut self, line: &LogicalLine) {
        match &mut self.code {
            Some(leaf) => {
                leaf.lines.end = line.lines.end;
                leaf.sloc += line.sloc;
            }
            None => {
                self.code = Some(Leaf {
                    lines: line.lines,
                    sloc: line.sloc,
                    kind: LeafKind::Code,
                })
            }
        }
    }

    fn flush_code(&mut self) {
        if let Some(leaf) = self.code.take() {
            self.push_item(Item::Leaf(leaf));
        }
    }

    /// Handle one directive line; returns false once the rest of the file
    /// has been given up on.
    fn directive(&mut self, line: &LogicalLine, text: &str) -> bool {
        let directive = Directive::parse(text);
        let kind = match &directive {
            Directive::Define(def) => LeafKind::Define(def.clone()),
            Directive::Undef(name) => LeafKind::Undef { name: name.clone() },
            _ => LeafKind::Directive {
                text: text.to_string(),
            },
        };
        let leaf = Leaf {
            lines: line.lines,
            sloc: line.sloc,
            kind,
        };

        if let Some(condition) = Condition::from_directive(&directive) {
            if let Some(extra) = condition.trailing_tokens() {
                let message = format!(
                    "extra tokens '{}' at end of #{} directive",
                    extra,
                    keyword(text)
                );
                self.malformed(line.lines.start, &message);
            }
            if directive.opens_region() {
                self.open.push(OpenRegion {
                    branches: vec![PendingBranch {
                        condition,
                        directive: leaf,
                        items: Vec::new(),
                    }],
                });
                return true;
            }

            let problem = match self.open.last() {
                None => Some(format!("#{} without a matching #if", keyword(text))),
                Some(region) if region.has_else() => Some(format!("#{} after #else", keyword(text))),
                Some(_) => None,
            };
            if let Some(message) = problem {
                self.malformed(line.lines.start, &message);
                self.abandon(line.lines.start);
                return false;
            }
            if let Some(region) = self.open.last_mut() {
                region.branches.push(PendingBranch {
                    condition,
                    directive: leaf,
                    items: Vec::new(),
                });
            }
            return true;
        }

        if directive == Directive::Endif {
            match self.open.pop() {
                Some(region) => self.push_item(Item::Region(ClosedRegion {
                    branches: region.branches,
                    end: leaf,
                })),
                None => {
                    self.malformed(line.lines.start, "#endif without a matching #if");
                    self.abandon(line.lines.start);
                    return false;
                }
            }
            return true;
        }

        self.push_item(Item::Leaf(leaf));
        true
    }

    fn malformed(&mut self, line: u32, message: &str) {
        self.diagnostics
            .warn(Category::MalformedFile, Some(self.path), Some(line), message);
    }

    /// Drop every open region and turn the rest of the file, starting at the
    /// outermost open region or at `from`, into one unreachable leaf.
    fn abandon(&mut self, from: u32) {
        let start = self.open.first().map(OpenRegion::start).unwrap_or(from);
        self.open.clear();
        self.code = None;

        let sloc = self
            .lines
            .iter()
            .filter(|l| l.lines.start >= start)
            .map(|l| l.sloc)
            .sum();
        self.root.push(Item::Leaf(Leaf {
            lines: LineRange::new(start, self.physical_lines + 1),
            sloc,
            kind: LeafKind::Unreachable,
        }));
    }

    fn finish(self) -> (ConditionalTree, Diagnostics) {
        let mut tree = ConditionalTree {
            path: self.path.to_path_buf(),
            content_id: String::new(),
            line_count: self.physical_lines,
            nodes: Vec::new(),
            leaves: Vec::new(),
            roots: Vec::new(),
        };
        for item in self.root {
            let id = tree.add_item(item);
            tree.roots.push(id);
        }
        debug_assert!(tree.is_partition(), "leaves of {:?} do not partition the file", tree.path);
        (tree, self.diagnostics)
    }
}

impl ConditionalTree {
    fn push_leaf(&mut self, leaf: Leaf) -> LeafId {
        self.leaves.push(leaf);
        self.leaves.len() - 1
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn add_item(&mut self, item: Item) -> NodeId {
        match item {
            Item::Leaf(leaf) => {
                let leaf = self.push_leaf(leaf);
                self.push_node(Node::Code { leaf })
            }
            Item::Region(region) => {
                let start = region.branches[0].directive.lines.start;
                let mut branches = Vec::with_capacity(region.branches.len());
                for branch in region.branches {
                    let directive = self.push_leaf(branch.directive);
                    let children = branch
                        .items
                        .into_iter()
                        .map(|item| self.add_item(item))
                        .collect();
                    branches.push(Branch {
                        condition: branch.condition,
                        directive,
                        children,
                    });
                }
                let end_line = region.end.lines.end;
                let end = self.push_leaf(region.end);
                self.push_node(Node::Region(Region {
                    lines: LineRange::new(start, end_line),
                    branches,
                    end,
                }))
            }
        }
    }
}

/// Hex SHA-512 digest identifying file contents
pub fn content_id(bytes: &[u8]) -> String {
    format!("{:x}", Sha512::digest(bytes))
}

fn keyword(text: &str) -> &str {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> (ConditionalTree, Diagnostics) {
        ConditionalTree::parse("test.c", source)
    }

    fn leaf_ranges(tree: &ConditionalTree) -> Vec<(u32, u32)> {
        tree.leaves().iter().map(|l| (l.lines.start, l.lines.end)).collect()
    }

    #[test]
    fn test_if_else_structure() {
        let (tree, diags) = parse("#if 0\nA\n#else\nB\n#endif\n");
        assert!(diags.is_empty());
        assert!(tree.is_partition());
        assert_eq!(tree.line_count(), 5);
        assert_eq!(leaf_ranges(&tree), vec![(1, 2), (2, 3), (3, 4), (4, 5), (5, 6)]);

        assert_eq!(tree.roots().len(), 1);
        let Node::Region(region) = tree.node(tree.roots()[0]) else {
            panic!("expected a region");
        };
        assert_eq!(region.lines, LineRange::new(1, 6));
        assert_eq!(region.branches.len(), 2);
        assert_eq!(region.branches[0].condition.kind, ConditionKind::If);
        assert_eq!(region.branches[0].condition.text, "0");
        assert_eq!(region.branches[1].condition.kind, ConditionKind::Else);
        assert_eq!(region.end, 4);
    }

    #[test]
    fn test_code_lines_merge() {
        let (tree, _) = parse("int a;\nint b;\n\n#define X 1\nint c;\n");
        assert_eq!(leaf_ranges(&tree), vec![(1, 4), (4, 5), (5, 6)]);
        assert_eq!(tree.leaf(0).sloc, 2);
        assert_eq!(
            tree.leaf(1).edit(),
            Some(MacroEdit::Define(MacroDefinition::with_value("X", "1")))
        );
    }

    #[test]
    fn test_nested_regions() {
        let source = "\
#ifdef A
a
#if B > 1
b
#elif C
c
#endif
#else
d
#endif
tail
";
        let (tree, diags) = parse(source);
        assert!(diags.is_empty());
        assert!(tree.is_partition());
        assert_eq!(tree.roots().len(), 2);

        let Node::Region(outer) = tree.node(tree.roots()[0]) else {
            panic!("expected a region");
        };
        assert_eq!(outer.branches[0].condition.kind, ConditionKind::Ifdef);
        assert_eq!(outer.branches[0].children.len(), 2);

        let inner_id = outer.branches[0].children[1];
        let Node::Region(inner) = tree.node(inner_id) else {
            panic!("expected a nested region");
        };
        assert_eq!(inner.lines, LineRange::new(3, 8));
        assert_eq!(inner.branches[1].condition.text, "C");
    }

    #[test]
    fn test_condition_evaluation() {
        let (tree, _) = parse("#ifndef GUARD\n#endif\n");
        let Node::Region(region) = tree.node(tree.roots()[0]) else {
            panic!("expected a region");
        };
        let condition = &region.branches[0].condition;
        assert_eq!(condition.evaluate(&SymbolTable::new()), Ok(true));
        let defined = SymbolTable::from_definitions([MacroDefinition::defined("GUARD")]);
        assert_eq!(condition.evaluate(&defined), Ok(false));
    }

    #[test]
    fn test_ifdef_without_name_is_undecidable() {
        let (tree, _) = parse("#ifdef\nx\n#endif\n");
        let Node::Region(region) = tree.node(tree.roots()[0]) else {
            panic!("expected a region");
        };
        assert!(region.branches[0].condition.evaluate(&SymbolTable::new()).is_err());
    }

    #[test]
    fn test_ifdef_ignores_extra_tokens() {
        let (tree, diags) = parse("#ifdef X junk\nB\n#elifndef Y more tokens\nC\n#endif\n");
        assert!(tree.is_partition());
        let Node::Region(region) = tree.node(tree.roots()[0]) else {
            panic!("expected a region");
        };
        let defined = SymbolTable::from_definitions([MacroDefinition::defined("X")]);
        assert_eq!(region.branches[0].condition.evaluate(&defined), Ok(true));
        assert_eq!(region.branches[0].condition.trailing_tokens(), Some("junk"));
        assert_eq!(region.branches[1].condition.evaluate(&SymbolTable::new()), Ok(true));

        let lines: Vec<_> = diags.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![Some(1), Some(3)]);
        assert!(diags.iter().all(|d| d.category == Category::MalformedFile));
    }

    #[test]
    fn test_unterminated_if() {
        let (tree, diags) = parse("int a;\n#if X\nint b;\n#ifdef Y\nint c;\n");
        assert!(tree.is_partition());
        assert_eq!(diags.by_category(Category::MalformedFile).count(), 1);
        assert_eq!(diags.iter().next().unwrap().line, Some(4));

        let last = tree.leaves().last().unwrap();
        assert_eq!(last.kind, LeafKind::Unreachable);
        assert_eq!(last.lines, LineRange::new(2, 6));
        assert_eq!(last.sloc, 4);
    }

    #[test]
    fn test_stray_endif() {
        let (tree, diags) = parse("a\n#endif\nb\n#if 1\nc\n#endif\n");
        assert!(tree.is_partition());
        assert_eq!(diags.len(), 1);
        assert_eq!(leaf_ranges(&tree), vec![(1, 2), (2, 7)]);
        assert_eq!(tree.leaf(1).kind, LeafKind::Unreachable);
    }

    #[test]
    fn test_elif_after_else() {
        let (tree, diags) = parse("x\n#if A\na\n#else\nb\n#elif B\nc\n#endif\n");
        assert!(tree.is_partition());
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.message, "#elif after #else");
        assert_eq!(diag.line, Some(6));
        // Everything from the open region's #if on is unreachable.
        assert_eq!(leaf_ranges(&tree), vec![(1, 2), (2, 9)]);
    }

    #[test]
    fn test_empty_file() {
        let (tree, diags) = parse("");
        assert!(diags.is_empty());
        assert!(tree.is_partition());
        assert!(tree.leaves().is_empty());
    }
}
