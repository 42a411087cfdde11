//! Syntax-tree walk shared by the script-like analyzers.
//!
//! The walk only looks at a handful of node kinds per language (classes, functions,
//! imports, calls, comments, string literals and decision points). It performs no
//! scope or type analysis; callees are recorded by bare name.

use tree_sitter::{Language, Node as TSNode, Tree};

use super::common::{
    extract_text, is_identifier, node_span, strip_string_literal, TreeSitterParser,
};
use super::extract::Extraction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Python,
    EcmaScript,
}

/// Node kinds that matter for one grammar.
#[derive(Debug)]
pub struct ScriptRules {
    pub dialect: Dialect,
    pub class_kinds: &'static [&'static str],
    pub function_kinds: &'static [&'static str],
    pub call_kinds: &'static [&'static str],
    pub import_kinds: &'static [&'static str],
    pub comment_kinds: &'static [&'static str],
    pub string_kinds: &'static [&'static str],
    pub decision_kinds: &'static [&'static str],
    /// Binary-expression kinds whose `operator` may short-circuit.
    pub short_circuit_kinds: &'static [&'static str],
}

const SHORT_CIRCUIT_OPERATORS: &[&str] = &["&&", "||", "??"];

pub static PYTHON_RULES: ScriptRules = ScriptRules {
    dialect: Dialect::Python,
    class_kinds: &["class_definition"],
    function_kinds: &["function_definition"],
    call_kinds: &["call"],
    import_kinds: &["import_statement", "import_from_statement"],
    comment_kinds: &["comment"],
    string_kinds: &["string"],
    decision_kinds: &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "except_clause",
        "conditional_expression",
        "boolean_operator",
        "for_in_clause",
        "if_clause",
        "case_clause",
    ],
    short_circuit_kinds: &[],
};

pub static ECMASCRIPT_RULES: ScriptRules = ScriptRules {
    dialect: Dialect::EcmaScript,
    class_kinds: &[
        "class_declaration",
        "class",
        "abstract_class_declaration",
        "interface_declaration",
    ],
    function_kinds: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
        "function",
        "function_expression",
        "generator_function",
        "arrow_function",
    ],
    call_kinds: &["call_expression"],
    import_kinds: &["import_statement", "export_statement"],
    comment_kinds: &["comment"],
    string_kinds: &["string", "template_string"],
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "catch_clause",
        "ternary_expression",
        "switch_case",
    ],
    short_circuit_kinds: &["binary_expression"],
};

/// What entering a node pushed, so leaving it can pop the same.
#[derive(Debug, Default, Clone, Copy)]
struct Frame {
    class: bool,
    function: bool,
}

struct ScriptWalker<'a> {
    source: &'a [u8],
    rules: &'a ScriptRules,
    line_offset: usize,
    out: &'a mut Extraction,
    classes: Vec<String>,
    functions: Vec<usize>,
    frames: Vec<Frame>,
}

/// Parses `source` and extracts it; a parse failure yields a degraded extraction.
pub fn extract_script(source: &str, language: Language, rules: &ScriptRules) -> Extraction {
    let tree = match TreeSitterParser::new(language) {
        Ok(mut parser) => parser.parse(source),
        Err(err) => {
            tracing::error!("Failed to load grammar: {err}");
            None
        }
    };

    let mut out = Extraction::new();
    match tree {
        Some(tree) if extract_tree(&tree, source, rules, 0, &mut out) => out,
        _ => Extraction::degraded(),
    }
}

/// Walks `tree` and records its entities into `out`.
///
/// A tree with syntax errors leaves `out` untouched and returns `false`.
pub fn extract_tree(
    tree: &Tree,
    source: &str,
    rules: &ScriptRules,
    line_offset: usize,
    out: &mut Extraction,
) -> bool {
    let root = tree.root_node();
    if root.has_error() {
        return false;
    }

    let mut walker = ScriptWalker {
        source: source.as_bytes(),
        rules,
        line_offset,
        out,
        classes: Vec::new(),
        functions: Vec::new(),
        frames: Vec::new(),
    };
    walker.walk(root);
    true
}

impl<'a> ScriptWalker<'a> {
    /// Iterative pre/post-order traversal; deep trees cannot exhaust the stack.
    fn walk(&mut self, root: TSNode) {
        let mut cursor = root.walk();
        loop {
            self.enter(cursor.node());
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                self.leave();
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
    }

    fn enter(&mut self, node: TSNode) {
        let kind = node.kind();
        let mut frame = Frame::default();

        // Keyword tokens share kind names with real nodes (`class`, `function`).
        if !node.is_named() {
            self.frames.push(frame);
            return;
        }

        if self.rules.class_kinds.contains(&kind) {
            if let Some(name) = self.declared_name(&node) {
                self.out.add_class(&name, node_span(&node, self.line_offset));
                self.classes.push(name);
                frame.class = true;
            }
        } else if self.rules.function_kinds.contains(&kind) {
            if let Some(name) = self.declared_name(&node) {
                let qualified = match self.classes.last() {
                    Some(class) if self.is_direct_member(&node) => format!("{class}.{name}"),
                    _ => name,
                };
                let slot = self
                    .out
                    .add_function(&qualified, node_span(&node, self.line_offset));
                self.functions.push(slot);
                frame.function = true;
            }
        } else if self.rules.call_kinds.contains(&kind) {
            self.visit_call(&node);
        } else if self.rules.import_kinds.contains(&kind) {
            self.visit_import(&node);
        } else if self.rules.comment_kinds.contains(&kind) {
            let raw = extract_text(&node, self.source);
            self.out.add_comment(raw, node_span(&node, self.line_offset));
        } else if self.rules.string_kinds.contains(&kind) {
            let raw = extract_text(&node, self.source);
            let line = node.start_position().row + 1 + self.line_offset;
            self.out.add_string(strip_string_literal(raw), line);
        }

        if self.is_decision(&node) {
            if let Some(&slot) = self.functions.last() {
                self.out.add_decision(slot);
            }
        }

        self.frames.push(frame);
    }

    fn leave(&mut self) {
        if let Some(frame) = self.frames.pop() {
            if frame.class {
                self.classes.pop();
            }
            if frame.function {
                self.functions.pop();
            }
        }
    }

    fn is_decision(&self, node: &TSNode) -> bool {
        let kind = node.kind();
        if self.rules.decision_kinds.contains(&kind) {
            return true;
        }
        if self.rules.short_circuit_kinds.contains(&kind) {
            return node
                .child_by_field_name("operator")
                .map(|op| SHORT_CIRCUIT_OPERATORS.contains(&op.kind()))
                .unwrap_or(false);
        }
        false
    }

    /// Methods are qualified by their class only when declared directly in its body.
    fn is_direct_member(&self, node: &TSNode) -> bool {
        let Some(parent) = node.parent() else {
            return false;
        };
        match parent.kind() {
            "block" | "class_body" => parent
                .parent()
                .map(|owner| self.rules.class_kinds.contains(&owner.kind()))
                .unwrap_or(false),
            "decorated_definition" => parent
                .parent()
                .and_then(|block| block.parent())
                .map(|owner| self.rules.class_kinds.contains(&owner.kind()))
                .unwrap_or(false),
            "public_field_definition" | "field_definition" => true,
            _ => false,
        }
    }

    /// Name of a class or function, borrowed from the binding site for anonymous ones.
    fn declared_name(&self, node: &TSNode) -> Option<String> {
        if let Some(name_node) = node.child_by_field_name("name") {
            let name = extract_text(&name_node, self.source);
            return is_identifier(name).then(|| name.to_string());
        }

        let parent = node.parent()?;
        let binding = match parent.kind() {
            "variable_declarator" => parent.child_by_field_name("name"),
            "pair" => parent.child_by_field_name("key"),
            "assignment_expression" => parent.child_by_field_name("left"),
            "public_field_definition" => parent.child_by_field_name("name"),
            "field_definition" => parent.child_by_field_name("property"),
            _ => None,
        }?;
        let text = extract_text(&binding, self.source);
        let name = text.rsplit('.').next().unwrap_or(text);
        let name = strip_string_literal(name);
        is_identifier(name).then(|| name.to_string())
    }

    fn visit_call(&mut self, node: &TSNode) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let span = node_span(node, self.line_offset);

        if self.rules.dialect == Dialect::EcmaScript {
            let callee = extract_text(&function, self.source);
            if function.kind() == "import" || callee == "require" {
                if let Some(target) = self.first_string_argument(node) {
                    self.out.add_import(&target, span);
                }
                return;
            }
        }

        // Only calls made from a function body are call sites.
        if self.functions.is_empty() {
            return;
        }

        let callee = match function.kind() {
            "identifier" => Some(function),
            "attribute" => function.child_by_field_name("attribute"),
            "member_expression" => function.child_by_field_name("property"),
            _ => None,
        };
        if let Some(callee) = callee {
            let name = extract_text(&callee, self.source);
            if is_identifier(name) {
                self.out.add_call(name, span);
            }
        }
    }

    fn first_string_argument(&self, call: &TSNode) -> Option<String> {
        let arguments = call.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        let first = arguments.named_children(&mut cursor).next()?;
        if first.kind() != "string" && first.kind() != "template_string" {
            return None;
        }
        Some(strip_string_literal(extract_text(&first, self.source)).to_string())
    }

    fn visit_import(&mut self, node: &TSNode) {
        let span = node_span(node, self.line_offset);
        match self.rules.dialect {
            Dialect::Python => {
                for target in self.python_import_targets(node) {
                    self.out.add_import(&target, span);
                }
            }
            Dialect::EcmaScript => {
                // `export … from '…'` re-exports; plain exports carry no source.
                if let Some(source) = node.child_by_field_name("source") {
                    let target = strip_string_literal(extract_text(&source, self.source));
                    self.out.add_import(target, span);
                }
            }
        }
    }

    fn python_import_targets(&self, node: &TSNode) -> Vec<String> {
        let module = node.child_by_field_name("module_name");
        let module_text = module
            .map(|m| extract_text(&m, self.source).to_string())
            .unwrap_or_default();

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if let Some(module) = module {
                if child.start_byte() == module.start_byte() {
                    continue;
                }
            }
            let name_node = match child.kind() {
                "dotted_name" => Some(child),
                "aliased_import" => child.child_by_field_name("name"),
                _ => None,
            };
            if let Some(name_node) = name_node {
                names.push(extract_text(&name_node, self.source).to_string());
            }
        }

        if node.kind() == "import_statement" {
            return names;
        }

        // `from . import x` names sibling modules; `from .pkg import x` names the package.
        if !module_text.is_empty() && module_text.chars().all(|c| c == '.') {
            names
                .into_iter()
                .map(|name| format!("{module_text}{name}"))
                .collect()
        } else if module_text.is_empty() {
            Vec::new()
        } else {
            vec![module_text]
        }
    }
}
