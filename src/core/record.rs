use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of file classifications. Assigned once per file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Python,
    Html,
    Css,
    Javascript,
    Typescript,
    Jsx,
    Vue,
    Markdown,
    Binary,
    Unknown,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Python => "python",
            FileKind::Html => "html",
            FileKind::Css => "css",
            FileKind::Javascript => "javascript",
            FileKind::Typescript => "typescript",
            FileKind::Jsx => "jsx",
            FileKind::Vue => "vue",
            FileKind::Markdown => "markdown",
            FileKind::Binary => "binary",
            FileKind::Unknown => "unknown",
        }
    }

    /// Kinds that have an analyzer and may produce a record.
    pub fn is_analyzable(self) -> bool {
        !matches!(self, FileKind::Binary | FileKind::Unknown)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Class,
    Function,
    Import,
    Comment,
    NamedEntity,
    Call,
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn line(line: usize) -> Self {
        Self::new(line, line)
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn width(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    pub span: Span,
    pub target_module: Option<String>,
    pub callee_name: Option<String>,
    pub label: Option<String>,
}

impl Entity {
    pub fn new(kind: EntityKind, name: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            name: name.into(),
            span,
            target_module: None,
            callee_name: None,
            label: None,
        }
    }

    pub fn import(target: impl Into<String>, span: Span) -> Self {
        let target = target.into();
        Self::new(EntityKind::Import, target.clone(), span).with_target_module(target)
    }

    pub fn call(callee: impl Into<String>, span: Span) -> Self {
        let callee = callee.into();
        Self::new(EntityKind::Call, callee.clone(), span).with_callee(callee)
    }

    pub fn with_target_module(mut self, target: String) -> Self {
        self.target_module = Some(target);
        self
    }

    pub fn with_callee(mut self, callee: String) -> Self {
        self.callee_name = Some(callee);
        self
    }

    pub fn with_label(mut self, label: String) -> Self {
        self.label = Some(label);
        self
    }

    /// Last `.` segment of the name; methods are stored as `Class.method`.
    pub fn bare_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub cyclomatic_complexity: u32,
    pub average_complexity: f64,
    pub max_complexity: u32,
    pub function_count: usize,
    pub class_count: usize,
    pub import_count: usize,
    pub comment_lines: usize,
    pub comment_density: f64,
}

/// Normalized per-file output of a language analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub path: String,
    pub kind: FileKind,
    pub module: String,
    pub entities: Vec<Entity>,
    pub metrics: Metrics,
    pub content_hash: String,
    pub parse_degraded: bool,
    pub unresolved_dependencies: Vec<String>,
    pub loc: usize,
    pub size_bytes: u64,
}

impl AnalysisRecord {
    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    /// Copy of this record carrying the dependency metadata computed by the graph builder.
    pub fn with_unresolved_dependencies(&self, unresolved: Vec<String>) -> Self {
        Self {
            unresolved_dependencies: unresolved,
            ..self.clone()
        }
    }
}

/// Root-relative directory of a root-relative file path; `""` for top-level files.
pub fn module_of(relative_path: &str) -> String {
    match relative_path.rfind('/') {
        Some(idx) => relative_path[..idx].to_string(),
        None => String::new(),
    }
}
