use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

use super::record::module_of;

/// Extensions tried, in order, when an import names a file without one.
const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "pyi", "js", "mjs", "cjs", "jsx", "ts", "tsx", "mts", "cts", "vue", "css", "scss",
    "sass", "less", "html", "htm", "md", "markdown", "mdx",
];

/// Directory entry points tried when an import names a directory.
const PACKAGE_ENTRIES: &[&str] = &[
    "__init__.py",
    "index.js",
    "index.ts",
    "index.jsx",
    "index.tsx",
    "index.mjs",
    "index.cjs",
    "index.vue",
];

/// Maps import specifiers to root-relative paths of scanned files.
///
/// Relative specifiers (`./x`, `../x`, Python leading dots) are resolved from the
/// importing file's directory. Everything else is tried in the importing
/// directory, then at the root, then as a suffix that matches exactly one path.
#[derive(Debug, Clone, Default)]
pub struct ImportResolver {
    known: HashSet<String>,
    /// Last path segment ⇒ every known path ending in it.
    by_file_name: HashMap<String, Vec<String>>,
}

impl ImportResolver {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut resolver = Self::default();
        for path in paths {
            resolver.insert(path.into());
        }
        resolver
    }

    pub fn insert(&mut self, path: String) {
        if self.known.contains(&path) {
            return;
        }
        let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        self.by_file_name
            .entry(file_name)
            .or_default()
            .push(path.clone());
        self.known.insert(path);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.known.contains(path)
    }

    /// Resolves `specifier` as imported by `importer`; `None` when nothing in
    /// the tree matches.
    pub fn resolve(&self, importer: &str, specifier: &str) -> Option<String> {
        let specifier = specifier.trim();
        if specifier.is_empty() || is_external(specifier) {
            return None;
        }
        let importer_dir = module_of(importer);

        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = normalize(&join(&importer_dir, specifier))?;
            return self.first_known(&base);
        }
        if let Some(rooted) = specifier.strip_prefix('/') {
            let base = normalize(rooted)?;
            return self.first_known(&base);
        }
        if specifier.starts_with('.') {
            return self.resolve_python_relative(&importer_dir, specifier);
        }

        let mut forms = vec![specifier.to_string()];
        if !specifier.contains('/') && specifier.contains('.') {
            forms.push(specifier.replace('.', "/"));
        }

        for form in &forms {
            for dir in [importer_dir.as_str(), ""] {
                if let Some(base) = normalize(&join(dir, form)) {
                    if let Some(found) = self.first_known(&base) {
                        return Some(found);
                    }
                }
            }
        }

        forms.iter().find_map(|form| self.unique_suffix(form))
    }

    /// `from ..pkg.mod import x` style: one dot is the importing package.
    fn resolve_python_relative(&self, importer_dir: &str, specifier: &str) -> Option<String> {
        let rest = specifier.trim_start_matches('.');
        let levels = specifier.len() - rest.len();

        let mut dir = importer_dir.to_string();
        for _ in 1..levels {
            if dir.is_empty() {
                return None;
            }
            dir = module_of(&dir);
        }

        let base = if rest.is_empty() {
            dir
        } else {
            join(&dir, &rest.replace('.', "/"))
        };
        self.first_known(&normalize(&base)?)
    }

    fn first_known(&self, base: &str) -> Option<String> {
        candidates(base).into_iter().find(|c| self.known.contains(c))
    }

    fn unique_suffix(&self, form: &str) -> Option<String> {
        let form = normalize(form)?;
        for candidate in candidates(&form) {
            let file_name = candidate.rsplit('/').next().unwrap_or(&candidate);
            let Some(paths) = self.by_file_name.get(file_name) else {
                continue;
            };
            let suffix = format!("/{candidate}");
            let mut matches = paths
                .iter()
                .filter(|path| **path == candidate || path.ends_with(&suffix));
            if let (Some(only), None) = (matches.next(), matches.next()) {
                return Some(only.clone());
            }
        }
        None
    }
}

fn candidates(base: &str) -> Vec<String> {
    if base.is_empty() {
        return PACKAGE_ENTRIES.iter().map(|e| e.to_string()).collect();
    }
    let mut out = Vec::with_capacity(1 + SOURCE_EXTENSIONS.len() + PACKAGE_ENTRIES.len());
    out.push(base.to_string());
    out.extend(SOURCE_EXTENSIONS.iter().map(|ext| format!("{base}.{ext}")));
    out.extend(PACKAGE_ENTRIES.iter().map(|entry| format!("{base}/{entry}")));
    out
}

fn is_external(specifier: &str) -> bool {
    specifier.starts_with("//")
        || specifier
            .split_once("://")
            .is_some_and(|(scheme, _)| !scheme.is_empty() && !scheme.contains('/'))
        || specifier.starts_with("data:")
        || specifier.starts_with("mailto:")
}

fn join(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        path.to_string()
    } else {
        format!("{dir}/{path}")
    }
}

/// Collapses `.` and `..` segments; `None` when the path escapes the root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// A function definition known to the call graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub node_id: String,
    pub file_path: String,
    pub name: String,
}

impl FunctionEntry {
    pub fn bare_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// A call recorded inside a function body, waiting for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub caller_id: String,
    pub file_path: String,
    pub called_name: String,
    pub line_number: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResolution {
    /// `(caller_id, callee_id)` pairs, one per resolved call site.
    pub edges: Vec<(String, String)>,
    pub unresolved: usize,
}

/// Name-only call resolver. A call binds to the single same-file function with
/// its bare name, else to the single such function anywhere; otherwise it is
/// counted as unresolved.
#[derive(Debug, Clone, Default)]
pub struct FunctionResolver {
    function_index: HashMap<String, Vec<FunctionEntry>>,
}

impl FunctionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_indexes<'a>(&mut self, functions: impl IntoIterator<Item = &'a FunctionEntry>) {
        self.function_index.clear();
        for function in functions {
            self.function_index
                .entry(function.bare_name().to_string())
                .or_default()
                .push(function.clone());
        }
    }

    pub fn resolve_calls(&self, call_sites: &[CallSite]) -> CallResolution {
        let resolved: Vec<Option<(String, String)>> = call_sites
            .par_iter()
            .map(|call_site| {
                self.resolve_single_call(call_site)
                    .map(|target| (call_site.caller_id.clone(), target.node_id.clone()))
            })
            .collect();

        let unresolved = resolved.iter().filter(|edge| edge.is_none()).count();
        CallResolution {
            edges: resolved.into_iter().flatten().collect(),
            unresolved,
        }
    }

    fn resolve_single_call(&self, call_site: &CallSite) -> Option<&FunctionEntry> {
        let bare = call_site
            .called_name
            .rsplit('.')
            .next()
            .unwrap_or(&call_site.called_name);
        let candidates = self.function_index.get(bare)?;

        let mut same_file = candidates
            .iter()
            .filter(|candidate| candidate.file_path == call_site.file_path);
        match (same_file.next(), same_file.next()) {
            (Some(only), None) => return Some(only),
            (Some(_), Some(_)) => return None,
            _ => {}
        }

        match candidates.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}
