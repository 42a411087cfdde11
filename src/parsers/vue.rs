use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::Arc;
use tree_sitter::Language;

use super::common::{line_at, mask_ranges, TreeSitterParser};
use super::css::extract_stylesheet;
use super::extract::Extraction;
use super::html::extract_markup_comments;
use super::ner::EntityTagger;
use super::syntax::{extract_tree, ECMASCRIPT_RULES};
use super::{LanguageAnalyzer, SourceFile};
use crate::core::{AnalysisRecord, FileKind};

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").expect("script block regex")
});
static STYLE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<style\b([^>]*)>(.*?)</style\s*>").expect("style block regex")
});
static LANG_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\blang\s*=\s*["']?([A-Za-z]+)"#).expect("lang attribute regex")
});

/// Single-file components: `<script>` blocks through the ECMAScript walk,
/// `<style>` blocks as stylesheets, and markup comments from the template.
pub struct VueAnalyzer {
    tagger: Arc<dyn EntityTagger>,
}

impl VueAnalyzer {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self { tagger }
    }

    fn extract(content: &str) -> Extraction {
        let mut out = Extraction::new();
        let mut blocks = Vec::new();

        for caps in SCRIPT_BLOCK.captures_iter(content) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            blocks.push(whole.range());

            let Ok(mut parser) = TreeSitterParser::new(script_grammar(&caps)) else {
                return Extraction::degraded();
            };
            let Some(tree) = parser.parse(body.as_str()) else {
                return Extraction::degraded();
            };
            let line_offset = line_at(content, body.start()) - 1;
            if !extract_tree(&tree, body.as_str(), &ECMASCRIPT_RULES, line_offset, &mut out) {
                return Extraction::degraded();
            }
        }

        for caps in STYLE_BLOCK.captures_iter(content) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            blocks.push(whole.range());

            let line_comments = !matches!(lang(&caps).as_deref(), None | Some("css"));
            let line_offset = line_at(content, body.start()) - 1;
            extract_stylesheet(body.as_str(), line_offset, line_comments, &mut out);
        }

        let template = mask_ranges(content, &blocks);
        extract_markup_comments(&template, 0, &mut out);
        out
    }
}

impl LanguageAnalyzer for VueAnalyzer {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord {
        Self::extract(&source.content).finish(source, FileKind::Vue, self.tagger.as_ref())
    }

    fn kind(&self) -> FileKind {
        FileKind::Vue
    }
}

fn lang(block: &Captures<'_>) -> Option<String> {
    let attributes = block.get(1)?.as_str();
    LANG_ATTR
        .captures(attributes)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

fn script_grammar(block: &Captures<'_>) -> Language {
    match lang(block).as_deref() {
        Some("ts") => tree_sitter_typescript::language_typescript(),
        Some("tsx") => tree_sitter_typescript::language_tsx(),
        _ => tree_sitter_javascript::language(),
    }
}
