use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::common::{line_at, mask_ranges, match_ranges, range_span};
use super::extract::Extraction;
use super::ner::EntityTagger;
use super::{LanguageAnalyzer, SourceFile};
use crate::core::{AnalysisRecord, FileKind};

static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex"));
static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*//[^\n]*").expect("line comment regex"));
static AT_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(?:import|use|forward)\s+([^;{}\n]+)").expect("at-rule regex"));
static STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"\n]*)"|'([^'\n]*)'"#).expect("string regex"));

/// Stylesheets: `@import`-style references, comments, quoted strings. No functions.
pub struct CssAnalyzer {
    tagger: Arc<dyn EntityTagger>,
}

impl CssAnalyzer {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self { tagger }
    }
}

impl LanguageAnalyzer for CssAnalyzer {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord {
        let mut out = Extraction::new();
        let lowered = source.path.to_ascii_lowercase();
        let line_comments = !lowered.ends_with(".css");
        extract_stylesheet(&source.content, 0, line_comments, &mut out);
        out.finish(source, FileKind::Css, self.tagger.as_ref())
    }

    fn kind(&self) -> FileKind {
        FileKind::Css
    }
}

/// Extracts a stylesheet (a whole file or an embedded `<style>` block) into `out`.
pub fn extract_stylesheet(
    content: &str,
    line_offset: usize,
    line_comments: bool,
    out: &mut Extraction,
) {
    let mut comments = match_ranges(&BLOCK_COMMENT, content);
    if line_comments {
        let masked = mask_ranges(content, &comments);
        comments.extend(match_ranges(&LINE_COMMENT, &masked));
    }
    comments.sort_by_key(|range| range.start);

    for range in &comments {
        out.add_comment(&content[range.clone()], range_span(content, range.clone(), line_offset));
    }

    let code = mask_ranges(content, &comments);

    for caps in AT_RULE.captures_iter(&code) {
        let Some(arguments) = caps.get(1) else {
            continue;
        };
        let span = range_span(content, arguments.range(), line_offset);
        for target in split_import_arguments(arguments.as_str()) {
            out.add_import(&target, span);
        }
    }

    for caps in STRING.captures_iter(&code) {
        if let Some(text) = caps.get(1).or_else(|| caps.get(2)) {
            out.add_string(text.as_str(), line_at(content, text.start()) + line_offset);
        }
    }
}

/// `'a.css', url("b.css") screen` ⇒ `["a.css", "b.css"]`.
fn split_import_arguments(arguments: &str) -> Vec<String> {
    arguments
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            let part = part
                .strip_prefix("url(")
                .map(|rest| rest.split(')').next().unwrap_or(rest))
                .unwrap_or(part)
                .trim();
            let target = if let Some(rest) = part.strip_prefix('"') {
                rest.split('"').next()
            } else if let Some(rest) = part.strip_prefix('\'') {
                rest.split('\'').next()
            } else {
                part.split_whitespace().next()
            }?;
            let target = target.trim();
            (!target.is_empty()).then(|| target.to_string())
        })
        .collect()
}
