use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::common::{line_at, mask_ranges, match_ranges, range_span};
use super::extract::Extraction;
use super::ner::EntityTagger;
use super::{LanguageAnalyzer, SourceFile};
use crate::core::{AnalysisRecord, FileKind};

pub(crate) static MARKUP_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("markup comment regex"));
static RAW_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("raw block regex")
});
static LINK_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("link regex")
});
static SCRIPT_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("script regex")
});
static TEXT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r">([^<>]+)<").expect("text regex"));

pub struct HtmlAnalyzer {
    tagger: Arc<dyn EntityTagger>,
}

impl HtmlAnalyzer {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self { tagger }
    }
}

impl LanguageAnalyzer for HtmlAnalyzer {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord {
        let content = source.content.as_str();
        let mut out = Extraction::new();

        let comments = extract_markup_comments(content, 0, &mut out);
        let markup = mask_ranges(content, &comments);

        for regex in [&*LINK_HREF, &*SCRIPT_SRC] {
            for caps in regex.captures_iter(&markup) {
                if let Some(target) = caps.get(1) {
                    out.add_import(target.as_str(), range_span(content, target.range(), 0));
                }
            }
        }

        let text_only = mask_ranges(&markup, &match_ranges(&RAW_BLOCK, &markup));
        for caps in TEXT_RUN.captures_iter(&text_only) {
            if let Some(text) = caps.get(1) {
                out.add_prose(text.as_str(), line_at(content, text.start()));
            }
        }

        out.finish(source, FileKind::Html, self.tagger.as_ref())
    }

    fn kind(&self) -> FileKind {
        FileKind::Html
    }
}

/// Records every `<!-- -->` comment in `content` and returns their byte ranges.
pub fn extract_markup_comments(
    content: &str,
    line_offset: usize,
    out: &mut Extraction,
) -> Vec<std::ops::Range<usize>> {
    let comments = match_ranges(&MARKUP_COMMENT, content);
    for range in &comments {
        out.add_comment(&content[range.clone()], range_span(content, range.clone(), line_offset));
    }
    comments
}
