use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use std::sync::Arc;

use super::common::{line_at, mask_ranges, range_span};
use super::extract::Extraction;
use super::html::extract_markup_comments;
use super::ner::EntityTagger;
use super::{LanguageAnalyzer, SourceFile};
use crate::core::{AnalysisRecord, FileKind};

static INLINE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!?\[[^\]\n]*\]\(\s*<?([^)\s>]+)").expect("inline link regex"));
static REFERENCE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]{0,3}\[[^\]\n]+\]:[ \t]*<?([^\s>]+)").expect("reference link regex")
});
static SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("scheme regex"));

pub struct MarkdownAnalyzer {
    tagger: Arc<dyn EntityTagger>,
}

impl MarkdownAnalyzer {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self { tagger }
    }
}

impl LanguageAnalyzer for MarkdownAnalyzer {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord {
        let content = source.content.as_str();
        let mut out = Extraction::new();

        let fences = fenced_blocks(content);
        let outside_code = mask_ranges(content, &fences);

        let comments = extract_markup_comments(&outside_code, 0, &mut out);
        let prose = mask_ranges(&outside_code, &comments);

        for regex in [&*INLINE_LINK, &*REFERENCE_LINK] {
            for caps in regex.captures_iter(&prose) {
                let Some(target) = caps.get(1) else {
                    continue;
                };
                if let Some(relative) = relative_target(target.as_str()) {
                    out.add_import(relative, range_span(content, target.range(), 0));
                }
            }
        }

        let mut offset = 0;
        for line in prose.split_inclusive('\n') {
            if !line.trim().is_empty() {
                out.add_prose(line.trim_end(), line_at(content, offset));
            }
            offset += line.len();
        }

        out.finish(source, FileKind::Markdown, self.tagger.as_ref())
    }

    fn kind(&self) -> FileKind {
        FileKind::Markdown
    }
}

/// Byte ranges of fenced code blocks (```` ``` ```` or `~~~`), fences included.
/// An unterminated fence runs to the end of the document.
fn fenced_blocks(content: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut open: Option<(usize, &str)> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let marker = line.trim_start();
        let fence = if marker.starts_with("```") {
            Some("```")
        } else if marker.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (open, fence) {
            (None, Some(fence)) => open = Some((offset, fence)),
            (Some((start, current)), Some(fence)) if fence == current => {
                blocks.push(start..offset + line.len());
                open = None;
            }
            _ => {}
        }
        offset += line.len();
    }

    if let Some((start, _)) = open {
        blocks.push(start..content.len());
    }
    blocks
}

/// Link targets that point inside the repository, with fragment and query removed.
fn relative_target(target: &str) -> Option<&str> {
    if target.starts_with('#') || target.starts_with("//") || SCHEME.is_match(target) {
        return None;
    }
    let end = target.find(|c| c == '#' || c == '?').unwrap_or(target.len());
    let path = target[..end].trim();
    (!path.is_empty()).then_some(path)
}
