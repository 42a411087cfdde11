//! Named-entity tagging over free text (comments and string literals).
//!
//! The pipeline only depends on [`EntityTagger`]; [`PatternTagger`] is the
//! built-in, model-free implementation.

use once_cell::sync::Lazy;
use regex::Regex;

/// A labelled byte range inside the tagged text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

pub trait EntityTagger: Send + Sync {
    fn tag(&self, text: &str) -> Vec<TaggedSpan>;
}

static PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("URL", r#"https?://[^\s<>"'()\[\]{}`]+"#),
        ("EMAIL", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
        ("DATE", r"\b\d{4}-\d{2}-\d{2}\b"),
        ("VERSION", r"\bv?\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?\b"),
        ("PROPER_NOUN", r"\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)+\b"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("tagger pattern")))
    .collect()
});

/// Regex tagger for URL, EMAIL, DATE, VERSION and PROPER_NOUN.
///
/// Patterns are tried in that order and a later match never overlaps an earlier one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternTagger;

impl EntityTagger for PatternTagger {
    fn tag(&self, text: &str) -> Vec<TaggedSpan> {
        let mut accepted: Vec<TaggedSpan> = Vec::new();

        for (label, regex) in PATTERNS.iter() {
            for m in regex.find_iter(text) {
                let overlaps = accepted
                    .iter()
                    .any(|span| m.start() < span.end && span.start < m.end());
                if !overlaps {
                    accepted.push(TaggedSpan {
                        start: m.start(),
                        end: m.end(),
                        label: (*label).to_string(),
                    });
                }
            }
        }

        accepted.sort_by_key(|span| span.start);
        accepted
    }
}
