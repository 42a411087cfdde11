use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tree_sitter::{Language, Node as TSNode, Parser, Tree};

use crate::core::Span;

pub struct TreeSitterParser {
    parser: Parser,
}

impl TreeSitterParser {
    pub fn new(language: Language) -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(language)?;
        Ok(Self { parser })
    }

    pub fn parse(&mut self, source: &str) -> Option<Tree> {
        self.parser.parse(source, None)
    }
}

pub fn extract_text<'a>(node: &TSNode, source: &'a [u8]) -> &'a str {
    source
        .get(node.byte_range())
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or("")
}

/// 1-based inclusive line span of a node, shifted by `line_offset`.
///
/// A node that ends at column 0 stops on the previous line (trailing newline tokens).
pub fn node_span(node: &TSNode, line_offset: usize) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    let end_row = if end.column == 0 && end.row > start.row {
        end.row - 1
    } else {
        end.row
    };
    Span::new(start.row + 1 + line_offset, end_row + 1 + line_offset)
}

/// Line (1-based) of a byte offset inside `content`.
pub fn line_at(content: &str, offset: usize) -> usize {
    let offset = offset.min(content.len());
    content.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier regex"));

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Removes comment markers (`#`, `//`, `/* */`, `<!-- -->`, leading `*`) from comment text.
pub fn strip_comment_markers(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<!--")
        .map(|s| s.strip_suffix("-->").unwrap_or(s))
        .or_else(|| {
            trimmed
                .strip_prefix("/*")
                .map(|s| s.strip_suffix("*/").unwrap_or(s))
        })
        .or_else(|| trimmed.strip_prefix("//"))
        .or_else(|| trimmed.strip_prefix('#'))
        .unwrap_or(trimmed);

    inner
        .lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').map(str::trim_start).unwrap_or(line)
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes quotes and string prefixes (`r`, `b`, `f`, `u`) from a literal.
pub fn strip_string_literal(raw: &str) -> &str {
    let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if let Some(inner) = body
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner;
        }
    }
    body
}

/// Line span covered by a byte range of `content`, shifted by `line_offset`.
pub fn range_span(content: &str, range: Range<usize>, line_offset: usize) -> Span {
    let last = if range.end > range.start {
        range.end - 1
    } else {
        range.start
    };
    Span::new(
        line_at(content, range.start) + line_offset,
        line_at(content, last) + line_offset,
    )
}

/// Blanks the given byte ranges with spaces, keeping newlines and byte offsets.
pub fn mask_ranges(content: &str, ranges: &[Range<usize>]) -> String {
    let mut bytes = content.as_bytes().to_vec();
    for range in ranges {
        let end = range.end.min(bytes.len());
        for byte in &mut bytes[range.start.min(end)..end] {
            if *byte != b'\n' {
                *byte = b' ';
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Byte ranges of every match of `regex` in `content`.
pub fn match_ranges(regex: &Regex, content: &str) -> Vec<Range<usize>> {
    regex.find_iter(content).map(|m| m.range()).collect()
}
