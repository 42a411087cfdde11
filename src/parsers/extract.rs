use std::collections::{BTreeSet, HashSet};

use super::common::{line_at, strip_comment_markers};
use super::ner::EntityTagger;
use super::SourceFile;
use crate::core::{AnalysisRecord, Entity, EntityKind, FileKind, Metrics, Span};

/// Free text eligible for named-entity tagging, anchored at its first line.
#[derive(Debug, Clone)]
struct FreeText {
    text: String,
    line: usize,
}

/// Accumulates what an analyzer finds in one file and turns it into a record.
#[derive(Debug, Default)]
pub struct Extraction {
    entities: Vec<Entity>,
    comment_lines: BTreeSet<usize>,
    function_complexity: Vec<u32>,
    free_text: Vec<FreeText>,
    degraded: bool,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result for a file whose syntax could not be trusted.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn add_class(&mut self, name: &str, span: Span) {
        self.entities
            .push(Entity::new(EntityKind::Class, name, span));
    }

    /// Registers a function and returns its complexity slot (starts at 1).
    pub fn add_function(&mut self, name: &str, span: Span) -> usize {
        self.entities
            .push(Entity::new(EntityKind::Function, name, span));
        self.function_complexity.push(1);
        self.function_complexity.len() - 1
    }

    pub fn add_decision(&mut self, function_slot: usize) {
        if let Some(complexity) = self.function_complexity.get_mut(function_slot) {
            *complexity += 1;
        }
    }

    pub fn add_import(&mut self, target: &str, span: Span) {
        let target = target.trim();
        if !target.is_empty() {
            self.entities.push(Entity::import(target, span));
        }
    }

    pub fn add_call(&mut self, callee: &str, span: Span) {
        self.entities.push(Entity::call(callee, span));
    }

    /// Records a comment: entity, covered lines and free text for tagging.
    pub fn add_comment(&mut self, raw: &str, span: Span) {
        let stripped = strip_comment_markers(raw);
        let name = if stripped.is_empty() {
            raw.trim().to_string()
        } else {
            stripped.clone()
        };
        if name.is_empty() {
            return;
        }
        self.comment_lines.extend(span.start..=span.end);
        self.entities
            .push(Entity::new(EntityKind::Comment, name, span));
        if !stripped.is_empty() {
            self.free_text.push(FreeText {
                text: raw.to_string(),
                line: span.start,
            });
        }
    }

    pub fn add_string(&mut self, text: &str, line: usize) {
        if text.trim().len() > 2 {
            self.free_text.push(FreeText {
                text: text.to_string(),
                line,
            });
        }
    }

    /// Prose outside code (markdown body, HTML text nodes).
    pub fn add_prose(&mut self, text: &str, line: usize) {
        self.add_string(text, line);
    }

    pub fn finish(
        mut self,
        source: &SourceFile,
        kind: FileKind,
        tagger: &dyn EntityTagger,
    ) -> AnalysisRecord {
        let loc = source.content.lines().count();

        if self.degraded {
            self.entities.clear();
            self.comment_lines.clear();
            self.function_complexity.clear();
            self.free_text.clear();
        }

        self.tag_free_text(tagger);

        for entity in &mut self.entities {
            entity.span = clamp_span(entity.span, loc);
        }

        let metrics = self.metrics(&source.content);

        AnalysisRecord {
            path: source.path.clone(),
            kind,
            module: source.module.clone(),
            entities: self.entities,
            metrics,
            content_hash: source.content_hash.clone(),
            parse_degraded: self.degraded,
            unresolved_dependencies: Vec::new(),
            loc,
            size_bytes: source.size_bytes,
        }
    }

    fn tag_free_text(&mut self, tagger: &dyn EntityTagger) {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut tagged = Vec::new();

        for region in &self.free_text {
            for span in tagger.tag(&region.text) {
                let Some(text) = region.text.get(span.start..span.end) else {
                    continue;
                };
                let text = text.trim();
                if text.is_empty() || !seen.insert((text.to_string(), span.label.clone())) {
                    continue;
                }
                let line = region.line + line_at(&region.text, span.start) - 1;
                tagged.push(
                    Entity::new(EntityKind::NamedEntity, text, Span::line(line))
                        .with_label(span.label),
                );
            }
        }

        self.entities.extend(tagged);
    }

    fn metrics(&self, content: &str) -> Metrics {
        let count = |kind: EntityKind| self.entities.iter().filter(|e| e.kind == kind).count();

        let lines: Vec<&str> = content.lines().collect();
        let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();
        let comment_lines = self
            .comment_lines
            .iter()
            .filter(|&&line| {
                line >= 1
                    && lines
                        .get(line - 1)
                        .map(|l| !l.trim().is_empty())
                        .unwrap_or(false)
            })
            .count();

        let cyclomatic_complexity: u32 = self.function_complexity.iter().sum();
        let max_complexity = self.function_complexity.iter().copied().max().unwrap_or(0);
        let average_complexity = if self.function_complexity.is_empty() {
            0.0
        } else {
            f64::from(cyclomatic_complexity) / self.function_complexity.len() as f64
        };

        Metrics {
            cyclomatic_complexity,
            average_complexity,
            max_complexity,
            function_count: count(EntityKind::Function),
            class_count: count(EntityKind::Class),
            import_count: count(EntityKind::Import),
            comment_lines,
            comment_density: comment_density(comment_lines, non_blank),
        }
    }
}

/// Comment lines over non-blank lines, clamped to `[0, 1]`.
pub fn comment_density(comment_lines: usize, non_blank_lines: usize) -> f64 {
    if non_blank_lines == 0 {
        return 0.0;
    }
    (comment_lines as f64 / non_blank_lines as f64).clamp(0.0, 1.0)
}

fn clamp_span(span: Span, loc: usize) -> Span {
    let upper = loc.max(1);
    let start = span.start.clamp(1, upper);
    Span::new(start, span.end.clamp(start, upper))
}
