use super::record::{AnalysisRecord, EntityKind, Metrics};
use crate::parsers::common::is_identifier;

/// Pass/fail oracle for records about to be written.
pub trait RecordSchema: Send + Sync {
    fn version(&self) -> &str;

    /// Every rule the record breaks; empty when it conforms.
    fn check(&self, record: &AnalysisRecord) -> Vec<String>;
}

pub const RECORD_SCHEMA_V1: &str = "codebase-mirror/record@1";

/// The record layout written by this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSchema;

impl RecordSchema for BuiltinSchema {
    fn version(&self) -> &str {
        RECORD_SCHEMA_V1
    }

    fn check(&self, record: &AnalysisRecord) -> Vec<String> {
        let mut violations = Vec::new();

        if record.path.is_empty() {
            violations.push("path is empty".to_string());
        } else if record.path.starts_with('/') || record.path.contains('\\') {
            violations.push(format!("path {:?} is not root-relative", record.path));
        }

        if !record.kind.is_analyzable() {
            violations.push(format!("kind {} never produces a record", record.kind));
        }

        if record.content_hash.len() != 64
            || !record
                .content_hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            violations.push(format!(
                "contentHash {:?} is not 64 lowercase hex characters",
                record.content_hash
            ));
        }

        check_metrics(&record.metrics, &mut violations);

        for (position, entity) in record.entities.iter().enumerate() {
            let at = format!("entity #{position} ({:?} {:?})", entity.kind, entity.name);
            if entity.name.trim().is_empty() {
                violations.push(format!("{at}: empty name"));
            }
            if entity.span.start < 1
                || entity.span.start > entity.span.end
                || entity.span.end > record.loc.max(1)
            {
                violations.push(format!(
                    "{at}: span {}..{} outside 1..{}",
                    entity.span.start, entity.span.end, record.loc
                ));
            }
            match entity.kind {
                EntityKind::Import
                    if entity
                        .target_module
                        .as_deref()
                        .map_or(true, |target| target.trim().is_empty()) =>
                {
                    violations.push(format!("{at}: import without targetModule"));
                }
                EntityKind::Call
                    if !entity.callee_name.as_deref().is_some_and(is_identifier) =>
                {
                    violations.push(format!("{at}: call without an identifier calleeName"));
                }
                EntityKind::NamedEntity
                    if entity
                        .label
                        .as_deref()
                        .map_or(true, |label| label.is_empty()) =>
                {
                    violations.push(format!("{at}: named entity without label"));
                }
                _ => {}
            }
        }

        violations
    }
}

fn check_metrics(metrics: &Metrics, violations: &mut Vec<String>) {
    for (name, value) in [
        ("averageComplexity", metrics.average_complexity),
        ("commentDensity", metrics.comment_density),
    ] {
        if !value.is_finite() || value < 0.0 {
            violations.push(format!("{name} is {value}"));
        }
    }
    if metrics.comment_density > 1.0 {
        violations.push(format!("commentDensity {} exceeds 1", metrics.comment_density));
    }
    if metrics.average_complexity > f64::from(metrics.max_complexity) {
        violations.push(format!(
            "averageComplexity {} exceeds maxComplexity {}",
            metrics.average_complexity, metrics.max_complexity
        ));
    }
    if metrics.max_complexity > metrics.cyclomatic_complexity {
        violations.push(format!(
            "maxComplexity {} exceeds cyclomaticComplexity {}",
            metrics.max_complexity, metrics.cyclomatic_complexity
        ));
    }
}

/// Gate between analysis and serialization.
pub struct Validator {
    schema: Box<dyn RecordSchema>,
}

impl Validator {
    pub fn new(schema: Box<dyn RecordSchema>) -> Self {
        Self { schema }
    }

    pub fn schema_version(&self) -> &str {
        self.schema.version()
    }

    pub fn validate(&self, record: &AnalysisRecord) -> Result<(), Vec<String>> {
        let violations = self.schema.check(record);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Box::new(BuiltinSchema))
    }
}
