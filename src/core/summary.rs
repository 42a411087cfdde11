use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::FileKind;
use crate::error::{FileError, FileErrorKind};

/// Terminal state of one file in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileOutcome {
    Skipped,
    Failed,
    Analyzed,
    Cached,
}

/// Everything the orchestrator learned about one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: String,
    pub kind: FileKind,
    pub outcome: FileOutcome,
    pub diagnostics: Vec<FileError>,
    pub loc: usize,
    pub size_bytes: u64,
    pub record_written: bool,
}

impl FileReport {
    pub fn new(path: impl Into<String>, kind: FileKind, outcome: FileOutcome) -> Self {
        Self {
            path: path.into(),
            kind,
            outcome,
            diagnostics: Vec::new(),
            loc: 0,
            size_bytes: 0,
            record_written: false,
        }
    }

    pub fn with_diagnostic(mut self, error: FileError) -> Self {
        self.diagnostics.push(error);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    pub files: usize,
    pub loc: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub path: String,
    pub kind: FileErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub schema_version: String,
    pub files_seen: usize,
    pub analyzed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
    pub records_written: usize,
    pub dependency_edges: usize,
    pub call_edges: usize,
    pub unresolved_calls: usize,
    pub by_kind: BTreeMap<FileKind, KindStats>,
    pub diagnostics: Vec<Diagnostic>,
    /// Set when a fatal error or cancellation ended the run early.
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, report: FileReport) {
        self.files_seen += 1;
        match report.outcome {
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed => self.failed += 1,
            FileOutcome::Analyzed => self.analyzed += 1,
            FileOutcome::Cached => self.cached += 1,
        }

        let stats = self.by_kind.entry(report.kind).or_default();
        stats.files += 1;
        if report.record_written {
            stats.loc += report.loc;
            stats.bytes += report.size_bytes;
        }

        self.diagnostics
            .extend(report.diagnostics.into_iter().map(|error| Diagnostic {
                path: report.path.clone(),
                kind: error.kind,
                detail: error.detail,
            }));
    }

    /// Orders diagnostics by path so repeated runs produce the same summary.
    pub fn sort(&mut self) {
        self.diagnostics
            .sort_by(|a, b| (&a.path, a.kind).cmp(&(&b.path, b.kind)));
    }

    pub fn diagnostics_of(&self, kind: FileErrorKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}
