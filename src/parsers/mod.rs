pub mod cache;
pub mod common;
pub mod css;
pub mod extract;
pub mod html;
pub mod javascript;
pub mod markdown;
pub mod ner;
pub mod python;
pub mod syntax;
pub mod typescript;
pub mod vue;

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{AnalysisRecord, FileKind};
use ner::EntityTagger;

/// Decoded text of one file, ready for analysis.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Root-relative, `/`-separated.
    pub path: String,
    pub module: String,
    pub content: String,
    pub content_hash: String,
    pub size_bytes: u64,
}

/// Per-language extraction strategy.
///
/// `analyze` must not fail: syntax it cannot trust produces a record with
/// `parse_degraded` set and no entities.
pub trait LanguageAnalyzer: Send + Sync {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord;
    fn kind(&self) -> FileKind;
}

/// Fixed table of analyzers, one per analyzable [`FileKind`].
pub struct AnalyzerFactory {
    analyzers: HashMap<FileKind, Box<dyn LanguageAnalyzer>>,
}

impl AnalyzerFactory {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        let analyzers: Vec<Box<dyn LanguageAnalyzer>> = vec![
            Box::new(python::PythonAnalyzer::new(tagger.clone())),
            Box::new(javascript::JavaScriptAnalyzer::new(tagger.clone())),
            Box::new(javascript::JavaScriptAnalyzer::jsx(tagger.clone())),
            Box::new(typescript::TypeScriptAnalyzer::new(tagger.clone())),
            Box::new(vue::VueAnalyzer::new(tagger.clone())),
            Box::new(html::HtmlAnalyzer::new(tagger.clone())),
            Box::new(css::CssAnalyzer::new(tagger.clone())),
            Box::new(markdown::MarkdownAnalyzer::new(tagger)),
        ];

        Self {
            analyzers: analyzers
                .into_iter()
                .map(|analyzer| (analyzer.kind(), analyzer))
                .collect(),
        }
    }

    pub fn get_analyzer(&self, kind: FileKind) -> Option<&dyn LanguageAnalyzer> {
        self.analyzers.get(&kind).map(|analyzer| analyzer.as_ref())
    }
}

impl Default for AnalyzerFactory {
    fn default() -> Self {
        Self::new(Arc::new(ner::PatternTagger))
    }
}
