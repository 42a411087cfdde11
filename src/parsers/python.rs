use std::sync::Arc;

use super::ner::EntityTagger;
use super::syntax::{extract_script, PYTHON_RULES};
use super::{LanguageAnalyzer, SourceFile};
use crate::core::{AnalysisRecord, FileKind};

pub struct PythonAnalyzer {
    tagger: Arc<dyn EntityTagger>,
}

impl PythonAnalyzer {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self { tagger }
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord {
        extract_script(&source.content, tree_sitter_python::language(), &PYTHON_RULES).finish(
            source,
            FileKind::Python,
            self.tagger.as_ref(),
        )
    }

    fn kind(&self) -> FileKind {
        FileKind::Python
    }
}
