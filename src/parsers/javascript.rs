use std::sync::Arc;

use super::ner::EntityTagger;
use super::syntax::{extract_script, ECMASCRIPT_RULES};
use super::{LanguageAnalyzer, SourceFile};
use crate::core::{AnalysisRecord, FileKind};

/// JavaScript and JSX; the JavaScript grammar parses JSX natively.
pub struct JavaScriptAnalyzer {
    kind: FileKind,
    tagger: Arc<dyn EntityTagger>,
}

impl JavaScriptAnalyzer {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self {
            kind: FileKind::Javascript,
            tagger,
        }
    }

    pub fn jsx(tagger: Arc<dyn EntityTagger>) -> Self {
        Self {
            kind: FileKind::Jsx,
            tagger,
        }
    }
}

impl LanguageAnalyzer for JavaScriptAnalyzer {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord {
        extract_script(
            &source.content,
            tree_sitter_javascript::language(),
            &ECMASCRIPT_RULES,
        )
        .finish(source, self.kind, self.tagger.as_ref())
    }

    fn kind(&self) -> FileKind {
        self.kind
    }
}
