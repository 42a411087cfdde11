use std::sync::Arc;
use tree_sitter::Language;

use super::ner::EntityTagger;
use super::syntax::{extract_script, ECMASCRIPT_RULES};
use super::{LanguageAnalyzer, SourceFile};
use crate::core::{AnalysisRecord, FileKind};

pub struct TypeScriptAnalyzer {
    tagger: Arc<dyn EntityTagger>,
}

impl TypeScriptAnalyzer {
    pub fn new(tagger: Arc<dyn EntityTagger>) -> Self {
        Self { tagger }
    }

    /// `.tsx` needs the TSX grammar; everything else uses plain TypeScript.
    pub fn grammar_for(path: &str) -> Language {
        if path.to_ascii_lowercase().ends_with(".tsx") {
            tree_sitter_typescript::language_tsx()
        } else {
            tree_sitter_typescript::language_typescript()
        }
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn analyze(&self, source: &SourceFile) -> AnalysisRecord {
        extract_script(
            &source.content,
            Self::grammar_for(&source.path),
            &ECMASCRIPT_RULES,
        )
        .finish(source, FileKind::Typescript, self.tagger.as_ref())
    }

    fn kind(&self) -> FileKind {
        FileKind::Typescript
    }
}
