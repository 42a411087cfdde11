pub mod classifier;
pub mod graph;
pub mod loader;
pub mod orchestrator;
pub mod record;
pub mod resolver;
pub mod scanner;
pub mod serializer;
pub mod summary;
pub mod validator;

pub use classifier::{Classifier, ContentSniffer, MagicSniffer};
pub use graph::{CallGraph, DependencyGraph, FileLinkage, GraphBuilder, Graphs};
pub use loader::ContentLoader;
pub use orchestrator::{Pipeline, RunReport};
pub use record::{module_of, AnalysisRecord, Entity, EntityKind, FileKind, Metrics, Span};
pub use resolver::{CallSite, FunctionResolver, ImportResolver};
pub use scanner::FileScanner;
pub use serializer::{stream_name, verify_stream, RecordSink};
pub use summary::{FileOutcome, RunSummary};
pub use validator::{BuiltinSchema, RecordSchema, Validator};
