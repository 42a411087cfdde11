//! # codebase-mirror
//!
//! Turns a source tree into a per-file record dataset for language-model training.
//!
//! Every file is classified, read, and analyzed by a language-specific extractor
//! (classes, functions, imports, comments, call sites, named entities, complexity
//! metrics). Records are folded into a file-level dependency graph and a
//! function-level call graph, validated against a versioned schema and written
//! as JSON Lines, one stream per directory.
//!
//! ## Supported Languages
//!
//! Python, JavaScript, JSX, TypeScript, Vue, HTML, CSS (SCSS, Sass, Less), Markdown

pub mod config;
pub mod core;
pub mod error;
pub mod formatters;
pub mod parsers;

pub use config::PipelineConfig;
pub use core::{Pipeline, RunReport, RunSummary};
pub use error::{FileError, FileErrorKind, PipelineError};
