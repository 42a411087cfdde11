use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::classifier::{Classifier, ContentSniffer};
use super::graph::{GraphBuilder, Graphs};
use super::loader::{decode_text, ContentLoader};
use super::record::{AnalysisRecord, FileKind};
use super::resolver::ImportResolver;
use super::scanner::{FileEntry, FileScanner};
use super::serializer::{FinishedStream, RecordSink};
use super::summary::{Diagnostic, FileOutcome, FileReport, RunSummary};
use super::validator::{BuiltinSchema, RecordSchema, Validator};
use crate::config::PipelineConfig;
use crate::error::{FileError, FileErrorKind, PipelineError};
use crate::parsers::cache::{CacheLookup, ResultCache};
use crate::parsers::ner::{EntityTagger, PatternTagger};
use crate::parsers::{AnalyzerFactory, SourceFile};

pub const INTERRUPTED: &str = "interrupted";

/// What a finished run hands back to its caller.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub graphs: Graphs,
    pub streams: Vec<FinishedStream>,
}

impl RunReport {
    pub fn interrupted(&self) -> bool {
        self.summary.aborted.as_deref() == Some(INTERRUPTED)
    }
}

/// Shared state of one run. Workers only reach it through `Arc`.
struct RunContext {
    config: PipelineConfig,
    classifier: Classifier,
    loader: ContentLoader,
    analyzers: AnalyzerFactory,
    cache: Option<ResultCache>,
    graph: GraphBuilder,
    validator: Validator,
    sink: RecordSink,
}

/// Result of the cancellable half of a file's processing.
enum Prepared {
    Skip {
        kind: FileKind,
        diagnostic: Option<FileError>,
    },
    Fail {
        kind: FileKind,
        error: FileError,
        diagnostics: Vec<FileError>,
    },
    Ready {
        record: AnalysisRecord,
        from_cache: bool,
        diagnostics: Vec<FileError>,
    },
}

/// Walks a tree and turns every file into a validated record, a graph node and
/// a line in its module's output stream.
pub struct Pipeline {
    input: PathBuf,
    output: PathBuf,
    config: PipelineConfig,
    tagger: Arc<dyn EntityTagger>,
    schema: Box<dyn RecordSchema>,
    sniffer: Option<Box<dyn ContentSniffer>>,
}

impl Pipeline {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            config,
            tagger: Arc::new(PatternTagger),
            schema: Box::new(BuiltinSchema),
            sniffer: None,
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn EntityTagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn with_schema(mut self, schema: Box<dyn RecordSchema>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_sniffer(mut self, sniffer: Box<dyn ContentSniffer>) -> Self {
        self.sniffer = Some(sniffer);
        self
    }

    pub async fn run_to_completion(self) -> Result<RunReport, PipelineError> {
        self.run(std::future::pending()).await
    }

    /// Runs until every file is processed or `shutdown` resolves. Output streams
    /// are finalized in both cases.
    pub async fn run<F>(self, shutdown: F) -> Result<RunReport, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        self.config.validate()?;

        if !self.input.is_dir() {
            return Err(PipelineError::InvalidRoot(self.input.clone()));
        }

        let sink = RecordSink::open(&self.output)?;
        let cache_dir = self.config.cache_dir_for(&self.output);
        let cache = self
            .config
            .use_cache
            .then(|| ResultCache::new(Some(cache_dir.clone()), self.config.cache_capacity));

        let classifier = match self.sniffer {
            Some(sniffer) => Classifier::with_sniffer(sniffer),
            None => Classifier::new(),
        };

        tracing::info!("Scanning {}", self.input.display());
        let files = FileScanner::new()
            .with_ignore_dirs(self.config.ignore_dirs.clone())
            .with_excluded(vec![self.output.clone(), cache_dir])
            .with_follow_links(self.config.follow_links)
            .scan_directory(&self.input, &classifier)
            .map_err(|err| {
                tracing::error!("Failed to walk {}: {err:#}", self.input.display());
                PipelineError::InvalidRoot(self.input.clone())
            })?;
        tracing::info!("Found {} files", files.len());

        let imports = ImportResolver::new(files.iter().map(|file| file.relative.clone()));
        let workers = self.config.workers;
        let ctx = Arc::new(RunContext {
            loader: ContentLoader::new(self.config.max_file_size),
            analyzers: AnalyzerFactory::new(self.tagger),
            graph: GraphBuilder::new(imports),
            validator: Validator::new(self.schema),
            config: self.config,
            classifier,
            cache,
            sink,
        });

        let mut summary = RunSummary::new(ctx.validator.schema_version());
        tracing::info!("Analyzing with {workers} workers");
        let (committed_tx, mut committed) = mpsc::unbounded_channel();
        {
            let mut reports = stream::iter(files)
                .map(|entry| process_file(ctx.clone(), entry, committed_tx.clone()))
                .buffer_unordered(workers);

            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        tracing::warn!("Shutdown requested; finishing records already being written");
                        summary.aborted = Some(INTERRUPTED.to_string());
                        break;
                    }
                    next = reports.next() => match next {
                        Some(Some(report)) => summary.record(report),
                        Some(None) => {}
                        None => break,
                    },
                }
            }
        }

        // Commits already started finish even after a shutdown; the channel
        // closes once the last of them has reported.
        drop(committed_tx);
        while let Some(report) = committed.recv().await {
            summary.record(report);
        }

        tracing::info!("Resolving call graph");
        let graphs = ctx.graph.finish();

        tracing::info!("Finalizing output streams");
        let sink_report = ctx.sink.finish().await;
        for failure in &sink_report.errors {
            summary.diagnostics.push(Diagnostic {
                path: failure.name.clone(),
                kind: FileErrorKind::WriteFailed,
                detail: failure.error.to_string(),
            });
        }

        summary.records_written = sink_report.records_written();
        summary.dependency_edges = graphs.dependencies.edge_count();
        summary.call_edges = graphs.calls.edge_count();
        summary.unresolved_calls = graphs.calls.unresolved_calls();
        summary.sort();

        if let Some(cache) = &ctx.cache {
            let stats = cache.stats();
            tracing::debug!(
                "Cache holds {} entries in memory, {} on disk",
                stats.memory_entries,
                stats.disk_entries
            );
        }

        tracing::info!(
            "Processed {} files in {:.2?}: {} analyzed, {} cached, {} skipped, {} failed",
            summary.files_seen,
            start.elapsed(),
            summary.analyzed,
            summary.cached,
            summary.skipped,
            summary.failed
        );

        Ok(RunReport {
            summary,
            graphs,
            streams: sink_report.streams,
        })
    }
}

/// `None` when the file went to a commit task, which reports on `committed`.
async fn process_file(
    ctx: Arc<RunContext>,
    entry: FileEntry,
    committed: mpsc::UnboundedSender<FileReport>,
) -> Option<FileReport> {
    if entry.kind_hint == Some(FileKind::Binary) {
        ctx.graph.add_stub(&entry.relative);
        tracing::debug!("{}: binary, skipped", entry.relative);
        return Some(FileReport::new(
            &entry.relative,
            FileKind::Binary,
            FileOutcome::Skipped,
        ));
    }

    let deadline = Duration::from_secs(ctx.config.file_timeout_secs);
    let prepared = match tokio::time::timeout(deadline, prepare(&ctx, &entry)).await {
        Ok(prepared) => prepared,
        Err(_) => Prepared::Fail {
            kind: entry.kind_hint.unwrap_or(FileKind::Unknown),
            error: FileError::new(
                FileErrorKind::DeadlineExceeded,
                format!("not analyzed within {}s", deadline.as_secs()),
            ),
            diagnostics: Vec::new(),
        },
    };

    let report = match prepared {
        Prepared::Skip { kind, diagnostic } => {
            ctx.graph.add_stub(&entry.relative);
            tracing::debug!("{}: {kind}, skipped", entry.relative);
            let report = FileReport::new(&entry.relative, kind, FileOutcome::Skipped);
            match diagnostic {
                Some(diagnostic) => report.with_diagnostic(diagnostic),
                None => report,
            }
        }
        Prepared::Fail {
            kind,
            error,
            diagnostics,
        } => {
            ctx.graph.add_stub(&entry.relative);
            tracing::warn!("{}: {error}", entry.relative);
            let mut report = FileReport::new(&entry.relative, kind, FileOutcome::Failed);
            report.diagnostics = diagnostics;
            report.with_diagnostic(error)
        }
        Prepared::Ready {
            record,
            from_cache,
            diagnostics,
        } => {
            let path = entry.relative.clone();
            let kind = record.kind;
            // Detached so that a shutdown cannot interrupt a stream write halfway.
            let task = tokio::spawn(commit(
                ctx.clone(),
                record,
                from_cache,
                diagnostics,
                committed,
            ));
            match task.await {
                Ok(()) => return None,
                Err(err) => {
                    ctx.graph.add_stub(&path);
                    FileReport::new(&path, kind, FileOutcome::Failed).with_diagnostic(
                        FileError::new(FileErrorKind::WriteFailed, err.to_string()),
                    )
                }
            }
        }
    };
    Some(report)
}

/// Load, classify, decode, then reuse a cached record or analyze.
async fn prepare(ctx: &Arc<RunContext>, entry: &FileEntry) -> Prepared {
    let hinted = entry.kind_hint.unwrap_or(FileKind::Unknown);
    let loaded = match ctx.loader.load(&entry.path).await {
        Ok(loaded) => loaded,
        Err(reason) => {
            return Prepared::Fail {
                kind: hinted,
                error: FileError::unreadable(&reason),
                diagnostics: Vec::new(),
            }
        }
    };

    let kind = match entry.kind_hint {
        Some(kind) => kind,
        None => ctx
            .classifier
            .classify(&entry.path, loaded.head(ctx.config.sniff_bytes)),
    };
    match kind {
        FileKind::Binary => {
            return Prepared::Skip {
                kind,
                diagnostic: None,
            }
        }
        FileKind::Unknown => {
            return Prepared::Skip {
                kind,
                diagnostic: Some(FileError::new(
                    FileErrorKind::Unclassifiable,
                    "no extension or content signature matched",
                )),
            }
        }
        _ => {}
    }

    let content = match decode_text(&loaded.bytes) {
        Ok(content) => content,
        Err(reason) => {
            return Prepared::Fail {
                kind: FileKind::Unknown,
                error: FileError::unreadable(&reason),
                diagnostics: Vec::new(),
            }
        }
    };

    let mut diagnostics = Vec::new();
    if let Some(cache) = &ctx.cache {
        match cache.get(&entry.relative, &loaded.content_hash) {
            CacheLookup::Hit(record) if record.kind == kind => {
                return Prepared::Ready {
                    record,
                    from_cache: true,
                    diagnostics,
                };
            }
            CacheLookup::Hit(_) | CacheLookup::Miss => {}
            CacheLookup::Corrupt(reason) => {
                tracing::warn!("{}: ignoring cache entry: {reason}", entry.relative);
                diagnostics.push(FileError::new(FileErrorKind::CacheCorrupt, reason));
            }
        }
    }

    let source = SourceFile {
        path: entry.relative.clone(),
        module: entry.module.clone(),
        content,
        content_hash: loaded.content_hash.clone(),
        size_bytes: loaded.size(),
    };
    let worker = ctx.clone();
    let analyzed = tokio::task::spawn_blocking(move || {
        worker
            .analyzers
            .get_analyzer(kind)
            .map(|analyzer| analyzer.analyze(&source))
    })
    .await;

    match analyzed {
        Ok(Some(record)) => {
            if record.parse_degraded {
                diagnostics.push(FileError::new(
                    FileErrorKind::ParseDegraded,
                    "syntax errors; entities omitted",
                ));
            }
            Prepared::Ready {
                record,
                from_cache: false,
                diagnostics,
            }
        }
        Ok(None) => Prepared::Skip {
            kind,
            diagnostic: Some(FileError::new(
                FileErrorKind::Unclassifiable,
                format!("no analyzer for {kind}"),
            )),
        },
        Err(err) => Prepared::Fail {
            kind,
            error: FileError::new(FileErrorKind::AnalyzerPanicked, err.to_string()),
            diagnostics,
        },
    }
}

/// Graph, validate, write, remember. Runs to completion once started.
async fn commit(
    ctx: Arc<RunContext>,
    analyzed: AnalysisRecord,
    from_cache: bool,
    diagnostics: Vec<FileError>,
    committed: mpsc::UnboundedSender<FileReport>,
) {
    let report = commit_record(&ctx, analyzed, from_cache, diagnostics).await;
    let _ = committed.send(report);
}

async fn commit_record(
    ctx: &RunContext,
    analyzed: AnalysisRecord,
    from_cache: bool,
    diagnostics: Vec<FileError>,
) -> FileReport {
    let path = analyzed.path.clone();
    let outcome = if from_cache {
        FileOutcome::Cached
    } else {
        FileOutcome::Analyzed
    };
    let mut report = FileReport::new(&path, analyzed.kind, outcome);
    report.diagnostics = diagnostics;

    let linkage = ctx.graph.add_file(&analyzed);
    let record = analyzed.with_unresolved_dependencies(linkage.unresolved);

    if let Err(violations) = ctx.validator.validate(&record) {
        ctx.graph.add_stub(&path);
        tracing::warn!("{path}: failed validation ({} violations)", violations.len());
        report.outcome = FileOutcome::Failed;
        return report.with_diagnostic(FileError::new(
            FileErrorKind::ValidationFailed,
            violations.join("; "),
        ));
    }

    if let Err(err) = ctx.sink.write(&record).await {
        ctx.graph.add_stub(&path);
        tracing::warn!("{path}: {err}");
        report.outcome = FileOutcome::Failed;
        return report.with_diagnostic(FileError::new(FileErrorKind::WriteFailed, err.to_string()));
    }

    if !from_cache {
        if let Some(cache) = &ctx.cache {
            if let Err(err) = cache.put(&path, &analyzed.content_hash, &analyzed) {
                tracing::warn!("{path}: failed to cache result: {err}");
            }
        }
    }

    tracing::debug!("{path}: {outcome:?}, {} entities", record.entities.len());
    report.loc = record.loc;
    report.size_bytes = record.size_bytes;
    report.record_written = true;
    report
}
