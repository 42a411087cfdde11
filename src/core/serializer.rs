use dashmap::DashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::record::AnalysisRecord;
use crate::error::{PipelineError, SerializeError};

const STREAM_EXTENSION: &str = "jsonl";
const PARTIAL_SUFFIX: &str = ".partial";

/// Output stream name for a module: `""` ⇒ `root`, `src/app` ⇒ `src__app`,
/// anything outside `[A-Za-z0-9._-]` ⇒ `_`.
pub fn stream_name(module: &str) -> String {
    if module.is_empty() {
        return "root".to_string();
    }
    module
        .split('/')
        .map(|segment| {
            segment
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("__")
}

struct Stream {
    name: String,
    /// `None` once finalized.
    file: Option<tokio::fs::File>,
    partial_path: PathBuf,
    final_path: PathBuf,
    records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedStream {
    pub name: String,
    pub path: PathBuf,
    pub records: usize,
}

/// A stream that could not be moved into place; its records stay in the
/// `.partial` file.
#[derive(Debug)]
pub struct FailedStream {
    pub name: String,
    pub error: SerializeError,
}

#[derive(Debug, Default)]
pub struct SinkReport {
    pub streams: Vec<FinishedStream>,
    pub errors: Vec<FailedStream>,
}

impl SinkReport {
    pub fn records_written(&self) -> usize {
        self.streams.iter().map(|s| s.records).sum()
    }
}

/// Module-scoped JSON Lines writer.
///
/// Each stream is written to `<name>.jsonl.partial` and only appears as
/// `<name>.jsonl` after [`RecordSink::finish`]. A line is encoded in full before
/// the stream lock is taken, so concurrent writers never interleave.
pub struct RecordSink {
    dir: PathBuf,
    streams: DashMap<String, Arc<Mutex<Stream>>>,
}

impl RecordSink {
    /// Prepares `dir` for output. Streams left by an earlier run are removed.
    pub fn open(dir: &Path) -> Result<Self, PipelineError> {
        let unavailable = |source| PipelineError::OutputUnavailable {
            path: dir.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(unavailable)?;
        tempfile::tempfile_in(dir).map_err(unavailable)?;

        for entry in std::fs::read_dir(dir).map_err(unavailable)?.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_stream = name.ends_with(&format!(".{STREAM_EXTENSION}"))
                || name.ends_with(&format!(".{STREAM_EXTENSION}{PARTIAL_SUFFIX}"));
            if is_stream && path.is_file() {
                tracing::debug!("Removing stale stream {}", path.display());
                std::fs::remove_file(&path).map_err(unavailable)?;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            streams: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stream(&self, name: &str) -> Result<Arc<Mutex<Stream>>, SerializeError> {
        if let Some(stream) = self.streams.get(name) {
            return Ok(stream.clone());
        }

        let entry = self
            .streams
            .entry(name.to_string())
            .or_try_insert_with(|| {
                let final_path = self.dir.join(format!("{name}.{STREAM_EXTENSION}"));
                let partial_path = self
                    .dir
                    .join(format!("{name}.{STREAM_EXTENSION}{PARTIAL_SUFFIX}"));
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&partial_path)
                    .map_err(|source| SerializeError::Open {
                        path: partial_path.clone(),
                        source,
                    })?;
                Ok::<_, SerializeError>(Arc::new(Mutex::new(Stream {
                    name: name.to_string(),
                    file: Some(tokio::fs::File::from_std(file)),
                    partial_path,
                    final_path,
                    records: 0,
                })))
            })?;
        Ok(entry.value().clone())
    }

    /// Appends one record to its module's stream.
    pub async fn write(&self, record: &AnalysisRecord) -> Result<(), SerializeError> {
        let name = stream_name(&record.module);
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let stream = self.stream(&name)?;
        let mut stream = stream.lock().await;
        let file = stream
            .file
            .as_mut()
            .ok_or_else(|| SerializeError::Finalized(name.clone()))?;

        let written = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;
        written.map_err(|source| SerializeError::Write {
            stream: name.clone(),
            source,
        })?;

        stream.records += 1;
        Ok(())
    }

    /// Flushes, syncs and renames every open stream into place. A failing stream
    /// does not stop the others.
    pub async fn finish(&self) -> SinkReport {
        let mut streams: Vec<_> = self
            .streams
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        streams.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = SinkReport::default();
        for (_, stream) in streams {
            let mut stream = stream.lock().await;
            let Some(mut file) = stream.file.take() else {
                continue;
            };

            let finalized = async {
                file.flush().await?;
                file.sync_all().await?;
                drop(file);
                tokio::fs::rename(&stream.partial_path, &stream.final_path).await
            }
            .await;

            match finalized {
                Ok(()) => report.streams.push(FinishedStream {
                    name: stream.name.clone(),
                    path: stream.final_path.clone(),
                    records: stream.records,
                }),
                Err(source) => {
                    tracing::warn!("Failed to finalize stream {}: {source}", stream.name);
                    report.errors.push(FailedStream {
                        name: stream.name.clone(),
                        error: SerializeError::Write {
                            stream: stream.name.clone(),
                            source,
                        },
                    });
                }
            }
        }
        report
    }
}

/// Re-reads a finalized stream and checks that every line is a record.
/// Returns the number of records.
pub fn verify_stream(path: &Path) -> Result<usize, SerializeError> {
    let file = std::fs::File::open(path).map_err(|source| SerializeError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|err| SerializeError::Invalid {
            path: path.to_path_buf(),
            line: index + 1,
            reason: err.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        serde_json::from_str::<AnalysisRecord>(&line).map_err(|err| SerializeError::Invalid {
            path: path.to_path_buf(),
            line: index + 1,
            reason: err.to_string(),
        })?;
        records += 1;
    }
    Ok(records)
}
