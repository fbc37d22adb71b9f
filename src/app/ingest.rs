// reflivtrace - app/ingest.rs
//
// File ingestion: the caller side of the parser. Validates a log file,
// reads it, and hands its bytes to `LogParser` exactly once per file name.
//
// Rules:
//   - Only allowed extensions are accepted (txt, log by default).
//   - Files over the size limit are rejected before reading.
//   - A file name is processed at most once per `Ingestor`. The name is
//     recorded as soon as a parse is attempted, so a file whose content
//     turns out to be undecodable is not retried either.
//   - Transient I/O errors are retried with capped backoff; permanent errors
//     are returned immediately and leave the name unrecorded.

use crate::core::model::{ProcessingOutcome, TrackingRecord};
use crate::core::parser::LogParser;
use crate::util::constants;
use crate::util::error::IngestError;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Limits applied before a file reaches the parser.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum file size in bytes.
    pub max_file_size: u64,
    /// Accepted extensions, lowercase, without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: constants::DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: constants::DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Everything produced by ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub size: u64,
    pub records: Vec<TrackingRecord>,
    pub outcome: ProcessingOutcome,
}

/// Ingests log files through a shared parser, rejecting duplicates.
#[derive(Debug)]
pub struct Ingestor {
    parser: LogParser,
    config: IngestConfig,
    processed: HashSet<String>,
}

impl Ingestor {
    pub fn new(parser: LogParser, config: IngestConfig) -> Self {
        Self {
            parser,
            config,
            processed: HashSet::new(),
        }
    }

    /// Whether a file with this name has already been through the parser.
    pub fn is_processed(&self, file_name: &str) -> bool {
        self.processed.contains(file_name)
    }

    /// Number of distinct files parsed so far.
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Validate, read, and parse the file at `path`.
    pub fn ingest_path(&mut self, path: &Path) -> Result<FileReport, IngestError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| IngestError::InvalidFileName {
                path: path.to_path_buf(),
            })?
            .to_string();

        self.check_extension(path)?;
        self.check_not_processed(&file_name)?;

        let size = std::fs::metadata(path)
            .map_err(|e| IngestError::Io {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();
        self.check_size(path, size)?;

        let bytes = read_file_with_retry(path).map_err(|e| IngestError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.ingest_bytes(&file_name, &bytes)
    }

    /// Parse already-read content under `file_name` (e.g. an upload body).
    ///
    /// Applies the duplicate and size checks but not the extension check,
    /// which belongs to paths.
    pub fn ingest_bytes(&mut self, file_name: &str, bytes: &[u8]) -> Result<FileReport, IngestError> {
        self.check_not_processed(file_name)?;
        let size = bytes.len() as u64;
        self.check_size(&PathBuf::from(file_name), size)?;

        if !file_name.trim().is_empty() {
            self.processed.insert(file_name.to_string());
        }
        let result = self.parser.parse_bytes(bytes, file_name)?;

        tracing::info!(
            file = file_name,
            size,
            records = result.outcome.records_extracted,
            status = %result.outcome.status,
            "File processed"
        );
        if let Some(ref msg) = result.outcome.error_message {
            tracing::warn!(file = file_name, error = %msg, "File processed with errors");
        }

        let (records, outcome) = result.into_parts();
        Ok(FileReport {
            file_name: file_name.to_string(),
            size,
            records,
            outcome,
        })
    }

    fn check_extension(&self, path: &Path) -> Result<(), IngestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext {
            Some(ext) if self.config.allowed_extensions.iter().any(|a| *a == ext) => Ok(()),
            _ => Err(IngestError::UnsupportedExtension {
                path: path.to_path_buf(),
                allowed: self.config.allowed_extensions.clone(),
            }),
        }
    }

    fn check_not_processed(&self, file_name: &str) -> Result<(), IngestError> {
        if self.is_processed(file_name) {
            tracing::warn!(file = file_name, "File already processed; skipped");
            return Err(IngestError::AlreadyProcessed {
                file_name: file_name.to_string(),
            });
        }
        Ok(())
    }

    fn check_size(&self, path: &Path, size: u64) -> Result<(), IngestError> {
        if size > self.config.max_file_size {
            return Err(IngestError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                max_size: self.config.max_file_size,
            });
        }
        Ok(())
    }
}

/// Read a file with transient-error retries.
fn read_file_with_retry(path: &Path) -> io::Result<Vec<u8>> {
    with_retry(path, || std::fs::read(path))
}

/// Run `op` up to `MAX_READ_RETRIES` times while it fails transiently,
/// backing off between attempts. No delay follows the final attempt.
fn with_retry<T>(path: &Path, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let attempts = constants::MAX_READ_RETRIES as usize;
    let mut last_err: Option<io::Error> = None;

    for attempt in 0..attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient_error(&e) => {
                tracing::debug!(
                    file = %path.display(),
                    attempt = attempt + 1,
                    error = %e,
                    "Transient I/O error"
                );
                if attempt + 1 < attempts {
                    let delay_ms = constants::READ_RETRY_DELAYS_MS
                        .get(attempt)
                        .copied()
                        .unwrap_or_default();
                    std::thread::sleep(Duration::from_millis(delay_ms));
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("Unknown read error")))
}

/// Returns true for transient I/O errors that are worth retrying.
fn is_transient_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}
