// reflivtrace - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "reflivtrace";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "reflivtrace";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Parsing limits
// =============================================================================

/// Number of lines after a REFLIV call marker searched for the XML response.
/// The window also ends early at the next call marker.
pub const DEFAULT_WINDOW_LINES: usize = 100;

/// Minimum user-configurable window size (lines).
pub const MIN_WINDOW_LINES: usize = 1;

/// Maximum user-configurable window size (lines).
pub const MAX_WINDOW_LINES: usize = 10_000;

/// Root element names recognised as the start of a tracking response fragment.
pub const DEFAULT_ROOT_ELEMENTS: &[&str] = &["TrackingResponse", "root"];

/// Maximum number of malformed-fragment errors retained per file.
/// Further failures are still counted, only their messages are dropped.
pub const MAX_FRAGMENT_ERRORS_PER_FILE: usize = 1_000;

/// Number of fragment error messages quoted in `ProcessingOutcome::error_message`.
pub const ERROR_MESSAGE_DETAIL_COUNT: usize = 3;

/// Maximum characters of a failed fragment echoed to debug logs.
pub const FRAGMENT_LOG_PREVIEW_CHARS: usize = 200;

/// References listed in `StatusSummary::top_references`.
pub const TOP_REFERENCES_COUNT: usize = 10;

// =============================================================================
// Ingest limits
// =============================================================================

/// Default maximum size of an ingested log file (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Hard upper bound on the configurable file size limit (1 GiB).
pub const ABSOLUTE_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// File extensions accepted for ingestion (case-insensitive).
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["txt", "log"];

/// Retry limits for transient I/O errors while reading a log file.
pub const MAX_READ_RETRIES: u32 = 3;

/// Backoff between read attempts (ms), indexed by the failed attempt.
/// The final attempt is not followed by a delay.
pub const READ_RETRY_DELAYS_MS: [u64; 2] = [50, 100];

// =============================================================================
// Configuration
// =============================================================================

/// Config file name, looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default log level when neither RUST_LOG, --debug, nor config set one.
pub const DEFAULT_LOG_LEVEL: &str = "info";
