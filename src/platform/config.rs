// reflivtrace - platform/config.rs
//
// Platform-specific configuration directory resolution and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::app::ingest::IngestConfig;
use crate::core::parser::ParseConfig;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for reflivtrace configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/reflivtrace/ or %APPDATA%\reflivtrace\config\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[parsing]` section.
    pub parsing: ParsingSection,
    /// `[ingest]` section.
    pub ingest: IngestSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[parsing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// Lines searched after each call marker.
    pub window_lines: Option<usize>,
    /// Response root element names.
    pub root_elements: Option<Vec<String>>,
    /// Malformed-fragment errors kept per file.
    pub max_fragment_errors: Option<usize>,
}

/// `[ingest]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Maximum accepted file size in bytes.
    pub max_file_size_bytes: Option<u64>,
    /// Accepted file extensions.
    pub allowed_extensions: Option<Vec<String>>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce warnings and fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub parse: ParseConfig,
    pub ingest: IngestConfig,
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

/// Read and deserialise a config file without validating values.
pub fn read_raw_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load and validate the config file at `path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings. An unreadable or
/// unparseable file yields defaults with one warning.
pub fn load_config(path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let raw = match read_raw_config(path) {
        Ok(raw) => raw,
        Err(e) => {
            warnings.push(format!("{e}. Using defaults."));
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %path.display(), "Loaded config.toml");

    let config = validate(raw, &mut warnings);
    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }
    (config, warnings)
}

/// Load a config file the user named explicitly.
///
/// Unlike `load_config`, a missing or unparseable file is an error rather
/// than a silent fallback. Out-of-range values still only produce warnings.
pub fn load_explicit_config(path: &Path) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let raw = read_raw_config(path)?;
    tracing::info!(path = %path.display(), "Loaded config.toml");
    let mut warnings = Vec::new();
    let config = validate(raw, &mut warnings);
    Ok((config, warnings))
}

/// Validate each field, accumulating a warning per rejected value.
pub fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    let mut reject = |field: &str, value: String, expected: String| {
        warnings.push(format!(
            "{}. Using default.",
            ConfigError::ValueOutOfRange {
                field: field.to_string(),
                value,
                expected,
            }
        ));
    };

    // -- Parsing: window_lines --
    if let Some(lines) = raw.parsing.window_lines {
        if (constants::MIN_WINDOW_LINES..=constants::MAX_WINDOW_LINES).contains(&lines) {
            config.parse.window_lines = lines;
        } else {
            reject(
                "parsing.window_lines",
                lines.to_string(),
                format!(
                    "{}-{}",
                    constants::MIN_WINDOW_LINES,
                    constants::MAX_WINDOW_LINES
                ),
            );
        }
    }

    // -- Parsing: root_elements --
    if let Some(names) = raw.parsing.root_elements {
        if !names.is_empty() && names.iter().all(|n| is_xml_name(n)) {
            config.parse.root_elements = names;
        } else {
            reject(
                "parsing.root_elements",
                format!("{names:?}"),
                "a non-empty list of XML element names".to_string(),
            );
        }
    }

    // -- Parsing: max_fragment_errors --
    if let Some(max) = raw.parsing.max_fragment_errors {
        if (1..=constants::MAX_FRAGMENT_ERRORS_PER_FILE).contains(&max) {
            config.parse.max_fragment_errors = max;
        } else {
            reject(
                "parsing.max_fragment_errors",
                max.to_string(),
                format!("1-{}", constants::MAX_FRAGMENT_ERRORS_PER_FILE),
            );
        }
    }

    // -- Ingest: max_file_size_bytes --
    if let Some(size) = raw.ingest.max_file_size_bytes {
        if (1..=constants::ABSOLUTE_MAX_FILE_SIZE).contains(&size) {
            config.ingest.max_file_size = size;
        } else {
            reject(
                "ingest.max_file_size_bytes",
                size.to_string(),
                format!("1-{}", constants::ABSOLUTE_MAX_FILE_SIZE),
            );
        }
    }

    // -- Ingest: allowed_extensions --
    if let Some(exts) = raw.ingest.allowed_extensions {
        let normalised: Vec<String> = exts
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .collect();
        if !normalised.is_empty() && normalised.iter().all(|e| !e.is_empty()) {
            config.ingest.allowed_extensions = normalised;
        } else {
            reject(
                "ingest.allowed_extensions",
                format!("{exts:?}"),
                "a non-empty list of extensions".to_string(),
            );
        }
    }

    // -- Logging: level --
    if let Some(level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            reject(
                "logging.level",
                level,
                "error, warn, info, debug, trace".to_string(),
            );
        }
    }

    config
}

/// Conservative XML element name check: a letter or underscore followed by
/// letters, digits, `_`, `-`, or `.`.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
