// reflivtrace - core/filter.rs
//
// Composable filter engine for tracking records.
// All active filters are AND-combined.
// Core layer: pure logic, no I/O.

use crate::core::model::TrackingRecord;
use crate::util::error::FilterError;
use chrono::{DateTime, Utc};
use regex::Regex;

/// Complete filter state. All fields are AND-combined when applied.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Case-insensitive substring of the reference number. Empty = no filter.
    pub reference: String,

    /// Case-insensitive substring of the status. Empty = no filter.
    pub status: String,

    /// Source log file name (exact). None = all files.
    pub source_log_file: Option<String>,

    /// Start of time range (inclusive). None = no lower bound.
    pub time_start: Option<DateTime<Utc>>,

    /// End of time range (inclusive). None = no upper bound.
    pub time_end: Option<DateTime<Utc>>,

    /// Compiled regex matched against description and location.
    pub text_regex: Option<Regex>,
}

impl RecordFilter {
    /// Returns true if no filters are active.
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
            && self.status.is_empty()
            && self.source_log_file.is_none()
            && self.time_start.is_none()
            && self.time_end.is_none()
            && self.text_regex.is_none()
    }

    /// Set the text regex, compiling it. An empty pattern clears the filter.
    pub fn set_regex(&mut self, pattern: &str) -> Result<(), FilterError> {
        if pattern.is_empty() {
            self.text_regex = None;
            return Ok(());
        }
        let regex = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        self.text_regex = Some(regex);
        Ok(())
    }

    /// Apply the filter, returning the matching records in their original order.
    pub fn apply<'a>(&self, records: &'a [TrackingRecord]) -> Vec<&'a TrackingRecord> {
        if self.is_empty() {
            return records.iter().collect();
        }

        let reference_lower = self.reference.to_lowercase();
        let status_lower = self.status.to_lowercase();

        records
            .iter()
            .filter(|r| self.matches_all(r, &reference_lower, &status_lower))
            .collect()
    }

    fn matches_all(&self, record: &TrackingRecord, reference_lower: &str, status_lower: &str) -> bool {
        if !reference_lower.is_empty()
            && !record.reference_number.to_lowercase().contains(reference_lower)
        {
            return false;
        }

        if !status_lower.is_empty() && !record.status.to_lowercase().contains(status_lower) {
            return false;
        }

        if let Some(ref file) = self.source_log_file {
            if record.source_log_file != *file {
                return false;
            }
        }

        if matches!(self.time_start, Some(start) if record.timestamp < start) {
            return false;
        }
        if matches!(self.time_end, Some(end) if record.timestamp > end) {
            return false;
        }

        if let Some(ref regex) = self.text_regex {
            let description = record.description.as_deref().unwrap_or("");
            let location = record.location.as_deref().unwrap_or("");
            if !regex.is_match(description) && !regex.is_match(location) {
                return false;
            }
        }

        true
    }
}
