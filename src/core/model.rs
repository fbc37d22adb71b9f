// reflivtrace - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use crate::util::constants;
use crate::util::error::ParseError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Tracking record (normalised output of parsing)
// =============================================================================

/// A single shipment status event extracted from a REFLIV XML response.
///
/// Every record that leaves the parser has a non-empty `reference_number`,
/// a non-empty `status`, and a parsed `timestamp`. Events missing any of
/// these are dropped rather than emitted with placeholder values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingRecord {
    /// Primary shipment identifier correlating events.
    pub reference_number: String,

    /// Sub-identifier for an individual package within the shipment.
    pub shipping_unit_reference: Option<String>,

    /// Tracking status code or label, verbatim from the XML including any
    /// surrounding whitespace. Never blank.
    pub status: String,

    /// Free-text status description.
    pub description: Option<String>,

    /// Event time, normalised to UTC.
    pub timestamp: DateTime<Utc>,

    /// Where the event happened.
    pub location: Option<String>,

    /// Name of the log file the record came from.
    pub source_log_file: String,

    /// Timestamp prefix of the log line carrying the call marker, if any.
    pub log_timestamp: Option<DateTime<Utc>>,

    /// 1-based line number of the call marker.
    pub line_number: u64,
}

// =============================================================================
// Processing outcome
// =============================================================================

/// Per-file processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// No XML fragment failed to parse.
    #[default]
    Success,

    /// Some records were extracted but at least one fragment failed.
    Partial,

    /// No records were extracted and at least one fragment failed.
    Failed,
}

impl OutcomeStatus {
    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Partial => "partial",
            OutcomeStatus::Failed => "failed",
        }
    }

    /// Derive the status from the record and failure counts.
    pub fn from_counts(records_extracted: usize, fragments_failed: usize) -> Self {
        match (records_extracted, fragments_failed) {
            (_, 0) => OutcomeStatus::Success,
            (0, _) => OutcomeStatus::Failed,
            _ => OutcomeStatus::Partial,
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Summary of one parse call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ProcessingOutcome {
    /// Number of records emitted.
    pub records_extracted: usize,

    pub status: OutcomeStatus,

    /// Present exactly when `status` is `Partial` or `Failed`.
    pub error_message: Option<String>,

    /// REFLIV call markers found in the text.
    pub markers_found: usize,

    /// Markers skipped for lack of an identifier or a following response.
    pub markers_skipped: usize,

    /// XML fragments that parsed successfully.
    pub fragments_parsed: usize,

    /// XML fragments that were not well-formed.
    pub fragments_failed: usize,

    /// Status events dropped for missing required fields.
    pub records_dropped: usize,

    /// Status events repeating an earlier (reference, status, timestamp)
    /// in the same file.
    pub records_duplicate: usize,
}

/// Result of parsing a single log file.
#[derive(Debug)]
pub struct ParseResult {
    /// Successfully extracted records, in file order.
    pub records: Vec<TrackingRecord>,

    pub outcome: ProcessingOutcome,

    /// Malformed-fragment errors (capped at `max_fragment_errors`).
    pub fragment_errors: Vec<ParseError>,
}

impl ParseResult {
    /// Split into the `(records, outcome)` pair handed to persistence.
    pub fn into_parts(self) -> (Vec<TrackingRecord>, ProcessingOutcome) {
        (self.records, self.outcome)
    }
}

// =============================================================================
// Status summary
// =============================================================================

/// Aggregate statistics over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total_records: usize,

    /// Record count per status label, sorted by label.
    pub by_status: BTreeMap<String, usize>,

    /// Distinct reference numbers seen.
    pub references: BTreeSet<String>,

    /// Earliest event timestamp.
    pub earliest: Option<DateTime<Utc>>,

    /// Latest event timestamp.
    pub latest: Option<DateTime<Utc>>,

    /// Most active references, by event count descending, then reference.
    /// At most `TOP_REFERENCES_COUNT` entries.
    pub top_references: Vec<ReferenceActivity>,
}

/// Event count and most recent event of one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceActivity {
    pub reference_number: String,
    pub events: usize,
    pub last_update: DateTime<Utc>,
}

impl StatusSummary {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a TrackingRecord>,
    {
        let mut summary = StatusSummary::default();
        let mut activity: BTreeMap<&'a str, (usize, DateTime<Utc>)> = BTreeMap::new();

        for record in records {
            summary.total_records += 1;
            *summary.by_status.entry(record.status.clone()).or_insert(0) += 1;
            summary.references.insert(record.reference_number.clone());
            summary.earliest = Some(match summary.earliest {
                Some(t) if t <= record.timestamp => t,
                _ => record.timestamp,
            });
            summary.latest = Some(match summary.latest {
                Some(t) if t >= record.timestamp => t,
                _ => record.timestamp,
            });

            let entry = activity
                .entry(record.reference_number.as_str())
                .or_insert((0, record.timestamp));
            entry.0 += 1;
            entry.1 = entry.1.max(record.timestamp);
        }

        let mut top: Vec<ReferenceActivity> = activity
            .into_iter()
            .map(|(reference, (events, last_update))| ReferenceActivity {
                reference_number: reference.to_string(),
                events,
                last_update,
            })
            .collect();
        // Stable sort keeps the BTreeMap's reference order among ties.
        top.sort_by(|a, b| b.events.cmp(&a.events));
        top.truncate(constants::TOP_REFERENCES_COUNT);
        summary.top_references = top;

        summary
    }
}

// =============================================================================
// Reference timeline
// =============================================================================

/// All events of one reference, grouped by shipping unit, newest first.
///
/// Events without a shipping unit reference are grouped under
/// `MAIN_UNIT_KEY`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceTimeline {
    pub reference_number: String,
    pub units: BTreeMap<String, Vec<TrackingRecord>>,
}

impl ReferenceTimeline {
    /// Group key for events that carry no shipping unit reference.
    pub const MAIN_UNIT_KEY: &'static str = "main";

    /// Collect the events of `reference_number` from `records`.
    pub fn group_by_unit<'a, I>(reference_number: &str, records: I) -> Self
    where
        I: IntoIterator<Item = &'a TrackingRecord>,
    {
        let mut units: BTreeMap<String, Vec<TrackingRecord>> = BTreeMap::new();
        for record in records
            .into_iter()
            .filter(|r| r.reference_number == reference_number)
        {
            let key = record
                .shipping_unit_reference
                .as_deref()
                .unwrap_or(Self::MAIN_UNIT_KEY);
            units.entry(key.to_string()).or_default().push(record.clone());
        }
        for events in units.values_mut() {
            events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        Self {
            reference_number: reference_number.to_string(),
            units,
        }
    }

    /// Total number of events across all units.
    pub fn len(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Order records by event timestamp, newest first. Ties keep their order.
pub fn sort_newest_first(records: &mut [&TrackingRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
