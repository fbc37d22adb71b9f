// reflivtrace - core/parser.rs
//
// REFLIV call extraction from application log text.
// Core layer: accepts already-read content, never touches the filesystem.
//
// Pipeline, single pass over the text:
//   1. Find every REFLIV call marker (tracking URL or "Call for REFLIV" line).
//   2. Capture the shipment reference from the marker.
//   3. Look for a response root element between the marker and the earlier of
//      the next marker or `window_lines` lines later.
//   4. Parse the fragment and turn each status event into a TrackingRecord.
//   5. Skip events repeating an earlier (reference, status, timestamp) of
//      the same file, so a response logged twice is reported once.

use crate::core::model::{OutcomeStatus, ParseResult, ProcessingOutcome, TrackingRecord};
use crate::core::response::{self, ResponseEvent};
use crate::util::constants;
use crate::util::error::ParseError;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Configuration for parsing operations.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Lines after a call marker searched for the response fragment.
    pub window_lines: usize,
    /// Root element names that open a response fragment.
    pub root_elements: Vec<String>,
    /// Cap on retained malformed-fragment errors per file.
    pub max_fragment_errors: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            window_lines: constants::DEFAULT_WINDOW_LINES,
            root_elements: constants::DEFAULT_ROOT_ELEMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_fragment_errors: constants::MAX_FRAGMENT_ERRORS_PER_FILE,
        }
    }
}

/// A REFLIV call marker located in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CallMarker {
    /// Byte offset where the marker starts.
    start: usize,
    /// Byte offset just past the marker.
    end: usize,
    /// Captured reference, if the marker carried one.
    reference: Option<String>,
}

/// An opening root tag found in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenTag<'a> {
    /// Byte offset of the `<`.
    start: usize,
    /// Byte offset just past the closing `>` of the tag.
    end: usize,
    self_closing: bool,
    /// Element name as written, including any namespace prefix.
    qualified_name: &'a str,
}

/// A response fragment located after a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FragmentSpan {
    start: usize,
    end: usize,
}

/// Extracts tracking records from REFLIV log content.
///
/// The parser holds only immutable configuration, so one instance can be
/// shared freely across threads and calls.
#[derive(Debug, Clone, Default)]
pub struct LogParser {
    config: ParseConfig,
}

impl LogParser {
    pub fn new(config: ParseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    /// Decode `bytes` as UTF-8 (a leading BOM is ignored) and parse them.
    ///
    /// Invalid UTF-8 is a hard error: no partial result is meaningful when
    /// the text itself cannot be trusted.
    pub fn parse_bytes(&self, bytes: &[u8], file_name: &str) -> Result<ParseResult, ParseError> {
        if file_name.trim().is_empty() {
            return Err(ParseError::EmptyFileName);
        }
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let content = std::str::from_utf8(bytes).map_err(|e| ParseError::InvalidEncoding {
            file: file_name.to_string(),
            source: e,
        })?;
        self.parse(content, file_name)
    }

    /// Parse one log file's content.
    ///
    /// Malformed XML, markers without a reference, and markers without a
    /// response never fail the call; they are reflected in the returned
    /// outcome. Only an empty `file_name` is rejected.
    pub fn parse(&self, content: &str, file_name: &str) -> Result<ParseResult, ParseError> {
        if file_name.trim().is_empty() {
            return Err(ParseError::EmptyFileName);
        }

        tracing::debug!(file = file_name, bytes = content.len(), "Parsing started");

        let markers = find_markers(content);
        let lines = LineIndex::new(content);

        let mut records = Vec::new();
        let mut fragment_errors = Vec::new();
        let mut outcome = ProcessingOutcome {
            markers_found: markers.len(),
            ..ProcessingOutcome::default()
        };
        let mut first_errors: Vec<String> = Vec::new();
        // (reference, status, timestamp) already emitted for this file.
        let mut seen: HashSet<(String, String, DateTime<Utc>)> = HashSet::new();

        // Markers that fall inside an already-consumed fragment (e.g. a URL
        // echoed in the XML body) are not calls of their own.
        let mut consumed_until = 0usize;

        for (idx, marker) in markers.iter().enumerate() {
            if marker.start < consumed_until {
                outcome.markers_found -= 1;
                continue;
            }

            let line_number = lines.line_number(marker.start);

            let Some(marker_ref) = marker.reference.as_deref() else {
                tracing::debug!(
                    file = file_name,
                    line = line_number,
                    "Call marker without reference; skipped"
                );
                outcome.markers_skipped += 1;
                continue;
            };

            let next_marker = markers[idx + 1..]
                .iter()
                .map(|m| m.start)
                .find(|&s| s >= marker.end)
                .unwrap_or(content.len());

            let Some(span) = self.locate_fragment(content, marker.end, next_marker) else {
                tracing::debug!(
                    file = file_name,
                    line = line_number,
                    reference = marker_ref,
                    "No response fragment within window; skipped"
                );
                outcome.markers_skipped += 1;
                continue;
            };
            consumed_until = span.end;

            let xml = clean_fragment(&content[span.start..span.end]);
            let events = match response::extract_events(&xml) {
                Ok(events) => events,
                Err(e) => {
                    outcome.fragments_failed += 1;
                    tracing::warn!(
                        file = file_name,
                        line = line_number,
                        reference = marker_ref,
                        error = %e,
                        "Malformed XML response fragment"
                    );
                    tracing::debug!(
                        preview = %preview(&xml),
                        "Failed fragment content"
                    );
                    let err = ParseError::MalformedFragment {
                        file: file_name.to_string(),
                        line_number,
                        reference: marker_ref.to_string(),
                        source: e,
                    };
                    if first_errors.len() < constants::ERROR_MESSAGE_DETAIL_COUNT {
                        first_errors.push(err.to_string());
                    }
                    if fragment_errors.len() < self.config.max_fragment_errors {
                        fragment_errors.push(err);
                    }
                    continue;
                }
            };
            outcome.fragments_parsed += 1;

            let log_timestamp = line_timestamp(lines.line_at(content, marker.start));

            for event in events {
                let Some(record) =
                    build_record(event, marker_ref, file_name, log_timestamp, line_number)
                else {
                    outcome.records_dropped += 1;
                    continue;
                };
                let key = (
                    record.reference_number.clone(),
                    record.status.clone(),
                    record.timestamp,
                );
                if seen.insert(key) {
                    records.push(record);
                } else {
                    tracing::debug!(
                        file = file_name,
                        line = line_number,
                        reference = %record.reference_number,
                        status = %record.status,
                        "Duplicate status event; skipped"
                    );
                    outcome.records_duplicate += 1;
                }
            }
        }

        outcome.records_extracted = records.len();
        outcome.status = OutcomeStatus::from_counts(records.len(), outcome.fragments_failed);
        if outcome.status != OutcomeStatus::Success {
            let attempted = outcome.fragments_parsed + outcome.fragments_failed;
            outcome.error_message = Some(format!(
                "{} of {attempted} XML response fragment(s) could not be parsed: {}",
                outcome.fragments_failed,
                first_errors.join("; ")
            ));
        }

        tracing::debug!(
            file = file_name,
            markers = outcome.markers_found,
            records = outcome.records_extracted,
            dropped = outcome.records_dropped,
            duplicates = outcome.records_duplicate,
            failed_fragments = outcome.fragments_failed,
            status = %outcome.status,
            "Parsing complete"
        );

        Ok(ParseResult {
            records,
            outcome,
            fragment_errors,
        })
    }

    /// Find the first complete response fragment after `from`.
    ///
    /// The opening tag must start before `next_marker` and inside the line
    /// window. The closing tag must fall inside the line window. It may lie
    /// past `next_marker` only while no other response opens after that
    /// marker, which covers tracking URLs echoed inside the XML body. A
    /// response cut off before the next call is therefore a missing response.
    fn locate_fragment(&self, content: &str, from: usize, next_marker: usize) -> Option<FragmentSpan> {
        let window_end = window_end(content, from, self.config.window_lines);
        let window = &content[from..window_end];
        let open_limit = next_marker.min(window_end) - from;

        let open = self
            .config
            .root_elements
            .iter()
            .filter_map(|name| find_open_tag(window, name))
            .min_by_key(|tag| tag.start)?;

        if open.start >= open_limit {
            return None;
        }
        if open.self_closing {
            return Some(FragmentSpan {
                start: from + open.start,
                end: from + open.end,
            });
        }

        let close_tag = format!("</{}>", open.qualified_name);
        let close_at = from + open.end + window[open.end..].find(&close_tag)?;

        if close_at > next_marker {
            let after_next = &content[next_marker..close_at];
            if self
                .config
                .root_elements
                .iter()
                .any(|name| find_open_tag(after_next, name).is_some())
            {
                return None;
            }
        }

        Some(FragmentSpan {
            start: from + open.start,
            end: close_at + close_tag.len(),
        })
    }
}

// =============================================================================
// Marker detection
// =============================================================================

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Pattern is covered by the unit tests below.
        Regex::new(concat!(
            r#"(?P<url>https?://[^\s"'<>]*?/tracking/shipment(?:/[^\s"'<>?#]*)?(?:\?[^\s"'<>]*)?)"#,
            r"|Call for REFLIV\b(?:\s+(?:<(?P<bracketed>[^<>\s]+)>|(?P<bare>[A-Za-z]\d{10})\b))?",
        ))
        .expect("marker_regex: invalid regex")
    })
}

/// Reference captured from inside a tracking URL.
///
/// A segment after `/tracking/shipment/` names the shipment directly and
/// wins over a `/clients/<id>/` segment.
fn url_reference(url: &str) -> Option<String> {
    static SHIPMENT: OnceLock<Regex> = OnceLock::new();
    static CLIENT: OnceLock<Regex> = OnceLock::new();
    let shipment = SHIPMENT.get_or_init(|| {
        Regex::new(r"/tracking/shipment/(?P<id>[^/?#]+)").expect("url_reference: invalid regex")
    });
    let client = CLIENT.get_or_init(|| {
        Regex::new(r"/clients/(?P<id>[^/?#]+)/").expect("url_reference: invalid regex")
    });

    shipment
        .captures(url)
        .or_else(|| client.captures(url))
        .and_then(|c| c.name("id"))
        .map(|m| m.as_str().to_string())
}

fn find_markers(content: &str) -> Vec<CallMarker> {
    marker_regex()
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let reference = if let Some(url) = caps.name("url") {
                url_reference(url.as_str())
            } else {
                caps.name("bracketed")
                    .or_else(|| caps.name("bare"))
                    .map(|m| m.as_str().to_string())
            };
            Some(CallMarker {
                start: whole.start(),
                end: whole.end(),
                reference,
            })
        })
        .collect()
}

// =============================================================================
// Fragment location and cleanup
// =============================================================================

/// Byte offset where the search window starting at `from` ends: the rest of
/// the marker line plus `window_lines` further lines.
fn window_end(content: &str, from: usize, window_lines: usize) -> usize {
    content[from..]
        .match_indices('\n')
        .nth(window_lines)
        .map(|(i, _)| from + i)
        .unwrap_or(content.len())
}

/// Find `<name` or `<prefix:name` followed by `>`, `/>`, or attributes.
fn find_open_tag<'a>(haystack: &'a str, name: &str) -> Option<OpenTag<'a>> {
    let mut search_from = 0;
    while let Some(rel) = haystack[search_from..].find(name) {
        let name_at = search_from + rel;
        let name_end = name_at + name.len();
        search_from = name_end;

        let Some(start) = tag_start(haystack, name_at) else {
            continue;
        };
        match haystack[name_end..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {
                let close = haystack[name_end..].find('>')? + name_end;
                return Some(OpenTag {
                    start,
                    end: close + 1,
                    self_closing: haystack[..close].ends_with('/'),
                    qualified_name: &haystack[start + 1..name_end],
                });
            }
            _ => {}
        }
    }
    None
}

/// Offset of the `<` opening a tag whose local name begins at `name_at`,
/// allowing a namespace prefix in between.
fn tag_start(haystack: &str, name_at: usize) -> Option<usize> {
    let before = &haystack[..name_at];
    if before.ends_with('<') {
        return Some(name_at - 1);
    }
    let prefixed = before.strip_suffix(':')?;
    let prefix_len = prefixed
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
        .count();
    let prefix_start = prefixed.len() - prefix_len;
    (prefix_len > 0 && prefixed[..prefix_start].ends_with('<')).then(|| prefix_start - 1)
}

fn log_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?[^<]*? - \[[^\]]*\] ?")
            .expect("log_prefix_regex: invalid regex")
    })
}

/// Remove log-line prefixes from the continuation lines of a multi-line
/// fragment and drop blank lines.
///
/// `2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main] <title>..`
/// becomes `<title>..`.
fn clean_fragment(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            let line = line.trim();
            match log_prefix_regex().find(line) {
                Some(m) => line[m.end()..].trim(),
                None => line,
            }
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(xml: &str) -> String {
    xml.chars().take(constants::FRAGMENT_LOG_PREVIEW_CHARS).collect()
}

// =============================================================================
// Line bookkeeping
// =============================================================================

/// Newline offsets, for mapping byte offsets to line numbers.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        Self {
            newlines: content.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    /// 1-based line number containing `offset`.
    fn line_number(&self, offset: usize) -> u64 {
        (self.newlines.partition_point(|&nl| nl < offset) as u64) + 1
    }

    /// Full text of the line containing `offset`.
    fn line_at<'a>(&self, content: &'a str, offset: usize) -> &'a str {
        let idx = self.newlines.partition_point(|&nl| nl < offset);
        let start = if idx == 0 { 0 } else { self.newlines[idx - 1] + 1 };
        let end = self.newlines.get(idx).copied().unwrap_or(content.len());
        &content[start..end]
    }
}

// =============================================================================
// Record construction
// =============================================================================

/// Validate one event and build its record.
///
/// Returns `None` when the reference, status, or timestamp is missing or the
/// timestamp does not parse.
fn build_record(
    event: ResponseEvent,
    marker_ref: &str,
    file_name: &str,
    log_timestamp: Option<DateTime<Utc>>,
    line_number: u64,
) -> Option<TrackingRecord> {
    let reference_number = match event.reference {
        Some(xml_ref) => {
            if xml_ref != marker_ref {
                tracing::debug!(
                    marker = marker_ref,
                    xml = %xml_ref,
                    "Reference in XML differs from call marker; using XML value"
                );
            }
            xml_ref
        }
        None => marker_ref.trim().to_string(),
    };
    if reference_number.is_empty() {
        tracing::debug!(line = line_number, "Event dropped: empty reference");
        return None;
    }

    let Some(status) = event.status else {
        tracing::debug!(reference = %reference_number, line = line_number, "Event dropped: no status");
        return None;
    };

    let Some(timestamp) = event.timestamp.as_deref().and_then(parse_event_timestamp) else {
        tracing::debug!(
            reference = %reference_number,
            line = line_number,
            raw = event.timestamp.as_deref().unwrap_or(""),
            "Event dropped: missing or unparseable timestamp"
        );
        return None;
    };

    Some(TrackingRecord {
        reference_number,
        shipping_unit_reference: event.shipping_unit_reference,
        status,
        description: event.description,
        timestamp,
        location: event.location,
        source_log_file: file_name.to_string(),
        log_timestamp,
        line_number,
    })
}

// =============================================================================
// Timestamp parsing
// =============================================================================

/// Parse an event timestamp from the XML.
///
/// Accepts RFC 3339 (`Z` or `+hh:mm`), ISO 8601 with a `+hhmm` offset, and
/// naive ISO date-times which are taken as UTC.
pub(crate) fn parse_event_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ndt| ndt.and_utc())
}

/// Timestamp prefix of a log line, e.g. `2025-09-08 10:26:48.955 INFO ...`.
fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?)")
            .expect("line_timestamp: invalid regex")
    });
    let raw = re.captures(line)?.get(1)?.as_str().replace(',', ".");
    parse_event_timestamp(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parser() -> LogParser {
        LogParser::default()
    }

    fn event_xml(status: &str, ts: &str) -> String {
        format!(
            "<TrackingResponse><Event><Status>{status}</Status>\
             <Timestamp>{ts}</Timestamp></Event></TrackingResponse>"
        )
    }

    // -------------------------------------------------------------------------
    // Core behaviour
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_reference_example() {
        let content = "GET https://iss.epg.com/iss/v1/clients/ACME/tracking/shipment\n\
                       <TrackingResponse><Event><Status>DELIVERED</Status>\
                       <Description>Delivered to recipient</Description>\
                       <Timestamp>2024-01-15T10:30:00Z</Timestamp>\
                       <Location>Dallas, TX</Location></Event></TrackingResponse>";

        let (records, outcome) = parser().parse(content, "app.log").unwrap().into_parts();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.reference_number, "ACME");
        assert_eq!(r.status, "DELIVERED");
        assert_eq!(r.description.as_deref(), Some("Delivered to recipient"));
        assert_eq!(r.timestamp, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        assert_eq!(r.location.as_deref(), Some("Dallas, TX"));
        assert_eq!(r.source_log_file, "app.log");
        assert_eq!(r.line_number, 1);

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.records_extracted, 1);
        assert!(outcome.error_message.is_none());
    }

    #[test]
    fn test_parse_empty_content_is_success() {
        let (records, outcome) = parser().parse("", "empty.log").unwrap().into_parts();
        assert!(records.is_empty());
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.markers_found, 0);
    }

    #[test]
    fn test_parse_rejects_empty_file_name() {
        let err = parser().parse("anything", "  ").unwrap_err();
        assert!(matches!(err, ParseError::EmptyFileName));
    }

    #[test]
    fn test_parse_bytes_rejects_invalid_utf8() {
        let err = parser().parse_bytes(&[0x66, 0xff, 0xfe], "bad.log").unwrap_err();
        assert!(matches!(err, ParseError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_parse_bytes_strips_bom() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(b"GET https://h/clients/X1/tracking/shipment\n");
        bytes.extend_from_slice(event_xml("OK", "2024-01-15T10:30:00Z").as_bytes());
        let result = parser().parse_bytes(&bytes, "bom.log").unwrap();
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn test_malformed_only_is_failed() {
        let content = "GET https://h/clients/ACME/tracking/shipment\n\
                       <TrackingResponse><Event><Status>X</Status></TrackingResponse>";
        let result = parser().parse(content, "bad.log").unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.outcome.status, OutcomeStatus::Failed);
        assert_eq!(result.outcome.fragments_failed, 1);
        assert_eq!(result.fragment_errors.len(), 1);
        let msg = result.outcome.error_message.unwrap();
        assert!(msg.contains("1 of 1"), "unexpected message: {msg}");
        assert!(msg.contains("ACME"));
    }

    #[test]
    fn test_one_good_one_malformed_is_partial() {
        let content = format!(
            "GET https://h/clients/A/tracking/shipment\n{}\n\
             GET https://h/clients/B/tracking/shipment\n\
             <TrackingResponse><Event></Wrong></TrackingResponse>\n",
            event_xml("OK", "2024-01-15T10:30:00Z")
        );
        let result = parser().parse(&content, "mixed.log").unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].reference_number, "A");
        assert_eq!(result.outcome.status, OutcomeStatus::Partial);
        assert_eq!(result.outcome.fragments_parsed, 1);
        assert_eq!(result.outcome.fragments_failed, 1);
        assert!(result.outcome.error_message.is_some());
    }

    #[test]
    fn test_unclosed_fragment_is_missing_response() {
        let content = "GET https://h/clients/A/tracking/shipment\n<TrackingResponse><Event>\n";
        let result = parser().parse(content, "cut.log").unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.outcome.markers_skipped, 1);
        assert_eq!(result.outcome.fragments_failed, 0);
        assert_eq!(result.outcome.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_cut_off_response_does_not_swallow_next_call() {
        let content = format!(
            "GET https://h/clients/A/tracking/shipment\n\
             <TrackingResponse><Event><Status>CUT\n\
             GET https://h/clients/B/tracking/shipment\n{}\n",
            event_xml("OK", "2024-01-15T10:30:00Z")
        );
        let result = parser().parse(&content, "cut.log").unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].reference_number, "B");
        assert_eq!(result.records[0].line_number, 3);
        assert_eq!(result.outcome.markers_found, 2);
        assert_eq!(result.outcome.markers_skipped, 1);
        assert_eq!(result.outcome.fragments_failed, 0);
        assert_eq!(result.outcome.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_namespaced_root_is_located() {
        let content = "GET https://h/clients/ACME/tracking/shipment\n\
                       <ns2:TrackingResponse xmlns:ns2=\"urn:epg:tracking\">\
                       <ns2:Event><ns2:Status>DELIVERED</ns2:Status>\
                       <ns2:Timestamp>2024-01-15T10:30:00Z</ns2:Timestamp></ns2:Event>\
                       </ns2:TrackingResponse>\n";
        let result = parser().parse(content, "ns.log").unwrap();
        assert_eq!(result.records.len(), 1, "outcome: {:?}", result.outcome);
        assert_eq!(result.records[0].reference_number, "ACME");
        assert_eq!(result.records[0].status, "DELIVERED");
        assert_eq!(result.outcome.markers_skipped, 0);
    }

    #[test]
    fn test_repeated_response_is_emitted_once() {
        let call = format!(
            "GET https://h/clients/ACME/tracking/shipment\n{}\n",
            event_xml("DELIVERED", "2024-01-15T10:30:00Z")
        );
        let content = format!("{call}{call}");
        let result = parser().parse(&content, "twice.log").unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].line_number, 1);
        assert_eq!(result.outcome.records_extracted, 1);
        assert_eq!(result.outcome.records_duplicate, 1);
        assert_eq!(result.outcome.fragments_parsed, 2);
        assert_eq!(result.outcome.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_same_status_at_different_times_is_kept() {
        let content = format!(
            "GET https://h/clients/ACME/tracking/shipment\n{}\n\
             GET https://h/clients/ACME/tracking/shipment\n{}\n",
            event_xml("IN_TRANSIT", "2024-01-15T10:30:00Z"),
            event_xml("IN_TRANSIT", "2024-01-16T10:30:00Z")
        );
        let result = parser().parse(&content, "moves.log").unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.outcome.records_duplicate, 0);
    }

    #[test]
    fn test_event_without_timestamp_is_dropped() {
        let content = "GET https://h/clients/ACME/tracking/shipment\n\
                       <TrackingResponse>\
                       <Event><Status>A</Status><Timestamp>2024-01-15T10:30:00Z</Timestamp></Event>\
                       <Event><Status>B</Status></Event>\
                       <Event><Status>C</Status><Timestamp>not a date</Timestamp></Event>\
                       <Event><Status>D</Status><Timestamp>2024-01-16T08:00:00Z</Timestamp></Event>\
                       </TrackingResponse>";
        let result = parser().parse(content, "drop.log").unwrap();
        let statuses: Vec<_> = result.records.iter().map(|r| r.status.as_str()).collect();
        assert_eq!(statuses, vec!["A", "D"]);
        assert_eq!(result.outcome.records_dropped, 2);
        assert_eq!(result.outcome.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_event_without_status_is_dropped() {
        let content = "GET https://h/clients/ACME/tracking/shipment\n\
                       <TrackingResponse><Event><Timestamp>2024-01-15T10:30:00Z</Timestamp></Event>\
                       </TrackingResponse>";
        let result = parser().parse(content, "nostatus.log").unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.outcome.records_dropped, 1);
        assert_eq!(result.outcome.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_marker_without_reference_is_skipped() {
        let content = format!(
            "GET https://h/api/tracking/shipment\n{}",
            event_xml("OK", "2024-01-15T10:30:00Z")
        );
        let result = parser().parse(&content, "noref.log").unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.outcome.markers_skipped, 1);
        assert_eq!(result.outcome.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_marker_without_response_is_skipped() {
        let content = "GET https://h/clients/ACME/tracking/shipment\nHTTP 504 gateway timeout\n";
        let result = parser().parse(content, "noresp.log").unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.outcome.markers_found, 1);
        assert_eq!(result.outcome.markers_skipped, 1);
        assert_eq!(result.outcome.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_response_after_next_marker_belongs_to_next_call() {
        let content = format!(
            "GET https://h/clients/FIRST/tracking/shipment\n\
             GET https://h/clients/SECOND/tracking/shipment\n{}",
            event_xml("OK", "2024-01-15T10:30:00Z")
        );
        let result = parser().parse(&content, "two.log").unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].reference_number, "SECOND");
        assert_eq!(result.outcome.markers_skipped, 1);
    }

    #[test]
    fn test_response_outside_window_is_ignored() {
        let filler = "noise\n".repeat(5);
        let content = format!(
            "GET https://h/clients/ACME/tracking/shipment\n{filler}{}",
            event_xml("OK", "2024-01-15T10:30:00Z")
        );
        let narrow = LogParser::new(ParseConfig {
            window_lines: 3,
            ..ParseConfig::default()
        });
        assert!(narrow.parse(&content, "w.log").unwrap().records.is_empty());
        assert_eq!(parser().parse(&content, "w.log").unwrap().records.len(), 1);
    }

    #[test]
    fn test_xml_reference_takes_precedence() {
        let content = "GET https://h/clients/ACME/tracking/shipment\n\
                       <TrackingResponse><ReferenceNumber>R0000000042</ReferenceNumber>\
                       <Event><Status>OK</Status><Timestamp>2024-01-15T10:30:00Z</Timestamp></Event>\
                       </TrackingResponse>";
        let result = parser().parse(content, "prec.log").unwrap();
        assert_eq!(result.records[0].reference_number, "R0000000042");
    }

    #[test]
    fn test_url_inside_fragment_is_not_a_new_call() {
        let content = "GET https://h/clients/ACME/tracking/shipment\n\
                       <TrackingResponse><Link>https://h/clients/OTHER/tracking/shipment</Link>\
                       <Event><Status>OK</Status><Timestamp>2024-01-15T10:30:00Z</Timestamp></Event>\
                       </TrackingResponse>";
        let result = parser().parse(content, "link.log").unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].reference_number, "ACME");
        assert_eq!(result.outcome.markers_found, 1);
    }

    #[test]
    fn test_legacy_call_marker_multiline_fragment() {
        let content = "\
2025-09-08 10:26:48.955 INFO  RequestHandler:120 - [main] Call for REFLIV <R1234567890> at 2025-09-08 10:26:48
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main] <root>
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main]   <requestedData>
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main]     <stateData>
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main]       <title>DELIVERED</title>
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main]       <timestamp>2025-09-01T14:00:00.448Z</timestamp>
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main]     </stateData>
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main]   </requestedData>
2025-09-08 10:26:49.086 INFO  ResponseHandler:489 - [main] </root>
";
        let result = parser().parse(content, "legacy.log").unwrap();
        assert_eq!(result.records.len(), 1, "outcome: {:?}", result.outcome);
        let r = &result.records[0];
        assert_eq!(r.reference_number, "R1234567890");
        assert_eq!(r.status, "DELIVERED");
        assert_eq!(
            r.log_timestamp.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            Some("2025-09-08 10:26:48".to_string())
        );
    }

    #[test]
    fn test_bare_legacy_marker() {
        let content = format!(
            "Call for REFLIV A0000000001\n{}",
            event_xml("OK", "2024-01-15T10:30:00Z")
        );
        let result = parser().parse(&content, "bare.log").unwrap();
        assert_eq!(result.records[0].reference_number, "A0000000001");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let content = format!(
            "GET https://h/clients/A/tracking/shipment\n{}\nGET https://h/clients/B/tracking/shipment\n{}",
            event_xml("ONE", "2024-01-15T10:30:00Z"),
            event_xml("TWO", "2024-01-15T11:30:00Z")
        );
        let first = parser().parse(&content, "same.log").unwrap();
        let second = parser().parse(&content, "same.log").unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.records.len(), 2);
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_url_reference_prefers_shipment_segment() {
        assert_eq!(
            url_reference("https://h/clients/ACME/tracking/shipment/R0000000001").as_deref(),
            Some("R0000000001")
        );
        assert_eq!(
            url_reference("https://h/clients/ACME/tracking/shipment?x=1").as_deref(),
            Some("ACME")
        );
        assert_eq!(url_reference("https://h/tracking/shipment"), None);
    }

    #[test]
    fn test_find_open_tag_requires_delimiter() {
        assert_eq!(find_open_tag("<rootCause/>", "root"), None);
        assert_eq!(find_open_tag("</root>", "root"), None);

        let tag = find_open_tag("x <root a=\"1\">", "root").unwrap();
        assert_eq!((tag.start, tag.end, tag.self_closing), (2, 14, false));
        assert_eq!(tag.qualified_name, "root");

        let tag = find_open_tag("<root/>", "root").unwrap();
        assert_eq!((tag.start, tag.end, tag.self_closing), (0, 7, true));
    }

    #[test]
    fn test_find_open_tag_accepts_namespace_prefix() {
        let tag = find_open_tag("ok <ns2:TrackingResponse xmlns:ns2=\"urn:x\">", "TrackingResponse")
            .unwrap();
        assert_eq!(tag.start, 3);
        assert_eq!(tag.qualified_name, "ns2:TrackingResponse");

        assert_eq!(find_open_tag("</ns2:TrackingResponse>", "TrackingResponse"), None);
        assert_eq!(find_open_tag("a:TrackingResponse>", "TrackingResponse"), None);
    }

    #[test]
    fn test_clean_fragment_strips_prefixes() {
        let raw = "<root>\n2025-09-08 10:26:49.086 INFO  H:1 - [main] <title>X</title>\n\n</root>";
        assert_eq!(clean_fragment(raw), "<root>\n<title>X</title>\n</root>");
    }

    #[test]
    fn test_parse_event_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(parse_event_timestamp("2024-01-15T10:30:00Z"), Some(expected));
        assert_eq!(parse_event_timestamp("2024-01-15T12:30:00+02:00"), Some(expected));
        assert_eq!(parse_event_timestamp("2024-01-15T12:30:00+0200"), Some(expected));
        assert_eq!(parse_event_timestamp("2024-01-15T10:30:00"), Some(expected));
        assert_eq!(parse_event_timestamp("2024-01-15 10:30:00"), Some(expected));
        assert!(parse_event_timestamp("2024-01-15T10:30:00.448Z").is_some());
        assert_eq!(parse_event_timestamp("2024-02-30T10:30:00Z"), None);
        assert_eq!(parse_event_timestamp("yesterday"), None);
    }

    #[test]
    fn test_line_index() {
        let content = "a\nbb\nccc";
        let idx = LineIndex::new(content);
        assert_eq!(idx.line_number(0), 1);
        assert_eq!(idx.line_number(2), 2);
        assert_eq!(idx.line_number(6), 3);
        assert_eq!(idx.line_at(content, 3), "bb");
        assert_eq!(idx.line_at(content, 7), "ccc");
    }
}
