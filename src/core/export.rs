// reflivtrace - core/export.rs
//
// CSV and JSON export of tracking records.
// Core layer: writes to any Write trait object.

use crate::core::model::{ReferenceTimeline, TrackingRecord};
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// Export records to CSV format.
///
/// Writes: reference_number, shipping_unit_reference, status, description,
/// timestamp, location, source_log_file, log_timestamp, line
pub fn export_csv<W: Write>(
    records: &[&TrackingRecord],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_err = |e: csv::Error| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record([
            "reference_number",
            "shipping_unit_reference",
            "status",
            "description",
            "timestamp",
            "location",
            "source_log_file",
            "log_timestamp",
            "line",
        ])
        .map_err(csv_err)?;

    let mut count = 0;
    for record in records {
        let timestamp = record.timestamp.to_rfc3339();
        let log_ts = record
            .log_timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let line = record.line_number.to_string();

        csv_writer
            .write_record([
                record.reference_number.as_str(),
                record.shipping_unit_reference.as_deref().unwrap_or(""),
                record.status.as_str(),
                record.description.as_deref().unwrap_or(""),
                timestamp.as_str(),
                record.location.as_deref().unwrap_or(""),
                record.source_log_file.as_str(),
                log_ts.as_str(),
                line.as_str(),
            ])
            .map_err(csv_err)?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Export records to JSON format (array of objects).
pub fn export_json<W: Write>(
    records: &[&TrackingRecord],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, records).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(records.len())
}

/// Export one reference's per-unit timeline as a JSON object.
///
/// Returns the number of events written.
pub fn export_timeline_json<W: Write>(
    timeline: &ReferenceTimeline,
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, timeline).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    Ok(timeline.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_record(reference: &str, status: &str) -> TrackingRecord {
        TrackingRecord {
            reference_number: reference.to_string(),
            shipping_unit_reference: Some("SU-1".to_string()),
            status: status.to_string(),
            description: Some("Delivered, front door".to_string()),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            location: Some("Dallas, TX".to_string()),
            source_log_file: "app.log".to_string(),
            log_timestamp: None,
            line_number: 7,
        }
    }

    #[test]
    fn test_csv_export() {
        let records = [make_record("R1", "DELIVERED"), make_record("R2", "IN_TRANSIT")];
        let refs: Vec<&TrackingRecord> = records.iter().collect();
        let mut buf = Vec::new();
        let count = export_csv(&refs, &mut buf, Path::new("out.csv")).unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        assert!(output.starts_with("reference_number,shipping_unit_reference,status"));
        assert!(output.contains("R1,SU-1,DELIVERED,\"Delivered, front door\""));
        assert!(output.contains("2024-01-15T10:30:00+00:00"));
        assert!(output.contains("IN_TRANSIT"));
    }

    #[test]
    fn test_json_export() {
        let record = make_record("R1", "DELIVERED");
        let mut buf = Vec::new();
        let count = export_json(&[&record], &mut buf, Path::new("out.json")).unwrap();
        assert_eq!(count, 1);

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["reference_number"], "R1");
        assert_eq!(value[0]["timestamp"], "2024-01-15T10:30:00Z");
        assert_eq!(value[0]["source_log_file"], "app.log");
    }

    #[test]
    fn test_timeline_json_export() {
        let mut unit = make_record("R1", "DELIVERED");
        unit.shipping_unit_reference = None;
        let records = [make_record("R1", "IN_TRANSIT"), unit, make_record("R2", "LOST")];
        let timeline = ReferenceTimeline::group_by_unit("R1", &records);

        let mut buf = Vec::new();
        let count = export_timeline_json(&timeline, &mut buf, Path::new("t.json")).unwrap();
        assert_eq!(count, 2);

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["reference_number"], "R1");
        assert_eq!(value["units"]["SU-1"][0]["status"], "IN_TRANSIT");
        assert_eq!(value["units"]["main"][0]["status"], "DELIVERED");
    }
}
