// reflivtrace - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading (explicit path or platform default)
// 3. Logging initialisation (debug mode support)
// 4. Sequential ingestion of every file argument
// 5. Filtering, then summary / JSON / timeline output and optional CSV export

use clap::Parser;
use reflivtrace::app::ingest::{FileReport, Ingestor};
use reflivtrace::core::export;
use reflivtrace::core::filter::RecordFilter;
use reflivtrace::core::model::{
    sort_newest_first, OutcomeStatus, ReferenceTimeline, StatusSummary, TrackingRecord,
};
use reflivtrace::core::parser::LogParser;
use reflivtrace::platform::config::{self, PlatformPaths};
use reflivtrace::util::constants;
use reflivtrace::util::error::{ReflivError, Result};
use reflivtrace::util::logging;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Extract REFLIV shipment-tracking events from application logs.
#[derive(Parser, Debug)]
#[command(name = "reflivtrace", version, about)]
struct Cli {
    /// Log files to process (.txt or .log by default).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to config.toml (defaults to the platform config directory).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Print matching records as JSON instead of a summary.
    #[arg(long = "json")]
    json: bool,

    /// Also write matching records to a CSV file.
    #[arg(long = "csv", value_name = "PATH")]
    csv: Option<PathBuf>,

    /// Only keep records whose status contains this text (case-insensitive).
    #[arg(short = 's', long = "status")]
    status: Option<String>,

    /// Only keep records whose reference contains this text (case-insensitive).
    #[arg(short = 'r', long = "reference")]
    reference: Option<String>,

    /// Only keep records whose description or location matches this regex.
    #[arg(short = 'm', long = "match", value_name = "REGEX")]
    text_match: Option<String>,

    /// Show every event of one reference, grouped by shipping unit.
    #[arg(short = 't', long = "timeline", value_name = "REFERENCE")]
    timeline: Option<String>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    // Config comes first so its log level can feed the subscriber. A file
    // named with --config must load; the platform default is optional.
    let (config_path, loaded) = match cli.config {
        Some(ref path) => (path.clone(), config::load_explicit_config(path)),
        None => {
            let path = PlatformPaths::resolve().config_file();
            let loaded = Ok(config::load_config(&path));
            (path, loaded)
        }
    };
    let (app_config, warnings) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            logging::init(cli.debug, None);
            let e = ReflivError::from(e);
            tracing::error!(error = %e, "Fatal error");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init(cli.debug, app_config.log_level.as_deref());

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        files = cli.files.len(),
        "reflivtrace starting"
    );
    for warning in &warnings {
        tracing::warn!(config = %config_path.display(), "{warning}");
    }

    let mut ingestor = Ingestor::new(LogParser::new(app_config.parse), app_config.ingest);

    if let Err(e) = run(&cli, &mut ingestor) {
        tracing::error!(error = %e, "Fatal error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli, ingestor: &mut Ingestor) -> Result<()> {
    let mut reports: Vec<FileReport> = Vec::new();
    let mut last_error = None;

    for path in &cli.files {
        match ingestor.ingest_path(path) {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "File not processed");
                eprintln!("{}: {e}", path.display());
                last_error = Some(e);
            }
        }
    }

    let records: Vec<TrackingRecord> = reports
        .iter()
        .flat_map(|r| r.records.iter().cloned())
        .collect();

    let mut filter = RecordFilter {
        reference: cli.reference.clone().unwrap_or_default(),
        status: cli.status.clone().unwrap_or_default(),
        ..RecordFilter::default()
    };
    if let Some(ref pattern) = cli.text_match {
        filter.set_regex(pattern)?;
    }
    let mut matching = filter.apply(&records);
    sort_newest_first(&mut matching);
    tracing::debug!(
        total = records.len(),
        matching = matching.len(),
        "Filter applied"
    );

    if let Some(ref csv_path) = cli.csv {
        let count = write_csv(&matching, csv_path)?;
        tracing::info!(path = %csv_path.display(), records = count, "CSV written");
    }

    let stdout = std::io::stdout();
    if let Some(ref reference) = cli.timeline {
        let timeline = ReferenceTimeline::group_by_unit(reference, matching.iter().copied());
        tracing::debug!(reference = %reference, events = timeline.len(), "Timeline built");
        let write_err = |e: std::io::Error| ReflivError::Io {
            path: PathBuf::from("<stdout>"),
            operation: "write timeline",
            source: e,
        };
        if cli.json {
            export::export_timeline_json(&timeline, stdout.lock(), Path::new("<stdout>"))?;
            println!();
        } else {
            print_timeline(&timeline, &mut stdout.lock()).map_err(write_err)?;
        }
    } else if cli.json {
        export::export_json(&matching, stdout.lock(), Path::new("<stdout>"))?;
        println!();
    } else {
        print_summary(&reports, &matching, &mut stdout.lock()).map_err(|e| ReflivError::Io {
            path: PathBuf::from("<stdout>"),
            operation: "write summary",
            source: e,
        })?;
    }

    // Nothing at all could be ingested: report the last rejection as fatal.
    match last_error {
        Some(e) if reports.is_empty() => Err(e.into()),
        _ => Ok(()),
    }
}

fn write_csv(records: &[&TrackingRecord], path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path).map_err(|e| ReflivError::Io {
        path: path.to_path_buf(),
        operation: "create CSV file",
        source: e,
    })?;
    Ok(export::export_csv(records, std::io::BufWriter::new(file), path)?)
}

fn print_summary<W: Write>(
    reports: &[FileReport],
    matching: &[&TrackingRecord],
    out: &mut W,
) -> std::io::Result<()> {
    for report in reports {
        let o = &report.outcome;
        writeln!(
            out,
            "{}: {} ({} records, {} markers, {} skipped, {} fragments failed, {} dropped, {} duplicate)",
            report.file_name,
            o.status,
            o.records_extracted,
            o.markers_found,
            o.markers_skipped,
            o.fragments_failed,
            o.records_dropped,
            o.records_duplicate
        )?;
        if o.status != OutcomeStatus::Success {
            if let Some(ref msg) = o.error_message {
                writeln!(out, "  {msg}")?;
            }
        }
    }

    let summary = StatusSummary::from_records(matching.iter().copied());
    writeln!(out)?;
    writeln!(
        out,
        "{} records, {} references",
        summary.total_records,
        summary.references.len()
    )?;
    for (status, count) in &summary.by_status {
        writeln!(out, "  {status:<24} {count}")?;
    }
    if let (Some(earliest), Some(latest)) = (summary.earliest, summary.latest) {
        writeln!(
            out,
            "  range: {} .. {}",
            earliest.to_rfc3339(),
            latest.to_rfc3339()
        )?;
    }
    if !summary.top_references.is_empty() {
        writeln!(out, "  most active:")?;
        for activity in &summary.top_references {
            writeln!(
                out,
                "    {:<24} {:>5}  last {}",
                activity.reference_number,
                activity.events,
                activity.last_update.to_rfc3339()
            )?;
        }
    }
    Ok(())
}

fn print_timeline<W: Write>(timeline: &ReferenceTimeline, out: &mut W) -> std::io::Result<()> {
    if timeline.is_empty() {
        writeln!(out, "{}: no events", timeline.reference_number)?;
        return Ok(());
    }
    writeln!(
        out,
        "{} ({} events)",
        timeline.reference_number,
        timeline.len()
    )?;
    for (unit, events) in &timeline.units {
        writeln!(out, "  [{unit}]")?;
        for record in events {
            writeln!(
                out,
                "    {}  {:<20} {}",
                record.timestamp.to_rfc3339(),
                record.status.trim(),
                record.location.as_deref().unwrap_or("")
            )?;
        }
    }
    Ok(())
}
