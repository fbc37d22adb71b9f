// reflivtrace - app/mod.rs
//
// Application layer: file ingestion around the core parser.
// Depends on core and util; owns all filesystem reads of log files.

pub mod ingest;
