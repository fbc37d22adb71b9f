// reflivtrace - lib.rs
//
// Library entry point, exposing the parser, ingestion, and configuration
// layers for the CLI binary and for integration testing.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
