// reflivtrace - platform/mod.rs
//
// Platform abstraction layer: config directory resolution and config.toml.
// Dependencies: standard library, directories crate, core/app config types.

pub mod config;
