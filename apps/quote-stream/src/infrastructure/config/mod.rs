//! Configuration Module
//!
//! Configuration loading and validation for the streaming client.

mod settings;

pub use settings::{
    ClientSettings, ConfigError, DEFAULT_STREAM_URL, StreamingConfig, parse_symbols,
};
