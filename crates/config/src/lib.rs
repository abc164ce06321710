//! Configuration schema, file loader, and validation.
//!
//! Config is resolved once at startup and handed to component constructors
//! as plain values; nothing re-reads it at runtime.

pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{discover_and_load, load_config},
    schema::{
        AgentConfig, ChannelConfig, ChannelKind, Config, LedgerConfig, RuntimeKind, ThrottleConfig,
    },
    validate::validate,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unsupported config format: {path}")]
    UnsupportedFormat { path: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;
