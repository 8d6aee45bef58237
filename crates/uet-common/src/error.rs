//! Typed setup/configuration errors.
//!
//! Per the error-handling design, simulation-internal failures (admission
//! drops, retry exhaustion, uncorrectable PHY errors, routing misses) are
//! observational — they are counted signals, never [`Result`] errors. Only
//! failures that happen before or around the simulation proper (loading a
//! scenario file, validating it) are represented here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scenario file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("field `{field}` out of range: {detail}")]
    OutOfRange { field: &'static str, detail: String },
}
