//! Error types. Everything here is scoped to a single input file; the batch
//! loop logs these and moves on to the next file.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Couldn't open '{source_name}': {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("No valid time range found in any of the reference candidates {candidates:?}")]
    NoValidTimeRange { candidates: Vec<String> },

    #[error("Malformed data in '{source_name}': {reason}")]
    MalformedSource { source_name: String, reason: String },

    #[error("Couldn't build a time grid: {0}")]
    InvalidGrid(String),

    #[error("Couldn't write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("netCDF error: {0}")]
    Netcdf(#[from] netcdf::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't read the system clock: {0}")]
    Clock(#[from] hifitime::Errors),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't parse the parameter map: {0}")]
    ParameterJson(#[from] serde_json::Error),

    #[error("Couldn't read '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't parse '{0}' as a frequency (expected e.g. 500ms, 2S, 5Min, H, D)")]
    BadFrequency(String),

    #[error("Couldn't parse time units '{0}'")]
    BadTimeUnits(String),

    #[error("Invalid input file pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Analog channel spec '{0}' isn't of the form <chan>:<var>:<units>")]
    BadAnalogSpec(String),

    #[error("Couldn't parse '{0}' as a date (expected YYYYMMDD)")]
    BadDate(String),

    #[error("The stride must be at least 1")]
    ZeroStride,

    #[error("Bad progress bar template: {0}")]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}
