pub mod asc;
pub mod memory;
pub mod nc;

use crate::{config::ParameterRequest, error::ConvertError, series::RawSeries};

/// Anything the pipeline can pull time series out of.
pub trait SeriesSource {
    /// The file path or URL, for logging and provenance.
    fn source_name(&self) -> &str;

    /// Read the requested variable with its timestamps in epoch seconds.
    /// `Ok(None)` means the source doesn't have it.
    fn read_series(&self, request: &ParameterRequest) -> Result<Option<RawSeries>, ConvertError>;
}
