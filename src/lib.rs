//! Normalise heterogeneous oceanographic time series (LRAUV NetCDF logs,
//! OPeNDAP datasets, SeaBird CTD exports) into CF trajectory NetCDF files
//! with every variable on one regular time axis.

pub mod config;
pub mod error;
pub mod grid;
pub mod interp;
pub mod logging;
pub mod nudge;
pub mod pipeline;
pub mod read;
pub mod record;
pub mod resample;
pub mod series;
pub mod time_units;
pub mod units;
pub mod validity;
pub mod write;

/// The value written for missing samples.
pub const FILL_VALUE: f64 = -1e34;
