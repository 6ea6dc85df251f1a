//! Finding the time range that the output grid should cover.

use log::{debug, info};

use crate::series::RawSeries;

/// The bounds of the first usable reference series.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTimeRange {
    /// The name of the series that supplied the bounds.
    pub reference: String,

    /// \[epoch seconds\]
    pub start: f64,

    /// \[epoch seconds\]
    pub end: f64,
}

/// Walk `candidates` in order of preference and return the bounds of the
/// first one whose first and last timestamps are both non-null.
///
/// A candidate with only one good end (e.g. a null first timestamp but a valid
/// last one) is rejected outright, as is an empty one.
pub fn resolve_valid_time_range(candidates: &[&RawSeries]) -> Option<ValidTimeRange> {
    for candidate in candidates {
        match (candidate.times.first(), candidate.times.last()) {
            (Some(&start), Some(&end)) if !start.is_nan() && !end.is_nan() => {
                debug!(
                    "Using '{}' for the valid time range ({start} to {end})",
                    candidate.name
                );
                return Some(ValidTimeRange {
                    reference: candidate.name.clone(),
                    start,
                    end,
                });
            }
            (None, _) | (_, None) => {
                debug!("Reference candidate '{}' is empty", candidate.name);
            }
            _ => {
                info!(
                    "Invalid starting or ending time found in '{}'; trying the next candidate",
                    candidate.name
                );
            }
        }
    }

    None
}
