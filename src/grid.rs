//! The common time axis that every variable of an output file is projected
//! onto.

use std::{fmt::Display, str::FromStr};

use hifitime::Duration;
use itertools::Itertools;
use log::{debug, trace};
use vec1::Vec1;

use crate::{
    error::{ConfigError, ConvertError},
    validity::ValidTimeRange,
};

const NANOSECONDS_PER_SECOND: f64 = 1e9;

/// A sampling interval, written the way the LRAUV tooling has always written
/// them (e.g. "500ms", "2S", "10S", "5Min", "H", "D").
#[derive(Debug, Clone, PartialEq)]
pub struct Frequency {
    label: String,
    interval: Duration,
}

impl Frequency {
    pub fn from_duration(interval: Duration) -> Frequency {
        let ns = interval.total_nanoseconds();
        let label = if ns % 1_000_000_000 == 0 {
            format!("{}S", ns / 1_000_000_000)
        } else {
            format!("{}ms", ns / 1_000_000)
        };
        Frequency { label, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn total_nanoseconds(&self) -> i128 {
        self.interval.total_nanoseconds()
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (count, unit) = trimmed.split_at(split);
        let count: u32 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| ConfigError::BadFrequency(s.to_string()))?
        };
        let unit_seconds = match unit {
            "ms" | "L" => 1e-3,
            "S" | "s" | "sec" => 1.0,
            "T" | "Min" | "min" => 60.0,
            "H" | "h" => 3600.0,
            "D" | "d" => 86400.0,
            _ => return Err(ConfigError::BadFrequency(s.to_string())),
        };
        if count == 0 {
            return Err(ConfigError::BadFrequency(s.to_string()));
        }

        Ok(Frequency {
            label: trimmed.to_string(),
            interval: Duration::from_seconds(f64::from(count) * unit_seconds),
        })
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// The target time axis of one output file \[epoch seconds\]. Never empty and
/// never decreasing. Generated grids are strictly increasing; a grid of
/// reported sample times may repeat a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTimeGrid {
    times: Vec1<f64>,
}

impl CommonTimeGrid {
    /// Lay down a dense grid at `fine` spacing over `[start, end]`, then keep
    /// one timestamp (the earliest) for every `coarse` bin. Bins are anchored
    /// at `start`, so the grid always begins exactly at `start`; it ends at or
    /// before `end`.
    ///
    /// e.g. with `start` = 100, `end` = 104, `fine` = 1S and `coarse` = 2S:
    ///
    /// fine:   [100, 101, 102, 103, 104]
    ///
    /// bins:   [[100, 101], [102, 103], [104]]
    ///
    /// result: [100, 102, 104]
    pub fn generate(
        range: &ValidTimeRange,
        fine: &Frequency,
        coarse: &Frequency,
    ) -> Result<CommonTimeGrid, ConvertError> {
        let fine_ns = fine.total_nanoseconds();
        let coarse_ns = coarse.total_nanoseconds();
        if fine_ns <= 0 || coarse_ns <= 0 {
            return Err(ConvertError::InvalidGrid(format!(
                "frequencies must be positive (fine {fine}, coarse {coarse})"
            )));
        }
        if !(range.start.is_finite() && range.end.is_finite()) || range.end < range.start {
            return Err(ConvertError::InvalidGrid(format!(
                "bad time range {} to {}",
                range.start, range.end
            )));
        }

        let span_ns = ((range.end - range.start) * NANOSECONDS_PER_SECOND).round() as i128;
        let num_fine = span_ns / fine_ns + 1;
        debug!(
            "Building a {fine} grid of {num_fine} points over {} s, resampled to {coarse}",
            range.end - range.start
        );

        let grouped = (0..num_fine)
            .map(|k| k * fine_ns)
            .group_by(|offset_ns| offset_ns / coarse_ns);
        let mut times = Vec::with_capacity(num_fine.min(span_ns / coarse_ns + 1) as usize);
        for (_, mut bin) in &grouped {
            if let Some(offset_ns) = bin.next() {
                let t = range.start + offset_ns as f64 / NANOSECONDS_PER_SECOND;
                times.push(t.min(range.end));
            }
        }
        trace!("Grid has {} points", times.len());

        // There's always at least the k = 0 point.
        let times = Vec1::try_from_vec(times)
            .map_err(|_| ConvertError::InvalidGrid("empty grid".to_string()))?;
        Ok(CommonTimeGrid { times })
    }

    /// Use explicit timestamps as the grid.
    pub fn from_times(times: Vec<f64>) -> Result<CommonTimeGrid, ConvertError> {
        if times.windows(2).any(|w| !(w[1] > w[0])) || times.iter().any(|t| !t.is_finite()) {
            return Err(ConvertError::InvalidGrid(
                "timestamps must be finite and strictly increasing".to_string(),
            ));
        }
        let times = Vec1::try_from_vec(times)
            .map_err(|_| ConvertError::InvalidGrid("empty grid".to_string()))?;
        Ok(CommonTimeGrid { times })
    }

    /// Use the timestamps samples were reported at. Unlike
    /// [`CommonTimeGrid::from_times`], repeated timestamps are allowed, since
    /// instruments often log several records within one second.
    pub fn as_reported(times: Vec<f64>) -> Result<CommonTimeGrid, ConvertError> {
        if times.iter().any(|t| !t.is_finite()) {
            return Err(ConvertError::InvalidGrid(
                "reported timestamps must all be present".to_string(),
            ));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(ConvertError::InvalidGrid(format!(
                "reported timestamps go backwards after sample {i}"
            )));
        }
        let times = Vec1::try_from_vec(times)
            .map_err(|_| ConvertError::InvalidGrid("no reported timestamps".to_string()))?;
        Ok(CommonTimeGrid { times })
    }

    /// Keep every `stride`th timestamp, starting with the first.
    pub(crate) fn decimated(&self, stride: usize) -> CommonTimeGrid {
        let mut kept = self.times.iter().copied().step_by(stride.max(1));
        let mut times = Vec1::new(*self.times.first());
        kept.next();
        times.extend(kept);
        CommonTimeGrid { times }
    }

    pub fn times(&self) -> &[f64] {
        self.times.as_slice()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> f64 {
        *self.times.first()
    }

    pub fn last(&self) -> f64 {
        *self.times.last()
    }
}
