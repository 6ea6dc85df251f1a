//! CF/udunits time axes ("<unit> since <reference>") to epoch seconds.

use std::str::FromStr;

use hifitime::Epoch;

use crate::error::ConfigError;

/// A parsed `units` attribute of a time variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    /// Seconds per unit.
    scale: f64,

    /// The reference time \[epoch seconds\].
    reference: f64,
}

impl TimeUnits {
    /// Plain epoch seconds; what LRAUV logs use.
    pub const EPOCH_SECONDS: TimeUnits = TimeUnits {
        scale: 1.0,
        reference: 0.0,
    };

    pub fn to_epoch_seconds(&self, raw: f64) -> f64 {
        self.reference + raw * self.scale
    }
}

impl FromStr for TimeUnits {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::BadTimeUnits(s.to_string());

        let lower = s.trim().to_ascii_lowercase();
        let (unit, reference) = lower.split_once(" since ").ok_or_else(bad)?;
        let scale = match unit.trim() {
            "milliseconds" | "millisecond" | "msec" | "ms" => 1e-3,
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            _ => return Err(bad()),
        };

        // Normalise the many ways of writing the reference time, e.g.
        // "1970-01-01T00:00:00Z", "1970/01/01 00:00:00Z", "2000-01-01 00:00:00 UTC".
        let reference = reference
            .replace("utc", " ")
            .replace('/', "-")
            .replace('t', " ")
            .replace('z', " ");
        let mut tokens = reference.split_whitespace();
        let date = tokens.next().ok_or_else(bad)?;
        let time = tokens.next().unwrap_or("00:00:00");

        let mut date_parts = date.split('-');
        let year: i32 = parse_next(&mut date_parts).ok_or_else(bad)?;
        let month: u8 = parse_next(&mut date_parts).ok_or_else(bad)?;
        let day: u8 = parse_next(&mut date_parts).unwrap_or(1);

        let mut time_parts = time.split(':');
        let hour: u8 = parse_next(&mut time_parts).unwrap_or(0);
        let minute: u8 = parse_next(&mut time_parts).unwrap_or(0);
        let second: f64 = parse_next(&mut time_parts).unwrap_or(0.0);
        if !(0.0..60.0).contains(&second) {
            return Err(bad());
        }
        let whole_seconds = second.trunc();
        let nanos = ((second - whole_seconds) * 1e9).round() as u32;
        // e.g. 59.9999999999 rounds up to a whole second, which can't be
        // expressed as nanoseconds. Add it on after building the epoch.
        let (nanos, carried) = if nanos >= 1_000_000_000 {
            (0, 1.0)
        } else {
            (nanos, 0.0)
        };

        let epoch = Epoch::maybe_from_gregorian_utc(
            year,
            month,
            day,
            hour,
            minute,
            whole_seconds as u8,
            nanos,
        )
        .map_err(|_| bad())?;

        Ok(TimeUnits {
            scale,
            reference: epoch.to_unix_seconds() + carried,
        })
    }
}

fn parse_next<'a, T: FromStr, I: Iterator<Item = &'a str>>(parts: &mut I) -> Option<T> {
    parts.next().and_then(|p| p.trim().parse().ok())
}
