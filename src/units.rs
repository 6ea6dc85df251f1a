//! Small, stateless unit conversions.

use hifitime::Epoch;

use crate::error::ConfigError;

const SECONDS_PER_DAY: f64 = 86400.0;

/// Convert sea pressure to depth (UNESCO 1983, Fofonoff & Millard; the same
/// algorithm as `seawater.eos80.dpth`).
///
/// # Arguments
///
/// * `pressure` - sea pressure \[decibars\]
/// * `latitude` - \[degrees\]
///
/// # Returns
///
/// * depth \[metres\], positive down.
pub fn pressure_to_depth(pressure: f64, latitude: f64) -> f64 {
    let x = (latitude.to_radians()).sin().powi(2);
    let gravity = 9.780318 * (1.0 + (5.2788e-3 + 2.36e-5 * x) * x) + 1.092e-6 * pressure;
    let numerator =
        (((-1.82e-15 * pressure + 2.279e-10) * pressure - 2.2512e-5) * pressure + 9.72659) * pressure;
    numerator / gravity
}

/// Convert a SeaBird-style `TimeJ` (day of year, where 1.0 is 00:00 on 1
/// January) in `year` to epoch seconds. Sub-second parts are dropped.
pub fn julian_day_to_epoch(year: i32, time_j: f64) -> Result<f64, ConfigError> {
    let new_year = Epoch::maybe_from_gregorian_utc(year, 1, 1, 0, 0, 0, 0)
        .map_err(|e| ConfigError::BadTimeUnits(format!("year {year}: {e}")))?;
    // Round to the microsecond first so float noise can't knock a whole
    // second off.
    let offset_us = ((time_j - 1.0) * SECONDS_PER_DAY * 1e6).round();
    Ok(new_year.to_unix_seconds() + (offset_us / 1e6).floor())
}

pub fn radians_to_degrees(radians: f64) -> f64 {
    radians.to_degrees()
}

/// Convert a position written as degrees and decimal minutes (e.g. "36 48.17"
/// or "36'48.172") to decimal degrees. A trailing hemisphere letter of S or W
/// makes the result negative.
pub fn degrees_minutes_to_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    let (body, negative) = match s.chars().last()? {
        'S' | 's' | 'W' | 'w' => (&s[..s.len() - 1], true),
        'N' | 'n' | 'E' | 'e' => (&s[..s.len() - 1], false),
        _ => (s, false),
    };
    let mut parts = body
        .split(|c: char| c.is_whitespace() || c == '\'')
        .filter(|p| !p.is_empty());
    let degrees: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0.0,
    };
    let magnitude = degrees.abs() + minutes / 60.0;
    let signed = if degrees.is_sign_negative() || negative {
        -magnitude
    } else {
        magnitude
    };
    Some(signed)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn scenario_e_pressure_to_depth() {
        assert_abs_diff_eq!(pressure_to_depth(100.0, 36.7), 99.24, epsilon = 0.01);
    }

    #[test]
    fn pressure_to_depth_reference_value() {
        // UNESCO 1983 check value: 10000 dbar at 30 degrees is 9712.653 m.
        assert_abs_diff_eq!(pressure_to_depth(10000.0, 30.0), 9712.653, epsilon = 1e-3);
        assert_eq!(pressure_to_depth(0.0, 36.7), 0.0);
    }

    #[test]
    fn julian_day() {
        // Day 259 of 2012 is 15 September.
        assert_eq!(julian_day_to_epoch(2012, 259.0).unwrap(), 1347667200.0);
        assert_eq!(julian_day_to_epoch(2012, 259.5).unwrap(), 1347667200.0 + 43200.0);
        assert_eq!(julian_day_to_epoch(1970, 1.0).unwrap(), 0.0);
        // Fractions of a second are dropped.
        assert_eq!(
            julian_day_to_epoch(1970, 1.0 + 1.5 / 86400.0).unwrap(),
            1.0
        );
    }

    #[test]
    fn degrees_minutes() {
        assert_abs_diff_eq!(degrees_minutes_to_decimal("36 48.00 N").unwrap(), 36.8, epsilon = 1e-9);
        assert_abs_diff_eq!(degrees_minutes_to_decimal("121 47.832 W").unwrap(), -121.7972, epsilon = 1e-9);
        assert_abs_diff_eq!(degrees_minutes_to_decimal("36'48.172").unwrap(), 36.802866, epsilon = 1e-6);
        assert_abs_diff_eq!(degrees_minutes_to_decimal("-122 30").unwrap(), -122.5, epsilon = 1e-9);
        assert!(degrees_minutes_to_decimal("north").is_none());
        assert!(degrees_minutes_to_decimal("").is_none());
    }
}
