//! Nudging dead-reckoned positions toward GPS fixes.
//!
//! Under water, an LRAUV dead reckons its position, which drifts. It gets a
//! GPS fix each time it surfaces. The positions logged between two fixes are
//! shifted by a linear ramp: nothing at the first position of the segment,
//! and at the last exactly the offset that puts it on the next fix.
//!
//! Positions before the first fix or after the last one can't be corrected
//! and are left alone.

use log::{debug, info, warn};

use crate::series::RawSeries;

/// A segment ending further than this from its closing fix is suspect
/// \[seconds\].
const MAX_SECONDS_TO_FIX: f64 = 10.0;

/// What [`nudge_to_fixes`] did.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NudgeReport {
    /// Underwater segments that were nudged.
    pub segments: usize,

    /// The total duration of those segments \[minutes\].
    pub minutes: f64,
}

impl NudgeReport {
    /// The sentence added to an output's summary.
    pub fn summary_note(&self) -> String {
        format!(
            "{} underwater segments over {:.1} minutes nudged toward GPS fixes.",
            self.segments, self.minutes
        )
    }
}

#[derive(Debug, Clone)]
pub struct Nudged {
    pub latitude: RawSeries,
    pub longitude: RawSeries,
    pub report: NudgeReport,
}

/// Usable (timestamp, latitude, longitude) samples of a pair of series that
/// share timestamps, with their indices.
fn positions(latitude: &RawSeries, longitude: &RawSeries) -> Vec<(usize, f64, f64, f64)> {
    latitude
        .times
        .iter()
        .zip(latitude.values.iter().zip(longitude.values.iter()))
        .enumerate()
        .filter(|(_, (t, (lat, lon)))| {
            !t.is_nan() && latitude.is_valid_value(**lat) && longitude.is_valid_value(**lon)
        })
        .map(|(i, (&t, (&lat, &lon)))| (i, t, lat, lon))
        .collect()
}

fn same_times(a: &RawSeries, b: &RawSeries) -> bool {
    a.times.len() == b.times.len()
        && a.times
            .iter()
            .zip(b.times.iter())
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
}

/// Nudge dead-reckoned `latitude` and `longitude` toward the GPS fixes.
///
/// All four series must be in the same angular units. `None` if there's
/// nothing to nudge toward, or the positions (or fixes) don't share
/// timestamps.
pub fn nudge_to_fixes(
    latitude: &RawSeries,
    longitude: &RawSeries,
    latitude_fix: &RawSeries,
    longitude_fix: &RawSeries,
) -> Option<Nudged> {
    if !same_times(latitude, longitude) {
        warn!("Latitude and longitude have different timestamps; not nudging");
        return None;
    }
    if !same_times(latitude_fix, longitude_fix) {
        warn!("The GPS fixes have different latitude and longitude timestamps; not nudging");
        return None;
    }
    let fixes = positions(latitude_fix, longitude_fix);
    if fixes.is_empty() {
        warn!("No usable GPS fixes; not nudging");
        return None;
    }

    let dead_reckoned = positions(latitude, longitude);
    let mut nudged_lat = latitude.values.clone();
    let mut nudged_lon = longitude.values.clone();
    let mut report = NudgeReport::default();

    let before = dead_reckoned.partition_point(|&(_, t, _, _)| t < fixes[0].1);
    debug!("{before} positions before the first fix");

    for (i_fix, pair) in fixes.windows(2).enumerate() {
        let (_, start, _, _) = pair[0];
        let (_, end, end_fix_lat, end_fix_lon) = pair[1];
        let first = dead_reckoned.partition_point(|&(_, t, _, _)| t <= start);
        let last = dead_reckoned.partition_point(|&(_, t, _, _)| t < end);
        let segment = match dead_reckoned.get(first..last) {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        let (_, t0, _, _) = segment[0];
        let (_, tl, lat_l, lon_l) = segment[segment.len() - 1];

        let lat_diff = end_fix_lat - lat_l;
        let lon_diff = end_fix_lon - lon_l;
        let end_seconds = end - tl;
        if end_seconds > MAX_SECONDS_TO_FIX {
            warn!(
                "Segment {i_fix} ends {end_seconds:.1} s before its fix (more than {MAX_SECONDS_TO_FIX} s)"
            );
        }
        debug!(
            "Segment {i_fix}: {} positions over {:.2} min, end offset ({lat_diff:.7}, {lon_diff:.7})",
            segment.len(),
            (tl - t0) / 60.0
        );

        for &(i, t, lat, lon) in segment {
            let ramp = if tl > t0 { (t - t0) / (tl - t0) } else { 1.0 };
            nudged_lat[i] = lat + ramp * lat_diff;
            nudged_lon[i] = lon + ramp * lon_diff;
        }
        report.segments += 1;
        report.minutes += (tl - t0) / 60.0;
    }

    info!(
        "Nudged {} segments ({:.1} min) toward {} GPS fixes",
        report.segments,
        report.minutes,
        fixes.len()
    );
    Some(Nudged {
        latitude: RawSeries {
            values: nudged_lat,
            ..latitude.clone()
        },
        longitude: RawSeries {
            values: nudged_lon,
            ..longitude.clone()
        },
        report,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn series(name: &str, times: &[f64], values: &[f64]) -> RawSeries {
        RawSeries::new(name, times.to_vec(), values.to_vec())
    }

    #[test]
    fn segments_ramp_onto_the_next_fix() {
        let times = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0];
        let lat = series("latitude", &times, &[36.0; 8]);
        let lon = series("longitude", &times, &[-122.0; 8]);
        // Fixes at 5 s, 35 s and 65 s; the vehicle has drifted north each dive.
        let fix_times = [5.0, 35.0, 65.0];
        let lat_fix = series("latitude_fix", &fix_times, &[36.0, 36.3, 36.6]);
        let lon_fix = series("longitude_fix", &fix_times, &[-122.0, -122.0, -121.8]);

        let nudged = nudge_to_fixes(&lat, &lon, &lat_fix, &lon_fix).unwrap();
        assert_eq!(nudged.report.segments, 2);
        assert_abs_diff_eq!(nudged.report.minutes, 40.0 / 60.0, epsilon = 1e-12);

        let v = &nudged.latitude.values;
        // Before the first fix: untouched.
        assert_eq!(v[0], 36.0);
        // First segment (10, 20, 30 s): 0, half, then all of the 0.3 offset.
        assert_abs_diff_eq!(v[1], 36.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[2], 36.15, epsilon = 1e-12);
        assert_abs_diff_eq!(v[3], 36.3, epsilon = 1e-12);
        // Second segment (40, 50, 60 s) lands on the third fix.
        assert_abs_diff_eq!(v[4], 36.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[6], 36.6, epsilon = 1e-12);
        assert_abs_diff_eq!(nudged.longitude.values[6], -121.8, epsilon = 1e-12);
        // After the last fix: untouched.
        assert_eq!(v[7], 36.0);

        assert_eq!(nudged.latitude.times, lat.times);
        assert_eq!(
            nudged.report.summary_note(),
            "2 underwater segments over 0.7 minutes nudged toward GPS fixes."
        );
    }

    #[test]
    fn single_position_segment_lands_on_the_fix() {
        let lat = series("latitude", &[10.0], &[1.0]);
        let lon = series("longitude", &[10.0], &[2.0]);
        let lat_fix = series("latitude_fix", &[0.0, 12.0], &[1.0, 1.5]);
        let lon_fix = series("longitude_fix", &[0.0, 12.0], &[2.0, 2.5]);
        let nudged = nudge_to_fixes(&lat, &lon, &lat_fix, &lon_fix).unwrap();
        assert_eq!(nudged.latitude.values, vec![1.5]);
        assert_eq!(nudged.longitude.values, vec![2.5]);
    }

    #[test]
    fn missing_positions_are_left_alone() {
        let lat = series("latitude", &[1.0, 2.0, 3.0], &[0.0, f64::NAN, 0.0]);
        let lon = series("longitude", &[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0]);
        let lat_fix = series("latitude_fix", &[0.0, 4.0], &[0.0, 1.0]);
        let lon_fix = series("longitude_fix", &[0.0, 4.0], &[0.0, 0.0]);
        let nudged = nudge_to_fixes(&lat, &lon, &lat_fix, &lon_fix).unwrap();
        assert_eq!(nudged.latitude.values[0], 0.0);
        assert!(nudged.latitude.values[1].is_nan());
        assert_eq!(nudged.latitude.values[2], 1.0);
    }

    #[test]
    fn nothing_to_nudge_toward() {
        let lat = series("latitude", &[1.0, 2.0], &[0.0, 0.0]);
        let lon = series("longitude", &[1.0, 2.0], &[0.0, 0.0]);
        let empty = RawSeries::empty("latitude_fix");
        assert!(nudge_to_fixes(&lat, &lon, &empty, &RawSeries::empty("longitude_fix")).is_none());

        let lon_elsewhere = series("longitude", &[1.0, 5.0], &[0.0, 0.0]);
        let fix = series("fix", &[0.0, 3.0], &[0.0, 0.0]);
        assert!(nudge_to_fixes(&lat, &lon_elsewhere, &fix, &fix).is_none());
    }
}
