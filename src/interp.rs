//! Projecting raw series onto a [`CommonTimeGrid`].

use std::{fmt::Display, str::FromStr};

use log::trace;

use crate::{grid::CommonTimeGrid, series::RawSeries, FILL_VALUE};

/// What to do with grid timestamps that fall outside a series' own time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extrapolation {
    /// Use the value of the nearest endpoint.
    #[default]
    Clamp,

    /// Mark the sample as missing.
    Fill,
}

impl FromStr for Extrapolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clamp" => Ok(Extrapolation::Clamp),
            "fill" => Ok(Extrapolation::Fill),
            _ => Err(format!("'{s}' isn't one of 'clamp' or 'fill'")),
        }
    }
}

impl Display for Extrapolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Extrapolation::Clamp => write!(f, "clamp"),
            Extrapolation::Fill => write!(f, "fill"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InterpolationOptions {
    pub extrapolation: Extrapolation,
    pub fill_value: f64,
}

impl Default for InterpolationOptions {
    fn default() -> Self {
        InterpolationOptions {
            extrapolation: Extrapolation::default(),
            fill_value: FILL_VALUE,
        }
    }
}

/// A series on the grid. Missing samples hold `fill_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedSeries {
    pub values: Vec<f64>,

    pub fill_value: f64,
}

impl InterpolatedSeries {
    /// A placeholder for a variable that wasn't in the source.
    pub fn all_fill(len: usize, fill_value: f64) -> InterpolatedSeries {
        InterpolatedSeries {
            values: vec![fill_value; len],
            fill_value,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Is every sample missing?
    pub fn is_all_fill(&self) -> bool {
        self.values.iter().all(|&v| v == self.fill_value)
    }

    /// The values that aren't missing.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .copied()
            .filter(move |&v| v != self.fill_value && v.is_finite())
    }

    /// (min, max) of the non-missing values.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.valid_values().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Linearly interpolate `series` onto `grid`.
///
/// Null timestamps and missing values are dropped first. The series'
/// timestamps are expected to be increasing; they aren't checked. An empty
/// series gives an all-fill result. The output always has the grid's length.
pub fn interpolate(
    series: &RawSeries,
    grid: &CommonTimeGrid,
    options: InterpolationOptions,
) -> InterpolatedSeries {
    let (xp, fp) = series.valid_samples();
    trace!(
        "Interpolating '{}' ({} usable of {} samples) onto {} grid points",
        series.name,
        xp.len(),
        series.len(),
        grid.len()
    );
    if xp.is_empty() {
        return InterpolatedSeries::all_fill(grid.len(), options.fill_value);
    }

    let values = grid
        .times()
        .iter()
        .map(|&x| interp_one(x, &xp, &fp, options))
        .map(|v| if v.is_finite() { v } else { options.fill_value })
        .collect();

    InterpolatedSeries {
        values,
        fill_value: options.fill_value,
    }
}

/// Put `series` onto a grid of reported timestamps. A series logged at exactly
/// the grid's timestamps is copied sample for sample, with missing values
/// written as fill; any other series is interpolated.
pub fn align(
    series: &RawSeries,
    grid: &CommonTimeGrid,
    options: InterpolationOptions,
) -> InterpolatedSeries {
    if series.times.as_slice() != grid.times() {
        trace!("'{}' isn't on the reported timestamps; interpolating", series.name);
        return interpolate(series, grid, options);
    }

    let values = series
        .values
        .iter()
        .map(|&v| {
            if series.is_valid_value(v) {
                v
            } else {
                options.fill_value
            }
        })
        .collect();
    InterpolatedSeries {
        values,
        fill_value: options.fill_value,
    }
}

/// Interpolate at a single point; `xp` is non-empty.
fn interp_one(x: f64, xp: &[f64], fp: &[f64], options: InterpolationOptions) -> f64 {
    let last = xp.len() - 1;
    if x < xp[0] || x > xp[last] {
        return match options.extrapolation {
            Extrapolation::Clamp if x < xp[0] => fp[0],
            Extrapolation::Clamp => fp[last],
            Extrapolation::Fill => options.fill_value,
        };
    }

    // Index of the first knot strictly greater than x.
    let i = xp.partition_point(|&t| t <= x);
    if i == 0 {
        return fp[0];
    }
    if i > last {
        // x is on (or, for unsorted input, after) the final knot.
        return fp[last];
    }

    let (x0, x1) = (xp[i - 1], xp[i]);
    let (f0, f1) = (fp[i - 1], fp[i]);
    let dx = x1 - x0;
    if dx == 0.0 {
        return f0;
    }
    f0 + (x - x0) * (f1 - f0) / dx
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn grid(times: &[f64]) -> CommonTimeGrid {
        CommonTimeGrid::from_times(times.to_vec()).unwrap()
    }

    #[test]
    fn aligned_series_are_copied() {
        let grid = CommonTimeGrid::as_reported(vec![10.0, 11.0, 11.0, 12.0]).unwrap();
        let s = RawSeries::new("psal", vec![10.0, 11.0, 11.0, 12.0], vec![33.0, 33.5, f64::NAN, -9.0])
            .with_source_fill_value(Some(-9.0));
        let out = align(&s, &grid, Default::default());
        assert_eq!(out.values, vec![33.0, 33.5, FILL_VALUE, FILL_VALUE]);

        // Other timestamps fall back to interpolation.
        let other = RawSeries::new("t", vec![10.0, 12.0], vec![1.0, 3.0]);
        assert_eq!(align(&other, &grid, Default::default()).values, vec![1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn scenario_a_values() {
        let chl = RawSeries::new("chlorophyll", vec![100.0, 102.0, 104.0], vec![1.0, 2.0, 3.0]);
        let out = interpolate(&chl, &grid(&[100.0, 102.0, 104.0]), Default::default());
        assert_eq!(out.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn knots_are_preserved() {
        let times = vec![0.0, 0.7, 3.1, 3.2, 10.0, 11.5];
        let values = vec![5.0, -1.0, 8.25, 0.0, 1e3, 7.0];
        let s = RawSeries::new("x", times.clone(), values.clone());
        let out = interpolate(&s, &grid(&times), Default::default());
        assert_eq!(out.values, values);
    }

    #[test]
    fn midpoints() {
        let s = RawSeries::new("x", vec![0.0, 10.0, 20.0], vec![0.0, 100.0, 0.0]);
        let out = interpolate(&s, &grid(&[2.5, 10.0, 15.0]), Default::default());
        assert_abs_diff_eq!(out.values[0], 25.0);
        assert_abs_diff_eq!(out.values[1], 100.0);
        assert_abs_diff_eq!(out.values[2], 50.0);
    }

    #[test]
    fn scenario_d_missing_variable() {
        let g = grid(&[1.0, 2.0, 3.0, 4.0]);
        let out = interpolate(&RawSeries::empty("nitrate"), &g, Default::default());
        assert_eq!(out.len(), g.len());
        assert!(out.values.iter().all(|&v| v == -1e34));
        assert!(out.is_all_fill());
    }

    #[test]
    fn clamp_and_fill_outside_range() {
        let s = RawSeries::new("x", vec![10.0, 20.0], vec![1.0, 2.0]);
        let g = grid(&[0.0, 15.0, 30.0]);

        let clamped = interpolate(&s, &g, Default::default());
        assert_eq!(clamped.values, vec![1.0, 1.5, 2.0]);

        let filled = interpolate(
            &s,
            &g,
            InterpolationOptions {
                extrapolation: Extrapolation::Fill,
                fill_value: -999.0,
            },
        );
        assert_eq!(filled.values, vec![-999.0, 1.5, -999.0]);
    }

    #[test]
    fn single_sample_series() {
        let s = RawSeries::new("x", vec![5.0], vec![3.0]);
        let out = interpolate(&s, &grid(&[1.0, 5.0, 9.0]), Default::default());
        assert_eq!(out.values, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn missing_samples_are_skipped() {
        let s = RawSeries::new("x", vec![0.0, 1.0, 2.0], vec![0.0, -1e34, 2.0])
            .with_source_fill_value(Some(-1e34));
        let out = interpolate(&s, &grid(&[1.0]), Default::default());
        assert_eq!(out.values, vec![1.0]);
    }

    #[test]
    fn duplicate_knots_dont_blow_up() {
        let s = RawSeries::new("x", vec![0.0, 1.0, 1.0, 2.0], vec![0.0, 1.0, 5.0, 6.0]);
        let out = interpolate(&s, &grid(&[0.5, 1.5]), Default::default());
        assert!(out.values.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(out.values[0], 0.5);
        assert_abs_diff_eq!(out.values[1], 5.5);
    }

    #[test]
    fn min_max_ignores_fill() {
        let s = InterpolatedSeries {
            values: vec![-1e34, 3.0, -2.0, -1e34],
            fill_value: -1e34,
        };
        assert_eq!(s.min_max(), Some((-2.0, 3.0)));
        assert_eq!(InterpolatedSeries::all_fill(3, -1e34).min_max(), None);
    }

    #[test]
    fn parse_extrapolation() {
        assert_eq!("Clamp".parse::<Extrapolation>(), Ok(Extrapolation::Clamp));
        assert_eq!("fill".parse::<Extrapolation>(), Ok(Extrapolation::Fill));
        assert!("nearest".parse::<Extrapolation>().is_err());
    }
}
