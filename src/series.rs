//! Raw, irregularly-sampled series as they come out of an input file.

use std::collections::BTreeMap;

/// Timestamps with a magnitude beyond this many seconds are garbage (NaT
/// coerced to a huge integer, uninitialised memory in a log, etc.) and are
/// treated as null.
const MAX_ABS_EPOCH_SECONDS: f64 = 1e10;

/// A named quantity observed by one sensor. Timestamps are epoch seconds;
/// NaN marks a null timestamp.
#[derive(Debug, Clone, Default)]
pub struct RawSeries {
    pub name: String,

    pub times: Vec<f64>,

    pub values: Vec<f64>,

    /// The source's own attributes for this variable (long_name, units, ...).
    pub attributes: BTreeMap<String, String>,

    /// The source's sentinel for invalid samples, if it declared one.
    pub source_fill_value: Option<f64>,
}

impl RawSeries {
    /// Build a series from parallel epoch-second timestamps and values. Out of
    /// range timestamps are nulled.
    ///
    /// # Panics
    ///
    /// If `times` and `values` have different lengths.
    pub fn new<S: Into<String>>(name: S, times: Vec<f64>, values: Vec<f64>) -> RawSeries {
        assert_eq!(
            times.len(),
            values.len(),
            "times and values must be parallel"
        );
        let times = times
            .into_iter()
            .map(|t| {
                if t.is_finite() && t.abs() <= MAX_ABS_EPOCH_SECONDS {
                    t
                } else {
                    f64::NAN
                }
            })
            .collect();
        RawSeries {
            name: name.into(),
            times,
            values,
            attributes: BTreeMap::new(),
            source_fill_value: None,
        }
    }

    /// A series for a variable that isn't in the source.
    pub fn empty<S: Into<String>>(name: S) -> RawSeries {
        RawSeries {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> RawSeries {
        self.attributes = attributes;
        self
    }

    pub fn with_source_fill_value(mut self, fill_value: Option<f64>) -> RawSeries {
        self.source_fill_value = fill_value;
        self
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Is this sample's value usable?
    pub(crate) fn is_valid_value(&self, v: f64) -> bool {
        v.is_finite() && self.source_fill_value.map_or(true, |fill| v != fill)
    }

    /// The (timestamp, value) pairs with both a non-null timestamp and a usable
    /// value, in source order.
    pub fn valid_samples(&self) -> (Vec<f64>, Vec<f64>) {
        self.times
            .iter()
            .zip(self.values.iter())
            .filter(|(t, v)| !t.is_nan() && self.is_valid_value(**v))
            .map(|(&t, &v)| (t, v))
            .unzip()
    }

    /// Apply `f` to every value, leaving missing values alone.
    pub fn map_values<F: Fn(f64) -> f64>(mut self, f: F) -> RawSeries {
        for v in self.values.iter_mut() {
            if v.is_finite() && self.source_fill_value.map_or(true, |fill| *v != fill) {
                *v = f(*v);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_times_become_null() {
        let s = RawSeries::new("x", vec![1.0, -2e10, 3.0, f64::INFINITY], vec![0.0; 4]);
        assert_eq!(s.times[0], 1.0);
        assert!(s.times[1].is_nan());
        assert_eq!(s.times[2], 3.0);
        assert!(s.times[3].is_nan());
    }

    #[test]
    fn valid_samples_skips_nulls_and_fill() {
        let s = RawSeries::new(
            "x",
            vec![1.0, f64::NAN, 3.0, 4.0, 5.0],
            vec![10.0, 20.0, -1e34, f64::NAN, 50.0],
        )
        .with_source_fill_value(Some(-1e34));
        let (t, v) = s.valid_samples();
        assert_eq!(t, vec![1.0, 5.0]);
        assert_eq!(v, vec![10.0, 50.0]);
    }

    #[test]
    fn map_values_leaves_missing_alone() {
        let s = RawSeries::new("x", vec![1.0, 2.0], vec![2.0, -999.0])
            .with_source_fill_value(Some(-999.0))
            .map_values(|v| v * 10.0);
        assert_eq!(s.values, vec![20.0, -999.0]);
    }
}
