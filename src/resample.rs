//! Bin-mean downsampling of fast sensors before they're interpolated.

use itertools::Itertools;

use crate::{grid::Frequency, series::RawSeries};

/// Average `series` into bins of width `interval`, aligned to multiples of the
/// interval since the Unix epoch and labelled by their start. Null timestamps
/// and missing values are dropped; empty bins produce nothing.
///
/// Samples are expected in time order; an out-of-order sample starts a new bin.
pub fn bin_mean(series: &RawSeries, interval: &Frequency) -> RawSeries {
    let width = interval.interval().to_seconds();
    let (times, values) = series.valid_samples();

    let grouped = times
        .into_iter()
        .zip(values)
        .group_by(|(t, _)| (t / width).floor() as i64);
    let (times, values): (Vec<f64>, Vec<f64>) = grouped
        .into_iter()
        .map(|(bin, samples)| {
            let (sum, count) = samples.fold((0.0, 0usize), |(sum, count), (_, v)| (sum + v, count + 1));
            (bin as f64 * width, sum / count as f64)
        })
        .unzip();

    RawSeries {
        name: series.name.clone(),
        times,
        values,
        attributes: series.attributes.clone(),
        source_fill_value: series.source_fill_value,
    }
}
