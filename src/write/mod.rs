//! CF-1.6 trajectory NetCDF output.

use std::path::{Path, PathBuf};

use hifitime::Epoch;
use log::{debug, trace, warn};

use crate::{
    error::WriteError,
    interp::InterpolatedSeries,
    record::{AttrValue, ParameterMeta, TrajectoryRecord, COORDINATES},
};

/// The command line of this process, if it's valid UTF-8.
pub fn command_line() -> Option<String> {
    // It's possible that the command-line call has invalid UTF-8. So use
    // args_os and attempt to convert to UTF-8 strings. If there are problems
    // on the way, don't bother recording the command.
    std::env::args_os()
        .map(|a| a.into_string())
        .collect::<Result<Vec<String>, _>>()
        .map(|v| v.join(" "))
        .ok()
}

/// Where a file is written before being moved to `path`.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `record` to `path`, creating its directory if needed. The file
/// appears at `path` only once it's complete; if anything fails, nothing is
/// left behind.
///
/// # Arguments
///
/// * `record` - the trajectory to write.
/// * `path` - the output file. Replaced if it already exists.
/// * `command_line` - recorded in the `history` attribute.
pub fn write_trajectory(
    record: &TrajectoryRecord,
    path: &Path,
    command_line: Option<&str>,
) -> Result<(), WriteError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            debug!("Creating {}", dir.display());
            std::fs::create_dir_all(dir)?;
        }
    }
    let partial = partial_path(path);
    trace!("Writing to {}", partial.display());

    let result = write_netcdf(record, &partial, Epoch::now()?, command_line)
        .and_then(|()| std::fs::rename(&partial, path).map_err(WriteError::from));
    if result.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_file(&partial) {
            warn!("Couldn't remove {}: {e}", partial.display());
        }
    }
    result
}

fn write_netcdf(
    record: &TrajectoryRecord,
    path: &Path,
    created: Epoch,
    command_line: Option<&str>,
) -> Result<(), WriteError> {
    let mut file = netcdf::create(path)?;
    let grid = record.grid();
    file.add_dimension("time", grid.len())?;
    debug!("Writing {} time steps to {}", grid.len(), path.display());

    let mut time = file.add_variable::<f64>("time", &["time"])?;
    time.add_attribute("standard_name", "time")?;
    time.add_attribute("long_name", "Time (UTC)")?;
    time.add_attribute("units", "seconds since 1970-01-01 00:00:00")?;
    time.add_attribute("axis", "T")?;
    time.put_values(grid.times(), ..)?;

    let fill = record.latitude().fill_value;
    let coordinates = [
        ("latitude", ParameterMeta::latitude(fill), record.latitude(), "Y"),
        ("longitude", ParameterMeta::longitude(fill), record.longitude(), "X"),
        ("depth", ParameterMeta::depth(fill), record.depth(), "Z"),
    ];
    for (name, meta, series, axis) in coordinates {
        let mut var = add_series(&mut file, name, &meta, series, None)?;
        var.add_attribute("axis", axis)?;
        if name == "depth" {
            var.add_attribute("positive", "down")?;
        }
    }

    for v in record.variables() {
        trace!("Writing '{}' (found in source: {})", v.name, v.found);
        add_series(&mut file, &v.name, &v.meta, &v.series, Some(COORDINATES))?;
    }

    for (name, value) in record.global_attributes(created, command_line) {
        match value {
            AttrValue::Text(s) => file.add_attribute(name, s.as_str())?,
            AttrValue::Number(v) => file.add_attribute(name, v)?,
        };
    }

    Ok(())
}

fn add_series<'f>(
    file: &'f mut netcdf::MutableFile,
    name: &str,
    meta: &ParameterMeta,
    series: &InterpolatedSeries,
    coordinates: Option<&str>,
) -> Result<netcdf::VariableMut<'f>, WriteError> {
    let mut var = file.add_variable::<f64>(name, &["time"])?;
    var.set_fill_value(meta.fill_value)?;
    var.add_attribute("missing_value", meta.fill_value)?;
    var.add_attribute("long_name", meta.long_name.as_str())?;
    if let Some(sn) = &meta.standard_name {
        var.add_attribute("standard_name", sn.as_str())?;
    }
    var.add_attribute("units", meta.units.as_str())?;
    if let Some(c) = coordinates {
        var.add_attribute("coordinates", c)?;
    }
    var.put_values(series.values.as_slice(), ..)?;
    Ok(var)
}
