//! NetCDF (3 or 4, possibly grouped) files and OPeNDAP URLs.
//!
//! Each variable has its own time axis. The axis is looked up as
//! `<variable>_time` (the LRAUV convention), then the variable's own
//! dimension, then `time`.

use std::collections::BTreeMap;

use log::{debug, trace};
use netcdf::{AttrValue, Variable};

use super::SeriesSource;
use crate::{
    config::ParameterRequest, error::ConvertError, series::RawSeries, time_units::TimeUnits,
};

pub struct NetcdfSource {
    name: String,
    file: netcdf::File,
}

impl NetcdfSource {
    /// Open a local file or an OPeNDAP URL (netCDF-C handles the latter).
    pub fn open<S: Into<String>>(path_or_url: S) -> Result<NetcdfSource, ConvertError> {
        let name = path_or_url.into();
        debug!("Opening {name}");
        let file = netcdf::open(&name).map_err(|e| ConvertError::SourceUnavailable {
            source_name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(NetcdfSource { name, file })
    }

    fn malformed<S: Into<String>>(&self, reason: S) -> ConvertError {
        ConvertError::MalformedSource {
            source_name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn read_from<'a, F>(
        &self,
        request: &ParameterRequest,
        lookup: F,
    ) -> Result<Option<RawSeries>, ConvertError>
    where
        F: Fn(&str) -> Option<Variable<'a>>,
    {
        let name = &request.spec.name;
        let var = match lookup(name) {
            Some(v) => v,
            None => return Ok(None),
        };
        let dims = var.dimensions();
        if dims.len() != 1 {
            return Err(self.malformed(format!(
                "'{name}' has {} dimensions; only 1D series are supported",
                dims.len()
            )));
        }

        let mut time_candidates = vec![format!("{name}_time"), dims[0].name()];
        time_candidates.push("time".to_string());
        let time_var = time_candidates
            .iter()
            .filter(|candidate| *candidate != name)
            .find_map(|candidate| lookup(candidate).map(|v| (candidate.clone(), v)));
        let (time_name, time_var) = match time_var {
            Some(t) => t,
            None => {
                return Err(self.malformed(format!(
                    "no time axis for '{name}' (tried {time_candidates:?})"
                )))
            }
        };
        trace!("'{name}' uses time axis '{time_name}'");

        let units = match time_var.attribute("units") {
            Some(attr) => {
                let value = attr
                    .value()
                    .map_err(|e| self.malformed(format!("'{time_name}' units: {e}")))?;
                match attr_to_string(&value) {
                    Some(s) => s
                        .parse::<TimeUnits>()
                        .map_err(|e| self.malformed(e.to_string()))?,
                    None => TimeUnits::EPOCH_SECONDS,
                }
            }
            None => TimeUnits::EPOCH_SECONDS,
        };

        let raw_times = time_var
            .values::<f64, _>(..)
            .map_err(|e| self.malformed(format!("reading '{time_name}': {e}")))?;
        let values = var
            .values::<f64, _>(..)
            .map_err(|e| self.malformed(format!("reading '{name}': {e}")))?;
        if raw_times.len() != values.len() {
            return Err(self.malformed(format!(
                "'{name}' has {} values but '{time_name}' has {}",
                values.len(),
                raw_times.len()
            )));
        }
        let times = raw_times
            .into_iter()
            .map(|t| units.to_epoch_seconds(t))
            .collect();

        let mut attributes = BTreeMap::new();
        let mut fill_value = None;
        for attr in var.attributes() {
            let value = match attr.value() {
                Ok(v) => v,
                Err(e) => {
                    debug!("Skipping attribute {}:{}: {e}", name, attr.name());
                    continue;
                }
            };
            match attr.name() {
                "_FillValue" => fill_value = attr_to_f64(&value),
                "missing_value" if fill_value.is_none() => fill_value = attr_to_f64(&value),
                _ => (),
            }
            if let Some(s) = attr_to_string(&value) {
                attributes.insert(attr.name().to_string(), s);
            }
        }

        Ok(Some(
            RawSeries::new(name.clone(), times, values)
                .with_attributes(attributes)
                .with_source_fill_value(fill_value),
        ))
    }
}

impl SeriesSource for NetcdfSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn read_series(&self, request: &ParameterRequest) -> Result<Option<RawSeries>, ConvertError> {
        match request.group.as_deref() {
            None => self.read_from(request, |name| self.file.variable(name)),
            Some(group_name) => {
                let group = self
                    .file
                    .group(group_name)
                    .map_err(|e| self.malformed(format!("group '{group_name}': {e}")))?;
                match group {
                    Some(group) => self.read_from(request, |name| group.variable(name)),
                    None => {
                        debug!("{}: no group '{group_name}'", self.name);
                        Ok(None)
                    }
                }
            }
        }
    }
}

fn attr_to_f64(value: &AttrValue) -> Option<f64> {
    match value {
        AttrValue::Double(v) => Some(*v),
        AttrValue::Float(v) => Some(f64::from(*v)),
        AttrValue::Int(v) => Some(f64::from(*v)),
        AttrValue::Uint(v) => Some(f64::from(*v)),
        AttrValue::Short(v) => Some(f64::from(*v)),
        AttrValue::Ushort(v) => Some(f64::from(*v)),
        AttrValue::Schar(v) => Some(f64::from(*v)),
        AttrValue::Uchar(v) => Some(f64::from(*v)),
        AttrValue::Longlong(v) => Some(*v as f64),
        AttrValue::Ulonglong(v) => Some(*v as f64),
        AttrValue::Doubles(v) => v.first().copied(),
        AttrValue::Floats(v) => v.first().map(|f| f64::from(*f)),
        _ => None,
    }
}

fn attr_to_string(value: &AttrValue) -> Option<String> {
    match value {
        AttrValue::Str(s) => Some(s.clone()),
        AttrValue::Strs(v) => Some(v.join(" ")),
        other => attr_to_f64(other).map(|v| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FILL_VALUE;

    /// Write a small LRAUV-style file: a root `depth` with `depth_time`, and a
    /// grouped, radians-valued `pitch` with its own time axis in days.
    fn lrauv_file(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("lrauv.nc4");
        let mut file = netcdf::create(&path).unwrap();
        file.add_dimension("depth_time", 3).unwrap();
        let mut t = file.add_variable::<f64>("depth_time", &["depth_time"]).unwrap();
        t.add_attribute("units", "seconds since 1970-01-01T00:00:00Z").unwrap();
        t.put_values(&[100.0, 102.0, 104.0], ..).unwrap();
        let mut d = file.add_variable::<f64>("depth", &["depth_time"]).unwrap();
        d.add_attribute("units", "m").unwrap();
        d.add_attribute("_FillValue", FILL_VALUE).unwrap();
        d.put_values(&[1.0, FILL_VALUE, 3.0], ..).unwrap();

        let mut group = file.add_group("Nav").unwrap();
        group.add_dimension("pitch_time", 2).unwrap();
        let mut t = group.add_variable::<f64>("pitch_time", &["pitch_time"]).unwrap();
        t.add_attribute("units", "days since 1970-01-01").unwrap();
        t.put_values(&[1.0, 2.0], ..).unwrap();
        let mut p = group.add_variable::<f64>("pitch", &["pitch_time"]).unwrap();
        p.add_attribute("long_name", "Vehicle pitch").unwrap();
        p.put_values(&[0.0, 0.5], ..).unwrap();

        path
    }

    #[test]
    fn reads_root_and_grouped_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = lrauv_file(dir.path());
        let source = NetcdfSource::open(path.display().to_string()).unwrap();

        let depth = source
            .read_series(&ParameterRequest::root("depth"))
            .unwrap()
            .unwrap();
        assert_eq!(depth.times, vec![100.0, 102.0, 104.0]);
        assert_eq!(depth.source_fill_value, Some(FILL_VALUE));
        assert_eq!(depth.attributes.get("units").map(String::as_str), Some("m"));
        assert_eq!(depth.valid_samples(), (vec![100.0, 104.0], vec![1.0, 3.0]));

        let mut request = ParameterRequest::root("pitch");
        request.group = Some("Nav".to_string());
        let pitch = source.read_series(&request).unwrap().unwrap();
        assert_eq!(pitch.times, vec![86400.0, 172800.0]);
        assert_eq!(
            pitch.attributes.get("long_name").map(String::as_str),
            Some("Vehicle pitch")
        );
    }

    #[test]
    fn missing_things_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = lrauv_file(dir.path());
        let source = NetcdfSource::open(path.display().to_string()).unwrap();

        assert!(source
            .read_series(&ParameterRequest::root("salinity"))
            .unwrap()
            .is_none());
        let mut request = ParameterRequest::root("pitch");
        request.group = Some("CTD_NeilBrown".to_string());
        assert!(source.read_series(&request).unwrap().is_none());
    }

    #[test]
    fn unopenable_source() {
        let result = NetcdfSource::open("/definitely/not/here.nc");
        assert!(matches!(
            result,
            Err(ConvertError::SourceUnavailable { .. })
        ));
    }
}
