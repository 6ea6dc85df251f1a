//! The normalised output unit: one trajectory, everything on one time axis.

use std::collections::BTreeMap;

use hifitime::Epoch;

use crate::{
    config::ParameterRequest, error::ConvertError, grid::CommonTimeGrid,
    interp::InterpolatedSeries,
};

/// The `coordinates` attribute of every data variable.
pub const COORDINATES: &str = "time depth latitude longitude";

/// Map common platform variable names to CF standard names.
fn lookup_standard_name(name: &str) -> Option<&'static str> {
    match name {
        "bin_mean_temperature" | "temperature" | "sea_water_temperature" => {
            Some("sea_water_temperature")
        }
        "bin_mean_salinity" | "salinity" | "sea_water_salinity" => Some("sea_water_salinity"),
        "bin_mean_chlorophyll"
        | "chlorophyll"
        | "mass_concentration_of_chlorophyll_in_sea_water" => {
            Some("mass_concentration_of_chlorophyll_in_sea_water")
        }
        "oxygen" | "mass_concentration_of_oxygen_in_sea_water" => {
            Some("mass_concentration_of_oxygen_in_sea_water")
        }
        "nitrate" | "mole_concentration_of_nitrate_in_sea_water" => {
            Some("mole_concentration_of_nitrate_in_sea_water")
        }
        "PAR" | "downwelling_photosynthetic_photon_flux_in_sea_water" => {
            Some("downwelling_photosynthetic_photon_flux_in_sea_water")
        }
        "pitch" | "platform_pitch_angle" => Some("platform_pitch_angle"),
        "roll" | "platform_roll_angle" => Some("platform_roll_angle"),
        "yaw" | "platform_orientation" | "platform_yaw_angle" => Some("platform_yaw_angle"),
        _ => None,
    }
}

/// Everything a reader of the output needs to know about one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMeta {
    pub long_name: String,
    pub standard_name: Option<String>,
    pub units: String,
    pub fill_value: f64,
}

impl ParameterMeta {
    pub fn latitude(fill_value: f64) -> ParameterMeta {
        ParameterMeta {
            long_name: "LATITUDE".to_string(),
            standard_name: Some("latitude".to_string()),
            units: "degree_north".to_string(),
            fill_value,
        }
    }

    pub fn longitude(fill_value: f64) -> ParameterMeta {
        ParameterMeta {
            long_name: "LONGITUDE".to_string(),
            standard_name: Some("longitude".to_string()),
            units: "degree_east".to_string(),
            fill_value,
        }
    }

    pub fn depth(fill_value: f64) -> ParameterMeta {
        ParameterMeta {
            long_name: "DEPTH".to_string(),
            standard_name: Some("depth".to_string()),
            units: "m".to_string(),
            fill_value,
        }
    }

    /// Combine the request's overrides, the source's attributes and the
    /// standard-name table, in that order of precedence.
    pub fn resolve(
        request: &ParameterRequest,
        source_attributes: &BTreeMap<String, String>,
        fill_value: f64,
    ) -> ParameterMeta {
        let spec = &request.spec;
        let output_name = request.output_name();

        let long_name = spec
            .long_name
            .clone()
            .or_else(|| source_attributes.get("long_name").cloned())
            .unwrap_or_else(|| output_name.to_string());
        let standard_name = spec
            .standard_name
            .clone()
            .or_else(|| source_attributes.get("standard_name").cloned())
            .map(|sn| {
                if sn == "platform_orientation" {
                    "platform_yaw_angle".to_string()
                } else {
                    sn
                }
            })
            .or_else(|| {
                lookup_standard_name(output_name)
                    .or_else(|| lookup_standard_name(&spec.name))
                    .map(str::to_string)
            });
        let mut units = spec
            .units
            .clone()
            .or_else(|| source_attributes.get("units").cloned())
            .unwrap_or_default();
        if spec.to_degrees && spec.units.is_none() {
            units = if units.contains("rad/s") {
                "degree/s".to_string()
            } else {
                "degree".to_string()
            };
        }

        ParameterMeta {
            long_name,
            standard_name,
            units,
            fill_value,
        }
    }
}

/// A science variable in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub name: String,
    pub meta: ParameterMeta,
    pub series: InterpolatedSeries,

    /// Was the variable present in the source? If not, `series` is all fill.
    pub found: bool,
}

/// Dataset-level descriptive text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetMetadata {
    pub title: String,
    pub summary: String,
    pub license: Option<String>,

    /// The input file or URL.
    pub source_name: String,

    /// The series whose time range the grid covers.
    pub reference_variable: String,

    /// The (fine, coarse) intervals of a resampled grid. `None` when the
    /// samples are written at their own timestamps.
    pub grid_intervals: Option<(String, String)>,
}

/// A global attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

/// One output file's worth of data. Every series has the grid's length.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryRecord {
    grid: CommonTimeGrid,
    latitude: InterpolatedSeries,
    longitude: InterpolatedSeries,
    depth: InterpolatedSeries,
    variables: Vec<DataVariable>,
    metadata: DatasetMetadata,
}

impl TrajectoryRecord {
    pub fn new(
        grid: CommonTimeGrid,
        latitude: InterpolatedSeries,
        longitude: InterpolatedSeries,
        depth: InterpolatedSeries,
        variables: Vec<DataVariable>,
        metadata: DatasetMetadata,
    ) -> Result<TrajectoryRecord, ConvertError> {
        let n = grid.len();
        let mismatched = [
            ("latitude", latitude.len()),
            ("longitude", longitude.len()),
            ("depth", depth.len()),
        ]
        .into_iter()
        .chain(variables.iter().map(|v| (v.name.as_str(), v.series.len())))
        .find(|(_, len)| *len != n);
        if let Some((name, len)) = mismatched {
            return Err(ConvertError::InvalidGrid(format!(
                "'{name}' has {len} samples but the grid has {n}"
            )));
        }

        Ok(TrajectoryRecord {
            grid,
            latitude,
            longitude,
            depth,
            variables,
            metadata,
        })
    }

    pub fn grid(&self) -> &CommonTimeGrid {
        &self.grid
    }

    pub fn latitude(&self) -> &InterpolatedSeries {
        &self.latitude
    }

    pub fn longitude(&self) -> &InterpolatedSeries {
        &self.longitude
    }

    pub fn depth(&self) -> &InterpolatedSeries {
        &self.depth
    }

    pub fn variables(&self) -> &[DataVariable] {
        &self.variables
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Keep every `stride`th grid point.
    pub fn decimated(&self, stride: usize) -> Result<TrajectoryRecord, ConvertError> {
        if stride == 0 {
            return Err(ConvertError::InvalidGrid(
                "stride must be at least 1".to_string(),
            ));
        }
        let take = |values: &[f64]| -> Vec<f64> { values.iter().copied().step_by(stride).collect() };
        let take_series = |s: &InterpolatedSeries| InterpolatedSeries {
            values: take(&s.values),
            fill_value: s.fill_value,
        };

        TrajectoryRecord::new(
            self.grid.decimated(stride),
            take_series(&self.latitude),
            take_series(&self.longitude),
            take_series(&self.depth),
            self.variables
                .iter()
                .map(|v| DataVariable {
                    series: take_series(&v.series),
                    ..v.clone()
                })
                .collect(),
            self.metadata.clone(),
        )
    }

    /// The CF global attributes describing this record.
    ///
    /// # Arguments
    ///
    /// * `created` - when the file is being written.
    /// * `command_line` - the command that produced it, if it's known.
    pub fn global_attributes(
        &self,
        created: Epoch,
        command_line: Option<&str>,
    ) -> Vec<(&'static str, AttrValue)> {
        let created = iso8601(created);
        let md = &self.metadata;
        let mut attrs: Vec<(&'static str, AttrValue)> = vec![
            ("title", md.title.as_str().into()),
            ("summary", md.summary.as_str().into()),
        ];
        if let Some(license) = &md.license {
            attrs.push(("license", license.as_str().into()));
        }
        attrs.extend([
            ("netcdf_version", "4".into()),
            ("Conventions", "CF-1.6".into()),
            ("featureType", "trajectory".into()),
            ("data_mode", "R".into()),
            ("date_created", created.as_str().into()),
            ("date_modified", created.as_str().into()),
        ]);

        if let Some((lo, hi)) = self.latitude.min_max() {
            attrs.push(("geospatial_lat_min", lo.into()));
            attrs.push(("geospatial_lat_max", hi.into()));
        }
        if let Some((lo, hi)) = self.longitude.min_max() {
            attrs.push(("geospatial_lon_min", lo.into()));
            attrs.push(("geospatial_lon_max", hi.into()));
        }
        attrs.push(("geospatial_lat_units", "degree_north".into()));
        attrs.push(("geospatial_lon_units", "degree_east".into()));
        if let Some((lo, hi)) = self.depth.min_max() {
            attrs.push(("geospatial_vertical_min", lo.into()));
            attrs.push(("geospatial_vertical_max", hi.into()));
        }
        attrs.push(("geospatial_vertical_units", "m".into()));
        attrs.push(("geospatial_vertical_positive", "down".into()));

        attrs.push((
            "time_coverage_start",
            iso8601(Epoch::from_unix_seconds(self.grid.first())).into(),
        ));
        attrs.push((
            "time_coverage_end",
            iso8601(Epoch::from_unix_seconds(self.grid.last())).into(),
        ));

        attrs.push(("reference_variable", md.reference_variable.as_str().into()));
        if let Some((fine, coarse)) = &md.grid_intervals {
            attrs.push(("grid_fine_interval", fine.as_str().into()));
            attrs.push(("grid_coarse_interval", coarse.as_str().into()));
        }
        attrs.push(("original_source", md.source_name.as_str().into()));
        attrs.push((
            "source",
            format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).into(),
        ));
        if let Ok(user) = std::env::var("USER") {
            attrs.push(("user", user.into()));
        }
        attrs.push((
            "useconst",
            "Not intended for legal use. Data may contain inaccuracies.".into(),
        ));
        let history = match command_line {
            Some(cmd) => format!("Created by {} command \"{cmd}\" on {created}", env!("CARGO_PKG_NAME")),
            None => format!("Created by {} on {created}", env!("CARGO_PKG_NAME")),
        };
        attrs.push(("history", history.into()));

        attrs
    }
}

/// e.g. "2012-09-15T06:49:50Z"
pub fn iso8601(epoch: Epoch) -> String {
    let (y, m, d, hh, mm, ss, _) = epoch.to_gregorian_utc();
    format!("{y:04}-{m:02}-{d:02}T{hh:02}:{mm:02}:{ss:02}Z")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParameterSpec;

    fn series(values: &[f64]) -> InterpolatedSeries {
        InterpolatedSeries {
            values: values.to_vec(),
            fill_value: -1e34,
        }
    }

    fn record() -> TrajectoryRecord {
        let grid = CommonTimeGrid::from_times(vec![1347667200.0, 1347667202.0, 1347667204.0]).unwrap();
        TrajectoryRecord::new(
            grid,
            series(&[36.7, 36.8, -1e34]),
            series(&[-122.1, -122.0, -121.9]),
            series(&[1.0, 5.0, 3.0]),
            vec![DataVariable {
                name: "temperature".to_string(),
                meta: ParameterMeta::resolve(
                    &ParameterRequest::root("temperature"),
                    &BTreeMap::new(),
                    -1e34,
                ),
                series: series(&[10.0, 11.0, 12.0]),
                found: true,
            }],
            DatasetMetadata {
                title: "LRAUV interpolated data".to_string(),
                summary: "test".to_string(),
                source_name: "in.nc4".to_string(),
                reference_variable: "depth".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn attr<'a>(attrs: &'a [(&'static str, AttrValue)], name: &str) -> &'a AttrValue {
        &attrs.iter().find(|(n, _)| *n == name).unwrap().1
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let grid = CommonTimeGrid::from_times(vec![1.0, 2.0]).unwrap();
        let result = TrajectoryRecord::new(
            grid,
            series(&[1.0, 2.0]),
            series(&[1.0]),
            series(&[1.0, 2.0]),
            vec![],
            DatasetMetadata::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn global_attributes_cover_the_data() {
        let created = Epoch::from_gregorian_utc_hms(2026, 1, 2, 3, 4, 5);
        let attrs = record().global_attributes(created, Some("stoqs_convert in.nc4"));
        assert_eq!(attr(&attrs, "geospatial_lat_min"), &AttrValue::Number(36.7));
        assert_eq!(attr(&attrs, "geospatial_lat_max"), &AttrValue::Number(36.8));
        assert_eq!(attr(&attrs, "geospatial_vertical_max"), &AttrValue::Number(5.0));
        assert_eq!(
            attr(&attrs, "time_coverage_start"),
            &AttrValue::Text("2012-09-15T00:00:00Z".to_string())
        );
        assert_eq!(
            attr(&attrs, "time_coverage_end"),
            &AttrValue::Text("2012-09-15T00:00:04Z".to_string())
        );
        assert_eq!(
            attr(&attrs, "date_created"),
            &AttrValue::Text("2026-01-02T03:04:05Z".to_string())
        );
        // netcdf::create always makes NetCDF-4 files.
        assert_eq!(attr(&attrs, "netcdf_version"), &AttrValue::Text("4".to_string()));
        assert!(!attrs.iter().any(|(n, _)| *n == "grid_fine_interval"));
        match attr(&attrs, "history") {
            AttrValue::Text(h) => assert!(h.contains("stoqs_convert in.nc4")),
            other => panic!("unexpected history {other:?}"),
        }
    }

    #[test]
    fn decimation() {
        let r = record();
        assert_eq!(r.decimated(1).unwrap(), r);

        let d = r.decimated(2).unwrap();
        assert_eq!(d.grid().times(), &[1347667200.0, 1347667204.0]);
        assert_eq!(d.depth().values, vec![1.0, 3.0]);
        assert_eq!(d.variables()[0].series.values, vec![10.0, 12.0]);

        assert!(r.decimated(0).is_err());
    }

    #[test]
    fn meta_precedence() {
        let mut attrs = BTreeMap::new();
        attrs.insert("long_name".to_string(), "Pitch angle".to_string());
        attrs.insert("units".to_string(), "radian".to_string());
        attrs.insert("standard_name".to_string(), "platform_orientation".to_string());

        let mut request = ParameterRequest::root("platform_orientation");
        request.spec.rename = Some("yaw".to_string());
        request.spec.to_degrees = true;
        let meta = ParameterMeta::resolve(&request, &attrs, -1e34);
        assert_eq!(meta.long_name, "Pitch angle");
        assert_eq!(meta.standard_name.as_deref(), Some("platform_yaw_angle"));
        assert_eq!(meta.units, "degree");

        let request = ParameterRequest {
            group: None,
            spec: ParameterSpec {
                name: "bin_mean_salinity".to_string(),
                rename: None,
                units: Some("1e-3".to_string()),
                standard_name: None,
                long_name: None,
                to_degrees: false,
            },
        };
        let meta = ParameterMeta::resolve(&request, &BTreeMap::new(), -1e34);
        assert_eq!(meta.standard_name.as_deref(), Some("sea_water_salinity"));
        assert_eq!(meta.units, "1e-3");
        assert_eq!(meta.long_name, "bin_mean_salinity");
    }
}
