//! Which variables to pull out of an input file, and what to call them.
//!
//! The parameter map is JSON keyed by group name, e.g.
//!
//! ```json
//! {
//!   "CTD_NeilBrown": [
//!     { "name": "sea_water_temperature", "rename": "temperature" }
//!   ],
//!   "": [ { "name": "chlorophyll", "units": "mg/m^3" } ]
//! }
//! ```
//!
//! The empty group (or "/") is the root of the file.

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;

use crate::error::ConfigError;

/// The science variables an LRAUV log usually carries.
pub const DEFAULT_LRAUV_PARMS: &str = r#"{
    "CTD_NeilBrown": [
        { "name": "sea_water_salinity", "rename": "salinity" },
        { "name": "sea_water_temperature", "rename": "temperature" }
    ],
    "WetLabsBB2FL": [
        { "name": "mass_concentration_of_chlorophyll_in_sea_water", "rename": "chlorophyll" },
        { "name": "Output470", "rename": "bbp470" },
        { "name": "Output650", "rename": "bbp650" }
    ],
    "PAR_Licor": [
        { "name": "downwelling_photosynthetic_photon_flux_in_sea_water", "rename": "PAR" }
    ],
    "ISUS": [
        { "name": "mole_concentration_of_nitrate_in_sea_water", "rename": "nitrate" }
    ],
    "Aanderaa_O2": [
        { "name": "mass_concentration_of_oxygen_in_sea_water", "rename": "oxygen" }
    ]
}"#;

/// One entry of the parameter map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterSpec {
    /// The variable's name in the input file.
    pub name: String,

    /// The variable's name in the output file. Defaults to `name`.
    #[serde(default)]
    pub rename: Option<String>,

    #[serde(default)]
    pub units: Option<String>,

    #[serde(default)]
    pub standard_name: Option<String>,

    #[serde(default)]
    pub long_name: Option<String>,

    /// The source values are radians.
    #[serde(default)]
    pub to_degrees: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, Vec<ParameterSpec>>);

impl ParameterMap {
    pub fn from_json(json: &str) -> Result<ParameterMap, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ParameterMap, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        ParameterMap::from_json(&json)
    }

    /// Flatten the map into requests, in group then listing order.
    pub fn requests(&self) -> Vec<ParameterRequest> {
        self.0
            .iter()
            .flat_map(|(group, specs)| {
                let group = match group.trim_matches('/') {
                    "" => None,
                    g => Some(g.to_string()),
                };
                specs.iter().map(move |spec| ParameterRequest {
                    group: group.clone(),
                    spec: spec.clone(),
                })
            })
            .collect()
    }
}

/// A variable to read, with where to find it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRequest {
    /// `None` for the root group.
    pub group: Option<String>,

    pub spec: ParameterSpec,
}

impl ParameterRequest {
    /// A root-group variable written out under its own name.
    pub fn root<S: Into<String>>(name: S) -> ParameterRequest {
        ParameterRequest {
            group: None,
            spec: ParameterSpec {
                name: name.into(),
                rename: None,
                units: None,
                standard_name: None,
                long_name: None,
                to_degrees: false,
            },
        }
    }

    pub fn output_name(&self) -> &str {
        self.spec.rename.as_deref().unwrap_or(&self.spec.name)
    }
}

/// The input names of the trajectory's coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateNames {
    pub latitude: String,
    pub longitude: String,
    pub depth: String,

    /// GPS fixes, used to nudge dead-reckoned positions.
    pub latitude_fix: String,
    pub longitude_fix: String,
}

impl Default for CoordinateNames {
    fn default() -> Self {
        CoordinateNames {
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            depth: "depth".to_string(),
            latitude_fix: "latitude_fix".to_string(),
            longitude_fix: "longitude_fix".to_string(),
        }
    }
}

/// Parse an analog channel spec of the form `<chan>:<var>:<units>`, e.g.
/// `V0:rhodamine:volts`.
pub fn parse_analog_spec(s: &str) -> Result<(String, String, String), ConfigError> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [chan, var, units] if !chan.is_empty() && !var.is_empty() => {
            Ok((chan.to_string(), var.to_string(), units.to_string()))
        }
        _ => Err(ConfigError::BadAnalogSpec(s.to_string())),
    }
}
