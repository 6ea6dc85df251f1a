//! SeaBird CTD `.asc` exports and their `.hdr` sidecars.
//!
//! An `.asc` file is a whitespace-aligned table with a header row, e.g.
//!
//! ```text
//!       TimeJ   Latitude  Longitude      C0S/m      T090C      T190C      Sal00      Xmiss ...
//!  256.016725   36.80298 -121.78703   4.179700    13.4226    13.4220    33.5062    88.4574 ...
//! ```
//!
//! The year isn't in the table; it comes from the `.hdr` file's
//! `NMEA UTC (Time)` line. Profile casts also take their position from the
//! header.

use std::{
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use log::{debug, trace, warn};

use super::memory::MemorySource;
use crate::{
    config::{ParameterRequest, ParameterSpec},
    error::ConvertError,
    pipeline::ConversionRequest,
    series::RawSeries,
    units::{degrees_minutes_to_decimal, julian_day_to_epoch, pressure_to_depth},
};

/// SeaBird's "bad value" marker.
const SEABIRD_BAD_VALUE: &str = "-9.990e-29";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtdKind {
    /// Underway, towed near the surface at a nominal depth.
    Underway,

    /// Profile casts from a rosette.
    Profile,
}

impl FromStr for CtdKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uctd" | "underway" => Ok(CtdKind::Underway),
            "pctd" | "profile" => Ok(CtdKind::Profile),
            _ => Err(format!("'{s}' isn't one of 'uctd' or 'pctd'")),
        }
    }
}

impl CtdKind {
    pub fn default_title(self) -> &'static str {
        match self {
            CtdKind::Underway => "Underway CTD data",
            CtdKind::Profile => "Profile CTD cast data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AscOptions {
    /// Required for underway data.
    pub nominal_depth: Option<f64>,

    /// Salinities below this are treated as missing.
    pub min_psal: Option<f64>,

    /// An extra analog channel to carry through: (column, variable, units).
    pub analog: Option<(String, String, String)>,
}

/// What the `.hdr` sidecar tells us.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastHeader {
    pub year: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// The `.hdr` file next to an `.asc` file.
pub fn header_path(asc: &Path) -> PathBuf {
    asc.with_extension("hdr")
}

/// Parse the contents of a `.hdr` file.
pub fn parse_header<R: Read>(source_name: &str, reader: R) -> Result<CastHeader, ConvertError> {
    let malformed = |reason: String| ConvertError::MalformedSource {
        source_name: source_name.to_string(),
        reason,
    };

    let mut year = None;
    let mut latitude = None;
    let mut longitude = None;
    for line in BufReader::new(reader).lines() {
        let line = line.map_err(|e| malformed(e.to_string()))?;
        let value = match line.split_once('=') {
            Some((_, v)) => v.trim(),
            None => continue,
        };
        if line.contains("NMEA Latitude") {
            latitude = degrees_minutes_to_decimal(value);
        } else if line.contains("NMEA Longitude") {
            longitude = degrees_minutes_to_decimal(value);
        } else if line.contains("NMEA UTC (Time)")
            || (year.is_none() && line.contains("System UTC"))
        {
            // e.g. "Sep 15 2012 06:49:50"
            year = value
                .split_whitespace()
                .find(|t| t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()))
                .and_then(|t| t.parse().ok());
        }
    }

    match year {
        Some(year) => Ok(CastHeader {
            year,
            latitude,
            longitude,
        }),
        None => Err(malformed("no year in the header's UTC time lines".to_string())),
    }
}

/// A column of the table, if present.
struct Column {
    index: Option<usize>,
    values: Vec<f64>,
}

impl Column {
    fn new(headers: &csv::StringRecord, names: &[&str]) -> Column {
        let index = names
            .iter()
            .find_map(|name| headers.iter().position(|h| h == *name));
        Column {
            index,
            values: vec![],
        }
    }

    fn is_present(&self) -> bool {
        self.index.is_some()
    }

    /// Unparsable or absent cells are NaN, i.e. missing.
    fn push(&mut self, record: &csv::StringRecord) {
        if let Some(i) = self.index {
            let v = record
                .get(i)
                .filter(|s| *s != SEABIRD_BAD_VALUE)
                .and_then(|s| s.parse().ok())
                .unwrap_or(f64::NAN);
            self.values.push(v);
        }
    }
}

/// An output variable of a CTD conversion with its fixed metadata.
fn ctd_request(name: &str, long_name: &str, units: &str, standard_name: Option<&str>) -> ParameterRequest {
    ParameterRequest {
        group: None,
        spec: ParameterSpec {
            name: name.to_string(),
            rename: None,
            units: Some(units.to_string()),
            standard_name: standard_name.map(str::to_string),
            long_name: Some(long_name.to_string()),
            to_degrees: false,
        },
    }
}

/// The variables a converted CTD file carries, in output order. Ones the
/// input lacks come out all fill.
pub fn ctd_requests(kind: CtdKind, options: &AscOptions) -> Vec<ParameterRequest> {
    let mut requests = vec![
        ctd_request(
            "TEMP",
            "Temperature, [ITS-90, deg C]",
            "Celsius",
            Some("sea_water_temperature"),
        ),
        ctd_request(
            "PSAL",
            "Salinity, Practical [PSU]",
            "1",
            Some("sea_water_salinity"),
        ),
        ctd_request("xmiss", "Beam Transmission, Chelsea/Seatech", "%", None),
        ctd_request("wetstar", "Fluorescence, WET Labs WETstar", "mg/m^3", None),
    ];
    if kind == CtdKind::Profile {
        requests.push(ctd_request(
            "ecofl",
            "Fluorescence, WET Labs ECO-AFL/FL",
            "mg/m^3",
            None,
        ));
        requests.push(ctd_request("oxygen", "Oxygen, SBE 43", "ml/l", None));
    }
    if let Some((chan, var, units)) = &options.analog {
        requests.push(ctd_request(var, &format!("Analog channel {chan}"), units, None));
    }
    requests
}

/// How a CTD file is converted: every row is written as it was reported,
/// with depth as the reference series.
pub fn ctd_conversion(kind: CtdKind, options: &AscOptions) -> ConversionRequest {
    let mut request = ConversionRequest::as_reported(ctd_requests(kind, options));
    request.reference_candidates = vec!["depth".to_string()];
    request.title = kind.default_title().to_string();
    request
}

/// Parse an `.asc` table into series named `latitude`, `longitude`, `depth`
/// and the [`ctd_requests`] names.
pub fn parse_asc<R: Read>(
    source_name: &str,
    reader: R,
    kind: CtdKind,
    header: &CastHeader,
    options: &AscOptions,
) -> Result<MemorySource, ConvertError> {
    let malformed = |reason: String| ConvertError::MalformedSource {
        source_name: source_name.to_string(),
        reason,
    };

    // Columns are aligned with runs of spaces; collapse them so the csv
    // reader sees single delimiters.
    let mut text = String::new();
    BufReader::new(reader)
        .read_to_string(&mut text)
        .map_err(|e| malformed(e.to_string()))?;
    let normalised = text
        .lines()
        .map(|l| l.split_whitespace().join(" "))
        .filter(|l| !l.is_empty())
        .join("\n");
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .flexible(true)
        .from_reader(normalised.as_bytes());
    let headers = csv_reader
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .clone();
    trace!("{source_name} columns: {:?}", headers);

    let time_j = headers
        .iter()
        .position(|h| h == "TimeJ")
        .ok_or_else(|| malformed("no TimeJ column".to_string()))?;

    let mut times = vec![];
    let mut latitude = Column::new(&headers, &["Latitude"]);
    let mut longitude = Column::new(&headers, &["Longitude"]);
    let mut pressure = Column::new(&headers, &["PrDM", "PrdM"]);
    let temperature_names: &[&str] = match kind {
        CtdKind::Underway => &["T090C"],
        CtdKind::Profile => &["T190C", "Tv290C", "T090C"],
    };
    let mut temperature = Column::new(&headers, temperature_names);
    let mut salinity = Column::new(&headers, &["Sal00"]);
    let mut xmiss = Column::new(&headers, &["Xmiss"]);
    let mut wetstar = Column::new(&headers, &["WetStar"]);
    let mut ecofl = Column::new(&headers, &["FlECO-AFL"]);
    let mut oxygen = Column::new(&headers, &["Sbeox0ML/L"]);
    let mut analog = match &options.analog {
        Some((chan, _, _)) => Column::new(&headers, &[chan.as_str()]),
        None => Column {
            index: None,
            values: vec![],
        },
    };
    if options.analog.is_some() && !analog.is_present() {
        warn!("{source_name}: analog channel column not found");
    }

    let mut skipped = 0;
    for (i_row, record) in csv_reader.records().enumerate() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        let tj = match record.get(time_j) {
            None | Some("") | Some(SEABIRD_BAD_VALUE) => {
                skipped += 1;
                continue;
            }
            Some(tj) => tj,
        };
        let tj: f64 = tj
            .parse()
            .map_err(|_| malformed(format!("row {}: bad TimeJ '{tj}'", i_row + 1)))?;
        times.push(julian_day_to_epoch(header.year, tj)?);

        for column in [
            &mut latitude,
            &mut longitude,
            &mut pressure,
            &mut temperature,
            &mut salinity,
            &mut xmiss,
            &mut wetstar,
            &mut ecofl,
            &mut oxygen,
            &mut analog,
        ] {
            column.push(&record);
        }
    }
    if skipped > 0 {
        debug!("{source_name}: skipped {skipped} rows without a TimeJ");
    }
    let n = times.len();

    let position = |column: Column, from_header: Option<f64>, what: &str| {
        if column.is_present() {
            Ok(column.values)
        } else {
            from_header
                .map(|v| vec![v; n])
                .ok_or_else(|| malformed(format!("no {what} in the table or the header")))
        }
    };
    let lat = position(latitude, header.latitude, "latitude")?;
    let lon = position(longitude, header.longitude, "longitude")?;

    let depth = match kind {
        CtdKind::Underway => {
            let d = options
                .nominal_depth
                .ok_or_else(|| malformed("underway CTD data needs a nominal depth".to_string()))?;
            vec![d; n]
        }
        CtdKind::Profile => {
            if !pressure.is_present() {
                return Err(malformed("no PrDM or PrdM column".to_string()));
            }
            pressure
                .values
                .iter()
                .zip(lat.iter())
                .map(|(&p, &lat)| pressure_to_depth(p, lat))
                .collect()
        }
    };

    let mut psal = salinity.values;
    if let Some(min) = options.min_psal {
        for v in psal.iter_mut().filter(|v| **v < min) {
            *v = f64::NAN;
        }
    }

    let mut source = MemorySource::new(source_name)
        .with(RawSeries::new("latitude", times.clone(), lat))
        .with(RawSeries::new("longitude", times.clone(), lon))
        .with(RawSeries::new("depth", times.clone(), depth));
    let data = [
        ("TEMP", temperature.values),
        ("PSAL", psal),
        ("xmiss", xmiss.values),
        ("wetstar", wetstar.values),
        ("ecofl", ecofl.values),
        ("oxygen", oxygen.values),
    ];
    for (name, values) in data {
        if values.len() == n && n > 0 {
            source.insert(RawSeries::new(name, times.clone(), values));
        }
    }
    if let Some((_, var, _)) = &options.analog {
        if analog.is_present() {
            source.insert(RawSeries::new(var.clone(), times.clone(), analog.values));
        }
    }

    debug!("{source_name}: {n} samples");
    Ok(source)
}

/// Read an `.asc` file and its `.hdr` sidecar.
pub fn open_asc(path: &Path, kind: CtdKind, options: &AscOptions) -> Result<MemorySource, ConvertError> {
    let source_name = path.display().to_string();
    let hdr = header_path(path);
    let unavailable = |p: &Path, e: std::io::Error| ConvertError::SourceUnavailable {
        source_name: p.display().to_string(),
        reason: e.to_string(),
    };

    let header = {
        let f = std::fs::File::open(&hdr).map_err(|e| unavailable(&hdr, e))?;
        parse_header(&hdr.display().to_string(), f)?
    };
    debug!("{}: {header:?}", hdr.display());
    let f = std::fs::File::open(path).map_err(|e| unavailable(path, e))?;
    parse_asc(&source_name, f, kind, &header, options)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{pipeline::FileConversion, read::SeriesSource, FILL_VALUE};

    const HDR: &str = "\
* Sea-Bird SBE 9 Data File:
* NMEA Latitude = 36 23.50 N
* NMEA Longitude = 122 41.38 W
* NMEA UTC (Time) = Sep 11 2012 03:31:14
* System UTC = Sep 11 2012 03:31:20
";

    const UCTD: &str = "\
      TimeJ   Latitude  Longitude      C0S/m      T090C      T190C      Sal00      Xmiss        Bat         V1    WetStar         V0
 259.000000   36.80298 -121.78703   4.179700    13.4226    13.4220    33.5062    88.4574     0.4909     4.4313     0.3160     0.0635
 259.500000   36.80300 -121.78700   4.179700    13.5000    13.4220     2.0000        bad     0.4909     4.4313     0.3200     0.0640
 -9.990e-29   36.80300 -121.78700   4.179700    13.5000    13.4220    33.5000    88.0000     0.4909     4.4313     0.3200     0.0640
";

    const PCTD: &str = "\
      TimeJ       PrDM      DepSM      T090C      T190C      Sal00      Xmiss  FlECO-AFL    WetStar Sbeox0ML/L
 255.146576    201.000    199.418     8.9554     8.9567    34.0047    87.0474     0.3602     0.1295    1.62677
 255.146622    100.000    198.436     8.9551     8.9556    34.0046    87.0908     0.3557     0.1294 -9.990e-29
";

    fn header() -> CastHeader {
        parse_header("c.hdr", HDR.as_bytes()).unwrap()
    }

    fn get(source: &MemorySource, name: &str) -> RawSeries {
        source
            .read_series(&ParameterRequest::root(name))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn header_fields() {
        let h = header();
        assert_eq!(h.year, 2012);
        assert_abs_diff_eq!(h.latitude.unwrap(), 36.3916667, epsilon = 1e-7);
        assert_abs_diff_eq!(h.longitude.unwrap(), -122.6896667, epsilon = 1e-7);

        assert!(parse_header("x.hdr", "* nothing here\n".as_bytes()).is_err());
    }

    #[test]
    fn underway() {
        let options = AscOptions {
            nominal_depth: Some(2.0),
            min_psal: Some(30.0),
            analog: Some(("V0".to_string(), "rhodamine".to_string(), "V".to_string())),
        };
        let source = parse_asc("u.asc", UCTD.as_bytes(), CtdKind::Underway, &header(), &options).unwrap();

        let temp = get(&source, "TEMP");
        assert_eq!(temp.times, vec![1347667200.0, 1347667200.0 + 43200.0]);
        assert_eq!(temp.values, vec![13.4226, 13.5]);

        assert_eq!(get(&source, "depth").values, vec![2.0, 2.0]);
        assert_eq!(get(&source, "latitude").values, vec![36.80298, 36.80300]);

        // Below the salinity floor and unparsable cells are missing.
        let psal = get(&source, "PSAL");
        assert_eq!(psal.values[0], 33.5062);
        assert!(psal.values[1].is_nan());
        assert!(get(&source, "xmiss").values[1].is_nan());

        assert_eq!(get(&source, "rhodamine").values, vec![0.0635, 0.0640]);
        assert!(!source.contains("oxygen"));
    }

    #[test]
    fn underway_needs_a_depth() {
        let result = parse_asc(
            "u.asc",
            UCTD.as_bytes(),
            CtdKind::Underway,
            &header(),
            &AscOptions::default(),
        );
        assert!(matches!(result, Err(ConvertError::MalformedSource { .. })));
    }

    #[test]
    fn profile() {
        let h = header();
        let source = parse_asc("c.asc", PCTD.as_bytes(), CtdKind::Profile, &h, &AscOptions::default()).unwrap();

        // Position comes from the header.
        let lat = get(&source, "latitude");
        assert_eq!(lat.values, vec![h.latitude.unwrap(); 2]);

        let depth = get(&source, "depth");
        assert_abs_diff_eq!(
            depth.values[1],
            pressure_to_depth(100.0, h.latitude.unwrap()),
            epsilon = 1e-9
        );

        // T190C is preferred over T090C for profiles.
        assert_eq!(get(&source, "TEMP").values, vec![8.9567, 8.9556]);
        let oxygen = get(&source, "oxygen");
        assert_eq!(oxygen.values[0], 1.62677);
        assert!(oxygen.values[1].is_nan());
        assert_eq!(get(&source, "ecofl").values, vec![0.3602, 0.3557]);
    }

    #[test]
    fn every_row_is_written_as_reported() {
        // Two records share a (truncated) TimeJ second.
        let asc = "\
      TimeJ       PrDM      T190C      Sal00
 255.146576    201.000     8.9567    34.0047
 255.146622    200.000     8.9556    34.0046
 255.146622    199.000     8.9550     3.0000
 255.146680    198.000     8.9540    34.0040
";
        let h = header();
        let options = AscOptions {
            min_psal: Some(30.0),
            ..Default::default()
        };
        let source = parse_asc("c.asc", asc.as_bytes(), CtdKind::Profile, &h, &options).unwrap();
        let request = ctd_conversion(CtdKind::Profile, &options);
        let record = FileConversion::new(&request, "c.asc")
            .build_record(&source)
            .unwrap();

        assert_eq!(record.grid().len(), 4);
        assert_eq!(record.grid().times()[1], record.grid().times()[2]);
        let lat = h.latitude.unwrap();
        for (depth, pressure) in record.depth().values.iter().zip([201.0, 200.0, 199.0, 198.0]) {
            assert_abs_diff_eq!(*depth, pressure_to_depth(pressure, lat), epsilon = 1e-9);
        }

        let values = |name: &str| {
            record
                .variables()
                .iter()
                .find(|v| v.name == name)
                .unwrap()
                .series
                .values
                .clone()
        };
        assert_eq!(values("TEMP"), vec![8.9567, 8.9556, 8.9550, 8.9540]);
        // Below the salinity floor stays missing in place.
        assert_eq!(values("PSAL"), vec![34.0047, 34.0046, FILL_VALUE, 34.0040]);
        assert_eq!(values("xmiss"), vec![FILL_VALUE; 4]);
        assert_eq!(record.metadata().reference_variable, "depth");
    }

    #[test]
    fn bad_time_j() {
        let asc = "TimeJ Sal00\nyesterday 33.0\n";
        let options = AscOptions {
            nominal_depth: Some(1.5),
            ..Default::default()
        };
        let mut h = header();
        h.latitude = Some(36.0);
        h.longitude = Some(-122.0);
        let result = parse_asc("u.asc", asc.as_bytes(), CtdKind::Underway, &h, &options);
        assert!(matches!(result, Err(ConvertError::MalformedSource { .. })));
    }

    #[test]
    fn requests_match_kinds() {
        let u = ctd_requests(CtdKind::Underway, &AscOptions::default());
        assert_eq!(
            u.iter().map(|r| r.output_name()).collect::<Vec<_>>(),
            vec!["TEMP", "PSAL", "xmiss", "wetstar"]
        );
        let p = ctd_requests(CtdKind::Profile, &AscOptions::default());
        assert_eq!(p.len(), 6);

        assert_eq!("pctd".parse::<CtdKind>().unwrap(), CtdKind::Profile);
        assert_eq!("UCTD".parse::<CtdKind>().unwrap(), CtdKind::Underway);
        assert!("xctd".parse::<CtdKind>().is_err());
    }
}
