//! Converting one input file at a time into a grid-aligned trajectory file.

use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use hifitime::Epoch;
use indicatif::ProgressBar;
use log::{debug, info, trace, warn};
use regex::Regex;

use crate::{
    config::{CoordinateNames, ParameterRequest},
    error::{ConfigError, ConvertError},
    grid::{CommonTimeGrid, Frequency},
    interp::{align, interpolate, InterpolatedSeries, InterpolationOptions},
    nudge::{nudge_to_fixes, NudgeReport},
    read::SeriesSource,
    record::{DataVariable, DatasetMetadata, ParameterMeta, TrajectoryRecord},
    resample::bin_mean,
    series::RawSeries,
    units::radians_to_degrees,
    validity::resolve_valid_time_range,
    write::write_trajectory,
};

/// Where a conversion is up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    OpenSource,
    ExtractSeries,
    ResolveValidity,
    BuildGrid,
    InterpolateAll,
    WriteOutput,
    Done,
    Failed,
}

impl Display for ConversionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConversionState::OpenSource => "open source",
            ConversionState::ExtractSeries => "extract series",
            ConversionState::ResolveValidity => "resolve validity",
            ConversionState::BuildGrid => "build grid",
            ConversionState::InterpolateAll => "interpolate",
            ConversionState::WriteOutput => "write output",
            ConversionState::Done => "done",
            ConversionState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// How the output time axis is made.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSpec {
    /// Built at `fine` over the reference's time range, keeping one point per
    /// `coarse` bin. Every series is interpolated onto it.
    Resampled { fine: Frequency, coarse: Frequency },

    /// The reference series' own timestamps. Series logged at those
    /// timestamps are written sample for sample.
    AsReported,
}

/// Everything about a conversion that isn't the input itself.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// The science variables, in output order.
    pub parameters: Vec<ParameterRequest>,

    pub coordinates: CoordinateNames,

    /// Latitude and longitude are stored in radians (LRAUV logs).
    pub coords_in_radians: bool,

    /// Output names of the series whose time range may define the grid, in
    /// order of preference.
    pub reference_candidates: Vec<String>,

    pub grid: GridSpec,

    pub interpolation: InterpolationOptions,

    /// Average each parameter into `coarse` bins before interpolating. Only
    /// applies to resampled grids.
    pub bin_mean: bool,

    /// Nudge dead-reckoned positions toward the GPS fixes.
    pub nudge: bool,

    /// Keep every `stride`th grid point.
    pub stride: usize,

    pub title: String,

    /// Extra summary text. The input's name is always appended.
    pub summary: Option<String>,

    pub license: Option<String>,
}

impl ConversionRequest {
    /// Interpolate onto a grid resampled from `fine` to `coarse`.
    pub fn new(parameters: Vec<ParameterRequest>, fine: Frequency, coarse: Frequency) -> ConversionRequest {
        ConversionRequest::with_grid(parameters, GridSpec::Resampled { fine, coarse })
    }

    /// Write every sample at the time it was reported.
    pub fn as_reported(parameters: Vec<ParameterRequest>) -> ConversionRequest {
        ConversionRequest::with_grid(parameters, GridSpec::AsReported)
    }

    fn with_grid(parameters: Vec<ParameterRequest>, grid: GridSpec) -> ConversionRequest {
        ConversionRequest {
            parameters,
            coordinates: CoordinateNames::default(),
            coords_in_radians: false,
            reference_candidates: vec!["chlorophyll".to_string(), "depth".to_string()],
            grid,
            interpolation: InterpolationOptions::default(),
            bin_mean: false,
            nudge: false,
            stride: 1,
            title: "Trajectory data interpolated onto a common time grid".to_string(),
            summary: None,
            license: None,
        }
    }

    fn summary_for(&self, source_name: &str, nudged: Option<&NudgeReport>) -> String {
        let mut note = format!("Observational oceanographic data translated with modification from original data file {source_name}");
        if let Some(report) = nudged {
            note.push_str(". ");
            note.push_str(&report.summary_note());
        }
        match self.summary.as_deref() {
            None | Some("") => note,
            Some(s) if s.ends_with('.') => format!("{s} {note}"),
            Some(s) => format!("{s}. {note}"),
        }
    }
}

/// What a successful conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    pub source_name: String,
    pub output: PathBuf,
    pub grid_len: usize,

    /// The series whose time range the grid covers.
    pub reference: String,

    /// Output names of parameters found in the source.
    pub found: Vec<String>,

    /// Output names of parameters written as all fill.
    pub missing: Vec<String>,
}

/// A single file's trip through the states, keeping the states visited.
pub struct FileConversion<'r> {
    request: &'r ConversionRequest,
    source_name: String,
    trace: Vec<ConversionState>,
}

impl<'r> FileConversion<'r> {
    pub fn new<S: Into<String>>(request: &'r ConversionRequest, source_name: S) -> FileConversion<'r> {
        FileConversion {
            request,
            source_name: source_name.into(),
            trace: vec![],
        }
    }

    /// The states entered so far, in order.
    pub fn trace(&self) -> &[ConversionState] {
        &self.trace
    }

    pub fn state(&self) -> Option<ConversionState> {
        self.trace.last().copied()
    }

    fn enter(&mut self, state: ConversionState) {
        match self.state() {
            Some(previous) => debug!("{}: {previous} -> {state}", self.source_name),
            None => debug!("{}: {state}", self.source_name),
        }
        self.trace.push(state);
    }

    fn finish<T>(&mut self, result: Result<T, ConvertError>) -> Result<T, ConvertError> {
        match &result {
            Ok(_) => self.enter(ConversionState::Done),
            Err(e) => {
                if let Some(state) = self.state() {
                    debug!("{}: failed in '{state}': {e}", self.source_name);
                }
                self.enter(ConversionState::Failed);
            }
        }
        result
    }

    /// Open a source, build its record and write it to `output`.
    pub fn run<S, F>(
        &mut self,
        open: F,
        output: &Path,
        command_line: Option<&str>,
    ) -> Result<ConversionSummary, ConvertError>
    where
        S: SeriesSource,
        F: FnOnce() -> Result<S, ConvertError>,
    {
        let result = self.run_inner(open, output, command_line);
        self.finish(result)
    }

    fn run_inner<S, F>(
        &mut self,
        open: F,
        output: &Path,
        command_line: Option<&str>,
    ) -> Result<ConversionSummary, ConvertError>
    where
        S: SeriesSource,
        F: FnOnce() -> Result<S, ConvertError>,
    {
        self.enter(ConversionState::OpenSource);
        let source = open()?;
        self.source_name = source.source_name().to_string();

        let record = self.build_inner(&source)?;

        self.enter(ConversionState::WriteOutput);
        write_trajectory(&record, output, command_line).map_err(|source| ConvertError::Write {
            path: output.to_path_buf(),
            source,
        })?;

        let (found, missing): (Vec<&DataVariable>, Vec<&DataVariable>) =
            record.variables().iter().partition(|v| v.found);
        Ok(ConversionSummary {
            source_name: self.source_name.clone(),
            output: output.to_path_buf(),
            grid_len: record.grid().len(),
            reference: record.metadata().reference_variable.clone(),
            found: found.into_iter().map(|v| v.name.clone()).collect(),
            missing: missing.into_iter().map(|v| v.name.clone()).collect(),
        })
    }

    /// Everything up to (not including) writing: extract, resolve the time
    /// range, build the grid and interpolate.
    pub fn build_record<S: SeriesSource>(&mut self, source: &S) -> Result<TrajectoryRecord, ConvertError> {
        let result = self.build_inner(source);
        self.finish(result)
    }

    fn build_inner<S: SeriesSource>(&mut self, source: &S) -> Result<TrajectoryRecord, ConvertError> {
        let request = self.request;

        self.enter(ConversionState::ExtractSeries);
        let coordinates = &request.coordinates;
        let latitude = self.extract_coordinate(source, "latitude", &coordinates.latitude, true)?;
        let longitude = self.extract_coordinate(source, "longitude", &coordinates.longitude, true)?;
        let (latitude, longitude, nudged) = if request.nudge {
            self.nudge(source, latitude, longitude)?
        } else {
            (latitude, longitude, None)
        };
        let depth = self.extract_coordinate(source, "depth", &coordinates.depth, false)?;
        let mut parameters = vec![];
        for parameter in &request.parameters {
            let series = self.extract(source, parameter, request.bin_mean)?;
            parameters.push((parameter, series));
        }

        self.enter(ConversionState::ResolveValidity);
        let candidates: Vec<&RawSeries> = request
            .reference_candidates
            .iter()
            .filter_map(|name| {
                [&latitude, &longitude, &depth]
                    .into_iter()
                    .chain(parameters.iter().filter_map(|(_, s)| s.as_ref()))
                    .find(|s| &s.name == name)
            })
            .collect();
        let range = resolve_valid_time_range(&candidates).ok_or_else(|| {
            ConvertError::NoValidTimeRange {
                candidates: request.reference_candidates.clone(),
            }
        })?;

        self.enter(ConversionState::BuildGrid);
        let grid = match &request.grid {
            GridSpec::Resampled { fine, coarse } => CommonTimeGrid::generate(&range, fine, coarse)?,
            GridSpec::AsReported => {
                let reference = candidates
                    .iter()
                    .find(|s| s.name == range.reference)
                    .ok_or_else(|| {
                        ConvertError::InvalidGrid(format!("lost track of '{}'", range.reference))
                    })?;
                CommonTimeGrid::as_reported(reference.times.clone())?
            }
        };
        info!(
            "{}: {} grid points from {} to {} (reference '{}')",
            self.source_name,
            grid.len(),
            grid.first(),
            grid.last(),
            range.reference
        );

        self.enter(ConversionState::InterpolateAll);
        let options = request.interpolation;
        let project = |series: &RawSeries| match request.grid {
            GridSpec::Resampled { .. } => interpolate(series, &grid, options),
            GridSpec::AsReported => align(series, &grid, options),
        };
        let no_attributes = BTreeMap::new();
        let variables = parameters
            .iter()
            .map(|(parameter, raw)| {
                let (series, attributes) = match raw {
                    Some(s) => (project(s), &s.attributes),
                    None => (
                        InterpolatedSeries::all_fill(grid.len(), options.fill_value),
                        &no_attributes,
                    ),
                };
                DataVariable {
                    name: parameter.output_name().to_string(),
                    meta: ParameterMeta::resolve(parameter, attributes, options.fill_value),
                    series,
                    found: raw.is_some(),
                }
            })
            .collect();
        let latitude = project(&latitude);
        let longitude = project(&longitude);
        let depth = project(&depth);

        let metadata = DatasetMetadata {
            title: request.title.clone(),
            summary: request.summary_for(&self.source_name, nudged.as_ref()),
            license: request.license.clone(),
            source_name: self.source_name.clone(),
            reference_variable: range.reference.clone(),
            grid_intervals: match &request.grid {
                GridSpec::Resampled { fine, coarse } => Some((fine.to_string(), coarse.to_string())),
                GridSpec::AsReported => None,
            },
        };
        let record = TrajectoryRecord::new(grid, latitude, longitude, depth, variables, metadata)?;
        if request.stride > 1 {
            record.decimated(request.stride)
        } else {
            Ok(record)
        }
    }

    /// Nudge the positions toward the source's GPS fixes. Without usable
    /// fixes the positions are returned as they are.
    fn nudge<S: SeriesSource>(
        &self,
        source: &S,
        latitude: RawSeries,
        longitude: RawSeries,
    ) -> Result<(RawSeries, RawSeries, Option<NudgeReport>), ConvertError> {
        let coordinates = &self.request.coordinates;
        let latitude_fix =
            self.extract_coordinate(source, "latitude_fix", &coordinates.latitude_fix, true)?;
        let longitude_fix =
            self.extract_coordinate(source, "longitude_fix", &coordinates.longitude_fix, true)?;
        match nudge_to_fixes(&latitude, &longitude, &latitude_fix, &longitude_fix) {
            Some(nudged) => Ok((nudged.latitude, nudged.longitude, Some(nudged.report))),
            None => {
                warn!("{}: positions are not nudged", self.source_name);
                Ok((latitude, longitude, None))
            }
        }
    }

    /// A coordinate is never optional; a missing one is an empty series.
    fn extract_coordinate<S: SeriesSource>(
        &self,
        source: &S,
        output_name: &str,
        input_name: &str,
        is_angle: bool,
    ) -> Result<RawSeries, ConvertError> {
        let mut request = ParameterRequest::root(input_name);
        request.spec.rename = Some(output_name.to_string());
        request.spec.to_degrees = is_angle && self.request.coords_in_radians;
        Ok(self
            .extract(source, &request, false)?
            .unwrap_or_else(|| RawSeries::empty(output_name)))
    }

    /// Read one variable, renamed to its output name, with the configured
    /// conversions applied. `None` if the source doesn't have it.
    fn extract<S: SeriesSource>(
        &self,
        source: &S,
        request: &ParameterRequest,
        bin: bool,
    ) -> Result<Option<RawSeries>, ConvertError> {
        let mut series = match source.read_series(request)? {
            Some(s) => s,
            None => {
                warn!(
                    "{}: no variable '{}'{}; it will be all fill",
                    self.source_name,
                    request.spec.name,
                    request
                        .group
                        .as_ref()
                        .map(|g| format!(" in group '{g}'"))
                        .unwrap_or_default()
                );
                return Ok(None);
            }
        };
        trace!("{}: read '{}' ({} samples)", self.source_name, request.spec.name, series.len());
        series.name = request.output_name().to_string();
        if request.spec.to_degrees {
            series = series.map_values(radians_to_degrees);
        }
        if let (true, GridSpec::Resampled { coarse, .. }) = (bin, &self.request.grid) {
            series = bin_mean(&series, coarse);
        }
        Ok(Some(series))
    }
}

/// Convert one input. See [`FileConversion::run`].
pub fn convert_file<S, F>(
    request: &ConversionRequest,
    source_name: &str,
    open: F,
    output: &Path,
    command_line: Option<&str>,
) -> Result<ConversionSummary, ConvertError>
where
    S: SeriesSource,
    F: FnOnce() -> Result<S, ConvertError>,
{
    FileConversion::new(request, source_name).run(open, output, command_line)
}

/// The final path component of a file path or URL, without its extension.
pub fn input_stem(input: &str) -> &str {
    let name = input
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(input);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// `<dir>/<stem>_<coarse>_<suffix>.nc`. Without an `output_dir`, local inputs
/// are written next to themselves and URLs to the working directory.
pub fn resampled_output_path(
    input: &str,
    output_dir: Option<&Path>,
    coarse: &Frequency,
    suffix: &str,
) -> PathBuf {
    let mut name = format!("{}_{coarse}", input_stem(input));
    if !suffix.is_empty() {
        name.push('_');
        name.push_str(suffix);
    }
    name.push_str(".nc");

    let dir = match output_dir {
        Some(d) => d.to_path_buf(),
        None if input.contains("://") => PathBuf::from("."),
        None => Path::new(input)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    dir.join(name)
}

/// The files under `dir` (searched recursively) whose names match
/// `pattern`, sorted.
pub fn find_inputs(dir: &Path, pattern: &str) -> Result<Vec<String>, ConfigError> {
    let re = Regex::new(pattern).map_err(|source| ConfigError::BadPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    let mut inputs = vec![];
    let mut dirs = vec![dir.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let read_error = |source| ConfigError::ReadFile {
            path: dir.clone(),
            source,
        };
        for entry in std::fs::read_dir(&dir).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            if path.is_dir() {
                dirs.push(path);
                continue;
            }
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| re.is_match(n));
            if matches && path.is_file() {
                inputs.push(path.display().to_string());
            }
        }
    }
    inputs.sort_unstable();
    debug!("Found {inputs:?} in {}", dir.display());
    Ok(inputs)
}

/// Parse a `YYYYMMDD` date as midnight UTC.
pub fn parse_date(s: &str) -> Result<Epoch, ConfigError> {
    let bad = || ConfigError::BadDate(s.to_string());
    if s.len() != 8 || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let year = s[0..4].parse().map_err(|_| bad())?;
    let month = s[4..6].parse().map_err(|_| bad())?;
    let day = s[6..8].parse().map_err(|_| bad())?;
    Epoch::maybe_from_gregorian_utc(year, month, day, 0, 0, 0, 0).map_err(|_| bad())
}

/// The dates of the mission directory (e.g. `20180101_20180131`) an input
/// is logged under, if any.
pub fn mission_dates(input: &str) -> Option<(Epoch, Epoch)> {
    input.split(['/', '\\']).find_map(|component| {
        let (start, rest) = component.split_once('_')?;
        let end = rest.get(..8)?;
        if rest.len() > 8 && !rest[8..].starts_with('.') {
            return None;
        }
        Some((parse_date(start).ok()?, parse_date(end).ok()?))
    })
}

/// Only convert inputs from missions inside these dates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DateWindow {
    pub start: Option<Epoch>,
    pub end: Option<Epoch>,
}

impl DateWindow {
    pub fn is_open(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Does the mission `input` belongs to lie inside the window? With any
    /// bound set, inputs outside a mission directory don't.
    pub fn contains(&self, input: &str) -> bool {
        if self.is_open() {
            return true;
        }
        match mission_dates(input) {
            Some((start, end)) => {
                self.start.map_or(true, |s| start >= s) && self.end.map_or(true, |e| end <= e)
            }
            None => {
                debug!("No mission dates in {input}");
                false
            }
        }
    }

    /// Drop the inputs outside the window.
    pub fn filter(&self, inputs: Vec<String>) -> Vec<String> {
        let (kept, dropped): (Vec<String>, Vec<String>) =
            inputs.into_iter().partition(|i| self.contains(i));
        if !dropped.is_empty() {
            info!("Skipping {} input(s) outside the date window", dropped.len());
            trace!("Skipped {dropped:?}");
        }
        kept
    }
}

/// How a batch went.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<ConversionSummary>,

    /// Outputs that already existed.
    pub skipped: Vec<PathBuf>,

    pub failed: Vec<(String, ConvertError)>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Convert every input independently. A failure is logged and the batch
/// moves on to the next input.
///
/// # Arguments
///
/// * `inputs` - file paths or URLs.
/// * `request` - the conversion settings shared by every input.
/// * `overwrite` - convert inputs whose output already exists.
/// * `open` - opens an input as a [`SeriesSource`].
/// * `output_for` - the output path of an input.
/// * `command_line` - recorded in each output's history.
/// * `progress_bar` - incremented once per input.
#[allow(clippy::too_many_arguments)]
pub fn run_batch<S, O, P>(
    inputs: &[String],
    request: &ConversionRequest,
    overwrite: bool,
    open: O,
    output_for: P,
    command_line: Option<&str>,
    progress_bar: Option<&ProgressBar>,
) -> BatchReport
where
    S: SeriesSource,
    O: Fn(&str) -> Result<S, ConvertError>,
    P: Fn(&str) -> PathBuf,
{
    let mut report = BatchReport::default();
    for input in inputs {
        let output = output_for(input);
        if output.exists() && !overwrite {
            info!("{} exists; skipping {input}", output.display());
            report.skipped.push(output);
        } else {
            info!("Converting {input} to {}", output.display());
            match convert_file(request, input, || open(input), &output, command_line) {
                Ok(summary) => {
                    if !summary.missing.is_empty() {
                        info!("{input}: all fill for {:?}", summary.missing);
                    }
                    report.converted.push(summary);
                }
                Err(e) => {
                    warn!("Couldn't convert {input}: {e}");
                    report.failed.push((input.clone(), e));
                }
            }
        }

        if let Some(progress_bar) = progress_bar {
            progress_bar.inc(1);
        }
    }

    if let Some(progress_bar) = progress_bar {
        progress_bar.abandon_with_message("Finished converting");
    }
    report
}
