use std::path::PathBuf;

use clap::{AppSettings, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};

use stoqs_convert::{
    config::{ParameterMap, DEFAULT_LRAUV_PARMS},
    error::ConfigError,
    grid::Frequency,
    interp::{Extrapolation, InterpolationOptions},
    logging::setup_logging,
    pipeline::{
        find_inputs, parse_date, resampled_output_path, run_batch, ConversionRequest, DateWindow,
    },
    read::nc::NetcdfSource,
    write::command_line,
    FILL_VALUE,
};

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
#[clap(version, about = "Interpolate the variables of trajectory NetCDF files onto a common time grid")]
struct Args {
    /// NetCDF files or OPeNDAP URLs to convert.
    inputs: Vec<String>,

    /// Also convert the files in this directory whose names match --pattern.
    #[clap(short, long)]
    in_dir: Option<PathBuf>,

    /// A regular expression for file names in --in-dir (searched
    /// recursively).
    #[clap(short, long, default_value = r"\.nc4?$")]
    pattern: String,

    /// Only convert inputs from mission directories (e.g.
    /// 20180101_20180131) starting on or after this date (YYYYMMDD).
    #[clap(long)]
    start: Option<String>,

    /// Only convert inputs from mission directories ending on or before this
    /// date (YYYYMMDD).
    #[clap(long)]
    end: Option<String>,

    /// Where to write the outputs. The default is next to each input (or the
    /// working directory for URLs).
    #[clap(short, long)]
    output_dir: Option<PathBuf>,

    #[clap(long, default_value = "LRAUV interpolated data")]
    title: String,

    #[clap(long)]
    summary: Option<String>,

    #[clap(long)]
    license: Option<String>,

    /// The parameter map as JSON, e.g. '{"CTD_NeilBrown": [{"name":
    /// "sea_water_temperature", "rename": "temperature"}]}'. The default is
    /// the usual LRAUV science variables.
    #[clap(long, conflicts_with = "parms_file")]
    parms: Option<String>,

    /// A file holding the parameter map.
    #[clap(long)]
    parms_file: Option<PathBuf>,

    /// The resolution the grid is built at (e.g. 500ms, 1S).
    #[clap(long, default_value = "500ms")]
    fine: String,

    /// The output interval (e.g. 2S, 10S, 5Min).
    #[clap(short, long, default_value = "2S")]
    coarse: String,

    /// Appended to output file names.
    #[clap(long, default_value = "resampled")]
    suffix: String,

    /// Output names of the series whose time range defines the grid, in order
    /// of preference.
    #[clap(short, long, multiple_values(true), default_values = &["chlorophyll", "depth"])]
    reference: Vec<String>,

    /// What to do at grid times outside a series' time range: "clamp" to the
    /// nearest value or "fill".
    #[clap(long, default_value = "clamp")]
    extrapolation: Extrapolation,

    /// Average each parameter into coarse bins before interpolating.
    #[clap(long)]
    bin_mean: bool,

    /// Latitude and longitude are in radians.
    #[clap(long)]
    coords_in_radians: bool,

    /// Nudge dead-reckoned positions toward the GPS fixes (latitude_fix and
    /// longitude_fix).
    #[clap(long)]
    nudge: bool,

    /// Keep every nth grid point.
    #[clap(long, default_value = "1")]
    stride: usize,

    /// Convert inputs even if their outputs already exist.
    #[clap(long)]
    overwrite: bool,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbosity);

    match try_main(args) {
        Ok(true) => (),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every input was converted.
fn try_main(args: Args) -> Result<bool, ConfigError> {
    let parameters = match (&args.parms, &args.parms_file) {
        (Some(json), _) => ParameterMap::from_json(json)?,
        (None, Some(path)) => ParameterMap::from_file(path)?,
        (None, None) => ParameterMap::from_json(DEFAULT_LRAUV_PARMS)?,
    };
    let fine: Frequency = args.fine.parse()?;
    let coarse: Frequency = args.coarse.parse()?;
    if args.stride == 0 {
        return Err(ConfigError::ZeroStride);
    }

    let window = DateWindow {
        start: args.start.as_deref().map(parse_date).transpose()?,
        end: args.end.as_deref().map(parse_date).transpose()?,
    };

    let mut inputs = args.inputs.clone();
    if let Some(dir) = &args.in_dir {
        inputs.extend(find_inputs(dir, &args.pattern)?);
    }
    let inputs = window.filter(inputs);
    if inputs.is_empty() {
        warn!("Nothing to convert");
        return Ok(true);
    }
    info!("{} input(s)", inputs.len());

    let mut request = ConversionRequest::new(parameters.requests(), fine, coarse.clone());
    request.coords_in_radians = args.coords_in_radians;
    request.nudge = args.nudge;
    request.reference_candidates = args.reference.clone();
    request.interpolation = InterpolationOptions {
        extrapolation: args.extrapolation,
        fill_value: FILL_VALUE,
    };
    request.bin_mean = args.bin_mean;
    request.stride = args.stride;
    request.title = args.title.clone();
    request.summary = args.summary.clone();
    request.license = args.license.clone();
    debug!("Conversion settings: {request:?}");

    let progress_bar = ProgressBar::with_draw_target(
        Some(inputs.len() as _),
        if args.no_progress_bars {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stdout()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} files ({elapsed_precise}<{eta_precise})")?
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Converting");
    progress_bar.tick();

    let cmd_line = command_line();
    let report = run_batch(
        &inputs,
        &request,
        args.overwrite,
        |input| NetcdfSource::open(input),
        |input| resampled_output_path(input, args.output_dir.as_deref(), &coarse, &args.suffix),
        cmd_line.as_deref(),
        Some(&progress_bar),
    );

    info!(
        "Converted {}, skipped {}, failed {}",
        report.converted.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for (input, e) in &report.failed {
        warn!("{input}: {e}");
    }
    Ok(report.all_succeeded())
}
