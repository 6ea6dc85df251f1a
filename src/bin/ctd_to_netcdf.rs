//! Convert SeaBird underway or profile CTD `.asc` exports to trajectory
//! NetCDF files, one per input. Every row is written as it was reported;
//! nothing is resampled.

use std::path::{Path, PathBuf};

use clap::{AppSettings, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{info, warn};

use stoqs_convert::{
    config::parse_analog_spec,
    error::ConfigError,
    logging::setup_logging,
    pipeline::{find_inputs, input_stem, run_batch},
    read::asc::{ctd_conversion, open_asc, AscOptions, CtdKind},
    write::command_line,
};

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
#[clap(version, about = "Convert SeaBird CTD .asc files (with .hdr sidecars) to NetCDF")]
struct Args {
    /// Either "uctd" (underway) or "pctd" (profile casts).
    #[clap(short, long)]
    kind: CtdKind,

    /// .asc files to convert.
    inputs: Vec<PathBuf>,

    /// Also convert the files in this directory whose names match --pattern.
    #[clap(short, long)]
    in_dir: Option<PathBuf>,

    /// A regular expression for file names in --in-dir.
    #[clap(short, long, default_value = r"\.asc$")]
    pattern: String,

    /// Where to write the outputs. The default is next to each input.
    #[clap(short, long)]
    output_dir: Option<PathBuf>,

    #[clap(long)]
    title: Option<String>,

    #[clap(long)]
    summary: Option<String>,

    #[clap(long)]
    license: Option<String>,

    /// The nominal depth of an underway CTD's intake \[metres\].
    #[clap(short, long)]
    depth: Option<f64>,

    /// Salinities below this are written as missing.
    #[clap(long)]
    min_psal: Option<f64>,

    /// An analog channel to carry through, as <column>:<variable>:<units>
    /// (e.g. V0:rhodamine:V).
    #[clap(long)]
    analog: Option<String>,

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

fn try_main(args: Args) -> Result<bool, ConfigError> {
    let options = AscOptions {
        nominal_depth: args.depth,
        min_psal: args.min_psal,
        analog: args.analog.as_deref().map(parse_analog_spec).transpose()?,
    };
    if args.kind == CtdKind::Underway && options.nominal_depth.is_none() {
        warn!("Underway CTD data needs --depth; every file will fail without it");
    }

    let mut inputs: Vec<String> = args
        .inputs
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    if let Some(dir) = &args.in_dir {
        inputs.extend(find_inputs(dir, &args.pattern)?);
    }
    if inputs.is_empty() {
        warn!("Nothing to convert");
        return Ok(true);
    }

    let mut request = ctd_conversion(args.kind, &options);
    if let Some(title) = &args.title {
        request.title = title.clone();
    }
    request.summary = args.summary.clone();
    request.license = args.license.clone();

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
            .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} casts ({elapsed_precise}<{eta_precise})")?
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
        |input| open_asc(Path::new(input), args.kind, &options),
        |input| {
            let name = format!("{}.nc", input_stem(input));
            match &args.output_dir {
                Some(dir) => dir.join(name),
                None => Path::new(input).with_file_name(name),
            }
        },
        cmd_line.as_deref(),
        Some(&progress_bar),
    );

    info!(
        "Converted {}, skipped {}, failed {}",
        report.converted.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report.all_succeeded())
}
