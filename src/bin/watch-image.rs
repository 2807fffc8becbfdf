//! CLI entry point for `watch-image`: save, restore and dissect the disk
//! image of a watch.

use clap::{CommandFactory, Parser};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use watch_tools::codename::{self, Codename};
use watch_tools::disk::LogicalBlockSize;
use watch_tools::image::{Actions, DissectReport, Imager};
use watch_tools::transport::System;
use watch_tools::{Config, Mode, WatchError, DEFAULT_HOST, DEFAULT_PORT};

const EXIT_HELP: u8 = 1;
const EXIT_FILE: u8 = 2;
const EXIT_FAILED: u8 = 3;

/// Save, restore or dissect the disk image of a watch.
///
/// Actions run in the order save, restore, dissect.
#[derive(Parser, Debug)]
#[command(
    name = "watch-image",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Split the image into one <partition>.img file per partition
    #[arg(short, long)]
    dissect: bool,

    /// Show this help and exit
    #[arg(short, long)]
    help: bool,

    /// Talk to the watch with adb instead of ssh
    #[arg(short, long)]
    adb: bool,

    /// SSH port of the watch
    #[arg(short, long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address of the watch
    #[arg(short = 'R', long, value_name = "ADDR", default_value = DEFAULT_HOST)]
    remote: String,

    /// Image file [default: original-<codename>.img]
    #[arg(short, long, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Write partitions of the image back to the watch
    #[arg(short, long)]
    restore: bool,

    /// Save the whole eMMC of the watch into the image
    #[arg(short, long)]
    save: bool,

    /// Do not print progress messages
    #[arg(short, long)]
    quiet: bool,

    /// Print what would be done without transferring anything
    #[arg(short = 'N', long)]
    dryrun: bool,

    /// Show the version and exit
    #[arg(short, long)]
    version: bool,

    /// Partition to restore, may be repeated [default: boot, system]
    #[arg(short = 'P', long = "partition", value_name = "NAME")]
    partitions: Vec<String>,

    /// Folder receiving the files of --dissect
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Sector size of the image in bytes, 512 or 4096
    #[arg(long, value_name = "BYTES", default_value = "512", value_parser = parse_sector_size)]
    sector_size: LogicalBlockSize,

    /// Codename of the watch, e.g. catfish
    codename: Option<String>,
}

fn parse_sector_size(s: &str) -> Result<LogicalBlockSize, String> {
    let bytes: u64 = s.parse().map_err(|e| format!("{e}"))?;
    LogicalBlockSize::try_from(bytes).map_err(|e| e.to_string())
}

fn print_help() {
    let _ = Cli::command().print_help();
    println!();
    let names: Vec<_> = codename::ALL.iter().map(Codename::as_str).collect();
    println!("Supported watches: {}", names.join(", "));
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.help {
        print_help();
        return ExitCode::from(EXIT_HELP);
    }
    if cli.version {
        println!("watch-image {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let codename = match cli.codename.as_deref().map(str::parse::<Codename>) {
        Some(Ok(codename)) => codename,
        Some(Err(e)) => {
            eprintln!("{e}");
            print_help();
            return ExitCode::SUCCESS;
        }
        None => {
            eprintln!("no watch codename given");
            print_help();
            return ExitCode::SUCCESS;
        }
    };

    let image = cli
        .image
        .clone()
        .unwrap_or_else(|| PathBuf::from(codename.default_image()));
    let config = Config::new()
        .mode(if cli.adb { Mode::Adb } else { Mode::Ssh })
        .host(cli.remote.as_str())
        .port(cli.port)
        .dry_run(cli.dryrun)
        .quiet(cli.quiet)
        .logical_block_size(cli.sector_size);
    let actions = Actions {
        save: cli.save,
        restore: cli.restore,
        partitions: cli.partitions,
        dissect: cli.dissect,
        output: cli.output,
    };
    if actions.is_empty() {
        eprintln!("nothing to do, use --save, --restore or --dissect");
        return ExitCode::SUCCESS;
    }

    let mut imager = Imager::new(config, System, io::stdout());
    match imager.run(&image, &actions) {
        Ok(Some(report)) => ExitCode::from(summarize(&report)),
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Exit status for a failed run: 2 when the image is where it must not be
/// or missing where it must be, 3 otherwise.
fn exit_code(e: &WatchError) -> u8 {
    match e {
        WatchError::DestinationExists(_) | WatchError::MissingImage(_) => EXIT_FILE,
        _ => EXIT_FAILED,
    }
}

fn summarize(report: &DissectReport) -> u8 {
    if report.is_complete() {
        return 0;
    }
    for (name, e) in &report.failed {
        eprintln!("could not extract {name}: {e}");
    }
    EXIT_FAILED
}
