//! CLI entry point for `watch-util`: everyday management of a watch.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use watch_tools::transport::{Remote, System};
use watch_tools::watch::{self, ScreenMode, Watch};
use watch_tools::{Mode, DEFAULT_HOST, DEFAULT_PORT};

const EXIT_HELP: u8 = 1;
const EXIT_FAILED: u8 = 3;

/// Host and port of the QEMU emulator.
const QEMU_HOST: &str = "localhost";
const QEMU_PORT: u16 = 2222;

/// Manage a watch over ssh or adb.
#[derive(Parser, Debug)]
#[command(
    name = "watch-util",
    disable_help_flag = true,
    disable_version_flag = true,
    disable_help_subcommand = true
)]
struct Cli {
    /// Show this help and exit
    #[arg(short, long)]
    help: bool,

    /// Talk to the watch with adb instead of ssh
    #[arg(short, long)]
    adb: bool,

    /// SSH port of the watch [default: 22, 2222 with --qemu]
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Address of the watch [default: 192.168.2.15, localhost with --qemu]
    #[arg(short, long, value_name = "ADDR")]
    remote: Option<String>,

    /// Talk to the QEMU emulator
    #[arg(short, long)]
    qemu: bool,

    /// Show the version and exit
    #[arg(short, long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Save system and user settings into DIR
    Backup {
        #[arg(default_value = watch::DEFAULT_BACKUP_DIR)]
        dir: PathBuf,
    },
    /// Put settings saved by backup back onto the watch
    Restore {
        #[arg(default_value = watch::DEFAULT_BACKUP_DIR)]
        dir: PathBuf,
    },
    /// Reboot into the bootloader
    Fastboot,
    /// Forget the ssh host key of the watch
    Forgetkeys,
    /// Check whether the watch answers
    Present,
    /// Take a screenshot
    Snap {
        #[arg(default_value = watch::DEFAULT_SCREENSHOT)]
        file: PathBuf,
    },
    /// Set the clock of the watch to the time of this machine
    Settime,
    /// List the timezones known to the watch
    Listtimezones,
    /// Set the timezone, e.g. Europe/Berlin
    Settimezone { zone: String },
    /// Upload an image and make it the wallpaper
    Wallpaper { file: PathBuf },
    /// Restart the user session
    Restart,
    /// Reboot the watch
    Reboot,
    /// Wait until the watch answers
    Wait,
    /// Route the traffic of the watch through this machine
    Routing {
        #[arg(default_value = watch::DEFAULT_GATEWAY)]
        gateway: String,
    },
    /// Upload a watchface folder containing usr/share/...
    Pushface { dir: PathBuf },
    /// Select the active watchface by name
    Watchface { name: String },
    /// Keep the display on, or let it blank again
    Screen { state: Screen },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Screen {
    On,
    Off,
}

impl From<Screen> for ScreenMode {
    fn from(s: Screen) -> Self {
        match s {
            Screen::On => ScreenMode::On,
            Screen::Off => ScreenMode::Off,
        }
    }
}

fn remote(cli: &Cli) -> Remote {
    let mode = if cli.adb { Mode::Adb } else { Mode::Ssh };
    let (host, port) = if cli.qemu {
        (QEMU_HOST, QEMU_PORT)
    } else {
        (DEFAULT_HOST, DEFAULT_PORT)
    };
    Remote::new(
        mode,
        cli.remote.as_deref().unwrap_or(host),
        cli.port.unwrap_or(port),
    )
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.version {
        println!("watch-util {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    let action = match (&cli.command, cli.help) {
        (Some(action), false) => action,
        _ => {
            let _ = Cli::command().print_help();
            return ExitCode::from(EXIT_HELP);
        }
    };

    let mut watch = Watch::new(remote(&cli), System, io::stdout());
    let result = match action {
        Action::Backup { dir } => watch.backup(dir),
        Action::Restore { dir } => watch.restore(dir),
        Action::Fastboot => watch.fastboot(),
        Action::Forgetkeys => watch.forget_keys(),
        Action::Present => {
            if watch.present() {
                println!("present");
                Ok(())
            } else {
                println!("absent");
                return ExitCode::from(EXIT_FAILED);
            }
        }
        Action::Snap { file } => watch.snap(file),
        Action::Settime => watch.set_time(SystemTime::now()),
        Action::Listtimezones => watch.list_timezones(),
        Action::Settimezone { zone } => watch.set_timezone(zone),
        Action::Wallpaper { file } => watch.wallpaper(file),
        Action::Restart => watch.restart(),
        Action::Reboot => watch.reboot(),
        Action::Wait => watch.wait(),
        Action::Routing { gateway } => watch.routing(gateway),
        Action::Pushface { dir } => watch.push_face(dir),
        Action::Watchface { name } => watch.watchface(name),
        Action::Screen { state } => watch.screen((*state).into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}
