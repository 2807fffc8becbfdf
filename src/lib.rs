//! Tools to save, restore and dissect the disk image of a smartwatch and to
//! manage the watch over SSH or ADB.
//!
//! The partition layout of an image is read from `sfdisk`, each partition is
//! mapped to the block device node it occupies on the watch
//! (`/dev/mmcblk0pNN`), and sector ranges are copied between the image, the
//! local filesystem and the watch.
//!
//! ```no_run
//! use std::path::Path;
//! use watch_tools::{image::Imager, partition::PartitionTable, transport::System, Config};
//!
//! fn restore_boot() -> watch_tools::Result<()> {
//!     let image = Path::new("original-catfish.img");
//!     let config = Config::new().host("192.168.2.15").port(22);
//!
//!     let mut runner = System;
//!     let table = PartitionTable::from_image(image, &mut runner);
//!
//!     let mut imager = Imager::new(config, runner, std::io::stdout());
//!     imager.restore_partition(&table, "boot", image)
//! }
//! ```

#![deny(missing_docs)]

use std::{fmt, io, path};

#[macro_use]
mod logging;
#[macro_use]
mod macros;
pub mod codename;
pub mod disk;
pub mod image;
pub mod partition;
pub mod sfdisk;
pub mod transport;
pub mod watch;

pub use transport::Mode;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, WatchError>;

#[non_exhaustive]
#[derive(Debug)]
/// Errors returned when talking to the watch or handling images.
pub enum WatchError {
    /// Generic IO Error
    Io(io::Error),
    /// An external program exited unsuccessfully
    CommandFailed {
        /// program that was run
        program: String,
        /// exit code, `None` when killed by a signal
        code: Option<i32>,
    },
    /// No partition with this name exists in the table
    PartitionNotFound(String),
    /// The operation is not available with the selected transport
    Unsupported(&'static str),
    /// The image ended before the partition did
    ImageTruncated {
        /// bytes the partition spans
        expected: u64,
        /// bytes that could be copied
        copied: u64,
    },
    /// A value did not fit into its target type
    Overflow(&'static str),
    /// Refusing to overwrite an existing file
    DestinationExists(path::PathBuf),
    /// The image file does not exist
    MissingImage(path::PathBuf),
    /// A backup folder does not exist
    MissingBackup(path::PathBuf),
    /// The partition lister found nothing in the image
    NoPartitions(path::PathBuf),
    /// The codename is not in the list of supported watches
    UnknownCodename(String),
    /// The watch did not answer in time
    NotPresent,
}

impl From<io::Error> for WatchError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use WatchError::*;
        let desc = match self {
            Io(e) => return write!(fmt, "IO error: {e}"),
            CommandFailed {
                program,
                code: Some(code),
            } => return write!(fmt, "{program} failed with exit status {code}"),
            CommandFailed {
                program,
                code: None,
            } => return write!(fmt, "{program} was terminated by a signal"),
            PartitionNotFound(name) => {
                return write!(fmt, "partition '{name}' not found in the image")
            }
            Unsupported(what) => return write!(fmt, "{what} is not supported"),
            ImageTruncated { expected, copied } => {
                return write!(
                    fmt,
                    "image is truncated: expected {expected} bytes, copied {copied}"
                )
            }
            Overflow(m) => return write!(fmt, "overflow: {m}"),
            DestinationExists(p) => {
                return write!(fmt, "{} already exists, refusing to overwrite", p.display())
            }
            MissingImage(p) => return write!(fmt, "image file {} not found", p.display()),
            MissingBackup(p) => return write!(fmt, "backup folder {} not found", p.display()),
            NoPartitions(p) => return write!(fmt, "no partitions found in {}", p.display()),
            UnknownCodename(name) => return write!(fmt, "unknown watch codename '{name}'"),
            NotPresent => "the watch did not show up",
        };
        write!(fmt, "{desc}")
    }
}

/// Configuration of the connection to the watch and of the transfer flags.
///
/// ## Default
/// By default the watch is reached over SSH at `192.168.2.15:22`, data is
/// transferred for real, progress is printed and sectors are 512 bytes.
///
/// ```
/// # use watch_tools::{Config, Mode};
/// let _default_config = Config::new()
///     .mode(Mode::Ssh)
///     .host("192.168.2.15")
///     .port(22)
///     .dry_run(false)
///     .quiet(false)
///     .logical_block_size(watch_tools::disk::DEFAULT_SECTOR_SIZE);
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// How the watch is reached.
    mode: Mode,
    /// Address of the watch.
    host: String,
    /// SSH port of the watch.
    port: u16,
    /// Describe transfers instead of doing them.
    dry_run: bool,
    /// Suppress progress messages.
    quiet: bool,
    /// Sector size the partition table is expressed in.
    lb_size: disk::LogicalBlockSize,
}

/// Address of the watch when attached over USB networking.
pub const DEFAULT_HOST: &str = "192.168.2.15";
/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

impl Config {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Config::default()
    }

    /// Transport used to reach the watch.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Address of the watch.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// SSH port of the watch.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Only describe transfers, never move data.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Suppress progress messages. Dry run messages are always printed.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Size of logical blocks (sectors) of the image.
    pub fn logical_block_size(mut self, lb_size: disk::LogicalBlockSize) -> Self {
        self.lb_size = lb_size;
        self
    }

    /// Retrieve the transport mode.
    pub fn transport_mode(&self) -> Mode {
        self.mode
    }

    /// Retrieve the address of the watch.
    pub fn remote_host(&self) -> &str {
        &self.host
    }

    /// Retrieve the SSH port.
    pub fn remote_port(&self) -> u16 {
        self.port
    }

    /// Whether transfers are only described.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Whether progress messages are suppressed.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Retrieve the logical block size.
    pub fn sector_size(&self) -> disk::LogicalBlockSize {
        self.lb_size
    }

    /// Build the remote the configuration points at.
    pub fn remote(&self) -> transport::Remote {
        transport::Remote::new(self.mode, &self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Ssh,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dry_run: false,
            quiet: false,
            lb_size: disk::DEFAULT_SECTOR_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c1 = Config::new();
        let c2 = Config::default();
        assert_eq!(c1, c2);
        assert_eq!(c1.transport_mode(), Mode::Ssh);
        assert_eq!(c1.remote_host(), DEFAULT_HOST);
        assert_eq!(c1.remote_port(), 22);
        assert!(!c1.is_dry_run());
        assert!(!c1.is_quiet());
    }

    #[test]
    fn config_builder() {
        let cfg = Config::new()
            .mode(Mode::Adb)
            .host("localhost")
            .port(2222)
            .dry_run(true)
            .quiet(true);
        assert_eq!(cfg.transport_mode(), Mode::Adb);
        assert_eq!(cfg.remote_host(), "localhost");
        assert_eq!(cfg.remote_port(), 2222);
        assert!(cfg.is_dry_run());
        assert!(cfg.is_quiet());
    }

    #[test]
    fn error_messages() {
        let e = WatchError::PartitionNotFound("boot".to_string());
        assert_eq!(e.to_string(), "partition 'boot' not found in the image");

        let e = WatchError::CommandFailed {
            program: "ssh".to_string(),
            code: Some(255),
        };
        assert_eq!(e.to_string(), "ssh failed with exit status 255");

        let e = WatchError::Unsupported("restore over adb");
        assert_eq!(e.to_string(), "restore over adb is not supported");
    }
}
