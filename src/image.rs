//! Saving, restoring and dissecting watch images.

use crate::disk::{self, SectorRange};
use crate::partition::{PartitionRecord, PartitionTable};
use crate::transport::{quote, Login, Mode, Runner};
use crate::{Config, Result, WatchError};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Block size used by the `dd` processes on the watch.
pub const DD_BLOCK_SIZE: &str = "4M";

/// Partitions written back by [`Imager::run`] when none are named.
pub const DEFAULT_PARTITIONS: &[&str] = &["boot", "system"];

const MIB: u64 = 1024 * 1024;
/// Interval of the progress messages while saving an image.
const PROGRESS_STEP: u64 = 64 * MIB;

/// One side of a transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Endpoint {
    /// A file on this machine.
    Local(PathBuf),
    /// A file or device node on the watch.
    Remote {
        /// Login and address, e.g. `root@192.168.2.15`.
        host: String,
        /// Path on the watch.
        path: String,
    },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local(path) => write!(f, "{}", path.display()),
            Endpoint::Remote { host, path } => write!(f, "{host}:{path}"),
        }
    }
}

/// A sector range to copy from `source` to the start of `destination`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferSpec {
    /// First sector to read from the source.
    pub offset: u64,
    /// Number of sectors to copy.
    pub sectors: u64,
    /// Where the sectors are read from.
    pub source: Endpoint,
    /// Where the sectors are written to, starting at offset 0.
    pub destination: Endpoint,
    /// Only describe the transfer.
    pub dry_run: bool,
    /// Do not announce the transfer.
    pub quiet: bool,
}

impl TransferSpec {
    /// Transfer of `record` out of `image` to `destination`, with the flags
    /// of `config`.
    pub fn for_partition(
        record: &PartitionRecord,
        image: &Path,
        destination: Endpoint,
        config: &Config,
    ) -> Self {
        Self {
            offset: record.start,
            sectors: record.sectors,
            source: Endpoint::Local(image.to_path_buf()),
            destination,
            dry_run: config.is_dry_run(),
            quiet: config.is_quiet(),
        }
    }

    /// Sectors covered by the transfer.
    pub fn range(&self) -> SectorRange {
        SectorRange::new(self.offset, self.sectors)
    }

    /// One line description naming the partition, start, count and
    /// destination.
    pub fn describe(&self, name: &str) -> String {
        format!(
            "{}: {} sectors from sector {} of {} to {}",
            name, self.sectors, self.offset, self.source, self.destination
        )
    }
}

/// Outcome of [`Imager::dissect_image`].
#[derive(Debug, Default)]
pub struct DissectReport {
    /// Files written, or that would be written in dry run mode.
    pub files: Vec<PathBuf>,
    /// Partitions that could not be copied.
    pub failed: Vec<(String, WatchError)>,
}

impl DissectReport {
    /// Whether every partition was copied.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The actions requested from `watch-image`. [`Imager::run`] carries them
/// out in the order save, restore, dissect.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Actions {
    /// Save the eMMC of the watch into the image.
    pub save: bool,
    /// Write partitions of the image back to the watch.
    pub restore: bool,
    /// Partitions to restore, [`DEFAULT_PARTITIONS`] when empty.
    pub partitions: Vec<String>,
    /// Split the image into one file per partition.
    pub dissect: bool,
    /// Folder receiving the files of the dissect.
    pub output: PathBuf,
}

impl Actions {
    /// Whether anything was requested at all.
    pub fn is_empty(&self) -> bool {
        !(self.save || self.restore || self.dissect)
    }

    /// Names of the partitions to restore.
    pub fn restore_list(&self) -> Vec<&str> {
        if self.partitions.is_empty() {
            DEFAULT_PARTITIONS.to_vec()
        } else {
            self.partitions.iter().map(String::as_str).collect()
        }
    }
}

/// Moves image data between this machine and the watch.
#[derive(Debug)]
pub struct Imager<R, W> {
    config: Config,
    runner: R,
    out: W,
}

impl<R: Runner, W: Write> Imager<R, W> {
    /// Create an imager running commands with `runner` and printing its
    /// messages to `out`.
    pub fn new(config: Config, runner: R, out: W) -> Self {
        Self {
            config,
            runner,
            out,
        }
    }

    /// Retrieve the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Take back the runner and the message sink.
    pub fn into_inner(self) -> (R, W) {
        (self.runner, self.out)
    }

    /// Announce an action. Dry run messages are printed even when quiet.
    fn announce(&mut self, what: &str) -> Result<()> {
        if self.config.is_dry_run() {
            writeln!(self.out, "[dry run] {what}")?;
        } else if !self.config.is_quiet() {
            writeln!(self.out, "{what}")?;
        }
        Ok(())
    }

    /// Carry out `spec`, `name` being the partition it copies.
    /// Returns the number of bytes copied, 0 for a dry run.
    pub fn transfer(&mut self, name: &str, spec: &TransferSpec) -> Result<u64> {
        if spec.dry_run {
            writeln!(self.out, "[dry run] {}", spec.describe(name))?;
            return Ok(0);
        }
        if !spec.quiet {
            writeln!(self.out, "{}", spec.describe(name))?;
        }

        let source = match &spec.source {
            Endpoint::Local(path) => path,
            Endpoint::Remote { .. } => return Err(WatchError::Unsupported("reading from the watch")),
        };
        let image = File::open(source)?;
        let lb_size = self.config.sector_size();
        let range = spec.range();
        check_covers(&image, &range, lb_size)?;

        let copied = match &spec.destination {
            Endpoint::Local(path) => {
                if is_same_file(source, path) {
                    return Err(WatchError::DestinationExists(path.clone()));
                }
                let mut file = BufWriter::new(File::create(path)?);
                let copied = range.copy(&image, &mut file, lb_size)?;
                file.flush()?;
                copied
            }
            Endpoint::Remote { path, .. } => {
                let remote = self.config.remote();
                if remote.mode() == Mode::Adb {
                    return Err(WatchError::Unsupported("writing partitions over adb"));
                }
                let cmd = remote.shell(
                    Login::Root,
                    &format!("dd of={} bs={}", quote(path), DD_BLOCK_SIZE),
                );
                let mut reader = range.reader(&image, lb_size)?;
                let sent = self.runner.send(cmd, &mut reader)?;
                range.check_copied(sent, lb_size)?;
                sent
            }
        };
        debug!("{}: copied {} bytes", name, copied);
        Ok(copied)
    }

    /// Write the partition `name` of `image` to its device node on the
    /// watch.
    ///
    /// Not available over ADB; nothing is done in that case.
    pub fn restore_partition(
        &mut self,
        table: &PartitionTable,
        name: &str,
        image: &Path,
    ) -> Result<()> {
        let remote = self.config.remote();
        if remote.mode() == Mode::Adb {
            return Err(WatchError::Unsupported("restoring partitions over adb"));
        }
        let record = table.require(name)?;
        let destination = Endpoint::Remote {
            host: remote.address(Login::Root),
            path: record.device.clone(),
        };
        let spec = TransferSpec::for_partition(record, image, destination, &self.config);
        self.transfer(name, &spec)?;
        Ok(())
    }

    /// Copy every partition of `image` to `<out_dir>/<name>.img`.
    ///
    /// A partition that fails is recorded in the report and the remaining
    /// ones are still copied. A label used by an earlier partition falls
    /// back to the device node name, so every partition gets its own file.
    pub fn dissect_image(
        &mut self,
        table: &PartitionTable,
        image: &Path,
        out_dir: &Path,
    ) -> Result<DissectReport> {
        let mut report = DissectReport::default();
        if !self.config.is_dry_run() {
            fs::create_dir_all(out_dir)?;
        }

        let mut used = HashSet::new();
        for record in table {
            let stem = [record.file_stem(), record.device_name()]
                .into_iter()
                .find(|stem| used.insert(*stem));
            let Some(stem) = stem else {
                let file = out_dir.join(format!("{}.img", record.device_name()));
                warn!("{} would overwrite {}", record.device, file.display());
                report
                    .failed
                    .push((record.file_stem().to_string(), WatchError::DestinationExists(file)));
                continue;
            };
            let file = out_dir.join(format!("{stem}.img"));
            let spec = TransferSpec::for_partition(
                record,
                image,
                Endpoint::Local(file.clone()),
                &self.config,
            );
            match self.transfer(stem, &spec) {
                Ok(_) => report.files.push(file),
                Err(e) => {
                    warn!("failed to extract {}: {}", stem, e);
                    report.failed.push((stem.to_string(), e));
                }
            }
        }

        Ok(report)
    }

    /// Copy the whole eMMC of the watch into the new file `destination`.
    ///
    /// An existing `destination` is never overwritten.
    pub fn save_image(&mut self, destination: &Path) -> Result<()> {
        let remote = self.config.remote();
        let source = remote.label(Login::Root, disk::BLOCK_DEVICE);
        self.announce(&format!("saving {} to {}", source, destination.display()))?;
        if self.config.is_dry_run() {
            return Ok(());
        }
        if destination.exists() {
            return Err(WatchError::DestinationExists(destination.to_path_buf()));
        }

        match remote.mode() {
            Mode::Adb => {
                let cmd = remote.pull(Login::Root, disk::BLOCK_DEVICE, destination);
                self.runner.run(cmd)
            }
            Mode::Ssh => {
                let file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(destination)
                    .map_err(|e| match e.kind() {
                        io::ErrorKind::AlreadyExists => {
                            WatchError::DestinationExists(destination.to_path_buf())
                        }
                        _ => e.into(),
                    })?;
                let cmd = remote.shell(
                    Login::Root,
                    &format!("dd if={} bs={}", disk::BLOCK_DEVICE, DD_BLOCK_SIZE),
                );
                let report = if self.config.is_quiet() {
                    None
                } else {
                    Some(&mut self.out)
                };
                let mut sink = Progress::new(BufWriter::new(file), report);
                let received = self
                    .runner
                    .receive(cmd, &mut sink)
                    .and_then(|n| sink.finish().map(|_| n));
                // the file must be closed before it can be removed
                drop(sink);
                match received {
                    Ok(n) => {
                        info!("saved {} bytes to {}", n, destination.display());
                        Ok(())
                    }
                    Err(e) => {
                        // do not leave a partial image behind
                        let _ = fs::remove_file(destination);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Read the partition table of `image` with the runner of this imager.
    pub fn read_table(&mut self, image: &Path) -> PartitionTable {
        PartitionTable::from_image(image, &mut self.runner)
    }

    /// Carry out `actions` on `image`: save, then restore, then dissect.
    ///
    /// Saving requires `image` to be absent (only a warning in dry run
    /// mode), restoring and dissecting require it to exist. The first
    /// failing step ends the run. The report of the dissect is returned
    /// when one was requested.
    pub fn run(&mut self, image: &Path, actions: &Actions) -> Result<Option<DissectReport>> {
        if actions.save {
            if image.exists() {
                if !self.config.is_dry_run() {
                    return Err(WatchError::DestinationExists(image.to_path_buf()));
                }
                writeln!(self.out, "warning: {} already exists", image.display())?;
            }
            self.save_image(image)?;
        }
        if !(actions.restore || actions.dissect) {
            return Ok(None);
        }

        if !image.exists() {
            return Err(WatchError::MissingImage(image.to_path_buf()));
        }
        let table = self.read_table(image);

        if actions.restore {
            for name in actions.restore_list() {
                self.restore_partition(&table, name, image)?;
            }
        }
        if !actions.dissect {
            return Ok(None);
        }
        if table.is_empty() {
            return Err(WatchError::NoPartitions(image.to_path_buf()));
        }
        self.dissect_image(&table, image, &actions.output).map(Some)
    }
}

/// Whether `a` and `b` name the same existing file.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Fail early when `image` ends before `range` does.
fn check_covers(image: &File, range: &SectorRange, lb_size: disk::LogicalBlockSize) -> Result<()> {
    let start = range.bytes_start(lb_size)?;
    let len = range.bytes_len(lb_size)?;
    let available = image.metadata()?.len().saturating_sub(start);
    if available < len {
        return Err(WatchError::ImageTruncated {
            expected: len,
            copied: available,
        });
    }
    Ok(())
}

/// Writer reporting the amount of data written every [`PROGRESS_STEP`].
struct Progress<'a, W, O> {
    inner: W,
    report: Option<&'a mut O>,
    written: u64,
    next: u64,
}

impl<'a, W: Write, O: Write> Progress<'a, W, O> {
    fn new(inner: W, report: Option<&'a mut O>) -> Self {
        Self {
            inner,
            report,
            written: 0,
            next: PROGRESS_STEP,
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.flush()?;
        if let Some(report) = self.report.as_mut() {
            writeln!(report, "{} MiB copied, done", self.written / MIB)?;
        }
        Ok(())
    }
}

impl<'a, W: Write, O: Write> Write for Progress<'a, W, O> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        while self.written >= self.next {
            if let Some(report) = self.report.as_mut() {
                writeln!(report, "{} MiB copied", self.next / MIB)?;
            }
            self.next += PROGRESS_STEP;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
