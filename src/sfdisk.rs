//! Invocation of the `sfdisk` partition lister.

use crate::transport::Runner;
use crate::Result;
use std::path::Path;
use std::process::Command;

/// Columns requested from `sfdisk`, in the order [`parse_listing`] expects.
///
/// [`parse_listing`]: crate::partition::parse_listing
pub const COLUMNS: &str = "Device,Start,Sectors,Name";

/// Build the `sfdisk` command listing the partitions of `image`.
pub fn list_command(image: &Path) -> Command {
    let mut cmd = Command::new("sfdisk");
    cmd.arg("-l").arg("-o").arg(COLUMNS).arg(image);
    cmd
}

/// Run `sfdisk` on `image` and return its standard output.
pub fn list<R: Runner + ?Sized>(image: &Path, runner: &mut R) -> Result<String> {
    debug!("listing partitions of {}", image.display());
    runner.output(list_command(image))
}
