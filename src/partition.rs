//! Partition records and the table of an image.

use crate::disk::{self, SectorRange};
use crate::transport::Runner;
use crate::{sfdisk, Result, WatchError};
use std::fmt;
use std::path::Path;

/// One partition of an image, as it will appear on the watch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionRecord {
    /// Device node of the partition on the watch, e.g. `/dev/mmcblk0p21`.
    pub device: String,
    /// First sector of the partition
    pub start: u64,
    /// Number of sectors
    pub sectors: u64,
    /// Partition label, empty when the entry has none
    pub name: String,
}

impl PartitionRecord {
    /// Sectors occupied by the partition in the image.
    pub fn range(&self) -> SectorRange {
        SectorRange::new(self.start, self.sectors)
    }

    /// Last component of the device node, e.g. `mmcblk0p5`.
    pub fn device_name(&self) -> &str {
        self.device.rsplit('/').next().unwrap_or(&self.device)
    }

    /// Base name used for files holding this partition: the label, or the
    /// device node (`mmcblk0p5`) for unlabelled entries.
    pub fn file_stem(&self) -> &str {
        if self.name.is_empty() {
            self.device_name()
        } else {
            &self.name
        }
    }
}

impl fmt::Display for PartitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition:\t{}\nDevice:\t\t{}\nSpan:\t\t{} + {} sectors",
            self.name, self.device, self.start, self.sectors
        )
    }
}

/// The partitions of one image, in the order the lister printed them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PartitionTable {
    records: Vec<PartitionRecord>,
}

impl PartitionTable {
    /// Create a table from already parsed records.
    pub fn new(records: Vec<PartitionRecord>) -> Self {
        Self { records }
    }

    /// Read the table of `image` with `sfdisk`.
    ///
    /// A failing lister yields an empty table; looking up a partition in it
    /// then reports [`WatchError::PartitionNotFound`].
    pub fn from_image<R: Runner + ?Sized>(image: &Path, runner: &mut R) -> Self {
        match sfdisk::list(image, runner) {
            Ok(listing) => {
                let table = parse_listing(&listing, &image.to_string_lossy());
                if table.is_empty() {
                    warn!("no partitions of {} in sfdisk output", image.display());
                }
                table
            }
            Err(e) => {
                warn!("could not list partitions of {}: {}", image.display(), e);
                Self::default()
            }
        }
    }

    /// Find the first partition called `name`.
    pub fn find(&self, name: &str) -> Option<&PartitionRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Like [`find`](Self::find), but a missing partition is an error.
    pub fn require(&self, name: &str) -> Result<&PartitionRecord> {
        self.find(name)
            .ok_or_else(|| WatchError::PartitionNotFound(name.to_string()))
    }

    /// Retrieve partition records.
    pub fn records(&self) -> &[PartitionRecord] {
        &self.records
    }

    /// Iterate over the records in table order.
    pub fn iter(&self) -> std::slice::Iter<'_, PartitionRecord> {
        self.records.iter()
    }

    /// Number of partitions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no partitions.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a PartitionTable {
    type Item = &'a PartitionRecord;
    type IntoIter = std::slice::Iter<'a, PartitionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Parse the output of `sfdisk -l -o Device,Start,Sectors,Name <image>`.
///
/// Only lines starting with `image` describe partitions. The image prefix is
/// replaced by [`disk::PARTITION_PREFIX`], so `original-catfish.img21`
/// becomes `/dev/mmcblk0p21`. When `image` ends in a digit sfdisk separates
/// the partition number with a `p` (`backup2p1`).
pub fn parse_listing(listing: &str, image: &str) -> PartitionTable {
    let separated = image.ends_with(|c: char| c.is_ascii_digit());
    let records = listing
        .lines()
        .filter_map(|line| line.strip_prefix(image))
        .filter_map(|rest| {
            if separated {
                rest.strip_prefix('p')
            } else {
                Some(rest)
            }
        })
        .filter_map(|rest| {
            let record = parse_line(rest);
            if record.is_none() {
                trace!("skipping unparsable sfdisk line: {}{}", image, rest);
            }
            record
        })
        .collect();

    PartitionTable::new(records)
}

/// Parse the remainder of a partition line after the image prefix:
/// `<number> <start> <sectors> [name...]`.
fn parse_line(rest: &str) -> Option<PartitionRecord> {
    let mut fields = rest.split_whitespace();
    let number = fields.next()?;
    // the image path must be followed directly by the partition number
    if rest.starts_with(char::is_whitespace) || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let start = fields.next()?.parse().ok()?;
    let sectors = fields.next()?.parse().ok()?;
    let name = fields.collect::<Vec<_>>().join(" ");

    Some(PartitionRecord {
        device: format!("{}{}", disk::PARTITION_PREFIX, number),
        start,
        sectors,
        name,
    })
}
