//! Disk-related types and helper functions.

use crate::{Result, WatchError};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Default size of a logical sector (bytes).
pub const DEFAULT_SECTOR_SIZE: LogicalBlockSize = LogicalBlockSize::Lb512;

/// Block device holding the whole eMMC of the watch.
pub const BLOCK_DEVICE: &str = "/dev/mmcblk0";

/// Prefix of the partition device nodes of [`BLOCK_DEVICE`].
pub const PARTITION_PREFIX: &str = "/dev/mmcblk0p";

/// Logical block/sector size of an image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogicalBlockSize {
    /// 512 bytes.
    Lb512,
    /// 4096 bytes.
    Lb4096,
}

impl LogicalBlockSize {
    /// Returns the logical block size as a `u64`.
    pub const fn as_u64(&self) -> u64 {
        match self {
            Self::Lb512 => 512,
            Self::Lb4096 => 4096,
        }
    }
}

impl From<LogicalBlockSize> for u64 {
    fn from(lb: LogicalBlockSize) -> u64 {
        lb.as_u64()
    }
}

impl TryFrom<u64> for LogicalBlockSize {
    type Error = io::Error;
    fn try_from(v: u64) -> std::result::Result<Self, Self::Error> {
        match v {
            512 => Ok(LogicalBlockSize::Lb512),
            4096 => Ok(LogicalBlockSize::Lb4096),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported logical block size (must be 512 or 4096)",
            )),
        }
    }
}

/// A run of consecutive sectors, `start` and `sectors` in logical blocks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SectorRange {
    /// First sector of the range.
    pub start: u64,
    /// Number of sectors in the range.
    pub sectors: u64,
}

impl SectorRange {
    /// Create a range of `sectors` sectors beginning at `start`.
    pub fn new(start: u64, sectors: u64) -> Self {
        Self { start, sectors }
    }

    /// Offset of the first byte of the range.
    pub fn bytes_start(&self, lb_size: LogicalBlockSize) -> Result<u64> {
        self.start
            .checked_mul(lb_size.into())
            .ok_or(WatchError::Overflow("range start in bytes"))
    }

    /// Length of the range in bytes.
    pub fn bytes_len(&self, lb_size: LogicalBlockSize) -> Result<u64> {
        self.sectors
            .checked_mul(lb_size.into())
            .ok_or(WatchError::Overflow("range length in bytes"))
    }

    /// Position `device` at the start of the range and return a reader that
    /// yields exactly the bytes of the range, or fewer if the device is
    /// shorter.
    pub fn reader<R: Read + Seek>(
        &self,
        mut device: R,
        lb_size: LogicalBlockSize,
    ) -> Result<io::Take<R>> {
        let start = self.bytes_start(lb_size)?;
        let len = self.bytes_len(lb_size)?;
        // the range must end inside the addressable space
        start
            .checked_add(len)
            .ok_or(WatchError::Overflow("range end in bytes"))?;
        trace!("seeking to {} for {} bytes", start, len);
        device.seek(SeekFrom::Start(start))?;
        Ok(device.take(len))
    }

    /// Copy the range from `device` into `out`.
    ///
    /// Fails with [`WatchError::ImageTruncated`] when the device ends before
    /// the range does.
    pub fn copy<R, W>(&self, device: R, out: &mut W, lb_size: LogicalBlockSize) -> Result<u64>
    where
        R: Read + Seek,
        W: Write + ?Sized,
    {
        let mut reader = self.reader(device, lb_size)?;
        let copied = io::copy(&mut reader, out)?;
        self.check_copied(copied, lb_size)?;
        Ok(copied)
    }

    /// Verify that `copied` bytes cover the whole range.
    pub fn check_copied(&self, copied: u64, lb_size: LogicalBlockSize) -> Result<()> {
        let expected = self.bytes_len(lb_size)?;
        if copied == expected {
            Ok(())
        } else {
            Err(WatchError::ImageTruncated { expected, copied })
        }
    }
}
