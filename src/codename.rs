//! Codenames of the watches the image tool knows about.

use crate::WatchError;
use std::fmt;
use std::str::FromStr;

/// Codename of a supported watch, e.g. `catfish`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Codename(&'static str);

impl Codename {
    /// The codename as written on the command line.
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// File name used for the image of this watch when none is given,
    /// `original-<codename>.img`.
    pub fn default_image(&self) -> String {
        format!("original-{}.img", self.0)
    }
}

impl fmt::Display for Codename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

watches! {
    (ANTHIAS, "anthias"),
    (BASS, "bass"),
    (BELUGA, "beluga"),
    (CATFISH, "catfish"),
    (CATSHARK, "catshark"),
    (DORY, "dory"),
    /// QEMU based emulator image.
    (EMULATOR, "emulator"),
    (FIREFISH, "firefish"),
    (HARMONY, "harmony"),
    (HOKI, "hoki"),
    (INHARMONY, "inharmony"),
    (KOI, "koi"),
    (LENOK, "lenok"),
    (MINNOW, "minnow"),
    (MOONEYE, "mooneye"),
    (NARWHAL, "narwhal"),
    (NEMO, "nemo"),
    (PIKE, "pike"),
    (RAY, "ray"),
    (RINATO, "rinato"),
    (RUBYFISH, "rubyfish"),
    (SAWFISH, "sawfish"),
    (SKIPJACK, "skipjack"),
    (SMELT, "smelt"),
    (SPARROW, "sparrow"),
    (SPRAT, "sprat"),
    (STURGEON, "sturgeon"),
    (SWIFT, "swift"),
    (TETRA, "tetra"),
    (TRIGGERFISH, "triggerfish"),
    (WREN, "wren"),
}
