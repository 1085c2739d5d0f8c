//! Mission framing configuration.
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::framing::{Scid, VCDUHeader, ASM, MPDU};
use crate::prelude::*;

pub const TERRA: Scid = 42;
pub const AQUA: Scid = 154;
pub const SNPP: Scid = 157;
pub const NOAA20: Scid = 159;
pub const NOAA21: Scid = 177;
pub const NOAA22: Scid = 178;
pub const NOAA23: Scid = 179;

/// Reed-Solomon code block parameters. Correction itself is performed outside of this crate;
/// these values are used only to size blocks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RSConfig {
    pub interleave: usize,
    /// Number of correctable symbols per interleave, e.g., 16 for RS(255,223).
    #[serde(default = "default_correctable")]
    pub correctable: usize,
    #[serde(default)]
    pub virtual_fill: usize,
}

fn default_correctable() -> usize {
    16
}

fn default_asm() -> Vec<u8> {
    ASM.to_vec()
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    #[serde(default = "default_asm")]
    pub asm: Vec<u8>,
    /// Length of the frame contained within a CADU, not including the ASM or
    /// any Reed-solomon parity bytes.
    pub frame_length: usize,
    #[serde(default = "default_true")]
    pub pseudo_randomized: bool,
    #[serde(default)]
    pub izone_length: usize,
    #[serde(default)]
    pub trailer_length: usize,
    #[serde(default)]
    pub rs: Option<RSConfig>,
}

impl Framing {
    /// Number of Reed-Solomon parity bytes following the frame, 0 if RS is not used.
    #[must_use]
    pub fn parity_length(&self) -> usize {
        self.rs
            .as_ref()
            .map_or(0, |rs| 2 * rs.correctable * rs.interleave)
    }

    /// Returns the expected length of CADU which will include the ASM and the
    /// length of the Reed-Solomon code block.
    ///
    /// So, for example, with standard RS(223/255) with an interleave of 4 this
    /// will return 1024, which is 4 bytes for the ASM, 128 bytes of parity and the frame bytes.
    #[must_use]
    pub fn cadu_length(&self) -> usize {
        self.asm.len() + self.block_length()
    }

    /// Length of the block following each ASM, i.e., what the synchronizer produces.
    #[must_use]
    pub fn block_length(&self) -> usize {
        self.frame_length + self.parity_length()
    }

    /// Length of the MPDU, including its header.
    #[must_use]
    pub fn mpdu_length(&self) -> usize {
        self.frame_length
            .saturating_sub(VCDUHeader::LEN + self.izone_length + self.trailer_length)
    }

    /// # Errors
    /// [Error::Config] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.asm.is_empty() {
            return Err(Error::Config("asm must not be empty".to_string()));
        }
        let minimum = VCDUHeader::LEN + MPDU::LEN;
        if self.frame_length < minimum {
            return Err(Error::Config(format!(
                "frame_length {} is less than minimum of {minimum}",
                self.frame_length
            )));
        }
        if self.mpdu_length() <= MPDU::LEN {
            return Err(Error::Config(format!(
                "izone_length {} and trailer_length {} leave no packet zone in {} byte frames",
                self.izone_length, self.trailer_length, self.frame_length
            )));
        }
        if let Some(rs) = &self.rs {
            if rs.interleave == 0 {
                return Err(Error::Config("rs interleave must be at least 1".to_string()));
            }
        }
        Ok(())
    }

    /// Read a JSON framing config from `reader` and validate it.
    ///
    /// # Errors
    /// [Error::Json] if the JSON cannot be parsed, or [Error::Config] if it is not valid.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        let framing: Framing = serde_json::from_reader(reader)?;
        framing.validate()?;
        Ok(framing)
    }

    /// Get spacecraft framing info for a particular spacecraft, or `None` if `scid` is not
    /// a known spacecraft.
    #[must_use]
    pub fn for_spacecraft(scid: Scid) -> Option<Framing> {
        let (frame_length, interleave) = match scid {
            TERRA | AQUA | SNPP | NOAA20 => (892, 4),
            NOAA21 | NOAA22 | NOAA23 => (1115, 5),
            _ => return None,
        };
        Some(Framing {
            asm: ASM.to_vec(),
            frame_length,
            pseudo_randomized: true,
            izone_length: 0,
            trailer_length: 0,
            rs: Some(RSConfig {
                interleave,
                correctable: 16,
                virtual_fill: 0,
            }),
        })
    }
}
