//! CCSDS Frame Decoding.
//!
//! Blocks are located with a [Synchronizer], derandomized with a [Derandomizer], optionally
//! corrected by an external [FrameCorrector], parsed into [Frame]s by a [FrameDecoder] and
//! finally reassembled into packets by a [Reassembler].
mod decoder;
mod packets;
mod pn;
mod synchronizer;

use std::fmt::Display;

pub use decoder::*;
pub use packets::*;
pub use pn::*;
pub use synchronizer::*;

use serde::{Deserialize, Serialize};

use crate::prelude::*;

pub type Scid = u16;
pub type Vcid = u16;

/// Identifies a virtual channel stream. Frame sequencing and packet reassembly state are
/// tracked independently per key.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct ChannelKey {
    pub scid: Scid,
    pub vcid: Vcid,
}

impl ChannelKey {
    #[must_use]
    pub fn new(scid: Scid, vcid: Vcid) -> Self {
        ChannelKey { scid, vcid }
    }
}

impl Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scid, self.vcid)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct VCDUHeader {
    pub version: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    pub counter: u32,
    pub replay: bool,
    pub cycle: bool,
    pub counter_cycle: u8,
}

impl VCDUHeader {
    /// VCDU header length in bytes
    pub const LEN: usize = 6;
    /// VCID indicating a fill frame
    pub const FILL: Vcid = 63;
    /// Maximum value of the 24-bit VCDU counter before rollover
    pub const COUNTER_MAX: u32 = 0xff_ffff;

    /// Construct from the provided bytes.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if there are fewer than [VCDUHeader::LEN] bytes.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }

        let x = u16::from_be_bytes([dat[0], dat[1]]);
        Ok(VCDUHeader {
            version: (dat[0] >> 6) & 0x3,
            scid: ((x >> 6) & 0xff),
            vcid: (x & 0x3f),
            counter: u32::from_be_bytes([0, dat[2], dat[3], dat[4]]),
            replay: (dat[5] >> 7) & 0x1 == 1,
            cycle: (dat[5] >> 6) & 0x1 == 1,
            counter_cycle: dat[5] & 0xf,
        })
    }

    /// Encode to the 6 header bytes. Fields wider than their bit-field are truncated.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let x = (u16::from(self.version & 0x3) << 14)
            | ((self.scid & 0xff) << 6)
            | (self.vcid & 0x3f);
        let [_, c0, c1, c2] = (self.counter & Self::COUNTER_MAX).to_be_bytes();
        let [x0, x1] = x.to_be_bytes();
        let flags = (u8::from(self.replay) << 7)
            | (u8::from(self.cycle) << 6)
            | (self.counter_cycle & 0xf);
        [x0, x1, c0, c1, c2, flags]
    }

    #[must_use]
    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(self.scid, self.vcid)
    }
}

/// Multiplexing protocol data unit, the packet zone of a frame.
#[derive(Debug, Clone)]
pub struct MPDU {
    // the offset of the first packet header in the payload
    first_header: u16,
    data: Vec<u8>,
}

impl MPDU {
    /// MPDU header length in bytes
    pub const LEN: usize = 2;
    /// MPDU first-header pointer value indicating fill data
    pub const FILL: u16 = 0x7fe;
    /// MPDU first-header pointer value indicating this MPDU does not contain a packet
    /// primary header.
    pub const NO_HEADER: u16 = 0x7ff;

    /// Decode `data`, which must start with the 2 byte MPDU header.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if there are not enough bytes for the MPDU header.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: data.len(),
                minimum: Self::LEN,
            });
        }
        let x = u16::from_be_bytes([data[0], data[1]]);

        Ok(MPDU {
            first_header: x & 0x7ff,
            data: data.to_vec(),
        })
    }

    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.first_header == Self::FILL
    }

    #[must_use]
    pub fn has_header(&self) -> bool {
        self.first_header != Self::NO_HEADER
    }

    /// Get the payload bytes from this MPDU, i.e., everything after the MPDU header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[Self::LEN..]
    }

    /// Offset into [MPDU::payload] of the first packet primary header. Only meaningful if
    /// [MPDU::has_header] is true.
    #[must_use]
    pub fn header_offset(&self) -> usize {
        self.first_header as usize
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub header: VCDUHeader,
    /// All frame data bytes, including header
    pub data: Vec<u8>,
}

impl Frame {
    /// Decode `dat` into a `Frame`.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if there are not enough bytes for a [VCDUHeader].
    pub fn decode(dat: Vec<u8>) -> Result<Self> {
        let header = VCDUHeader::decode(&dat)?;
        Ok(Frame { header, data: dat })
    }

    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.header.vcid == VCDUHeader::FILL
    }

    /// Extract the MPDU from this frame given the insert zone and trailer lengths of the
    /// mission framing.
    ///
    /// # Errors
    /// [Error::MalformedHeader] if the insert zone and trailer do not leave room for an MPDU
    /// header.
    pub fn mpdu(&self, izone_length: usize, trailer_length: usize) -> Result<MPDU> {
        let start = VCDUHeader::LEN + izone_length;
        let end = self
            .data
            .len()
            .checked_sub(trailer_length)
            .filter(|end| *end >= start + MPDU::LEN)
            .ok_or_else(|| {
                Error::MalformedHeader(format!(
                    "frame of {} bytes has no room for an mpdu with izone={izone_length} trailer={trailer_length}",
                    self.data.len()
                ))
            })?;

        MPDU::decode(&self.data[start..end])
    }
}

/// Calculate the number of missing frame sequence counts.
///
/// `cur` is the current frame counter. `last` is the frame counter seen before `cur`.
/// `cur` will be greater than `last` except in the case of a wrap. A repeated counter is
/// treated as a full wrap of missing frames.
#[must_use]
pub fn missing_frames(cur: u32, last: u32) -> u32 {
    cur.wrapping_sub(last).wrapping_sub(1) & VCDUHeader::COUNTER_MAX
}
