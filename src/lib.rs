//! CCSDS downlink decoding.
//!
//! Recovers space packets from a raw CADU byte stream:
//!
//! 1. [framing::synchronized_blocks] locates attached sync markers
//! 2. [framing::pn_decode] removes pseudo-randomization
//! 3. [framing::FrameDecoder] parses frames and tracks frame counters per virtual channel
//! 4. [framing::Reassembler] reconstructs packets spanning frames
//! 5. [timecode::decode_timecode] decodes packet timecodes
//! 6. [spacepacket::collect_groups] groups packets by APID and acquisition
//!
//! [pipeline::Pipeline] composes all of the above given a [config::Framing].
//!
//! References:
//! * CCSDS TM Synchronization and Channel Coding 131.0-B-4
//!     - <https://public.ccsds.org/Pubs/131x0b4.pdf>
//! * CCSDS Space Packet Protocol 133.0-B-1
//!     - <https://public.ccsds.org/Pubs/133x0b1c2.pdf>
mod bytes;
mod error;

pub mod config;
pub mod framing;
pub mod pipeline;
pub mod spacepacket;
pub mod timecode;

pub use error::{Error, Result};

pub(crate) mod prelude {
    pub use crate::error::{Error, Result};
}
