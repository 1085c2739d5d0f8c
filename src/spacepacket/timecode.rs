use std::collections::HashMap;

use super::{Apid, Packet};
use crate::framing::DecodedPacket;
use crate::prelude::*;
use crate::timecode::{decode as decode_timecode, Format, Timecode};

/// Helper to decode [Timecode]s from [Packet]s.
///
/// It manages the match up of packet APIDs to a timecode [Format], supporting a default
/// format for the case where a specific format for an APID is not found.
///
/// For sequences of packets containing only a single format only the default will be necessary.
///
/// The timecode is expected at the start of the secondary header, i.e., immediately after
/// the primary header.
#[derive(Debug, Clone, Default)]
pub struct TimecodeDecoder {
    formats: HashMap<Apid, Format>,
    default: Option<Format>,
}

impl TimecodeDecoder {
    #[must_use]
    pub fn new(default: Option<Format>) -> Self {
        Self {
            formats: HashMap::default(),
            default,
        }
    }

    /// Register `format` as a specific format to use for each of `apids`.
    pub fn register(&mut self, format: Format, apids: &[Apid]) {
        for apid in apids {
            self.formats.insert(*apid, format);
        }
    }

    fn format_for(&self, packet: &Packet) -> Option<Format> {
        self.formats
            .get(&packet.header.apid)
            .copied()
            .or(self.default)
    }

    /// Decode a timecode from `packet`.
    ///
    /// Returns `None` if the packet has no secondary header or there is no format for its
    /// APID.
    ///
    /// # Errors
    /// [Error::Timecode] if the packet is too short for its format.
    pub fn decode(&self, packet: &Packet) -> Result<Option<Timecode>> {
        if !packet.header.has_secondary_header {
            return Ok(None);
        }
        match self.format_for(packet) {
            Some(format) => Ok(Some(decode_timecode(format, packet.user_data())?)),
            None => Ok(None),
        }
    }

    /// Decode and set the timecode of `packet`.
    ///
    /// # Errors
    /// See [TimecodeDecoder::decode]. The packet is left unchanged on error.
    pub fn stamp(&self, packet: &mut DecodedPacket) -> Result<()> {
        packet.timecode = self.decode(&packet.packet)?;
        Ok(())
    }
}
