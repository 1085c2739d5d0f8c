//! CCSDS Space Packets.
//!
//! References:
//! * CCSDS Space Packet Protocol 133.0-B-1
//!     - <https://public.ccsds.org/Pubs/133x0b1c2.pdf>
mod group;
mod summary;
mod timecode;

use std::fmt::Display;
use std::io::{ErrorKind, Read};

use serde::{Deserialize, Serialize};

use crate::prelude::*;

pub use group::*;
pub use summary::*;
pub use timecode::*;

pub type Apid = u16;

/// Packet represents a single CCSDS space packet and its associated data.
///
/// This packet contains the primary header data as well as the user data,
/// which may or may not container a secondary header. See the header's
/// `has_secondary_header` flag.
///
/// # Example
/// Create a packet from the minimum number of bytes.
/// ```
/// use spacelink::spacepacket::Packet;
///
/// let dat: &[u8] = &[
///     // primary header bytes
///     0xd, 0x59, 0xd2, 0xab, 0x0, 07,
///     // Cds timecode bytes in secondary header (not decoded here)
///     0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb, 0xff,
///     // minimum 1 byte of user data
///     0xff
/// ];
/// let packet = Packet::decode(dat).unwrap();
/// assert_eq!(packet.header.apid, 1369);
/// assert_eq!(packet.user_data().len(), 10);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// All packets have a primary header
    pub header: PrimaryHeader,
    /// All packet bytes, including header and user data
    pub data: Vec<u8>,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{header: {:?}, data:[len={}]}}",
            self.header,
            self.data.len()
        )
    }
}

impl Packet {
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.header.sequence_flags == SEQ_FIRST
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.header.sequence_flags == SEQ_LAST
    }

    #[must_use]
    pub fn is_cont(&self) -> bool {
        self.header.sequence_flags == SEQ_CONTINUATION
    }

    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.header.sequence_flags == SEQ_UNSEGMENTED
    }

    /// Packet user data, i.e., everything after the primary header including any
    /// secondary header.
    #[must_use]
    pub fn user_data(&self) -> &[u8] {
        &self.data[PrimaryHeader::LEN..]
    }

    /// Decode from bytes. Only the number of bytes indicated by the header are used, any
    /// additional bytes are ignored.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if there are not enough bytes to construct the header or if
    /// there are not enough bytes to construct the [Packet] of the length indicated by the
    /// header.
    pub fn decode(dat: &[u8]) -> Result<Packet> {
        let header = PrimaryHeader::decode(dat)?;
        let total = header.packet_length();
        if dat.len() < total {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: total,
            });
        }
        Ok(Packet {
            header,
            data: dat[..total].to_vec(),
        })
    }

    /// Read a single [Packet].
    ///
    /// # Errors
    /// [Error::Io] for any error reading, including hitting end of stream before a full
    /// packet is read.
    pub fn read<R>(mut r: R) -> Result<Packet>
    where
        R: Read,
    {
        let mut buf = [0u8; PrimaryHeader::LEN];
        r.read_exact(&mut buf)?;
        let header = PrimaryHeader::decode(&buf)?;

        let mut data = vec![0u8; header.packet_length()];
        data[..PrimaryHeader::LEN].copy_from_slice(&buf);
        r.read_exact(&mut data[PrimaryHeader::LEN..])?;

        Ok(Packet { header, data })
    }
}

/// Packet is the first packet in a packet group
pub const SEQ_FIRST: u8 = 1;
/// Packet is a part of a packet group, but not first and not last
pub const SEQ_CONTINUATION: u8 = 0;
/// Packet is the last packet in a packet group
pub const SEQ_LAST: u8 = 2;
/// Packet is not part of a packet group, i.e., standalone.
pub const SEQ_UNSEGMENTED: u8 = 3;

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    /// Defines a packets grouping. See the `SEQ_*` values.
    pub sequence_flags: u8,
    pub sequence_id: u16,
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Size of a ``PrimaryHeader``
    pub const LEN: usize = 6;
    pub const SEQ_MAX: u16 = 16383;
    /// APID reserved for idle packets
    pub const IDLE_APID: Apid = 0x7ff;

    /// Decode from bytes.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if there are not enough bytes to construct the header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: buf.len(),
                minimum: Self::LEN,
            });
        }
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        Ok(PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: (d1 & 0x7ff),
            sequence_flags: (d2 >> 14 & 0x3) as u8,
            sequence_id: (d2 & 0x3fff),
            len_minus1: d3,
        })
    }

    /// Encode to the 6 header bytes. Fields wider than their bit-field are truncated.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let d1 = (u16::from(self.version & 0x7) << 13)
            | (u16::from(self.type_flag & 0x1) << 12)
            | (u16::from(self.has_secondary_header) << 11)
            | (self.apid & 0x7ff);
        let d2 = (u16::from(self.sequence_flags & 0x3) << 14) | (self.sequence_id & 0x3fff);
        let [a, b] = d1.to_be_bytes();
        let [c, d] = d2.to_be_bytes();
        let [e, f] = self.len_minus1.to_be_bytes();
        [a, b, c, d, e, f]
    }

    /// Length of the user data declared by this header.
    #[must_use]
    pub fn user_data_length(&self) -> usize {
        self.len_minus1 as usize + 1
    }

    /// Total length of the packet, header included.
    #[must_use]
    pub fn packet_length(&self) -> usize {
        Self::LEN + self.user_data_length()
    }
}

/// Calculate the number of missing sequence ids.
///
/// `cur` is the current sequence id. `last` is the sequence id seen before `cur`.
#[must_use]
pub fn missing_packets(cur: u16, last: u16) -> u16 {
    cur.wrapping_sub(last).wrapping_sub(1) & PrimaryHeader::SEQ_MAX
}

/// Iterator of packets read from a byte synchronized packet stream. Created with
/// [decode_packets].
pub struct PacketReaderIter<R>
where
    R: Read,
{
    reader: R,
    done: bool,
}

impl<R> Iterator for PacketReaderIter<R>
where
    R: Read,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match Packet::read(&mut self.reader) {
            Ok(packet) => Some(Ok(packet)),
            Err(Error::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Return an iterator providing [Packet] data read from a byte synchronized ungrouped
/// packet stream, e.g., a level-0 packet file.
///
/// The stream ends at end of input, including in the middle of a packet.
///
/// # Examples
/// ```
/// use spacelink::spacepacket::decode_packets;
///
/// let dat: &[u8] = &[
///     // primary header bytes
///     0xd, 0x59, 0xd2, 0xab, 0x0, 07,
///     // CDS timecode bytes in secondary header
///     0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb, 0xff,
///     // minimum 1 byte of user data
///     0xff
/// ];
///
/// decode_packets(dat).for_each(|zult| {
///     let packet = zult.unwrap();
///     assert_eq!(packet.header.apid, 1369);
/// });
/// ```
pub fn decode_packets<R>(reader: R) -> PacketReaderIter<R>
where
    R: Read,
{
    PacketReaderIter {
        reader,
        done: false,
    }
}
