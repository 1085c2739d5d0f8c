use std::collections::HashMap;

use serde::Serialize;

use super::{missing_packets, Apid, Packet, PrimaryHeader};
use crate::framing::{ChannelKey, Event};

#[derive(Debug, Default, Clone, Serialize)]
pub struct ApidSummary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ChannelSummary {
    pub packets: usize,
    pub gaps: usize,
    pub missing_frames: u64,
    pub dropped: usize,
}

/// Tracks stats on packet iteration.
///
/// # Example
/// ```
/// use spacelink::spacepacket::{Packet, decode_packets, Summary};
/// let dat: &[u8] = &[0xd, 0x59, 0xc0, 0x01, 0x0, 0x8, 0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb, 0xff];
///
/// let mut summary = Summary::default();
/// let packets: Vec<Packet> = decode_packets(dat)
///     .filter_map(Result::ok)
///     .inspect(|p| {
///         summary.add(p);
///     })
///     .collect();
/// assert_eq!(summary.count, 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Summary {
    pub count: usize,
    pub bytes: usize,
    /// Missing packets according to sequence counters.
    pub missing: usize,
    pub apids: HashMap<Apid, ApidSummary>,
    pub channels: HashMap<ChannelKey, ChannelSummary>,
    /// Dropped partial packets by [DropReason::kind](crate::framing::DropReason::kind).
    pub dropped: HashMap<&'static str, usize>,
    pub dropped_bytes: usize,

    seen_headers: HashMap<Apid, PrimaryHeader>,
}

impl Summary {
    pub fn add(&mut self, packet: &Packet) {
        self.count += 1;
        self.bytes += packet.data.len();

        let hdr = packet.header;
        let apid = self.apids.entry(hdr.apid).or_default();
        apid.count += 1;
        apid.bytes += packet.data.len();

        if let Some(last_hdr) = self.seen_headers.get(&hdr.apid) {
            let missing = missing_packets(hdr.sequence_id, last_hdr.sequence_id) as usize;
            apid.missing += missing;
            self.missing += missing;
        }
        self.seen_headers.insert(hdr.apid, hdr);
    }

    /// Add a reassembly event.
    pub fn add_event(&mut self, event: &Event) {
        match event {
            Event::Packet(packet) => {
                self.channels.entry(packet.key()).or_default().packets += 1;
                self.add(&packet.packet);
            }
            Event::Gap { key, missing } => {
                let channel = self.channels.entry(*key).or_default();
                channel.gaps += 1;
                channel.missing_frames += u64::from(*missing);
            }
            Event::Dropped { key, reason, bytes } => {
                self.channels.entry(*key).or_default().dropped += 1;
                *self.dropped.entry(reason.kind()).or_default() += 1;
                self.dropped_bytes += bytes;
            }
        }
    }

    /// Total frame gaps across all channels.
    #[must_use]
    pub fn frame_gaps(&self) -> usize {
        self.channels.values().map(|c| c.gaps).sum()
    }

    /// Total missing frames across all channels.
    #[must_use]
    pub fn missing_frames(&self) -> u64 {
        self.channels.values().map(|c| c.missing_frames).sum()
    }
}
