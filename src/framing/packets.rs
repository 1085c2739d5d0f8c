use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet, VecDeque},
};

use serde::Serialize;
use tracing::{debug, span, trace, warn, Level};

use super::{ChannelKey, DecodedFrame, Integrity, Scid, Vcid};
use crate::prelude::*;
use crate::spacepacket::{Apid, Packet, PrimaryHeader};
use crate::timecode::Timecode;

/// A [Packet] with additional framing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub scid: Scid,
    pub vcid: Vcid,
    pub packet: Packet,
    /// Set when a [TimecodeDecoder](crate::spacepacket::TimecodeDecoder) has been applied.
    pub timecode: Option<Timecode>,
}

impl DecodedPacket {
    #[must_use]
    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(self.scid, self.vcid)
    }
}

/// Why partial packet data was discarded.
#[derive(thiserror::Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    #[error("{missing} frame(s) missing")]
    Gap { missing: u32 },
    #[error("stream ended before packet was complete")]
    EndOfStream,
    #[error("frame failed error correction")]
    Uncorrectable,
    #[error("frame contains fill data")]
    FillData,
    #[error("frame has no room for packet data")]
    MalformedFrame,
    #[error("packet truncated: header declares {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("first header pointer {offset} is beyond the packet zone of {len} bytes")]
    InvalidFirstHeaderPointer { offset: usize, len: usize },
    #[error("invalid packet header: version {version}, type {type_flag}")]
    InvalidHeader { version: u8, type_flag: u8 },
    #[error("apid {apid} is not a valid apid")]
    InvalidApid { apid: Apid },
}

impl DropReason {
    /// Short name for the kind of drop, without any detail values.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DropReason::Gap { .. } => "gap",
            DropReason::EndOfStream => "end_of_stream",
            DropReason::Uncorrectable => "uncorrectable",
            DropReason::FillData => "fill_data",
            DropReason::MalformedFrame => "malformed_frame",
            DropReason::Truncated { .. } => "truncated",
            DropReason::InvalidFirstHeaderPointer { .. } => "invalid_first_header_pointer",
            DropReason::InvalidHeader { .. } => "invalid_header",
            DropReason::InvalidApid { .. } => "invalid_apid",
        }
    }
}

/// Output of the [Reassembler].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A complete packet.
    Packet(DecodedPacket),
    /// `missing` frames were lost on channel `key`.
    Gap { key: ChannelKey, missing: u32 },
    /// `bytes` of partial packet data were discarded on channel `key`.
    Dropped {
        key: ChannelKey,
        reason: DropReason,
        bytes: usize,
    },
}

impl Event {
    #[must_use]
    pub fn into_packet(self) -> Option<DecodedPacket> {
        match self {
            Event::Packet(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Reassembly state for a single virtual channel.
#[derive(Debug, Default)]
enum ChannelState {
    /// Waiting for a frame that announces a packet header
    #[default]
    Idle,
    /// Collecting the bytes of a packet that started in a previous frame
    Accumulating(Vec<u8>),
}

/// Reconstructs packets from the MPDU packet zones of frames.
///
/// State is kept separately for each [ChannelKey], so frames from different virtual
/// channels may be interleaved. Frames for a single channel must be provided in the order
/// they were received.
pub struct Reassembler {
    izone_length: usize,
    trailer_length: usize,
    valid_apids: HashSet<Apid>,
    channels: HashMap<ChannelKey, ChannelState>,
}

impl Reassembler {
    #[must_use]
    pub fn new(izone_length: usize, trailer_length: usize) -> Self {
        Reassembler {
            izone_length,
            trailer_length,
            valid_apids: HashSet::default(),
            channels: HashMap::default(),
        }
    }

    /// Only accept packets with these APIDs. A header with any other APID is taken to mean
    /// packet sync was lost and the rest of its frame is dropped. Idle packets are always
    /// accepted. An empty set accepts all APIDs.
    #[must_use]
    pub fn with_valid_apids<I>(mut self, apids: I) -> Self
    where
        I: IntoIterator<Item = Apid>,
    {
        self.valid_apids = apids.into_iter().collect();
        self
    }

    /// Feed the next frame, returning any packets completed by it along with gap and drop
    /// notifications, in the order they occurred.
    pub fn handle(&mut self, decoded: &DecodedFrame) -> Vec<Event> {
        let mut events = Vec::new();
        let frame = &decoded.frame;
        if frame.is_fill() {
            trace!(counter = frame.header.counter, "fill frame, skipping");
            return events;
        }
        let key = frame.header.key();
        let span = span!(Level::TRACE, "frame", scid = key.scid, vcid = key.vcid);
        let _guard = span.enter();

        let state = self.channels.entry(key).or_default();

        // Frames were lost before this one, but this one is still usable
        if decoded.missing > 0 {
            events.push(Event::Gap {
                key,
                missing: decoded.missing,
            });
            drop_pending(
                state,
                key,
                DropReason::Gap {
                    missing: decoded.missing,
                },
                &mut events,
            );
        }
        if decoded.integrity == Integrity::Uncorrectable {
            drop_pending(state, key, DropReason::Uncorrectable, &mut events);
            return events;
        }

        let mpdu = match frame.mpdu(self.izone_length, self.trailer_length) {
            Ok(mpdu) => mpdu,
            Err(err) => {
                warn!(%err, "cannot extract mpdu");
                drop_pending(state, key, DropReason::MalformedFrame, &mut events);
                return events;
            }
        };
        // There should never be a fill MPDU in a non-fill frame, but check anyways
        if mpdu.is_fill() {
            drop_pending(state, key, DropReason::FillData, &mut events);
            return events;
        }
        let payload = mpdu.payload();

        if !mpdu.has_header() {
            *state = match std::mem::take(state) {
                ChannelState::Idle => {
                    trace!("frame w/o packet header and no packet in progress, dropping");
                    ChannelState::Idle
                }
                ChannelState::Accumulating(mut buf) => {
                    buf.extend_from_slice(payload);
                    settle(key, buf, false, &self.valid_apids, &mut events)
                }
            };
            return events;
        }

        let offset = mpdu.header_offset();
        if offset >= payload.len() {
            debug!(offset, len = payload.len(), "invalid first header pointer");
            drop_pending(
                state,
                key,
                DropReason::InvalidFirstHeaderPointer {
                    offset,
                    len: payload.len(),
                },
                &mut events,
            );
            return events;
        }

        // Bytes before the first header complete the packet in progress
        let (head, tail) = payload.split_at(offset);
        if let ChannelState::Accumulating(mut buf) = std::mem::take(state) {
            buf.extend_from_slice(head);
            *state = settle(key, buf, true, &self.valid_apids, &mut events);
        }
        debug_assert!(matches!(state, ChannelState::Idle));
        *state = walk(key, tail, &self.valid_apids, &mut events);

        events
    }

    /// Finish reassembly, dropping any packets still in progress.
    pub fn finish(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut keys: Vec<ChannelKey> = self.channels.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            if let Some(state) = self.channels.get_mut(&key) {
                drop_pending(state, key, DropReason::EndOfStream, &mut events);
            }
        }
        self.channels.clear();
        events
    }

    /// Number of channels with a packet in progress.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.channels
            .values()
            .filter(|s| matches!(s, ChannelState::Accumulating(_)))
            .count()
    }
}

fn drop_pending(
    state: &mut ChannelState,
    key: ChannelKey,
    reason: DropReason,
    events: &mut Vec<Event>,
) {
    if let ChannelState::Accumulating(buf) = std::mem::take(state) {
        debug!(%reason, bytes = buf.len(), "dropping partial packet");
        events.push(Event::Dropped {
            key,
            reason,
            bytes: buf.len(),
        });
    }
}

fn emit(key: ChannelKey, data: &[u8], events: &mut Vec<Event>) {
    let packet = match Packet::decode(data) {
        Ok(packet) => packet,
        Err(err) => {
            // callers always provide exactly one complete packet
            warn!(%err, "failed to decode complete packet");
            return;
        }
    };
    if packet.header.apid == PrimaryHeader::IDLE_APID {
        trace!(len = data.len(), "idle packet");
        return;
    }
    events.push(Event::Packet(DecodedPacket {
        scid: key.scid,
        vcid: key.vcid,
        packet,
        timecode: None,
    }));
}

/// Sanity check a packet header. Telemetry packets must be version 0 with a type flag of 0
/// and, if `valid_apids` is not empty, have a known APID.
fn check_header(header: &PrimaryHeader, valid_apids: &HashSet<Apid>) -> Option<DropReason> {
    if header.version != 0 || header.type_flag != 0 {
        return Some(DropReason::InvalidHeader {
            version: header.version,
            type_flag: header.type_flag,
        });
    }
    if !valid_apids.is_empty()
        && header.apid != PrimaryHeader::IDLE_APID
        && !valid_apids.contains(&header.apid)
    {
        return Some(DropReason::InvalidApid { apid: header.apid });
    }
    None
}

fn invalid_header(
    key: ChannelKey,
    header: &PrimaryHeader,
    reason: DropReason,
    bytes: usize,
    events: &mut Vec<Event>,
) {
    warn!(?header, %reason, "invalid packet header, dropping");
    events.push(Event::Dropped { key, reason, bytes });
}

/// Resolve a packet that started in a previous frame. `boundary` indicates a new packet
/// header directly follows `buf`, so the packet cannot receive any more data and the
/// returned state is always [ChannelState::Idle].
fn settle(
    key: ChannelKey,
    buf: Vec<u8>,
    boundary: bool,
    valid_apids: &HashSet<Apid>,
    events: &mut Vec<Event>,
) -> ChannelState {
    let header = match PrimaryHeader::decode(&buf) {
        Ok(header) => header,
        Err(_) if !boundary => return ChannelState::Accumulating(buf),
        Err(_) => {
            let reason = DropReason::Truncated {
                expected: PrimaryHeader::LEN,
                actual: buf.len(),
            };
            drop_pending(&mut ChannelState::Accumulating(buf), key, reason, events);
            return ChannelState::Idle;
        }
    };
    if let Some(reason) = check_header(&header, valid_apids) {
        invalid_header(key, &header, reason, buf.len(), events);
        return ChannelState::Idle;
    }

    let need = header.packet_length();
    match buf.len().cmp(&need) {
        Ordering::Less if !boundary => ChannelState::Accumulating(buf),
        Ordering::Less => {
            let reason = DropReason::Truncated {
                expected: need,
                actual: buf.len(),
            };
            drop_pending(&mut ChannelState::Accumulating(buf), key, reason, events);
            ChannelState::Idle
        }
        Ordering::Equal => {
            emit(key, &buf, events);
            ChannelState::Idle
        }
        Ordering::Greater => {
            warn!(
                extra = buf.len() - need,
                apid = header.apid,
                "bytes left over after packet with no header announced, discarding"
            );
            emit(key, &buf[..need], events);
            ChannelState::Idle
        }
    }
}

/// Emit every complete packet in `data`, which must start with a packet header, and
/// return the state for whatever is left over.
fn walk(
    key: ChannelKey,
    data: &[u8],
    valid_apids: &HashSet<Apid>,
    events: &mut Vec<Event>,
) -> ChannelState {
    let mut rest = data;
    while !rest.is_empty() {
        let Ok(header) = PrimaryHeader::decode(rest) else {
            // header continues in the next frame
            return ChannelState::Accumulating(rest.to_vec());
        };
        if let Some(reason) = check_header(&header, valid_apids) {
            invalid_header(key, &header, reason, rest.len(), events);
            return ChannelState::Idle;
        }
        let need = header.packet_length();
        if rest.len() < need {
            return ChannelState::Accumulating(rest.to_vec());
        }
        let (packet, tail) = rest.split_at(need);
        emit(key, packet, events);
        rest = tail;
    }
    ChannelState::Idle
}

/// Iterator of reassembly [Event]s produced from a stream of frames. Created using
/// [decode_framed_packets].
///
/// An [Error::Io] from the frame stream is passed on and ends iteration without flushing
/// packets in progress. Other errors are passed on and iteration continues.
pub struct PacketStream<I> {
    frames: I,
    reassembler: Reassembler,
    // Events that have already been produced and are waiting to be provided.
    ready: VecDeque<Event>,
    done: bool,
}

impl<I> PacketStream<I> {
    /// See [Reassembler::with_valid_apids].
    #[must_use]
    pub fn with_valid_apids<A>(mut self, apids: A) -> Self
    where
        A: IntoIterator<Item = Apid>,
    {
        self.reassembler = self.reassembler.with_valid_apids(apids);
        self
    }
}

impl<I> Iterator for PacketStream<I>
where
    I: Iterator<Item = Result<DecodedFrame>>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.frames.next() {
                Some(Ok(frame)) => self.ready.extend(self.reassembler.handle(&frame)),
                Some(Err(err)) => {
                    if matches!(err, Error::Io(_)) {
                        self.done = true;
                    }
                    return Some(Err(err));
                }
                None => {
                    trace!("no more frames");
                    self.done = true;
                    self.ready.extend(self.reassembler.finish());
                }
            }
        }
    }
}

/// Decodes the provided frames into the packets contained within the frames' MPDUs.
///
/// There are several cases when frame data cannot be fully recovered and is dropped,
/// i.e., not used to construct packets, each reported with an [Event::Dropped]:
///
/// 1. Missing frames, which are also reported with an [Event::Gap]
/// 2. Frames with [Integrity::Uncorrectable]
/// 3. Packets whose length is not reached before the next header or the end of the stream
/// 4. Packet headers with an invalid version or type flag, or an APID not accepted by
///    [PacketStream::with_valid_apids], which drop the rest of the frame
///
/// Fill frames and idle packets are consumed silently.
pub fn decode_framed_packets<I>(
    frames: I,
    izone_length: usize,
    trailer_length: usize,
) -> PacketStream<I::IntoIter>
where
    I: IntoIterator<Item = Result<DecodedFrame>>,
{
    PacketStream {
        frames: frames.into_iter(),
        reassembler: Reassembler::new(izone_length, trailer_length),
        ready: VecDeque::new(),
        done: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{Frame, VCDUHeader, MPDU};
    use crate::spacepacket::SEQ_UNSEGMENTED;

    const FRAME_LEN: usize = 40;
    const ZONE_LEN: usize = FRAME_LEN - VCDUHeader::LEN - MPDU::LEN;

    fn packet(apid: u16, seq: u16, user_len: usize) -> Vec<u8> {
        let header = PrimaryHeader {
            version: 0,
            type_flag: 0,
            has_secondary_header: false,
            apid,
            sequence_flags: SEQ_UNSEGMENTED,
            sequence_id: seq,
            len_minus1: (user_len - 1) as u16,
        };
        let mut dat = header.encode().to_vec();
        dat.extend((0..user_len).map(|i| (i % 251) as u8));
        dat
    }

    fn frame(vcid: u16, counter: u32, fhp: u16, zone: &[u8], missing: u32) -> DecodedFrame {
        assert_eq!(zone.len(), ZONE_LEN);
        let header = VCDUHeader {
            version: 1,
            scid: 157,
            vcid,
            counter,
            replay: false,
            cycle: false,
            counter_cycle: 0,
        };
        let mut dat = header.encode().to_vec();
        dat.extend_from_slice(&fhp.to_be_bytes());
        dat.extend_from_slice(zone);
        DecodedFrame {
            frame: Frame::decode(dat).unwrap(),
            missing,
            integrity: Integrity::NotPerformed,
        }
    }

    /// Packet zone of `parts` filled out with an idle packet.
    fn zone(parts: &[&[u8]]) -> Vec<u8> {
        let mut dat: Vec<u8> = parts.concat();
        let remaining = ZONE_LEN - dat.len();
        if remaining > 0 {
            dat.extend(packet(
                PrimaryHeader::IDLE_APID,
                0,
                remaining - PrimaryHeader::LEN,
            ));
        }
        dat
    }

    fn packets(events: &[Event]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Packet(p) => Some(p.packet.data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn packets_within_single_frame() {
        let a = packet(100, 1, 5);
        let b = packet(100, 2, 5);
        let mut r = Reassembler::new(0, 0);

        let events = r.handle(&frame(16, 0, 0, &zone(&[&a, &b]), 0));

        assert_eq!(packets(&events), vec![a, b]);
        assert_eq!(events.len(), 2, "idle packet should not be emitted");
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn packet_spanning_frames() {
        let a = packet(100, 1, 60);
        let b = packet(101, 7, 3);
        let (first, rest) = a.split_at(ZONE_LEN);
        let (second, third) = rest.split_at(ZONE_LEN);
        let mut r = Reassembler::new(0, 0);

        let mut events = r.handle(&frame(16, 0, 0, first, 0));
        events.extend(r.handle(&frame(16, 1, MPDU::NO_HEADER, second, 0)));
        assert!(events.is_empty());
        assert_eq!(r.pending(), 1);
        events.extend(r.handle(&frame(16, 2, third.len() as u16, &zone(&[third, &b]), 0)));

        assert_eq!(packets(&events), vec![a, b]);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn header_split_across_frames() {
        let a = packet(100, 1, 8);
        let b = packet(100, 2, 20);
        let pad = packet(PrimaryHeader::IDLE_APID, 0, ZONE_LEN - a.len() - 3 - 6);
        let zone1 = [&pad[..], &a[..], &b[..3]].concat();
        let mut r = Reassembler::new(0, 0);

        let mut events = r.handle(&frame(16, 0, 0, &zone1, 0));
        assert_eq!(packets(&events), vec![a.clone()]);
        let rest = &b[3..];
        events.extend(r.handle(&frame(16, 1, rest.len() as u16, &zone(&[rest]), 0)));

        assert_eq!(packets(&events), vec![a, b]);
    }

    #[test]
    fn gap_drops_partial_packet_and_recovers() {
        let a = packet(100, 1, 60);
        let b = packet(100, 3, 5);
        let mut r = Reassembler::new(0, 0);

        let mut events = r.handle(&frame(16, 0, 0, &a[..ZONE_LEN], 0));
        events.extend(r.handle(&frame(16, 2, 4, &zone(&[&[1, 2, 3, 4], &b]), 1)));

        assert_eq!(
            events,
            vec![
                Event::Gap {
                    key: ChannelKey::new(157, 16),
                    missing: 1
                },
                Event::Dropped {
                    key: ChannelKey::new(157, 16),
                    reason: DropReason::Gap { missing: 1 },
                    bytes: ZONE_LEN,
                },
                Event::Packet(DecodedPacket {
                    scid: 157,
                    vcid: 16,
                    packet: Packet::decode(&b).unwrap(),
                    timecode: None,
                }),
            ]
        );
    }

    #[test]
    fn next_header_before_packet_complete_is_truncated() {
        let a = packet(100, 1, 40);
        let b = packet(100, 2, 4);
        let mut r = Reassembler::new(0, 0);

        let mut events = r.handle(&frame(16, 0, 0, &a[..ZONE_LEN], 0));
        events.extend(r.handle(&frame(16, 1, 2, &zone(&[&a[ZONE_LEN..ZONE_LEN + 2], &b]), 0)));

        assert!(events.contains(&Event::Dropped {
            key: ChannelKey::new(157, 16),
            reason: DropReason::Truncated {
                expected: a.len(),
                actual: ZONE_LEN + 2
            },
            bytes: ZONE_LEN + 2,
        }));
        assert_eq!(packets(&events), vec![b]);
    }

    #[test]
    fn channels_are_independent() {
        let a = packet(100, 1, 40);
        let b = packet(200, 1, 40);
        let (rest_a, rest_b) = (&a[ZONE_LEN..], &b[ZONE_LEN..]);
        let mut r = Reassembler::new(0, 0);

        let mut events = r.handle(&frame(16, 0, 0, &a[..ZONE_LEN], 0));
        events.extend(r.handle(&frame(6, 0, 0, &b[..ZONE_LEN], 0)));
        events.extend(r.handle(&frame(6, 1, rest_b.len() as u16, &zone(&[rest_b]), 0)));
        events.extend(r.handle(&frame(16, 1, rest_a.len() as u16, &zone(&[rest_a]), 0)));

        assert_eq!(packets(&events), vec![b, a]);
        let Event::Packet(p) = &events[0] else {
            panic!("expected packet");
        };
        assert_eq!(p.key(), ChannelKey::new(157, 6));
    }

    #[test]
    fn uncorrectable_and_invalid_pointer_drop_pending() {
        let a = packet(100, 1, 60);
        let mut r = Reassembler::new(0, 0);

        r.handle(&frame(16, 0, 0, &a[..ZONE_LEN], 0));
        let mut bad = frame(16, 1, MPDU::NO_HEADER, &zone(&[]), 0);
        bad.integrity = Integrity::Uncorrectable;
        let events = r.handle(&bad);
        assert_eq!(
            events,
            vec![Event::Dropped {
                key: ChannelKey::new(157, 16),
                reason: DropReason::Uncorrectable,
                bytes: ZONE_LEN
            }]
        );

        r.handle(&frame(16, 2, 0, &a[..ZONE_LEN], 0));
        let events = r.handle(&frame(16, 3, 0x700, &zone(&[]), 0));
        assert!(matches!(
            events[0],
            Event::Dropped {
                reason: DropReason::InvalidFirstHeaderPointer { offset: 0x700, .. },
                ..
            }
        ));
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn invalid_version_drops_rest_of_frame() {
        let a = packet(100, 1, 4);
        let mut bad = packet(100, 2, 4);
        bad[0] |= 0x20;
        let mut r = Reassembler::new(0, 0);

        let events = r.handle(&frame(16, 0, 0, &zone(&[&a, &bad]), 0));

        assert_eq!(packets(&events), vec![a.clone()]);
        assert!(matches!(
            events[1],
            Event::Dropped {
                reason: DropReason::InvalidHeader { version: 1, type_flag: 0 },
                bytes,
                ..
            } if bytes == ZONE_LEN - a.len()
        ));
    }

    #[test]
    fn telecommand_type_flag_drops_rest_of_frame() {
        let a = packet(100, 1, 4);
        let mut bad = packet(100, 2, 4);
        bad[0] |= 0x10;
        let mut r = Reassembler::new(0, 0);

        let events = r.handle(&frame(16, 0, 0, &zone(&[&a, &bad]), 0));

        assert_eq!(packets(&events), vec![a.clone()]);
        assert_eq!(
            events[1],
            Event::Dropped {
                key: ChannelKey::new(157, 16),
                reason: DropReason::InvalidHeader {
                    version: 0,
                    type_flag: 1
                },
                bytes: ZONE_LEN - a.len(),
            }
        );
    }

    #[test]
    fn invalid_header_split_across_frames_is_dropped() {
        let a = packet(100, 1, 23);
        let mut bad = packet(100, 2, 4);
        bad[0] |= 0x10;
        let mut r = Reassembler::new(0, 0);

        let events = r.handle(&frame(16, 0, 0, &[&a[..], &bad[..3]].concat(), 0));
        assert_eq!(packets(&events), vec![a.clone()]);
        assert_eq!(r.pending(), 1);

        let events = r.handle(&frame(16, 1, 7, &zone(&[&bad[3..]]), 0));

        assert_eq!(
            events,
            vec![Event::Dropped {
                key: ChannelKey::new(157, 16),
                reason: DropReason::InvalidHeader {
                    version: 0,
                    type_flag: 1
                },
                bytes: bad.len(),
            }]
        );
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn unknown_apid_drops_rest_of_frame() {
        let a = packet(100, 1, 4);
        let b = packet(200, 1, 4);
        let mut r = Reassembler::new(0, 0).with_valid_apids([100, 101]);

        let events = r.handle(&frame(16, 0, 0, &zone(&[&a, &b]), 0));

        assert_eq!(packets(&events), vec![a.clone()]);
        assert_eq!(
            events[1],
            Event::Dropped {
                key: ChannelKey::new(157, 16),
                reason: DropReason::InvalidApid { apid: 200 },
                bytes: ZONE_LEN - a.len(),
            }
        );

        // idle fill is still accepted
        let events = r.handle(&frame(16, 1, 0, &zone(&[&a]), 0));
        assert_eq!(packets(&events), vec![a]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn fill_frames_are_ignored() {
        let a = packet(100, 1, 60);
        let mut r = Reassembler::new(0, 0);

        r.handle(&frame(16, 0, 0, &a[..ZONE_LEN], 0));
        let events = r.handle(&frame(VCDUHeader::FILL, 0, MPDU::FILL, &zone(&[]), 0));

        assert!(events.is_empty());
        assert_eq!(r.pending(), 1);
    }

    #[test]
    fn stream_flushes_pending_at_end() {
        let a = packet(100, 1, 4);
        let b = packet(100, 2, 60);
        let frames = vec![Ok(frame(16, 0, 0, &[&a[..], &b[..ZONE_LEN - a.len()]].concat(), 0))];

        let events: Vec<Event> = decode_framed_packets(frames, 0, 0)
            .map(Result::unwrap)
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(packets(&events), vec![a.clone()]);
        assert_eq!(
            events[1],
            Event::Dropped {
                key: ChannelKey::new(157, 16),
                reason: DropReason::EndOfStream,
                bytes: ZONE_LEN - a.len(),
            }
        );
    }

    #[test]
    fn izone_and_trailer_are_excluded() {
        let a = packet(100, 1, 4);
        let mut dat = VCDUHeader {
            version: 1,
            scid: 157,
            vcid: 16,
            counter: 0,
            replay: false,
            cycle: false,
            counter_cycle: 0,
        }
        .encode()
        .to_vec();
        dat.extend_from_slice(&[0xaa; 3]);
        dat.extend_from_slice(&[0x00, 0x00]);
        dat.extend_from_slice(&a);
        dat.extend_from_slice(&[0xbb; 4]);
        let decoded = DecodedFrame {
            frame: Frame::decode(dat).unwrap(),
            missing: 0,
            integrity: Integrity::Ok,
        };

        let events = Reassembler::new(3, 4).handle(&decoded);

        assert_eq!(packets(&events), vec![a]);
    }
}
