use chrono::Duration;
use tracing::trace;
use typed_builder::TypedBuilder;

use super::{missing_packets, Apid, Packet};
use crate::framing::DecodedPacket;
use crate::timecode::Timecode;

/// Anything that can be grouped into a [PacketGroup].
pub trait Groupable {
    fn packet(&self) -> &Packet;

    /// Timecode used to detect acquisition boundaries, if known.
    fn timecode(&self) -> Option<&Timecode> {
        None
    }
}

impl Groupable for Packet {
    fn packet(&self) -> &Packet {
        self
    }
}

impl Groupable for DecodedPacket {
    fn packet(&self) -> &Packet {
        &self.packet
    }

    fn timecode(&self) -> Option<&Timecode> {
        self.timecode.as_ref()
    }
}

/// Packets sharing an APID that belong to a single acquisition, e.g., one sensor scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketGroup<P> {
    pub apid: Apid,
    pub packets: Vec<P>,
}

impl<P: Groupable> PacketGroup<P> {
    /// Return true if this packet group is complete according to the packet sequence flags.
    ///
    /// Complete means either a single standalone packet, or a first packet through a last
    /// packet with no missing packets in between.
    #[must_use]
    pub fn complete(&self) -> bool {
        match self.packets.as_slice() {
            [] => false,
            [only] => only.packet().is_standalone(),
            [first, .., last] => {
                first.packet().is_first() && last.packet().is_last() && !self.have_missing()
            }
        }
    }

    /// True if there are gaps in the packet sequence counters of this group.
    #[must_use]
    pub fn have_missing(&self) -> bool {
        self.packets.windows(2).any(|pair| {
            let (a, b) = (pair[0].packet(), pair[1].packet());
            missing_packets(b.header.sequence_id, a.header.sequence_id) > 0
        })
    }

    /// Timecode of the first packet, if any.
    #[must_use]
    pub fn timecode(&self) -> Option<&Timecode> {
        self.packets.first().and_then(Groupable::timecode)
    }
}

/// Controls when a new group is started. A new group is always started when the APID
/// changes or time goes backwards.
#[derive(TypedBuilder, Debug, Clone, Default)]
pub struct GroupConfig {
    /// Largest time difference between consecutive packets in a group.
    #[builder(default, setter(strip_option))]
    pub max_gap: Option<Duration>,
    /// Use sequence flags: start a new group at each first packet, close it at each last
    /// packet, and put standalone packets in groups of their own.
    #[builder(default)]
    pub split_on_first: bool,
}

/// Iterator of [PacketGroup]s. Created using [collect_groups] or [collect_groups_with].
pub struct PacketGroupIter<I, P> {
    packets: I,
    config: GroupConfig,
    group: Option<PacketGroup<P>>,
}

impl<I, P> PacketGroupIter<I, P>
where
    P: Groupable,
{
    /// True if `packet` cannot be added to `group`.
    fn starts_new_group(&self, group: &PacketGroup<P>, packet: &P) -> bool {
        if packet.packet().header.apid != group.apid {
            return true;
        }
        if self.config.split_on_first
            && (packet.packet().is_first() || packet.packet().is_standalone())
        {
            return true;
        }
        let prev = group.packets.last().and_then(Groupable::timecode);
        if let (Some(prev), Some(cur)) = (prev, packet.timecode()) {
            let delta = cur.unix_nanos() - prev.unix_nanos();
            if delta < 0 {
                trace!(apid = group.apid, delta, "time went backwards, new group");
                return true;
            }
            if let Some(max_gap) = self.config.max_gap {
                if Duration::nanoseconds(delta) > max_gap {
                    trace!(apid = group.apid, delta, "time gap exceeded, new group");
                    return true;
                }
            }
        }
        false
    }

    /// True if nothing more may be added to `group`.
    fn closes_group(&self, group: &PacketGroup<P>) -> bool {
        self.config.split_on_first
            && group
                .packets
                .last()
                .is_some_and(|p| p.packet().is_last() || p.packet().is_standalone())
    }
}

impl<I, P> Iterator for PacketGroupIter<I, P>
where
    I: Iterator<Item = P>,
    P: Groupable,
{
    type Item = PacketGroup<P>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(packet) = self.packets.next() else {
                return self.group.take();
            };
            let Some(mut group) = self.group.take() else {
                self.group = Some(PacketGroup {
                    apid: packet.packet().header.apid,
                    packets: vec![packet],
                });
                continue;
            };

            if self.closes_group(&group) || self.starts_new_group(&group, &packet) {
                self.group = Some(PacketGroup {
                    apid: packet.packet().header.apid,
                    packets: vec![packet],
                });
                return Some(group);
            }
            group.packets.push(packet);
            self.group = Some(group);
        }
    }
}

/// Collects `packets` into [PacketGroup]s using the default [GroupConfig], i.e., a new
/// group starts whenever the APID changes or time goes backwards.
///
/// Groups are provided in the order they are discovered.
///
/// # Example
/// ```
/// use spacelink::spacepacket::{collect_groups, Packet};
///
/// let dat: &[u8] = &[0xd, 0x59, 0xc0, 0x01, 0x0, 0x0, 0xff];
/// let packets = vec![Packet::decode(dat).unwrap(), Packet::decode(dat).unwrap()];
///
/// let groups: Vec<_> = collect_groups(packets).collect();
/// assert_eq!(groups.len(), 1);
/// assert_eq!(groups[0].apid, 1369);
/// ```
pub fn collect_groups<I>(packets: I) -> PacketGroupIter<I::IntoIter, I::Item>
where
    I: IntoIterator,
    I::Item: Groupable,
{
    collect_groups_with(packets, GroupConfig::default())
}

/// Collects `packets` into [PacketGroup]s as configured by `config`.
pub fn collect_groups_with<I>(packets: I, config: GroupConfig) -> PacketGroupIter<I::IntoIter, I::Item>
where
    I: IntoIterator,
    I::Item: Groupable,
{
    PacketGroupIter {
        packets: packets.into_iter(),
        config,
        group: None,
    }
}
