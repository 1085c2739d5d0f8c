//! Builders for synthetic CADU streams.
#![allow(dead_code)]

use std::io::Write;

use spacelink::framing::{pn_decode, VCDUHeader, ASM, MPDU};
use spacelink::spacepacket::{PrimaryHeader, SEQ_UNSEGMENTED};
use tempfile::NamedTempFile;

/// CDS timecode 2016-01-01T00:00:00.167219
pub const CDS_TIMECODE: [u8; 9] = [0x52, 0xc0, 0x00, 0x00, 0x00, 0xa7, 0x00, 0xdb, 0xff];

pub fn packet(apid: u16, seq: u16, user_len: usize) -> Vec<u8> {
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
    dat.extend((0..user_len).map(|i| (i * 31 + usize::from(apid)) as u8));
    dat
}

/// Packet with a CDS timecode secondary header followed by `user_len` bytes.
pub fn timed_packet(apid: u16, seq: u16, timecode: &[u8; 9], user_len: usize) -> Vec<u8> {
    let mut dat = packet(apid, seq, CDS_TIMECODE.len() + user_len);
    dat[0] |= 0x08;
    dat[PrimaryHeader::LEN..PrimaryHeader::LEN + 9].copy_from_slice(timecode);
    dat
}

/// Idle packet `len` bytes long in total.
pub fn idle_packet(len: usize) -> Vec<u8> {
    assert!(len > PrimaryHeader::LEN, "idle packet needs at least 7 bytes");
    let mut dat = packet(PrimaryHeader::IDLE_APID, 0, len - PrimaryHeader::LEN);
    dat[PrimaryHeader::LEN..].fill(0x55);
    dat
}

pub fn vcdu_header(scid: u16, vcid: u16, counter: u32) -> [u8; 6] {
    VCDUHeader {
        version: 1,
        scid,
        vcid,
        counter,
        replay: false,
        cycle: false,
        counter_cycle: 0,
    }
    .encode()
}

/// A frame of `frame_len` bytes with an MPDU whose first header pointer is `fhp`. `zone`
/// must be exactly the size of the packet zone.
pub fn frame(scid: u16, vcid: u16, counter: u32, fhp: u16, zone: &[u8], frame_len: usize) -> Vec<u8> {
    let mut dat = vcdu_header(scid, vcid, counter).to_vec();
    dat.extend_from_slice(&fhp.to_be_bytes());
    dat.extend_from_slice(zone);
    assert_eq!(dat.len(), frame_len, "zone does not fill frame");
    dat
}

/// Lay `packets` back to back into consecutive frames on one virtual channel, starting at
/// frame counter `counter`. The last frame is filled out with idle data.
pub fn frames_from_packets(
    scid: u16,
    vcid: u16,
    counter: u32,
    packets: &[Vec<u8>],
    frame_len: usize,
) -> Vec<Vec<u8>> {
    let zone_len = frame_len - VCDUHeader::LEN - MPDU::LEN;
    let mut payload = Vec::new();
    let mut starts = Vec::new();
    for p in packets {
        starts.push(payload.len());
        payload.extend_from_slice(p);
    }
    let remaining = (zone_len - payload.len() % zone_len) % zone_len;
    if remaining > 0 {
        let idle_len = if remaining > PrimaryHeader::LEN {
            remaining
        } else {
            remaining + zone_len
        };
        starts.push(payload.len());
        payload.extend(idle_packet(idle_len));
    }

    payload
        .chunks(zone_len)
        .enumerate()
        .map(|(idx, zone)| {
            let zone_start = idx * zone_len;
            let fhp = starts
                .iter()
                .find(|s| (zone_start..zone_start + zone_len).contains(*s))
                .map_or(MPDU::NO_HEADER, |s| (s - zone_start) as u16);
            frame(scid, vcid, counter + idx as u32, fhp, zone, frame_len)
        })
        .collect()
}

/// Serialize frames into a CADU stream. Each frame gets `parity_len` bytes of parity
/// stand-in and is randomized, then prefixed with the ASM.
pub fn cadus(frames: &[Vec<u8>], parity_len: usize) -> Vec<u8> {
    let mut dat = Vec::new();
    for frame in frames {
        let mut block = frame.clone();
        block.extend((0..parity_len).map(|i| i as u8));
        dat.extend_from_slice(&ASM);
        dat.extend(pn_decode(&block));
    }
    dat
}

pub fn write_fixture(dat: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create fixture file");
    file.write_all(dat).expect("failed to write fixture");
    file.flush().expect("failed to flush fixture");
    file
}
