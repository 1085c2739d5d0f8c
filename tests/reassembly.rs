use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spacelink::framing::{decode_framed_packets, ChannelKey, Event, FrameDecoder};
use spacelink::spacepacket::{decode_packets, Packet, PrimaryHeader};

mod common;

fn random_packets(rng: &mut StdRng, count: usize, max_user_len: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|_| {
            let apid = rng.gen_range(0..PrimaryHeader::IDLE_APID);
            let seq = rng.gen_range(0..=PrimaryHeader::SEQ_MAX);
            common::packet(apid, seq, rng.gen_range(1..=max_user_len))
        })
        .collect()
}

fn reassemble(frames: Vec<Vec<u8>>) -> Vec<Event> {
    let decoder = FrameDecoder::builder().pseudo_randomized(false).build();
    decode_framed_packets(decoder.decode(frames.into_iter().map(Ok)), 0, 0)
        .map(Result::unwrap)
        .collect()
}

#[test]
fn frame_boundaries_do_not_change_packets() {
    for seed in 0..25 {
        let mut rng = StdRng::seed_from_u64(seed);
        let frame_len = rng.gen_range(24..300);
        let count = rng.gen_range(1..30);
        let source = random_packets(&mut rng, count, 500);
        let frames = common::frames_from_packets(157, 16, 0, &source, frame_len);

        let zult: Vec<Packet> = reassemble(frames)
            .into_iter()
            .map(|e| e.into_packet().expect("expected only packets").packet)
            .collect();

        let expected: Vec<Packet> = decode_packets(source.concat().as_slice())
            .map(Result::unwrap)
            .collect();
        assert_eq!(zult, expected, "seed={seed} frame_len={frame_len}");
    }
}

#[test]
fn lost_frame_drops_only_affected_packets() {
    const FRAME_LEN: usize = 64;
    const ZONE_LEN: usize = FRAME_LEN - 8;
    const LOST: usize = 3;

    let mut rng = StdRng::seed_from_u64(1369);
    let source = random_packets(&mut rng, 40, 40);
    let mut frames = common::frames_from_packets(157, 16, 0, &source, FRAME_LEN);
    frames.remove(LOST);

    let (lost_start, lost_end) = (LOST * ZONE_LEN, (LOST + 1) * ZONE_LEN);
    let mut offset = 0;
    let mut expected = Vec::new();
    for p in &source {
        let (start, end) = (offset, offset + p.len());
        if end <= lost_start || start >= lost_end {
            expected.push(p.clone());
        }
        offset = end;
    }

    let events = reassemble(frames);

    let gaps: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::Gap { .. }))
        .collect();
    assert_eq!(
        gaps,
        vec![&Event::Gap {
            key: ChannelKey::new(157, 16),
            missing: 1
        }]
    );
    let zult: Vec<Vec<u8>> = events
        .into_iter()
        .filter_map(Event::into_packet)
        .map(|p| p.packet.data)
        .collect();
    assert_eq!(zult, expected);
}

#[test]
fn interleaved_channels_are_reassembled_independently() {
    let mut rng = StdRng::seed_from_u64(42);
    let a = random_packets(&mut rng, 10, 120);
    let b = random_packets(&mut rng, 10, 120);
    let a_frames = common::frames_from_packets(157, 1, 10, &a, 100);
    let b_frames = common::frames_from_packets(157, 2, 500, &b, 100);

    let mut frames = Vec::new();
    let mut a_iter = a_frames.into_iter();
    let mut b_iter = b_frames.into_iter();
    loop {
        match (a_iter.next(), b_iter.next()) {
            (None, None) => break,
            (x, y) => frames.extend(x.into_iter().chain(y)),
        }
    }

    let events = reassemble(frames);

    let on_channel = |vcid: u16| -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Packet(p) if p.vcid == vcid => Some(p.packet.data.clone()),
                _ => None,
            })
            .collect()
    };
    assert_eq!(on_channel(1), a);
    assert_eq!(on_channel(2), b);
    assert!(!events.iter().any(|e| matches!(e, Event::Gap { .. })));
}

#[test]
fn primary_header_survives_reassembly() {
    let mut rng = StdRng::seed_from_u64(7);
    let source = random_packets(&mut rng, 20, 300);
    let frames = common::frames_from_packets(177, 16, 0, &source, 1115);

    for (event, raw) in reassemble(frames).into_iter().zip(&source) {
        let packet = event.into_packet().unwrap().packet;
        let header = PrimaryHeader::decode(raw).unwrap();
        assert_eq!(packet.header, header);
        assert_eq!(packet.header.encode(), raw[..PrimaryHeader::LEN]);
        assert_eq!(packet.data.len(), header.packet_length());
    }
}
