/// Length in bytes of one period of the CCSDS pseudo-random sequence.
pub const SEQUENCE_LEN: usize = 255;

/// The CCSDS pseudo-random sequence generated by h(x) = x^8 + x^7 + x^5 + x^3 + 1 with all
/// register bits initialized to 1.
pub const SEQUENCE: [u8; SEQUENCE_LEN] = generate_sequence();

const fn generate_sequence() -> [u8; SEQUENCE_LEN] {
    let mut seq = [0u8; SEQUENCE_LEN];
    let mut state: u8 = 0xff;
    let mut idx = 0;
    while idx < SEQUENCE_LEN {
        let mut byte = 0u8;
        let mut bit = 0;
        while bit < 8 {
            byte = (byte << 1) | (state & 1);
            let feedback = (state ^ (state >> 3) ^ (state >> 5) ^ (state >> 7)) & 1;
            state = (state >> 1) | (feedback << 7);
            bit += 1;
        }
        seq[idx] = byte;
        idx += 1;
    }
    seq
}

/// Removes a pseudo-random sequence applied to a block at transmit time.
pub trait Derandomizer: Send + Sync {
    /// Return a copy of `dat` with the pseudo-random sequence removed. The returned block is
    /// always the same length as `dat`.
    fn derandomize(&self, dat: &[u8]) -> Vec<u8>;
}

/// Derandomizer using the standard CCSDS sequence, restarted at the first byte of every
/// block.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDerandomizer;

impl Derandomizer for DefaultDerandomizer {
    fn derandomize(&self, dat: &[u8]) -> Vec<u8> {
        pn_decode(dat)
    }
}

/// XOR `dat` with the CCSDS pseudo-random sequence.
///
/// Randomizing and derandomizing are the same operation, so applying this to a randomized
/// block recovers the original bytes.
#[must_use]
pub fn pn_decode(dat: &[u8]) -> Vec<u8> {
    dat.iter()
        .zip(SEQUENCE.iter().cycle())
        .map(|(b, pn)| b ^ pn)
        .collect()
}
