use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::trace;

use crate::bytes::Bytes;
use crate::prelude::*;

/// Default CCSDS attached sync marker.
pub const ASM: [u8; 4] = [0x1a, 0xcf, 0xfc, 0x1d];

/// Marker bit patterns for each of the 8 possible bit offsets. Pattern `s` matches a marker
/// starting `s` bits into the first byte of an `asm.len() + 1` byte window; pattern 0 is the
/// byte-aligned marker itself.
fn create_patterns(asm: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut patterns = vec![(asm.to_vec(), vec![0xff; asm.len()])];
    let mask = vec![0xff; asm.len()];
    for shift in 1..8 {
        patterns.push((right_shift(asm, shift), right_shift(&mask, shift)));
    }
    patterns
}

/// Shift `dat` right by `shift` bits into a buffer one byte longer than `dat`.
fn right_shift(dat: &[u8], shift: u32) -> Vec<u8> {
    let mut out = vec![0u8; dat.len() + 1];
    for (i, b) in dat.iter().enumerate() {
        out[i] |= b >> shift;
        out[i + 1] |= b << (8 - shift);
    }
    out
}

/// Shift `lead` followed by `dat` left by `shift` bits, producing `dat.len()` bytes.
fn left_shift(lead: u8, dat: &[u8], shift: u32) -> Vec<u8> {
    let mut prev = lead;
    dat.iter()
        .map(|&b| {
            let out = (prev << shift) | (b >> (8 - shift));
            prev = b;
            out
        })
        .collect()
}

/// A sychronized block location.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Loc {
    /// Offset (0-based) to the byte containing the first bit of the block following a
    /// found sync marker.
    pub offset: usize,
    /// Bit (0 is the most significant) in the byte at `offset` where the block starts.
    /// Non-zero when the stream is not byte-aligned.
    pub bit: u8,
}

/// Synchronizer scans a byte stream for data blocks indicated by a sync marker.
///
/// The marker may start at any bit of a byte. Blocks following a bit-shifted marker are
/// shifted back into byte alignment before they are returned. Bits that are part of a
/// returned block are never considered as marker candidates.
pub struct Synchronizer<R>
where
    R: Read,
{
    bytes: Bytes<R>,
    asm_len: usize,
    // Size of the block of data expected after an ASM
    block_size: usize,
    // (pattern, mask) for each bit offset
    patterns: Vec<(Vec<u8>, Vec<u8>)>,
    // Rolling window over the most recently read bytes, at most asm_len + 1 long
    window: VecDeque<u8>,
    // Bits of the front of the window already used by the previous block
    used_bits: u32,
    // Bit offset of the most recent marker and the byte holding the start of its block
    shift: u32,
    lead: u8,
    /// Number of sync markers found so far.
    pub sync_count: usize,
    /// Number of sync markers found at each bit offset.
    pub pattern_hits: [usize; 8],
}

impl<R> Synchronizer<R>
where
    R: Read,
{
    /// Creates a new ``Synchronizer``.
    ///
    /// `block_size` is the length of the data following each marker, not including the
    /// marker itself.
    pub fn new(reader: R, asm: &[u8], block_size: usize) -> Self {
        Synchronizer {
            bytes: Bytes::new(reader),
            asm_len: asm.len(),
            block_size,
            patterns: create_patterns(asm),
            window: VecDeque::with_capacity(asm.len() + 1),
            used_bits: 0,
            shift: 0,
            lead: 0,
            sync_count: 0,
            pattern_hits: [0; 8],
        }
    }

    /// Bit offset of the marker completed by the current window, if any.
    fn matching_shift(&self) -> Option<u32> {
        let n = self.asm_len;
        let len = self.window.len();
        // The byte-aligned marker uses the last n bytes, which must not include a partly
        // used byte.
        if len >= n && !(len == n && self.used_bits > 0) {
            let (pattern, _) = &self.patterns[0];
            if self.window.iter().skip(len - n).eq(pattern.iter()) {
                return Some(0);
            }
        }
        if len <= n {
            return None;
        }
        (self.used_bits.max(1)..8).find(|&shift| {
            let (pattern, mask) = &self.patterns[shift as usize];
            self.window
                .iter()
                .zip(pattern.iter().zip(mask.iter()))
                .all(|(b, (p, m))| b & m == *p)
        })
    }

    /// Scan the stream until the next sync marker is found and return the location of the
    /// block following it, or `None` if the stream ends first.
    ///
    /// # Errors
    /// [Error::Io] if reading from the stream fails for any reason other than end of stream.
    pub fn scan(&mut self) -> Result<Option<Loc>> {
        let start = self.bytes.offset();
        loop {
            let Some(b) = self.bytes.next()? else {
                trace!(start, end = self.bytes.offset(), "no sync marker before end of stream");
                return Ok(None);
            };
            if self.window.len() > self.asm_len {
                self.window.pop_front();
                self.used_bits = 0;
            }
            self.window.push_back(b);

            let Some(shift) = self.matching_shift() else {
                continue;
            };
            self.window.clear();
            self.used_bits = 0;
            self.shift = shift;
            self.lead = b;
            self.sync_count += 1;
            self.pattern_hits[shift as usize] += 1;

            let loc = if shift == 0 {
                Loc {
                    offset: self.bytes.offset(),
                    bit: 0,
                }
            } else {
                // The block starts inside the byte just read
                Loc {
                    offset: self.bytes.offset() - 1,
                    bit: shift as u8,
                }
            };
            let skipped = loc.offset.saturating_sub(start + self.asm_len);
            if skipped > 0 {
                trace!(skipped, offset = loc.offset, bit = loc.bit, "skipped unsynchronized bytes");
            }
            return Ok(Some(loc));
        }
    }

    /// Fetch the block following the most recently found marker. Returns `None` if the
    /// stream ends before a full block is available.
    ///
    /// # Errors
    /// [Error::Io] if reading from the stream fails.
    pub fn block(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.block_size];
        if !self.bytes.fill(&mut buf)? {
            trace!(
                block_size = self.block_size,
                "partial block at end of stream, discarding"
            );
            return Ok(None);
        }
        if self.shift == 0 {
            return Ok(Some(buf));
        }
        // The last byte read is only partly used by this block, the rest may start the
        // next marker.
        let last = buf.last().copied().unwrap_or(self.lead);
        let block = left_shift(self.lead, &buf, self.shift);
        self.window.clear();
        self.window.push_back(last);
        self.used_bits = self.shift;
        Ok(Some(block))
    }

    /// Number of bytes consumed from the underlying reader.
    pub fn offset(&self) -> usize {
        self.bytes.offset()
    }
}

impl<R> IntoIterator for Synchronizer<R>
where
    R: Read,
{
    type Item = Result<Vec<u8>>;
    type IntoIter = BlockIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        BlockIter {
            scanner: self,
            done: false,
        }
    }
}

/// Iterates over synchronized data in block size defined by the source [Synchronizer].
/// Created using ``Synchronizer::into_iter``.
///
/// The sequence is finite and not restartable. Once the stream is exhausted, or an error
/// has been returned, the iterator only returns `None`. Dropping the iterator drops the
/// underlying reader.
///
/// ## Errors
/// If a full block cannot be constructed the iterator simply ends, i.e., next returns
/// `None`, however, any other error is passed on.
pub struct BlockIter<R>
where
    R: Read,
{
    scanner: Synchronizer<R>,
    done: bool,
}

impl<R> BlockIter<R>
where
    R: Read,
{
    /// Number of sync markers found so far.
    pub fn sync_count(&self) -> usize {
        self.scanner.sync_count
    }

    /// Stop iterating and hand back the underlying reader.
    pub fn into_inner(self) -> R {
        self.scanner.bytes.into_inner()
    }
}

impl<R> Iterator for BlockIter<R>
where
    R: Read,
{
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let zult = match self.scanner.scan() {
            Ok(Some(_)) => self.scanner.block(),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        match zult {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
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

impl<R> std::iter::FusedIterator for BlockIter<R> where R: Read {}

/// Creates an iterator that produces data blocks following each attached sync marker
/// `asm` found in `reader`.
///
/// Data blocks are only produced if there are `block_size` bytes available, i.e.,
/// any partial block at the end of the stream is dropped.
///
/// For more control over the iteration process see [Synchronizer].
pub fn read_synchronized_blocks<R>(reader: R, asm: &[u8], block_size: usize) -> BlockIter<R>
where
    R: Read,
{
    Synchronizer::new(reader, asm, block_size).into_iter()
}

/// Creates an iterator of blocks following the standard CCSDS [ASM].
///
/// # Example
/// ```
/// use spacelink::framing::synchronized_blocks;
///
/// let dat: &[u8] = &[0xff, 0x1a, 0xcf, 0xfc, 0x1d, 0x01, 0x02, 0x1a, 0xcf, 0xfc, 0x1d, 0x03];
/// let blocks: Vec<Vec<u8>> = synchronized_blocks(dat, 2)
///     .filter_map(Result::ok)
///     .collect();
/// assert_eq!(blocks, vec![vec![0x01, 0x02]]);
/// ```
pub fn synchronized_blocks<R>(reader: R, block_size: usize) -> BlockIter<R>
where
    R: Read,
{
    read_synchronized_blocks(reader, &ASM, block_size)
}

/// Open `path` and produce the blocks following each standard CCSDS [ASM] in it. The file
/// is owned by the returned iterator and closed when it is dropped.
///
/// # Errors
/// [Error::Io] if the file cannot be opened.
pub fn synchronized_blocks_from_path<P>(path: P, block_size: usize) -> Result<BlockIter<File>>
where
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    Ok(synchronized_blocks(file, block_size))
}
