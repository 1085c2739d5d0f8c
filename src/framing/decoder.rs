use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{bounded, unbounded, Receiver};
use serde::Serialize;
use tracing::{debug, span, trace, warn, Level};
use typed_builder::TypedBuilder;

use super::{missing_frames, ChannelKey, DefaultDerandomizer, Derandomizer, Frame, VCDUHeader};
use crate::config::Framing;
use crate::prelude::*;

/// Result of the external error-correction stage for a single frame.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integrity {
    /// Data did not require correction.
    Ok,
    /// Data was successfully corrected.
    Corrected,
    /// Data had errors that could not be corrected. The frame contents, including the
    /// header, cannot be trusted.
    Uncorrectable,
    /// No correction was attempted.
    NotPerformed,
}

/// Error correction applied to a derandomized block before its header is parsed.
///
/// Implementations receive the complete block, including any parity bytes, and return the
/// frame bytes, i.e., with parity removed.
pub trait FrameCorrector: Send + Sync {
    /// # Errors
    /// Implementation specific. An error fails the frame, not the stream.
    fn correct(&self, block: &[u8]) -> Result<(Integrity, Vec<u8>)>;
}

/// A [Frame] with additional decode information, i.e., the number of frames missing on its
/// virtual channel just before it and the result of error correction.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame: Frame,
    pub missing: u32,
    pub integrity: Integrity,
}

impl DecodedFrame {
    #[must_use]
    pub fn key(&self) -> ChannelKey {
        self.frame.header.key()
    }
}

/// Decodes synchronized blocks into [DecodedFrame]s.
///
/// Blocks are derandomized (if `pseudo_randomized`), handed to the `corrector` (if any) and
/// parsed. Without a corrector blocks are truncated to `frame_length`, if set, so any parity
/// bytes are not treated as frame data.
///
/// # Examples
/// ```
/// use spacelink::framing::FrameDecoder;
///
/// let blocks: Vec<Vec<u8>> = vec![vec![0u8; 1020]];
/// let frames: Vec<_> = FrameDecoder::builder()
///     .pseudo_randomized(false)
///     .frame_length(892)
///     .build()
///     .decode(blocks.into_iter().map(Ok))
///     .filter_map(Result::ok)
///     .collect();
/// assert_eq!(frames[0].frame.data.len(), 892);
/// ```
#[derive(TypedBuilder, Clone)]
pub struct FrameDecoder {
    #[builder(default = true)]
    pseudo_randomized: bool,
    #[builder(default, setter(strip_option))]
    corrector: Option<Arc<dyn FrameCorrector>>,
    #[builder(default, setter(strip_option))]
    frame_length: Option<usize>,
    /// Number of correction threads for [FrameDecoder::decode_parallel]; rayon decides if
    /// not set.
    #[builder(default, setter(strip_option))]
    num_threads: Option<usize>,
    /// Number of blocks [FrameDecoder::decode_parallel] may have in flight.
    #[builder(default = FrameDecoder::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FrameDecoder {
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;

    /// Decoder configured for `framing`, without error correction.
    #[must_use]
    pub fn from_framing(framing: &Framing) -> Self {
        Self::builder()
            .pseudo_randomized(framing.pseudo_randomized)
            .frame_length(framing.frame_length)
            .build()
    }

    /// Use `corrector` for all non-fill frames.
    #[must_use]
    pub fn with_corrector(mut self, corrector: Arc<dyn FrameCorrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    fn block_decoder(&self) -> BlockDecoder {
        BlockDecoder {
            derandomizer: if self.pseudo_randomized {
                Some(Arc::new(DefaultDerandomizer))
            } else {
                None
            },
            corrector: self.corrector.clone(),
            frame_length: self.frame_length,
        }
    }

    /// Decode `blocks` on the current thread as they are pulled from the returned iterator.
    ///
    /// An [Error::Io] from `blocks` is passed on and ends iteration. Any other error only
    /// fails the block it occurred for.
    pub fn decode<B>(&self, blocks: B) -> FrameIter<B::IntoIter>
    where
        B: IntoIterator<Item = Result<Vec<u8>>>,
    {
        FrameIter {
            blocks: blocks.into_iter(),
            decoder: self.block_decoder(),
            sequencer: Sequencer::default(),
            done: false,
        }
    }

    /// Decode `blocks` using a background thread that performs derandomization and
    /// correction on a thread pool. Frames are provided in the same order as `blocks`.
    ///
    /// Dropping the returned iterator stops the background thread after its next block.
    ///
    /// # Errors
    /// [Error::Io] if the background thread cannot be started. Errors constructing the
    /// thread pool are provided as the first item of the returned iterator.
    pub fn decode_parallel<B>(self, blocks: B) -> Result<ParallelFrameIter>
    where
        B: IntoIterator<Item = Result<Vec<u8>>>,
        B::IntoIter: Send + 'static,
    {
        let blocks = blocks.into_iter();
        let (jobs_tx, jobs_rx) = bounded(self.buffer_size.max(1));
        let decoder = Arc::new(self.block_decoder());
        let num_threads = self.num_threads;

        let handle = thread::Builder::new()
            .name("frame_decoder".into())
            .spawn(move || {
                let pool = {
                    let mut pool = rayon::ThreadPoolBuilder::new();
                    if let Some(num) = num_threads {
                        pool = pool.num_threads(num);
                    }
                    pool
                }
                .build();
                let pool = match pool {
                    Ok(pool) => pool,
                    Err(err) => {
                        let (future_tx, future_rx) = unbounded();
                        let _ = future_tx.send(Err(Error::from(err)));
                        let _ = jobs_tx.send(future_rx);
                        return;
                    }
                };

                for (idx, block) in blocks.enumerate() {
                    let (future_tx, future_rx) = unbounded();
                    let fatal = match block {
                        Ok(block) => {
                            let decoder = decoder.clone();
                            // spawn_fifo makes sure the frame order is maintained
                            pool.spawn_fifo(move || {
                                if future_tx.send(decoder.decode(block)).is_err() {
                                    debug!(block_idx = idx, "failed to send frame");
                                }
                            });
                            false
                        }
                        Err(err) => {
                            let _ = future_tx.send(Err(err));
                            true
                        }
                    };
                    if jobs_tx.send(future_rx).is_err() {
                        debug!(block_idx = idx, "frame receiver dropped, stopping");
                        return;
                    }
                    if fatal {
                        return;
                    }
                }
            })?;

        Ok(ParallelFrameIter {
            jobs: jobs_rx,
            handle: Some(handle),
            sequencer: Sequencer::default(),
            done: false,
        })
    }
}

/// Per-block work shared by the sequential and parallel decoders.
#[derive(Clone)]
struct BlockDecoder {
    derandomizer: Option<Arc<dyn Derandomizer>>,
    corrector: Option<Arc<dyn FrameCorrector>>,
    frame_length: Option<usize>,
}

impl BlockDecoder {
    fn decode(&self, block: Vec<u8>) -> Result<DecodedFrame> {
        let block = match &self.derandomizer {
            Some(pn) => pn.derandomize(&block),
            None => block,
        };
        let header = VCDUHeader::decode(&block)?;

        // Fill frames carry no data worth correcting
        let (integrity, mut data) = match &self.corrector {
            Some(corrector) if header.vcid != VCDUHeader::FILL => corrector.correct(&block)?,
            _ => (Integrity::NotPerformed, block),
        };
        if integrity == Integrity::NotPerformed {
            if let Some(len) = self.frame_length {
                data.truncate(len);
            }
        }

        Ok(DecodedFrame {
            frame: Frame::decode(data)?,
            missing: 0,
            integrity,
        })
    }
}

/// Tracks the last frame counter for each virtual channel.
#[derive(Default)]
struct Sequencer {
    last: HashMap<ChannelKey, u32>,
}

impl Sequencer {
    fn track(&mut self, decoded: &mut DecodedFrame) {
        let header = &decoded.frame.header;
        let (key, counter) = (header.key(), header.counter);
        let span = span!(Level::TRACE, "frame", scid = key.scid, vcid = key.vcid);
        let _guard = span.enter();

        // Only compute missing for non-fill frames
        if key.vcid == VCDUHeader::FILL {
            trace!("fill frame");
            decoded.missing = 0;
            return;
        }
        decoded.missing = match self.last.insert(key, counter) {
            Some(last) => missing_frames(counter, last),
            None => 0,
        };
        if decoded.missing > 0 {
            debug!(
                scid = key.scid,
                vcid = key.vcid,
                missing = decoded.missing,
                counter,
                "frame gap"
            );
        }
    }
}

/// Sequential frame decode iterator. Created with [FrameDecoder::decode].
pub struct FrameIter<B> {
    blocks: B,
    decoder: BlockDecoder,
    sequencer: Sequencer,
    done: bool,
}

impl<B> Iterator for FrameIter<B>
where
    B: Iterator<Item = Result<Vec<u8>>>,
{
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let zult = match self.blocks.next()? {
            Ok(block) => self.decoder.decode(block),
            Err(err) => {
                if matches!(err, Error::Io(_)) {
                    self.done = true;
                }
                return Some(Err(err));
            }
        };
        Some(zult.map(|mut decoded| {
            self.sequencer.track(&mut decoded);
            decoded
        }))
    }
}

/// Frame decode iterator backed by a background thread. Created with
/// [FrameDecoder::decode_parallel].
pub struct ParallelFrameIter {
    jobs: Receiver<Receiver<Result<DecodedFrame>>>,
    handle: Option<JoinHandle<()>>,
    sequencer: Sequencer,
    done: bool,
}

impl ParallelFrameIter {
    fn finish(&mut self) {
        self.done = true;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("frame decoder thread panicked");
            }
        }
    }
}

impl Iterator for ParallelFrameIter {
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            // recv blocks current thread until data is available.
            let Ok(future) = self.jobs.recv() else {
                self.finish();
                return None;
            };
            match future.recv() {
                Ok(Ok(mut decoded)) => {
                    self.sequencer.track(&mut decoded);
                    return Some(Ok(decoded));
                }
                Ok(Err(err)) => {
                    if matches!(err, Error::Io(_) | Error::ThreadPool(_)) {
                        self.finish();
                    }
                    return Some(Err(err));
                }
                Err(_) => {
                    warn!("frame decode job exited without a result");
                }
            }
        }
    }
}
