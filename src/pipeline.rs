//! End-to-end decoding of a CADU byte stream into packets.
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::config::Framing;
use crate::framing::{
    decode_framed_packets, read_synchronized_blocks, Event, FrameCorrector, FrameDecoder,
};
use crate::prelude::*;
use crate::spacepacket::{Apid, TimecodeDecoder};

/// Synchronize, derandomize, decode and reassemble a CADU stream as described by a
/// [Framing].
///
/// # Example
/// ```
/// use spacelink::config::{Framing, SNPP};
/// use spacelink::pipeline::Pipeline;
///
/// let framing = Framing::for_spacecraft(SNPP).unwrap();
/// let dat: &[u8] = &[];
/// let events: Vec<_> = Pipeline::new(framing).unwrap().decode(dat).collect();
/// assert!(events.is_empty());
/// ```
#[derive(Clone)]
pub struct Pipeline {
    framing: Framing,
    decoder: FrameDecoder,
    timecodes: Option<TimecodeDecoder>,
    valid_apids: Vec<Apid>,
}

impl Pipeline {
    /// # Errors
    /// [Error::Config] if `framing` is not valid.
    pub fn new(framing: Framing) -> Result<Self> {
        framing.validate()?;
        let decoder = FrameDecoder::from_framing(&framing);
        Ok(Pipeline {
            framing,
            decoder,
            timecodes: None,
            valid_apids: Vec::new(),
        })
    }

    /// Replace the frame decoder created from the [Framing].
    #[must_use]
    pub fn with_decoder(mut self, decoder: FrameDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn with_corrector(mut self, corrector: Arc<dyn FrameCorrector>) -> Self {
        self.decoder = self.decoder.with_corrector(corrector);
        self
    }

    /// Stamp packets with timecodes decoded by `timecodes`. Packets whose timecode fails
    /// to decode are still provided, without a timecode.
    #[must_use]
    pub fn with_timecodes(mut self, timecodes: TimecodeDecoder) -> Self {
        self.timecodes = Some(timecodes);
        self
    }

    /// Drop packet data with APIDs other than `apids`. See
    /// [Reassembler::with_valid_apids](crate::framing::Reassembler::with_valid_apids).
    #[must_use]
    pub fn with_valid_apids(mut self, apids: &[Apid]) -> Self {
        self.valid_apids = apids.to_vec();
        self
    }

    /// Decode `reader` on the current thread.
    pub fn decode<R>(self, reader: R) -> impl Iterator<Item = Result<Event>>
    where
        R: Read,
    {
        let blocks = read_synchronized_blocks(
            reader,
            &self.framing.asm,
            self.framing.block_length(),
        );
        let frames = self.decoder.decode(blocks);
        let timecodes = self.timecodes;
        decode_framed_packets(
            frames,
            self.framing.izone_length,
            self.framing.trailer_length,
        )
        .with_valid_apids(self.valid_apids)
        .map(move |zult| stamp(timecodes.as_ref(), zult))
    }

    /// Decode `reader`, performing frame decoding on a thread pool. See
    /// [FrameDecoder::decode_parallel].
    ///
    /// # Errors
    /// [Error::Io] if the decode thread cannot be started.
    pub fn decode_parallel<R>(self, reader: R) -> Result<impl Iterator<Item = Result<Event>>>
    where
        R: Read + Send + 'static,
    {
        let blocks = read_synchronized_blocks(
            reader,
            &self.framing.asm,
            self.framing.block_length(),
        );
        let frames = self.decoder.decode_parallel(blocks)?;
        let timecodes = self.timecodes;
        Ok(decode_framed_packets(
            frames,
            self.framing.izone_length,
            self.framing.trailer_length,
        )
        .with_valid_apids(self.valid_apids)
        .map(move |zult| stamp(timecodes.as_ref(), zult)))
    }

    /// Open and decode the file at `path`. The file is closed when the returned iterator is
    /// dropped.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be opened.
    pub fn decode_path<P>(self, path: P) -> Result<impl Iterator<Item = Result<Event>>>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        Ok(self.decode(file))
    }
}

fn stamp(timecodes: Option<&TimecodeDecoder>, zult: Result<Event>) -> Result<Event> {
    match (timecodes, zult) {
        (Some(timecodes), Ok(Event::Packet(mut packet))) => {
            if let Err(err) = timecodes.stamp(&mut packet) {
                warn!(
                    apid = packet.packet.header.apid,
                    %err,
                    "failed to decode packet timecode"
                );
            }
            Ok(Event::Packet(packet))
        }
        (_, zult) => zult,
    }
}

/// Decode a CADU stream from `reader` using `framing`.
///
/// # Errors
/// [Error::Config] if `framing` is not valid.
pub fn decode<R>(reader: R, framing: &Framing) -> Result<impl Iterator<Item = Result<Event>>>
where
    R: Read,
{
    Ok(Pipeline::new(framing.clone())?.decode(reader))
}
