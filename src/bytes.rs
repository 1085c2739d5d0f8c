use std::io::{self, BufRead, BufReader, ErrorKind, Read};

/// Bytes provides byte-at-a-time and block reads over a buffered reader while keeping
/// track of the absolute offset into the stream.
pub struct Bytes<R>
where
    R: Read,
{
    reader: BufReader<R>,
    num_read: usize,
}

impl<R> Bytes<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        Bytes {
            reader: BufReader::new(reader),
            num_read: 0,
        }
    }

    /// Read the next byte, or `None` at end of stream.
    pub fn next(&mut self) -> io::Result<Option<u8>> {
        let b = loop {
            match self.reader.fill_buf() {
                Ok([]) => return Ok(None),
                Ok(buf) => break buf[0],
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        self.reader.consume(1);
        self.num_read += 1;
        Ok(Some(b))
    }

    /// Fill `buf` completely. Returns `Ok(false)` if the stream ended before `buf` could
    /// be filled, in which case the contents of `buf` are unspecified.
    pub fn fill(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.num_read += filled;
                    return Ok(false);
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        self.num_read += filled;
        Ok(true)
    }

    /// Number of bytes consumed from the stream so far.
    pub fn offset(&self) -> usize {
        self.num_read
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}
