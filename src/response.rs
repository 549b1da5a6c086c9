//! Response framing: skip the header block, then take one read of body.
//!
//! The header block is not parsed. Its end is detected by a run of four
//! consecutive CR/LF bytes in any order; any other byte restarts the run.

use tracing::trace;

use crate::error::{ClientError, ProtocolError, TlsError};

/// Terminator bytes in a row that end the header block.
pub const TERMINATOR_RUN: u8 = 4;
/// Header bytes consumed before giving up on finding the terminator.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;
const CHUNK: usize = 512;

/// Source of decrypted response bytes.
pub trait RecordRead {
    /// One read; may be short, 0 means the peer closed.
    fn read_record(&mut self, buf: &mut [u8]) -> Result<usize, TlsError>;
}

/// Counter + reset rule for the end-of-headers heuristic.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminatorRun {
    count: u8,
}

impl TerminatorRun {
    /// Feed one byte; true once the run is complete.
    pub fn feed(&mut self, byte: u8) -> bool {
        if byte == b'\r' || byte == b'\n' {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.count >= TERMINATOR_RUN
    }
}

pub struct ResponseReader<'a, S: RecordRead> {
    source: &'a mut S,
    buf: [u8; CHUNK],
    pos: usize,
    filled: usize,
    header_budget: usize,
}

impl<'a, S: RecordRead> ResponseReader<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            buf: [0; CHUNK],
            pos: 0,
            filled: 0,
            header_budget: MAX_HEADER_BYTES,
        }
    }

    #[cfg(test)]
    pub fn with_header_budget(mut self, budget: usize) -> Self {
        self.header_budget = budget;
        self
    }

    /// Skip the header block and take one read of body into `body`.
    pub fn read_body(mut self, body: &mut [u8]) -> Result<usize, ClientError> {
        let consumed = self.skip_headers()?;
        trace!(consumed, "header block skipped");
        self.read_once(body)
    }

    /// Consume bytes until the terminator run completes. Returns the number
    /// of header bytes consumed.
    pub fn skip_headers(&mut self) -> Result<usize, ClientError> {
        let mut run = TerminatorRun::default();
        let mut consumed = 0;
        loop {
            if consumed >= self.header_budget {
                return Err(ProtocolError::HeaderTerminatorNotFound { consumed }.into());
            }
            let Some(byte) = self.next_byte()? else {
                return Err(ProtocolError::HeaderTerminatorNotFound { consumed }.into());
            };
            consumed += 1;
            if run.feed(byte) {
                return Ok(consumed);
            }
        }
    }

    /// Buffered bytes first; otherwise exactly one read of the source.
    fn read_once(&mut self, out: &mut [u8]) -> Result<usize, ClientError> {
        if self.pos < self.filled {
            let n = (self.filled - self.pos).min(out.len());
            out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        Ok(self.source.read_record(out)?)
    }

    fn next_byte(&mut self) -> Result<Option<u8>, TlsError> {
        if self.pos == self.filled {
            self.filled = self.source.read_record(&mut self.buf)?;
            self.pos = 0;
            if self.filled == 0 {
                return Ok(None);
            }
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }
}
