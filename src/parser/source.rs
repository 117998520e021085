//! Buffered random-access byte source
//!
//! Wraps a seekable reader with a sliding read buffer. All position
//! queries account for buffered bytes that have not been consumed yet,
//! and every re-anchor of the cursor resets the buffer.

use super::ParseResult;
use std::io::{Read, Seek, SeekFrom};

const CHUNK: usize = 4096;

/// A buffered cursor over a seekable byte stream.
///
/// Components that move the cursor must hold exclusive access for the
/// duration of a logical read; the parser wraps the source in a mutex.
pub struct ByteSource<R: Read + Seek> {
    inner: R,
    size: u64,
    /// Absolute offset of `buf[0]` in the underlying stream.
    buf_offset: u64,
    buf: Vec<u8>,
    /// Next unread index into `buf`.
    pos: usize,
}

impl<R: Read + Seek> ByteSource<R> {
    pub fn new(mut inner: R) -> ParseResult<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            size,
            buf_offset: 0,
            buf: Vec::new(),
            pos: 0,
        })
    }

    /// Total size of the underlying stream in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current absolute read position, accounting for buffered bytes.
    pub fn position(&self) -> u64 {
        self.buf_offset + self.pos as u64
    }

    /// Re-anchor the cursor at an absolute offset. Clears the buffer.
    pub fn seek_to(&mut self, offset: u64) -> ParseResult<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.buf.clear();
        self.pos = 0;
        self.buf_offset = offset;
        Ok(())
    }

    /// Re-anchor the cursor `back` bytes before the end of the stream
    /// (clamped to the start). Returns the resulting absolute offset.
    pub fn seek_from_end(&mut self, back: u64) -> ParseResult<u64> {
        let offset = self.size.saturating_sub(back);
        self.seek_to(offset)?;
        Ok(offset)
    }

    /// Number of buffered, unconsumed bytes.
    fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Grow the buffer until at least `n` unconsumed bytes are available
    /// or the stream is exhausted.
    fn fill(&mut self, n: usize) -> ParseResult<()> {
        if self.available() >= n {
            return Ok(());
        }
        // Drop consumed bytes before extending.
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.buf_offset += self.pos as u64;
            self.pos = 0;
        }
        while self.buf.len() < n {
            let want = CHUNK.max(n - self.buf.len());
            let old_len = self.buf.len();
            self.buf.resize(old_len + want, 0);
            let got = self.inner.read(&mut self.buf[old_len..])?;
            self.buf.truncate(old_len + got);
            if got == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Look at up to `n` upcoming bytes without consuming them. The
    /// returned slice is shorter than `n` only near end of stream.
    pub fn peek(&mut self, n: usize) -> ParseResult<&[u8]> {
        self.fill(n)?;
        let end = (self.pos + n).min(self.buf.len());
        Ok(&self.buf[self.pos..end])
    }

    /// Look at the next byte without consuming it.
    pub fn peek_byte(&mut self) -> ParseResult<Option<u8>> {
        self.fill(1)?;
        Ok(self.buf.get(self.pos).copied())
    }

    /// Consume and return the next byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> ParseResult<Option<u8>> {
        self.fill(1)?;
        match self.buf.get(self.pos).copied() {
            Some(b) => {
                self.pos += 1;
                Ok(Some(b))
            }
            None => Ok(None),
        }
    }

    /// Step back over the most recently consumed byte. Valid only
    /// directly after a successful `read_byte`.
    pub fn unread_byte(&mut self) {
        if self.pos > 0 {
            self.pos -= 1;
        }
    }

    /// Consume up to `n` bytes; returns how many were skipped.
    pub fn discard(&mut self, n: usize) -> ParseResult<usize> {
        self.fill(n)?;
        let skipped = n.min(self.available());
        self.pos += skipped;
        Ok(skipped)
    }

    /// Read up to `n` bytes, fewer only at end of stream.
    pub fn read_up_to(&mut self, n: usize) -> ParseResult<Vec<u8>> {
        self.fill(n)?;
        let take = n.min(self.available());
        let out = self.buf[self.pos..self.pos + take].to_vec();
        self.pos += take;
        Ok(out)
    }

    /// Read exactly `n` bytes or fail with an I/O error.
    pub fn read_exact_vec(&mut self, n: usize) -> ParseResult<Vec<u8>> {
        let out = self.read_up_to(n)?;
        if out.len() < n {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short read: wanted {} bytes, got {}", n, out.len()),
            )
            .into());
        }
        Ok(out)
    }

    /// Read the remainder of the stream from the current position.
    pub fn read_to_end_vec(&mut self) -> ParseResult<Vec<u8>> {
        let remaining = self.size.saturating_sub(self.position()) as usize;
        self.read_up_to(remaining)
    }
}
