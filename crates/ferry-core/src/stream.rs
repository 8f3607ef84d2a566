//! Byte-stream abstractions consumed by the transfer engines.
//!
//! A sender pulls from a [`TransferReader`]; a receiver pushes into a
//! [`TransferWriter`]. Both are deliberately small: the engines only need
//! sequential access, a capacity query on the sink, and optional
//! repositioning for out-of-order recovery.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Source of transfer payload bytes.
pub trait TransferReader: Send {
    /// Read bytes into `buf`, returning how many were read.
    ///
    /// Implementations must fill `buf` completely unless the end of the
    /// source has been reached; a short (or zero-length) read marks the end
    /// of the blob. This is what lets the engine tag the final data chunk.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reposition the source to an absolute byte offset.
    ///
    /// Non-seekable sources keep the default, which reports the capability
    /// gap; the engine translates it into an `Unimplemented` transfer status.
    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(Error::NotSeekable)
    }
}

/// Sink for transfer payload bytes.
pub trait TransferWriter: Send {
    /// Append all of `buf` to the sink.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Bytes the sink can still accept. Bounds the flow-control window.
    fn remaining_capacity(&self) -> u64;

    /// Reposition the sink to an absolute byte offset.
    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(Error::NotSeekable)
    }
}

/// Seekable in-memory reader over an immutable byte blob.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    data: Bytes,
    pos: usize,
}

impl MemoryReader {
    /// Create a reader over `data`, positioned at the start.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }
}

impl TransferReader for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.data.len().saturating_sub(self.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.data.len() as u64 {
            return Err(Error::OutOfSpace {
                needed: offset,
                available: self.data.len() as u64,
            });
        }
        self.pos = offset as usize;
        Ok(())
    }
}

/// Seekable fixed-capacity in-memory writer.
#[derive(Debug)]
pub struct MemoryWriter {
    data: Vec<u8>,
    capacity: usize,
    pos: usize,
}

impl MemoryWriter {
    /// Create a writer that accepts up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
            pos: 0,
        }
    }

    /// The bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.data
    }

    /// Total bytes accepted.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl TransferWriter for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.capacity {
            return Err(Error::OutOfSpace {
                needed: buf.len() as u64,
                available: (self.capacity - self.pos) as u64,
            });
        }
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn remaining_capacity(&self) -> u64 {
        (self.capacity - self.pos) as u64
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.capacity as u64 {
            return Err(Error::OutOfSpace {
                needed: offset,
                available: self.capacity as u64,
            });
        }
        self.pos = offset as usize;
        Ok(())
    }
}

/// Wrapper that hides a reader's seek capability.
///
/// Used where a source genuinely cannot be repositioned (pipes, live feeds)
/// or to exercise the non-seekable recovery path.
pub struct NonSeekableReader<R>(pub R);

impl<R: TransferReader> TransferReader for NonSeekableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.0.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reader_reads_through() {
        let mut reader = MemoryReader::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn memory_reader_seeks() {
        let mut reader = MemoryReader::new(vec![0, 1, 2, 3]);
        reader.seek(2).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[2, 3]);
        assert!(reader.seek(5).is_err());
    }

    #[test]
    fn memory_writer_tracks_capacity() {
        let mut writer = MemoryWriter::with_capacity(8);
        assert_eq!(writer.remaining_capacity(), 8);
        writer.write(&[1, 2, 3]).unwrap();
        assert_eq!(writer.remaining_capacity(), 5);
        assert_eq!(writer.written(), &[1, 2, 3]);
    }

    #[test]
    fn memory_writer_rejects_overflow() {
        let mut writer = MemoryWriter::with_capacity(4);
        writer.write(&[0; 3]).unwrap();
        let err = writer.write(&[0; 2]).unwrap_err();
        assert!(matches!(err, Error::OutOfSpace { .. }));
        // Nothing past the accepted prefix landed.
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn memory_writer_seek_overwrites() {
        let mut writer = MemoryWriter::with_capacity(8);
        writer.write(&[1, 2, 3, 4]).unwrap();
        writer.seek(2).unwrap();
        writer.write(&[9, 9]).unwrap();
        assert_eq!(writer.written(), &[1, 2, 9, 9]);
        assert_eq!(writer.remaining_capacity(), 4);
    }

    #[test]
    fn non_seekable_wrapper_blocks_seek() {
        let mut reader = NonSeekableReader(MemoryReader::new(vec![1, 2, 3]));
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert!(matches!(reader.seek(0), Err(Error::NotSeekable)));
    }
}
