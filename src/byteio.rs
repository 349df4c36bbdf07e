//! Cursored little-endian read/write over a seekable byte source/sink.
//!
//! `ByteIO` is the leaf dependency every other module sits on: the codec
//! reader and writer never touch `std::fs::File` or `std::io::Cursor`
//! directly, they go through this trait so the same parsing/serialization
//! code runs over an on-disk archive or an in-memory one.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// A seekable byte source and/or sink, little-endian throughout.
///
/// Implemented for anything that is `Read + Write + Seek` (files,
/// `Cursor<Vec<u8>>`, `Cursor<&[u8]>` for read-only sources).
pub trait ByteIO {
    /// Read exactly `buf.len()` bytes, failing with `Io` on a short read.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf`.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Seek to an absolute or relative position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Total size of the underlying byte source in bytes.
    fn size(&mut self) -> Result<u64>;

    /// Current cursor position.
    fn tell(&mut self) -> Result<u64>;

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_all(&[v])
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())
    }
}

impl<T: Read + Write + Seek> ByteIO for T {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        Read::read_exact(self, buf)?;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        Write::write_all(self, buf)?;
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(Seek::seek(self, pos)?)
    }

    fn size(&mut self) -> Result<u64> {
        let cur = Seek::stream_position(self)?;
        let end = Seek::seek(self, SeekFrom::End(0))?;
        Seek::seek(self, SeekFrom::Start(cur))?;
        Ok(end)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(Seek::stream_position(self)?)
    }
}
