//! Stored / Deflate / BZip2 streaming engines.
//!
//! Each engine is a pair of adapters over `Read`/`Write` so the codec layer
//! can plug them into whatever pipeline stage (plaintext-to-ciphertext, or
//! straight to the output) needs them, without buffering a whole entry in
//! memory.

use std::io::{self, Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression as Flate2Level;

use crate::error::{Result, SZipError};

/// The method recorded in an entry's LFH/CD fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated,
    BZip2,
    /// Not a real payload compression method: recorded when the actual
    /// method is carried by a WinZip AES extra field instead.
    WinZipAes,
}

impl Method {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Method::Stored),
            8 => Some(Method::Deflated),
            12 => Some(Method::BZip2),
            99 => Some(Method::WinZipAes),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Method::Stored => 0,
            Method::Deflated => 8,
            Method::BZip2 => 12,
            Method::WinZipAes => 99,
        }
    }
}

/// Deflate compression level, §3 ("CompressionLevel").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    SuperFast,
    Fast,
    Normal,
    Maximum,
}

impl CompressionLevel {
    pub fn from_u32(level: u32) -> Result<Self> {
        match level {
            1 => Ok(CompressionLevel::SuperFast),
            3 => Ok(CompressionLevel::Fast),
            5 => Ok(CompressionLevel::Normal),
            9 => Ok(CompressionLevel::Maximum),
            _ => Err(SZipError::InvalidArgument(format!(
                "compression level must be 1, 3, 5, or 9, got {level}"
            ))),
        }
    }

    /// Maps to the GPBF bits 1-2 Deflate level hint, spec.md §3/§4.7.
    pub fn gpbf_bits(self) -> u16 {
        match self {
            CompressionLevel::Maximum => 0b010,
            CompressionLevel::Fast => 0b100,
            CompressionLevel::SuperFast => 0b110,
            CompressionLevel::Normal => 0b000,
        }
    }

    fn flate2_level(self) -> Flate2Level {
        match self {
            CompressionLevel::SuperFast => Flate2Level::new(1),
            CompressionLevel::Fast => Flate2Level::new(3),
            CompressionLevel::Normal => Flate2Level::new(6),
            CompressionLevel::Maximum => Flate2Level::new(9),
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::Normal
    }
}

/// Compresses `plaintext` with `method`, returning the compressed bytes.
pub fn compress(method: Method, level: CompressionLevel, plaintext: &[u8]) -> Result<Vec<u8>> {
    match method {
        Method::Stored => Ok(plaintext.to_vec()),
        Method::Deflated => {
            let mut encoder = DeflateEncoder::new(Vec::new(), level.flate2_level());
            encoder.write_all(plaintext)?;
            Ok(encoder.finish()?)
        }
        Method::BZip2 => {
            let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::new(9));
            encoder.write_all(plaintext)?;
            Ok(encoder.finish()?)
        }
        Method::WinZipAes => Err(SZipError::UnsupportedMethod(
            "WinZipAes is an encryption wrapper, not a payload compression method".into(),
        )),
    }
}

/// Decompresses `compressed` with `method`, returning the plaintext bytes.
pub fn decompress(method: Method, compressed: &[u8], uncompressed_size: u64) -> Result<Vec<u8>> {
    match method {
        Method::Stored => Ok(compressed.to_vec()),
        Method::Deflated => {
            let mut decoder = DeflateDecoder::new(compressed);
            let mut out = Vec::with_capacity(uncompressed_size as usize);
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        Method::BZip2 => {
            let mut decoder = BzDecoder::new(compressed);
            let mut out = Vec::with_capacity(uncompressed_size as usize);
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        Method::WinZipAes => Err(SZipError::UnsupportedMethod(
            "WinZipAes is not directly decompressible; decrypt first to get the actual method".into(),
        )),
    }
}

/// Wraps a reader with the decompressor for `method`, for streaming reads.
pub fn decompressing_reader<'a, R: Read + 'a>(
    method: Method,
    reader: R,
) -> Result<Box<dyn Read + 'a>> {
    match method {
        Method::Stored => Ok(Box::new(reader)),
        Method::Deflated => Ok(Box::new(DeflateDecoder::new(reader))),
        Method::BZip2 => Ok(Box::new(BzDecoder::new(reader))),
        Method::WinZipAes => Err(SZipError::UnsupportedMethod(
            "WinZipAes is not directly decompressible; decrypt first to get the actual method".into(),
        )),
    }
}

/// A `Write` sink that counts bytes and computes a CRC-32 of everything
/// passed through before forwarding to the inner compressor.
pub struct CrcWriter<W: Write> {
    inner: W,
    crc: crc32fast::Hasher,
    count: u64,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            crc: crc32fast::Hasher::new(),
            count: 0,
        }
    }

    pub fn crc32(&self) -> u32 {
        self.crc.clone().finalize()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.crc.update(buf);
        self.count += buf.len() as u64;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_round_trip() {
        let data = b"no compression here";
        let compressed = compress(Method::Stored, CompressionLevel::Normal, data).unwrap();
        assert_eq!(compressed, data);
        let plain = decompress(Method::Stored, &compressed, data.len() as u64).unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn deflate_round_trip_at_every_level() {
        let data = vec![b'A'; 100_000];
        for level in [
            CompressionLevel::SuperFast,
            CompressionLevel::Fast,
            CompressionLevel::Normal,
            CompressionLevel::Maximum,
        ] {
            let compressed = compress(Method::Deflated, level, &data).unwrap();
            assert!(compressed.len() < data.len());
            let plain = decompress(Method::Deflated, &compressed, data.len() as u64).unwrap();
            assert_eq!(plain, data);
        }
    }

    #[test]
    fn bzip2_round_trip() {
        let data = vec![b'Z'; 50_000];
        let compressed = compress(Method::BZip2, CompressionLevel::Normal, &data).unwrap();
        let plain = decompress(Method::BZip2, &compressed, data.len() as u64).unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn empty_entry_round_trips_through_every_method() {
        for method in [Method::Stored, Method::Deflated, Method::BZip2] {
            let compressed = compress(method, CompressionLevel::Normal, &[]).unwrap();
            let plain = decompress(method, &compressed, 0).unwrap();
            assert!(plain.is_empty());
        }
    }
}
