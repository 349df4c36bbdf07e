//! Locates the EOCD (and ZIP64 EOCD, if present), mounts the central
//! directory into source entries, and decodes a single entry's payload on
//! demand (spec.md §4.5).

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::rc::Rc;

use tracing::debug;

use crate::byteio::ByteIO;
use crate::codec::{
    CD_FIXED_SIZE, EOCD_FIXED_SIZE, GPBF_UTF8, SIG_CENTRAL_DIRECTORY, SIG_EOCD,
    SIG_LOCAL_FILE_HEADER, SIG_ZIP64_EOCD, SIG_ZIP64_EOCD_LOCATOR, ZIP64_EOCD_LOCATOR_SIZE,
};
use crate::compression::{self, Method};
use crate::container::Container;
use crate::encryption::{WinZipAesDecryptor, ZipCryptoDecryptor};
use crate::entry::{Data, EncryptionMethod, SourceRange, ZipEntry};
use crate::error::{Result, SZipError};
use crate::extra_field::{ExtraFieldSet, Zip64Sentinels};

/// Mounts an archive read through `reader` into a `Container`. The reader
/// is retained (shared, reference-counted) by every entry's
/// [`SourceRange`] so payloads can be decoded lazily.
pub fn open<R: ByteIO + 'static>(reader: R) -> Result<Container> {
    let shared: Rc<RefCell<dyn ByteIO>> = Rc::new(RefCell::new(reader));
    mount(shared)
}

pub(crate) fn mount(reader: Rc<RefCell<dyn ByteIO>>) -> Result<Container> {
    let mut io = reader.borrow_mut();
    let size = io.size()?;
    let eocd_offset = find_eocd(&mut *io, size)?;
    io.seek(SeekFrom::Start(eocd_offset))?;

    let sig = io.read_u32()?;
    if sig != SIG_EOCD {
        return Err(SZipError::malformed_header("EOCD signature mismatch"));
    }
    let disk_number = io.read_u16()?;
    let cd_start_disk = io.read_u16()?;
    let entries_this_disk = io.read_u16()?;
    let total_entries_16 = io.read_u16()?;
    let cd_size_32 = io.read_u32()?;
    let cd_offset_32 = io.read_u32()?;
    let comment_len = io.read_u16()? as usize;
    let comment_bytes = io.read_vec(comment_len)?;
    let comment = String::from_utf8_lossy(&comment_bytes).into_owned();

    if disk_number != 0 || cd_start_disk != 0 || entries_this_disk != total_entries_16 {
        return Err(SZipError::SpanningUnsupported);
    }

    let mut total_entries = total_entries_16 as u64;
    let mut cd_size = cd_size_32 as u64;
    let mut cd_offset = cd_offset_32 as u64;

    let needs_zip64 = total_entries_16 == 0xFFFF || cd_size_32 == 0xFFFF_FFFF || cd_offset_32 == 0xFFFF_FFFF;
    if needs_zip64 && eocd_offset >= ZIP64_EOCD_LOCATOR_SIZE {
        io.seek(SeekFrom::Start(eocd_offset - ZIP64_EOCD_LOCATOR_SIZE))?;
        if io.read_u32()? == SIG_ZIP64_EOCD_LOCATOR {
            let _disk_with_zip64_eocd = io.read_u32()?;
            let zip64_eocd_offset = io.read_u64()?;
            let _total_disks = io.read_u32()?;

            io.seek(SeekFrom::Start(zip64_eocd_offset))?;
            if io.read_u32()? != SIG_ZIP64_EOCD {
                return Err(SZipError::malformed_header("ZIP64 EOCD signature mismatch"));
            }
            let _record_size = io.read_u64()?;
            let _version_made_by = io.read_u16()?;
            let _version_needed = io.read_u16()?;
            let zip64_disk_number = io.read_u32()?;
            let zip64_cd_start_disk = io.read_u32()?;
            let _entries_this_disk = io.read_u64()?;
            total_entries = io.read_u64()?;
            cd_size = io.read_u64()?;
            cd_offset = io.read_u64()?;
            if zip64_disk_number != 0 || zip64_cd_start_disk != 0 {
                return Err(SZipError::SpanningUnsupported);
            }
        }
    }

    // Self-extracting archives prepend arbitrary bytes before the first
    // LFH; absorb the gap between where the CD claims to start and where
    // it actually sits relative to the EOCD we just found.
    let preamble = eocd_offset.saturating_sub(cd_offset + cd_size);
    let adjusted_cd_offset = cd_offset + preamble;

    io.seek(SeekFrom::Start(adjusted_cd_offset))?;

    let mut order = Vec::with_capacity(total_entries as usize);
    let mut entries = HashMap::with_capacity(total_entries as usize);

    for _ in 0..total_entries {
        let entry = read_cd_record(&mut *io, &reader, preamble)?;
        let name = entry.name().to_string();
        order.push(name.clone());
        entries.insert(name, entry);
    }

    drop(io);
    debug!(count = entries.len(), "mounted central directory");
    Ok(Container::from_mounted(order, entries, comment))
}

/// Scans backward from the end of the source for the EOCD signature,
/// within the bounded 64 KiB + fixed-size window APPNOTE allows for the
/// trailing comment (spec.md §4.5, §7).
fn find_eocd(io: &mut dyn ByteIO, size: u64) -> Result<u64> {
    let window = size.min(EOCD_FIXED_SIZE + 0xFFFF);
    if window < EOCD_FIXED_SIZE {
        return Err(SZipError::NotZip);
    }
    let start = size - window;
    io.seek(SeekFrom::Start(start))?;
    let buf = io.read_vec(window as usize)?;

    let sig_bytes = SIG_EOCD.to_le_bytes();
    let max_i = buf.len() as i64 - EOCD_FIXED_SIZE as i64;
    let mut i = max_i;
    while i >= 0 {
        let idx = i as usize;
        if buf[idx..idx + 4] == sig_bytes {
            let comment_len = u16::from_le_bytes([buf[idx + 20], buf[idx + 21]]) as u64;
            if start + idx as u64 + EOCD_FIXED_SIZE + comment_len <= size {
                return Ok(start + idx as u64);
            }
        }
        i -= 1;
    }
    Err(SZipError::NotZip)
}

fn read_cd_record(io: &mut dyn ByteIO, reader: &Rc<RefCell<dyn ByteIO>>, preamble: u64) -> Result<ZipEntry> {
    let sig = io.read_u32()?;
    if sig != SIG_CENTRAL_DIRECTORY {
        return Err(SZipError::malformed_header("central directory entry signature mismatch"));
    }
    let version_made_by = io.read_u16()?;
    let version_needed = io.read_u16()?;
    let gpbf = io.read_u16()?;
    let method_raw = io.read_u16()?;
    let dos_time_field = io.read_u16()?;
    let dos_date = io.read_u16()?;
    let crc32 = io.read_u32()?;
    let compressed_size_32 = io.read_u32()?;
    let uncompressed_size_32 = io.read_u32()?;
    let name_len = io.read_u16()? as usize;
    let extra_len = io.read_u16()? as usize;
    let comment_len = io.read_u16()? as usize;
    let _disk_start = io.read_u16()?;
    let internal_attributes = io.read_u16()?;
    let external_attributes = io.read_u32()?;
    let local_header_offset_32 = io.read_u32()?;

    let name_bytes = io.read_vec(name_len)?;
    let name = decode_text(&name_bytes, gpbf);
    let extra_bytes = io.read_vec(extra_len)?;
    let comment_bytes = io.read_vec(comment_len)?;
    let comment = decode_text(&comment_bytes, gpbf);

    let sentinels = Zip64Sentinels {
        uncompressed_size: uncompressed_size_32 == 0xFFFF_FFFF,
        compressed_size: compressed_size_32 == 0xFFFF_FFFF,
        local_header_offset: local_header_offset_32 == 0xFFFF_FFFF,
        disk_start: false,
    };
    let cd_extra = ExtraFieldSet::decode(&extra_bytes, Some(sentinels))?;

    let mut uncompressed_size = uncompressed_size_32 as u64;
    let mut compressed_size = compressed_size_32 as u64;
    let mut local_header_offset = local_header_offset_32 as u64;
    if let Some(z) = cd_extra.zip64() {
        if let Some(v) = z.uncompressed_size {
            uncompressed_size = v;
        }
        if let Some(v) = z.compressed_size {
            compressed_size = v;
        }
        if let Some(v) = z.local_header_offset {
            local_header_offset = v;
        }
    }
    local_header_offset += preamble;

    let method = Method::from_u16(method_raw)
        .ok_or_else(|| SZipError::UnsupportedMethod(format!("method code {method_raw}")))?;

    let data = if name.ends_with('/') && uncompressed_size == 0 {
        Data::None
    } else {
        Data::SourceRange(SourceRange {
            reader: Rc::clone(reader),
            local_header_offset,
            compressed_size,
            uncompressed_size,
        })
    };

    let created_os = (version_made_by >> 8) as u8;

    Ok(ZipEntry::from_raw_parts(
        name,
        created_os,
        0,
        version_made_by,
        version_needed,
        method,
        gpbf,
        dos_date,
        dos_time_field,
        crc32,
        compressed_size,
        uncompressed_size,
        local_header_offset,
        internal_attributes,
        external_attributes,
        cd_extra,
        comment,
        data,
    ))
}

fn decode_text(bytes: &[u8], _gpbf: u16) -> String {
    // Source trusts whatever UTF-8 bit the archive carries rather than
    // transcoding legacy code pages; mojibake from non-UTF-8 archives is
    // explicitly out of scope (spec.md §9).
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decodes an entry's plaintext, performing decryption, decompression, and
/// CRC verification as needed.
pub fn get_bytes(entry: &ZipEntry) -> Result<Vec<u8>> {
    match entry.data() {
        Data::None => Ok(Vec::new()),
        Data::NewBytes(b) => Ok(b.clone()),
        Data::NewStream(stream) => {
            let mut io = stream.borrow_mut();
            io.seek(SeekFrom::Start(0))?;
            let len = io.size()?;
            io.read_vec(len as usize)
        }
        Data::SourceRange(sr) => read_source_range(entry, sr),
    }
}

fn read_source_range(entry: &ZipEntry, sr: &SourceRange) -> Result<Vec<u8>> {
    let mut payload = {
        let mut io = sr.reader.borrow_mut();
        io.seek(SeekFrom::Start(sr.local_header_offset))?;
        let sig = io.read_u32()?;
        if sig != SIG_LOCAL_FILE_HEADER {
            return Err(SZipError::malformed_header("local file header signature mismatch"));
        }
        io.seek(SeekFrom::Current(22))?; // version..uncompressed_size fixed fields
        let name_len = io.read_u16()? as i64;
        let extra_len = io.read_u16()? as i64;
        io.seek(SeekFrom::Current(name_len + extra_len))?;
        io.read_vec(sr.compressed_size as usize)?
    };

    let payload_method = entry.payload_method()?;

    let decrypted = if entry.encryption_method().is_encrypted() {
        let password = entry
            .password()
            .ok_or_else(|| SZipError::WrongPassword { name: entry.name().to_string() })?;
        decrypt_payload(entry, password, &mut payload)?
    } else {
        payload
    };

    let plaintext = compression::decompress(payload_method, &decrypted, sr.uncompressed_size)?;

    let is_aes_v2 = entry
        .lfh_extra()
        .winzip_aes()
        .or_else(|| entry.cd_extra().winzip_aes())
        .map(|w| w.vendor_version == 2)
        .unwrap_or(false);

    if !is_aes_v2 {
        let actual_crc = crc32fast::hash(&plaintext);
        if actual_crc != entry.crc32() {
            if entry.encryption_method().is_encrypted() {
                return Err(SZipError::WrongPassword { name: entry.name().to_string() });
            }
            return Err(SZipError::CrcMismatch {
                name: entry.name().to_string(),
                expected: entry.crc32(),
                actual: actual_crc,
            });
        }
    }

    Ok(plaintext)
}

fn decrypt_payload(entry: &ZipEntry, password: &str, payload: &mut Vec<u8>) -> Result<Vec<u8>> {
    match entry.encryption_method() {
        EncryptionMethod::ZipCrypto => {
            if payload.len() < 12 {
                return Err(SZipError::malformed_header("ZipCrypto payload shorter than its 12-byte header"));
            }
            let mut header = [0u8; 12];
            header.copy_from_slice(&payload[..12]);
            let check_byte = if entry.has_data_descriptor() {
                (entry.dos_time().1 >> 8) as u8
            } else {
                (entry.crc32() >> 24) as u8
            };
            let mut dec = ZipCryptoDecryptor::new(password.as_bytes(), &header, check_byte, entry.name())?;
            let mut body = payload.split_off(12);
            dec.decrypt(&mut body);
            Ok(body)
        }
        EncryptionMethod::WinZipAes128 | EncryptionMethod::WinZipAes192 | EncryptionMethod::WinZipAes256 => {
            let strength = entry.encryption_method().aes_strength().expect("AES variant carries a strength");
            let salt_len = strength.salt_size();
            if payload.len() < salt_len + 2 + 10 {
                return Err(SZipError::malformed_header("WinZip AES payload shorter than salt+verifier+tail"));
            }
            let salt = payload[..salt_len].to_vec();
            let mut verifier = [0u8; 2];
            verifier.copy_from_slice(&payload[salt_len..salt_len + 2]);
            let tail_start = payload.len() - 10;
            let mut tail = [0u8; 10];
            tail.copy_from_slice(&payload[tail_start..]);
            let mut body = payload[salt_len + 2..tail_start].to_vec();

            let dec = WinZipAesDecryptor::new(password.as_bytes(), strength, &salt, &verifier, entry.name())?;
            let mut dec = dec;
            dec.decrypt(&mut body);
            dec.verify(&tail, entry.name())?;
            Ok(body)
        }
        EncryptionMethod::None => unreachable!("caller already checked is_encrypted()"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn build_minimal_stored_zip(name: &str, content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let crc = crc32fast::hash(content);
        let local_header_offset = 0u32;

        out.extend_from_slice(&SIG_LOCAL_FILE_HEADER.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&GPBF_UTF8.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u16.to_le_bytes()); // time
        out.extend_from_slice(&0u16.to_le_bytes()); // date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.write_all(name.as_bytes()).unwrap();
        out.write_all(content).unwrap();

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&SIG_CENTRAL_DIRECTORY.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&GPBF_UTF8.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&local_header_offset.to_le_bytes());
        out.write_all(name.as_bytes()).unwrap();
        let cd_size = out.len() as u32 - cd_offset;

        out.extend_from_slice(&SIG_EOCD.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn mounts_and_decodes_a_hand_built_archive() {
        let bytes = build_minimal_stored_zip("a.txt", b"hello");
        let container = open(Cursor::new(bytes)).unwrap();
        assert_eq!(container.len(), 1);
        let entry = container.get("a.txt").unwrap();
        assert_eq!(entry.crc32(), 0x3610_A686);
        let plaintext = get_bytes(entry).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = vec![0u8; 10];
        assert!(open(Cursor::new(bytes)).is_err());
    }
}
