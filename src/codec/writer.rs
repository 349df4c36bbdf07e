//! Serializes a `Container`: unmodified entries are copied verbatim from
//! the archive they were mounted from, everything else is decoded,
//! recompressed, and re-encrypted. Emits the central directory and, when
//! any entry or count crosses the 32-bit limit, a ZIP64 EOCD + locator
//! (spec.md §4.6).

use std::io::SeekFrom;

use crate::byteio::ByteIO;
use crate::codec::reader;
use crate::codec::{
    GPBF_DATA_DESCRIPTOR, GPBF_ENCRYPTED, GPBF_UTF8, LFH_FIXED_SIZE, SIG_CENTRAL_DIRECTORY,
    SIG_EOCD, SIG_LOCAL_FILE_HEADER, SIG_ZIP64_EOCD, SIG_ZIP64_EOCD_LOCATOR,
};
use crate::compression::{self, Method};
use crate::container::Container;
use crate::encryption::{WinZipAesEncryptor, ZipCryptoEncryptor};
use crate::entry::{Data, EncryptionMethod, ZipEntry, ZIP64_THRESHOLD};
use crate::error::{Result, SZipError};
use crate::extra_field::{ExtraField, ExtraFieldSet, WinZipAesExtra, Zip64Extra, ID_WINZIP_AES, ID_ZIP64};

/// Everything needed to emit one entry's central directory record, gathered
/// once its local record (copied or rebuilt) has been written.
struct PreparedEntry {
    name: String,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    method_code: u16,
    gpbf: u16,
    version_needed: u16,
    version_made_by: u16,
    internal_attributes: u16,
    external_attributes: u32,
    comment: String,
    dos_date: u16,
    dos_time_field: u16,
    cd_extra: ExtraFieldSet,
}

pub(crate) fn serialize<W: ByteIO>(container: &Container, out: &mut W) -> Result<()> {
    let mut prepared = Vec::with_capacity(container.len());

    for name in container.names() {
        let entry = container.get(name).expect("name came from the container's own iterator");
        let offset = out.tell()?;
        let baseline = container.baseline_entry(name);
        let record = if can_copy(entry, baseline) {
            copy_entry(entry, out, offset)?
        } else {
            rebuild_entry(entry, out, offset)?
        };
        prepared.push(record);
    }

    let cd_offset = out.tell()?;
    for record in &prepared {
        write_cd_record(record, out)?;
    }
    let cd_size = out.tell()? - cd_offset;

    let total_entries = prepared.len() as u64;
    let needs_zip64_eocd = total_entries >= 0xFFFF
        || cd_size >= ZIP64_THRESHOLD
        || cd_offset >= ZIP64_THRESHOLD
        || prepared.iter().any(|p| {
            p.local_header_offset >= ZIP64_THRESHOLD
                || p.compressed_size >= ZIP64_THRESHOLD
                || p.uncompressed_size >= ZIP64_THRESHOLD
        });

    if needs_zip64_eocd {
        let zip64_eocd_offset = out.tell()?;
        write_zip64_eocd(out, total_entries, cd_size, cd_offset)?;
        write_zip64_eocd_locator(out, zip64_eocd_offset)?;
    }

    write_eocd(out, total_entries, cd_size, cd_offset, container.archive_comment())?;
    Ok(())
}

/// An entry can be streamed straight from its source archive, unmodified,
/// when none of the fields that would change its on-disk bytes differ from
/// the open-time baseline (spec.md §4.6).
fn can_copy(entry: &ZipEntry, baseline: Option<&ZipEntry>) -> bool {
    let (Data::SourceRange(_), Some(base)) = (entry.data(), baseline) else {
        return false;
    };
    entry.method() == base.method()
        && entry.compression_level() == base.compression_level()
        && entry.encryption_method() == base.encryption_method()
        && entry.password() == base.password()
        && entry.uncompressed_size() == base.uncompressed_size()
        && entry.compressed_size() == base.compressed_size()
        && entry.crc32() == base.crc32()
}

fn copy_entry<W: ByteIO>(entry: &ZipEntry, out: &mut W, offset: u64) -> Result<PreparedEntry> {
    let sr = match entry.data() {
        Data::SourceRange(sr) => sr,
        _ => unreachable!("can_copy only accepts SourceRange entries"),
    };

    let mut header = {
        let mut io = sr.reader.borrow_mut();
        io.seek(SeekFrom::Start(sr.local_header_offset))?;
        io.read_vec(LFH_FIXED_SIZE as usize)?
    };
    if u32::from_le_bytes(header[0..4].try_into().unwrap()) != SIG_LOCAL_FILE_HEADER {
        return Err(SZipError::malformed_header("local file header signature mismatch while copying"));
    }
    let name_len = u16::from_le_bytes(header[26..28].try_into().unwrap()) as usize;
    let extra_len = u16::from_le_bytes(header[28..30].try_into().unwrap()) as usize;
    let rest = {
        let mut io = sr.reader.borrow_mut();
        io.read_vec(name_len + extra_len + sr.compressed_size as usize)?
    };

    // The CD already carries the authoritative crc/sizes; a trailing data
    // descriptor would be redundant (and we don't copy one), so clear the
    // bit that tells a reader to expect it.
    let gpbf = u16::from_le_bytes([header[6], header[7]]) & !GPBF_DATA_DESCRIPTOR;
    header[6..8].copy_from_slice(&gpbf.to_le_bytes());

    out.write_all(&header)?;
    out.write_all(&rest)?;

    let requires_zip64 = entry.uncompressed_size() >= ZIP64_THRESHOLD
        || entry.compressed_size() >= ZIP64_THRESHOLD
        || offset >= ZIP64_THRESHOLD;
    let real_method = entry.payload_method()?;
    let version_needed = version_needed_for(
        entry.is_directory(),
        real_method,
        entry.encryption_method().aes_strength().is_some(),
        requires_zip64,
    );

    let cd_extra = build_cd_extra(
        entry.cd_extra(),
        entry.uncompressed_size(),
        entry.compressed_size(),
        offset,
        entry.cd_extra().winzip_aes().copied(),
    );

    Ok(PreparedEntry {
        name: entry.name().to_string(),
        local_header_offset: offset,
        crc32: entry.crc32(),
        compressed_size: entry.compressed_size(),
        uncompressed_size: entry.uncompressed_size(),
        method_code: entry.method().to_u16(),
        gpbf,
        version_needed,
        version_made_by: ((entry.created_os() as u16) << 8) | version_needed,
        internal_attributes: entry.internal_attributes(),
        external_attributes: entry.external_attributes(),
        comment: entry.comment().to_string(),
        dos_date: entry.dos_time().0,
        dos_time_field: entry.dos_time().1,
        cd_extra,
    })
}

fn rebuild_entry<W: ByteIO>(entry: &ZipEntry, out: &mut W, offset: u64) -> Result<PreparedEntry> {
    let plaintext = reader::get_bytes(entry)?;
    let real_method = entry.payload_method()?;
    let compressed = compression::compress(real_method, entry.compression_level(), &plaintext)?;
    let plain_crc = crc32fast::hash(&plaintext);
    let uncompressed_size = plaintext.len() as u64;

    let (final_payload, method_code, crc, winzip_extra) = match entry.encryption_method() {
        EncryptionMethod::None => (compressed, real_method.to_u16(), plain_crc, None),
        EncryptionMethod::ZipCrypto => {
            let password = required_password(entry)?;
            let check_byte = (plain_crc >> 24) as u8;
            let (mut enc, header) = ZipCryptoEncryptor::new(password.as_bytes(), check_byte)?;
            let mut body = compressed;
            enc.encrypt(&mut body);
            let mut payload = header.to_vec();
            payload.extend_from_slice(&body);
            (payload, real_method.to_u16(), plain_crc, None)
        }
        EncryptionMethod::WinZipAes128 | EncryptionMethod::WinZipAes192 | EncryptionMethod::WinZipAes256 => {
            let strength = entry.encryption_method().aes_strength().expect("AES variant carries a strength");
            let password = required_password(entry)?;
            let (mut enc, salt, verifier) = WinZipAesEncryptor::new(password.as_bytes(), strength)?;
            let mut body = compressed;
            enc.encrypt(&mut body);
            let tail = enc.finalize();
            let mut payload = salt;
            payload.extend_from_slice(&verifier);
            payload.extend_from_slice(&body);
            payload.extend_from_slice(&tail);
            // AE-2 skips the plaintext CRC and relies solely on the HMAC tail;
            // WinZip picks it for very short payloads and for BZip2, where a
            // CRC would otherwise leak information about the key stream.
            let vendor_version: u16 = if uncompressed_size < 20 || real_method == Method::BZip2 { 2 } else { 1 };
            let stored_crc = if vendor_version == 2 { 0 } else { plain_crc };
            let extra = WinZipAesExtra {
                vendor_version,
                key_strength: strength.to_code(),
                actual_method: real_method.to_u16(),
            };
            (payload, Method::WinZipAes.to_u16(), stored_crc, Some(extra))
        }
    };

    let compressed_size = final_payload.len() as u64;
    let requires_zip64 = uncompressed_size >= ZIP64_THRESHOLD || compressed_size >= ZIP64_THRESHOLD || offset >= ZIP64_THRESHOLD;
    let version_needed = version_needed_for(entry.is_directory(), real_method, winzip_extra.is_some(), requires_zip64);
    let gpbf = build_gpbf(entry, real_method);

    let lfh_zip64 = if uncompressed_size >= ZIP64_THRESHOLD || compressed_size >= ZIP64_THRESHOLD {
        Some(Zip64Extra {
            uncompressed_size: Some(uncompressed_size),
            compressed_size: Some(compressed_size),
            local_header_offset: None,
            disk_start: None,
        })
    } else {
        None
    };
    let mut lfh_extra = entry.lfh_extra().clone();
    lfh_extra.remove(ID_ZIP64);
    lfh_extra.remove(ID_WINZIP_AES);
    if let Some(z) = lfh_zip64 {
        lfh_extra.set(ExtraField::Zip64(z));
    }
    if let Some(w) = winzip_extra {
        lfh_extra.set(ExtraField::WinZipAes(w));
    }

    write_lfh(
        out,
        entry.name(),
        version_needed,
        gpbf,
        method_code,
        entry.dos_time().0,
        entry.dos_time().1,
        crc,
        compressed_size,
        uncompressed_size,
        &lfh_extra,
    )?;
    out.write_all(&final_payload)?;

    let cd_extra = build_cd_extra(entry.cd_extra(), uncompressed_size, compressed_size, offset, winzip_extra);

    Ok(PreparedEntry {
        name: entry.name().to_string(),
        local_header_offset: offset,
        crc32: crc,
        compressed_size,
        uncompressed_size,
        method_code,
        gpbf,
        version_needed,
        version_made_by: ((entry.created_os() as u16) << 8) | version_needed,
        internal_attributes: entry.internal_attributes(),
        external_attributes: entry.external_attributes(),
        comment: entry.comment().to_string(),
        dos_date: entry.dos_time().0,
        dos_time_field: entry.dos_time().1,
        cd_extra,
    })
}

fn required_password(entry: &ZipEntry) -> Result<&str> {
    entry.password().ok_or_else(|| {
        SZipError::InvalidArgument(format!(
            "entry `{}` is marked encrypted but carries no password",
            entry.name()
        ))
    })
}

fn version_needed_for(is_directory: bool, real_method: Method, is_aes: bool, requires_zip64: bool) -> u16 {
    if is_aes {
        51
    } else if real_method == Method::BZip2 {
        46
    } else if requires_zip64 {
        45
    } else if real_method == Method::Deflated || is_directory {
        20
    } else {
        10
    }
}

fn build_gpbf(entry: &ZipEntry, real_method: Method) -> u16 {
    let mut gpbf = GPBF_UTF8;
    if entry.encryption_method().is_encrypted() {
        gpbf |= GPBF_ENCRYPTED;
    }
    if real_method == Method::Deflated {
        gpbf |= entry.compression_level().gpbf_bits();
    }
    gpbf
}

/// Rebuilds the central-directory extra-field set: keeps any user-supplied
/// fields from `base`, then lays in fresh ZIP64 and WinZip AES subfields
/// for this write's actual sizes/offset, since the ones `base` carried may
/// have come from a different position in a different archive.
fn build_cd_extra(
    base: &ExtraFieldSet,
    uncompressed_size: u64,
    compressed_size: u64,
    offset: u64,
    winzip_aes: Option<WinZipAesExtra>,
) -> ExtraFieldSet {
    let mut set = base.clone();
    set.remove(ID_ZIP64);
    set.remove(ID_WINZIP_AES);

    let mut zip64 = Zip64Extra::default();
    let mut zip64_needed = false;
    if uncompressed_size >= ZIP64_THRESHOLD {
        zip64.uncompressed_size = Some(uncompressed_size);
        zip64_needed = true;
    }
    if compressed_size >= ZIP64_THRESHOLD {
        zip64.compressed_size = Some(compressed_size);
        zip64_needed = true;
    }
    if offset >= ZIP64_THRESHOLD {
        zip64.local_header_offset = Some(offset);
        zip64_needed = true;
    }
    if zip64_needed {
        set.set(ExtraField::Zip64(zip64));
    }
    if let Some(w) = winzip_aes {
        set.set(ExtraField::WinZipAes(w));
    }
    set
}

#[allow(clippy::too_many_arguments)]
fn write_lfh<W: ByteIO>(
    out: &mut W,
    name: &str,
    version_needed: u16,
    gpbf: u16,
    method_code: u16,
    dos_date: u16,
    dos_time_field: u16,
    crc: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    extra: &ExtraFieldSet,
) -> Result<()> {
    let extra_bytes = extra.encode();
    let name_bytes = name.as_bytes();
    let zip64 = compressed_size >= ZIP64_THRESHOLD || uncompressed_size >= ZIP64_THRESHOLD;
    let csize32 = if zip64 { 0xFFFF_FFFFu32 } else { compressed_size as u32 };
    let usize32 = if zip64 { 0xFFFF_FFFFu32 } else { uncompressed_size as u32 };

    out.write_u32(SIG_LOCAL_FILE_HEADER)?;
    out.write_u16(version_needed)?;
    out.write_u16(gpbf)?;
    out.write_u16(method_code)?;
    out.write_u16(dos_time_field)?;
    out.write_u16(dos_date)?;
    out.write_u32(crc)?;
    out.write_u32(csize32)?;
    out.write_u32(usize32)?;
    out.write_u16(name_bytes.len() as u16)?;
    out.write_u16(extra_bytes.len() as u16)?;
    out.write_all(name_bytes)?;
    out.write_all(&extra_bytes)?;
    Ok(())
}

fn write_cd_record<W: ByteIO>(p: &PreparedEntry, out: &mut W) -> Result<()> {
    let extra_bytes = p.cd_extra.encode();
    let name_bytes = p.name.as_bytes();
    let comment_bytes = p.comment.as_bytes();
    let csize32 = if p.compressed_size >= ZIP64_THRESHOLD { 0xFFFF_FFFFu32 } else { p.compressed_size as u32 };
    let usize32 = if p.uncompressed_size >= ZIP64_THRESHOLD { 0xFFFF_FFFFu32 } else { p.uncompressed_size as u32 };
    let offset32 = if p.local_header_offset >= ZIP64_THRESHOLD { 0xFFFF_FFFFu32 } else { p.local_header_offset as u32 };

    out.write_u32(SIG_CENTRAL_DIRECTORY)?;
    out.write_u16(p.version_made_by)?;
    out.write_u16(p.version_needed)?;
    out.write_u16(p.gpbf)?;
    out.write_u16(p.method_code)?;
    out.write_u16(p.dos_time_field)?;
    out.write_u16(p.dos_date)?;
    out.write_u32(p.crc32)?;
    out.write_u32(csize32)?;
    out.write_u32(usize32)?;
    out.write_u16(name_bytes.len() as u16)?;
    out.write_u16(extra_bytes.len() as u16)?;
    out.write_u16(comment_bytes.len() as u16)?;
    out.write_u16(0)?; // disk number start
    out.write_u16(p.internal_attributes)?;
    out.write_u32(p.external_attributes)?;
    out.write_u32(offset32)?;
    out.write_all(name_bytes)?;
    out.write_all(&extra_bytes)?;
    out.write_all(comment_bytes)?;
    Ok(())
}

fn write_zip64_eocd<W: ByteIO>(out: &mut W, total_entries: u64, cd_size: u64, cd_offset: u64) -> Result<()> {
    out.write_u32(SIG_ZIP64_EOCD)?;
    out.write_u64(44)?; // record size: everything after this field
    out.write_u16(45)?; // version made by
    out.write_u16(45)?; // version needed to extract
    out.write_u32(0)?; // disk number
    out.write_u32(0)?; // disk with the central directory start
    out.write_u64(total_entries)?;
    out.write_u64(total_entries)?;
    out.write_u64(cd_size)?;
    out.write_u64(cd_offset)?;
    Ok(())
}

fn write_zip64_eocd_locator<W: ByteIO>(out: &mut W, zip64_eocd_offset: u64) -> Result<()> {
    out.write_u32(SIG_ZIP64_EOCD_LOCATOR)?;
    out.write_u32(0)?; // disk with the zip64 EOCD
    out.write_u64(zip64_eocd_offset)?;
    out.write_u32(1)?; // total number of disks
    Ok(())
}

fn write_eocd<W: ByteIO>(out: &mut W, total_entries: u64, cd_size: u64, cd_offset: u64, comment: &str) -> Result<()> {
    let comment_bytes = comment.as_bytes();
    let entries16 = if total_entries >= 0xFFFF { 0xFFFFu16 } else { total_entries as u16 };
    let cd_size32 = if cd_size >= ZIP64_THRESHOLD { 0xFFFF_FFFFu32 } else { cd_size as u32 };
    let cd_offset32 = if cd_offset >= ZIP64_THRESHOLD { 0xFFFF_FFFFu32 } else { cd_offset as u32 };

    out.write_u32(SIG_EOCD)?;
    out.write_u16(0)?;
    out.write_u16(0)?;
    out.write_u16(entries16)?;
    out.write_u16(entries16)?;
    out.write_u32(cd_size32)?;
    out.write_u32(cd_offset32)?;
    out.write_u16(comment_bytes.len() as u16)?;
    out.write_all(comment_bytes)?;
    Ok(())
}
