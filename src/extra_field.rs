//! Extra Field registry: decode/encode tagged TLV blobs by 16-bit Header-ID.
//!
//! Each entry in an extra-field blob is `u16 id, u16 size, [size bytes]`.
//! Decoding walks the blob until it runs out of bytes; an ID that appears
//! more than once in a collection has its later occurrence win (the source
//! library's behavior, preserved here for tolerance rather than strictness —
//! see spec.md §9).

use tracing::warn;

use crate::error::{Result, SZipError};

pub const ID_ZIP64: u16 = 0x0001;
pub const ID_NTFS: u16 = 0x000a;
pub const ID_UNIX_OLD: u16 = 0x5855;
pub const ID_EXTENDED_TIMESTAMP: u16 = 0x5455;
pub const ID_UNICODE_PATH: u16 = 0x7075;
pub const ID_UNICODE_COMMENT: u16 = 0x6375;
pub const ID_UNIX_NEW: u16 = 0x7875;
pub const ID_JAR_MARKER: u16 = 0xcafe;
pub const ID_ASI_UNIX: u16 = 0x756e;
pub const ID_WINZIP_AES: u16 = 0x9901;
pub const ID_APK_ALIGNMENT: u16 = 0xd935;

/// Which of a ZIP64 central-directory record's 32-bit fields held the
/// 0xFFFFFFFF sentinel, in the fixed order the extra field carries them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Sentinels {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub local_header_offset: bool,
    pub disk_start: bool,
}

impl Zip64Sentinels {
    pub fn any(&self) -> bool {
        self.uncompressed_size || self.compressed_size || self.local_header_offset
    }
}

/// ZIP64 extended information, §4.2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Extra {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub local_header_offset: Option<u64>,
    pub disk_start: Option<u32>,
}

/// WinZip AES extra field (0x9901), fixed 7-byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinZipAesExtra {
    /// AE-1 (1) or AE-2 (2).
    pub vendor_version: u16,
    /// Key strength code: 1 = 128, 2 = 192, 3 = 256 bits.
    pub key_strength: u8,
    /// The post-decryption compression method actually used for the payload.
    pub actual_method: u16,
}

impl WinZipAesExtra {
    pub fn key_size_bytes(&self) -> usize {
        match self.key_strength {
            1 => 16,
            2 => 24,
            3 => 32,
            _ => unreachable!("validated at decode time"),
        }
    }
}

/// APK Alignment extra field (0xD935): a 2-byte alignment multiple plus
/// zero-padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApkAlignmentExtra {
    pub alignment: u16,
    pub padding: Vec<u8>,
}

/// NTFS extra field (0x000A): mtime/atime/ctime as 100ns ticks since 1601.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsExtra {
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64,
}

/// Info-ZIP extended timestamp (0x5455).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedTimestampExtra {
    pub mtime: Option<i64>,
    pub atime: Option<i64>,
    pub ctime: Option<i64>,
}

/// Info-ZIP UNIX extra field, original form (0x5855).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OldUnixExtra {
    pub atime: u32,
    pub mtime: u32,
    pub uid: u16,
    pub gid: u16,
}

/// Info-ZIP UNIX extra field, new form (0x7875): variable-width uid/gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnixExtra {
    pub version: u8,
    pub uid: Vec<u8>,
    pub gid: Vec<u8>,
}

/// Info-ZIP Unicode Path/Comment extra fields (0x7075 / 0x6375).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeExtra {
    pub crc32: u32,
    pub data: Vec<u8>,
}

/// A single decoded extra field, tagged by Header-ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    Zip64(Zip64Extra),
    WinZipAes(WinZipAesExtra),
    ApkAlignment(ApkAlignmentExtra),
    Ntfs(NtfsExtra),
    ExtendedTimestamp(ExtendedTimestampExtra),
    OldUnix(OldUnixExtra),
    NewUnix(NewUnixExtra),
    UnicodePath(UnicodeExtra),
    UnicodeComment(UnicodeExtra),
    JarMarker,
    AsiUnix(Vec<u8>),
    /// Any Header-ID this registry doesn't model, round-tripped verbatim.
    Unrecognized(u16, Vec<u8>),
}

impl ExtraField {
    pub fn id(&self) -> u16 {
        match self {
            ExtraField::Zip64(_) => ID_ZIP64,
            ExtraField::WinZipAes(_) => ID_WINZIP_AES,
            ExtraField::ApkAlignment(_) => ID_APK_ALIGNMENT,
            ExtraField::Ntfs(_) => ID_NTFS,
            ExtraField::ExtendedTimestamp(_) => ID_EXTENDED_TIMESTAMP,
            ExtraField::OldUnix(_) => ID_UNIX_OLD,
            ExtraField::NewUnix(_) => ID_UNIX_NEW,
            ExtraField::UnicodePath(_) => ID_UNICODE_PATH,
            ExtraField::UnicodeComment(_) => ID_UNICODE_COMMENT,
            ExtraField::JarMarker => ID_JAR_MARKER,
            ExtraField::AsiUnix(_) => ID_ASI_UNIX,
            ExtraField::Unrecognized(id, _) => *id,
        }
    }
}

/// A parsed collection of extra fields (one for the LFH copy, one for the CD
/// copy of an entry).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFieldSet(Vec<ExtraField>);

impl ExtraFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[ExtraField] {
        &self.0
    }

    pub fn get(&self, id: u16) -> Option<&ExtraField> {
        self.0.iter().find(|f| f.id() == id)
    }

    pub fn zip64(&self) -> Option<&Zip64Extra> {
        self.0.iter().find_map(|f| match f {
            ExtraField::Zip64(z) => Some(z),
            _ => None,
        })
    }

    pub fn winzip_aes(&self) -> Option<&WinZipAesExtra> {
        self.0.iter().find_map(|f| match f {
            ExtraField::WinZipAes(w) => Some(w),
            _ => None,
        })
    }

    /// Replace any existing field with the same Header-ID and append
    /// otherwise.
    pub fn set(&mut self, field: ExtraField) {
        let id = field.id();
        if let Some(existing) = self.0.iter_mut().find(|f| f.id() == id) {
            *existing = field;
        } else {
            self.0.push(field);
        }
    }

    pub fn remove(&mut self, id: u16) {
        self.0.retain(|f| f.id() != id);
    }

    /// Decode the LFH or CD form of an extra-field blob.
    ///
    /// `zip64_sentinels` selects which ZIP64 subfields to expect, per the
    /// owning 32-bit header fields (`None` for an LFH blob, where ZIP64
    /// extras carry both sizes or are absent entirely).
    pub fn decode(raw: &[u8], zip64_sentinels: Option<Zip64Sentinels>) -> Result<Self> {
        let mut fields = Vec::new();
        let mut i = 0usize;
        while i + 4 <= raw.len() {
            let id = u16::from_le_bytes([raw[i], raw[i + 1]]);
            let size = u16::from_le_bytes([raw[i + 2], raw[i + 3]]) as usize;
            i += 4;
            if i + size > raw.len() {
                return Err(SZipError::malformed_extra(format!(
                    "field {:#06x} declares size {} but only {} bytes remain",
                    id,
                    size,
                    raw.len() - i
                )));
            }
            let payload = &raw[i..i + size];
            i += size;
            let decoded = decode_one(id, payload, zip64_sentinels)?;
            if fields.iter().any(|f: &ExtraField| f.id() == id) {
                warn!("duplicate extra field Header-ID {:#06x}, keeping the later occurrence", id);
                fields.retain(|f: &ExtraField| f.id() != id);
            }
            fields.push(decoded);
        }
        Ok(Self(fields))
    }

    /// Encode back into a single LFH/CD extra-field blob.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in &self.0 {
            let (id, payload) = encode_one(field);
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
            out.extend_from_slice(&payload);
        }
        out
    }

    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(|f| 4 + encode_one(f).1.len()).sum()
    }
}

fn decode_one(id: u16, payload: &[u8], zip64_sentinels: Option<Zip64Sentinels>) -> Result<ExtraField> {
    match id {
        ID_ZIP64 => decode_zip64(payload, zip64_sentinels).map(ExtraField::Zip64),
        ID_WINZIP_AES => decode_winzip_aes(payload).map(ExtraField::WinZipAes),
        ID_APK_ALIGNMENT => decode_apk_alignment(payload).map(ExtraField::ApkAlignment),
        ID_NTFS => decode_ntfs(payload).map(ExtraField::Ntfs),
        ID_EXTENDED_TIMESTAMP => Ok(ExtraField::ExtendedTimestamp(decode_extended_timestamp(payload))),
        ID_UNIX_OLD => decode_old_unix(payload).map(ExtraField::OldUnix),
        ID_UNIX_NEW => decode_new_unix(payload).map(ExtraField::NewUnix),
        ID_UNICODE_PATH => decode_unicode(payload).map(ExtraField::UnicodePath),
        ID_UNICODE_COMMENT => decode_unicode(payload).map(ExtraField::UnicodeComment),
        ID_JAR_MARKER => Ok(ExtraField::JarMarker),
        ID_ASI_UNIX => Ok(ExtraField::AsiUnix(payload.to_vec())),
        other => Ok(ExtraField::Unrecognized(other, payload.to_vec())),
    }
}

fn encode_one(field: &ExtraField) -> (u16, Vec<u8>) {
    match field {
        ExtraField::Zip64(z) => (ID_ZIP64, encode_zip64(z)),
        ExtraField::WinZipAes(w) => (ID_WINZIP_AES, encode_winzip_aes(w)),
        ExtraField::ApkAlignment(a) => (ID_APK_ALIGNMENT, encode_apk_alignment(a)),
        ExtraField::Ntfs(n) => (ID_NTFS, encode_ntfs(n)),
        ExtraField::ExtendedTimestamp(t) => (ID_EXTENDED_TIMESTAMP, encode_extended_timestamp(t)),
        ExtraField::OldUnix(u) => (ID_UNIX_OLD, encode_old_unix(u)),
        ExtraField::NewUnix(u) => (ID_UNIX_NEW, encode_new_unix(u)),
        ExtraField::UnicodePath(u) => (ID_UNICODE_PATH, encode_unicode(u)),
        ExtraField::UnicodeComment(u) => (ID_UNICODE_COMMENT, encode_unicode(u)),
        ExtraField::JarMarker => (ID_JAR_MARKER, Vec::new()),
        ExtraField::AsiUnix(raw) => (ID_ASI_UNIX, raw.clone()),
        ExtraField::Unrecognized(id, raw) => (*id, raw.clone()),
    }
}

fn decode_zip64(payload: &[u8], sentinels: Option<Zip64Sentinels>) -> Result<Zip64Extra> {
    let mut cursor = 0usize;
    let mut take_u64 = |need: bool| -> Result<Option<u64>> {
        if !need {
            return Ok(None);
        }
        if cursor + 8 > payload.len() {
            return Err(SZipError::malformed_extra(
                "zip64 extra field truncated before an expected 8-byte subfield",
            ));
        }
        let v = u64::from_le_bytes(payload[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        Ok(Some(v))
    };

    match sentinels {
        Some(s) => {
            let uncompressed_size = take_u64(s.uncompressed_size)?;
            let compressed_size = take_u64(s.compressed_size)?;
            let local_header_offset = take_u64(s.local_header_offset)?;
            let disk_start = if s.disk_start && cursor + 4 <= payload.len() {
                let v = u32::from_le_bytes(payload[cursor..cursor + 4].try_into().unwrap());
                cursor += 4;
                Some(v)
            } else {
                None
            };
            Ok(Zip64Extra {
                uncompressed_size,
                compressed_size,
                local_header_offset,
                disk_start,
            })
        }
        // Local-file-header form: either empty, or exactly 16 bytes
        // carrying both sizes (spec.md §4.2).
        None => {
            if payload.is_empty() {
                Ok(Zip64Extra::default())
            } else if payload.len() >= 16 {
                Ok(Zip64Extra {
                    uncompressed_size: Some(u64::from_le_bytes(payload[0..8].try_into().unwrap())),
                    compressed_size: Some(u64::from_le_bytes(payload[8..16].try_into().unwrap())),
                    local_header_offset: None,
                    disk_start: None,
                })
            } else {
                Err(SZipError::malformed_extra(
                    "local zip64 extra field must be empty or at least 16 bytes",
                ))
            }
        }
    }
}

fn encode_zip64(z: &Zip64Extra) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(v) = z.uncompressed_size {
        out.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = z.compressed_size {
        out.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = z.local_header_offset {
        out.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = z.disk_start {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_winzip_aes(payload: &[u8]) -> Result<WinZipAesExtra> {
    if payload.len() != 7 {
        return Err(SZipError::malformed_extra(format!(
            "WinZip AES extra field must be 7 bytes, got {}",
            payload.len()
        )));
    }
    let vendor_version = u16::from_le_bytes([payload[0], payload[1]]);
    let vendor_id = u16::from_le_bytes([payload[2], payload[3]]);
    let key_strength = payload[4];
    let actual_method = u16::from_le_bytes([payload[5], payload[6]]);

    if vendor_id != 0x4541 {
        return Err(SZipError::malformed_extra(format!(
            "WinZip AES extra field has unknown vendor id {:#06x}",
            vendor_id
        )));
    }
    if !(1..=3).contains(&key_strength) {
        return Err(SZipError::malformed_extra(format!(
            "WinZip AES extra field has unknown key strength code {}",
            key_strength
        )));
    }
    if !(1..=2).contains(&vendor_version) {
        return Err(SZipError::malformed_extra(format!(
            "WinZip AES extra field has unknown vendor version {}",
            vendor_version
        )));
    }

    Ok(WinZipAesExtra {
        vendor_version,
        key_strength,
        actual_method,
    })
}

fn encode_winzip_aes(w: &WinZipAesExtra) -> Vec<u8> {
    let mut out = Vec::with_capacity(7);
    out.extend_from_slice(&w.vendor_version.to_le_bytes());
    out.extend_from_slice(&0x4541u16.to_le_bytes());
    out.push(w.key_strength);
    out.extend_from_slice(&w.actual_method.to_le_bytes());
    out
}

fn decode_apk_alignment(payload: &[u8]) -> Result<ApkAlignmentExtra> {
    if payload.len() < 2 {
        return Err(SZipError::malformed_extra(
            "APK alignment extra field must carry at least a 2-byte alignment value",
        ));
    }
    Ok(ApkAlignmentExtra {
        alignment: u16::from_le_bytes([payload[0], payload[1]]),
        padding: payload[2..].to_vec(),
    })
}

fn encode_apk_alignment(a: &ApkAlignmentExtra) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + a.padding.len());
    out.extend_from_slice(&a.alignment.to_le_bytes());
    out.extend_from_slice(&a.padding);
    out
}

fn decode_ntfs(payload: &[u8]) -> Result<NtfsExtra> {
    // Reserved(4) then a sequence of Tag(2) Size(2) Data(Size) blocks;
    // tag 0x0001 carries mtime/atime/ctime as three 8-byte ticks.
    if payload.len() < 4 {
        return Err(SZipError::malformed_extra("NTFS extra field too short"));
    }
    let mut i = 4usize;
    while i + 4 <= payload.len() {
        let tag = u16::from_le_bytes([payload[i], payload[i + 1]]);
        let size = u16::from_le_bytes([payload[i + 2], payload[i + 3]]) as usize;
        i += 4;
        if i + size > payload.len() {
            return Err(SZipError::malformed_extra("NTFS extra field sub-block truncated"));
        }
        if tag == 0x0001 && size >= 24 {
            let mtime = u64::from_le_bytes(payload[i..i + 8].try_into().unwrap());
            let atime = u64::from_le_bytes(payload[i + 8..i + 16].try_into().unwrap());
            let ctime = u64::from_le_bytes(payload[i + 16..i + 24].try_into().unwrap());
            return Ok(NtfsExtra { mtime, atime, ctime });
        }
        i += size;
    }
    Err(SZipError::malformed_extra(
        "NTFS extra field missing the timestamp (tag 0x0001) sub-block",
    ))
}

fn encode_ntfs(n: &NtfsExtra) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(&0u32.to_le_bytes()); // reserved
    out.extend_from_slice(&0x0001u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&n.mtime.to_le_bytes());
    out.extend_from_slice(&n.atime.to_le_bytes());
    out.extend_from_slice(&n.ctime.to_le_bytes());
    out
}

fn decode_extended_timestamp(payload: &[u8]) -> ExtendedTimestampExtra {
    if payload.is_empty() {
        return ExtendedTimestampExtra::default();
    }
    let flags = payload[0];
    let mut cursor = 1usize;
    let mut take = |present: bool| -> Option<i64> {
        if present && cursor + 4 <= payload.len() {
            let v = i32::from_le_bytes(payload[cursor..cursor + 4].try_into().unwrap()) as i64;
            cursor += 4;
            Some(v)
        } else {
            None
        }
    };
    ExtendedTimestampExtra {
        mtime: take(flags & 0b001 != 0),
        atime: take(flags & 0b010 != 0),
        ctime: take(flags & 0b100 != 0),
    }
}

fn encode_extended_timestamp(t: &ExtendedTimestampExtra) -> Vec<u8> {
    let mut flags = 0u8;
    if t.mtime.is_some() {
        flags |= 0b001;
    }
    if t.atime.is_some() {
        flags |= 0b010;
    }
    if t.ctime.is_some() {
        flags |= 0b100;
    }
    let mut out = vec![flags];
    for v in [t.mtime, t.atime, t.ctime].into_iter().flatten() {
        out.extend_from_slice(&(v as i32).to_le_bytes());
    }
    out
}

fn decode_old_unix(payload: &[u8]) -> Result<OldUnixExtra> {
    if payload.len() < 12 {
        return Err(SZipError::malformed_extra("old-style UNIX extra field too short"));
    }
    Ok(OldUnixExtra {
        atime: u32::from_le_bytes(payload[0..4].try_into().unwrap()),
        mtime: u32::from_le_bytes(payload[4..8].try_into().unwrap()),
        uid: u16::from_le_bytes(payload[8..10].try_into().unwrap()),
        gid: u16::from_le_bytes(payload[10..12].try_into().unwrap()),
    })
}

fn encode_old_unix(u: &OldUnixExtra) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&u.atime.to_le_bytes());
    out.extend_from_slice(&u.mtime.to_le_bytes());
    out.extend_from_slice(&u.uid.to_le_bytes());
    out.extend_from_slice(&u.gid.to_le_bytes());
    out
}

fn decode_new_unix(payload: &[u8]) -> Result<NewUnixExtra> {
    if payload.is_empty() {
        return Err(SZipError::malformed_extra("new-style UNIX extra field too short"));
    }
    let version = payload[0];
    let mut i = 1usize;
    let read_field = |data: &[u8], i: &mut usize| -> Result<Vec<u8>> {
        if *i >= data.len() {
            return Err(SZipError::malformed_extra("new-style UNIX extra field truncated"));
        }
        let len = data[*i] as usize;
        *i += 1;
        if *i + len > data.len() {
            return Err(SZipError::malformed_extra("new-style UNIX extra field truncated"));
        }
        let v = data[*i..*i + len].to_vec();
        *i += len;
        Ok(v)
    };
    let uid = read_field(payload, &mut i)?;
    let gid = read_field(payload, &mut i)?;
    Ok(NewUnixExtra { version, uid, gid })
}

fn encode_new_unix(u: &NewUnixExtra) -> Vec<u8> {
    let mut out = vec![u.version];
    out.push(u.uid.len() as u8);
    out.extend_from_slice(&u.uid);
    out.push(u.gid.len() as u8);
    out.extend_from_slice(&u.gid);
    out
}

fn decode_unicode(payload: &[u8]) -> Result<UnicodeExtra> {
    if payload.len() < 5 {
        return Err(SZipError::malformed_extra("Unicode extra field too short"));
    }
    Ok(UnicodeExtra {
        crc32: u32::from_le_bytes(payload[1..5].try_into().unwrap()),
        data: payload[5..].to_vec(),
    })
}

fn encode_unicode(u: &UnicodeExtra) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + u.data.len());
    out.push(1); // version
    out.extend_from_slice(&u.crc32.to_le_bytes());
    out.extend_from_slice(&u.data);
    out
}
