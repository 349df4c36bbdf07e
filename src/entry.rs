//! Per-entry metadata, extra-field collections, and attached payload source.
//!
//! An entry created while mounting an existing archive carries a
//! [`SourceRange`] pointing back at the reader; one created by
//! [`crate::container::Container::put`] carries owned bytes or a stream.
//! The writer's copy-vs-rebuild decision (spec.md §4.6) hinges on telling
//! these apart.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::byteio::ByteIO;
use crate::compression::{CompressionLevel, Method};
use crate::dos_time::unix_to_dos;
use crate::encryption::AesStrength;
use crate::error::{Result, SZipError};
use crate::extra_field::{ExtraField, ExtraFieldSet, ID_WINZIP_AES};

/// A 32-bit field at or above this value is a ZIP64 sentinel (spec.md §3,
/// §4.6); the true value lives in the ZIP64 extra field.
pub const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

const MAX_NAME_LEN: usize = 65_535;
const MAX_COMMENT_LEN: usize = 65_535;
const MAX_PASSWORD_LEN: usize = 99;

const GPBF_ENCRYPTED: u16 = 1 << 0;
const GPBF_DATA_DESCRIPTOR: u16 = 1 << 3;
const GPBF_UTF8: u16 = 1 << 11;

/// Which cipher, if any, protects an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    None,
    ZipCrypto,
    WinZipAes128,
    WinZipAes192,
    WinZipAes256,
}

impl EncryptionMethod {
    pub fn aes_strength(self) -> Option<AesStrength> {
        match self {
            EncryptionMethod::WinZipAes128 => Some(AesStrength::Aes128),
            EncryptionMethod::WinZipAes192 => Some(AesStrength::Aes192),
            EncryptionMethod::WinZipAes256 => Some(AesStrength::Aes256),
            _ => None,
        }
    }

    pub fn from_aes_strength(strength: AesStrength) -> Self {
        match strength {
            AesStrength::Aes128 => EncryptionMethod::WinZipAes128,
            AesStrength::Aes192 => EncryptionMethod::WinZipAes192,
            AesStrength::Aes256 => EncryptionMethod::WinZipAes256,
        }
    }

    pub fn is_encrypted(self) -> bool {
        !matches!(self, EncryptionMethod::None)
    }
}

/// A reference to an as-yet-unread payload living inside the archive this
/// entry was mounted from. Reading it is deferred until
/// [`crate::container::Container::get_bytes`] is called (spec.md §4.5).
pub struct SourceRange {
    pub reader: Rc<RefCell<dyn ByteIO>>,
    pub local_header_offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl Clone for SourceRange {
    fn clone(&self) -> Self {
        Self {
            reader: Rc::clone(&self.reader),
            local_header_offset: self.local_header_offset,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
        }
    }
}

impl fmt::Debug for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRange")
            .field("local_header_offset", &self.local_header_offset)
            .field("compressed_size", &self.compressed_size)
            .field("uncompressed_size", &self.uncompressed_size)
            .finish_non_exhaustive()
    }
}

/// The entry's payload: either a lazy reference into the source archive, or
/// owned data supplied through the mutation API.
pub enum Data {
    SourceRange(SourceRange),
    NewBytes(Vec<u8>),
    NewStream(Rc<RefCell<dyn ByteIO>>),
    /// Directory entries carry no payload.
    None,
}

impl Clone for Data {
    fn clone(&self) -> Self {
        match self {
            Data::SourceRange(s) => Data::SourceRange(s.clone()),
            Data::NewBytes(b) => Data::NewBytes(b.clone()),
            Data::NewStream(s) => Data::NewStream(Rc::clone(s)),
            Data::None => Data::None,
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::SourceRange(s) => f.debug_tuple("SourceRange").field(s).finish(),
            Data::NewBytes(b) => f.debug_tuple("NewBytes").field(&b.len()).finish(),
            Data::NewStream(_) => f.write_str("NewStream(..)"),
            Data::None => f.write_str("None"),
        }
    }
}

/// One file or directory record in a [`crate::container::Container`].
#[derive(Debug, Clone)]
pub struct ZipEntry {
    name: String,
    created_os: u8,
    extracted_os: u8,
    version_made_by: Option<u16>,
    version_needed: Option<u16>,
    method: Method,
    compression_level: CompressionLevel,
    gpbf: u16,
    dos_date: u16,
    dos_time_field: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    internal_attributes: u16,
    external_attributes: u32,
    lfh_extra: ExtraFieldSet,
    cd_extra: ExtraFieldSet,
    comment: String,
    password: Option<String>,
    encryption_method: EncryptionMethod,
    data: Data,
}

impl ZipEntry {
    /// A new, empty file entry with no payload and no encryption.
    pub fn new_file(name: impl Into<String>, data: Data) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            created_os: 0,
            extracted_os: 0,
            version_made_by: None,
            version_needed: None,
            method: Method::Stored,
            compression_level: CompressionLevel::default(),
            gpbf: GPBF_UTF8,
            dos_date: 0,
            dos_time_field: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            local_header_offset: 0,
            internal_attributes: 0,
            external_attributes: 0,
            lfh_extra: ExtraFieldSet::new(),
            cd_extra: ExtraFieldSet::new(),
            comment: String::new(),
            password: None,
            encryption_method: EncryptionMethod::None,
            data,
        })
    }

    /// A new, empty directory entry (spec.md §3: name ending in `/`,
    /// `Method == Stored`, zero sizes).
    pub fn new_directory(name: impl Into<String>) -> Result<Self> {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        let mut entry = Self::new_file(name, Data::None)?;
        entry.method = Method::Stored;
        Ok(entry)
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    // --- Getters ---------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_os(&self) -> u8 {
        self.created_os
    }

    pub fn extracted_os(&self) -> u8 {
        self.extracted_os
    }

    pub fn version_made_by(&self) -> u16 {
        self.version_made_by.unwrap_or_else(|| self.version_needed_to_extract())
    }

    /// Derives the stored value when unknown, per spec.md §4.3.
    pub fn version_needed_to_extract(&self) -> u16 {
        if let Some(v) = self.version_needed {
            return v;
        }
        if self.method == Method::WinZipAes {
            51
        } else if self.method == Method::BZip2 {
            46
        } else if self.requires_zip64() {
            45
        } else if self.method == Method::Deflated || self.is_directory() {
            20
        } else {
            10
        }
    }

    pub fn requires_zip64(&self) -> bool {
        self.uncompressed_size >= ZIP64_THRESHOLD
            || self.compressed_size >= ZIP64_THRESHOLD
            || self.local_header_offset >= ZIP64_THRESHOLD
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
    }

    pub fn gpbf(&self) -> u16 {
        self.gpbf
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.gpbf & GPBF_DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8_name(&self) -> bool {
        self.gpbf & GPBF_UTF8 != 0
    }

    pub fn dos_time(&self) -> (u16, u16) {
        (self.dos_date, self.dos_time_field)
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn local_header_offset(&self) -> u64 {
        self.local_header_offset
    }

    pub fn internal_attributes(&self) -> u16 {
        self.internal_attributes
    }

    pub fn external_attributes(&self) -> u32 {
        self.external_attributes
    }

    pub fn lfh_extra(&self) -> &ExtraFieldSet {
        &self.lfh_extra
    }

    pub fn cd_extra(&self) -> &ExtraFieldSet {
        &self.cd_extra
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn encryption_method(&self) -> EncryptionMethod {
        self.encryption_method
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Resolves the compression method the payload was (or will be) written
    /// with. A mounted AES-encrypted entry carries `Method::WinZipAes` as an
    /// on-wire marker in `method`; the real method lives in the WinZip AES
    /// extra field instead (spec.md §4.2, §4.5).
    pub fn payload_method(&self) -> Result<Method> {
        if self.method == Method::WinZipAes {
            let extra = self
                .lfh_extra
                .winzip_aes()
                .or_else(|| self.cd_extra.winzip_aes())
                .ok_or_else(|| SZipError::malformed_extra("WinZipAes method set without its extra field"))?;
            Method::from_u16(extra.actual_method)
                .ok_or_else(|| SZipError::UnsupportedMethod(format!("embedded method {}", extra.actual_method)))
        } else {
            Ok(self.method)
        }
    }

    // --- Mutation ops (spec.md §4.3) --------------------------------

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn set_compression_level(&mut self, level: CompressionLevel) {
        self.compression_level = level;
    }

    /// Sets (or clears) the entry password. When `method` is omitted and no
    /// encryption method is currently set, ZipCrypto is assumed — the
    /// source's own default for "just give it a password".
    pub fn set_password(&mut self, password: Option<String>, method: Option<EncryptionMethod>) {
        match password {
            Some(pw) => {
                let truncated = truncate_utf8(&pw, MAX_PASSWORD_LEN);
                let chosen = method.unwrap_or(if self.encryption_method.is_encrypted() {
                    self.encryption_method
                } else {
                    EncryptionMethod::ZipCrypto
                });
                self.encryption_method = chosen;
                self.password = Some(truncated);
                self.gpbf |= GPBF_ENCRYPTED;
            }
            None => {
                self.password = None;
            }
        }
    }

    /// Clears GPBF.bit0, removes the WinZip AES extra, restores `Method` to
    /// the extra's embedded payload method when it was WinZipAES, and
    /// clears the password (spec.md §4.3).
    pub fn disable_encryption(&mut self) {
        self.gpbf &= !GPBF_ENCRYPTED;
        if self.method == Method::WinZipAes {
            let restored = self
                .lfh_extra
                .winzip_aes()
                .and_then(|w| Method::from_u16(w.actual_method))
                .unwrap_or(Method::Stored);
            self.method = restored;
        }
        self.lfh_extra.remove(ID_WINZIP_AES);
        self.cd_extra.remove(ID_WINZIP_AES);
        self.encryption_method = EncryptionMethod::None;
        self.password = None;
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        let comment = comment.into();
        if comment.len() > MAX_COMMENT_LEN {
            return Err(SZipError::InvalidArgument(format!(
                "entry comment is {} bytes, maximum is {MAX_COMMENT_LEN}",
                comment.len()
            )));
        }
        self.comment = comment;
        Ok(())
    }

    pub fn set_time(&mut self, unix_seconds: i64) {
        let (date, time) = unix_to_dos(unix_seconds);
        self.dos_date = date;
        self.dos_time_field = time;
    }

    pub fn set_dos_time(&mut self, date: u16, time: u16) {
        self.dos_date = date;
        self.dos_time_field = time;
    }

    /// Replaces both extra-field collections from a single LFH-style blob.
    /// ZIP64 and WinZip AES subfields are managed internally by the codec
    /// and are dropped from user-supplied bytes rather than trusted.
    pub fn set_extra(&mut self, raw: &[u8]) -> Result<()> {
        let mut decoded = ExtraFieldSet::decode(raw, None)?;
        decoded.remove(crate::extra_field::ID_ZIP64);
        decoded.remove(ID_WINZIP_AES);
        for field in decoded.fields().iter().cloned() {
            self.lfh_extra.set(field.clone());
            self.cd_extra.set(field);
        }
        Ok(())
    }

    /// Returns a copy of this entry under a new name, used by
    /// [`crate::container::Container::rename`].
    pub fn rename(&self, new_name: impl Into<String>) -> Result<ZipEntry> {
        let new_name = new_name.into();
        validate_name(&new_name)?;
        let mut clone = self.clone();
        clone.name = new_name;
        Ok(clone)
    }

    pub(crate) fn set_crc32(&mut self, crc: u32) {
        self.crc32 = crc;
    }

    pub(crate) fn set_sizes(&mut self, compressed: u64, uncompressed: u64) {
        self.compressed_size = compressed;
        self.uncompressed_size = uncompressed;
    }

    pub(crate) fn set_local_header_offset(&mut self, offset: u64) {
        self.local_header_offset = offset;
    }

    pub(crate) fn set_external_attributes(&mut self, attrs: u32) {
        self.external_attributes = attrs;
    }

    pub(crate) fn set_data(&mut self, data: Data) {
        self.data = data;
    }

    pub(crate) fn set_gpbf_bit(&mut self, mask: u16, value: bool) {
        if value {
            self.gpbf |= mask;
        } else {
            self.gpbf &= !mask;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_raw_parts(
        name: String,
        created_os: u8,
        extracted_os: u8,
        version_made_by: u16,
        version_needed: u16,
        method: Method,
        gpbf: u16,
        dos_date: u16,
        dos_time_field: u16,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        local_header_offset: u64,
        internal_attributes: u16,
        external_attributes: u32,
        cd_extra: ExtraFieldSet,
        comment: String,
        data: Data,
    ) -> Self {
        let encryption_method = if gpbf & GPBF_ENCRYPTED != 0 {
            match cd_extra.winzip_aes() {
                Some(w) => EncryptionMethod::from_aes_strength(
                    AesStrength::from_code(w.key_strength).unwrap_or(AesStrength::Aes256),
                ),
                None => EncryptionMethod::ZipCrypto,
            }
        } else {
            EncryptionMethod::None
        };
        Self {
            name,
            created_os,
            extracted_os,
            version_made_by: Some(version_made_by),
            version_needed: Some(version_needed),
            method,
            compression_level: CompressionLevel::default(),
            gpbf,
            dos_date,
            dos_time_field,
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            internal_attributes,
            external_attributes,
            lfh_extra: ExtraFieldSet::new(),
            cd_extra,
            comment,
            password: None,
            encryption_method,
            data,
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(SZipError::InvalidArgument(format!(
            "entry name must be 1..={MAX_NAME_LEN} bytes, got {}",
            name.len()
        )));
    }
    Ok(())
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_needed_follows_method_precedence() {
        let mut e = ZipEntry::new_file("a", Data::None).unwrap();
        assert_eq!(e.version_needed_to_extract(), 10);
        e.set_method(Method::Deflated);
        assert_eq!(e.version_needed_to_extract(), 20);
        e.set_method(Method::BZip2);
        assert_eq!(e.version_needed_to_extract(), 46);
        e.set_method(Method::WinZipAes);
        assert_eq!(e.version_needed_to_extract(), 51);
    }

    #[test]
    fn directory_entry_needs_version_20() {
        let dir = ZipEntry::new_directory("sub").unwrap();
        assert!(dir.is_directory());
        assert_eq!(dir.name(), "sub/");
        assert_eq!(dir.version_needed_to_extract(), 20);
    }

    #[test]
    fn zip64_size_forces_version_45() {
        let mut e = ZipEntry::new_file("big", Data::None).unwrap();
        e.set_sizes(ZIP64_THRESHOLD, ZIP64_THRESHOLD);
        assert!(e.requires_zip64());
        assert_eq!(e.version_needed_to_extract(), 45);
    }

    #[test]
    fn set_password_defaults_to_zipcrypto() {
        let mut e = ZipEntry::new_file("secret", Data::None).unwrap();
        e.set_password(Some("hunter2".into()), None);
        assert_eq!(e.encryption_method(), EncryptionMethod::ZipCrypto);
        assert_eq!(e.password(), Some("hunter2"));
        assert_ne!(e.gpbf() & 0x0001, 0);
    }

    #[test]
    fn password_truncates_to_99_bytes() {
        let mut e = ZipEntry::new_file("secret", Data::None).unwrap();
        let long = "x".repeat(200);
        e.set_password(Some(long), None);
        assert_eq!(e.password().unwrap().len(), 99);
    }

    #[test]
    fn disable_encryption_restores_embedded_method() {
        let mut e = ZipEntry::new_file("secret", Data::None).unwrap();
        e.set_password(Some("pw".into()), Some(EncryptionMethod::WinZipAes256));
        e.set_method(Method::WinZipAes);
        e.lfh_extra.set(ExtraField::WinZipAes(crate::extra_field::WinZipAesExtra {
            vendor_version: 2,
            key_strength: 3,
            actual_method: Method::Deflated.to_u16(),
        }));
        e.disable_encryption();
        assert_eq!(e.method(), Method::Deflated);
        assert_eq!(e.encryption_method(), EncryptionMethod::None);
        assert_eq!(e.password(), None);
        assert_eq!(e.gpbf() & 0x0001, 0);
    }

    #[test]
    fn rename_preserves_other_fields() {
        let mut e = ZipEntry::new_file("old.txt", Data::NewBytes(vec![1, 2, 3])).unwrap();
        e.set_comment("hi").unwrap();
        let renamed = e.rename("new.txt").unwrap();
        assert_eq!(renamed.name(), "new.txt");
        assert_eq!(renamed.comment(), "hi");
    }

    #[test]
    fn comment_over_limit_is_rejected() {
        let mut e = ZipEntry::new_file("a", Data::None).unwrap();
        assert!(e.set_comment("x".repeat(70_000)).is_err());
    }
}
