//! Error types for s-zip

/// Result type for s-zip operations
pub type Result<T> = std::result::Result<T, SZipError>;

/// Error taxonomy covering the binary codec, the per-entry pipeline, and the
/// container's mutation API.
#[derive(Debug, thiserror::Error)]
pub enum SZipError {
    /// Underlying byte source/sink failure (short read, seek failure).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No End-of-Central-Directory record could be located.
    #[error("not a zip file: end of central directory record not found")]
    NotZip,

    /// Archive declares disk-spanning, which this crate does not implement.
    #[error("multi-disk (spanned) archives are not supported")]
    SpanningUnsupported,

    /// A fixed header had the wrong signature at its expected offset.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// An extra field's length ran past the end of its blob, or a typed
    /// extra field failed its own validation.
    #[error("malformed extra field: {0}")]
    MalformedExtra(String),

    /// The compression or encryption method is recognized but not
    /// implemented by this crate.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The decoded plaintext's CRC-32 did not match the stored CRC-32.
    #[error("CRC-32 mismatch for entry `{name}`: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        /// Name of the offending entry.
        name: String,
        /// CRC-32 recorded in the archive.
        expected: u32,
        /// CRC-32 computed from the decoded plaintext.
        actual: u32,
    },

    /// The supplied password failed verification (ZipCrypto check byte,
    /// AES password verifier, or an AE-2 HMAC mismatch masquerading as a
    /// checksum failure).
    #[error("wrong password for entry `{name}`")]
    WrongPassword {
        /// Name of the offending entry.
        name: String,
    },

    /// The WinZip AES HMAC-SHA1 authentication tail did not match, even
    /// though the password verifier matched.
    #[error("authentication failed for entry `{name}`: archive may be corrupted")]
    AuthenticationFailed {
        /// Name of the offending entry.
        name: String,
    },

    /// No entry with this name exists in the container.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A rename or put would collide with an existing entry name.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// A name, comment, extra field, or compression level argument was out
    /// of the range the format allows.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SZipError {
    pub(crate) fn malformed_header(what: impl Into<String>) -> Self {
        Self::MalformedHeader(what.into())
    }

    pub(crate) fn malformed_extra(what: impl Into<String>) -> Self {
        Self::MalformedExtra(what.into())
    }
}
