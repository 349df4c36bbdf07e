//! ZipCrypto (legacy PKWARE stream cipher) and WinZip AES-CTR encryption.
//!
//! The ZipCrypto key-schedule and CRC-32 table come straight from APPNOTE
//! §6.1. The WinZip AES key derivation and CTR counter convention are
//! grounded on the read side of a production unzip library in this corpus
//! (`ctxunzip::crypto`), which gets the counter direction right where a
//! naive port does not: the 16-byte counter is little-endian and starts at
//! 1, not 0.

use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use getrandom::getrandom;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use tracing::debug;

use crate::error::{Result, SZipError};

type HmacSha1 = Hmac<Sha1>;

// --- ZipCrypto -------------------------------------------------------

const ZIPCRYPTO_HEADER_LEN: usize = 12;

/// The three 32-bit keys that drive the PKWARE stream cipher, mixed with
/// one plaintext byte at a time.
#[derive(Debug, Clone, Copy)]
struct ZipCryptoKeys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl ZipCryptoKeys {
    fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            k0: 0x12345678,
            k1: 0x23456789,
            k2: 0x34567890,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, plaintext_byte: u8) {
        self.k0 = crc32_update(self.k0, plaintext_byte);
        self.k1 = self.k1.wrapping_add(self.k0 & 0xff);
        self.k1 = self.k1.wrapping_mul(134_775_813).wrapping_add(1);
        self.k2 = crc32_update(self.k2, (self.k1 >> 24) as u8);
    }

    fn keystream_byte(&self) -> u8 {
        let temp = (self.k2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.keystream_byte();
        self.update(plain);
        plain
    }

    fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.keystream_byte();
        self.update(plain);
        cipher
    }
}

fn crc32_update(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc as u8) ^ byte) as usize] ^ (crc >> 8)
}

const CRC32_TABLE: [u32; 256] = crc32_table();

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut j = 0;
        while j < 8 {
            c = if c & 1 != 0 {
                0xedb8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            j += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// Decrypts a ZipCrypto-protected entry. Construct with the raw 12-byte
/// header read from the start of the payload; `new` verifies the password
/// and fails with `WrongPassword` on a checksum mismatch.
pub struct ZipCryptoDecryptor {
    keys: ZipCryptoKeys,
}

impl ZipCryptoDecryptor {
    /// `check_byte` is the high byte of the CRC-32, or, when the CRC was
    /// unknown at write time because a data descriptor is used, the high
    /// byte of the DOS time.
    pub fn new(
        password: &[u8],
        header: &[u8; ZIPCRYPTO_HEADER_LEN],
        check_byte: u8,
        entry_name: &str,
    ) -> Result<Self> {
        let mut keys = ZipCryptoKeys::new(password);
        let mut decoded = [0u8; ZIPCRYPTO_HEADER_LEN];
        for (i, &c) in header.iter().enumerate() {
            decoded[i] = keys.decrypt_byte(c);
        }
        if decoded[ZIPCRYPTO_HEADER_LEN - 1] != check_byte {
            return Err(SZipError::WrongPassword {
                name: entry_name.to_string(),
            });
        }
        Ok(Self { keys })
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            *b = self.keys.decrypt_byte(*b);
        }
    }
}

/// Encrypts an entry with ZipCrypto for the write path. `new` generates the
/// random 12-byte header (last byte set to `check_byte`) and returns both
/// the encryptor and the already-encrypted header to prepend to the
/// ciphertext payload.
pub struct ZipCryptoEncryptor {
    keys: ZipCryptoKeys,
}

impl ZipCryptoEncryptor {
    pub fn new(password: &[u8], check_byte: u8) -> Result<(Self, [u8; ZIPCRYPTO_HEADER_LEN])> {
        let mut keys = ZipCryptoKeys::new(password);
        let mut header = [0u8; ZIPCRYPTO_HEADER_LEN];
        getrandom(&mut header[..ZIPCRYPTO_HEADER_LEN - 1]).map_err(io_err)?;
        header[ZIPCRYPTO_HEADER_LEN - 1] = check_byte;
        let mut encrypted = [0u8; ZIPCRYPTO_HEADER_LEN];
        for (i, &p) in header.iter().enumerate() {
            encrypted[i] = keys.encrypt_byte(p);
        }
        Ok((Self { keys }, encrypted))
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            *b = self.keys.encrypt_byte(*b);
        }
    }
}

fn io_err(e: getrandom::Error) -> SZipError {
    SZipError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

// --- WinZip AES --------------------------------------------------------

/// AES key strength for WinZip encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesStrength {
    Aes128,
    Aes192,
    Aes256,
}

impl AesStrength {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(AesStrength::Aes128),
            2 => Ok(AesStrength::Aes192),
            3 => Ok(AesStrength::Aes256),
            other => Err(SZipError::malformed_extra(format!(
                "unknown WinZip AES key strength code {other}"
            ))),
        }
    }

    pub fn to_code(self) -> u8 {
        match self {
            AesStrength::Aes128 => 1,
            AesStrength::Aes192 => 2,
            AesStrength::Aes256 => 3,
        }
    }

    pub fn key_size(self) -> usize {
        match self {
            AesStrength::Aes128 => 16,
            AesStrength::Aes192 => 24,
            AesStrength::Aes256 => 32,
        }
    }

    pub fn salt_size(self) -> usize {
        self.key_size() / 2
    }

    /// key + hmac-key + 2-byte password verifier.
    fn derived_len(self) -> usize {
        self.key_size() * 2 + 2
    }
}

fn make_cipher(strength: AesStrength, key: &[u8]) -> Box<dyn StreamCipher> {
    let iv = 1u128.to_le_bytes();
    match strength {
        AesStrength::Aes128 => Box::new(ctr::Ctr128LE::<Aes128>::new(key.into(), iv.as_slice().into())),
        AesStrength::Aes192 => Box::new(ctr::Ctr128LE::<Aes192>::new(key.into(), iv.as_slice().into())),
        AesStrength::Aes256 => Box::new(ctr::Ctr128LE::<Aes256>::new(key.into(), iv.as_slice().into())),
    }
}

fn derive_keys(password: &[u8], salt: &[u8], strength: AesStrength) -> Vec<u8> {
    let mut derived = vec![0u8; strength.derived_len()];
    pbkdf2_hmac::<Sha1>(password, salt, 1000, &mut derived);
    derived
}

/// Decrypts and authenticates a WinZip AES entry.
///
/// `new` derives keys from `salt` and verifies `password_verifier` before
/// any ciphertext is touched.
pub struct WinZipAesDecryptor {
    cipher: Box<dyn StreamCipher>,
    hmac: HmacSha1,
}

impl WinZipAesDecryptor {
    pub fn new(
        password: &[u8],
        strength: AesStrength,
        salt: &[u8],
        password_verifier: &[u8; 2],
        entry_name: &str,
    ) -> Result<Self> {
        let derived = derive_keys(password, salt, strength);
        let key_size = strength.key_size();
        let crypt_key = &derived[..key_size];
        let sign_key = &derived[key_size..key_size * 2];
        let verify = &derived[key_size * 2..key_size * 2 + 2];
        if verify != password_verifier {
            return Err(SZipError::WrongPassword {
                name: entry_name.to_string(),
            });
        }
        debug!(entry = entry_name, "WinZip AES password verifier matched");
        let hmac = HmacSha1::new_from_slice(sign_key).expect("HMAC accepts any key length");
        Ok(Self {
            cipher: make_cipher(strength, crypt_key),
            hmac,
        })
    }

    /// Decrypts in place and feeds the ciphertext into the running HMAC
    /// (the HMAC is computed over ciphertext).
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.hmac.update(data);
        self.cipher.apply_keystream(data);
    }

    /// Checks the 10-byte authentication tail once the whole entry has been
    /// fed through `decrypt`.
    pub fn verify(self, tail: &[u8; 10], entry_name: &str) -> Result<()> {
        let computed = self.hmac.finalize().into_bytes();
        if &computed[..10] != tail {
            return Err(SZipError::AuthenticationFailed {
                name: entry_name.to_string(),
            });
        }
        Ok(())
    }
}

/// Encrypts a WinZip AES entry for the write path.
pub struct WinZipAesEncryptor {
    cipher: Box<dyn StreamCipher>,
    hmac: HmacSha1,
}

impl WinZipAesEncryptor {
    /// Generates a random salt, derives keys, and returns the encryptor
    /// along with `(salt, password_verifier)` to prepend to the ciphertext.
    pub fn new(password: &[u8], strength: AesStrength) -> Result<(Self, Vec<u8>, [u8; 2])> {
        let mut salt = vec![0u8; strength.salt_size()];
        getrandom(&mut salt).map_err(io_err)?;
        let derived = derive_keys(password, &salt, strength);
        let key_size = strength.key_size();
        let crypt_key = &derived[..key_size];
        let sign_key = &derived[key_size..key_size * 2];
        let mut verifier = [0u8; 2];
        verifier.copy_from_slice(&derived[key_size * 2..key_size * 2 + 2]);
        let hmac = HmacSha1::new_from_slice(sign_key).expect("HMAC accepts any key length");
        Ok((
            Self {
                cipher: make_cipher(strength, crypt_key),
                hmac,
            },
            salt,
            verifier,
        ))
    }

    /// Encrypts in place, feeding the resulting ciphertext into the running
    /// HMAC.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
        self.hmac.update(data);
    }

    /// Finishes and returns the 10-byte authentication tail to append after
    /// the ciphertext.
    pub fn finalize(self) -> [u8; 10] {
        let mac = self.hmac.finalize().into_bytes();
        let mut tail = [0u8; 10];
        tail.copy_from_slice(&mac[..10]);
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zipcrypto_round_trip() {
        let password = b"hunter2";
        let plaintext = b"a bit of plaintext to push through the cipher";
        let check_byte = 0x42;

        let (mut enc, header) = ZipCryptoEncryptor::new(password, check_byte).unwrap();
        let mut ciphertext = plaintext.to_vec();
        enc.encrypt(&mut ciphertext);

        let mut dec = ZipCryptoDecryptor::new(password, &header, check_byte, "x").unwrap();
        let mut decrypted = ciphertext.clone();
        dec.decrypt(&mut decrypted);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn zipcrypto_wrong_password_is_detected() {
        let (mut enc, header) = ZipCryptoEncryptor::new(b"correct horse", 0x99).unwrap();
        let mut ciphertext = b"secret".to_vec();
        enc.encrypt(&mut ciphertext);

        let result = ZipCryptoDecryptor::new(b"wrong password", &header, 0x99, "entry");
        assert!(result.is_err());
    }

    #[test]
    fn winzip_aes_ctr_matches_known_vector() {
        // Same key/ciphertext as a pinned vector in ctxunzip's own crypto
        // tests, confirming the counter convention (LE, starts at 1) is
        // right rather than the all-zero IV a naive port would use.
        let key: [u8; 32] = [
            225, 71, 221, 157, 162, 57, 192, 82, 56, 101, 51, 45, 172, 192, 146, 140, 93, 190, 29,
            105, 244, 114, 202, 55, 50, 151, 127, 12, 136, 219, 34, 112,
        ];
        let mut data = *b"\x05\x18\x4d\x1f\xfb\xdc\x7b\x30\x89\x61\xd5\xf4\x63\x26\x0e\xf3\x9b\xa9\xb7\xf8\x32\xcb\x31\x5f\x95\x4d\xbc\x1d\x81\x6b\x08\x2c";
        let mut cipher = make_cipher(AesStrength::Aes256, &key);
        cipher.apply_keystream(&mut data);
        assert_eq!(&data, b"0123456789abcdef\nHello world!!1\n");
    }

    #[test]
    fn winzip_aes_round_trip_all_strengths() {
        for strength in [AesStrength::Aes128, AesStrength::Aes192, AesStrength::Aes256] {
            let password = b"correct password";
            let plaintext = b"The quick brown fox jumps over the lazy dog";

            let (mut enc, salt, verifier) = WinZipAesEncryptor::new(password, strength).unwrap();
            let mut ciphertext = plaintext.to_vec();
            enc.encrypt(&mut ciphertext);
            let tail = enc.finalize();

            let mut dec =
                WinZipAesDecryptor::new(password, strength, &salt, &verifier, "entry").unwrap();
            let mut decrypted = ciphertext.clone();
            dec.decrypt(&mut decrypted);
            dec.verify(&tail, "entry").unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn winzip_aes_wrong_password_fails_verifier() {
        let (enc, salt, verifier) = WinZipAesEncryptor::new(b"right", AesStrength::Aes256).unwrap();
        drop(enc);
        let result = WinZipAesDecryptor::new(b"wrong", AesStrength::Aes256, &salt, &verifier, "e");
        assert!(result.is_err());
    }
}
