//! Per-entry encryption scenarios across the container's public API.

use s_zip::{Container, Data, EncryptionMethod, ZipEntry};
use std::io::Cursor;

fn roundtrip(container: &Container) -> Container {
    let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    container.write_to(&mut buf).unwrap();
    Container::open(Cursor::new(buf.into_inner())).unwrap()
}

#[test]
fn winzip_aes_128_and_192_round_trip_alongside_256() {
    let mut c = Container::new();
    for (name, strength) in [
        ("a128.bin", EncryptionMethod::WinZipAes128),
        ("a192.bin", EncryptionMethod::WinZipAes192),
        ("a256.bin", EncryptionMethod::WinZipAes256),
    ] {
        let mut e = ZipEntry::new_file(name, Data::NewBytes(b"confidential".to_vec())).unwrap();
        e.set_password(Some("shared-pw".into()), Some(strength));
        c.put(e);
    }

    let mut reopened = roundtrip(&c);
    reopened.set_read_password("shared-pw");
    for name in ["a128.bin", "a192.bin", "a256.bin"] {
        assert_eq!(reopened.get_bytes(name).unwrap(), b"confidential");
    }
}

#[test]
fn per_entry_password_differs_from_container_default() {
    let mut c = Container::new();
    let mut a = ZipEntry::new_file("a.txt", Data::NewBytes(b"alpha".to_vec())).unwrap();
    a.set_password(Some("password-a".into()), Some(EncryptionMethod::ZipCrypto));
    c.put(a);
    let mut b = ZipEntry::new_file("b.txt", Data::NewBytes(b"beta".to_vec())).unwrap();
    b.set_password(Some("password-b".into()), Some(EncryptionMethod::ZipCrypto));
    c.put(b);

    let mut reopened = roundtrip(&c);
    reopened.set_read_password_entry("a.txt", "password-a").unwrap();
    reopened.set_read_password_entry("b.txt", "password-b").unwrap();
    assert_eq!(reopened.get_bytes("a.txt").unwrap(), b"alpha");
    assert_eq!(reopened.get_bytes("b.txt").unwrap(), b"beta");
}

#[test]
fn disabling_encryption_writes_out_plaintext() {
    let mut c = Container::new();
    let mut e = ZipEntry::new_file("secret.txt", Data::NewBytes(b"not so secret anymore".to_vec())).unwrap();
    e.set_password(Some("pw".into()), Some(EncryptionMethod::WinZipAes256));
    c.put(e);

    let mut reopened = roundtrip(&c);
    reopened.get_mut("secret.txt").unwrap().disable_encryption();

    let twice = roundtrip(&reopened);
    assert_eq!(twice.get("secret.txt").unwrap().encryption_method(), EncryptionMethod::None);
    assert_eq!(twice.get_bytes("secret.txt").unwrap(), b"not so secret anymore");
}

#[test]
fn short_aes_payload_uses_ae2_and_skips_the_plaintext_crc() {
    // Under 20 bytes triggers the AE-2 vendor version, which stores a zero
    // CRC and relies solely on the HMAC tail for integrity.
    let mut c = Container::new();
    let mut e = ZipEntry::new_file("tiny.bin", Data::NewBytes(b"hi".to_vec())).unwrap();
    e.set_password(Some("pw".into()), Some(EncryptionMethod::WinZipAes256));
    c.put(e);

    let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    c.write_to(&mut buf).unwrap();
    let mut reopened = Container::open(Cursor::new(buf.into_inner())).unwrap();
    assert_eq!(reopened.get("tiny.bin").unwrap().crc32(), 0);
    reopened.set_read_password("pw");
    assert_eq!(reopened.get_bytes("tiny.bin").unwrap(), b"hi");
}
