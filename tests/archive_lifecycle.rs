//! End-to-end container lifecycle scenarios: build, mount, mutate, rebuild.

use s_zip::compression::{CompressionLevel, Method};
use s_zip::{Container, Data, ZipEntry};
use std::io::Cursor;

fn roundtrip(container: &Container) -> Container {
    let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    container.write_to(&mut buf).unwrap();
    Container::open(Cursor::new(buf.into_inner())).unwrap()
}

#[test]
fn empty_archive_with_comment_round_trips() {
    let mut c = Container::new();
    c.set_archive_comment("nothing to see here").unwrap();

    let reopened = roundtrip(&c);
    assert!(reopened.is_empty());
    assert_eq!(reopened.archive_comment(), "nothing to see here");
}

#[test]
fn directory_entries_round_trip_with_zero_size() {
    let mut c = Container::new();
    c.put(ZipEntry::new_directory("assets").unwrap());
    c.put_bytes("assets/readme.txt", b"hi".to_vec()).unwrap();

    let reopened = roundtrip(&c);
    let dir = reopened.get("assets/").unwrap();
    assert!(dir.is_directory());
    assert_eq!(dir.uncompressed_size(), 0);
    assert_eq!(reopened.get_bytes("assets/readme.txt").unwrap(), b"hi");
}

#[test]
fn zero_byte_entries_round_trip_through_every_method() {
    let mut c = Container::new();
    for (i, method) in [Method::Stored, Method::Deflated, Method::BZip2].into_iter().enumerate() {
        let mut e = ZipEntry::new_file(format!("empty_{i}.bin"), Data::NewBytes(Vec::new())).unwrap();
        e.set_method(method);
        c.put(e);
    }

    let reopened = roundtrip(&c);
    for i in 0..3 {
        let name = format!("empty_{i}.bin");
        assert_eq!(reopened.get_bytes(&name).unwrap(), Vec::<u8>::new());
        assert_eq!(reopened.get(&name).unwrap().crc32(), 0);
    }
}

#[test]
fn utf8_names_round_trip_with_utf8_flag_set() {
    let mut c = Container::new();
    c.put_bytes("データ/ファイル.txt", b"payload".to_vec()).unwrap();

    let reopened = roundtrip(&c);
    let entry = reopened.get("データ/ファイル.txt").unwrap();
    assert!(entry.is_utf8_name());
    assert_eq!(reopened.get_bytes("データ/ファイル.txt").unwrap(), b"payload");
}

#[test]
fn delete_by_regex_removes_only_matching_entries_after_mount() {
    let mut c = Container::new();
    c.put_bytes("keep.txt", b"a".to_vec()).unwrap();
    c.put_bytes(".hidden", b"b".to_vec()).unwrap();
    c.put_bytes(".DS_Store", b"c".to_vec()).unwrap();

    let mut reopened = roundtrip(&c);
    let removed = reopened.delete_by_regex(r"^\.").unwrap();
    assert_eq!(removed, 2);
    assert!(reopened.has("keep.txt"));
    assert!(!reopened.has(".hidden"));
    assert!(!reopened.has(".DS_Store"));

    let twice = roundtrip(&reopened);
    assert_eq!(twice.len(), 1);
    assert_eq!(twice.get_bytes("keep.txt").unwrap(), b"a");
}

#[test]
fn matcher_batch_sets_password_on_selected_entries_only() {
    let mut c = Container::new();
    c.put_bytes("a.txt", b"one".to_vec()).unwrap();
    c.put_bytes("b.txt", b"two".to_vec()).unwrap();
    c.put_bytes("c.txt", b"three".to_vec()).unwrap();

    c.matcher()
        .add("a.txt")
        .add("b.txt")
        .set_password("fleetwide", Some(s_zip::EncryptionMethod::ZipCrypto));

    let mut reopened = roundtrip(&c);
    assert!(reopened.get_bytes("a.txt").is_err());
    assert!(reopened.get_bytes("c.txt").is_ok());

    reopened.set_read_password("fleetwide");
    assert_eq!(reopened.get_bytes("a.txt").unwrap(), b"one");
    assert_eq!(reopened.get_bytes("b.txt").unwrap(), b"two");
    assert_eq!(reopened.get_bytes("c.txt").unwrap(), b"three");
}

#[test]
fn renaming_a_mounted_entry_keeps_unrelated_entries_on_the_copy_path() {
    let mut c = Container::new();
    c.put_bytes("stable.txt", b"untouched".to_vec()).unwrap();
    c.put_bytes("old.txt", b"payload".to_vec()).unwrap();

    let mut reopened = roundtrip(&c);
    reopened.rename("old.txt", "new.txt").unwrap();

    let twice = roundtrip(&reopened);
    assert!(!twice.has("old.txt"));
    assert_eq!(twice.get_bytes("new.txt").unwrap(), b"payload");
    assert_eq!(twice.get_bytes("stable.txt").unwrap(), b"untouched");
}

#[test]
fn max_length_archive_comment_round_trips() {
    let mut c = Container::new();
    let comment = "x".repeat(65_535);
    c.set_archive_comment(comment.clone()).unwrap();
    let reopened = roundtrip(&c);
    assert_eq!(reopened.archive_comment(), comment);
}

#[test]
fn large_deflate_entry_compresses_well_and_round_trips() {
    let mut c = Container::new();
    let mut e = ZipEntry::new_file("log.txt", Data::NewBytes(vec![b'a'; 200_000])).unwrap();
    e.set_method(Method::Deflated);
    e.set_compression_level(CompressionLevel::Maximum);
    c.put(e);

    let reopened = roundtrip(&c);
    assert_eq!(reopened.get_bytes("log.txt").unwrap(), vec![b'a'; 200_000]);
    assert!(reopened.get("log.txt").unwrap().compressed_size() < 500);
}

#[test]
fn revert_all_restores_the_open_time_baseline() {
    let mut c = Container::new();
    c.put_bytes("a.txt", b"original".to_vec()).unwrap();

    let mut reopened = roundtrip(&c);
    reopened.delete("a.txt");
    reopened.put_bytes("b.txt", b"new".to_vec()).unwrap();
    assert!(!reopened.has("a.txt"));

    reopened.revert_all();
    assert!(reopened.has("a.txt"));
    assert!(!reopened.has("b.txt"));
    assert_eq!(reopened.get_bytes("a.txt").unwrap(), b"original");
}
