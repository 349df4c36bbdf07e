//! # s-zip: a pure-Rust ZIP container library
//!
//! `s-zip` mounts an existing archive (or starts an empty one), lets you
//! inspect, add, rename, delete, and re-encrypt entries in memory, and
//! serializes the result back out. It implements the LFH/CD/EOCD/ZIP64
//! binary layout directly rather than shelling out to a host platform's zip
//! support, and supports Stored/Deflate/BZip2 compression alongside
//! ZipCrypto and WinZip AES (128/192/256-bit) encryption.
//!
//! ## Quick start
//!
//! ### Building an archive from scratch
//!
//! ```
//! use s_zip::Container;
//! use std::io::Cursor;
//!
//! let mut container = Container::new();
//! container.put_bytes("hello.txt", b"Hello, World!".to_vec())?;
//!
//! let mut out: Cursor<Vec<u8>> = Cursor::new(Vec::new());
//! container.write_to(&mut out)?;
//! # Ok::<(), s_zip::SZipError>(())
//! ```
//!
//! ### Reading one back
//!
//! ```
//! use s_zip::Container;
//! use std::io::Cursor;
//!
//! # let mut seed = Container::new();
//! # seed.put_bytes("hello.txt", b"Hello, World!".to_vec())?;
//! # let mut archive: Cursor<Vec<u8>> = Cursor::new(Vec::new());
//! # seed.write_to(&mut archive)?;
//! let container = Container::open(Cursor::new(archive.into_inner()))?;
//! for name in container.names() {
//!     println!("{name}: {} bytes", container.get(name).unwrap().uncompressed_size());
//! }
//! assert_eq!(container.get_bytes("hello.txt")?, b"Hello, World!");
//! # Ok::<(), s_zip::SZipError>(())
//! ```

pub mod byteio;
pub mod codec;
pub mod compression;
pub mod container;
pub mod dos_time;
pub mod encryption;
pub mod entry;
pub mod error;
pub mod extra_field;

pub use byteio::ByteIO;
pub use compression::{CompressionLevel, Method};
pub use container::{Container, Matcher};
pub use encryption::AesStrength;
pub use entry::{Data, EncryptionMethod, ZipEntry};
pub use error::{Result, SZipError};
