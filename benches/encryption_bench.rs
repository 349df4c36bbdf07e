use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use s_zip::encryption::{AesStrength, WinZipAesEncryptor};
use s_zip::{Container, Data, EncryptionMethod, ZipEntry};
use std::io::Cursor;

fn generate_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let pattern = b"This is a test pattern that repeats. Lorem ipsum dolor sit amet. ";
    for _ in 0..(size / pattern.len() + 1) {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn write_one(data: &[u8], password: Option<&str>, method: Option<EncryptionMethod>) -> Vec<u8> {
    let mut container = Container::new();
    let mut entry = ZipEntry::new_file("test.txt", Data::NewBytes(data.to_vec())).unwrap();
    if let Some(pw) = password {
        entry.set_password(Some(pw.to_string()), method);
    }
    container.put(entry);

    let mut out: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    container.write_to(&mut out).unwrap();
    out.into_inner()
}

fn bench_encryption(c: &mut Criterion) {
    let sizes = vec![1024, 10 * 1024, 100 * 1024, 1024 * 1024]; // 1KB, 10KB, 100KB, 1MB

    let mut group = c.benchmark_group("encryption_overhead");

    for size in sizes {
        let data = generate_data(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("no_encryption", size), &data, |b, data| {
            b.iter(|| write_one(black_box(data), None, None));
        });

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("zipcrypto_encryption", size),
            &data,
            |b, data| {
                b.iter(|| {
                    write_one(
                        black_box(data),
                        Some("benchmark_password_123"),
                        Some(EncryptionMethod::ZipCrypto),
                    )
                });
            },
        );

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("aes256_encryption", size),
            &data,
            |b, data| {
                b.iter(|| {
                    write_one(
                        black_box(data),
                        Some("benchmark_password_123"),
                        Some(EncryptionMethod::WinZipAes256),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_memory_usage(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_usage");

    let large_data = generate_data(10 * 1024 * 1024);

    group.bench_function("10mb_no_encryption", |b| {
        b.iter(|| write_one(black_box(&large_data), None, None));
    });

    group.bench_function("10mb_aes256_encryption", |b| {
        b.iter(|| {
            write_one(
                black_box(&large_data),
                Some("test_password"),
                Some(EncryptionMethod::WinZipAes256),
            )
        });
    });

    group.finish();
}

fn bench_pbkdf2_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");

    group.bench_function("pbkdf2_1000_iterations_aes256", |b| {
        b.iter(|| WinZipAesEncryptor::new(black_box(b"test_password_123"), AesStrength::Aes256).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encryption,
    bench_memory_usage,
    bench_pbkdf2_overhead
);
criterion_main!(benches);
