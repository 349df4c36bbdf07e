use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use s_zip::compression::{CompressionLevel, Method};
use s_zip::{Container, Data, ZipEntry};
use std::io::Cursor;

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = 0x1234_5678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        data.push((state >> 16) as u8);
    }
    data
}

fn write_one(data: &[u8], method: Method, level: CompressionLevel) -> Vec<u8> {
    let mut container = Container::new();
    let mut entry = ZipEntry::new_file("test.bin", Data::NewBytes(data.to_vec())).unwrap();
    entry.set_method(method);
    entry.set_compression_level(level);
    container.put(entry);

    let mut out: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    container.write_to(&mut out).unwrap();
    out.into_inner()
}

fn write_many(count: usize, data: &[u8], method: Method, level: CompressionLevel) -> Vec<u8> {
    let mut container = Container::new();
    for i in 0..count {
        let mut entry = ZipEntry::new_file(format!("file_{i}.txt"), Data::NewBytes(data.to_vec())).unwrap();
        entry.set_method(method);
        entry.set_compression_level(level);
        container.put(entry);
    }

    let mut out: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    container.write_to(&mut out).unwrap();
    out.into_inner()
}

fn bench_compression_methods(c: &mut Criterion) {
    let sizes = vec![
        1024,             // 1KB
        10 * 1024,        // 10KB
        100 * 1024,       // 100KB
        1024 * 1024,      // 1MB
        10 * 1024 * 1024, // 10MB
    ];

    for size in sizes {
        let mut group = c.benchmark_group(format!("write_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);

        group.bench_with_input(BenchmarkId::new("stored", size), &data, |b, data| {
            b.iter(|| write_one(black_box(data), Method::Stored, CompressionLevel::Normal));
        });

        group.bench_with_input(BenchmarkId::new("deflate_normal", size), &data, |b, data| {
            b.iter(|| write_one(black_box(data), Method::Deflated, CompressionLevel::Normal));
        });

        group.bench_with_input(BenchmarkId::new("deflate_maximum", size), &data, |b, data| {
            b.iter(|| write_one(black_box(data), Method::Deflated, CompressionLevel::Maximum));
        });

        group.bench_with_input(BenchmarkId::new("bzip2", size), &data, |b, data| {
            b.iter(|| write_one(black_box(data), Method::BZip2, CompressionLevel::Normal));
        });

        group.finish();
    }
}

fn bench_random_data_compression(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024]; // 100KB, 1MB

    for size in sizes {
        let mut group = c.benchmark_group(format!("write_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);

        group.bench_with_input(BenchmarkId::new("deflate_normal", size), &data, |b, data| {
            b.iter(|| write_one(black_box(data), Method::Deflated, CompressionLevel::Normal));
        });

        group.bench_with_input(BenchmarkId::new("bzip2", size), &data, |b, data| {
            b.iter(|| write_one(black_box(data), Method::BZip2, CompressionLevel::Normal));
        });

        group.finish();
    }
}

fn bench_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024; // 10KB per entry
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| write_many(entry_count, black_box(&data), Method::Deflated, CompressionLevel::Normal));
    });

    group.bench_function("bzip2_100_entries", |b| {
        b.iter(|| write_many(entry_count, black_box(&data), Method::BZip2, CompressionLevel::Normal));
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(
    benches,
    bench_compression_methods,
    bench_random_data_compression,
    bench_multiple_entries
);
criterion_main!(benches);
