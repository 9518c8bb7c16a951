//! Performance benchmarks for Modbus RTU frame handling.
//!
//! The poll loop runs one transaction per coil, so encode and parse
//! cost sits on the hot path of every locker open.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench modbus_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use lockbay_core::SlaveAddress;
use lockbay_modbus::frame::FunctionCode;
use lockbay_modbus::response::coils_response;
use lockbay_modbus::{crc16, parse_response, request};

fn slave() -> SlaveAddress {
    SlaveAddress::new(1).unwrap()
}

/// Benchmark the checksum over typical frame sizes.
fn bench_crc16(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc16");

    for size in [8usize, 64, 256].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        let data = vec![0xA5u8; *size];
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let crc = crc16(black_box(&data));
                black_box(crc);
            });
        });
    }

    group.finish();
}

/// Benchmark encoding a single-coil write request.
fn bench_encode_single_coil(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_single_coil");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_single_coil", |b| {
        b.iter(|| {
            let frame = request::write_single_coil(black_box(slave()), black_box(4), true);
            black_box(frame);
        });
    });

    group.finish();
}

/// Benchmark encoding multi-coil writes across channel counts.
fn bench_encode_multiple_coils(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_multiple_coils");

    for coils in [1usize, 8, 16].iter() {
        group.throughput(Throughput::Elements(*coils as u64));

        let states = vec![true; *coils];
        group.bench_with_input(BenchmarkId::from_parameter(coils), coils, |b, _| {
            b.iter(|| {
                let frame = request::write_multiple_coils(black_box(slave()), 0, &states).unwrap();
                black_box(frame);
            });
        });
    }

    group.finish();
}

/// Benchmark parsing a write echo, the response of every pulse edge.
fn bench_parse_echo(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_echo");
    group.throughput(Throughput::Elements(1));

    let echo = request::write_single_coil(slave(), 4, true);

    group.bench_function("parse_coil_write_echo", |b| {
        b.iter(|| {
            let parsed =
                parse_response(slave(), FunctionCode::WriteSingleCoil, black_box(&echo)).unwrap();
            black_box(parsed);
        });
    });

    group.finish();
}

/// Benchmark parsing coil read responses across card sizes.
fn bench_parse_coils_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_coils_response");

    for coils in [8usize, 16, 64].iter() {
        group.throughput(Throughput::Elements(*coils as u64));

        let states = vec![false; *coils];
        let frame = coils_response(slave(), &states);

        group.bench_with_input(BenchmarkId::from_parameter(coils), coils, |b, _| {
            b.iter(|| {
                let parsed =
                    parse_response(slave(), FunctionCode::ReadCoils, black_box(&frame)).unwrap();
                black_box(parsed);
            });
        });
    }

    group.finish();
}

/// Benchmark a full master-side transaction: encode the request, then
/// validate and decode the echo.
fn bench_transaction_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction_roundtrip");
    group.throughput(Throughput::Elements(1));

    group.bench_function("encode_and_parse_echo", |b| {
        b.iter(|| {
            let frame = request::write_single_coil(black_box(slave()), 4, true);
            let parsed = parse_response(slave(), FunctionCode::WriteSingleCoil, &frame).unwrap();
            black_box(parsed);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_crc16,
    bench_encode_single_coil,
    bench_encode_multiple_coils,
    bench_parse_echo,
    bench_parse_coils_response,
    bench_transaction_roundtrip,
);

criterion_main!(benches);
