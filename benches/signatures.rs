//! Benchmarks for the signature decoder and native binding keys.

extern crate dotrun;

use criterion::{criterion_group, criterion_main, Criterion};
use dotrun::{
    emulation::runtime::native_key,
    metadata::signatures::{
        parse_local_var_signature, parse_method_signature, parse_method_spec_signature,
        parse_type_spec_signature,
    },
};
use std::hint::black_box;

/// `void Console.WriteLine(string)` as referenced through a MemberRef.
const WRITE_LINE: [u8; 4] = [0x00, 0x01, 0x01, 0x0E];

fn bench_method_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("method_signature");

    #[rustfmt::skip]
    let cases: [(&str, &[u8]); 5] = [
        ("void", &[0x00, 0x00, 0x01]),
        ("primitives", &[0x00, 0x03, 0x08, 0x08, 0x0E, 0x02]),
        ("instance_byref", &[0x20, 0x02, 0x01, 0x10, 0x08, 0x10, 0x0E]),
        ("generic", &[0x30, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00]),
        ("main", &[0x00, 0x01, 0x08, 0x1D, 0x0E]),
    ];

    for (name, signature) in cases {
        group.bench_function(name, |b| {
            b.iter(|| black_box(parse_method_signature(black_box(signature)).unwrap()));
        });
    }
    group.finish();
}

fn bench_local_signatures(c: &mut Criterion) {
    // LOCAL_SIG, 6 locals: int32, int64, string, int32[], pinned byref uint8, class TypeRef
    let signature = [
        0x07, 0x06, 0x08, 0x0A, 0x0E, 0x1D, 0x08, 0x45, 0x10, 0x05, 0x12, 0x49,
    ];

    c.bench_function("local_var_signature", |b| {
        b.iter(|| black_box(parse_local_var_signature(black_box(&signature)).unwrap()));
    });
}

fn bench_spec_signatures(c: &mut Criterion) {
    // GENERICINST CLASS TypeRef<int32, string>
    let type_spec = [0x15, 0x12, 0x49, 0x02, 0x08, 0x0E];
    // GENERICINST, 2 arguments: int64, object
    let method_spec = [0x0A, 0x02, 0x0A, 0x1C];

    c.bench_function("type_spec_signature", |b| {
        b.iter(|| black_box(parse_type_spec_signature(black_box(&type_spec)).unwrap()));
    });
    c.bench_function("method_spec_signature", |b| {
        b.iter(|| black_box(parse_method_spec_signature(black_box(&method_spec)).unwrap()));
    });
}

fn bench_native_key(c: &mut Criterion) {
    let signature = parse_method_signature(&WRITE_LINE).unwrap();

    c.bench_function("native_key", |b| {
        b.iter(|| black_box(native_key(black_box("WriteLine"), &signature)));
    });
}

criterion_group!(
    benches,
    bench_method_signatures,
    bench_local_signatures,
    bench_spec_signatures,
    bench_native_key
);
criterion_main!(benches);
