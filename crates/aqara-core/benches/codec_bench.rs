//! Criterion benchmarks for the envelope codec and write-key derivation.
//!
//! Run with:
//! ```bash
//! cargo bench --package aqara-core --bench codec_bench
//! ```

use aqara_core::{decode_envelope, decode_report, derive_auth_token, FieldMap, FieldValue, Request};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Datagram fixtures ─────────────────────────────────────────────────────────

const MAGNET_REPORT: &[u8] =
    br#"{"cmd":"report","model":"magnet","sid":"158d0001","short_id":4343,"data":"{\"status\":\"open\"}"}"#;

const PLUG_READ_ACK: &[u8] = br#"{"cmd":"read_ack","model":"plug","sid":"158d0002","short_id":1,"data":"{\"voltage\":3600,\"status\":\"on\",\"inuse\":\"1\",\"power_consumed\":\"48\",\"load_power\":\"3.20\"}"}"#;

const HEARTBEAT: &[u8] = br#"{"cmd":"heartbeat","model":"gateway","sid":"f0b429aa1463","short_id":"0","token":"1234567890abcdef","data":"{\"ip\":\"192.168.1.20\"}"}"#;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, bytes) in [
        ("magnet_report", MAGNET_REPORT),
        ("plug_read_ack", PLUG_READ_ACK),
        ("heartbeat", HEARTBEAT),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), bytes, |b, bytes| {
            b.iter(|| decode_envelope(black_box(bytes)))
        });
    }
    group.finish();

    c.bench_function("decode_report/plug", |b| {
        b.iter(|| decode_report(black_box(PLUG_READ_ACK)))
    });
}

fn bench_encode_write(c: &mut Criterion) {
    let mut data = FieldMap::new();
    data.insert("rgb".into(), FieldValue::Int(0x64ff0000));
    c.bench_function("encode/write", |b| {
        b.iter(|| {
            Request::Write {
                sid: black_box("f0b429aa1463"),
                data: &data,
                key: "3eb43e37c20aff4c5872cc0d04d81314",
            }
            .encode()
        })
    });
}

fn bench_derive(c: &mut Criterion) {
    c.bench_function("derive_auth_token", |b| {
        b.iter(|| derive_auth_token(black_box("0987654321qwerty"), black_box("1234567890abcdef")))
    });
}

criterion_group!(benches, bench_decode, bench_encode_write, bench_derive);
criterion_main!(benches);
