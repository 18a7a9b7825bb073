//! Criterion benchmarks for the ButtonBox binary codec.
//!
//! Encoding runs on every button tap, so both directions must stay well
//! under a millisecond to keep the tap-to-datagram path imperceptible.
//!
//! Run with:
//! ```bash
//! cargo bench --package buttonbox-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use buttonbox_core::protocol::codec::{decode_message, encode_message};
use buttonbox_core::protocol::messages::{Command, ModifierFlags, PressKind, WireMessage};

// ── Message fixtures ──────────────────────────────────────────────────────────

fn make_key_tap() -> WireMessage {
    WireMessage::Command(Command::KeyEvent {
        key: "w".to_string(),
        modifiers: ModifierFlags(ModifierFlags::LEFT_SHIFT),
        press: PressKind::Tap,
    })
}

fn make_key_hold() -> WireMessage {
    WireMessage::Command(Command::KeyEvent {
        key: "f5".to_string(),
        modifiers: ModifierFlags::default(),
        press: PressKind::Hold { duration_ms: 1500 },
    })
}

fn make_axis() -> WireMessage {
    WireMessage::Command(Command::Axis {
        axis: 0,
        value: -20000,
    })
}

fn make_macro_invoke() -> WireMessage {
    WireMessage::Command(Command::MacroInvoke {
        macro_id: "Targeting.CycleLockHostilesNext".to_string(),
    })
}

fn make_ping() -> WireMessage {
    WireMessage::Ping(42)
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let fixtures: [(&str, WireMessage); 5] = [
        ("key_tap", make_key_tap()),
        ("key_hold", make_key_hold()),
        ("axis", make_axis()),
        ("macro_invoke", make_macro_invoke()),
        ("ping", make_ping()),
    ];

    for (name, msg) in &fixtures {
        group.bench_with_input(BenchmarkId::from_parameter(name), msg, |b, msg| {
            b.iter(|| encode_message(black_box(msg), 7, 123_456).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let fixtures: [(&str, WireMessage); 5] = [
        ("key_tap", make_key_tap()),
        ("key_hold", make_key_hold()),
        ("axis", make_axis()),
        ("macro_invoke", make_macro_invoke()),
        ("ping", make_ping()),
    ];

    for (name, msg) in &fixtures {
        let bytes = encode_message(msg, 7, 123_456).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| decode_message(black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
