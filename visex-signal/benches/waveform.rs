use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use visex_signal::{decode, DigitalOutput, DigitalOutputDriver, PortError, WaveformSpec};

// Port that discards writes so only composition cost is measured
struct NullPort;
impl DigitalOutput for NullPort {
    fn write(&mut self, _value: u8) -> Result<(), PortError> {
        Ok(())
    }
}

fn harness() -> DigitalOutputDriver<NullPort> {
    let mut d = DigitalOutputDriver::new(NullPort);
    for bit in 0..8 {
        d.configure_spec(bit, WaveformSpec::power_of_two(bit)).unwrap();
    }
    d.start(&[0, 1, 2, 3, 4, 5, 6, 7], 0.0).unwrap();
    d
}

pub fn bench_sample(c: &mut Criterion) {
    let mut g = c.benchmark_group("waveform");
    g.sample_size(200);

    g.bench_function("sample_8_bits", |b| {
        let mut d = harness();
        let mut t = 0.0f64;
        b.iter(|| {
            t += 0.25;
            black_box(d.sample(black_box(t)).unwrap());
        })
    });

    g.bench_function("start_and_sample", |b| {
        b.iter_batched(
            harness,
            |mut d| {
                black_box(d.sample(black_box(12.5)).unwrap());
                d
            },
            BatchSize::SmallInput,
        )
    });

    g.finish();
}

pub fn bench_decode(c: &mut Criterion) {
    c.bench_function("decode_all_bytes", |b| {
        b.iter(|| {
            for v in 0..=255u8 {
                black_box(decode(black_box(v), 64));
            }
        })
    });
}

criterion_group!(benches, bench_sample, bench_decode);
criterion_main!(benches);
