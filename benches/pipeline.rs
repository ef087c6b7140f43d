use criterion::{black_box, criterion_group, criterion_main, Criterion};

use luma_reactive::audio::{
    FeatureExtractor, FeatureSource, LiveSource, SignalShaper, SpectrumTap, TickTiming,
    TuningState, WavReplay,
};
use std::time::Duration;

fn test_signal(sample_rate: u32, seconds: f32) -> Vec<f32> {
    let len = (sample_rate as f32 * seconds) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.4 * (2.0 * std::f32::consts::PI * 110.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 2500.0 * t).sin()
        })
        .collect()
}

fn bench_spectrum_tap(c: &mut Criterion) {
    let samples = test_signal(44100, 0.1);
    let mut tap = SpectrumTap::new(2048);
    c.bench_function("spectrum_tap_2048", |b| {
        b.iter(|| tap.process(black_box(&samples), 44100.0))
    });
}

fn bench_extract_and_shape(c: &mut Criterion) {
    let samples = test_signal(44100, 0.1);
    let frames = SpectrumTap::new(2048).process(&samples, 44100.0);
    let mut extractor = FeatureExtractor::new();
    let mut shaper = SignalShaper::new(TuningState::default());
    c.bench_function("extract_and_shape", |b| {
        b.iter(|| {
            let raw = extractor.extract(black_box(&frames));
            shaper.shape_snapshot(&raw)
        })
    });
}

fn bench_replay_tick(c: &mut Criterion) {
    let samples = test_signal(44100, 30.0);
    c.bench_function("replay_tick", |b| {
        b.iter_batched(
            || {
                let replay = WavReplay::from_samples(samples.clone(), 44100, SpectrumTap::new(2048), 60.0);
                LiveSource::new(replay, TickTiming::Fixed(Duration::from_millis(16)))
            },
            |mut source| source.raw_features(),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_spectrum_tap, bench_extract_and_shape, bench_replay_tick);
criterion_main!(benches);
