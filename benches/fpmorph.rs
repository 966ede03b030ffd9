use criterion::{criterion_group, criterion_main, Criterion};
use fpmorph::{
    AlignConfig, AlignedFingerprint, FingerprintProcessor, Grid, Image, MorphingProcessor,
    PipelineConfig, ProcessingConfig,
};
use std::f32::consts::PI;
use std::hint::black_box;

/// Whorl-like ridges around `(cx, cy)` inside an elliptic finger area.
fn make_print(width: usize, height: usize, cx: f32, cy: f32) -> Image {
    Grid::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = (y as f32 - cy) * 0.8;
        let r = (dx * dx + dy * dy).sqrt();
        let ex = (x as f32 - width as f32 / 2.0) / (0.45 * width as f32);
        let ey = (y as f32 - height as f32 / 2.0) / (0.45 * height as f32);
        if ex * ex + ey * ey > 1.0 {
            1.0
        } else {
            0.5 + 0.45 * (2.0 * PI * r / 9.0 + 0.02 * dx).cos()
        }
    })
}

fn bench_processing(c: &mut Criterion) {
    let raw = make_print(256, 320, 120.0, 170.0);
    let processor = FingerprintProcessor::new(ProcessingConfig::default());
    c.bench_function("process_256x320", |b| {
        b.iter(|| {
            let mut fp = processor.fingerprint(raw.clone());
            processor.process(&mut fp).unwrap();
            black_box(fp.minutiae().unwrap().len())
        });
    });

    let reference = FingerprintProcessor::new(PipelineConfig::reference().processing);
    c.bench_function("prepare_reference_256x320", |b| {
        b.iter(|| {
            let mut fp = reference.fingerprint(raw.clone());
            reference.prepare(&mut fp).unwrap();
            black_box(fp.region_mask().unwrap().region())
        });
    });
}

fn bench_morphing(c: &mut Criterion) {
    let first = make_print(256, 320, 120.0, 170.0);
    let second = make_print(256, 320, 136.0, 150.0);
    let morpher = MorphingProcessor::from_config(PipelineConfig::default());

    let processor = morpher.processor();
    let mut partner = processor.fingerprint(first.clone());
    processor.prepare(&mut partner).unwrap();
    let mut prepared = processor.fingerprint(second.clone());
    processor.prepare(&mut prepared).unwrap();

    c.bench_function("align_sequential", |b| {
        b.iter(|| {
            let mut af = AlignedFingerprint::new(prepared.clone());
            black_box(morpher.align(&mut af, &partner).unwrap())
        });
    });

    if cfg!(feature = "rayon") {
        let cfg = AlignConfig {
            parallel: true,
            ..AlignConfig::default()
        };
        c.bench_function("align_parallel", |b| {
            b.iter(|| {
                let mut af = AlignedFingerprint::new(prepared.clone());
                black_box(fpmorph::morphing::align(&mut af, &partner, &cfg).unwrap())
            });
        });
    }

    c.bench_function("morph_pair", |b| {
        b.iter(|| {
            let mut partner = processor.fingerprint(first.clone());
            let mut af = AlignedFingerprint::new(processor.fingerprint(second.clone()));
            // Synthetic pairs may end without a separation; the work is timed either way.
            black_box(morpher.morph(&mut af, &mut partner).ok())
        });
    });
}

criterion_group!(benches, bench_processing, bench_morphing);
criterion_main!(benches);
