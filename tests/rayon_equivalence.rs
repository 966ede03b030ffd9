#![cfg(feature = "rayon")]

use fpmorph::morphing::align;
use fpmorph::{
    AlignConfig, AlignedFingerprint, Fingerprint, FingerprintParams, FrequencyField, Grid,
    OrientationField, Rect, RegionMask,
};

fn record(size: usize, offset: usize) -> Fingerprint {
    let params = FingerprintParams {
        block_size: 12,
        ..FingerprintParams::default()
    };
    let angle = |x: usize, y: usize| {
        let (x, y) = ((x + offset) as f32, (y + offset) as f32);
        0.4 + 0.5 * (x * 0.031).sin() + 0.4 * (y * 0.023).cos()
    };
    let raw = Grid::from_fn(size, size, |x, y| 0.5 + 0.3 * (angle(x, y) * 7.0).cos());
    let validity = Grid::from_fn(size, size, |x, y| {
        let (dx, dy) = (x as f32 - size as f32 / 2.0, y as f32 - size as f32 / 2.0);
        if dx * dx + dy * dy < (size as f32 * 0.48).powi(2) {
            1.0
        } else {
            0.0
        }
    });
    let field =
        OrientationField::new(Grid::from_fn(size, size, angle), validity.clone(), 12).unwrap();
    let mut fp = Fingerprint::new(raw.clone(), params);
    fp.set_normalized(raw)
        .set_orientations(field)
        .set_frequencies(FrequencyField::new(Grid::filled(size, size, 0.11), 0.11, 0.11))
        .set_region_mask(RegionMask::new(validity, Rect::new(0, 0, size, size)));
    fp
}

#[test]
fn parallel_alignment_matches_sequential() {
    let partner = record(120, 0);
    let source = record(108, 17);

    let sequential_cfg = AlignConfig::default();
    let parallel_cfg = AlignConfig {
        parallel: true,
        ..AlignConfig::default()
    };

    let mut sequential = AlignedFingerprint::new(source.clone());
    let mut parallel = AlignedFingerprint::new(source);
    let a = align(&mut sequential, &partner, &sequential_cfg).unwrap();
    let b = align(&mut parallel, &partner, &parallel_cfg).unwrap();

    assert_eq!(a, b);
    assert_eq!(sequential.aligned().unwrap(), parallel.aligned().unwrap());
    assert_eq!(
        sequential.fingerprint().orientations().unwrap(),
        parallel.fingerprint().orientations().unwrap()
    );
}
