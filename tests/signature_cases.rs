//! Ridge spacing recovered from x-signatures of straight gratings listed in
//! `tests/data/signature_cases.json`.

use fpmorph::processing::frequency::{average_spacing, find_extrema, x_signature};
use fpmorph::{Grid, OrientationField};
use serde::Deserialize;
use std::f32::consts::PI;
use std::fs;
use std::path::PathBuf;

const SIZE: usize = 160;
const BLOCK: usize = 16;
const WINDOW: usize = 64;
/// Allowed error of the mean peak spacing in pixels.
const SPACING_TOLERANCE: f32 = 1.5;

#[derive(Debug, Deserialize)]
struct Case {
    name: String,
    normal_deg: f32,
    period: f32,
}

#[derive(Debug, Deserialize)]
struct Cases {
    cases: Vec<Case>,
}

fn load_cases() -> Vec<Case> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/signature_cases.json");
    let text = fs::read_to_string(&path).unwrap();
    let cases: Cases = serde_json::from_str(&text).unwrap();
    cases.cases
}

#[test]
fn signature_spacing_matches_grating_period() {
    let cases = load_cases();
    assert!(!cases.is_empty());
    for case in cases {
        let normal = case.normal_deg.to_radians();
        let (s, c) = normal.sin_cos();
        let img = Grid::from_fn(SIZE, SIZE, |x, y| {
            let t = x as f32 * c + y as f32 * s;
            0.5 + 0.5 * (2.0 * PI * t / case.period).cos()
        });
        let field = OrientationField::new(
            Grid::filled(SIZE, SIZE, normal),
            Grid::filled(SIZE, SIZE, 1.0),
            BLOCK,
        )
        .unwrap();

        let signature = x_signature(&img, &field, SIZE / 2, SIZE / 2, BLOCK, WINDOW);
        assert_eq!(signature.len(), WINDOW, "{}", case.name);
        let (peaks, valleys) = find_extrema(&signature);
        assert!(peaks.len() >= 2, "{}: peaks {peaks:?}", case.name);
        assert!(!valleys.is_empty(), "{}", case.name);

        let spacing = average_spacing(&peaks)
            .unwrap_or_else(|| panic!("{}: no spacing from {peaks:?}", case.name));
        assert!(
            (spacing - case.period).abs() <= SPACING_TOLERANCE,
            "{}: spacing {spacing} for period {}",
            case.name,
            case.period
        );
    }
}

#[test]
fn flat_signature_has_no_spacing() {
    // Bright paper: the inverted profile stays below the peak level.
    let img = Grid::filled(SIZE, SIZE, 0.6f32);
    let field = OrientationField::new(
        Grid::filled(SIZE, SIZE, 0.7),
        Grid::filled(SIZE, SIZE, 1.0),
        BLOCK,
    )
    .unwrap();
    let signature = x_signature(&img, &field, SIZE / 2, SIZE / 2, BLOCK, WINDOW);
    assert!(signature.iter().all(|v| (v - 0.4).abs() < 1e-5));
    let (peaks, _) = find_extrema(&signature);
    assert!(peaks.is_empty());
    assert_eq!(average_spacing(&peaks), None);
}
