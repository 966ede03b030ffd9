use fpmorph::export::{read_report, write_generator_template};
use fpmorph::{
    FpMorphError, MatchRecord, Minutia, MinutiaKind, MinutiaTemplate, Point, ReportWriter,
};
use std::f32::consts::PI;
use std::fs;
use std::path::PathBuf;

/// Fresh directory under the system temp dir, unique per test and process.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fpmorph-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn minutiae() -> Vec<Minutia> {
    vec![
        Minutia::new(Point::new(12, 40), 0.25, 10.0, MinutiaKind::Ending),
        Minutia::new(Point::new(150, 7), 1.5 * PI, 10.0, MinutiaKind::Bifurcation),
        Minutia::new(Point::new(88, 199), 3.0, 10.0, MinutiaKind::Ending),
    ]
}

#[test]
fn template_file_survives_a_write_read_cycle() {
    let dir = scratch_dir("template");
    let path = dir.join("probe.txt");
    let template = MinutiaTemplate::new(240, 320, &minutiae());
    template.write(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let header: Vec<&str> = text.lines().take(4).collect();
    assert_eq!(header, ["240", "320", "500", "3"]);

    let read = MinutiaTemplate::read(&path).unwrap();
    assert_eq!(read, template);
    // Directions past pi are stored as their negative equivalent.
    assert!((read.records[1].direction + 0.5 * PI).abs() < 1e-5);
    assert!(read
        .records
        .iter()
        .all(|r| (-PI..=PI).contains(&r.direction)));
}

#[test]
fn truncated_template_reports_the_count_line() {
    let dir = scratch_dir("truncated");
    let path = dir.join("short.txt");
    fs::write(&path, "100\n100\n500\n2\n1 2 0.5\n").unwrap();
    let err = MinutiaTemplate::read(&path).unwrap_err();
    assert!(matches!(err, FpMorphError::MalformedRecord { line: 4, .. }));

    let missing = MinutiaTemplate::read(dir.join("absent.txt")).unwrap_err();
    assert!(matches!(missing, FpMorphError::Io { .. }));
}

#[test]
fn report_is_appended_across_writers() {
    let dir = scratch_dir("report");
    let path = dir.join("match_results.txt");

    let mut first = ReportWriter::append(&path).unwrap();
    first
        .write(&MatchRecord::new("0001_1", "0001_1_0002_1", 41.5))
        .unwrap();
    first.flush().unwrap();
    drop(first);

    let mut second = ReportWriter::append(&path).unwrap();
    second
        .write(&MatchRecord::new("0002_1", "0001_1_0002_1", 37.0))
        .unwrap();
    second.flush().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "0001_1;0001_1_0002_1;41.5;\n0002_1;0001_1_0002_1;37;\n"
    );
    let records = read_report(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].probe_id, "0001_1");
    assert_eq!(records[1].score, 37.0);
}

#[test]
fn generator_file_has_one_line_per_minutia() {
    let dir = scratch_dir("generator");
    let path = dir.join("probe_generator.txt");
    write_generator_template(&path, 160, 220, &minutiae()).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("{m:0,x:24,y:80,a:14,t:0}"));
    assert!(lines.iter().all(|l| l.ends_with("},")));
    assert!(lines[1].contains("t:1"));
}
