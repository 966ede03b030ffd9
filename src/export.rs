//! Minutia records exchanged with external tools and batch report rows.
//!
//! Three plain-text formats are covered:
//! - the matcher template (`width`, `height`, `dpi`, count, then one
//!   `x y direction` line per minutia),
//! - the synthetic generator list (`{m:..,x:..,y:..,a:..,t:..},` lines
//!   scaled to a 320x440 canvas),
//! - report rows `probe;morph;score;` appended per comparison.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::fingerprint::{Fingerprint, Minutia};
use crate::morphing::MorphedTemplate;
use crate::util::math::{wrap_full_turn, wrap_signed};
use crate::util::{FpMorphError, FpMorphResult};

/// One minutia of a matcher template.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinutiaRecord {
    pub x: i32,
    pub y: i32,
    /// Direction in radians, in [-pi, pi].
    pub direction: f32,
}

/// Minutiae of one image in the form read by the external matcher.
#[derive(Clone, Debug, PartialEq)]
pub struct MinutiaTemplate {
    pub width: usize,
    pub height: usize,
    pub dpi: u32,
    pub records: Vec<MinutiaRecord>,
}

impl MinutiaTemplate {
    /// Resolution written when none is known.
    pub const DEFAULT_DPI: u32 = 500;

    /// Builds a template for an image of `width` x `height` pixels.
    pub fn new(width: usize, height: usize, minutiae: &[Minutia]) -> Self {
        let records = minutiae
            .iter()
            .map(|m| MinutiaRecord {
                x: m.position.x,
                y: m.position.y,
                direction: wrap_signed(m.direction),
            })
            .collect();
        Self {
            width,
            height,
            dpi: Self::DEFAULT_DPI,
            records,
        }
    }

    /// Template of a processed fingerprint, sized to its trimmed image.
    pub fn from_fingerprint(fp: &Fingerprint) -> FpMorphResult<Self> {
        let (width, height) = fp.raw().shape();
        Ok(Self::new(width, height, fp.minutiae()?))
    }

    /// Template of a morph.
    pub fn from_morph(morph: &MorphedTemplate) -> Self {
        let (width, height) = morph.shape();
        Self::new(width, height, morph.minutiae())
    }

    /// Text form of the template.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.width);
        let _ = writeln!(out, "{}", self.height);
        let _ = writeln!(out, "{}", self.dpi);
        let _ = writeln!(out, "{}", self.records.len());
        for r in &self.records {
            let _ = writeln!(out, "{} {} {}", r.x, r.y, r.direction);
        }
        out
    }

    /// Parses the text form.
    ///
    /// The header is four integer lines; the declared count must match the
    /// number of record lines. Blank lines are ignored.
    pub fn parse(text: &str) -> FpMorphResult<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let mut header = [0usize; 4];
        for (slot, name) in header
            .iter_mut()
            .zip(["width", "height", "dpi", "minutia count"])
        {
            let (line, value) = lines.next().ok_or_else(|| FpMorphError::MalformedRecord {
                line: 0,
                reason: format!("missing {name}"),
            })?;
            *slot = parse_field(value, line, name)?;
        }
        let [width, height, dpi, count] = header;
        let dpi = u32::try_from(dpi).map_err(|_| FpMorphError::MalformedRecord {
            line: 3,
            reason: "dpi out of range".to_string(),
        })?;

        let mut records = Vec::with_capacity(count);
        for (line, value) in lines {
            let fields: Vec<&str> = value.split_whitespace().collect();
            let [x, y, direction] = fields[..] else {
                return Err(FpMorphError::MalformedRecord {
                    line,
                    reason: format!("expected 3 fields, got {}", fields.len()),
                });
            };
            records.push(MinutiaRecord {
                x: parse_field(x, line, "x")?,
                y: parse_field(y, line, "y")?,
                direction: parse_field(direction, line, "direction")?,
            });
        }
        if records.len() != count {
            return Err(FpMorphError::MalformedRecord {
                line: 4,
                reason: format!("declared {count} minutiae, found {}", records.len()),
            });
        }

        Ok(Self {
            width,
            height,
            dpi,
            records,
        })
    }

    /// Writes the text form to `path`, truncating it.
    pub fn write(&self, path: impl AsRef<Path>) -> FpMorphResult<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    /// Reads and parses a template file.
    pub fn read(path: impl AsRef<Path>) -> FpMorphResult<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

fn parse_field<T: FromStr>(value: &str, line: usize, name: &str) -> FpMorphResult<T> {
    value.parse().map_err(|_| FpMorphError::MalformedRecord {
        line,
        reason: format!("invalid {name} `{value}`"),
    })
}

/// Canvas the synthetic generator expects minutiae on.
const GENERATOR_WIDTH: i64 = 320;
const GENERATOR_HEIGHT: i64 = 440;

/// Minutia list in the synthetic generator's format.
///
/// Coordinates are rescaled from `width` x `height` onto the generator
/// canvas with integer division; directions become whole degrees in
/// [0, 360).
pub fn generator_template(width: usize, height: usize, minutiae: &[Minutia]) -> String {
    let width = width.max(1) as i64;
    let height = height.max(1) as i64;
    let mut out = String::new();
    for (i, m) in minutiae.iter().enumerate() {
        let x = i64::from(m.position.x) * GENERATOR_WIDTH / width;
        let y = i64::from(m.position.y) * GENERATOR_HEIGHT / height;
        let degrees = wrap_full_turn(m.direction).to_degrees() as i64;
        let kind = m.kind.code();
        let _ = writeln!(out, "{{m:{i},x:{x},y:{y},a:{degrees},t:{kind}}},");
    }
    out
}

/// Writes [`generator_template`] to `path`.
pub fn write_generator_template(
    path: impl AsRef<Path>,
    width: usize,
    height: usize,
    minutiae: &[Minutia],
) -> FpMorphResult<()> {
    std::fs::write(path, generator_template(width, height, minutiae))?;
    Ok(())
}

/// Score of one source fingerprint against a morph.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchRecord {
    pub probe_id: String,
    pub morph_id: String,
    pub score: f64,
}

impl MatchRecord {
    pub fn new(probe_id: impl Into<String>, morph_id: impl Into<String>, score: f64) -> Self {
        Self {
            probe_id: probe_id.into(),
            morph_id: morph_id.into(),
            score,
        }
    }

    /// Report line without the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{};{};{};", self.probe_id, self.morph_id, self.score)
    }

    /// Parses a report line; the trailing separator is optional.
    pub fn parse_line(line: &str, line_no: usize) -> FpMorphResult<Self> {
        let trimmed = line.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
        let fields: Vec<&str> = trimmed.split(';').collect();
        let [probe, morph, score] = fields[..] else {
            return Err(FpMorphError::MalformedRecord {
                line: line_no,
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        };
        Ok(Self::new(probe, morph, parse_field(score, line_no, "score")?))
    }
}

/// Append-only writer of report lines.
pub struct ReportWriter {
    out: BufWriter<File>,
}

impl ReportWriter {
    /// Opens `path` for appending, creating it when missing.
    pub fn append(path: impl AsRef<Path>) -> FpMorphResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, record: &MatchRecord) -> FpMorphResult<()> {
        writeln!(self.out, "{}", record.to_line())?;
        Ok(())
    }

    pub fn flush(&mut self) -> FpMorphResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reads every record of a report file.
pub fn read_report(path: impl AsRef<Path>) -> FpMorphResult<Vec<MatchRecord>> {
    std::fs::read_to_string(path)?
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| MatchRecord::parse_line(l, i + 1))
        .collect()
}

/// Boundary to an external minutiae matcher.
///
/// Implementations compare two matcher template files and return a
/// similarity score; higher means more similar.
pub trait TemplateMatcher {
    fn score(&self, probe: &Path, candidate: &Path) -> FpMorphResult<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MinutiaKind;
    use crate::image::Point;
    use std::f32::consts::PI;

    fn minutiae() -> Vec<Minutia> {
        vec![
            Minutia::new(Point::new(10, 20), 1.5 * PI, 7.0, MinutiaKind::Ending),
            Minutia::new(Point::new(160, 110), 0.25 * PI, 9.0, MinutiaKind::Bifurcation),
        ]
    }

    #[test]
    fn matcher_template_wraps_directions_to_signed_range() {
        let tpl = MinutiaTemplate::new(320, 220, &minutiae());
        assert_eq!(tpl.dpi, 500);
        assert!((tpl.records[0].direction + 0.5 * PI).abs() < 1e-5);
        assert!((tpl.records[1].direction - 0.25 * PI).abs() < 1e-6);
    }

    #[test]
    fn matcher_template_text_parses_back() {
        let tpl = MinutiaTemplate::new(320, 220, &minutiae());
        let text = tpl.to_text();
        assert!(text.starts_with("320\n220\n500\n2\n10 20 "));
        let parsed = MinutiaTemplate::parse(&text).unwrap();
        assert_eq!(parsed.width, 320);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!((parsed.records[1].x, parsed.records[1].y), (160, 110));
        assert!((parsed.records[1].direction - tpl.records[1].direction).abs() < 1e-6);
    }

    #[test]
    fn malformed_templates_name_the_line() {
        let err = MinutiaTemplate::parse("10\n10\n500\n1\n3 4\n").unwrap_err();
        assert!(matches!(err, FpMorphError::MalformedRecord { line: 5, .. }));
        let err = MinutiaTemplate::parse("10\n10\n500\n2\n3 4 0.5\n").unwrap_err();
        assert!(matches!(err, FpMorphError::MalformedRecord { line: 4, .. }));
        let err = MinutiaTemplate::parse("10\nten\n").unwrap_err();
        assert!(matches!(err, FpMorphError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn generator_lines_are_rescaled() {
        let mut list = minutiae();
        for m in &mut list {
            m.direction += 0.01;
        }
        let text = generator_template(320, 220, &list);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "{m:0,x:10,y:40,a:270,t:0},");
        assert_eq!(lines[1], "{m:1,x:160,y:220,a:45,t:1},");
    }

    #[test]
    fn match_record_line_format() {
        let record = MatchRecord::new("101_1", "101_1_102_1", 0.25);
        assert_eq!(record.to_line(), "101_1;101_1_102_1;0.25;");
        assert_eq!(MatchRecord::parse_line(&record.to_line(), 1).unwrap(), record);
        assert!(MatchRecord::parse_line("a;b", 3).is_err());
    }
}
