mod config;
mod matcher;

use clap::Parser;
use fpmorph::export::write_generator_template;
use fpmorph::image::io::{load_gray_image, save_gray_image, save_rgb_image};
use fpmorph::render;
use fpmorph::{
    AlignedFingerprint, Fingerprint, MatchRecord, MinutiaKind, MinutiaTemplate, MorphingProcessor,
    ReportWriter, TemplateMatcher,
};
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ModeConfig, OutputConfig};
use crate::matcher::ExternalMatcher;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Parser, Debug)]
#[command(author, version, about = "fpmorph CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output of the pipeline stages.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Serialize)]
struct ProcessOutput {
    image: String,
    width: usize,
    height: usize,
    foreground_blocks: usize,
    endings: usize,
    bifurcations: usize,
    template: String,
}

#[derive(Debug, Serialize)]
struct AlignmentOutput {
    dx: i32,
    dy: i32,
    angle_deg: f32,
    similarity: f32,
}

#[derive(Debug, Serialize)]
struct CutlineOutput {
    rotation_deg: f32,
    anchor: [i32; 2],
    separation: String,
    orientation_score: f32,
    frequency_score: f32,
    minutiae_score: f32,
    evaluation: f32,
}

#[derive(Debug, Default, Serialize)]
struct MorphOutput {
    morph_id: String,
    partner: String,
    other: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alignment: Option<AlignmentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cutline: Option<CutlineOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minutiae: Option<usize>,
    /// Partner against morph, then other against morph.
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Output {
    Processed(Vec<ProcessOutput>),
    Morphed(Vec<MorphOutput>),
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string()
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn input_images(config: &Config) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    match (&config.input.image, &config.input.dir) {
        (Some(image), _) => Ok(vec![image.clone()]),
        (None, Some(dir)) => list_images(dir),
        (None, None) => Err("input.image or input.dir must be set in the config".into()),
    }
}

/// Pairs as `(partner, other)`: the configured pair, or each directory image
/// with the following `neighbours` images.
fn morph_pairs(config: &Config) -> Result<Vec<(PathBuf, PathBuf)>, Box<dyn Error>> {
    if let (Some(image), Some(other)) = (&config.input.image, &config.input.other) {
        return Ok(vec![(image.clone(), other.clone())]);
    }
    let Some(dir) = &config.input.dir else {
        return Err("morph mode needs input.image and input.other, or input.dir".into());
    };
    let images = list_images(dir)?;
    let mut pairs = Vec::new();
    for (i, partner) in images.iter().enumerate() {
        for other in images.iter().skip(i + 1).take(config.input.neighbours) {
            pairs.push((partner.clone(), other.clone()));
        }
    }
    Ok(pairs)
}

struct Outputs<'a> {
    cfg: &'a OutputConfig,
    templates: PathBuf,
}

impl<'a> Outputs<'a> {
    fn create(cfg: &'a OutputConfig) -> Result<Self, Box<dyn Error>> {
        let templates = cfg.dir.join("templates");
        fs::create_dir_all(&templates)?;
        Ok(Self { cfg, templates })
    }

    fn image(&self, name: &str, suffix: &str) -> PathBuf {
        self.cfg.dir.join(format!("{name}_{suffix}.png"))
    }

    /// Writes the template of `name` and returns its path.
    fn template(&self, name: &str, template: &MinutiaTemplate) -> Result<PathBuf, Box<dyn Error>> {
        let path = self.templates.join(format!("{name}.txt"));
        template.write(&path)?;
        Ok(path)
    }
}

fn process_image(
    morpher: &MorphingProcessor,
    outputs: &Outputs<'_>,
    path: &Path,
) -> Result<ProcessOutput, Box<dyn Error>> {
    let name = stem(path);
    let processor = morpher.processor();
    let mut fp = processor.fingerprint(load_gray_image(path)?);
    processor.process(&mut fp)?;

    let template = outputs.template(&name, &MinutiaTemplate::from_fingerprint(&fp)?)?;
    let minutiae = fp.minutiae()?;
    if outputs.cfg.generator_templates {
        let (width, height) = fp.raw().shape();
        let path = outputs.templates.join(format!("{name}_generator.txt"));
        write_generator_template(&path, width, height, minutiae)?;
    }
    if outputs.cfg.debug_images {
        save_process_images(&fp, outputs, &name)?;
    }

    let count = |kind: MinutiaKind| minutiae.iter().filter(|m| m.kind == kind).count();
    let orientations = fp.orientations()?;
    Ok(ProcessOutput {
        image: path.display().to_string(),
        width: fp.raw().width(),
        height: fp.raw().height(),
        foreground_blocks: orientations.foreground_blocks(orientations.block_size()),
        endings: count(MinutiaKind::Ending),
        bifurcations: count(MinutiaKind::Bifurcation),
        template: template.display().to_string(),
    })
}

fn save_process_images(
    fp: &Fingerprint,
    outputs: &Outputs<'_>,
    name: &str,
) -> Result<(), Box<dyn Error>> {
    let normalized = render::masked_normalized(fp)?;
    save_gray_image(&normalized, outputs.image(name, "normalized"))?;
    let orientations = render::orientation_overlay(fp.orientations()?, Some(&normalized));
    save_gray_image(&orientations, outputs.image(name, "orientations"))?;
    save_gray_image(fp.enhanced()?, outputs.image(name, "enhanced"))?;
    let skeleton = fp.thinned()?.map(|v| if v > 0 { 0.0 } else { 1.0 });
    save_gray_image(&skeleton, outputs.image(name, "thinned"))?;
    save_rgb_image(&render::minutiae_overlay(fp)?, outputs.image(name, "minutiae"))?;
    Ok(())
}

/// Morphs `other` into `partner` and writes the morph with its templates.
/// Returns the written template paths of partner, other and morph.
fn morph_pair(
    morpher: &MorphingProcessor,
    outputs: &Outputs<'_>,
    partner_path: &Path,
    other_path: &Path,
    out: &mut MorphOutput,
) -> Result<[PathBuf; 3], Box<dyn Error>> {
    let processor = morpher.processor();
    let mut partner = processor.fingerprint(load_gray_image(partner_path)?);
    let mut af = AlignedFingerprint::new(processor.fingerprint(load_gray_image(other_path)?));
    let morph = morpher.morph(&mut af, &mut partner)?;

    let alignment = af.alignment()?;
    out.alignment = Some(AlignmentOutput {
        dx: alignment.dx,
        dy: alignment.dy,
        angle_deg: alignment.angle_deg,
        similarity: alignment.similarity,
    });
    let cutline = af.cutline()?;
    out.cutline = Some(CutlineOutput {
        rotation_deg: cutline.rotation.to_degrees(),
        anchor: [cutline.anchor.x, cutline.anchor.y],
        separation: cutline.separation.to_string(),
        orientation_score: cutline.orientation_score,
        frequency_score: cutline.frequency_score,
        minutiae_score: cutline.minutiae_score,
        evaluation: cutline.evaluation,
    });
    let (width, height) = morph.shape();
    out.width = Some(width);
    out.height = Some(height);
    out.minutiae = Some(morph.minutiae().len());

    let id = &out.morph_id;
    render::save_morph(&morph, outputs.cfg.dir.join(format!("{id}.png")))?;
    if outputs.cfg.debug_images {
        save_rgb_image(&render::aligned_overlay(&af, &partner)?, outputs.image(id, "aligned"))?;
        save_rgb_image(&render::cutline_overlay(&af, &partner)?, outputs.image(id, "cutline"))?;
        save_rgb_image(&render::morph_overlay(&morph), outputs.image(id, "minutiae"))?;
    }

    let aligned = af.aligned()?;
    let aligned_template =
        MinutiaTemplate::new(aligned.width(), aligned.height(), af.fingerprint().minutiae()?);
    let morph_template = MinutiaTemplate::from_morph(&morph);
    if outputs.cfg.generator_templates {
        let path = outputs.templates.join(format!("{id}_generator.txt"));
        write_generator_template(&path, width, height, morph.minutiae())?;
    }
    Ok([
        outputs.template(&out.partner, &MinutiaTemplate::from_fingerprint(&partner)?)?,
        outputs.template(&out.other, &aligned_template)?,
        outputs.template(id, &morph_template)?,
    ])
}

fn run_morphs(
    config: &Config,
    morpher: &MorphingProcessor,
    outputs: &Outputs<'_>,
) -> Result<Vec<MorphOutput>, Box<dyn Error>> {
    let matcher = config
        .matcher
        .as_ref()
        .map(|m| ExternalMatcher::new(m.command.clone(), m.args.clone()));
    let mut report = if matcher.is_some() {
        Some(ReportWriter::append(
            config.output.dir.join(&config.output.report),
        )?)
    } else {
        None
    };

    let mut results = Vec::new();
    for (partner_path, other_path) in morph_pairs(config)? {
        let (partner, other) = (stem(&partner_path), stem(&other_path));
        let mut out = MorphOutput {
            morph_id: format!("{partner}_{other}"),
            partner,
            other,
            ..MorphOutput::default()
        };
        let templates = morph_pair(morpher, outputs, &partner_path, &other_path, &mut out);
        let scored = templates.and_then(|[partner_tpl, other_tpl, morph_tpl]| {
            info!(morph = %out.morph_id, "morphed");
            let (Some(matcher), Some(report)) = (&matcher, report.as_mut()) else {
                return Ok(());
            };
            let scores = [
                matcher.score(&partner_tpl, &morph_tpl)?,
                matcher.score(&other_tpl, &morph_tpl)?,
            ];
            report.write(&MatchRecord::new(&out.partner, &out.morph_id, scores[0]))?;
            report.write(&MatchRecord::new(&out.other, &out.morph_id, scores[1]))?;
            out.scores = Some(scores);
            Ok(())
        });
        if let Err(err) = scored {
            warn!(morph = %out.morph_id, error = %err, "morph skipped");
            out.error = Some(err.to_string());
        }
        results.push(out);
    }
    if let Some(report) = report.as_mut() {
        report.flush()?;
    }
    Ok(results)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("fpmorph=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.input.neighbours == 0 {
        return Err("input.neighbours must be at least 1".into());
    }

    let morpher = MorphingProcessor::from_config(config.pipeline());
    let outputs = Outputs::create(&config.output)?;
    let output = match config.mode {
        ModeConfig::Process => {
            let mut results = Vec::new();
            for path in input_images(&config)? {
                match process_image(&morpher, &outputs, &path) {
                    Ok(result) => results.push(result),
                    Err(err) => warn!(image = %path.display(), error = %err, "image skipped"),
                }
            }
            Output::Processed(results)
        }
        ModeConfig::Morph => Output::Morphed(run_morphs(&config, &morpher, &outputs)?),
    };

    let json = serde_json::to_string_pretty(&output)?;
    fs::write(config.output.dir.join("summary.json"), &json)?;
    println!("{json}");
    Ok(())
}
