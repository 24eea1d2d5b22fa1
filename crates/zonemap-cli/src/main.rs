use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use zonemap_core::store::{active_template, TemplateRepository};
use zonemap_core::template::EditTarget;
use zonemap_core::{
    adapter, autofit, CalibrationState, KeyPoints, LandmarkSet, Morphology, Point, Pose,
    RawLandmark, Tuning, ZoneTemplate,
};
use zonemap_store::Store;

#[derive(Parser)]
#[command(name = "zonemap", about = "Zonemap facial zone engine CLI")]
struct Cli {
    /// Database path (defaults to $ZONEMAP_DB_PATH, then the XDG data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Tuning TOML file (defaults to builtin calibrated values)
    #[arg(long, global = true)]
    tuning: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or edit zone templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Compute the global mask auto-fit from a landmark JSON file
    Fit {
        /// Landmark file: a JSON array of [x, y] or [x, y, z] points
        landmarks: PathBuf,
        #[arg(short, long, default_value = "XX")]
        morphology: String,
    },
    /// Adapt zones onto a face and print the scored result
    Zones {
        landmarks: PathBuf,
        #[arg(short, long, default_value = "XX")]
        morphology: String,
        /// Capture pose filtering the visible zones
        #[arg(short, long, default_value = "face")]
        pose: String,
    },
    /// Replay a JSONL stream of landmark frames through calibration
    Calibrate {
        /// One JSON landmark array per line
        replay: PathBuf,
    },
    /// Extract per-zone crops from a photo
    Crop {
        photo: PathBuf,
        landmarks: PathBuf,
        #[arg(short, long, default_value = "XX")]
        morphology: String,
        #[arg(short, long, default_value = "face")]
        pose: String,
        /// Output directory for the crop images
        #[arg(short, long, default_value = "crops")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// Print the active template for a morphology as JSON
    Show {
        #[arg(short, long, default_value = "XX")]
        morphology: String,
    },
    /// Validate a template JSON file without saving it
    Validate { file: PathBuf },
    /// Import a template JSON file as the stored calibration
    Import { file: PathBuf },
    /// Append a point to the mask, a zone, or an exclusion
    AddPoint {
        #[arg(short, long, default_value = "XX")]
        morphology: String,
        /// `mask`, `zone:<id>` or `exclusion:<id>`
        target: String,
        x: f64,
        y: f64,
    },
    /// Move an existing point of the target polygon
    MovePoint {
        #[arg(short, long, default_value = "XX")]
        morphology: String,
        target: String,
        index: usize,
        x: f64,
        y: f64,
    },
    /// Remove a point from the target polygon
    RemovePoint {
        #[arg(short, long, default_value = "XX")]
        morphology: String,
        target: String,
        index: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let tuning = load_tuning(cli.tuning.as_deref())?;

    match cli.command {
        Commands::Template { command } => run_template(command, cli.db.as_deref()),
        Commands::Fit {
            landmarks,
            morphology,
        } => run_fit(&landmarks, &morphology, &tuning),
        Commands::Zones {
            landmarks,
            morphology,
            pose,
        } => run_zones(&landmarks, &morphology, &pose, &tuning),
        Commands::Calibrate { replay } => run_calibrate(&replay),
        Commands::Crop {
            photo,
            landmarks,
            morphology,
            pose,
            out,
        } => run_crop(&photo, &landmarks, &morphology, &pose, &out, &tuning),
    }
}

fn load_tuning(path: Option<&Path>) -> Result<Tuning> {
    match path {
        Some(p) => Tuning::load(p).with_context(|| format!("loading tuning {}", p.display())),
        None => Ok(Tuning::default()),
    }
}

fn db_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(p) = std::env::var("ZONEMAP_DB_PATH") {
        return PathBuf::from(p);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".local/share/zonemap/zonemap.db")
}

fn open_store(explicit: Option<&Path>) -> Result<Store> {
    let path = db_path(explicit);
    Store::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn parse_morphology(s: &str) -> Result<Morphology> {
    s.parse().map_err(|e: String| anyhow::anyhow!(e))
}

fn parse_pose(s: &str) -> Result<Pose> {
    s.parse().map_err(|e: String| anyhow::anyhow!(e))
}

/// `mask`, `zone:<id>` or `exclusion:<id>`.
fn parse_target(s: &str) -> Result<EditTarget> {
    if s == "mask" {
        return Ok(EditTarget::Mask);
    }
    if let Some(id) = s.strip_prefix("zone:") {
        return Ok(EditTarget::Zone(id.to_string()));
    }
    if let Some(id) = s.strip_prefix("exclusion:") {
        return Ok(EditTarget::Exclusion(id.to_string()));
    }
    bail!("bad edit target `{s}` (expected mask, zone:<id> or exclusion:<id>)")
}

fn load_landmarks(path: &Path) -> Result<LandmarkSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading landmark file {}", path.display()))?;
    let points: Vec<RawLandmark> =
        serde_json::from_str(&raw).context("landmark file must be a JSON array of [x, y] points")?;
    LandmarkSet::normalize(&points).context("normalizing landmarks")
}

fn run_template(command: TemplateCommands, db: Option<&Path>) -> Result<()> {
    match command {
        TemplateCommands::Show { morphology } => {
            let store = open_store(db)?;
            let template = active_template(&store, parse_morphology(&morphology)?)?;
            println!("{}", serde_json::to_string_pretty(&template)?);
            Ok(())
        }
        TemplateCommands::Validate { file } => {
            let template = read_template(&file)?;
            template.validate()?;
            println!(
                "{}: ok ({} zones, morphology {})",
                file.display(),
                template.zones.len(),
                template.morphology
            );
            Ok(())
        }
        TemplateCommands::Import { file } => {
            let template = read_template(&file)?;
            let store = open_store(db)?;
            store.put(&template)?;
            println!("imported template `{}` for {}", template.id, template.morphology);
            Ok(())
        }
        TemplateCommands::AddPoint {
            morphology,
            target,
            x,
            y,
        } => edit_template(db, &morphology, |t| {
            t.add_point(&parse_target(&target)?, Point::new(x, y))
                .map_err(Into::into)
        }),
        TemplateCommands::MovePoint {
            morphology,
            target,
            index,
            x,
            y,
        } => edit_template(db, &morphology, |t| {
            t.move_point(&parse_target(&target)?, index, Point::new(x, y))
                .map_err(Into::into)
        }),
        TemplateCommands::RemovePoint {
            morphology,
            target,
            index,
        } => edit_template(db, &morphology, |t| {
            t.remove_point(&parse_target(&target)?, index)
                .map_err(Into::into)
        }),
    }
}

fn read_template(path: &Path) -> Result<ZoneTemplate> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading template {}", path.display()))?;
    serde_json::from_str(&raw).context("parsing template JSON")
}

/// Load the active template, apply one edit, validate, store.
fn edit_template(
    db: Option<&Path>,
    morphology: &str,
    edit: impl FnOnce(&mut ZoneTemplate) -> Result<()>,
) -> Result<()> {
    let store = open_store(db)?;
    let mut template = active_template(&store, parse_morphology(morphology)?)?;
    edit(&mut template)?;
    template.validate().context("edited template is invalid; not saved")?;
    store.put(&template)?;
    println!("saved template `{}`", template.id);
    Ok(())
}

fn run_fit(landmarks: &Path, morphology: &str, tuning: &Tuning) -> Result<()> {
    let set = load_landmarks(landmarks)?;
    let template = ZoneTemplate::builtin(parse_morphology(morphology)?);
    let keys = KeyPoints::from_landmarks(&set)?;
    let fit = autofit::compute_mask_fit(&keys, &template.mask, tuning)?;
    println!("{}", serde_json::to_string_pretty(&fit)?);
    Ok(())
}

fn run_zones(landmarks: &Path, morphology: &str, pose: &str, tuning: &Tuning) -> Result<()> {
    let set = load_landmarks(landmarks)?;
    let pose = parse_pose(pose)?;
    let template = ZoneTemplate::builtin(parse_morphology(morphology)?);

    let outcome = adapter::adapt_zones(&set, template, tuning);
    for err in &outcome.skipped {
        eprintln!("skipped: {err}");
    }

    let visible: Vec<_> = outcome
        .zones
        .iter()
        .filter(|z| zonemap_core::visibility::is_visible(&z.zone_id, pose))
        .collect();
    println!("{}", serde_json::to_string_pretty(&visible)?);
    Ok(())
}

fn run_calibrate(replay: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(replay)
        .with_context(|| format!("reading replay {}", replay.display()))?;

    let mut state = CalibrationState::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let points: Vec<RawLandmark> = serde_json::from_str(line)
            .with_context(|| format!("line {}: bad landmark array", lineno + 1))?;
        let set = match LandmarkSet::normalize(&points) {
            Ok(s) => s,
            Err(_) => continue, // no-face frames are expected in a replay
        };
        for dir in state.observe(&set) {
            println!("frame {}: {:?} latched", lineno + 1, dir);
        }
        if state.is_complete() {
            println!("calibration complete after {} frames", lineno + 1);
            return Ok(());
        }
    }

    println!(
        "calibration incomplete: {}/5 directions observed",
        state.completed_count()
    );
    Ok(())
}

fn run_crop(
    photo: &Path,
    landmarks: &Path,
    morphology: &str,
    pose: &str,
    out: &Path,
    tuning: &Tuning,
) -> Result<()> {
    let set = load_landmarks(landmarks)?;
    let pose = parse_pose(pose)?;
    let template = ZoneTemplate::builtin(parse_morphology(morphology)?);

    let img = image::open(photo).with_context(|| format!("opening photo {}", photo.display()))?;
    let (img_w, img_h) = (img.width(), img.height());

    std::fs::create_dir_all(out)
        .with_context(|| format!("creating output directory {}", out.display()))?;

    let outcome = adapter::adapt_zones(&set, template, tuning);
    let mut written = 0usize;
    for zone in &outcome.zones {
        if !zonemap_core::visibility::is_visible(&zone.zone_id, pose) {
            continue;
        }
        let Some(bbox) = zone.polygon.bounding_box() else {
            continue;
        };

        // Canonical 0–100 coordinates map linearly onto the photo.
        let scale_x = f64::from(img_w) / zonemap_core::geometry::CANONICAL_EXTENT;
        let scale_y = f64::from(img_h) / zonemap_core::geometry::CANONICAL_EXTENT;
        let x0 = ((bbox.min_x * scale_x).floor().max(0.0)) as u32;
        let y0 = ((bbox.min_y * scale_y).floor().max(0.0)) as u32;
        let x1 = ((bbox.max_x * scale_x).ceil() as u32).min(img_w);
        let y1 = ((bbox.max_y * scale_y).ceil() as u32).min(img_h);
        if x1 <= x0 || y1 <= y0 {
            tracing::debug!(zone = %zone.zone_id, "crop outside the photo; skipped");
            continue;
        }

        let crop = img.crop_imm(x0, y0, x1 - x0, y1 - y0);
        let path = out.join(format!("{}.png", zone.zone_id));
        crop.save(&path)
            .with_context(|| format!("writing crop {}", path.display()))?;
        println!(
            "{}: {}x{} at ({}, {}) confidence {:.2}",
            path.display(),
            x1 - x0,
            y1 - y0,
            x0,
            y0,
            zone.confidence.overall
        );
        written += 1;
    }

    println!("{written} zone crops written to {}", out.display());
    Ok(())
}
