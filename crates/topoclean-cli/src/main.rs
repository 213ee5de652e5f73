use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use topoclean::{
    geojson::{geometry_to_value, parse_collection},
    ops::{check_geometry, collect_geometries, dissolve, fix_features},
    BatchExecutor, CleanConfig, PairStrategy, SnapTargets, Tolerance, TopologyCleaner,
};

/// Which record pairs the coverage audit compares.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PairStrategyArg {
    /// Every unordered pair.
    All,
    /// Only pairs close enough according to the spatial grid.
    Grid,
}

impl std::fmt::Display for PairStrategyArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PairStrategyArg::All => "all",
            PairStrategyArg::Grid => "grid",
        };

        f.write_str(s)
    }
}

impl From<PairStrategyArg> for PairStrategy {
    fn from(arg: PairStrategyArg) -> Self {
        match arg {
            PairStrategyArg::All => PairStrategy::AllPairs,
            PairStrategyArg::Grid => PairStrategy::GridNeighbors,
        }
    }
}

/// Which neighbors a record snaps onto.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum SnapTargetsArg {
    /// Every neighbor within reach.
    All,
    /// Only neighbors earlier in the input.
    Lower,
}

impl std::fmt::Display for SnapTargetsArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SnapTargetsArg::All => "all",
            SnapTargetsArg::Lower => "lower",
        };

        f.write_str(s)
    }
}

impl From<SnapTargetsArg> for SnapTargets {
    fn from(arg: SnapTargetsArg) -> Self {
        match arg {
            SnapTargetsArg::All => SnapTargets::AllNeighbors,
            SnapTargetsArg::Lower => SnapTargets::LowerIndexOnly,
        }
    }
}

/// `topoclean` - repair and harmonize polygon parcels in GeoJSON.
///
/// Invalid topology is repaired, micro-gaps between neighbouring parcels are
/// closed by conservative snapping, coordinates are truncated, and the result
/// is audited for overlaps and gaps.
#[derive(Parser, Debug)]
#[command(name = "topoclean", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Settings {
    /// Snap tolerance in meters (111 km per degree).
    #[arg(long, global = true, env = "TOPOCLEAN_TOLERANCE_M", default_value_t = 0.4)]
    tolerance_m: f64,

    /// Decimal places kept in output coordinates.
    #[arg(long, global = true, env = "TOPOCLEAN_PRECISION", default_value_t = 7)]
    precision: u32,

    /// Worker threads; defaults to the available parallelism.
    #[arg(long, global = true, env = "TOPOCLEAN_WORKERS")]
    workers: Option<usize>,

    /// Largest accepted snap distortion, as a multiple of the tolerance.
    #[arg(
        long,
        global = true,
        env = "TOPOCLEAN_MAX_DISTORTION_FACTOR",
        default_value_t = 0.1
    )]
    max_distortion_factor: f64,

    #[arg(
        long,
        global = true,
        value_enum,
        env = "TOPOCLEAN_PAIR_STRATEGY",
        default_value_t = PairStrategyArg::All
    )]
    pair_strategy: PairStrategyArg,

    #[arg(
        long,
        global = true,
        value_enum,
        env = "TOPOCLEAN_SNAP_TARGETS",
        default_value_t = SnapTargetsArg::All
    )]
    snap_targets: SnapTargetsArg,

    /// Write `<input>_PROCESSED.json` next to the input instead of stdout.
    #[arg(long, global = true, env = "TOPOCLEAN_SAVE", default_value_t = false)]
    save: bool,
}

impl Settings {
    fn clean_config(&self) -> CleanConfig {
        CleanConfig {
            tolerance: Tolerance::from_meters(self.tolerance_m),
            precision: self.precision,
            max_distortion_factor: self.max_distortion_factor,
            workers: self.workers,
            pair_strategy: self.pair_strategy.into(),
            snap_targets: self.snap_targets.into(),
            ..CleanConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
struct IoArgs {
    /// Input GeoJSON file; `-` or nothing reads stdin.
    input: Option<PathBuf>,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full topology cleaning of a FeatureCollection.
    Clean {
        #[command(flatten)]
        paths: IoArgs,

        /// Also write coverage, preservation and stage statistics as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Repair and truncate each feature on its own, without snapping.
    Fix {
        #[command(flatten)]
        paths: IoArgs,
    },
    /// List invalid geometries with the reason.
    Check {
        /// Input GeoJSON file; `-` or nothing reads stdin.
        input: Option<PathBuf>,
    },
    /// Union all polygons into a single geometry.
    Dissolve {
        #[command(flatten)]
        paths: IoArgs,
    },
}

fn is_stdin(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p.as_os_str() == "-")
}

fn read_input(path: Option<&Path>) -> Result<String> {
    let mut payload = String::new();
    match path {
        Some(p) if !is_stdin(Some(p)) => {
            payload = fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
        }
        _ => {
            io::stdin()
                .read_to_string(&mut payload)
                .context("Failed to read stdin")?;
        }
    }
    if payload.trim().is_empty() {
        bail!("Empty input");
    }
    Ok(payload)
}

/// `parcels.json` -> `parcels_PROCESSED.json`, in the same directory.
fn processed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    input.with_file_name(format!("{stem}_PROCESSED.json"))
}

fn emit(text: &str, paths: &IoArgs, save: bool) -> Result<()> {
    let target = match (&paths.output, &paths.input) {
        (Some(out), _) => Some(out.clone()),
        (None, Some(input)) if save && !is_stdin(Some(input)) => Some(processed_path(input)),
        _ => None,
    };

    match target {
        Some(path) => {
            fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn run_clean(settings: &Settings, paths: &IoArgs, report: Option<&Path>) -> Result<()> {
    let config = settings.clean_config();
    info!(
        "Tolerance {} m ({:e} deg), precision {}, pair strategy {}, snap targets {}",
        settings.tolerance_m,
        config.tol(),
        config.precision,
        settings.pair_strategy,
        settings.snap_targets
    );

    let cleaner = TopologyCleaner::new(config).context("Failed to set up the cleaner")?;
    let payload = read_input(paths.input.as_deref())?;
    let outcome = cleaner
        .clean_str(&payload)
        .context("Topology cleaning failed")?;

    let coverage = &outcome.coverage;
    info!(
        "{} features out, {} overlaps, {} gaps ({} boundary segments)",
        outcome.collection.features.len(),
        coverage.overlap_count,
        coverage.gap_count,
        coverage.boundary_gaps
    );

    emit(&serde_json::to_string(&outcome.collection)?, paths, settings.save)?;

    if let Some(path) = report {
        let text = serde_json::to_string_pretty(&outcome.report())?;
        fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn run_fix(settings: &Settings, paths: &IoArgs) -> Result<()> {
    let payload = read_input(paths.input.as_deref())?;
    let collection = parse_collection(&payload).context("Input is not a FeatureCollection")?;

    let executor = BatchExecutor::new(settings.workers)?;
    let (fixed, stats) = fix_features(collection, settings.precision, &executor);
    if stats.dropped > 0 {
        warn!("{} features dropped", stats.dropped);
    }

    emit(&serde_json::to_string(&fixed)?, paths, settings.save)
}

fn run_check(input: Option<&Path>) -> Result<()> {
    let payload = read_input(input)?;
    let value: serde_json::Value = serde_json::from_str(&payload).context("Malformed GeoJSON")?;
    let items = collect_geometries(&value)?;

    let issues = check_geometry(&items);
    info!("Found {} geometries, {} invalid", items.len(), issues.len());

    println!("{}", serde_json::to_string(&issues)?);
    Ok(())
}

fn run_dissolve(settings: &Settings, paths: &IoArgs) -> Result<()> {
    let payload = read_input(paths.input.as_deref())?;
    let value: serde_json::Value = serde_json::from_str(&payload).context("Malformed GeoJSON")?;

    let mut geometries = Vec::new();
    for (i, item) in collect_geometries(&value)?.into_iter().enumerate() {
        match item {
            Ok(g) => geometries.push(g),
            Err(err) => warn!("Geometry {i} ignored: {err}"),
        }
    }

    let merged = dissolve(geometries, settings.precision).context("Dissolve failed")?;
    emit(&geometry_to_value(&merged).to_string(), paths, settings.save)
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Clean { paths, report } => run_clean(&cli.settings, paths, report.as_deref()),
        Command::Fix { paths } => run_fix(&cli.settings, paths),
        Command::Check { input } => run_check(input.as_deref()),
        Command::Dissolve { paths } => run_dissolve(&cli.settings, paths),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_path_sits_next_to_input() {
        assert_eq!(
            processed_path(Path::new("data/parcels.json")),
            PathBuf::from("data/parcels_PROCESSED.json")
        );
    }

    #[test]
    fn global_settings_map_onto_config() {
        let cli = Cli::try_parse_from([
            "topoclean",
            "clean",
            "in.json",
            "--tolerance-m",
            "1.11",
            "--precision",
            "6",
            "--pair-strategy",
            "grid",
            "--snap-targets",
            "lower",
        ])
        .unwrap();

        let config = cli.settings.clean_config();
        assert!((config.tol() - 1e-5).abs() < 1e-15);
        assert_eq!(config.precision, 6);
        assert_eq!(config.pair_strategy, PairStrategy::GridNeighbors);
        assert_eq!(config.snap_targets, SnapTargets::LowerIndexOnly);
        assert!(matches!(cli.command, Command::Clean { .. }));
    }

    #[test]
    fn dash_means_stdin() {
        assert!(is_stdin(None));
        assert!(is_stdin(Some(Path::new("-"))));
        assert!(!is_stdin(Some(Path::new("a.json"))));
    }
}
