//! `crossview` CLI: synthetic scenario runs, scene replay, scene recording.

use anyhow::{Context, Result};
use camera_models::ObjectDetector;
use clap::{Args, Parser, Subcommand};
use fusion_core::{metrics::RunMetrics, EntityId, FusionConfig, FusionResult};
use serde::Deserialize;
use sim::replay::{DetectionFrame, DetectionsFile};
use sim::{
    run_id, save_json, AbortHandle, CameraSimulator, DetectionClient, DetectionFilterConfig,
    JsonlResultStore, ModelProfile, RecordedDetector, RecordedScene, Scenario, ScenarioKind,
    SceneFile, SceneSource, Scheduler, SchedulerConfig,
};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "crossview", about = "Multi-agent camera fusion CLI")]
struct Cli {
    /// Log progress and per-run details
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a synthetic scenario and fuse it with the simulated detector.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Also save the recorded scene
        #[arg(long)]
        save_scene: Option<PathBuf>,
        #[command(flatten)]
        run: RunOptions,
    },
    /// Fuse a recorded scene file.
    Replay {
        /// Path to scene JSON file
        scene: PathBuf,
        /// Recorded detections; the simulated detector is used if absent
        #[arg(long)]
        detections: Option<PathBuf>,
        /// Seed of the simulated detector
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        run: RunOptions,
    },
    /// Record a synthetic scenario (and optionally its detections) to disk.
    Record {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output scene JSON file
        #[arg(long)]
        scene_out: PathBuf,
        /// Output detections JSON file
        #[arg(long)]
        detections_out: Option<PathBuf>,
        /// Detector profile used for the detections file
        #[arg(long, value_enum, default_value_t = ModelProfile::Medium)]
        model: ModelProfile,
    },
}

#[derive(Args)]
struct RunOptions {
    /// Comma-separated detector profiles; one run per model
    #[arg(long, default_value = "medium")]
    models: String,
    /// Exclude roadside sensors
    #[arg(long)]
    no_rsu: bool,
    /// Comma-separated entity ids; all scene entities if absent
    #[arg(long)]
    entities: Option<String>,
    /// JSON file overriding fusion and filter settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Root directory of run outputs
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,
}

/// Optional overrides loaded with `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfigFile {
    fusion: FusionConfig,
    filter: DetectionFilterConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    // Ctrl-C stops the current run after its tick and skips remaining models
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("starting signal runtime")?;
    let abort = AbortHandle::default();
    let on_interrupt = abort.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current tick");
            on_interrupt.abort();
        }
    });

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            save_scene,
            run,
        } => run_scenario(scenario, seed, save_scene.as_deref(), &run, &abort, cli.verbose),
        Commands::Replay {
            scene,
            detections,
            seed,
            run,
        } => run_replay(&scene, detections.as_deref(), seed, &run, &abort, cli.verbose),
        Commands::Record {
            scenario,
            seed,
            scene_out,
            detections_out,
            model,
        } => record(scenario, seed, &scene_out, detections_out.as_deref(), model),
    }
}

fn load_config(path: Option<&Path>) -> Result<RunConfigFile> {
    let Some(path) = path else {
        return Ok(RunConfigFile::default());
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: RunConfigFile =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    tracing::debug!(?config, path = %path.display(), "loaded run config");
    Ok(config)
}

fn parse_models(list: &str) -> FusionResult<Vec<ModelProfile>> {
    list.split(',')
        .filter(|m| !m.trim().is_empty())
        .map(ModelProfile::from_name)
        .collect()
}

fn parse_entities(list: Option<&str>) -> Option<Vec<EntityId>> {
    list.map(|l| {
        l.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(EntityId::new)
            .collect()
    })
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    save_path: Option<&Path>,
    opts: &RunOptions,
    abort: &AbortHandle,
    verbose: bool,
) -> Result<()> {
    println!("Recording scenario '{}' (seed={})...", kind.scene_name(), seed);
    let file = Scenario::build(kind, seed).record();
    if let Some(path) = save_path {
        save_json(&file, path)?;
        println!("Scene saved to {}", path.display());
    }

    let config = load_config(opts.config.as_deref())?;
    for profile in parse_models(&opts.models)? {
        if abort.is_aborted() {
            break;
        }
        let detector = CameraSimulator::new(profile, &file, seed);
        execute(file.clone(), Box::new(detector), opts, &config, abort, verbose)?;
    }
    Ok(())
}

fn run_replay(
    scene_path: &Path,
    detections: Option<&Path>,
    seed: u64,
    opts: &RunOptions,
    abort: &AbortHandle,
    verbose: bool,
) -> Result<()> {
    let file = sim::load_scene(scene_path)?;
    let config = load_config(opts.config.as_deref())?;
    println!(
        "Replaying '{}' ({} entities, {} frames)...",
        file.name,
        file.entities.len(),
        file.metadata.frame_count
    );

    if let Some(path) = detections {
        let detector = RecordedDetector::load(path)?;
        return execute(file, Box::new(detector), opts, &config, abort, verbose);
    }
    for profile in parse_models(&opts.models)? {
        if abort.is_aborted() {
            break;
        }
        let detector = CameraSimulator::new(profile, &file, seed);
        execute(file.clone(), Box::new(detector), opts, &config, abort, verbose)?;
    }
    Ok(())
}

/// One full run of `file` with one detector.
fn execute(
    file: SceneFile,
    detector: Box<dyn ObjectDetector>,
    opts: &RunOptions,
    config: &RunConfigFile,
    abort: &AbortHandle,
    verbose: bool,
) -> Result<()> {
    let use_rsu = !opts.no_rsu;
    let scene = RecordedScene::new(file)?;
    let metadata = scene.run_metadata();
    let client = DetectionClient::new(detector, config.filter.clone());
    let mut scheduler = Scheduler::new(
        Box::new(scene),
        client,
        config.fusion.clone(),
        SchedulerConfig {
            use_rsu,
            max_ticks: opts.max_ticks,
            entities: parse_entities(opts.entities.as_deref()),
            progress_every: if verbose { 10 } else { 0 },
        },
    )?
    .with_abort_handle(abort.clone());

    let unix_ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let id = run_id(scheduler.model_name(), scheduler.scene().name(), use_rsu, unix_ts);
    let store = JsonlResultStore::create(&opts.output_dir, &id)?;
    println!(
        "Run {}: {} entities, {} ticks",
        id,
        scheduler.entity_ids().len(),
        scheduler.end_tick()
    );

    let start = Instant::now();
    let (info, dir) = scheduler.run_to_store(&id, store)?;
    let elapsed = start.elapsed();
    let metrics = info.metrics;

    if info.aborted {
        println!("Interrupted at tick {}", scheduler.current_tick());
    }
    println!(
        "Done: {} ticks, {} agents, {} detections ({} duplicates, {} skipped), elapsed={:.2}s",
        metrics.n_ticks,
        metrics.n_agents,
        metrics.n_detections,
        metrics.n_duplicates,
        metrics.n_skipped,
        elapsed.as_secs_f64(),
    );
    println!(
        "Crash warnings: {}, frame gaps: {}, mean fusion time: {:.1}µs",
        metrics.n_crash_warnings,
        metrics.n_gaps,
        metrics.mean_fusion_time_us(),
    );
    print_congestion(&metrics, &metadata.congestion_statistics, metadata.frame_count);
    println!("Results saved to {}", dir.display());
    Ok(())
}

fn print_congestion(
    metrics: &RunMetrics,
    ground_truth: &std::collections::BTreeMap<String, u64>,
    frame_count: u64,
) {
    println!("Congestion (share of ticks):");
    if ground_truth.is_empty() {
        for id in metrics.congested_ticks.keys() {
            println!("  {id}: predicted {:.1}%", metrics.congested_percentage(id));
        }
        return;
    }
    for cmp in metrics.compare_congestion(ground_truth, frame_count) {
        println!(
            "  {}: predicted {:.1}%, recorded {:.1}%",
            cmp.intersection_id, cmp.predicted_pct, cmp.ground_truth_pct
        );
    }
}

fn record(
    kind: ScenarioKind,
    seed: u64,
    scene_out: &Path,
    detections_out: Option<&Path>,
    model: ModelProfile,
) -> Result<()> {
    let file = Scenario::build(kind, seed).record();
    save_json(&file, scene_out)?;
    println!(
        "Scene '{}' saved to {} ({} entities, {} frames, {} gaps)",
        file.name,
        scene_out.display(),
        file.entities.len(),
        file.metadata.frame_count,
        file.missing_frames.len()
    );

    let Some(path) = detections_out else {
        return Ok(());
    };
    let mut detector = CameraSimulator::new(model, &file, seed);
    let scene = RecordedScene::new(file)?;
    let mut frames = Vec::new();
    for tick in 0..scene.simulation_length() {
        for entity in scene.entity_ids() {
            let Some(frame) = scene.image_at(&entity, tick) else {
                continue;
            };
            frames.push(DetectionFrame {
                entity,
                tick,
                detections: detector.detect(&frame)?,
            });
        }
    }
    let log = DetectionsFile {
        model: model.name().to_string(),
        frames,
    };
    save_json(&log, path)?;
    println!("Detections ({}) saved to {}", log.frames.len(), path.display());
    Ok(())
}
