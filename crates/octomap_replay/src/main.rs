//! Synthetic scene replay.
//!
//! Renders an orbiting camera over a labelled tabletop and streams the scans
//! through the instance mapper, either inline or through the background
//! worker. Prints the class summary, the exported grids and stage timings.

mod config;
mod scene;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::Parser;
use glam::DAffine3;
use instance_octomap::{
	InstanceMapper, MapMetrics, MapWorker, ScanInput, ScanOutcome, Stage, VoxelGrid, WorkerEvent,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use scene::Scene;

/// Replays a synthetic labelled scene through the instance mapper.
#[derive(Parser, Debug)]
#[command(name = "octomap_replay")]
#[command(about = "Streams a synthetic tabletop scene through the instance mapper")]
struct Args {
	/// Path to configuration TOML file (defaults when omitted).
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Override the number of scans.
	#[arg(short, long)]
	scans: Option<usize>,

	/// Override the scene seed.
	#[arg(long)]
	seed: Option<u64>,

	/// Process scans on the background worker.
	#[arg(long)]
	worker: bool,

	/// Write the background map in the binary octree format.
	#[arg(long)]
	output_map: Option<PathBuf>,

	/// Write the world-frame grids as TOML.
	#[arg(long)]
	grids_out: Option<PathBuf>,
}

#[derive(Serialize)]
struct GridDump<'a> {
	grids: &'a [VoxelGrid],
}

/// How long the replay waits for the worker to answer one scan.
const WORKER_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
	let args = Args::parse();

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let mut config = match &args.config {
		Some(path) => {
			info!("Loading config from: {}", path.display());
			Config::load(path)?
		}
		None => Config::default(),
	};
	if let Some(scans) = args.scans {
		config.scene.scans = scans;
	}
	if let Some(seed) = args.seed {
		config.scene.seed = seed;
	}
	config.validate()?;

	info!(
		"Replaying {} scans of {}x{} with {} objects",
		config.scene.scans,
		config.scene.width,
		config.scene.height,
		config.scene.objects.len()
	);

	let mapper = InstanceMapper::new(config.mapper).context("Creating mapper")?;
	let mut scene = Scene::new(config.scene);

	let mapper = if args.worker {
		replay_on_worker(mapper, &mut scene)?
	} else {
		replay_inline(mapper, &mut scene)?
	};

	report(&mapper);

	if let Some(path) = &args.output_map {
		let background = mapper
			.store()
			.background()
			.context("Map is empty, nothing to write")?;
		let mut file = std::fs::File::create(path)
			.with_context(|| format!("Failed to create map file: {}", path.display()))?;
		background
			.write_binary(&mut file)
			.with_context(|| format!("Failed to write map: {}", path.display()))?;
		println!("  ✓ {}", path.display());
	}

	if let Some(path) = &args.grids_out {
		let grids = mapper.world_grids();
		let content =
			toml::to_string(&GridDump { grids: &grids }).context("Failed to serialize grids")?;
		std::fs::write(path, content)
			.with_context(|| format!("Failed to write grids: {}", path.display()))?;
		println!("  ✓ {}", path.display());
	}

	Ok(())
}

fn replay_inline(mut mapper: InstanceMapper, scene: &mut Scene) -> Result<InstanceMapper> {
	for index in 0..scene.len() {
		let scan = scene.capture(index);
		let outcome = mapper
			.process_scan(scan)
			.with_context(|| format!("Scan {} failed", index))?;
		log_outcome(index, &outcome);
	}
	Ok(mapper)
}

fn replay_on_worker(mapper: InstanceMapper, scene: &mut Scene) -> Result<InstanceMapper> {
	// Capture everything up front so the pose table is complete.
	let mut poses: HashMap<SystemTime, DAffine3> = HashMap::new();
	let mut inputs = Vec::with_capacity(scene.len());
	for index in 0..scene.len() {
		let scan = scene.capture(index);
		poses.insert(scan.stamp, scan.sensor_to_world);
		inputs.push(ScanInput {
			stamp: scan.stamp,
			intrinsics: scan.intrinsics,
			cloud: scan.cloud,
			labels: scan.labels,
			classes: scan.classes,
		});
	}

	let shared = mapper.into_shared();
	let worker = MapWorker::spawn(shared.clone(), move |stamp: SystemTime, _timeout: Duration| {
		poses.get(&stamp).copied()
	})
	.context("Spawning worker")?;

	for (index, input) in inputs.into_iter().enumerate() {
		if !worker.submit(input) {
			anyhow::bail!("worker stopped before scan {}", index);
		}
		match worker.wait_event(WORKER_TIMEOUT) {
			Some(WorkerEvent::Outcome { outcome, .. }) => log_outcome(index, &outcome),
			Some(WorkerEvent::Failed { error, .. }) => {
				return Err(error).with_context(|| format!("Scan {} failed", index));
			}
			None => anyhow::bail!("no answer from worker for scan {}", index),
		}
	}
	worker.shutdown();

	let mapper = std::sync::Arc::try_unwrap(shared)
		.map_err(|_| anyhow::anyhow!("mapper still shared after worker shutdown"))?
		.into_inner();
	Ok(mapper)
}

fn log_outcome(index: usize, outcome: &ScanOutcome) {
	match outcome {
		ScanOutcome::Processed(output) => info!(
			scan = index,
			points = output.insertion.points,
			created = output.insertion.created.len(),
			tracked = output.mapping.len(),
			grids = output.grids.len(),
			"scan processed"
		),
		other => warn!(scan = index, ?other, "scan not processed"),
	}
}

fn report(mapper: &InstanceMapper) {
	let catalog = &mapper.config().classes;

	println!("\nObjects:");
	for class in mapper.class_summary() {
		let name = catalog.name_of(class.class_id).unwrap_or("?");
		let bbox = mapper
			.store()
			.get(class.instance_id)
			.and_then(|entry| entry.bbox());
		match bbox {
			Some(bbox) => println!(
				"  #{:<3} {:<12} class {:<3} bbox {:.3?} .. {:.3?}",
				class.instance_id,
				name,
				class.class_id,
				bbox.min.to_array(),
				bbox.max.to_array()
			),
			None => println!(
				"  #{:<3} {:<12} class {:<3}",
				class.instance_id, name, class.class_id
			),
		}
	}

	println!("\nGrids:");
	for grid in mapper.world_grids() {
		println!(
			"  #{:<3} pitch {:.3} cells {}",
			grid.instance_id,
			grid.pitch,
			grid.len()
		);
	}

	print_metrics(mapper.metrics());
}

fn print_metrics(metrics: &MapMetrics) {
	println!("\nTimings (avg us over last {} scans):", metrics.insertion.len());
	for (label, stage) in [
		("projection", Stage::Projection),
		("tracking", Stage::Tracking),
		("insertion", Stage::Insertion),
		("export", Stage::Export),
		("publish", Stage::Publish),
	] {
		println!("  {:<11} {:>10.1}", label, metrics.window(stage).average());
	}
	println!("  {:<11} {:>10.1}", "total", metrics.avg_scan_us());
	println!(
		"\nScans: {} processed, {} stale, {} pose dropped, {} projection failed, {} skipped",
		metrics.processed,
		metrics.stale,
		metrics.pose_dropped,
		metrics.projection_failed,
		metrics.skipped
	);
}
