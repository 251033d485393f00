// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `autopilot drive` command: run the pipeline against a synthetic camera.
//!
//! ```text
//! start → Ready → autonomy on → frames (→ thread swap) → autonomy off → safety stop → stop
//! ```

use crate::StopToggle;
use anyhow::Context;
use autopilot::{
    ChannelObserver, FrameDecision, Pipeline, PipelineConfig, PipelineEvent, PipelineState,
    ReferenceBackend, SimulatedVehicle, ToggleSource, TomlPreferences,
};
use frame_geometry::{CaptureMetadata, Frame, Size};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Name the synthetic model is imported under when the configured one is missing.
const DEMO_MODEL: &str = "demo_autopilot.tflite";

/// How long to wait for the first session to open.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DriveOptions {
    pub model: Option<String>,
    pub threads: Option<u32>,
    pub seconds: u64,
    pub fps: u32,
    pub swap_threads: Option<u32>,
    pub toggle: StopToggle,
    pub preferences: Option<PathBuf>,
}

pub async fn execute(mut config: PipelineConfig, options: DriveOptions) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              autopilot · Drive Session              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    if let Some(model) = options.model.clone() {
        config.inference.model = model;
    }
    if let Some(threads) = options.threads {
        config.inference.threads = threads;
    }
    config.validate()?;

    let backend = Arc::new(ReferenceBackend::new(
        config.assets_dir.clone(),
        config.models_dir.clone(),
    ));
    ensure_model_file(&mut config, &backend)?;

    println!("  Config:");
    println!("   Model:     {}", super::truncate(&config.inference.model, 40));
    println!("   Device:    {} ({} threads)", config.inference.device, config.inference.threads);
    println!("   Frames:    {} @ {} fps", config.frame_size(), options.fps);
    println!("   Duration:  {} s", options.seconds);
    println!("   Stop:      {:?} toggle", options.toggle);
    if let Some(swap) = options.swap_threads {
        println!("   Swap:      → {swap} threads at half time");
    }
    println!();

    let vehicle = Arc::new(SimulatedVehicle::new());
    let (observer, events) = ChannelObserver::new(1024);
    let mut builder = Pipeline::builder(config.clone())
        .backend(backend)
        .vehicle(vehicle.clone())
        .observer(Arc::new(observer));
    if let Some(path) = options.preferences.as_ref() {
        builder = builder.preferences(Arc::new(TomlPreferences::open(path)?));
    }
    let pipeline = builder.build()?;

    // Step 1: open the model on the worker.
    println!("  [1/4] Opening {}...", pipeline.inference_config());
    pipeline.start()?;
    wait_until_open(&pipeline).await?;
    let snapshot = pipeline.snapshot();
    println!(
        "        Input: {}",
        snapshot.input_resolution.as_deref().unwrap_or("unknown")
    );
    println!();

    // Step 2: drive.
    println!("  [2/4] Driving autonomously...");
    pipeline.set_autonomous(true);
    let submitted = run_camera(&pipeline, &config, &options).await;
    println!("        Submitted {submitted} frames.");
    println!();

    // Step 3: hand control back.
    let source = match options.toggle {
        StopToggle::Plain => ToggleSource::Plain,
        StopToggle::Announced => ToggleSource::Announced,
    };
    println!("  [3/4] Leaving autonomy ({source:?} toggle)...");
    pipeline.set_autonomous_with(false, source);
    println!("        Last command: {:?}", vehicle.last_command());
    let delay = match source {
        ToggleSource::Plain => config.safety_stop_delay(),
        ToggleSource::Announced => Duration::from_millis(pipeline.last_processing_ms()),
    };
    tokio::time::sleep(delay + Duration::from_millis(50)).await;
    println!("        After {} ms: {:?}", delay.as_millis(), vehicle.last_command());
    println!();

    // Step 4: shut down.
    println!("  [4/4] Stopping pipeline...");
    let stopper = Arc::new(pipeline);
    let handle = Arc::clone(&stopper);
    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .context("pipeline shutdown panicked")?;
    println!("        State: {}", stopper.state());
    println!();

    print_results(&stopper, events.try_iter().collect());
    Ok(())
}

/// Imports a synthetic model if the configured one has no file on disk.
fn ensure_model_file(
    config: &mut PipelineConfig,
    backend: &ReferenceBackend,
) -> anyhow::Result<()> {
    let registry = config.registry();
    let descriptor = registry.resolve(&config.inference.model)?;
    if backend.model_path(&descriptor).is_file() {
        return Ok(());
    }

    tracing::warn!(
        "no model file at {}",
        backend.model_path(&descriptor).display()
    );
    println!("  Model file not found. Importing a synthetic model as '{DEMO_MODEL}'...");
    println!();
    let mut bytes: &[u8] = b"synthetic autopilot weights";
    registry.import(DEMO_MODEL, &mut bytes)?;
    config.inference.model = DEMO_MODEL.to_string();
    Ok(())
}

/// Polls until the first session is open, or reports why it is not.
async fn wait_until_open(pipeline: &Pipeline) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + OPEN_TIMEOUT;
    loop {
        let snapshot = pipeline.snapshot();
        if let Some(error) = snapshot.last_error.as_deref() {
            anyhow::bail!("model failed to open: {error}");
        }
        if pipeline.state() == PipelineState::Ready {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("model did not open within {OPEN_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Feeds synthetic frames at the requested rate until the time is up or
/// Ctrl-C. Returns how many were submitted to the model.
async fn run_camera(pipeline: &Pipeline, config: &PipelineConfig, options: &DriveOptions) -> u64 {
    let fps = options.fps.max(1);
    let total = options.seconds * u64::from(fps);
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps);
    let mut submitted = 0;

    for n in 0..total {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("        Interrupted after {n} frames.");
                break;
            }
        }
        if n == total / 2 {
            if let Some(threads) = options.swap_threads {
                let requested = pipeline.set_threads(threads);
                tracing::info!("hot swap to {threads} threads (requested: {requested})");
            }
        }
        let frame = synthetic_frame(config.frame_size(), n, total);
        if pipeline.on_frame(frame) == FrameDecision::Submitted {
            submitted += 1;
        }
    }
    submitted
}

/// A grey frame with a bright band sweeping left to right.
fn synthetic_frame(size: Size, n: u64, total: u64) -> Frame {
    let band = (n * u64::from(size.width) / total.max(1)) as u32;
    let half_width = (size.width / 8).max(1);
    Frame::from_fn(size, CaptureMetadata::now(n), |x, _| {
        let v = if x.abs_diff(band) < half_width { 220 } else { 60 };
        [v, v, v, 255]
    })
}

fn print_results(pipeline: &Pipeline, events: Vec<PipelineEvent>) {
    let stats = pipeline.stats();
    let fps_updates = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Fps(_)))
        .count();
    let errors: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Error(message) => Some(message),
            _ => None,
        })
        .collect();

    println!("  Results:");
    println!("   FPS estimate:  {}", stats.fps().map_or("n/a".to_string(), |f| f.to_string()));
    println!("   FPS updates:   {fps_updates}");
    println!("   Errors:        {}", errors.len());
    for error in errors {
        println!("    - {}", super::truncate(error, 70));
    }
    println!();
    println!("  Metrics:");
    for line in stats.summary().lines() {
        println!("   {line}");
    }
    println!();
}
