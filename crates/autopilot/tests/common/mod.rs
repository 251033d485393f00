// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use autopilot::{
    ControlCommand, Indicator, InferenceError, InferenceSettings, LoadedModel, ModelBackend,
    ModelInfo, ModelLoadError, Pipeline, PipelineConfig, PipelineObserver, SimulatedVehicle,
    Vehicle,
};
use frame_geometry::{CaptureMetadata, CropRect, Frame, Size};
use model_registry::{Device, DeviceConfig, ModelDescriptor};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Command every mock model produces.
pub const MOCK_COMMAND: ControlCommand = ControlCommand::new(0.3, 0.3);

/// Frame size used throughout the tests.
pub const FRAME: Size = Size::new(64, 48);

// ── Mock backend ───────────────────────────────────────────────

/// Everything the mock backend and its models record.
#[derive(Default)]
pub struct Probe {
    events: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fail_next_infer: AtomicBool,
    pub thread_names: Mutex<Vec<String>>,
}

impl Probe {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    /// `open:<name>@<threads>`, `infer:<name>` and `close:<name>`, in order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        let prefix = format!("{kind}:");
        self.events().iter().filter(|e| e.starts_with(&prefix)).count()
    }
}

/// Backend whose models return [`MOCK_COMMAND`] after a configurable delay.
pub struct MockBackend {
    pub probe: Arc<Probe>,
    infer_delay: Duration,
    missing: Mutex<HashSet<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            infer_delay: Duration::ZERO,
            missing: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_infer_delay(mut self, delay: Duration) -> Self {
        self.infer_delay = delay;
        self
    }

    /// Makes loads of `name` fail with `NotFound`.
    pub fn make_missing(&self, name: &str) {
        self.missing.lock().unwrap().insert(name.to_string());
    }
}

impl ModelBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn load(
        &self,
        descriptor: &ModelDescriptor,
        device: &DeviceConfig,
    ) -> Result<Box<dyn LoadedModel>, ModelLoadError> {
        let thread = std::thread::current().name().unwrap_or("<unnamed>").to_string();
        self.probe.thread_names.lock().unwrap().push(thread);

        if self.missing.lock().unwrap().contains(&descriptor.name) {
            return Err(ModelLoadError::NotFound {
                path: PathBuf::from("/models").join(&descriptor.locator),
            });
        }
        self.probe
            .push(format!("open:{}@{}", descriptor.name, device.threads));
        Ok(Box::new(MockModel {
            name: descriptor.name.clone(),
            info: ModelInfo {
                input_size: descriptor.input_size,
                crop: CropRect::NONE,
                maintain_aspect: false,
            },
            probe: Arc::clone(&self.probe),
            delay: self.infer_delay,
        }))
    }
}

struct MockModel {
    name: String,
    info: ModelInfo,
    probe: Arc<Probe>,
    delay: Duration,
}

impl LoadedModel for MockModel {
    fn info(&self) -> ModelInfo {
        self.info
    }

    fn infer(
        &mut self,
        input: &[u8],
        _indicator: Indicator,
    ) -> Result<ControlCommand, InferenceError> {
        assert_eq!(input.len(), self.info.input_size.rgba_len());
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.probe.push(format!("infer:{}", self.name));
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.probe.fail_next_infer.swap(false, Ordering::SeqCst) {
            return Err(InferenceError::Runtime {
                model: self.name.clone(),
                detail: "delegate failed".into(),
            });
        }
        Ok(MOCK_COMMAND)
    }

    fn close(&mut self) {
        self.probe.push(format!("close:{}", self.name));
    }
}

// ── Vehicles ───────────────────────────────────────────────────

/// Simulated vehicle that takes `stop_delay` to execute a stop command.
pub struct SlowStopVehicle {
    pub inner: SimulatedVehicle,
    stop_delay: Duration,
}

impl SlowStopVehicle {
    pub fn new(stop_delay: Duration) -> Self {
        Self {
            inner: SimulatedVehicle::new(),
            stop_delay,
        }
    }
}

impl Vehicle for SlowStopVehicle {
    fn set_control(&self, command: ControlCommand) {
        if command.is_stop() {
            std::thread::sleep(self.stop_delay);
        }
        self.inner.set_control(command);
    }

    fn left_speed(&self) -> f32 {
        self.inner.left_speed()
    }

    fn right_speed(&self) -> f32 {
        self.inner.right_speed()
    }

    fn indicator(&self) -> Indicator {
        self.inner.indicator()
    }

    fn set_speed_multiplier(&self, multiplier: f32) {
        self.inner.set_speed_multiplier(multiplier);
    }
}

// ── Helpers ────────────────────────────────────────────────────

/// Config selecting the file model `a.tflite` on one CPU thread.
pub fn config(safety_stop_ms: u64) -> PipelineConfig {
    let dir = std::env::temp_dir().join(format!("autopilot_it_{}", std::process::id()));
    PipelineConfig {
        frame_width: FRAME.width,
        frame_height: FRAME.height,
        assets_dir: dir.join("assets"),
        models_dir: dir.join("models"),
        safety_stop_ms,
        inference: InferenceSettings {
            model: "a.tflite".into(),
            device: Device::Cpu,
            threads: 1,
        },
        ..Default::default()
    }
}

pub fn pipeline(
    backend: &Arc<MockBackend>,
    vehicle: Arc<dyn Vehicle>,
    observer: Arc<dyn PipelineObserver>,
    safety_stop_ms: u64,
) -> Pipeline {
    Pipeline::builder(config(safety_stop_ms))
        .backend(backend.clone())
        .vehicle(vehicle)
        .observer(observer)
        .build()
        .unwrap()
}

pub fn frame(n: u64) -> Frame {
    Frame::from_fn(FRAME, CaptureMetadata::now(n), |x, _| {
        let v = if x < FRAME.width / 2 { 40 } else { 200 };
        [v, v, v, 255]
    })
}

/// Polls `cond` every 2 ms for up to 5 s.
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}
