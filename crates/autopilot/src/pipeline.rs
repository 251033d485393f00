// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The pipeline handle.
//!
//! [`Pipeline`] is what the rest of an application talks to: the camera
//! thread calls [`on_frame`](Pipeline::on_frame), control code calls the
//! setters and the autonomy toggle. All methods take `&self` and may be called
//! from any thread.

use crate::actuation::{ActuationGate, AutonomyMode, ToggleSource};
use crate::backend::{ModelBackend, ReferenceBackend};
use crate::config::{InferenceConfig, PipelineConfig};
use crate::control::{
    AppliedSpeeds, ControlCommand, ControlMode, DriveMode, SimulatedVehicle, SpeedMode, Toggle,
    Vehicle,
};
use crate::error::PipelineError;
use crate::metrics::{PipelineStats, StatsSnapshot};
use crate::observer::{LogObserver, PipelineObserver};
use crate::preferences::Preferences;
use crate::reconfigure::ConfigChange;
use crate::scheduler::{self, FrameDecision, InferenceScheduler, Shared, Task};
use crate::state::{PipelineSnapshot, PipelineState, SnapshotCell, StateCell};
use frame_geometry::Frame;
use model_registry::{Device, ModelDescriptor, ModelRegistry, SourceKind};
use std::io::Read;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Settings owned by the control side, guarded together with the worker
/// handle so requests reach the queue in the order they were accepted.
struct Control {
    desired: InferenceConfig,
    worker: Option<InferenceScheduler>,
    speed_mode: SpeedMode,
    control_mode: ControlMode,
    /// The operator's drive mode. The phone controller overrides it.
    drive_mode: DriveMode,
}

/// Builder for [`Pipeline`]. Every collaborator has an in-tree default.
pub struct PipelineBuilder {
    config: PipelineConfig,
    registry: Option<ModelRegistry>,
    backend: Option<Arc<dyn ModelBackend>>,
    vehicle: Option<Arc<dyn Vehicle>>,
    observer: Option<Arc<dyn PipelineObserver>>,
    preferences: Option<Arc<dyn Preferences>>,
}

impl PipelineBuilder {
    /// Registry to resolve model names (default: built-in manifest).
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Inference backend (default: [`ReferenceBackend`]).
    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Vehicle to drive (default: [`SimulatedVehicle`]).
    pub fn vehicle(mut self, vehicle: Arc<dyn Vehicle>) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    /// Notification sink (default: [`LogObserver`]).
    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Settings store. Without one, nothing is persisted.
    pub fn preferences(mut self, preferences: Arc<dyn Preferences>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Validates the config and resolves the initial model.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let config = self.config;
        config.validate()?;

        let registry = self.registry.unwrap_or_else(|| config.registry());
        let backend = self.backend.unwrap_or_else(|| {
            Arc::new(ReferenceBackend::new(&config.assets_dir, &config.models_dir))
        });
        let vehicle = self
            .vehicle
            .unwrap_or_else(|| Arc::new(SimulatedVehicle::new()));
        let observer = self.observer.unwrap_or_else(|| Arc::new(LogObserver));

        let stored = self
            .preferences
            .as_ref()
            .map(|p| p.settings())
            .unwrap_or_default();
        let desired = config.initial_inference(&registry, &stored)?;
        let speed_mode = stored.speed_mode.unwrap_or_default();
        let control_mode = stored.control_mode.unwrap_or_default();
        let drive_mode = stored.drive_mode.unwrap_or_default();
        vehicle.set_speed_multiplier(speed_mode.multiplier());
        vehicle.set_drive_mode(control_mode.drive_mode_for(drive_mode));

        let snapshot = Arc::new(SnapshotCell::default());
        let gate = ActuationGate::new(
            vehicle,
            Arc::clone(&observer),
            Arc::clone(&snapshot),
            config.safety_stop_delay(),
        );
        let shared = Arc::new(Shared {
            state: StateCell::new(PipelineState::Closed),
            stats: PipelineStats::default(),
            snapshot,
            gate,
            observer,
            preferences: self.preferences,
            stops_at_claim: AtomicU64::new(0),
        });

        tracing::info!("pipeline configured: {desired}, {} frames", config.frame_size());
        Ok(Pipeline {
            control: Mutex::new(Control {
                desired,
                worker: None,
                speed_mode,
                control_mode,
                drive_mode,
            }),
            config,
            registry,
            backend,
            shared,
        })
    }
}

/// Camera-driven inference and actuation pipeline.
///
/// ```text
/// Pipeline::builder(config).build()?  ──►  Closed
///        .start()                     ──►  Idle ──(model opens)──► Ready
///        .set_autonomous(true)             frames now drive the vehicle
///        .stop()                      ──►  Closed
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    registry: ModelRegistry,
    backend: Arc<dyn ModelBackend>,
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            registry: None,
            backend: None,
            vehicle: None,
            observer: None,
            preferences: None,
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Spawns the inference worker and opens the configured model on it.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut control = self.control();
        if control.worker.is_some() {
            return Err(PipelineError::AlreadyStarted);
        }
        self.shared.state.store(PipelineState::Idle);
        let worker = match InferenceScheduler::spawn(
            Arc::clone(&self.shared),
            Arc::clone(&self.backend),
            self.config.frame_size(),
            self.config.orientation(),
        ) {
            Ok(worker) => worker,
            Err(e) => {
                self.shared.state.store(PipelineState::Closed);
                return Err(e);
            }
        };
        worker.post(Task::Reconfigure(control.desired.clone()));
        control.worker = Some(worker);
        tracing::info!("pipeline started");
        Ok(())
    }

    /// Drains the queue, fires any pending safety stop, closes the session
    /// and joins the worker. A no-op when not running.
    pub fn stop(&self) {
        let worker = {
            let mut control = self.control();
            self.shared.state.store(PipelineState::Closed);
            control.worker.take()
        };
        match worker {
            Some(worker) => {
                tracing::info!("stopping pipeline");
                worker.shutdown();
                tracing::info!("pipeline stopped");
            }
            None => tracing::debug!("stop() on a pipeline that is not running"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.control().worker.is_some()
    }

    // ── Frames ─────────────────────────────────────────────────

    /// Offers a camera frame. Never blocks on inference.
    ///
    /// The claim and the post happen under the control lock, so a frame
    /// admitted before an autonomy toggle is queued before its safety stop.
    pub fn on_frame(&self, frame: Frame) -> FrameDecision {
        let control = self.control();
        let decision = scheduler::admit(&self.shared, &frame);
        if decision != FrameDecision::Submitted {
            return decision;
        }

        let posted = control
            .worker
            .as_ref()
            .is_some_and(|w| w.post(Task::Process(frame)));
        drop(control);
        if !posted {
            let _ = self
                .shared
                .state
                .transition(PipelineState::Inferring, PipelineState::Idle);
            return FrameDecision::Dropped(self.state());
        }

        let last = self.shared.stats.last_processing_ms();
        if last > 0 {
            self.shared.observer.on_fps(1000 / last);
        }
        decision
    }

    // ── Reconfiguration ────────────────────────────────────────

    /// Requests `config`. Returns `false`, and does nothing, if it equals the
    /// most recently requested config. While stopped the request is kept and
    /// applied by the next [`start`](Self::start).
    pub fn reconfigure(&self, config: InferenceConfig) -> bool {
        self.reconfigure_with(|_| config)
    }

    /// Derives the next config from the most recently requested one, under
    /// the same lock that accepts it.
    fn reconfigure_with(&self, next: impl FnOnce(&InferenceConfig) -> InferenceConfig) -> bool {
        let mut control = self.control();
        let config = next(&control.desired);
        let change = ConfigChange::between(&control.desired, &config);
        if change.is_empty() {
            tracing::debug!("reconfiguration to {config} is a no-op");
            return false;
        }
        tracing::info!("reconfiguration requested ({change}): {config}");
        control.desired = config.clone();
        if let Some(worker) = control.worker.as_ref() {
            worker.post(Task::Reconfigure(config));
        }
        true
    }

    pub fn set_model(&self, descriptor: ModelDescriptor) -> bool {
        self.reconfigure_with(|c| c.with_descriptor(descriptor))
    }

    pub fn set_device(&self, device: Device) -> bool {
        self.reconfigure_with(|c| c.with_device(device))
    }

    pub fn set_threads(&self, threads: u32) -> bool {
        self.reconfigure_with(|c| c.with_threads(threads))
    }

    /// The operator's "+" thread button. Returns `false` at the upper limit.
    pub fn more_threads(&self) -> bool {
        self.reconfigure_with(|c| c.with_threads(c.device.more_threads().threads))
    }

    /// The operator's "-" thread button. Returns `false` at the lower limit.
    pub fn fewer_threads(&self) -> bool {
        self.reconfigure_with(|c| c.with_threads(c.device.fewer_threads().threads))
    }

    /// Resolves `name` through the registry and selects it.
    pub fn select_model(&self, name: &str) -> Result<bool, PipelineError> {
        let descriptor = self.registry.resolve(name)?;
        Ok(self.set_model(descriptor))
    }

    /// Reopens the current model even though nothing changed, e.g. after its
    /// file was replaced.
    pub fn reload(&self) -> Result<(), PipelineError> {
        let control = self.control();
        let worker = control.worker.as_ref().ok_or(PipelineError::NotRunning)?;
        tracing::info!("reloading {}", control.desired);
        worker.post(Task::Reconfigure(control.desired.clone()));
        Ok(())
    }

    /// Imports a model file. If the selected model is that file, it is
    /// reloaded.
    pub fn import_model(
        &self,
        file_name: &str,
        data: &mut impl Read,
    ) -> Result<ModelDescriptor, PipelineError> {
        let descriptor = self.registry.import(file_name, data)?;
        if self.inference_config().descriptor == descriptor && self.is_running() {
            self.reload()?;
        }
        Ok(descriptor)
    }

    /// Deletes an imported model file. If it was selected, the first bundled
    /// autopilot is selected instead.
    pub fn remove_model(&self, file_name: &str) -> Result<bool, PipelineError> {
        let removed = self.registry.remove(file_name)?;
        let current = self.inference_config().descriptor;
        if removed && current.source_kind == SourceKind::File && current.locator == file_name {
            if let Some(fallback) = self.registry.bundled_autopilots().next().cloned() {
                tracing::info!("selected model removed, falling back to {}", fallback.name);
                self.set_model(fallback);
            }
        }
        Ok(removed)
    }

    // ── Autonomy & manual control ──────────────────────────────

    /// Plain autonomy toggle. Switching off schedules a stop after the
    /// configured safety delay.
    pub fn set_autonomous(&self, enabled: bool) {
        self.set_autonomous_with(enabled, ToggleSource::Plain);
    }

    /// Autonomy toggle with an explicit source. Switching off schedules a
    /// forced stop after the delay [`ToggleSource`] selects.
    pub fn set_autonomous_with(&self, enabled: bool, source: ToggleSource) {
        let mode = if enabled {
            AutonomyMode::Autonomous
        } else {
            AutonomyMode::Manual
        };
        let control = self.control();
        let last = Duration::from_millis(self.shared.stats.last_processing_ms());
        let Some(delay) = self.shared.gate.transition(mode, source, last) else {
            return;
        };
        let posted = control
            .worker
            .as_ref()
            .is_some_and(|w| w.post(Task::SafetyStop(Instant::now() + delay)));
        drop(control);
        if !posted {
            self.shared.gate.force_stop();
        }
    }

    pub fn autonomy(&self) -> AutonomyMode {
        self.shared.gate.mode()
    }

    pub fn manual_controls_enabled(&self) -> bool {
        self.shared.gate.manual_controls_enabled()
    }

    /// Sends a manual command. Refused while autonomous.
    pub fn drive_manual(&self, command: ControlCommand) -> Option<AppliedSpeeds> {
        self.shared.gate.drive_manual(command)
    }

    pub fn speed_mode(&self) -> SpeedMode {
        self.control().speed_mode
    }

    /// Changes the speed cap and persists it.
    pub fn set_speed_mode(&self, mode: SpeedMode) {
        let mut control = self.control();
        Self::apply_speed_mode(&mut control, &self.shared, mode);
    }

    /// Steps the speed mode and returns the new one.
    pub fn toggle_speed_mode(&self, direction: Toggle) -> SpeedMode {
        let mut control = self.control();
        let mode = control.speed_mode.toggle(direction);
        Self::apply_speed_mode(&mut control, &self.shared, mode);
        mode
    }

    fn apply_speed_mode(control: &mut Control, shared: &Shared, mode: SpeedMode) {
        if control.speed_mode == mode {
            return;
        }
        control.speed_mode = mode;
        shared.gate.set_speed_mode(mode);
        persist(shared, |p| p.set_speed_mode(mode));
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control().control_mode
    }

    /// Switches the manual input source. The phone controller forces dual
    /// drive on the vehicle; returning to the gamepad restores the operator's
    /// drive mode.
    pub fn set_control_mode(&self, mode: ControlMode) {
        let mut control = self.control();
        Self::apply_control_mode(&mut control, &self.shared, mode);
    }

    pub fn toggle_control_mode(&self) -> ControlMode {
        let mut control = self.control();
        let mode = control.control_mode.toggle();
        Self::apply_control_mode(&mut control, &self.shared, mode);
        mode
    }

    fn apply_control_mode(control: &mut Control, shared: &Shared, mode: ControlMode) {
        if control.control_mode == mode {
            return;
        }
        control.control_mode = mode;
        let effective = mode.drive_mode_for(control.drive_mode);
        tracing::info!("control mode {mode:?}, vehicle drive mode {effective:?}");
        shared.gate.vehicle().set_drive_mode(effective);
        persist(shared, |p| p.set_control_mode(mode));
    }

    /// Drive mode the vehicle is using.
    pub fn drive_mode(&self) -> DriveMode {
        let control = self.control();
        control.control_mode.drive_mode_for(control.drive_mode)
    }

    /// Drive mode can only be chosen while the gamepad is in control.
    pub fn drive_mode_enabled(&self) -> bool {
        self.control().control_mode == ControlMode::Gamepad
    }

    /// Selects a drive mode. Returns `false` when the phone controller is in
    /// control and the request was refused.
    pub fn set_drive_mode(&self, mode: DriveMode) -> bool {
        let mut control = self.control();
        Self::apply_drive_mode(&mut control, &self.shared, mode)
    }

    /// Dual → Game → Joystick → Dual. `None` while the phone controller is in
    /// control.
    pub fn cycle_drive_mode(&self) -> Option<DriveMode> {
        let mut control = self.control();
        let mode = control.drive_mode.toggle();
        Self::apply_drive_mode(&mut control, &self.shared, mode).then_some(mode)
    }

    fn apply_drive_mode(control: &mut Control, shared: &Shared, mode: DriveMode) -> bool {
        if control.control_mode != ControlMode::Gamepad {
            tracing::debug!("drive mode {mode:?} refused under {:?}", control.control_mode);
            return false;
        }
        if control.drive_mode != mode {
            control.drive_mode = mode;
            shared.gate.vehicle().set_drive_mode(mode);
            persist(shared, |p| p.set_drive_mode(mode));
        }
        true
    }

    // ── Observation ────────────────────────────────────────────

    pub fn state(&self) -> PipelineState {
        self.shared.state.load()
    }

    pub fn snapshot(&self) -> Arc<PipelineSnapshot> {
        self.shared.snapshot.load()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn last_processing_ms(&self) -> u64 {
        self.shared.stats.last_processing_ms()
    }

    /// The most recently requested inference config.
    pub fn inference_config(&self) -> InferenceConfig {
        self.control().desired.clone()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn vehicle(&self) -> &Arc<dyn Vehicle> {
        self.shared.gate.vehicle()
    }
}

fn persist(
    shared: &Shared,
    store: impl FnOnce(&dyn Preferences) -> Result<(), PipelineError>,
) {
    if let Some(preferences) = &shared.preferences {
        if let Err(e) = store(preferences.as_ref()) {
            tracing::warn!("could not persist setting: {e}");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state())
            .field("autonomy", &self.autonomy())
            .field("backend", &self.backend.name())
            .finish()
    }
}
