// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Autonomy gate between model output, manual input and the vehicle.
//!
//! While autonomous, model commands reach the vehicle and manual commands are
//! refused. Leaving autonomy always ends with a forced stop; the caller decides
//! when it lands (see [`ToggleSource`]).

use crate::control::{AppliedSpeeds, ControlCommand, SpeedMode, Vehicle};
use crate::observer::PipelineObserver;
use crate::state::SnapshotCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delay before the forced stop after a plain autonomy toggle.
pub const SAFETY_STOP_DELAY: Duration = Duration::from_millis(500);

/// Who is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum AutonomyMode {
    Manual,
    Autonomous,
}

/// How autonomy was switched off, which decides when the forced stop lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ToggleSource {
    /// Button or API call: stop after the configured safety delay.
    Plain,
    /// Announced toggle (audio feedback path): stop after one inference
    /// period, so the command already in flight is overridden.
    Announced,
}

/// Routes commands to the vehicle according to the autonomy mode.
pub struct ActuationGate {
    vehicle: Arc<dyn Vehicle>,
    observer: Arc<dyn PipelineObserver>,
    snapshot: Arc<SnapshotCell>,
    autonomous: AtomicBool,
    safety_stop_delay: Duration,
}

impl ActuationGate {
    pub(crate) fn new(
        vehicle: Arc<dyn Vehicle>,
        observer: Arc<dyn PipelineObserver>,
        snapshot: Arc<SnapshotCell>,
        safety_stop_delay: Duration,
    ) -> Self {
        Self {
            vehicle,
            observer,
            snapshot,
            autonomous: AtomicBool::new(false),
            safety_stop_delay,
        }
    }

    pub fn vehicle(&self) -> &Arc<dyn Vehicle> {
        &self.vehicle
    }

    /// Sends `command` to the vehicle and publishes the realised speeds.
    pub fn apply(&self, command: ControlCommand) -> AppliedSpeeds {
        self.vehicle.set_control(command);
        let speeds = AppliedSpeeds {
            left: self.vehicle.left_speed(),
            right: self.vehicle.right_speed(),
        };
        self.snapshot.update(|s| s.applied = Some(speeds));
        self.observer.on_wheel_speeds(speeds);
        speeds
    }

    /// Zeroes both wheels.
    pub fn force_stop(&self) -> AppliedSpeeds {
        self.apply(ControlCommand::STOP)
    }

    pub fn mode(&self) -> AutonomyMode {
        if self.autonomous.load(Ordering::Acquire) {
            AutonomyMode::Autonomous
        } else {
            AutonomyMode::Manual
        }
    }

    pub fn is_autonomous(&self) -> bool {
        self.mode() == AutonomyMode::Autonomous
    }

    /// Manual controls are usable only while not autonomous.
    pub fn manual_controls_enabled(&self) -> bool {
        !self.is_autonomous()
    }

    /// Delay after which the forced stop must land for `source`.
    pub fn stop_delay(&self, source: ToggleSource, last_processing: Duration) -> Duration {
        match source {
            ToggleSource::Plain => self.safety_stop_delay,
            ToggleSource::Announced => last_processing,
        }
    }

    /// Switches the mode and notifies the observer.
    ///
    /// Returns the delay of the forced stop the caller must schedule when
    /// autonomy is being switched off, `None` when it is switched on.
    pub fn transition(
        &self,
        mode: AutonomyMode,
        source: ToggleSource,
        last_processing: Duration,
    ) -> Option<Duration> {
        let enable = mode == AutonomyMode::Autonomous;
        let was = self.autonomous.swap(enable, Ordering::AcqRel);
        if was != enable {
            tracing::info!("autonomy → {mode:?} ({source:?} toggle)");
        }
        self.snapshot.update(|s| s.autonomy = mode);
        self.observer.on_autonomy_changed(mode, source);
        (!enable).then(|| self.stop_delay(source, last_processing))
    }

    /// Applies a manual command. Refused (returns `None`) while autonomous.
    pub fn drive_manual(&self, command: ControlCommand) -> Option<AppliedSpeeds> {
        if self.is_autonomous() {
            tracing::debug!("manual command ignored while autonomous");
            return None;
        }
        Some(self.apply(command))
    }

    pub fn set_speed_mode(&self, mode: SpeedMode) {
        self.vehicle.set_speed_multiplier(mode.multiplier());
    }
}

impl std::fmt::Debug for ActuationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuationGate")
            .field("mode", &self.mode())
            .field("safety_stop_delay", &self.safety_stop_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::SimulatedVehicle;
    use crate::observer::LogObserver;

    fn gate() -> (ActuationGate, Arc<SimulatedVehicle>, Arc<SnapshotCell>) {
        let vehicle = Arc::new(SimulatedVehicle::new());
        let snapshot = Arc::new(SnapshotCell::default());
        let gate = ActuationGate::new(
            vehicle.clone(),
            Arc::new(LogObserver),
            Arc::clone(&snapshot),
            SAFETY_STOP_DELAY,
        );
        (gate, vehicle, snapshot)
    }

    #[test]
    fn test_apply_reads_back_realised_speeds() {
        let (gate, vehicle, snapshot) = gate();
        vehicle.set_speed_multiplier(0.5);
        let speeds = gate.apply(ControlCommand::new(1.0, 3.0));
        assert_eq!(speeds, AppliedSpeeds { left: 0.5, right: 0.5 });
        assert_eq!(snapshot.load().applied, Some(speeds));
    }

    #[test]
    fn test_manual_refused_while_autonomous() {
        let (gate, vehicle, _) = gate();
        assert!(gate.manual_controls_enabled());
        assert!(gate.drive_manual(ControlCommand::new(0.2, 0.2)).is_some());

        assert_eq!(
            gate.transition(AutonomyMode::Autonomous, ToggleSource::Plain, Duration::ZERO),
            None
        );
        assert!(!gate.manual_controls_enabled());
        assert!(gate.drive_manual(ControlCommand::new(1.0, 1.0)).is_none());
        assert_eq!(vehicle.last_command(), ControlCommand::new(0.2, 0.2));
    }

    #[test]
    fn test_stop_delay_per_source() {
        let (gate, _, snapshot) = gate();
        gate.transition(AutonomyMode::Autonomous, ToggleSource::Plain, Duration::ZERO);
        let last = Duration::from_millis(37);
        assert_eq!(
            gate.transition(AutonomyMode::Manual, ToggleSource::Plain, last),
            Some(SAFETY_STOP_DELAY)
        );
        assert_eq!(
            gate.transition(AutonomyMode::Manual, ToggleSource::Announced, last),
            Some(last)
        );
        assert_eq!(snapshot.load().autonomy, AutonomyMode::Manual);
    }

    #[test]
    fn test_speed_mode_sets_multiplier() {
        let (gate, vehicle, _) = gate();
        gate.set_speed_mode(SpeedMode::Slow);
        assert!((vehicle.speed_multiplier() - 128.0 / 255.0).abs() < 1e-6);
    }
}
