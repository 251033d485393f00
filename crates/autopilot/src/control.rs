// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Drive commands and the vehicle seam.
//!
//! Commands are differential: one normalised speed per side, nominally in
//! `[-1, 1]`. The [`Vehicle`] decides what it actually realises (it may clamp
//! or scale), and the pipeline always reads the realised speeds back.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

/// Left/right wheel command.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ControlCommand {
    pub left: f32,
    pub right: f32,
}

impl ControlCommand {
    /// Both wheels stopped.
    pub const STOP: ControlCommand = ControlCommand {
        left: 0.0,
        right: 0.0,
    };

    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Copy with both sides clamped to `[-1, 1]`. NaN becomes zero.
    pub fn clamped(&self) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        Self::new(clamp(self.left), clamp(self.right))
    }

    pub fn is_stop(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Turn indicator, fed to autopilot models as an auxiliary input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Left,
    #[default]
    Off,
    Right,
}

impl Indicator {
    /// Model-facing value: -1 left, 0 off, 1 right.
    pub fn signal(&self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Off => 0.0,
            Self::Right => 1.0,
        }
    }
}

/// Wheel speeds the vehicle reports after a command.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct AppliedSpeeds {
    pub left: f32,
    pub right: f32,
}

/// Speed cap selected by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedMode {
    Slow,
    #[default]
    Normal,
    Fast,
}

/// How [`SpeedMode::toggle`] moves through the modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Slow → Normal → Fast → Slow.
    Cyclic,
    /// One step faster, saturating.
    Up,
    /// One step slower, saturating.
    Down,
}

impl SpeedMode {
    /// Raw PWM ceiling for this mode.
    pub fn pwm(&self) -> u8 {
        match self {
            Self::Slow => 128,
            Self::Normal => 192,
            Self::Fast => 255,
        }
    }

    /// Fraction of full speed the vehicle may use.
    pub fn multiplier(&self) -> f32 {
        f32::from(self.pwm()) / 255.0
    }

    pub fn toggle(&self, direction: Toggle) -> Self {
        match (direction, self) {
            (Toggle::Cyclic, Self::Slow) | (Toggle::Up, Self::Slow) => Self::Normal,
            (Toggle::Cyclic, Self::Normal) | (Toggle::Up, Self::Normal) => Self::Fast,
            (Toggle::Cyclic, Self::Fast) => Self::Slow,
            (Toggle::Up, Self::Fast) => Self::Fast,
            (Toggle::Down, Self::Fast) => Self::Normal,
            (Toggle::Down, _) => Self::Slow,
        }
    }
}

/// Where manual commands come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[default]
    Gamepad,
    Phone,
}

impl ControlMode {
    pub fn toggle(&self) -> Self {
        match self {
            Self::Gamepad => Self::Phone,
            Self::Phone => Self::Gamepad,
        }
    }

    /// Drive mode the vehicle must use under this control mode. The phone
    /// controller only speaks dual drive.
    pub fn drive_mode_for(&self, selected: DriveMode) -> DriveMode {
        match self {
            Self::Gamepad => selected,
            Self::Phone => DriveMode::Dual,
        }
    }
}

/// How gamepad sticks map onto wheel commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// One stick per side.
    Dual,
    /// Triggers for throttle, stick for steering.
    #[default]
    Game,
    /// Single stick.
    Joystick,
}

impl DriveMode {
    /// Dual → Game → Joystick → Dual.
    pub fn toggle(&self) -> Self {
        match self {
            Self::Dual => Self::Game,
            Self::Game => Self::Joystick,
            Self::Joystick => Self::Dual,
        }
    }
}

// ── Vehicle seam ───────────────────────────────────────────────

/// The actuator the pipeline drives.
///
/// Implementations are shared between the inference worker and the control
/// thread, so every method takes `&self`.
pub trait Vehicle: Send + Sync {
    /// Sends a wheel command.
    fn set_control(&self, command: ControlCommand);

    /// Sends a wheel command given as two speeds.
    fn set_control_lr(&self, left: f32, right: f32) {
        self.set_control(ControlCommand::new(left, right));
    }

    /// Realised left wheel speed.
    fn left_speed(&self) -> f32;

    /// Realised right wheel speed.
    fn right_speed(&self) -> f32;

    /// Current turn indicator.
    fn indicator(&self) -> Indicator;

    /// Caps the realised speed at `multiplier` of full speed.
    fn set_speed_multiplier(&self, multiplier: f32);

    /// Selects how the vehicle interprets manual input.
    fn set_drive_mode(&self, _mode: DriveMode) {}
}

/// Commands a [`SimulatedVehicle`] remembers.
pub const HISTORY_CAPACITY: usize = 1024;

#[derive(Debug)]
struct SimState {
    command: ControlCommand,
    multiplier: f32,
    indicator: Indicator,
    drive_mode: DriveMode,
    history: VecDeque<(Instant, ControlCommand)>,
}

/// In-memory vehicle that clamps commands to `[-1, 1]` and scales them by the
/// speed multiplier. The last [`HISTORY_CAPACITY`] commands are kept with
/// their timestamps.
#[derive(Debug)]
pub struct SimulatedVehicle {
    state: Mutex<SimState>,
}

impl SimulatedVehicle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                command: ControlCommand::STOP,
                multiplier: 1.0,
                indicator: Indicator::Off,
                drive_mode: DriveMode::default(),
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            }),
        }
    }

    pub fn set_indicator(&self, indicator: Indicator) {
        if let Ok(mut s) = self.state.lock() {
            s.indicator = indicator;
        }
    }

    /// Last command received, before scaling.
    pub fn last_command(&self) -> ControlCommand {
        self.state
            .lock()
            .map(|s| s.command)
            .unwrap_or(ControlCommand::STOP)
    }

    /// Recent commands, oldest first.
    pub fn history(&self) -> Vec<(Instant, ControlCommand)> {
        self.state
            .lock()
            .map(|s| s.history.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.state
            .lock()
            .map(|s| s.drive_mode)
            .unwrap_or_default()
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.state.lock().map(|s| s.multiplier).unwrap_or(1.0)
    }

    fn realised(&self, pick: impl Fn(&ControlCommand) -> f32) -> f32 {
        self.state
            .lock()
            .map(|s| pick(&s.command.clamped()) * s.multiplier)
            .unwrap_or(0.0)
    }
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl Vehicle for SimulatedVehicle {
    fn set_control(&self, command: ControlCommand) {
        if let Ok(mut s) = self.state.lock() {
            s.command = command;
            if s.history.len() == HISTORY_CAPACITY {
                s.history.pop_front();
            }
            s.history.push_back((Instant::now(), command));
        }
        tracing::trace!("vehicle command l={:.3} r={:.3}", command.left, command.right);
    }

    fn left_speed(&self) -> f32 {
        self.realised(|c| c.left)
    }

    fn right_speed(&self) -> f32 {
        self.realised(|c| c.right)
    }

    fn indicator(&self) -> Indicator {
        self.state
            .lock()
            .map(|s| s.indicator)
            .unwrap_or(Indicator::Off)
    }

    fn set_speed_multiplier(&self, multiplier: f32) {
        if let Ok(mut s) = self.state.lock() {
            s.multiplier = multiplier.clamp(0.0, 1.0);
        }
    }

    fn set_drive_mode(&self, mode: DriveMode) {
        if let Ok(mut s) = self.state.lock() {
            s.drive_mode = mode;
        }
        tracing::debug!("vehicle drive mode {mode:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped() {
        let c = ControlCommand::new(1.7, f32::NAN).clamped();
        assert_eq!(c, ControlCommand::new(1.0, 0.0));
        assert!(ControlCommand::STOP.is_stop());
    }

    #[test]
    fn test_indicator_signal() {
        assert_eq!(Indicator::Left.signal(), -1.0);
        assert_eq!(Indicator::Off.signal(), 0.0);
        assert_eq!(Indicator::Right.signal(), 1.0);
    }

    #[test]
    fn test_speed_mode_toggle() {
        assert_eq!(SpeedMode::Fast.toggle(Toggle::Cyclic), SpeedMode::Slow);
        assert_eq!(SpeedMode::Fast.toggle(Toggle::Up), SpeedMode::Fast);
        assert_eq!(SpeedMode::Slow.toggle(Toggle::Down), SpeedMode::Slow);
        assert_eq!(SpeedMode::Normal.toggle(Toggle::Down), SpeedMode::Slow);
        assert_eq!(SpeedMode::Slow.toggle(Toggle::Up), SpeedMode::Normal);
        assert_eq!(SpeedMode::Fast.multiplier(), 1.0);
    }

    #[test]
    fn test_mode_toggles_cycle() {
        assert_eq!(DriveMode::Joystick.toggle(), DriveMode::Dual);
        assert_eq!(ControlMode::Phone.toggle(), ControlMode::Gamepad);
        assert_eq!(ControlMode::Phone.drive_mode_for(DriveMode::Game), DriveMode::Dual);
        assert_eq!(
            ControlMode::Gamepad.drive_mode_for(DriveMode::Joystick),
            DriveMode::Joystick
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let v = SimulatedVehicle::new();
        for i in 0..HISTORY_CAPACITY + 10 {
            v.set_control_lr(i as f32, 0.0);
        }
        let history = v.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history[0].1, ControlCommand::new(10.0, 0.0));
        assert_eq!(
            history[HISTORY_CAPACITY - 1].1,
            ControlCommand::new((HISTORY_CAPACITY + 9) as f32, 0.0)
        );
    }

    #[test]
    fn test_simulated_vehicle_scales_and_records() {
        let v = SimulatedVehicle::new();
        v.set_speed_multiplier(0.5);
        v.set_control_lr(2.0, -0.5);
        assert_eq!(v.left_speed(), 0.5);
        assert_eq!(v.right_speed(), -0.25);
        assert_eq!(v.last_command(), ControlCommand::new(2.0, -0.5));
        assert_eq!(v.history().len(), 1);

        v.set_indicator(Indicator::Right);
        assert_eq!(v.indicator(), Indicator::Right);
    }
}
