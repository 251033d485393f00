// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline notifications.
//!
//! Observers are called from the camera thread, the control thread and the
//! inference worker. Implementations must return promptly: the pipeline never
//! waits for a slow consumer.

use crate::actuation::{AutonomyMode, ToggleSource};
use crate::control::AppliedSpeeds;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};

/// Receives pipeline notifications. Every method defaults to a no-op.
pub trait PipelineObserver: Send + Sync {
    /// Throughput estimate derived from the last inference.
    fn on_fps(&self, _fps: u64) {}

    /// Input size of a newly opened model, formatted `"WxH"`.
    fn on_input_resolution(&self, _resolution: &str) {}

    /// Speeds the vehicle reported after a command.
    fn on_wheel_speeds(&self, _speeds: AppliedSpeeds) {}

    /// Message to show the operator.
    fn on_error(&self, _message: &str) {}

    /// Any object-tracking state tied to the old model should be cleared.
    fn on_tracking_reset(&self) {}

    /// Autonomy was switched; manual controls are enabled iff `mode` is manual.
    fn on_autonomy_changed(&self, _mode: AutonomyMode, _source: ToggleSource) {}
}

/// Observer that writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_fps(&self, fps: u64) {
        tracing::trace!("fps: {fps}");
    }

    fn on_input_resolution(&self, resolution: &str) {
        tracing::info!("model input: {resolution}");
    }

    fn on_wheel_speeds(&self, speeds: AppliedSpeeds) {
        tracing::trace!("wheels: l={:.3} r={:.3}", speeds.left, speeds.right);
    }

    fn on_error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn on_tracking_reset(&self) {
        tracing::debug!("tracking reset");
    }

    fn on_autonomy_changed(&self, mode: AutonomyMode, source: ToggleSource) {
        tracing::info!("autonomy {mode:?} ({source:?} toggle)");
    }
}

/// Event form of the [`PipelineObserver`] callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Fps(u64),
    InputResolution(String),
    WheelSpeeds(AppliedSpeeds),
    Error(String),
    TrackingReset,
    AutonomyChanged {
        mode: AutonomyMode,
        source: ToggleSource,
    },
}

/// Observer that forwards events into a bounded channel.
///
/// When the channel is full the event is discarded and counted in the log;
/// senders are never blocked.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<PipelineEvent>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    fn send(&self, event: PipelineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!("observer channel full, dropped {event:?}");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl PipelineObserver for ChannelObserver {
    fn on_fps(&self, fps: u64) {
        self.send(PipelineEvent::Fps(fps));
    }

    fn on_input_resolution(&self, resolution: &str) {
        self.send(PipelineEvent::InputResolution(resolution.to_string()));
    }

    fn on_wheel_speeds(&self, speeds: AppliedSpeeds) {
        self.send(PipelineEvent::WheelSpeeds(speeds));
    }

    fn on_error(&self, message: &str) {
        self.send(PipelineEvent::Error(message.to_string()));
    }

    fn on_tracking_reset(&self) {
        self.send(PipelineEvent::TrackingReset);
    }

    fn on_autonomy_changed(&self, mode: AutonomyMode, source: ToggleSource) {
        self.send(PipelineEvent::AutonomyChanged { mode, source });
    }
}
