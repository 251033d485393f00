// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # autopilot
//!
//! Turns a stream of camera frames into wheel commands.
//!
//! The pipeline takes:
//! - Camera [`Frame`](frame_geometry::Frame)s from any thread.
//! - A [`ModelDescriptor`](model_registry::ModelDescriptor) and
//!   [`DeviceConfig`](model_registry::DeviceConfig) naming the model to run.
//! - A [`Vehicle`] to drive.
//!
//! Frames are admitted one at a time: while an inference is in flight every
//! other frame is dropped, never queued. Inference, model swaps and delayed
//! safety stops all run in order on a single worker thread.
//!
//! # Example
//! ```no_run
//! use autopilot::{Pipeline, PipelineConfig};
//! use frame_geometry::{CaptureMetadata, Frame, Size};
//!
//! let pipeline = Pipeline::builder(PipelineConfig::default()).build()?;
//! pipeline.start()?;
//! pipeline.set_autonomous(true);
//!
//! let frame = Frame::filled(Size::new(1280, 720), [90, 90, 90, 255], CaptureMetadata::now(0));
//! pipeline.on_frame(frame);
//!
//! pipeline.set_autonomous(false);
//! pipeline.stop();
//! # Ok::<(), autopilot::PipelineError>(())
//! ```

mod actuation;
mod backend;
mod config;
mod control;
mod error;
mod metrics;
mod observer;
mod pipeline;
mod preferences;
mod reconfigure;
mod scheduler;
mod session;
mod state;

pub use actuation::{AutonomyMode, ToggleSource, SAFETY_STOP_DELAY};
pub use backend::{
    default_model_info, LoadedModel, ModelBackend, ModelInfo, ReferenceBackend, AUTOPILOT_TOP_CROP,
};
pub use config::{InferenceConfig, InferenceSettings, PipelineConfig, DEFAULT_SAFETY_STOP_MS};
pub use control::{
    AppliedSpeeds, ControlCommand, ControlMode, DriveMode, Indicator, SimulatedVehicle, SpeedMode,
    Toggle, Vehicle,
};
pub use error::{InferenceError, ModelLoadError, PipelineError};
pub use metrics::StatsSnapshot;
pub use observer::{ChannelObserver, LogObserver, PipelineEvent, PipelineObserver};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use preferences::{MemoryPreferences, Preferences, StoredSettings, TomlPreferences};
pub use reconfigure::ConfigChange;
pub use scheduler::{FrameDecision, WORKER_THREAD_NAME};
pub use session::{FrameGeometry, ModelSession};
pub use state::{PipelineSnapshot, PipelineState};
