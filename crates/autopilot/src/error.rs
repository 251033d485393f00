// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the autopilot pipeline.

use frame_geometry::GeometryError;
use model_registry::{Device, RegistryError};
use std::path::PathBuf;

/// Errors raised while opening a model session.
///
/// The `Display` text is shown to the operator unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    /// The model file does not exist.
    #[error("model file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The model file exists but could not be opened or mapped.
    #[error("cannot read model '{name}': {detail}")]
    Unreadable { name: String, detail: String },

    /// The backend rejected the model contents.
    #[error("invalid model '{name}': {detail}")]
    InvalidModel { name: String, detail: String },

    /// The backend cannot run on the requested device.
    #[error("{backend} backend does not support device '{device}'")]
    UnsupportedDevice {
        backend: &'static str,
        device: Device,
    },

    /// CPU execution was requested with no threads.
    #[error("invalid thread count {threads}: at least one thread is required")]
    InvalidThreads { threads: u32 },

    /// The model declares geometry that cannot be resolved.
    #[error("model geometry rejected: {0}")]
    Geometry(#[from] GeometryError),
}

/// Errors raised by a running session. Any of these ends the session.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The session was closed before the call.
    #[error("inference requested on a closed session")]
    SessionClosed,

    /// The input buffer does not match the model input.
    #[error("input buffer holds {actual} bytes, model expects {expected}")]
    InputSize { expected: usize, actual: usize },

    /// The model runtime failed.
    #[error("model '{model}' failed: {detail}")]
    Runtime { model: String, detail: String },
}

/// Errors returned by the [`Pipeline`](crate::Pipeline) API.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// `start()` was called on a running pipeline.
    #[error("pipeline is already running")]
    AlreadyStarted,

    /// The operation needs a running pipeline.
    #[error("pipeline is not running")]
    NotRunning,

    /// The inference worker thread could not be spawned.
    #[error("failed to spawn inference worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Preferences could not be loaded or stored.
    #[error("preferences error: {0}")]
    Preferences(String),

    /// Model lookup or import failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_readable() {
        let e = ModelLoadError::NotFound {
            path: PathBuf::from("/models/a.tflite"),
        };
        assert_eq!(e.to_string(), "model file not found: /models/a.tflite");

        let e = ModelLoadError::UnsupportedDevice {
            backend: "reference",
            device: Device::Gpu,
        };
        assert_eq!(e.to_string(), "reference backend does not support device 'gpu'");
    }

    #[test]
    fn test_geometry_converts() {
        let e: ModelLoadError = GeometryError::InvalidCrop("left".into()).into();
        assert!(matches!(e, ModelLoadError::Geometry(_)));
    }
}
