// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference backends.
//!
//! A [`ModelBackend`] turns a [`ModelDescriptor`] into a [`LoadedModel`].
//! Backends are shared across threads; a loaded model is owned by exactly one
//! session and only ever touched from the inference worker.
//!
//! [`ReferenceBackend`] memory-maps the model file and runs a small,
//! deterministic steering rule over the input image. It has the same failure
//! surface as a real runtime (missing file, unreadable file, empty model,
//! unsupported device) and is what the CLI and the tests drive.

use crate::control::{ControlCommand, Indicator};
use crate::error::{InferenceError, ModelLoadError};
use frame_geometry::{CropRect, Size, BYTES_PER_PIXEL};
use model_registry::{DeviceConfig, ModelDescriptor, ModelKind, SourceKind};
use std::path::{Path, PathBuf};

/// Input geometry a loaded model declares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInfo {
    pub input_size: Size,
    /// Margins trimmed from the camera frame before scaling.
    pub crop: CropRect,
    /// Keep the frame's aspect ratio when scaling into the input.
    pub maintain_aspect: bool,
}

/// Source of loadable models.
pub trait ModelBackend: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Loads `descriptor` for execution on `device`.
    fn load(
        &self,
        descriptor: &ModelDescriptor,
        device: &DeviceConfig,
    ) -> Result<Box<dyn LoadedModel>, ModelLoadError>;
}

/// A model ready to run.
pub trait LoadedModel: Send {
    fn info(&self) -> ModelInfo;

    /// Runs one inference over an RGBA `input` of exactly
    /// `info().input_size.rgba_len()` bytes.
    fn infer(
        &mut self,
        input: &[u8],
        indicator: Indicator,
    ) -> Result<ControlCommand, InferenceError>;

    /// Releases the model's resources. Called at most once.
    fn close(&mut self);
}

/// Top margin autopilot networks trim from the camera frame.
pub const AUTOPILOT_TOP_CROP: f32 = 240.0 / 720.0;

/// Geometry a model of this kind expects when nothing else is declared.
pub fn default_model_info(descriptor: &ModelDescriptor) -> ModelInfo {
    match descriptor.kind {
        ModelKind::Autopilot => ModelInfo {
            input_size: descriptor.input_size,
            crop: CropRect::top(AUTOPILOT_TOP_CROP),
            maintain_aspect: false,
        },
        ModelKind::Detector => ModelInfo {
            input_size: descriptor.input_size,
            crop: CropRect::NONE,
            maintain_aspect: true,
        },
    }
}

// ── Reference backend ──────────────────────────────────────────

/// Forward speed of the reference model.
const THROTTLE: f32 = 0.5;
/// How strongly brightness imbalance turns the vehicle.
const STEER_GAIN: f32 = 1.5;
/// Extra steering applied when the indicator is on.
const INDICATOR_BIAS: f32 = 0.25;

/// File-backed backend with a deterministic steering rule.
pub struct ReferenceBackend {
    assets_dir: PathBuf,
    models_dir: PathBuf,
}

impl ReferenceBackend {
    /// Bundled locators resolve against `assets_dir`, imported files
    /// against `models_dir`.
    pub fn new(assets_dir: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            models_dir: models_dir.into(),
        }
    }

    /// Path the descriptor's locator points at.
    pub fn model_path(&self, descriptor: &ModelDescriptor) -> PathBuf {
        match descriptor.source_kind {
            SourceKind::Bundled => self.assets_dir.join(&descriptor.locator),
            SourceKind::File => self.models_dir.join(&descriptor.locator),
        }
    }

    fn map_file(&self, name: &str, path: &Path) -> Result<memmap2::Mmap, ModelLoadError> {
        let unreadable = |e: std::io::Error| ModelLoadError::Unreadable {
            name: name.to_string(),
            detail: e.to_string(),
        };
        let file = std::fs::File::open(path).map_err(unreadable)?;
        let len = file.metadata().map_err(unreadable)?.len();
        if len == 0 {
            return Err(ModelLoadError::InvalidModel {
                name: name.to_string(),
                detail: "model file is empty".into(),
            });
        }
        // SAFETY: the mapping is read-only and model files are not modified
        // while a session holds them.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(unreadable)?;
        tracing::info!("mmap'd model file: {} ({} bytes)", path.display(), mmap.len());
        Ok(mmap)
    }
}

impl ModelBackend for ReferenceBackend {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn load(
        &self,
        descriptor: &ModelDescriptor,
        device: &DeviceConfig,
    ) -> Result<Box<dyn LoadedModel>, ModelLoadError> {
        if device.device.is_accelerator() {
            return Err(ModelLoadError::UnsupportedDevice {
                backend: self.name(),
                device: device.device,
            });
        }
        let path = self.model_path(descriptor);
        if !path.exists() {
            return Err(ModelLoadError::NotFound { path });
        }
        let weights = self.map_file(&descriptor.name, &path)?;

        Ok(Box::new(ReferenceModel {
            name: descriptor.name.clone(),
            info: default_model_info(descriptor),
            weights: Some(weights),
        }))
    }
}

impl std::fmt::Debug for ReferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceBackend")
            .field("assets_dir", &self.assets_dir)
            .field("models_dir", &self.models_dir)
            .finish()
    }
}

struct ReferenceModel {
    name: String,
    info: ModelInfo,
    weights: Option<memmap2::Mmap>,
}

impl LoadedModel for ReferenceModel {
    fn info(&self) -> ModelInfo {
        self.info
    }

    fn infer(
        &mut self,
        input: &[u8],
        indicator: Indicator,
    ) -> Result<ControlCommand, InferenceError> {
        if self.weights.is_none() {
            return Err(InferenceError::SessionClosed);
        }
        let expected = self.info.input_size.rgba_len();
        if input.len() != expected {
            return Err(InferenceError::InputSize {
                expected,
                actual: input.len(),
            });
        }
        Ok(steer(input, self.info.input_size, indicator))
    }

    fn close(&mut self) {
        if self.weights.take().is_some() {
            tracing::debug!("released weights of '{}'", self.name);
        }
    }
}

/// Steers toward the brighter half of the image, biased by the indicator.
fn steer(input: &[u8], size: Size, indicator: Indicator) -> ControlCommand {
    let half = size.width / 2;
    let (mut left_sum, mut right_sum) = (0u64, 0u64);
    for (i, px) in input.chunks_exact(BYTES_PER_PIXEL).enumerate() {
        let x = (i % size.width as usize) as u32;
        let luma =
            (u64::from(px[0]) * 299 + u64::from(px[1]) * 587 + u64::from(px[2]) * 114) / 1000;
        if x < half {
            left_sum += luma;
        } else {
            right_sum += luma;
        }
    }
    let left_px = u64::from(half) * u64::from(size.height);
    let right_px = u64::from(size.width - half) * u64::from(size.height);
    let mean = |sum: u64, n: u64| if n == 0 { 0.0 } else { sum as f32 / n as f32 };
    let imbalance = (mean(right_sum, right_px) - mean(left_sum, left_px)) / 255.0;

    let turn = (imbalance * STEER_GAIN + indicator.signal() * INDICATOR_BIAS).clamp(-1.0, 1.0);
    ControlCommand::new(THROTTLE + turn * THROTTLE, THROTTLE - turn * THROTTLE).clamped()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_registry::Device;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("autopilot_backend_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn image(size: Size, left: u8, right: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(size.rgba_len());
        for _y in 0..size.height {
            for x in 0..size.width {
                let v = if x < size.width / 2 { left } else { right };
                buf.extend_from_slice(&[v, v, v, 255]);
            }
        }
        buf
    }

    #[test]
    fn test_steer_toward_brighter_side() {
        let size = Size::new(8, 2);
        let c = steer(&image(size, 0, 255), size, Indicator::Off);
        assert!(c.left > c.right, "should turn right: {c:?}");

        let c = steer(&image(size, 255, 0), size, Indicator::Off);
        assert!(c.left < c.right, "should turn left: {c:?}");
    }

    #[test]
    fn test_steer_uniform_goes_straight() {
        let size = Size::new(8, 2);
        let c = steer(&image(size, 90, 90), size, Indicator::Off);
        assert_eq!(c, ControlCommand::new(THROTTLE, THROTTLE));

        let c = steer(&image(size, 90, 90), size, Indicator::Left);
        assert!(c.left < c.right);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = scratch_dir("missing");
        let backend = ReferenceBackend::new(&dir, &dir);
        let err = backend
            .load(&ModelDescriptor::file("nope.tflite"), &DeviceConfig::cpu(1))
            .err()
            .unwrap();
        assert!(matches!(err, ModelLoadError::NotFound { .. }));
    }

    #[test]
    fn test_load_rejects_empty_and_accelerators() {
        let dir = scratch_dir("empty");
        std::fs::write(dir.join("empty.tflite"), b"").unwrap();
        std::fs::write(dir.join("a.tflite"), b"weights").unwrap();
        let backend = ReferenceBackend::new(&dir, &dir);

        let err = backend
            .load(&ModelDescriptor::file("empty.tflite"), &DeviceConfig::cpu(1))
            .err()
            .unwrap();
        assert!(matches!(err, ModelLoadError::InvalidModel { .. }));

        let err = backend
            .load(&ModelDescriptor::file("a.tflite"), &DeviceConfig::new(Device::Nnapi, 1))
            .err()
            .unwrap();
        assert!(matches!(err, ModelLoadError::UnsupportedDevice { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_loaded_model_runs_and_closes() {
        let dir = scratch_dir("run");
        std::fs::write(dir.join("a.tflite"), b"weights").unwrap();
        let backend = ReferenceBackend::new(&dir, &dir);
        let mut model = backend
            .load(&ModelDescriptor::file("a.tflite"), &DeviceConfig::cpu(2))
            .unwrap();

        let info = model.info();
        assert_eq!(info.input_size, Size::new(256, 96));
        assert!(!info.maintain_aspect);

        let input = vec![0u8; info.input_size.rgba_len()];
        assert!(model.infer(&input, Indicator::Off).is_ok());
        assert!(matches!(
            model.infer(&input[..4], Indicator::Off),
            Err(InferenceError::InputSize { .. })
        ));

        model.close();
        model.close();
        assert!(matches!(
            model.infer(&input, Indicator::Off),
            Err(InferenceError::SessionClosed)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
