// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model sessions.
//!
//! A [`ModelSession`] is one loaded model plus everything needed to feed it:
//! the declared input geometry, a scratch buffer sized exactly to the input,
//! and the frame → input transform for the current camera frame size.

use crate::backend::{LoadedModel, ModelBackend, ModelInfo};
use crate::control::{ControlCommand, Indicator};
use crate::error::{InferenceError, ModelLoadError};
use frame_geometry::{
    resolve, warp_into, AffineTransform, CropRect, Frame, GeometryError, SensorOrientation, Size,
};
use model_registry::{Device, DeviceConfig, ModelDescriptor};

/// Transform resolved for one camera frame size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub frame_size: Size,
    pub orientation: SensorOrientation,
    /// Frame pixels → model input pixels.
    pub frame_to_input: AffineTransform,
    /// Model input pixels → frame pixels.
    pub input_to_frame: AffineTransform,
}

/// An open model with its scratch buffer and frame transform.
pub struct ModelSession {
    descriptor: ModelDescriptor,
    device: DeviceConfig,
    info: ModelInfo,
    model: Option<Box<dyn LoadedModel>>,
    scratch: Vec<u8>,
    geometry: Option<FrameGeometry>,
}

impl ModelSession {
    /// Loads `descriptor` through `backend`.
    ///
    /// # Errors
    /// - [`ModelLoadError::InvalidThreads`] for CPU execution with zero threads.
    /// - Whatever the backend reports for the load itself.
    /// - [`ModelLoadError::Geometry`] if the model declares an empty input or
    ///   an invalid crop. The loaded model is closed before returning.
    pub fn open(
        backend: &dyn ModelBackend,
        descriptor: &ModelDescriptor,
        device: &DeviceConfig,
    ) -> Result<Self, ModelLoadError> {
        if device.device == Device::Cpu && device.threads == 0 {
            return Err(ModelLoadError::InvalidThreads {
                threads: device.threads,
            });
        }

        let mut model = backend.load(descriptor, device)?;
        let info = model.info();
        if let Err(e) = check_info(&info) {
            model.close();
            return Err(e.into());
        }

        tracing::info!(
            "opened session: {} on {} via {} backend",
            descriptor,
            device,
            backend.name()
        );
        Ok(Self {
            descriptor: descriptor.clone(),
            device: *device,
            info,
            model: Some(model),
            scratch: vec![0u8; info.input_size.rgba_len()],
            geometry: None,
        })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn input_size(&self) -> Size {
        self.info.input_size
    }

    pub fn crop(&self) -> CropRect {
        self.info.crop
    }

    pub fn maintain_aspect(&self) -> bool {
        self.info.maintain_aspect
    }

    pub fn is_open(&self) -> bool {
        self.model.is_some()
    }

    pub fn geometry(&self) -> Option<&FrameGeometry> {
        self.geometry.as_ref()
    }

    /// The model input buffer, RGBA8 at [`input_size`](Self::input_size).
    pub fn scratch(&self) -> &[u8] {
        &self.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    /// Resolves and stores the transform for `frame_size` frames.
    pub fn resolve_geometry(
        &mut self,
        frame_size: Size,
        orientation: SensorOrientation,
    ) -> Result<&FrameGeometry, GeometryError> {
        let frame_to_input = resolve(
            frame_size,
            orientation,
            self.info.input_size,
            self.info.crop,
            self.info.maintain_aspect,
        )?;
        let input_to_frame = frame_to_input.invert()?;
        Ok(self.geometry.insert(FrameGeometry {
            frame_size,
            orientation,
            frame_to_input,
            input_to_frame,
        }))
    }

    /// Warps `frame` into the scratch buffer, re-resolving the transform
    /// first if the frame size changed.
    pub fn prepare(
        &mut self,
        frame: &Frame,
        orientation: SensorOrientation,
    ) -> Result<(), GeometryError> {
        let current = self
            .geometry
            .filter(|g| g.frame_size == frame.size() && g.orientation == orientation);
        let transform = match current {
            Some(g) => g.frame_to_input,
            None => {
                tracing::debug!(
                    "resolving geometry for {} frames ({orientation})",
                    frame.size()
                );
                self.resolve_geometry(frame.size(), orientation)?.frame_to_input
            }
        };
        warp_into(frame, &transform, &mut self.scratch, self.info.input_size)
    }

    /// Runs the model over the scratch buffer.
    pub fn infer(&mut self, indicator: Indicator) -> Result<ControlCommand, InferenceError> {
        let model = self.model.as_mut().ok_or(InferenceError::SessionClosed)?;
        model.infer(&self.scratch, indicator)
    }

    /// Releases the model. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut model) = self.model.take() {
            model.close();
            tracing::info!("closed session: {}", self.descriptor.name);
        }
    }
}

impl Drop for ModelSession {
    fn drop(&mut self) {
        if self.model.is_some() {
            tracing::warn!(
                "session '{}' dropped without close(), closing now",
                self.descriptor.name
            );
            self.close();
        }
    }
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("descriptor", &self.descriptor.name)
            .field("device", &self.device)
            .field("input_size", &self.info.input_size)
            .field("open", &self.is_open())
            .finish()
    }
}

fn check_info(info: &ModelInfo) -> Result<(), GeometryError> {
    if info.input_size.is_empty() {
        return Err(GeometryError::ZeroDimension {
            frame: info.input_size,
            target: info.input_size,
        });
    }
    info.crop.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_geometry::CaptureMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend whose models report a fixed info and count closes.
    struct FixedBackend {
        info: ModelInfo,
        closes: Arc<AtomicUsize>,
    }

    struct FixedModel {
        info: ModelInfo,
        closes: Arc<AtomicUsize>,
        open: bool,
    }

    impl ModelBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn load(
            &self,
            _descriptor: &ModelDescriptor,
            _device: &DeviceConfig,
        ) -> Result<Box<dyn LoadedModel>, ModelLoadError> {
            Ok(Box::new(FixedModel {
                info: self.info,
                closes: Arc::clone(&self.closes),
                open: true,
            }))
        }
    }

    impl LoadedModel for FixedModel {
        fn info(&self) -> ModelInfo {
            self.info
        }

        fn infer(
            &mut self,
            input: &[u8],
            indicator: Indicator,
        ) -> Result<ControlCommand, InferenceError> {
            assert!(self.open);
            let lit = input.iter().filter(|&&b| b != 0).count() as f32;
            Ok(ControlCommand::new(lit, indicator.signal()))
        }

        fn close(&mut self) {
            self.open = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn backend(input: Size, crop: CropRect) -> FixedBackend {
        FixedBackend {
            info: ModelInfo {
                input_size: input,
                crop,
                maintain_aspect: false,
            },
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn open(b: &FixedBackend) -> Result<ModelSession, ModelLoadError> {
        ModelSession::open(b, &ModelDescriptor::file("a"), &DeviceConfig::cpu(1))
    }

    #[test]
    fn test_open_allocates_exact_scratch() {
        let b = backend(Size::new(256, 96), CropRect::NONE);
        let descriptor = ModelDescriptor::file("a.tflite");
        let s = ModelSession::open(&b, &descriptor, &DeviceConfig::cpu(1)).unwrap();
        assert_eq!(s.scratch().len(), 256 * 96 * 4);
        assert_eq!(s.input_size(), Size::new(256, 96));
        assert!(s.is_open());
    }

    #[test]
    fn test_open_rejects_zero_threads() {
        let b = backend(Size::new(4, 4), CropRect::NONE);
        let descriptor = ModelDescriptor::file("a");
        let err = ModelSession::open(&b, &descriptor, &DeviceConfig::cpu(0)).unwrap_err();
        assert!(matches!(err, ModelLoadError::InvalidThreads { threads: 0 }));
        assert_eq!(b.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_closes_model_on_bad_geometry() {
        let b = backend(Size::new(0, 4), CropRect::NONE);
        let err = open(&b).unwrap_err();
        assert!(matches!(err, ModelLoadError::Geometry(_)));
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);

        let b = backend(Size::new(4, 4), CropRect::new(0.6, 0.0, 0.6, 0.0));
        assert!(open(&b).is_err());
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_drop_closes() {
        let b = backend(Size::new(4, 4), CropRect::NONE);
        let mut s = open(&b).unwrap();
        s.close();
        s.close();
        assert!(!s.is_open());
        assert!(matches!(s.infer(Indicator::Off), Err(InferenceError::SessionClosed)));
        drop(s);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);

        let s = open(&b).unwrap();
        drop(s);
        assert_eq!(b.closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_prepare_resolves_and_tracks_frame_size() {
        let b = backend(Size::new(4, 2), CropRect::NONE);
        let mut s = open(&b).unwrap();
        assert!(s.geometry().is_none());

        let frame = Frame::filled(Size::new(8, 4), [9, 9, 9, 255], CaptureMetadata::now(0));
        s.prepare(&frame, SensorOrientation::UPRIGHT).unwrap();
        assert_eq!(s.geometry().unwrap().frame_size, Size::new(8, 4));
        assert!(s.scratch().chunks_exact(4).all(|p| p == [9, 9, 9, 255]));

        let frame = Frame::filled(Size::new(16, 8), [1, 1, 1, 255], CaptureMetadata::now(1));
        s.prepare(&frame, SensorOrientation::UPRIGHT).unwrap();
        assert_eq!(s.geometry().unwrap().frame_size, Size::new(16, 8));

        let out = s.infer(Indicator::Right).unwrap();
        assert_eq!(out, ControlCommand::new(32.0, 1.0));
    }

    #[test]
    fn test_geometry_inverse_round_trips() {
        let b = backend(Size::new(256, 96), CropRect::top(1.0 / 3.0));
        let mut s = open(&b).unwrap();
        let g = *s
            .resolve_geometry(Size::new(1280, 720), SensorOrientation::UPRIGHT)
            .unwrap();
        let (x, y) = g.frame_to_input.map_point(100.0, 500.0);
        let (bx, by) = g.input_to_frame.map_point(x, y);
        assert!((bx - 100.0).abs() < 1e-2 && (by - 500.0).abs() < 1e-2);
    }
}
