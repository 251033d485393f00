// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # frame-geometry
//!
//! Maps raw camera frames into the fixed-size input a driving model expects.
//!
//! - [`Size`] / [`CropRect`]: pixel dimensions and fractional crop margins.
//! - [`AffineTransform`]: a 2×3 affine matrix with composition and inversion.
//! - [`resolve`]: builds the frame → model-input transform from sensor
//!   orientation, the model's declared input size, crop, and aspect policy.
//! - [`Frame`] / [`warp_into`]: RGBA camera frames and the resampling step
//!   that fills a model's scratch buffer.
//!
//! # Pipeline
//! ```text
//!  camera frame (1280×720, sensor rotated)
//!        │  resolve(..) → AffineTransform
//!        ▼
//!  warp_into(frame, &transform, scratch, 256×96)
//!        │
//!        ▼
//!  model input buffer (RGBA8, 256×96)
//! ```
//!
//! # Example
//! ```
//! use frame_geometry::{resolve, CropRect, SensorOrientation, Size};
//!
//! let transform = resolve(
//!     Size::new(1280, 720),
//!     SensorOrientation::from_screen_rotation(90),
//!     Size::new(256, 96),
//!     CropRect::NONE,
//!     false,
//! )
//! .unwrap();
//! let inverse = transform.invert().unwrap();
//! let (x, y) = inverse.map_point(128.0, 48.0);
//! assert!((x - 640.0).abs() < 1e-3 && (y - 360.0).abs() < 1e-3);
//! ```

mod error;
mod frame;
mod resolve;
mod size;
mod transform;

pub use error::GeometryError;
pub use frame::{warp_into, CaptureMetadata, Frame};
pub use resolve::{resolve, SensorOrientation};
pub use size::{CropRect, Size, BYTES_PER_PIXEL};
pub use transform::AffineTransform;
