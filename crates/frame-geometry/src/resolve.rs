// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Frame → model-input transform resolution.
//!
//! The transform is assembled in the same order a canvas matrix would be
//! post-multiplied:
//!
//! 1. Move the centre of the kept (cropped) region to the origin.
//! 2. Rotate by the sensor orientation.
//! 3. Scale into the target: independent axes, or one uniform fill scale
//!    (`max(sx, sy)`) when the model asks to keep the aspect ratio.
//! 4. Move the origin to the centre of the target.
//!
//! A quarter-turn rotation transposes the kept region before scaling, so a
//! landscape sensor feeding a portrait screen still fills the target.

use crate::{AffineTransform, CropRect, GeometryError, Size};
use std::fmt;

/// Rotation, in degrees, that brings the camera sensor's image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SensorOrientation(i32);

impl SensorOrientation {
    /// Upright sensor, no rotation needed.
    pub const UPRIGHT: SensorOrientation = SensorOrientation(0);

    /// Creates an orientation from a raw angle in degrees.
    pub const fn from_degrees(degrees: i32) -> Self {
        Self(degrees)
    }

    /// Orientation for a back camera mounted at 90° when the screen is
    /// rotated by `screen_rotation` degrees: `90 − screen_rotation`.
    pub const fn from_screen_rotation(screen_rotation: i32) -> Self {
        Self(90 - screen_rotation)
    }

    /// The raw angle in degrees.
    pub fn degrees(&self) -> i32 {
        self.0
    }

    /// Returns `true` if the rotation swaps width and height.
    pub fn transposes(&self) -> bool {
        self.0.rem_euclid(180) == 90
    }
}

impl fmt::Display for SensorOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Resolves the transform mapping a `frame`-sized camera image into a
/// `target`-sized model input.
///
/// # Errors
/// - [`GeometryError::ZeroDimension`] if any dimension is zero.
/// - [`GeometryError::InvalidCrop`] if the crop margins are out of range.
/// - [`GeometryError::Singular`] if the resulting transform is not invertible.
pub fn resolve(
    frame: Size,
    orientation: SensorOrientation,
    target: Size,
    crop: CropRect,
    maintain_aspect: bool,
) -> Result<AffineTransform, GeometryError> {
    if frame.is_empty() || target.is_empty() {
        return Err(GeometryError::ZeroDimension { frame, target });
    }
    crop.validate()?;

    let (x, y, w, h) = crop.region(frame);
    let (in_w, in_h) = if orientation.transposes() { (h, w) } else { (w, h) };

    let scale_x = target.width as f32 / in_w;
    let scale_y = target.height as f32 / in_h;
    let scale = if maintain_aspect {
        let s = scale_x.max(scale_y);
        AffineTransform::scale(s, s)
    } else {
        AffineTransform::scale(scale_x, scale_y)
    };

    let transform = AffineTransform::translation(-(x + w / 2.0), -(y + h / 2.0))
        .then(&AffineTransform::rotation(orientation.degrees() as f32))
        .then(&scale)
        .then(&AffineTransform::translation(
            target.width as f32 / 2.0,
            target.height as f32 / 2.0,
        ));

    if !transform.is_invertible() {
        return Err(GeometryError::Singular {
            determinant: transform.determinant(),
        });
    }
    Ok(transform)
}
