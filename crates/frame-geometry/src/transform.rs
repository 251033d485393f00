// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2-D affine transforms.
//!
//! Points are mapped as
//! ```text
//! | x' |   | sx  kx  tx |   | x |
//! | y' | = | ky  sy  ty | · | y |
//!                           | 1 |
//! ```
//! in image coordinates (origin top-left, y pointing down), so a positive
//! rotation angle turns the image clockwise on screen.

use crate::GeometryError;

/// Determinants with a smaller magnitude are treated as singular.
const SINGULAR_EPSILON: f32 = 1e-12;

/// A 2×3 affine transform.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AffineTransform {
    pub sx: f32,
    pub kx: f32,
    pub tx: f32,
    pub ky: f32,
    pub sy: f32,
    pub ty: f32,
}

impl AffineTransform {
    /// The identity transform.
    pub const IDENTITY: AffineTransform = AffineTransform {
        sx: 1.0,
        kx: 0.0,
        tx: 0.0,
        ky: 0.0,
        sy: 1.0,
        ty: 0.0,
    };

    /// Pure translation.
    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            tx: dx,
            ty: dy,
            ..Self::IDENTITY
        }
    }

    /// Axis-aligned scale about the origin.
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            sx,
            sy,
            ..Self::IDENTITY
        }
    }

    /// Rotation about the origin by `degrees`.
    ///
    /// Multiples of 90° produce exact 0/±1 coefficients so that quarter
    /// turns do not accumulate rounding error.
    pub fn rotation(degrees: f32) -> Self {
        let (sin, cos) = match degrees.rem_euclid(360.0) {
            d if d == 0.0 => (0.0, 1.0),
            d if d == 90.0 => (1.0, 0.0),
            d if d == 180.0 => (0.0, -1.0),
            d if d == 270.0 => (-1.0, 0.0),
            d => d.to_radians().sin_cos(),
        };
        Self {
            sx: cos,
            kx: -sin,
            tx: 0.0,
            ky: sin,
            sy: cos,
            ty: 0.0,
        }
    }

    /// Returns the transform that applies `self` first and then `next`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            sx: next.sx * self.sx + next.kx * self.ky,
            kx: next.sx * self.kx + next.kx * self.sy,
            tx: next.sx * self.tx + next.kx * self.ty + next.tx,
            ky: next.ky * self.sx + next.sy * self.ky,
            sy: next.ky * self.kx + next.sy * self.sy,
            ty: next.ky * self.tx + next.sy * self.ty + next.ty,
        }
    }

    /// Maps a point through the transform.
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.sx * x + self.kx * y + self.tx,
            self.ky * x + self.sy * y + self.ty,
        )
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f32 {
        self.sx * self.sy - self.kx * self.ky
    }

    /// Returns `true` if the transform has a well-defined inverse.
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > SINGULAR_EPSILON
    }

    /// Computes the inverse transform.
    pub fn invert(&self) -> Result<AffineTransform, GeometryError> {
        let det = self.determinant();
        if !self.is_invertible() {
            return Err(GeometryError::Singular { determinant: det });
        }
        let inv_det = 1.0 / det;
        let sx = self.sy * inv_det;
        let kx = -self.kx * inv_det;
        let ky = -self.ky * inv_det;
        let sy = self.sx * inv_det;
        Ok(AffineTransform {
            sx,
            kx,
            tx: -(sx * self.tx + kx * self.ty),
            ky,
            sy,
            ty: -(ky * self.tx + sy * self.ty),
        })
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: (f32, f32), b: (f32, f32)) {
        assert!(
            (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn test_identity() {
        assert_eq!(AffineTransform::IDENTITY.map_point(3.0, 4.0), (3.0, 4.0));
    }

    #[test]
    fn test_then_order() {
        // Scale first, then translate.
        let t = AffineTransform::scale(2.0, 3.0).then(&AffineTransform::translation(1.0, 1.0));
        assert_close(t.map_point(1.0, 1.0), (3.0, 4.0));
    }

    #[test]
    fn test_quarter_turn_is_clockwise() {
        let r = AffineTransform::rotation(90.0);
        assert_close(r.map_point(1.0, 0.0), (0.0, 1.0));
        assert_eq!(r.sx, 0.0);
    }

    #[test]
    fn test_negative_rotation_normalised() {
        assert_eq!(AffineTransform::rotation(-90.0), AffineTransform::rotation(270.0));
    }

    #[test]
    fn test_invert_roundtrip() {
        let t = AffineTransform::translation(-640.0, -360.0)
            .then(&AffineTransform::rotation(90.0))
            .then(&AffineTransform::scale(0.2, 0.133))
            .then(&AffineTransform::translation(128.0, 48.0));
        let inv = t.invert().unwrap();
        let p = t.map_point(100.0, 200.0);
        assert_close(inv.map_point(p.0, p.1), (100.0, 200.0));
    }

    #[test]
    fn test_singular() {
        let t = AffineTransform::scale(0.0, 1.0);
        assert!(!t.is_invertible());
        assert!(matches!(t.invert(), Err(GeometryError::Singular { .. })));
    }
}
