use crate::{
    enums::{Interpolation, Orientation},
    interpolator::Interpolator,
    volume::{Spacing, Volume},
};

use log::debug;
use nalgebra::{Matrix2, Matrix3, Rotation2, Rotation3, Vector2, Vector3};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, s};
use web_time::Instant;

/// Source coordinates this close outside the grid still count as inside.
const BOUNDS_TOLERANCE: f64 = 1e-6;

/// Rotation requested through the three views, in degrees.
///
/// Angles follow the on-screen convention: positive means the handle was dragged
/// clockwise in that view.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RotationState {
    pub axial: f64,
    pub sagittal: f64,
    pub coronal: f64,
}

impl RotationState {
    pub fn new(axial: f64, sagittal: f64, coronal: f64) -> Self {
        Self {
            axial,
            sagittal,
            coronal,
        }
    }

    pub fn angle(&self, orientation: Orientation) -> f64 {
        match orientation {
            Orientation::Axial => self.axial,
            Orientation::Sagittal => self.sagittal,
            Orientation::Coronal => self.coronal,
        }
    }

    pub fn set_angle(&mut self, orientation: Orientation, degrees: f64) {
        match orientation {
            Orientation::Axial => self.axial = degrees,
            Orientation::Sagittal => self.sagittal = degrees,
            Orientation::Coronal => self.coronal = degrees,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_identity(&self) -> bool {
        self.axial == 0.0 && self.sagittal == 0.0 && self.coronal == 0.0
    }

    pub fn negated(&self) -> Self {
        Self::new(-self.axial, -self.sagittal, -self.coronal)
    }

    /// Counter-clockwise-positive angles in radians about X, Y and Z.
    ///
    /// The sagittal view looks down X, the coronal view down Y and the axial view
    /// down Z, so each view angle becomes the rotation about its viewing axis.
    pub fn engine_angles(&self) -> (f64, f64, f64) {
        (
            (-self.sagittal).to_radians(),
            (-self.coronal).to_radians(),
            (-self.axial).to_radians(),
        )
    }
}

/// Compose the view angles into one rotation, `R = Rz * Ry * Rx`.
///
/// Points are rotated about X first, then Y, then Z.
pub fn rotation_matrix(rotation: &RotationState) -> Matrix3<f64> {
    let (rx, ry, rz) = rotation.engine_angles();
    let about_x = Rotation3::from_axis_angle(&Vector3::x_axis(), rx);
    let about_y = Rotation3::from_axis_angle(&Vector3::y_axis(), ry);
    let about_z = Rotation3::from_axis_angle(&Vector3::z_axis(), rz);
    (about_z * about_y * about_x).into_inner()
}

/// Fractional grid index along an axis of `len` samples, `None` outside the grid.
#[inline]
fn grid_index(coordinate: f64, len: usize) -> Option<f64> {
    let max = (len - 1) as f64;
    (coordinate >= -BOUNDS_TOLERANCE && coordinate <= max + BOUNDS_TOLERANCE)
        .then(|| coordinate.clamp(0.0, max))
}

/// Inverse mapping from output voxel index to fractional source index.
struct InverseMap3 {
    center: Vector3<f64>,
    inverse: Matrix3<f64>,
    pitch: Vector3<f64>,
}

impl InverseMap3 {
    fn new(volume: &Volume, rotation: &RotationState) -> Self {
        let Spacing { x, y, z } = volume.spacing();
        Self {
            center: RotationEngine::rotation_center(volume),
            inverse: rotation_matrix(rotation).transpose(),
            pitch: Vector3::new(x, y, z),
        }
    }

    /// `(x, y, z)` source index for output voxel `(z, y, x)`.
    #[inline]
    fn source_index(&self, z: usize, y: usize, x: usize) -> Vector3<f64> {
        let point = Vector3::new(x as f64, y as f64, z as f64).component_mul(&self.pitch);
        let source = self.center + self.inverse * (point - self.center);
        source.component_div(&self.pitch)
    }
}

struct InverseMap2 {
    center: Vector2<f64>,
    inverse: Matrix2<f64>,
    pitch: Vector2<f64>,
}

impl InverseMap2 {
    fn new(dim: (usize, usize), spacing: (f64, f64), angle_degrees: f64) -> Self {
        let (height, width) = dim;
        let (x, y) = spacing;
        Self {
            center: Vector2::new(width as f64 * x / 2.0, height as f64 * y / 2.0),
            inverse: Rotation2::new((-angle_degrees).to_radians())
                .inverse()
                .into_inner(),
            pitch: Vector2::new(x, y),
        }
    }

    #[inline]
    fn source_index(&self, y: usize, x: usize) -> Vector2<f64> {
        let point = Vector2::new(x as f64, y as f64).component_mul(&self.pitch);
        let source = self.center + self.inverse * (point - self.center);
        source.component_div(&self.pitch)
    }
}

/// Resamples a volume through a rigid rotation about its geometric center.
#[derive(Clone, Copy, Debug)]
pub struct RotationEngine {
    fill_value: i16,
    interpolation: Interpolation,
}

impl Default for RotationEngine {
    fn default() -> Self {
        Self {
            fill_value: Self::AIR_HU,
            interpolation: Interpolation::Linear,
        }
    }
}

impl RotationEngine {
    /// Hounsfield value of air, assigned to samples mapped from outside the volume.
    pub const AIR_HU: i16 = -1000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fill_value(mut self, fill_value: i16) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn fill_value(&self) -> i16 {
        self.fill_value
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Geometric center in millimeters, `(x, y, z)`.
    pub fn rotation_center(volume: &Volume) -> Vector3<f64> {
        let Spacing { x, y, z } = volume.spacing();
        Vector3::new(
            volume.columns() as f64 * x / 2.0,
            volume.rows() as f64 * y / 2.0,
            volume.slice_count() as f64 * z / 2.0,
        )
    }

    /// Rotate the whole volume.
    ///
    /// Every output voxel at physical position `p` takes its value from
    /// `c + Rᵗ(p - c)` in the input, where `R` is [`rotation_matrix`] and `c` the
    /// [`rotation_center`](Self::rotation_center). The result has the shape and
    /// spacing of the input and owns its own buffer.
    pub fn rotate_volume(&self, volume: &Volume, rotation: &RotationState) -> Volume {
        let started = Instant::now();
        let map = InverseMap3::new(volume, rotation);
        let source = volume.data().view();
        let (depth, height, width) = volume.dim();

        let data = Array3::from_shape_fn((depth, height, width), |(z, y, x)| {
            let index = map.source_index(z, y, x);
            match (
                grid_index(index.z, depth),
                grid_index(index.y, height),
                grid_index(index.x, width),
            ) {
                (Some(sz), Some(sy), Some(sx)) => self.sample_3d(&source, sz, sy, sx),
                _ => self.fill_value,
            }
        });

        debug!(
            "Resampled {}x{}x{} volume (axial {:.1}°, sagittal {:.1}°, coronal {:.1}°) in {:?}",
            width,
            height,
            depth,
            rotation.axial,
            rotation.sagittal,
            rotation.coronal,
            started.elapsed()
        );

        Volume::new(data, volume.spacing())
    }

    /// Rotate a single plane in-plane about its center.
    ///
    /// `spacing` is `(column pitch, row pitch)`; the angle uses the same clockwise
    /// convention as [`RotationState::axial`].
    pub fn rotate_slice(
        &self,
        slice: ArrayView2<'_, i16>,
        spacing: (f64, f64),
        angle_degrees: f64,
    ) -> Array2<i16> {
        let (height, width) = slice.dim();
        let map = InverseMap2::new((height, width), spacing, angle_degrees);

        Array2::from_shape_fn((height, width), |(y, x)| {
            let index = map.source_index(y, x);
            match (grid_index(index.y, height), grid_index(index.x, width)) {
                (Some(sy), Some(sx)) => self.sample_2d(&slice, sy, sx),
                _ => self.fill_value,
            }
        })
    }

    /// Rotate every axial plane independently by the same in-plane angle.
    pub fn rotate_slices(&self, volume: &Volume, angle_degrees: f64) -> Volume {
        let spacing = volume.spacing();
        let mut data = Array3::<i16>::zeros(volume.dim());

        for (z, plane) in volume.data().outer_iter().enumerate() {
            let rotated = self.rotate_slice(plane, (spacing.x, spacing.y), angle_degrees);
            data.slice_mut(s![z, .., ..]).assign(&rotated);
        }

        Volume::new(data, spacing)
    }

    #[inline]
    fn sample_3d(&self, source: &ArrayView3<i16>, z: f64, y: f64, x: f64) -> i16 {
        let value = match self.interpolation {
            Interpolation::Linear => Interpolator::trilinear_interpolate(source, z, y, x),
            Interpolation::Nearest => Interpolator::nearest_3d(source, z, y, x),
        };
        Interpolator::to_sample(value)
    }

    #[inline]
    fn sample_2d(&self, source: &ArrayView2<i16>, y: f64, x: f64) -> i16 {
        let value = match self.interpolation {
            Interpolation::Linear => Interpolator::bilinear_interpolate(source, y, x),
            Interpolation::Nearest => Interpolator::nearest_2d(source, y, x),
        };
        Interpolator::to_sample(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn ramp(depth: usize, height: usize, width: usize, spacing: Spacing) -> Volume {
        let data = Array3::from_shape_fn((depth, height, width), |(z, y, x)| {
            (20 * z + 5 * y + 10 * x) as i16 - 300
        });
        Volume::new(data, spacing)
    }

    fn rx(a: f64) -> Matrix3<f64> {
        Matrix3::new(1.0, 0.0, 0.0, 0.0, a.cos(), -a.sin(), 0.0, a.sin(), a.cos())
    }

    fn ry(a: f64) -> Matrix3<f64> {
        Matrix3::new(a.cos(), 0.0, a.sin(), 0.0, 1.0, 0.0, -a.sin(), 0.0, a.cos())
    }

    fn rz(a: f64) -> Matrix3<f64> {
        Matrix3::new(a.cos(), -a.sin(), 0.0, a.sin(), a.cos(), 0.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn zero_angles_give_identity_matrix() {
        assert_eq!(rotation_matrix(&RotationState::default()), Matrix3::identity());
    }

    #[test]
    fn clockwise_view_angles_are_negated() {
        let (x, y, z) = RotationState::new(90.0, 30.0, -45.0).engine_angles();
        assert_relative_eq!(x, -30f64.to_radians());
        assert_relative_eq!(y, 45f64.to_radians());
        assert_relative_eq!(z, -FRAC_PI_2);
    }

    #[test]
    fn axial_angle_rotates_about_z() {
        let matrix = rotation_matrix(&RotationState::new(90.0, 0.0, 0.0));
        let expected = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(matrix, expected, epsilon = 1e-12);
    }

    #[test]
    fn composition_order_is_x_then_y_then_z() {
        let state = RotationState::new(25.0, 30.0, 40.0);
        let (a, b, c) = state.engine_angles();
        let matrix = rotation_matrix(&state);

        assert_relative_eq!(matrix, rz(c) * ry(b) * rx(a), epsilon = 1e-12);
        assert!((matrix - rx(a) * ry(b) * rz(c)).abs().max() > 1e-3);
    }

    #[test]
    fn rotation_matrix_is_orthonormal() {
        let matrix = rotation_matrix(&RotationState::new(-12.0, 77.0, 143.0));
        assert_relative_eq!(matrix * matrix.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(matrix.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_state_tracks_each_view() {
        let mut state = RotationState::default();
        state.set_angle(Orientation::Coronal, 12.5);
        state.set_angle(Orientation::Axial, -3.0);
        assert_eq!(state, RotationState::new(-3.0, 0.0, 12.5));
        assert_eq!(state.angle(Orientation::Coronal), 12.5);
        assert_eq!(state.negated().angle(Orientation::Axial), 3.0);
        state.reset();
        assert!(state.is_identity());
    }

    #[test]
    fn center_is_half_the_physical_extent() {
        let volume = ramp(4, 6, 8, Spacing::new(0.5, 0.75, 2.0));
        let center = RotationEngine::rotation_center(&volume);
        assert_eq!(center, Vector3::new(2.0, 2.25, 4.0));
    }

    #[test]
    fn identity_rotation_reproduces_input() {
        let data = Array3::from_shape_fn((5, 7, 9), |(z, y, x)| {
            ((z * 7919 + y * 104_729 + x * 1_299_709) % 4096) as i16 - 1024
        });
        let volume = Volume::new(data, Spacing::new(0.488, 0.488, 2.5));

        let rotated = RotationEngine::new().rotate_volume(&volume, &RotationState::default());
        assert_eq!(rotated, volume);
    }

    #[test]
    fn input_volume_is_left_untouched() {
        let volume = ramp(6, 6, 6, Spacing::default());
        let before = volume.clone();
        let rotated =
            RotationEngine::new().rotate_volume(&volume, &RotationState::new(20.0, 10.0, 5.0));
        assert_eq!(volume, before);
        assert_ne!(rotated, volume);
        assert_ne!(rotated.data().as_ptr(), volume.data().as_ptr());
    }

    #[test]
    fn quarter_turn_moves_whole_voxels() {
        // 4x4 grid centred at (2, 2): output (y, x) samples input row x, column 4 - y
        let data = Array3::from_shape_fn((1, 4, 4), |(_, y, x)| (10 * y + x) as i16);
        let volume = Volume::new(data, Spacing::default());

        let rotated =
            RotationEngine::new().rotate_volume(&volume, &RotationState::new(90.0, 0.0, 0.0));
        let plane = rotated.axial_plane(0).unwrap();

        assert!(plane.row(0).iter().all(|&v| v == RotationEngine::AIR_HU));
        assert_eq!(plane[[1, 0]], 3);
        assert_eq!(plane[[3, 2]], 21);
        assert_eq!(plane[[2, 3]], 32);
    }

    #[test]
    fn samples_mapped_outside_receive_fill_value() {
        let volume = ramp(6, 9, 9, Spacing::new(1.0, 1.0, 1.5));
        let rotation = RotationState::new(45.0, 20.0, -15.0);
        let rotated = RotationEngine::new().rotate_volume(&volume, &rotation);

        let map = InverseMap3::new(&volume, &rotation);
        let (depth, height, width) = volume.dim();
        let mut outside = 0;
        for ((z, y, x), &value) in rotated.data().indexed_iter() {
            let index = map.source_index(z, y, x);
            let inside = grid_index(index.z, depth).is_some()
                && grid_index(index.y, height).is_some()
                && grid_index(index.x, width).is_some();
            if !inside {
                outside += 1;
                assert_eq!(value, RotationEngine::AIR_HU);
            }
        }
        assert!(outside > 0);
    }

    #[test]
    fn custom_fill_value_is_used() {
        let volume = ramp(1, 9, 9, Spacing::default());
        let rotated = RotationEngine::new()
            .with_fill_value(-2048)
            .rotate_volume(&volume, &RotationState::new(45.0, 0.0, 0.0));
        assert_eq!(rotated.data()[[0, 0, 0]], -2048);
    }

    /// Mean absolute difference over the central `margin`-trimmed block.
    fn interior_error(a: &Volume, b: &Volume, margin: usize) -> f64 {
        let (depth, height, width) = a.dim();
        let block = s![margin..depth - margin, margin..height - margin, margin..width - margin];
        let lhs = a.data().slice(block);
        let rhs = b.data().slice(block);
        let total: f64 = lhs
            .iter()
            .zip(rhs.iter())
            .map(|(&p, &q)| (f64::from(p) - f64::from(q)).abs())
            .sum();
        total / lhs.len() as f64
    }

    #[test]
    fn single_axis_rotation_is_undone_by_its_negative() {
        let volume = ramp(16, 16, 16, Spacing::default());
        let engine = RotationEngine::new();
        for rotation in [
            RotationState::new(10.0, 0.0, 0.0),
            RotationState::new(0.0, -8.0, 0.0),
            RotationState::new(0.0, 0.0, 9.0),
        ] {
            let forward = engine.rotate_volume(&volume, &rotation);
            let back = engine.rotate_volume(&forward, &rotation.negated());
            assert!(interior_error(&back, &volume, 5) < 1.0);
        }
    }

    #[test]
    fn combined_rotation_is_approximately_undone_by_negated_angles() {
        let volume = ramp(16, 16, 16, Spacing::default());
        let engine = RotationEngine::new();
        let rotation = RotationState::new(5.0, 3.0, -4.0);

        let forward = engine.rotate_volume(&volume, &rotation);
        let back = engine.rotate_volume(&forward, &rotation.negated());

        assert!(interior_error(&back, &volume, 5) < 2.0);
    }

    #[test]
    fn axial_only_rotation_matches_per_slice_rotation() {
        let volume = ramp(3, 12, 10, Spacing::new(0.8, 0.6, 3.0));
        let engine = RotationEngine::new();

        let whole = engine.rotate_volume(&volume, &RotationState::new(33.0, 0.0, 0.0));
        let per_slice = engine.rotate_slices(&volume, 33.0);

        for (a, b) in whole.data().iter().zip(per_slice.data().iter()) {
            assert!((i32::from(*a) - i32::from(*b)).abs() <= 1);
        }
    }

    #[test]
    fn slice_rotation_by_zero_is_identity() {
        let plane = Array2::from_shape_fn((5, 6), |(y, x)| (y * 6 + x) as i16);
        let rotated = RotationEngine::new().rotate_slice(plane.view(), (0.7, 0.7), 0.0);
        assert_eq!(rotated, plane);
    }

    #[test]
    fn slice_rotation_fills_uncovered_corners() {
        let plane = Array2::from_elem((9, 9), 40i16);
        let rotated = RotationEngine::new().rotate_slice(plane.view(), (1.0, 1.0), 45.0);
        assert_eq!(rotated[[0, 0]], RotationEngine::AIR_HU);
        assert_eq!(rotated[[4, 4]], 40);
    }

    #[test]
    fn nearest_interpolation_only_produces_input_values() {
        let volume = ramp(6, 8, 8, Spacing::default());
        let rotated = RotationEngine::new()
            .with_interpolation(Interpolation::Nearest)
            .rotate_volume(&volume, &RotationState::new(17.0, 0.0, 0.0));
        let allowed: std::collections::HashSet<i16> = volume.data().iter().copied().collect();
        assert!(rotated
            .data()
            .iter()
            .all(|v| *v == RotationEngine::AIR_HU || allowed.contains(v)));
    }
}
