use ndarray::{ArrayView2, ArrayView3};

pub(crate) struct Interpolator;

impl Interpolator {
    /// Output size that keeps the physical aspect ratio of a plane when every
    /// pixel is drawn square at the finer of the two pitches.
    pub(crate) fn get_isotropic_dimensions(
        spacing: (f64, f64),
        original_dim: (usize, usize),
    ) -> (u32, u32) {
        let (width_spacing, height_spacing) = spacing;
        let min_spacing = width_spacing.min(height_spacing);
        let inv_min_spacing = 1.0 / min_spacing; // Multiply instead of divide

        // original_dim is (width, height)
        let new_width = (original_dim.0 as f64 * width_spacing * inv_min_spacing).round() as u32;
        let new_height = (original_dim.1 as f64 * height_spacing * inv_min_spacing).round() as u32;

        (new_width.max(1), new_height.max(1))
    }

    /// Round to the nearest representable sample.
    #[inline]
    pub(crate) fn to_sample(value: f64) -> i16 {
        value
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }

    #[inline]
    pub(crate) fn nearest_2d(slice: &ArrayView2<i16>, y: f64, x: f64) -> f64 {
        f64::from(slice[[y.round() as usize, x.round() as usize]])
    }

    #[inline]
    pub(crate) fn nearest_3d(volume: &ArrayView3<i16>, z: f64, y: f64, x: f64) -> f64 {
        f64::from(volume[[z.round() as usize, y.round() as usize, x.round() as usize]])
    }

    /// Callers guarantee `0 <= y <= height - 1` and `0 <= x <= width - 1`.
    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<i16>, y: f64, x: f64) -> f64 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f64;
        let dx = x - x0 as f64;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = f64::from(slice[[y0, x0]]);
        let v01 = f64::from(slice[[y0, x1]]);
        let v10 = f64::from(slice[[y1, x0]]);
        let v11 = f64::from(slice[[y1, x1]]);

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Weighted mean of the 8 voxels enclosing `(z, y, x)`.
    ///
    /// Callers guarantee every coordinate lies within `[0, dim - 1]`.
    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<i16>, z: f64, y: f64, x: f64) -> f64 {
        let (depth, height, width) = volume.dim();

        let z0 = z.floor() as usize;
        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f64;
        let dy = y - y0 as f64;
        let dx = x - x0 as f64;

        let lerp = |a: i16, b: i16, t: f64| f64::from(a).mul_add(1.0 - t, f64::from(b) * t);

        let c00 = lerp(volume[[z0, y0, x0]], volume[[z0, y0, x1]], dx);
        let c01 = lerp(volume[[z0, y1, x0]], volume[[z0, y1, x1]], dx);
        let c10 = lerp(volume[[z1, y0, x0]], volume[[z1, y0, x1]], dx);
        let c11 = lerp(volume[[z1, y1, x0]], volume[[z1, y1, x1]], dx);

        let c0 = c00.mul_add(1.0 - dy, c01 * dy);
        let c1 = c10.mul_add(1.0 - dy, c11 * dy);

        c0.mul_add(1.0 - dz, c1 * dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};

    #[test]
    fn bilinear_hits_grid_points_exactly() {
        let slice = Array2::from_shape_fn((3, 4), |(y, x)| (y * 10 + x) as i16);
        let view = slice.view();
        assert_eq!(Interpolator::bilinear_interpolate(&view, 2.0, 3.0), 23.0);
        assert_eq!(Interpolator::bilinear_interpolate(&view, 0.0, 0.0), 0.0);
    }

    #[test]
    fn bilinear_blends_neighbours() {
        let slice = Array2::from_shape_vec((2, 2), vec![0, 100, 200, 300]).unwrap();
        let view = slice.view();
        assert_relative_eq!(Interpolator::bilinear_interpolate(&view, 0.5, 0.5), 150.0);
        assert_relative_eq!(Interpolator::bilinear_interpolate(&view, 0.0, 0.25), 25.0);
    }

    #[test]
    fn trilinear_reproduces_linear_fields() {
        let volume = Array3::from_shape_fn((4, 5, 6), |(z, y, x)| (20 * z + 5 * y + 2 * x) as i16);
        let view = volume.view();
        for &(z, y, x) in &[(0.0, 0.0, 0.0), (1.25, 2.5, 3.75), (3.0, 4.0, 5.0), (2.9, 0.1, 4.4)] {
            assert_relative_eq!(
                Interpolator::trilinear_interpolate(&view, z, y, x),
                20.0 * z + 5.0 * y + 2.0 * x,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn nearest_rounds_to_closest_voxel() {
        let volume = Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (100 * z + 10 * y + x) as i16);
        let view = volume.view();
        assert_eq!(Interpolator::nearest_3d(&view, 0.6, 0.4, 0.5), 101.0);
    }

    #[test]
    fn samples_are_rounded_and_saturated() {
        assert_eq!(Interpolator::to_sample(-999.5), -1000);
        assert_eq!(Interpolator::to_sample(12.49), 12);
        assert_eq!(Interpolator::to_sample(1e9), i16::MAX);
    }

    #[test]
    fn isotropic_dimensions_stretch_the_coarse_axis() {
        assert_eq!(
            Interpolator::get_isotropic_dimensions((0.5, 2.5), (512, 40)),
            (512, 200)
        );
        assert_eq!(
            Interpolator::get_isotropic_dimensions((1.0, 1.0), (64, 32)),
            (64, 32)
        );
    }
}
