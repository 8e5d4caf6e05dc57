//! 8-bit grayscale rendering of reformatted planes for display.

use crate::{interpolator::Interpolator, volume::MprSlice};

use image::{GrayImage, ImageBuffer};
use ndarray::ArrayView2;
use rayon::prelude::*;

/// Linear intensity window in Hounsfield units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowLevel {
    pub width: f64,
    pub level: f64,
}

impl Default for WindowLevel {
    /// Wide window showing air through bone.
    fn default() -> Self {
        Self {
            width: 2000.0,
            level: 0.0,
        }
    }
}

impl WindowLevel {
    pub fn new(width: f64, level: f64) -> Self {
        Self { width, level }
    }

    #[inline]
    pub fn to_u8(&self, value: f64) -> u8 {
        let lower = self.level - self.width / 2.0;
        ((value - lower) / self.width * 255.0).clamp(0.0, 255.0) as u8
    }
}

/// Render a plane with square pixels.
///
/// When the two pitches differ the plane is bilinearly resampled so that every
/// output pixel covers the finer pitch in both directions.
pub fn render_slice(slice: &MprSlice, window: &WindowLevel) -> Option<GrayImage> {
    let (width, height) = slice.size();
    if width == 0 || height == 0 {
        return None;
    }

    let (target_width, target_height) =
        Interpolator::get_isotropic_dimensions(slice.spacing, (width, height));
    let view = slice.pixels.view();

    if (target_width as usize, target_height as usize) == (width, height) {
        slice_to_image(&view, window)
    } else {
        interpolate_slice(&view, target_width, target_height, window)
    }
}

fn slice_to_image(slice: &ArrayView2<'_, i16>, window: &WindowLevel) -> Option<GrayImage> {
    let (height, width) = slice.dim();
    let pixel_data: Vec<u8> = slice
        .as_standard_layout()
        .as_slice()?
        .par_iter()
        .map(|&v| window.to_u8(f64::from(v)))
        .collect();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
}

fn interpolate_slice(
    slice: &ArrayView2<'_, i16>,
    width: u32,
    height: u32,
    window: &WindowLevel,
) -> Option<GrayImage> {
    let (slice_height, slice_width) = slice.dim();

    let pixel_data: Vec<u8> = (0..height)
        .into_par_iter()
        .flat_map(|y| {
            (0..width)
                .map(|x| {
                    // Normalized coordinates with half-pixel offset
                    let norm_x = (x as f64 + 0.5) / width as f64;
                    let norm_y = (y as f64 + 0.5) / height as f64;

                    // Convert back to source coordinates
                    let src_x = norm_x * slice_width as f64 - 0.5;
                    let src_y = norm_y * slice_height as f64 - 0.5;

                    // Clamp to valid range
                    let src_x = src_x.clamp(0.0, (slice_width - 1) as f64);
                    let src_y = src_y.clamp(0.0, (slice_height - 1) as f64);

                    let value = Interpolator::bilinear_interpolate(slice, src_y, src_x);
                    window.to_u8(value)
                })
                .collect::<Vec<u8>>()
        })
        .collect();

    ImageBuffer::from_raw(width, height, pixel_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn window_maps_linearly_and_clamps() {
        let window = WindowLevel::default();
        assert_eq!(window.to_u8(-1000.0), 0);
        assert_eq!(window.to_u8(-3000.0), 0);
        assert_eq!(window.to_u8(0.0), 127);
        assert_eq!(window.to_u8(1000.0), 255);
        assert_eq!(window.to_u8(3071.0), 255);
    }

    #[test]
    fn isotropic_slice_keeps_its_size() {
        let slice = MprSlice {
            pixels: Array2::from_shape_vec((2, 3), vec![-1000, 0, 1000, 1000, 0, -1000]).unwrap(),
            spacing: (0.5, 0.5),
        };
        let image = render_slice(&slice, &WindowLevel::default()).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(2, 0).0, [255]);
        assert_eq!(image.get_pixel(0, 1).0, [255]);
    }

    #[test]
    fn anisotropic_slice_is_stretched_along_coarse_axis() {
        let slice = MprSlice {
            pixels: Array2::from_elem((4, 10), 0i16),
            spacing: (0.5, 2.0),
        };
        let image = render_slice(&slice, &WindowLevel::new(1000.0, 0.0)).unwrap();
        assert_eq!(image.dimensions(), (10, 16));
        assert!(image.pixels().all(|p| p.0 == [127]));
    }
}
