use crate::enums::Orientation;

use ndarray::{Array2, Array3, ArrayView2, s};

/// Physical sample pitch in millimeters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spacing {
    /// Between adjacent columns.
    pub x: f64,
    /// Between adjacent rows.
    pub y: f64,
    /// Between adjacent slices along the stacking axis.
    pub z: f64,
}

impl Spacing {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// A 2D plane cut out of a [`Volume`] together with its physical pitch.
#[derive(Clone, Debug, PartialEq)]
pub struct MprSlice {
    /// Samples indexed `[row, column]` in display order.
    pub pixels: Array2<i16>,
    /// Pitch as `(width, height)`, i.e. between columns then between rows.
    pub spacing: (f64, f64),
}

impl MprSlice {
    /// `(width, height)` in samples.
    pub fn size(&self) -> (usize, usize) {
        let (height, width) = self.pixels.dim();
        (width, height)
    }
}

/// Scalar CT volume in Hounsfield units.
///
/// Samples are indexed `[slice, row, column]`, slices ordered by increasing
/// stacking position. A volume is never modified after construction; every
/// transformation produces a new one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume {
    data: Array3<i16>,
    spacing: Spacing,
}

impl Volume {
    pub fn new(data: Array3<i16>, spacing: Spacing) -> Self {
        Self { data, spacing }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn columns(&self) -> usize {
        self.data.dim().2
    }

    pub fn rows(&self) -> usize {
        self.data.dim().1
    }

    pub fn slice_count(&self) -> usize {
        self.data.dim().0
    }

    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<i16> {
        &self.data
    }

    /// Borrow the `z`-th axial plane as stored.
    pub fn axial_plane(&self, z: usize) -> Option<ArrayView2<'_, i16>> {
        (z < self.slice_count()).then(|| self.data.slice(s![z, .., ..]))
    }

    /// Number of planes available along `orientation`.
    pub fn plane_count(&self, orientation: Orientation) -> usize {
        let (depth, height, width) = self.dim();
        match orientation {
            Orientation::Axial => depth,
            Orientation::Coronal => height,
            Orientation::Sagittal => width,
        }
    }

    /// Extract a plane along one of the canonical orientations.
    ///
    /// Sagittal and coronal planes run the stacking axis from the last slice to the
    /// first, so the superior end lands on the top row. Samples are copied as is,
    /// no interpolation takes place. Returns `None` if `index` is out of range.
    pub fn get_slice_from_axis(&self, index: usize, orientation: Orientation) -> Option<MprSlice> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }

        let Spacing { x, y, z } = self.spacing;
        let (view, spacing) = match orientation {
            // Looking down Z-axis: X is width, Y is height
            Orientation::Axial => (self.data.slice(s![index, .., ..]), (x, y)),
            // Looking down Y-axis: X is width, Z is height
            Orientation::Coronal => (self.data.slice(s![..;-1, index, ..]), (x, z)),
            // Looking down X-axis: Y is width, Z is height
            Orientation::Sagittal => (self.data.slice(s![..;-1, .., index]), (y, z)),
        };

        Some(MprSlice {
            pixels: view.as_standard_layout().into_owned(),
            spacing,
        })
    }

    pub fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        index < self.plane_count(orientation)
    }
}
