/// The three canonical viewing planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Sampling kernel used by the resampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

/// Coarse failure class shared by the loader and the writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// No matching slice records at the input location.
    NotFound,
    /// A record is missing a field or disagrees with the rest of the stack.
    Format,
    /// Read or write failure at the storage boundary.
    Io,
}
