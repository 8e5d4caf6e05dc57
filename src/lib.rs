//! # CT rotation library
//!
//! This crate rebuilds a CT volume from a stack of axial DICOM slices, cuts
//! axial, coronal and sagittal planes out of it and applies a rigid 3D rotation
//! to the whole volume. The rotated volume is written back as a new slice
//! stack: every output file carries the metadata of its source slice, only the
//! pixel data is replaced.
//!
//! The pipeline is split into small, separately testable parts:
//!  - [`VolumeLoader`] reads `CT*.dcm` files, sorts them by the third component
//!    of Image Position (Patient) and derives the slice spacing from the first
//!    two positions.
//!  - [`Volume`] is the read-only voxel grid. [`Volume::get_slice_from_axis`]
//!    extracts the three canonical planes without interpolation.
//!  - [`RotationEngine`] composes the three view angles into one rotation
//!    ([`rotation_matrix`], X then Y then Z) and resamples the volume with
//!    trilinear interpolation, filling everything outside with air (-1000 HU).
//!  - [`SliceWriter`] patches the pixel data of each slice record and saves it
//!    as `CT.ROT.<name>`.
//!
//! Only [`VolumeLoader::load_from_directory`] and [`SliceWriter::write_series`]
//! touch the filesystem; everything in between works on in-memory buffers.
//! Storage access goes through the [`SliceRecord`] trait, so the core can be
//! driven by any record type, not only [`DicomSlice`].
//!
//! DICOM files are assumed to have the following attributes:
//!  - Axial data set of a single series
//!  - Native (uncompressed) little-endian pixel data with 16 bits allocated
//!  - No multiframe
//!
//! # Examples
//!
//! ## Rotating a CT series
//!
//! ```no_run
//! # use ct_rotate::{RotationState, finalize, load};
//! let series = load("dicom").expect("should have loaded CT files from directory");
//! let rotation = RotationState::new(12.0, 0.0, -4.5);
//! let report = finalize(&series, &rotation, "dicom_rotated")
//!     .expect("should have written rotated slices");
//! println!("wrote {} files", report.len());
//! ```
//!
//! ## Previewing a sagittal plane
//!
//! ```no_run
//! # use ct_rotate::{Orientation, WindowLevel, load, render_slice};
//! let series = load("dicom").expect("should have loaded CT files from directory");
//! let volume = series.volume();
//! let slice = volume
//!     .get_slice_from_axis(volume.columns() / 2, Orientation::Sagittal)
//!     .expect("should have returned plane at center of volume");
//! render_slice(&slice, &WindowLevel::default())
//!     .expect("should have rendered plane")
//!     .save("sagittal.png")
//!     .expect("should have saved image");
//! ```

pub mod enums;
mod interpolator;
pub mod preview;
pub mod rotation;
pub mod series;
pub mod session;
pub mod slice_record;
pub mod slice_writer;
pub mod volume;
pub mod volume_loader;

pub use enums::{ErrorKind, Interpolation, Orientation};
pub use preview::{WindowLevel, render_slice};
pub use rotation::{RotationEngine, RotationState, rotation_matrix};
pub use series::CtSeries;
pub use session::{RotationSession, finalize, finalize_with, load};
pub use slice_record::{DicomSlice, SliceRecord, SliceRecordError};
pub use slice_writer::{SliceWriter, SliceWriterError, WriteReport, output_file_name};
pub use volume::{MprSlice, Spacing, Volume};
pub use volume_loader::{LoaderOptions, VolumeLoader, VolumeLoaderError};
