use crate::{
    enums::ErrorKind,
    series::CtSeries,
    slice_record::{DicomSlice, SliceRecord, SliceRecordError},
    slice_writer::ROTATED_PREFIX,
    volume::{Spacing, Volume},
};

use byteorder::{ByteOrder, LittleEndian};
use dicom::object::ReadError;
use log::{debug, info, warn};
use ndarray::Array3;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use web_time::Instant;

/// Largest in-plane pitch difference (mm) still considered the same spacing.
const SPACING_TOLERANCE: f64 = 1e-4;

/// Relative deviation of a stacking gap from the derived slice spacing that is
/// reported as uneven.
const GAP_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No {pattern} files found in {location}")]
    NotFound { location: String, pattern: String },

    #[error("Slice {source_id}: {source}")]
    Record {
        source_id: String,
        #[source]
        source: SliceRecordError,
    },

    #[error("Slice {source_id} is {found:?} (rows, columns), expected {expected:?}")]
    InconsistentDimensions {
        source_id: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Slice {source_id} has pixel spacing {found:?}, expected {expected:?}")]
    InconsistentSpacing {
        source_id: String,
        expected: [f64; 2],
        found: [f64; 2],
    },

    #[error("Slices {first} and {second} share stacking position {position}")]
    DuplicatePosition {
        first: String,
        second: String,
        position: f64,
    },

    #[error("Slice {source_id} holds {found} bytes of pixel data, expected at least {expected}")]
    PixelDataLength {
        source_id: String,
        expected: usize,
        found: usize,
    },

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error in {}: {source}", path.display())]
    Dicom {
        path: PathBuf,
        #[source]
        source: ReadError,
    },
}

impl VolumeLoaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io(_) | Self::Dicom { .. } => ErrorKind::Io,
            Self::Record { .. }
            | Self::InconsistentDimensions { .. }
            | Self::InconsistentSpacing { .. }
            | Self::DuplicatePosition { .. }
            | Self::PixelDataLength { .. }
            | Self::Shape(_) => ErrorKind::Format,
        }
    }
}

/// Which files of a directory belong to the slice stack.
#[derive(Clone, Debug)]
pub struct LoaderOptions {
    /// File name prefix, matched case-insensitively.
    pub file_prefix: String,
    /// File extension without the dot, matched case-insensitively.
    pub extension: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            file_prefix: "CT".to_owned(),
            extension: "dcm".to_owned(),
        }
    }
}

impl LoaderOptions {
    pub fn pattern(&self) -> String {
        format!("{}*.{}", self.file_prefix, self.extension)
    }

    pub fn matches(&self, path: &Path) -> bool {
        let has_extension = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
        let has_prefix = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|name| name.get(..self.file_prefix.len()))
            .is_some_and(|head| head.eq_ignore_ascii_case(&self.file_prefix));
        has_extension && has_prefix
    }
}

/// Header fields of one record, read once before sorting.
struct SliceEntry<R> {
    source_id: String,
    record: R,
    rows: usize,
    columns: usize,
    pixel_spacing: [f64; 2],
    position: f64,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from slice records
    ///
    /// # Arguments
    ///
    /// * `records` - Pairs of source identifier (file name) and record, in any order
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an empty input and a format error if a record lacks a
    /// required attribute or disagrees with the rest of the stack.
    pub fn load_from_records<R: SliceRecord>(
        records: impl IntoIterator<Item = (String, R)>,
    ) -> Result<CtSeries<R>, VolumeLoaderError> {
        let mut entries = records
            .into_iter()
            .map(|(source_id, record)| Self::read_entry(source_id, record))
            .collect::<Result<Vec<_>, _>>()?;

        if entries.is_empty() {
            return Err(VolumeLoaderError::NotFound {
                location: "record set".to_owned(),
                pattern: "slice".to_owned(),
            });
        }

        // Stable, so equal positions keep their input order
        entries.sort_by(|a, b| a.position.total_cmp(&b.position));

        Self::validate_geometry(&entries)?;

        let slice_spacing = Self::get_slice_spacing(&entries);
        Self::check_even_spacing(&entries, slice_spacing);

        let volume_array = Self::build_volume_array(&entries)?;
        let [row_pitch, column_pitch] = entries[0].pixel_spacing;
        let spacing = Spacing::new(column_pitch, row_pitch, slice_spacing);

        let mut records = Vec::with_capacity(entries.len());
        let mut source_ids = Vec::with_capacity(entries.len());
        let mut positions = Vec::with_capacity(entries.len());
        for entry in entries {
            records.push(entry.record);
            source_ids.push(entry.source_id);
            positions.push(entry.position);
        }

        Ok(CtSeries::new(
            Volume::new(volume_array, spacing),
            records,
            source_ids,
            positions,
        ))
    }

    /// Load a volume from DICOM file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
    ) -> Result<CtSeries<DicomSlice>, VolumeLoaderError> {
        let records = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let slice = DicomSlice::open(path).map_err(|source| VolumeLoaderError::Dicom {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok((Self::source_id(path), slice))
            })
            .collect::<Result<Vec<_>, VolumeLoaderError>>()?;

        Self::load_from_records(records)
    }

    /// Load a volume from every file in `path` matching `options`
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        options: &LoaderOptions,
    ) -> Result<CtSeries<DicomSlice>, VolumeLoaderError> {
        let started = Instant::now();
        let path = path.as_ref();
        let mut paths: Vec<_> = fs::read_dir(path)?
            .filter_map(|entry| {
                entry
                    .inspect_err(|e| warn!("Skipping unreadable entry in {}: {e}", path.display()))
                    .ok()
            })
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && options.matches(path))
            .collect();
        Self::skip_rotated_outputs(&mut paths);

        if paths.is_empty() {
            return Err(VolumeLoaderError::NotFound {
                location: path.display().to_string(),
                pattern: options.pattern(),
            });
        }

        paths.sort();
        let series = Self::load_from_file_paths(&paths)?;

        let volume = series.volume();
        let spacing = volume.spacing();
        info!(
            "Loaded {} slices ({}x{}, spacing {:.2}x{:.2}x{:.2} mm) from {}",
            volume.slice_count(),
            volume.columns(),
            volume.rows(),
            spacing.x,
            spacing.y,
            spacing.z,
            path.display()
        );
        debug!("Loading took {:?}", started.elapsed());

        Ok(series)
    }

    /// Drop `CT.ROT.*` files written next to their sources, which would otherwise
    /// stack onto the same positions. A directory holding only rotated files is
    /// loaded as is.
    fn skip_rotated_outputs(paths: &mut Vec<PathBuf>) {
        let is_rotated = |path: &Path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.get(..ROTATED_PREFIX.len()))
                .is_some_and(|head| head.eq_ignore_ascii_case(ROTATED_PREFIX))
        };
        if paths.iter().all(|path| is_rotated(path)) {
            return;
        }
        paths.retain(|path| {
            let rotated = is_rotated(path);
            if rotated {
                warn!("Skipping rotated output {}", path.display());
            }
            !rotated
        });
    }

    fn source_id(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }

    fn read_entry<R: SliceRecord>(
        source_id: String,
        record: R,
    ) -> Result<SliceEntry<R>, VolumeLoaderError> {
        match Self::read_header(&record) {
            Ok((rows, columns, pixel_spacing, position)) => Ok(SliceEntry {
                source_id,
                record,
                rows,
                columns,
                pixel_spacing,
                position,
            }),
            Err(source) => Err(VolumeLoaderError::Record { source_id, source }),
        }
    }

    fn read_header<R: SliceRecord>(
        record: &R,
    ) -> Result<(usize, usize, [f64; 2], f64), SliceRecordError> {
        let rows = record.rows()?;
        let columns = record.columns()?;
        if rows == 0 || columns == 0 {
            return Err(SliceRecordError::InvalidAttribute {
                attribute: "Rows/Columns",
                reason: format!("empty image {rows}x{columns}"),
            });
        }
        let pixel_spacing = record.pixel_spacing()?;
        if pixel_spacing.iter().any(|pitch| !(*pitch > 0.0)) {
            return Err(SliceRecordError::InvalidAttribute {
                attribute: "PixelSpacing",
                reason: format!("non-positive pitch {pixel_spacing:?}"),
            });
        }
        let position = record.position()?[2];
        if !position.is_finite() {
            return Err(SliceRecordError::InvalidAttribute {
                attribute: "ImagePositionPatient",
                reason: format!("non-finite stacking position {position}"),
            });
        }
        Ok((rows, columns, pixel_spacing, position))
    }

    fn validate_geometry<R>(entries: &[SliceEntry<R>]) -> Result<(), VolumeLoaderError> {
        let first = &entries[0];
        for entry in entries {
            if (entry.rows, entry.columns) != (first.rows, first.columns) {
                return Err(VolumeLoaderError::InconsistentDimensions {
                    source_id: entry.source_id.clone(),
                    expected: (first.rows, first.columns),
                    found: (entry.rows, entry.columns),
                });
            }
            let spacing_differs = entry
                .pixel_spacing
                .iter()
                .zip(first.pixel_spacing)
                .any(|(a, b)| (a - b).abs() > SPACING_TOLERANCE);
            if spacing_differs {
                return Err(VolumeLoaderError::InconsistentSpacing {
                    source_id: entry.source_id.clone(),
                    expected: first.pixel_spacing,
                    found: entry.pixel_spacing,
                });
            }
        }

        if let Some(pair) = entries.windows(2).find(|w| w[0].position == w[1].position) {
            return Err(VolumeLoaderError::DuplicatePosition {
                first: pair[0].source_id.clone(),
                second: pair[1].source_id.clone(),
                position: pair[0].position,
            });
        }

        Ok(())
    }

    /// Distance between the first two sorted slices, `1.0` for a single slice.
    fn get_slice_spacing<R>(entries: &[SliceEntry<R>]) -> f64 {
        match entries {
            [first, second, ..] => (second.position - first.position).abs(),
            _ => 1.0,
        }
    }

    fn check_even_spacing<R>(entries: &[SliceEntry<R>], slice_spacing: f64) {
        let uneven = entries
            .windows(2)
            .filter(|w| {
                let gap = w[1].position - w[0].position;
                (gap - slice_spacing).abs() > GAP_TOLERANCE * slice_spacing
            })
            .count();
        if uneven > 0 {
            warn!(
                "{uneven} of {} slice gaps deviate from the derived slice spacing of {slice_spacing:.3} mm",
                entries.len() - 1
            );
        }
    }

    fn build_volume_array<R: SliceRecord>(
        entries: &[SliceEntry<R>],
    ) -> Result<Array3<i16>, VolumeLoaderError> {
        let (height, width) = (entries[0].rows, entries[0].columns);
        let depth = entries.len();
        let plane_len = height * width;
        let mut samples = vec![0i16; depth * plane_len];

        for (entry, plane) in entries.iter().zip(samples.chunks_exact_mut(plane_len)) {
            let bytes = entry
                .record
                .pixel_bytes()
                .map_err(|source| VolumeLoaderError::Record {
                    source_id: entry.source_id.clone(),
                    source,
                })?;
            let expected = plane_len * 2;
            if bytes.len() < expected {
                return Err(VolumeLoaderError::PixelDataLength {
                    source_id: entry.source_id.clone(),
                    expected,
                    found: bytes.len(),
                });
            }
            LittleEndian::read_i16_into(&bytes[..expected], plane);
        }

        Ok(Array3::from_shape_vec((depth, height, width), samples)?)
    }
}
