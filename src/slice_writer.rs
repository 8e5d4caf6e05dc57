use crate::{
    enums::ErrorKind,
    series::CtSeries,
    slice_record::{SliceRecord, SliceRecordError},
    volume::Volume,
};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};
use ndarray::ArrayView2;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use web_time::Instant;

/// Prefix of every rotated output file.
pub const ROTATED_PREFIX: &str = "CT.ROT.";

const SOURCE_PREFIX: &str = "CT.";

#[derive(Debug, Error)]
pub enum SliceWriterError {
    #[error("Cannot create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rotated volume is {found:?}, series holds {expected:?} (slices, rows, columns)")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("Writing slice {index} to {} failed after {written} files: {source}", path.display())]
    Write {
        index: usize,
        path: PathBuf,
        /// Slices already persisted before the failure. They are not removed.
        written: usize,
        #[source]
        source: SliceRecordError,
    },
}

impl SliceWriterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ShapeMismatch { .. } => ErrorKind::Format,
            Self::CreateDir { .. } | Self::Write { .. } => ErrorKind::Io,
        }
    }
}

/// Files persisted by one write, in slice order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
}

impl WriteReport {
    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

/// Output file name for a source file name.
///
/// A leading `CT.` (any case) is replaced by `CT.ROT.`, anything else gets
/// `CT.ROT.` prepended.
pub fn output_file_name(source_id: &str) -> String {
    let rest = source_id
        .get(..SOURCE_PREFIX.len())
        .filter(|head| head.eq_ignore_ascii_case(SOURCE_PREFIX))
        .map_or(source_id, |_| &source_id[SOURCE_PREFIX.len()..]);
    format!("{ROTATED_PREFIX}{rest}")
}

/// Serialize a plane row-major as little-endian 16-bit samples.
pub fn plane_to_le_bytes(plane: ArrayView2<'_, i16>) -> Vec<u8> {
    let samples: Vec<i16> = plane.iter().copied().collect();
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(&samples, &mut bytes);
    bytes
}

pub struct SliceWriter;

impl SliceWriter {
    /// Write `rotated` back onto the records of `series`.
    ///
    /// Slice `z` of `rotated` replaces the pixel content of a copy of record `z`,
    /// which is then written to `output_dir` under [`output_file_name`]. The
    /// records held by `series` are not modified.
    ///
    /// # Errors
    ///
    /// Stops at the first failing slice. Files written before it stay on disk.
    pub fn write_series<R: SliceRecord>(
        series: &CtSeries<R>,
        rotated: &Volume,
        output_dir: impl AsRef<Path>,
    ) -> Result<WriteReport, SliceWriterError> {
        let started = Instant::now();
        let output_dir = output_dir.as_ref();

        let expected = series.volume().dim();
        if rotated.dim() != expected {
            return Err(SliceWriterError::ShapeMismatch {
                expected,
                found: rotated.dim(),
            });
        }

        fs::create_dir_all(output_dir).map_err(|source| SliceWriterError::CreateDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let mut report = WriteReport::default();
        let slices = series.records().iter().zip(series.source_ids());
        for (index, (record, source_id)) in slices.enumerate() {
            let path = output_dir.join(output_file_name(source_id));
            let Some(plane) = rotated.axial_plane(index) else {
                break;
            };

            let mut record = record.clone();
            record.replace_pixel_data(plane_to_le_bytes(plane));
            record
                .write_to_file(&path)
                .map_err(|source| SliceWriterError::Write {
                    index,
                    path: path.clone(),
                    written: report.len(),
                    source,
                })?;

            debug!("{source_id} -> {}", path.display());
            report.written.push(path);
        }

        info!(
            "Saved {} rotated files to {}",
            report.len(),
            output_dir.display()
        );
        debug!("Writing took {:?}", started.elapsed());

        Ok(report)
    }
}
