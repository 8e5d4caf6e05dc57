use crate::{
    enums::Orientation,
    rotation::{RotationEngine, RotationState},
    series::CtSeries,
    slice_record::{DicomSlice, SliceRecord},
    slice_writer::{SliceWriter, SliceWriterError, WriteReport},
    volume::MprSlice,
    volume_loader::{LoaderOptions, VolumeLoader, VolumeLoaderError},
};

use log::info;
use std::path::Path;

/// Load every `CT*.dcm` slice in `dir`.
pub fn load(dir: impl AsRef<Path>) -> Result<CtSeries<DicomSlice>, VolumeLoaderError> {
    VolumeLoader::load_from_directory(dir, &LoaderOptions::default())
}

/// Rotate the loaded volume and write one file per slice to `output_dir`.
///
/// The series itself is left as loaded, so a failed call can be repeated.
pub fn finalize<R: SliceRecord>(
    series: &CtSeries<R>,
    rotation: &RotationState,
    output_dir: impl AsRef<Path>,
) -> Result<WriteReport, SliceWriterError> {
    finalize_with(&RotationEngine::default(), series, rotation, output_dir)
}

pub fn finalize_with<R: SliceRecord>(
    engine: &RotationEngine,
    series: &CtSeries<R>,
    rotation: &RotationState,
    output_dir: impl AsRef<Path>,
) -> Result<WriteReport, SliceWriterError> {
    info!(
        "Applying 3D rotation (Ax:{:.1}° Sag:{:.1}° Cor:{:.1}°)",
        rotation.axial, rotation.sagittal, rotation.coronal
    );
    let rotated = engine.rotate_volume(series.volume(), rotation);
    SliceWriter::write_series(series, &rotated, output_dir)
}

/// A loaded series together with the angle dialled in on each view.
#[derive(Clone, Debug)]
pub struct RotationSession<R> {
    series: CtSeries<R>,
    rotation: RotationState,
    engine: RotationEngine,
}

impl RotationSession<DicomSlice> {
    pub fn open(
        dir: impl AsRef<Path>,
        options: &LoaderOptions,
    ) -> Result<Self, VolumeLoaderError> {
        VolumeLoader::load_from_directory(dir, options).map(Self::new)
    }
}

impl<R: SliceRecord> RotationSession<R> {
    /// Start with all three view angles at zero.
    pub fn new(series: CtSeries<R>) -> Self {
        Self {
            series,
            rotation: RotationState::default(),
            engine: RotationEngine::default(),
        }
    }

    pub fn with_engine(mut self, engine: RotationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn series(&self) -> &CtSeries<R> {
        &self.series
    }

    pub fn rotation(&self) -> &RotationState {
        &self.rotation
    }

    pub fn set_angle(&mut self, orientation: Orientation, degrees: f64) {
        self.rotation.set_angle(orientation, degrees);
    }

    /// Replace the loaded series; the view angles start over at zero.
    pub fn replace_series(&mut self, series: CtSeries<R>) {
        self.series = series;
        self.rotation.reset();
    }

    /// Number of planes a slider for `orientation` ranges over.
    pub fn plane_count(&self, orientation: Orientation) -> usize {
        self.series.volume().plane_count(orientation)
    }

    /// Middle of the slider range.
    pub fn default_index(&self, orientation: Orientation) -> usize {
        self.plane_count(orientation).saturating_sub(1) / 2
    }

    pub fn view(&self, orientation: Orientation, index: usize) -> Option<MprSlice> {
        self.series.volume().get_slice_from_axis(index, orientation)
    }

    pub fn finalize(&self, output_dir: impl AsRef<Path>) -> Result<WriteReport, SliceWriterError> {
        finalize_with(&self.engine, &self.series, &self.rotation, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{enums::ErrorKind, slice_record::testing::MemorySlice};

    fn memory_session(depth: usize, rows: usize, columns: usize) -> RotationSession<MemorySlice> {
        let records = (0..depth).map(|z| {
            let samples: Vec<i16> = (0..rows * columns).map(|i| (z * 100 + i) as i16).collect();
            (
                format!("CT.{z}.dcm"),
                MemorySlice::new(rows, columns, z as f64 * 2.0, &samples),
            )
        });
        RotationSession::new(VolumeLoader::load_from_records(records).unwrap())
    }

    #[test]
    fn new_session_starts_unrotated() {
        let session = memory_session(3, 4, 5);
        assert!(session.rotation().is_identity());
    }

    #[test]
    fn slider_defaults_to_middle_plane() {
        let session = memory_session(3, 4, 5);
        assert_eq!(session.plane_count(Orientation::Axial), 3);
        assert_eq!(session.default_index(Orientation::Axial), 1);
        assert_eq!(session.default_index(Orientation::Sagittal), 2);
        assert_eq!(session.default_index(Orientation::Coronal), 1);
    }

    #[test]
    fn views_come_from_the_loaded_volume() {
        let session = memory_session(3, 4, 5);
        let axial = session.view(Orientation::Axial, 2).unwrap();
        assert_eq!(axial.pixels[[0, 0]], 200);
        assert!(session.view(Orientation::Coronal, 4).is_none());
    }

    #[test]
    fn replacing_the_series_resets_angles() {
        let mut session = memory_session(2, 2, 2);
        session.set_angle(Orientation::Sagittal, 15.0);
        assert_eq!(session.rotation().sagittal, 15.0);

        let other = memory_session(3, 2, 2).series().clone();
        session.replace_series(other);
        assert!(session.rotation().is_identity());
        assert_eq!(session.plane_count(Orientation::Axial), 3);
    }

    #[test]
    fn unrotated_finalize_writes_original_samples() {
        let session = memory_session(2, 3, 3);
        let dir = tempfile::tempdir().unwrap();

        let report = session.finalize(dir.path()).unwrap();

        assert_eq!(report.len(), 2);
        let written = std::fs::read(dir.path().join("CT.ROT.1.dcm")).unwrap();
        assert_eq!(written, session.series().records()[1].pixels);
    }

    #[test]
    fn failed_finalize_leaves_session_usable() {
        let mut session = memory_session(2, 2, 2);
        session.set_angle(Orientation::Axial, 30.0);
        let before = session.series().volume().clone();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let err = session.finalize(&blocker).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(session.series().volume(), &before);
        assert_eq!(session.rotation().axial, 30.0);

        assert_eq!(session.finalize(dir.path().join("retry")).unwrap().len(), 2);
    }
}
