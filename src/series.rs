use crate::{slice_record::SliceRecord, volume::Volume};

/// A loaded CT stack: the voxel grid plus, per slice, the record it came from.
///
/// `records`, `source_ids` and `positions` are index-aligned with the slices of
/// `volume`, i.e. sorted by increasing stacking position.
#[derive(Clone, Debug)]
pub struct CtSeries<R> {
    volume: Volume,
    records: Vec<R>,
    source_ids: Vec<String>,
    positions: Vec<f64>,
}

impl<R: SliceRecord> CtSeries<R> {
    pub(crate) fn new(
        volume: Volume,
        records: Vec<R>,
        source_ids: Vec<String>,
        positions: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(volume.slice_count(), records.len());
        debug_assert_eq!(records.len(), source_ids.len());
        debug_assert_eq!(records.len(), positions.len());
        Self {
            volume,
            records,
            source_ids,
            positions,
        }
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn source_ids(&self) -> &[String] {
        &self.source_ids
    }

    /// Stacking-axis position of every slice in millimeters.
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
