use std::{borrow::Cow, path::Path};

use dicom::{
    core::{DataElement, PrimitiveValue, VR},
    object::{DefaultDicomObject, ReadError, WriteError, open_file},
};
use dicom_dictionary_std::tags;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceRecordError {
    #[error("Missing required attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Invalid {attribute}: {reason}")]
    InvalidAttribute {
        attribute: &'static str,
        reason: String,
    },

    #[error("DICOM write error: {0}")]
    Write(#[from] WriteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One slice as handed over by the storage format.
///
/// The loader only reads the geometric header and the raw pixel buffer. Everything
/// else about the record is opaque: the writer replaces the pixel content through
/// [`SliceRecord::replace_pixel_data`] and persists the record untouched otherwise.
pub trait SliceRecord: Clone {
    fn rows(&self) -> Result<usize, SliceRecordError>;

    fn columns(&self) -> Result<usize, SliceRecordError>;

    /// In-plane pitch in millimeters as `[row pitch, column pitch]`.
    fn pixel_spacing(&self) -> Result<[f64; 2], SliceRecordError>;

    /// Position of the first transmitted pixel. Only the third component is used
    /// for stacking.
    fn position(&self) -> Result<[f64; 3], SliceRecordError>;

    /// Raw pixel buffer, `rows * columns` little-endian signed 16-bit samples.
    fn pixel_bytes(&self) -> Result<Cow<'_, [u8]>, SliceRecordError>;

    fn replace_pixel_data(&mut self, bytes: Vec<u8>);

    fn write_to_file(&self, path: &Path) -> Result<(), SliceRecordError>;
}

/// A CT image read from a DICOM file.
#[derive(Debug, Clone)]
pub struct DicomSlice {
    object: DefaultDicomObject,
}

impl DicomSlice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        open_file(path.as_ref()).map(Self::from)
    }

    pub fn object(&self) -> &DefaultDicomObject {
        &self.object
    }

    fn element(
        &self,
        tag: dicom::core::Tag,
        name: &'static str,
    ) -> Result<&dicom::object::mem::InMemElement, SliceRecordError> {
        self.object
            .element(tag)
            .map_err(|_| SliceRecordError::MissingAttribute(name))
    }

    fn read_u16(&self, tag: dicom::core::Tag, name: &'static str) -> Result<u16, SliceRecordError> {
        self.element(tag, name)?
            .to_int::<u16>()
            .map_err(|e| SliceRecordError::InvalidAttribute {
                attribute: name,
                reason: e.to_string(),
            })
    }

    fn read_floats<const N: usize>(
        &self,
        tag: dicom::core::Tag,
        name: &'static str,
    ) -> Result<[f64; N], SliceRecordError> {
        let values = self
            .element(tag, name)?
            .to_multi_float64()
            .map_err(|e| SliceRecordError::InvalidAttribute {
                attribute: name,
                reason: e.to_string(),
            })?;

        values
            .get(..N)
            .and_then(|head| <[f64; N]>::try_from(head).ok())
            .ok_or_else(|| SliceRecordError::InvalidAttribute {
                attribute: name,
                reason: format!("expected {N} values, found {}", values.len()),
            })
    }
}

impl From<DefaultDicomObject> for DicomSlice {
    fn from(object: DefaultDicomObject) -> Self {
        Self { object }
    }
}

impl SliceRecord for DicomSlice {
    fn rows(&self) -> Result<usize, SliceRecordError> {
        self.read_u16(tags::ROWS, "Rows").map(usize::from)
    }

    fn columns(&self) -> Result<usize, SliceRecordError> {
        self.read_u16(tags::COLUMNS, "Columns").map(usize::from)
    }

    fn pixel_spacing(&self) -> Result<[f64; 2], SliceRecordError> {
        self.read_floats::<2>(tags::PIXEL_SPACING, "PixelSpacing")
    }

    fn position(&self) -> Result<[f64; 3], SliceRecordError> {
        self.read_floats::<3>(tags::IMAGE_POSITION_PATIENT, "ImagePositionPatient")
    }

    fn pixel_bytes(&self) -> Result<Cow<'_, [u8]>, SliceRecordError> {
        // BitsAllocated is optional in the header but must agree when present
        if self.object.element(tags::BITS_ALLOCATED).is_ok() {
            let bits = self.read_u16(tags::BITS_ALLOCATED, "BitsAllocated")?;
            if bits != 16 {
                return Err(SliceRecordError::InvalidAttribute {
                    attribute: "BitsAllocated",
                    reason: format!("expected 16, found {bits}"),
                });
            }
        }

        self.element(tags::PIXEL_DATA, "PixelData")?
            .to_bytes()
            .map_err(|e| SliceRecordError::InvalidAttribute {
                attribute: "PixelData",
                reason: format!("only native pixel data is supported ({e})"),
            })
    }

    fn replace_pixel_data(&mut self, bytes: Vec<u8>) {
        self.object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::from(bytes),
        ));
    }

    fn write_to_file(&self, path: &Path) -> Result<(), SliceRecordError> {
        self.object.write_to_file(path)?;
        Ok(())
    }
}
