use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::acquire::ImageHandle;
use crate::traits::MetadataReader;

/// EXIF orientation tag (0x0112) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrientationTag {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
    Undefined(u32),
}

impl OrientationTag {
    pub const fn from_exif(value: u32) -> Self {
        match value {
            1 => Self::Normal,
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            other => Self::Undefined(other),
        }
    }

    pub const fn to_exif(self) -> u32 {
        match self {
            Self::Normal => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
            Self::Undefined(value) => value,
        }
    }
}

/// Clockwise rotation needed to display an image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RotationDegrees {
    #[default]
    D0,
    D90,
    D180,
    D270,
}

impl RotationDegrees {
    pub const fn degrees(self) -> u32 {
        match self {
            Self::D0 => 0,
            Self::D90 => 90,
            Self::D180 => 180,
            Self::D270 => 270,
        }
    }

    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::D0 => image,
            Self::D90 => image.rotate90(),
            Self::D180 => image.rotate180(),
            Self::D270 => image.rotate270(),
        }
    }
}

impl std::fmt::Display for RotationDegrees {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Maps an orientation tag to a rotation correction.
///
/// Flips and transposes carry no pure rotation and map to zero, as does
/// anything unknown.
pub const fn exif_to_degrees(tag: OrientationTag) -> RotationDegrees {
    match tag {
        OrientationTag::Rotate90 => RotationDegrees::D90,
        OrientationTag::Rotate180 => RotationDegrees::D180,
        OrientationTag::Rotate270 => RotationDegrees::D270,
        _ => RotationDegrees::D0,
    }
}

/// Reads the orientation tag with `kamadak-exif`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadataReader;

impl ExifMetadataReader {
    pub const fn new() -> Self {
        Self
    }

    fn try_read(path: &Path) -> std::result::Result<Option<u32>, String> {
        let file = File::open(path).map_err(|e| e.to_string())?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new()
            .read_from_container(&mut reader)
            .map_err(|e| e.to_string())?;

        Ok(exif
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0)))
    }
}

impl MetadataReader for ExifMetadataReader {
    fn read_orientation(&self, path: &Path) -> OrientationTag {
        match Self::try_read(path) {
            Ok(Some(value)) => OrientationTag::from_exif(value),
            Ok(None) => OrientationTag::Normal,
            Err(reason) => {
                debug!(path = %path.display(), %reason, "no readable EXIF orientation, assuming normal");
                OrientationTag::Normal
            }
        }
    }
}

/// Turns an acquired image into the rotation the segmenter must apply.
#[derive(Debug, Clone, Default)]
pub struct OrientationNormalizer<M: MetadataReader> {
    reader: M,
}

impl<M: MetadataReader> OrientationNormalizer<M> {
    pub const fn new(reader: M) -> Self {
        Self { reader }
    }

    pub fn rotation_for(&self, handle: &ImageHandle) -> RotationDegrees {
        exif_to_degrees(self.reader.read_orientation(handle.path()))
    }
}
