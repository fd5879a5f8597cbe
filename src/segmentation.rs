use std::collections::BTreeMap;
use std::time::Duration;

use image::{GrayImage, Luma, Rgba};

/// A class the segmenter can emit, with the color used to draw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColoredLabel {
    pub label: String,
    pub display_name: String,
    pub color: Rgba<u8>,
}

impl ColoredLabel {
    pub fn new(label: impl Into<String>, color: Rgba<u8>) -> Self {
        let label = label.into();
        Self {
            display_name: label.clone(),
            label,
            color,
        }
    }

    /// Placeholder for class indices the label table does not cover.
    pub fn unnamed(index: usize) -> Self {
        Self::new(format!("class_{index}"), voc_color(index))
    }
}

/// Pixels of one class, as a 0/255 mask the size of the segmented image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledRegion {
    pub label: ColoredLabel,
    pub mask: GrayImage,
}

impl LabeledRegion {
    pub fn area(&self) -> usize {
        self.mask.pixels().filter(|p| p.0[0] > 0).count()
    }
}

/// What a segmenter hands back for one buffer.
///
/// `image_height`/`image_width` describe the image the segmenter actually
/// processed, after rotation, and reach the renderer unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationResult {
    pub regions: Vec<LabeledRegion>,
    pub inference_time: Duration,
    pub image_height: u32,
    pub image_width: u32,
}

/// Splits a per-pixel class-index mask into one region per class present.
///
/// Regions come back ordered by class index.
pub fn regions_from_category_mask(
    category_mask: &GrayImage,
    labels: &[ColoredLabel],
) -> Vec<LabeledRegion> {
    let (width, height) = category_mask.dimensions();
    let mut masks: BTreeMap<u8, GrayImage> = BTreeMap::new();

    for (x, y, Luma([class])) in category_mask.enumerate_pixels() {
        masks
            .entry(*class)
            .or_insert_with(|| GrayImage::new(width, height))
            .put_pixel(x, y, Luma([u8::MAX]));
    }

    masks
        .into_iter()
        .map(|(class, mask)| {
            let index = class as usize;
            LabeledRegion {
                label: labels
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| ColoredLabel::unnamed(index)),
                mask,
            }
        })
        .collect()
}

const PASCAL_VOC_CLASSES: [&str; 21] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tv",
];

/// The 21 Pascal VOC classes used by DeepLab-style models.
pub fn pascal_voc_labels() -> Vec<ColoredLabel> {
    labels_from_names(PASCAL_VOC_CLASSES.iter().copied())
}

pub fn labels_from_names<I, S>(names: I) -> Vec<ColoredLabel>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| ColoredLabel::new(name, voc_color(index)))
        .collect()
}

/// Pascal VOC color map entry for a class index.
pub fn voc_color(index: usize) -> Rgba<u8> {
    let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
    let mut c = index;
    for shift in (0..8).rev() {
        r |= ((c & 1) as u8) << shift;
        g |= (((c >> 1) & 1) as u8) << shift;
        b |= (((c >> 2) & 1) as u8) << shift;
        c >>= 3;
    }
    Rgba([r, g, b, u8::MAX])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voc_color_map() {
        assert_eq!(voc_color(0), Rgba([0, 0, 0, 255]));
        assert_eq!(voc_color(1), Rgba([128, 0, 0, 255]));
        assert_eq!(voc_color(15), Rgba([192, 128, 128, 255]));
    }

    #[test]
    fn test_pascal_labels() {
        let labels = pascal_voc_labels();
        assert_eq!(labels.len(), 21);
        assert_eq!(labels[15].label, "person");
        assert_eq!(labels[15].display_name, "person");
    }

    #[test]
    fn test_regions_from_category_mask() {
        let mut mask = GrayImage::new(4, 2);
        mask.put_pixel(0, 0, Luma([15]));
        mask.put_pixel(1, 0, Luma([15]));
        mask.put_pixel(3, 1, Luma([40]));

        let regions = regions_from_category_mask(&mask, &pascal_voc_labels());

        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].label.label, "background");
        assert_eq!(regions[0].area(), 5);
        assert_eq!(regions[1].label.label, "person");
        assert_eq!(regions[1].area(), 2);
        assert_eq!(regions[1].mask.get_pixel(1, 0), &Luma([255]));
        assert_eq!(regions[2].label.label, "class_40");
        assert_eq!(regions[2].mask.dimensions(), (4, 2));
    }
}
