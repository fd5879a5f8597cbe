use image::{DynamicImage, RgbaImage};

/// Owned RGBA8 copy of an acquired image.
///
/// Built by copying out of whatever the preview currently shows, then moved
/// into the segmenter. Nothing else keeps a reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: RgbaImage,
}

impl PixelBuffer {
    pub fn from_image(image: &DynamicImage) -> Self {
        Self {
            pixels: image.to_rgba8(),
        }
    }

    pub const fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.pixels)
    }
}
