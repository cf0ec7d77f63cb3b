// src/services/image_processor.rs
use crate::errors::SkinReportError;
use image::{GenericImageView, ImageFormat as ImgFormat};

/// Longest edge sent to the inference service.
pub const MAX_PAGE_EDGE: u32 = 2048;

/// Mean channel intensities (0-255) of a downsampled page image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl ChannelStats {
    pub fn blue_share(&self) -> f64 {
        let total = self.red + self.green + self.blue;
        if total <= f64::EPSILON {
            return 0.0;
        }
        self.blue / total
    }

    /// UV photography renders skin in a dominant blue/violet cast.
    pub fn looks_ultraviolet(&self) -> bool {
        self.blue_share() >= 0.45 && self.blue >= self.red * 1.3
    }
}

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), SkinReportError> {
        let img = image::load_from_memory(data)
            .map_err(|e| SkinReportError::InvalidFormat(format!("Invalid image: {}", e)))?;

        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(SkinReportError::InvalidFormat(
                "Image has no pixels".to_string(),
            ));
        }

        Ok((width, height))
    }

    /// Downscale to `max_size` on the long edge, re-encoding as PNG.
    /// Returns `None` when the image already fits.
    pub fn resize_if_needed(
        &self,
        data: &[u8],
        max_size: u32,
    ) -> Result<Option<Vec<u8>>, SkinReportError> {
        let img = image::load_from_memory(data)
            .map_err(|e| SkinReportError::InvalidFormat(format!("Failed to load image: {}", e)))?;

        let (width, height) = img.dimensions();

        if width <= max_size && height <= max_size {
            return Ok(None);
        }

        let ratio = (max_size as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);

        let mut output = Vec::new();
        resized
            .write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Png)
            .map_err(|e| {
                SkinReportError::InvalidFormat(format!("Failed to encode resized image: {}", e))
            })?;

        Ok(Some(output))
    }

    pub fn channel_stats(&self, data: &[u8]) -> Result<ChannelStats, SkinReportError> {
        let img = image::load_from_memory(data)
            .map_err(|e| SkinReportError::InvalidFormat(format!("Failed to load image: {}", e)))?;

        let sample = img.thumbnail(64, 64).to_rgb8();
        let pixels = (sample.width() as u64 * sample.height() as u64).max(1);

        let (mut red, mut green, mut blue) = (0u64, 0u64, 0u64);
        for pixel in sample.pixels() {
            red += pixel[0] as u64;
            green += pixel[1] as u64;
            blue += pixel[2] as u64;
        }

        Ok(ChannelStats {
            red: red as f64 / pixels as f64,
            green: green as f64 / pixels as f64,
            blue: blue as f64 / pixels as f64,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};

    pub(crate) fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    pub(crate) fn solid_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), ImageOutputFormat::Jpeg(90))
            .unwrap();
        out
    }

    #[test]
    fn blue_cast_reads_as_ultraviolet() {
        let processor = ImageProcessor::new();
        let uv = processor.channel_stats(&solid_png(16, 16, [60, 40, 200])).unwrap();
        assert!(uv.looks_ultraviolet());

        let daylight = processor.channel_stats(&solid_png(16, 16, [210, 170, 150])).unwrap();
        assert!(!daylight.looks_ultraviolet());
    }

    #[test]
    fn black_image_has_zero_blue_share() {
        let stats = ImageProcessor::new()
            .channel_stats(&solid_png(4, 4, [0, 0, 0]))
            .unwrap();
        assert_eq!(stats.blue_share(), 0.0);
        assert!(!stats.looks_ultraviolet());
    }

    #[test]
    fn small_images_are_not_resized() {
        let processor = ImageProcessor::new();
        let png = solid_png(32, 16, [1, 2, 3]);
        assert!(processor.resize_if_needed(&png, 64).unwrap().is_none());

        let resized = processor.resize_if_needed(&png, 8).unwrap().unwrap();
        assert_eq!(processor.validate_image(&resized).unwrap(), (8, 4));
    }

    #[test]
    fn garbage_is_not_an_image() {
        let result = ImageProcessor::new().validate_image(b"definitely not pixels");
        assert!(matches!(result, Err(SkinReportError::InvalidFormat(_))));
    }
}
