//! In-memory video frame.

use image::{DynamicImage, GrayImage, Luma, RgbImage};

use crate::error::{MediaError, MediaResult};

/// Number of channels every frame carries once normalized.
pub const FRAME_CHANNELS: u8 = 3;

/// A decoded frame in packed RGB8 layout.
///
/// Width and height are fixed for the lifetime of a run. Sources with one
/// or four channels are normalized to three on construction so that filters
/// and detectors always see the same layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap an RGB image.
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    /// Expand a single-channel image into a three-channel frame.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let image = RgbImage::from_fn(width, height, |x, y| {
            let v = gray.get_pixel(x, y)[0];
            image::Rgb([v, v, v])
        });
        Self { image }
    }

    /// Normalize any decoded image (gray, RGBA, 16-bit) to an RGB8 frame.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageRgb8(rgb) => Self { image: rgb },
            other => Self {
                image: other.to_rgb8(),
            },
        }
    }

    /// Build a frame from a packed pixel buffer with 1, 3 or 4 channels.
    ///
    /// Alpha is dropped and gray is expanded.
    pub fn from_raw(width: u32, height: u32, channels: u8, bytes: Vec<u8>) -> MediaResult<Self> {
        let pixels = width as usize * height as usize;
        let expected = pixels * channels as usize;
        if bytes.len() != expected {
            return Err(MediaError::internal(format!(
                "Invalid frame buffer length: expected {} for {}x{}x{}, got {}",
                expected,
                width,
                height,
                channels,
                bytes.len()
            )));
        }

        let data = match channels {
            3 => bytes,
            4 => bytes
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            1 => bytes.iter().flat_map(|v| [*v, *v, *v]).collect(),
            other => {
                return Err(MediaError::internal(format!(
                    "Unsupported channel count: {}",
                    other
                )))
            }
        };

        RgbImage::from_raw(width, height, data)
            .map(Self::from_rgb)
            .ok_or_else(|| MediaError::internal("Failed to create frame buffer"))
    }

    /// A black frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Channel count; always 3.
    pub fn channels(&self) -> u8 {
        FRAME_CHANNELS
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn as_rgb_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }

    /// Packed RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Size of one frame in bytes.
    pub fn byte_len(&self) -> usize {
        self.image.as_raw().len()
    }

    /// BT.601 luma in 14-bit fixed point.
    pub fn to_gray(&self) -> GrayImage {
        let (width, height) = self.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let p = self.image.get_pixel(x, y);
            let luma = (p[0] as u32 * 4899 + p[1] as u32 * 9617 + p[2] as u32 * 1868 + 8192) >> 14;
            Luma([luma.min(255) as u8])
        })
    }

    /// Split into three single-channel planes.
    pub fn split_channels(&self) -> [GrayImage; 3] {
        let (width, height) = self.dimensions();
        let plane = |c: usize| {
            GrayImage::from_fn(width, height, |x, y| Luma([self.image.get_pixel(x, y)[c]]))
        };
        [plane(0), plane(1), plane(2)]
    }

    /// Reassemble a frame from three planes of equal size.
    pub fn merge_channels(planes: &[GrayImage; 3]) -> Self {
        let (width, height) = planes[0].dimensions();
        let image = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([
                planes[0].get_pixel(x, y)[0],
                planes[1].get_pixel(x, y)[0],
                planes[2].get_pixel(x, y)[0],
            ])
        });
        Self { image }
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self::from_rgb(image)
    }
}

impl From<DynamicImage> for Frame {
    fn from(image: DynamicImage) -> Self {
        Self::from_dynamic(image)
    }
}
