use image::{GrayImage, Luma};

use super::ParamReader;
use crate::error::MediaResult;
use crate::frame::Frame;

#[derive(Clone, Copy)]
enum Op {
    Erode,
    Dilate,
}

/// Erosion followed by dilation with a square all-ones kernel.
///
/// Params: `kernel_size` (5).
pub fn morphology_open(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let window = Window::square(params.window("kernel_size", 5)?);
    Ok(per_channel(frame, |plane| {
        rank(&rank(plane, window, Op::Erode), window, Op::Dilate)
    }))
}

/// Dilation followed by erosion with a square all-ones kernel.
///
/// Params: `kernel_size` (5).
pub fn morphology_close(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let window = Window::square(params.window("kernel_size", 5)?);
    Ok(per_channel(frame, |plane| {
        rank(&rank(plane, window, Op::Dilate), window, Op::Erode)
    }))
}

/// Extent of a `k x k` kernel around its anchor at `k / 2`.
///
/// Even sizes reach one pixel less after the anchor than before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    before: usize,
    after: usize,
}

impl Window {
    fn square(size: usize) -> Self {
        // An empty kernel means the 3x3 default
        let size = if size == 0 { 3 } else { size };
        let before = size / 2;
        Self {
            before,
            after: size - 1 - before,
        }
    }

    fn is_identity(&self) -> bool {
        self.before == 0 && self.after == 0
    }

    fn span(&self, center: usize, len: usize) -> std::ops::RangeInclusive<usize> {
        center.saturating_sub(self.before)..=(center + self.after).min(len - 1)
    }
}

fn per_channel(frame: &Frame, f: impl Fn(&GrayImage) -> GrayImage) -> Frame {
    let [r, g, b] = frame.split_channels();
    Frame::merge_channels(&[f(&r), f(&g), f(&b)])
}

/// Min or max over the window, computed as a row pass then a column pass.
/// Samples outside the frame are ignored.
fn rank(plane: &GrayImage, window: Window, op: Op) -> GrayImage {
    if window.is_identity() {
        return plane.clone();
    }
    let (width, height) = (plane.width() as usize, plane.height() as usize);
    let pick = |a: u8, b: u8| match op {
        Op::Erode => a.min(b),
        Op::Dilate => a.max(b),
    };

    let rows = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = window
            .span(x as usize, width)
            .map(|sx| plane.get_pixel(sx as u32, y)[0])
            .reduce(pick)
            .unwrap_or(0);
        Luma([v])
    });

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = window
            .span(y as usize, height)
            .map(|sy| rows.get_pixel(x, sy as u32)[0])
            .reduce(pick)
            .unwrap_or(0);
        Luma([v])
    })
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use vlab_models::FilterParams;

    use super::*;

    fn with_size(size: f64) -> FilterParams {
        let mut p = FilterParams::new();
        p.insert("kernel_size".into(), size);
        p
    }

    #[test]
    fn test_open_removes_small_speck() {
        let mut img = RgbImage::new(11, 11);
        img.put_pixel(5, 5, image::Rgb([200, 200, 200]));
        let p = with_size(3.0);
        let out = morphology_open(&Frame::from_rgb(img), &ParamReader::new("morphology_open", &p)).unwrap();
        assert!(out.as_bytes().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_close_fills_small_hole() {
        let mut img = RgbImage::from_pixel(11, 11, image::Rgb([200, 200, 200]));
        img.put_pixel(5, 5, image::Rgb([0, 0, 0]));
        let p = with_size(3.0);
        let out = morphology_close(&Frame::from_rgb(img), &ParamReader::new("morphology_close", &p)).unwrap();
        assert_eq!(out.as_rgb().get_pixel(5, 5).0, [200, 200, 200]);
    }

    #[test]
    fn test_open_keeps_large_block() {
        let img = RgbImage::from_fn(12, 12, |x, y| {
            if (2..10).contains(&x) && (2..10).contains(&y) {
                image::Rgb([150, 10, 90])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let frame = Frame::from_rgb(img);
        let p = with_size(3.0);
        let out = morphology_open(&frame, &ParamReader::new("morphology_open", &p)).unwrap();
        assert_eq!(out, frame);
    }

    fn block_frame(size: u32, lo: u32, hi: u32) -> Frame {
        Frame::from_rgb(RgbImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        }))
    }

    fn white_pixels(frame: &Frame) -> usize {
        frame.as_rgb().pixels().filter(|p| p.0 == [255, 255, 255]).count()
    }

    #[test]
    fn test_window_extents() {
        assert_eq!(Window::square(4), Window { before: 2, after: 1 });
        assert_eq!(Window::square(5), Window { before: 2, after: 2 });
        assert_eq!(Window::square(0), Window::square(3));
        assert!(Window::square(1).is_identity());
    }

    #[test]
    fn test_even_kernel_keeps_block_of_its_size() {
        let frame = block_frame(12, 4, 8);
        let p = with_size(4.0);
        let out = morphology_open(&frame, &ParamReader::new("morphology_open", &p)).unwrap();
        assert_eq!(white_pixels(&out), 16);
    }

    #[test]
    fn test_even_kernel_is_not_next_odd() {
        let frame = block_frame(12, 4, 8);
        let p = with_size(5.0);
        let out = morphology_open(&frame, &ParamReader::new("morphology_open", &p)).unwrap();
        assert_eq!(white_pixels(&out), 0);
    }

    #[test]
    fn test_size_one_is_identity() {
        let img = RgbImage::from_fn(6, 6, |x, y| image::Rgb([(x * 40) as u8, (y * 40) as u8, 7]));
        let frame = Frame::from_rgb(img);
        let p = with_size(1.0);
        let out = morphology_close(&frame, &ParamReader::new("morphology_close", &p)).unwrap();
        assert_eq!(out, frame);
    }
}
