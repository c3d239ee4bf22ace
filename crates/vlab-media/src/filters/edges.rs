use image::{GrayImage, Luma};

use super::{force_odd, ParamReader};
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::kernel::{sobel_xy, Plane};

/// Largest supported Sobel aperture.
pub(crate) const MAX_SOBEL_APERTURE: usize = 7;

/// Clamp a requested aperture to 1, 3, 5 or 7.
pub(crate) fn sobel_aperture(requested: usize) -> usize {
    force_odd(requested).min(MAX_SOBEL_APERTURE)
}

/// Canny edge map on the luma channel.
///
/// Params: `threshold1` (100), `threshold2` (200). The smaller of the two
/// is used as the low hysteresis threshold.
pub fn canny_edge(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let t1 = params.number("threshold1", 100.0)? as f32;
    let t2 = params.number("threshold2", 200.0)? as f32;
    let (low, high) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };

    let edges = imageproc::edges::canny(&frame.to_gray(), low, high);
    Ok(Frame::from_gray(&edges))
}

/// Sobel gradient magnitude normalized to the frame maximum.
///
/// Params: `ksize` (3). A frame with no gradient at all becomes black.
pub fn sobel_edge(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let ksize = sobel_aperture(params.size("ksize", 3)?);
    let gray = Plane::from_gray(&frame.to_gray());
    let (dx, dy) = sobel_xy(&gray, ksize);

    let magnitude = Plane::from_fn(gray.width(), gray.height(), |x, y| {
        let gx = dx.get(x, y);
        let gy = dy.get(x, y);
        (gx * gx + gy * gy).sqrt()
    });
    let max = magnitude.max();

    let (width, height) = frame.dimensions();
    let out = if max > 0.0 {
        GrayImage::from_fn(width, height, |x, y| {
            let v = magnitude.get(x as usize, y as usize) / max * 255.0;
            Luma([v as u8])
        })
    } else {
        GrayImage::new(width, height)
    };
    Ok(Frame::from_gray(&out))
}
