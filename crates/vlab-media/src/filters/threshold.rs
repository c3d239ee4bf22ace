use image::{GrayImage, Luma};

use super::ParamReader;
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::kernel::{gaussian_kernel, saturate_u8, Border, Plane};

/// Fixed binary threshold on luma.
///
/// Params: `threshold` (127). Pixels strictly above it become white.
pub fn threshold(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let t = params.number("threshold", 127.0)?;
    let gray = frame.to_gray();
    let out = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0] as f64;
        Luma([if v > t { 255 } else { 0 }])
    });
    Ok(Frame::from_gray(&out))
}

/// Gaussian-weighted local threshold.
///
/// Params: `block_size` (11, forced odd), `c` (2). A pixel is white when
/// it exceeds the weighted mean of its neighborhood minus `c`.
pub fn adaptive_threshold(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let block = params.odd_window("block_size", 11)?;
    let c = params.number("c", 2.0)?;
    let delta = c.ceil() as i32;

    let gray = frame.to_gray();
    let kernel = gaussian_kernel(block, 0.0);
    let mean = Plane::from_gray(&gray).separable(&kernel, &kernel, Border::Replicate);

    let out = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let src = gray.get_pixel(x, y)[0] as i32;
        let local = saturate_u8(mean.get(x as usize, y as usize)) as i32;
        Luma([if src - local > -delta { 255 } else { 0 }])
    });
    Ok(Frame::from_gray(&out))
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use vlab_models::FilterParams;

    use super::*;
    use crate::filters::test_support::textured_frame;

    #[test]
    fn test_threshold_is_strict() {
        let img = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => image::Rgb([127, 127, 127]),
            1 => image::Rgb([128, 128, 128]),
            _ => image::Rgb([0, 0, 0]),
        });
        let p = FilterParams::new();
        let out = threshold(&Frame::from_rgb(img), &ParamReader::new("threshold", &p)).unwrap();
        assert_eq!(out.as_bytes(), &[0, 0, 0, 255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_adaptive_uniform_frame_is_white() {
        // src - mean == 0 > -2 everywhere
        let frame = Frame::from_rgb(RgbImage::from_pixel(12, 12, image::Rgb([60, 60, 60])));
        let p = FilterParams::new();
        let out = adaptive_threshold(&frame, &ParamReader::new("adaptive_threshold", &p)).unwrap();
        assert!(out.as_bytes().iter().all(|v| *v == 255));
    }

    #[test]
    fn test_adaptive_even_block_matches_next_odd() {
        let frame = textured_frame(20, 20);
        let mut even = FilterParams::new();
        even.insert("block_size".into(), 10.0);
        let mut odd = FilterParams::new();
        odd.insert("block_size".into(), 11.0);
        let a = adaptive_threshold(&frame, &ParamReader::new("adaptive_threshold", &even)).unwrap();
        let b = adaptive_threshold(&frame, &ParamReader::new("adaptive_threshold", &odd)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_adaptive_output_is_binary() {
        let frame = textured_frame(20, 20);
        let p = FilterParams::new();
        let out = adaptive_threshold(&frame, &ParamReader::new("adaptive_threshold", &p)).unwrap();
        assert!(out.as_bytes().iter().all(|v| *v == 0 || *v == 255));
    }
}
