use image::RgbImage;

use super::ParamReader;
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::kernel::{gaussian_kernel, saturate_u8, Border, Plane};

/// Separable Gaussian blur.
///
/// Params: `kernel_size` (5, forced odd), `sigma` (0 derives sigma from the
/// kernel size).
pub fn gaussian_blur(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let ksize = params.odd_window("kernel_size", 5)?;
    let sigma = params.number("sigma", 0.0)? as f32;
    let kernel = gaussian_kernel(ksize, sigma);

    let planes = frame
        .split_channels()
        .map(|plane| Plane::from_gray(&plane).separable(&kernel, &kernel, Border::Reflect101));
    let (width, height) = frame.dimensions();
    Ok(Frame::from_rgb(RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        image::Rgb([
            saturate_u8(planes[0].get(x, y)),
            saturate_u8(planes[1].get(x, y)),
            saturate_u8(planes[2].get(x, y)),
        ])
    })))
}

/// Per-channel median filter.
///
/// Params: `kernel_size` (5, forced odd).
pub fn median_blur(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let ksize = params.odd_window("kernel_size", 5)?;
    let radius = (ksize / 2) as u32;
    if radius == 0 {
        return Ok(frame.clone());
    }
    Ok(Frame::from_rgb(imageproc::filter::median_filter(
        frame.as_rgb(),
        radius,
        radius,
    )))
}
