use image::Rgb;

use super::edges::sobel_aperture;
use super::ParamReader;
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::kernel::{box_sum, sobel_xy, Plane};

/// Color painted over detected corners.
pub const HIGHLIGHT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Harris corner response painted onto the original frame.
///
/// Params: `block_size` (2), `ksize` (3), `k` (0.04), `threshold` (0.01).
/// Pixels whose 3x3-dilated response exceeds `threshold` times the maximum
/// response are painted [`HIGHLIGHT_COLOR`].
pub fn harris_corner(frame: &Frame, params: &ParamReader<'_>) -> MediaResult<Frame> {
    let block = params.window("block_size", 2)?.max(1);
    let ksize = sobel_aperture(params.size("ksize", 3)?);
    let k = params.number("k", 0.04)? as f32;
    let threshold = params.number("threshold", 0.01)? as f32;

    let response = harris_response(&Plane::from_gray(&frame.to_gray()), block, ksize, k);
    let dilated = response.dilate3();
    let cutoff = threshold * dilated.max();

    let mut out = frame.clone();
    let img = out.as_rgb_mut();
    for y in 0..dilated.height() {
        for x in 0..dilated.width() {
            if dilated.get(x, y) > cutoff {
                img.put_pixel(x as u32, y as u32, HIGHLIGHT_COLOR);
            }
        }
    }
    Ok(out)
}

/// `det(M) - k * trace(M)^2` of the windowed structure tensor.
fn harris_response(gray: &Plane, block: usize, ksize: usize, k: f32) -> Plane {
    // Keeps responses in a comparable range across apertures.
    let scale = 1.0 / ((1u32 << (ksize - 1)) as f32 * block as f32);
    let (dx, dy) = sobel_xy(gray, ksize);
    let (w, h) = (gray.width(), gray.height());

    let ixx = Plane::from_fn(w, h, |x, y| (dx.get(x, y) * scale).powi(2));
    let iyy = Plane::from_fn(w, h, |x, y| (dy.get(x, y) * scale).powi(2));
    let ixy = Plane::from_fn(w, h, |x, y| dx.get(x, y) * dy.get(x, y) * scale * scale);

    let a = box_sum(&ixx, block);
    let b = box_sum(&ixy, block);
    let c = box_sum(&iyy, block);

    Plane::from_fn(w, h, |x, y| {
        let (a, b, c) = (a.get(x, y), b.get(x, y), c.get(x, y));
        a * c - b * b - k * (a + c) * (a + c)
    })
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use vlab_models::FilterParams;

    use super::*;

    #[test]
    fn test_square_corners_are_highlighted() {
        let img = RgbImage::from_fn(32, 32, |x, y| {
            if (8..24).contains(&x) && (8..24).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let p = FilterParams::new();
        let out = harris_corner(&Frame::from_rgb(img), &ParamReader::new("harris_corner", &p)).unwrap();

        let near_corner = (6..11).any(|y| (6..11).any(|x| *out.as_rgb().get_pixel(x, y) == HIGHLIGHT_COLOR));
        assert!(near_corner);
        // Center of the flat square has no corner response.
        assert_ne!(*out.as_rgb().get_pixel(16, 16), HIGHLIGHT_COLOR);
    }

    #[test]
    fn test_flat_frame_unchanged() {
        let frame = Frame::from_rgb(RgbImage::from_pixel(10, 10, Rgb([30, 60, 90])));
        let p = FilterParams::new();
        let out = harris_corner(&frame, &ParamReader::new("harris_corner", &p)).unwrap();
        assert_eq!(out, frame);
    }
}
