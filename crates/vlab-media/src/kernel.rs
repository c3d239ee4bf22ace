//! Floating-point planes and separable convolution.
//!
//! The filter library needs a few primitives that `imageproc` either does
//! not expose with the required kernel sizes or border rules: Gaussian
//! kernels of arbitrary odd size, Sobel derivative kernels for apertures
//! 1 to 7, and unnormalized box sums with an off-center anchor.

use image::{GrayImage, Luma};

/// How samples outside the plane are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
}

impl Border {
    /// Map a possibly out-of-range coordinate into `0..len`.
    pub fn index(self, i: isize, len: usize) -> usize {
        let len = len as isize;
        if len == 1 {
            return 0;
        }
        match self {
            Border::Replicate => i.clamp(0, len - 1) as usize,
            Border::Reflect101 => {
                let period = 2 * (len - 1);
                let mut m = i.rem_euclid(period);
                if m >= len {
                    m = period - m;
                }
                m as usize
            }
        }
    }
}

/// A single-channel plane of `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|v| *v as f32).collect(),
        }
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Largest sample, or 0 for an empty plane.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().reduce(f32::max).unwrap_or(0.0)
    }

    /// Round and saturate into an 8-bit image.
    pub fn to_gray_saturating(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([saturate_u8(self.get(x as usize, y as usize))])
        })
    }

    /// Convolve rows with `kx` then columns with `ky`.
    ///
    /// Kernels are centered at `len / 2`, which for even lengths puts one
    /// more tap before the anchor than after it.
    pub fn separable(&self, kx: &[f32], ky: &[f32], border: Border) -> Plane {
        let rows = self.convolve_rows(kx, border);
        rows.convolve_cols(ky, border)
    }

    fn convolve_rows(&self, kernel: &[f32], border: Border) -> Plane {
        let anchor = (kernel.len() / 2) as isize;
        let mut out = Plane::new(self.width, self.height);
        for y in 0..self.height {
            let row = &self.data[y * self.width..(y + 1) * self.width];
            for x in 0..self.width {
                let mut acc = 0.0f32;
                for (i, k) in kernel.iter().enumerate() {
                    let sx = border.index(x as isize + i as isize - anchor, self.width);
                    acc += k * row[sx];
                }
                out.data[y * self.width + x] = acc;
            }
        }
        out
    }

    fn convolve_cols(&self, kernel: &[f32], border: Border) -> Plane {
        let anchor = (kernel.len() / 2) as isize;
        let mut out = Plane::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0f32;
                for (i, k) in kernel.iter().enumerate() {
                    let sy = border.index(y as isize + i as isize - anchor, self.height);
                    acc += k * self.data[sy * self.width + x];
                }
                out.data[y * self.width + x] = acc;
            }
        }
        out
    }

    /// Maximum over a 3x3 neighborhood.
    pub fn dilate3(&self) -> Plane {
        let mut out = Plane::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut best = f32::NEG_INFINITY;
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        let sx = Border::Replicate.index(x as isize + dx, self.width);
                        let sy = Border::Replicate.index(y as isize + dy, self.height);
                        best = best.max(self.get(sx, sy));
                    }
                }
                out.set(x, y, best);
            }
        }
        out
    }
}

#[inline]
pub fn saturate_u8(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// Sigma used when the caller passes `sigma <= 0`.
pub fn default_sigma(ksize: usize) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian kernel of odd length `ksize`.
///
/// Small apertures with a derived sigma use the fixed binomial tables that
/// OpenCV-compatible blurs produce.
pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        match ksize {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
                ]
            }
            _ => {}
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        default_sigma(ksize)
    };
    let center = (ksize / 2) as f32;
    let mut kernel: Vec<f32> = (0..ksize)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Smoothing and first-derivative kernels for a Sobel aperture.
///
/// Returns `(derivative, smoothing)`. Aperture 1 means no smoothing.
pub fn sobel_kernels(ksize: usize) -> (Vec<f32>, Vec<f32>) {
    if ksize <= 1 {
        return (vec![-1.0, 0.0, 1.0], vec![1.0]);
    }
    let smoothing = binomial_row(ksize - 1);
    let derivative = convolve_1d(&[-1.0, 0.0, 1.0], &binomial_row(ksize - 3));
    (derivative, smoothing)
}

/// Binomial coefficients of the given order, e.g. order 2 is `[1, 2, 1]`.
fn binomial_row(order: usize) -> Vec<f32> {
    let mut row = vec![1.0f32];
    for _ in 0..order {
        row = convolve_1d(&row, &[1.0, 1.0]);
    }
    row
}

fn convolve_1d(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Horizontal and vertical Sobel derivatives of a plane.
pub fn sobel_xy(plane: &Plane, ksize: usize) -> (Plane, Plane) {
    let (deriv, smooth) = sobel_kernels(ksize);
    let dx = plane.separable(&deriv, &smooth, Border::Reflect101);
    let dy = plane.separable(&smooth, &deriv, Border::Reflect101);
    (dx, dy)
}

/// Unnormalized box sum over a `size x size` window.
pub fn box_sum(plane: &Plane, size: usize) -> Plane {
    let ones = vec![1.0f32; size.max(1)];
    plane.separable(&ones, &ones, Border::Reflect101)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect101_index() {
        let b = Border::Reflect101;
        assert_eq!(b.index(-1, 5), 1);
        assert_eq!(b.index(-2, 5), 2);
        assert_eq!(b.index(5, 5), 3);
        assert_eq!(b.index(6, 5), 2);
        assert_eq!(b.index(2, 5), 2);
        assert_eq!(b.index(-3, 1), 0);
    }

    #[test]
    fn test_replicate_index() {
        assert_eq!(Border::Replicate.index(-4, 5), 0);
        assert_eq!(Border::Replicate.index(9, 5), 4);
    }

    #[test]
    fn test_gaussian_kernel_sums_to_one() {
        for k in [1, 3, 5, 7, 9, 15] {
            let kernel = gaussian_kernel(k, 0.0);
            assert_eq!(kernel.len(), k);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "k={} sum={}", k, sum);
        }
        let kernel = gaussian_kernel(5, 1.5);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);
    }

    #[test]
    fn test_default_sigma() {
        assert!((default_sigma(5) - 1.1).abs() < 1e-5);
        assert!((default_sigma(3) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_sobel_kernels() {
        assert_eq!(sobel_kernels(3), (vec![-1.0, 0.0, 1.0], vec![1.0, 2.0, 1.0]));
        assert_eq!(sobel_kernels(5).0, vec![-1.0, -2.0, 0.0, 2.0, 1.0]);
        assert_eq!(sobel_kernels(7).0, vec![-1.0, -4.0, -5.0, 0.0, 5.0, 4.0, 1.0]);
        assert_eq!(sobel_kernels(1), (vec![-1.0, 0.0, 1.0], vec![1.0]));
    }

    #[test]
    fn test_sobel_on_vertical_edge() {
        // Left half 0, right half 100
        let plane = Plane::from_fn(6, 4, |x, _| if x >= 3 { 100.0 } else { 0.0 });
        let (dx, dy) = sobel_xy(&plane, 3);
        assert!(dx.get(2, 1) > 0.0);
        assert_eq!(dx.get(0, 1), 0.0);
        assert!(dy.values().iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn test_box_sum_constant() {
        let plane = Plane::from_fn(4, 4, |_, _| 1.0);
        let summed = box_sum(&plane, 3);
        assert!(summed.values().iter().all(|v| (*v - 9.0).abs() < 1e-5));
    }

    #[test]
    fn test_dilate3_spreads_peak() {
        let mut plane = Plane::new(5, 5);
        plane.set(2, 2, 7.0);
        let dilated = plane.dilate3();
        assert_eq!(dilated.get(1, 1), 7.0);
        assert_eq!(dilated.get(3, 3), 7.0);
        assert_eq!(dilated.get(0, 0), 0.0);
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate_u8(-3.0), 0);
        assert_eq!(saturate_u8(300.0), 255);
        assert_eq!(saturate_u8(12.5), 13);
        assert_eq!(saturate_u8(f32::NAN), 0);
    }
}
