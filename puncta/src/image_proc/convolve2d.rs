//! 2D convolution, Gaussian kernels and the unsharp mask filter

use ndarray::{Array2, ArrayView2, Zip};
use thiserror::Error;

/// Border handling for `convolve2d`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvolveMode {
    /// Output has the input shape; outside pixels are zero
    Same,
    /// Output has the input shape; outside pixels repeat the nearest edge pixel
    Replicate,
}

#[derive(Debug, Clone, Copy)]
pub struct ConvolveOptions {
    pub mode: ConvolveMode,
}

impl Default for ConvolveOptions {
    fn default() -> Self {
        Self {
            mode: ConvolveMode::Same,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unsharp mask weight must be in [0, 1), got {0}")]
    InvalidWeight(f64),
    #[error("Gaussian radius must be positive, got {0}")]
    InvalidRadius(f64),
}

/// Normalized square Gaussian kernel of odd `size`
pub fn gaussian_kernel(size: usize, sigma: f64) -> Array2<f64> {
    let size = if size % 2 == 0 { size + 1 } else { size };
    let half = (size / 2) as f64;
    let mut kernel = Array2::from_shape_fn((size, size), |(i, j)| {
        let dy = i as f64 - half;
        let dx = j as f64 - half;
        (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
    });
    let total = kernel.sum();
    kernel.mapv_inplace(|v| v / total);
    kernel
}

/// Kernel size covering ±3σ
pub fn kernel_size_for_sigma(sigma: f64) -> usize {
    2 * (3.0 * sigma).ceil() as usize + 1
}

/// Convolve an image with a kernel, parallel over output pixels
pub fn convolve2d(
    image: &ArrayView2<f64>,
    kernel: &ArrayView2<f64>,
    options: Option<ConvolveOptions>,
) -> Array2<f64> {
    let options = options.unwrap_or_default();
    let (rows, cols) = image.dim();
    let (k_rows, k_cols) = kernel.dim();
    let k_half_r = (k_rows / 2) as isize;
    let k_half_c = (k_cols / 2) as isize;

    let mut output = Array2::<f64>::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return output;
    }

    Zip::indexed(&mut output).par_for_each(|(i, j), out| {
        let mut acc = 0.0;
        for ki in 0..k_rows {
            for kj in 0..k_cols {
                let r = i as isize + ki as isize - k_half_r;
                let c = j as isize + kj as isize - k_half_c;
                let sample = match options.mode {
                    ConvolveMode::Same => {
                        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                            continue;
                        }
                        image[[r as usize, c as usize]]
                    }
                    ConvolveMode::Replicate => {
                        let r = r.clamp(0, rows as isize - 1) as usize;
                        let c = c.clamp(0, cols as isize - 1) as usize;
                        image[[r, c]]
                    }
                };
                acc += sample * kernel[[ki, kj]];
            }
        }
        *out = acc;
    });

    output
}

/// Gaussian blur with edge replication
pub fn gaussian_blur(image: &ArrayView2<f64>, sigma: f64) -> Result<Array2<f64>, FilterError> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return Err(FilterError::InvalidRadius(sigma));
    }
    let kernel = gaussian_kernel(kernel_size_for_sigma(sigma), sigma);
    Ok(convolve2d(
        image,
        &kernel.view(),
        Some(ConvolveOptions {
            mode: ConvolveMode::Replicate,
        }),
    ))
}

/// Unsharp mask: subtract a weighted Gaussian blur and renormalize.
///
/// `out = (in - weight * blur(in, radius)) / (1 - weight)`, rounded and clamped
/// to `[0, max_value]` so the result stays on the integer sample grid.
pub fn unsharp_mask(
    image: &ArrayView2<f64>,
    radius: f64,
    weight: f64,
    max_value: f64,
) -> Result<Array2<f64>, FilterError> {
    if !(0.0..1.0).contains(&weight) {
        return Err(FilterError::InvalidWeight(weight));
    }
    let blurred = gaussian_blur(image, radius)?;

    let mut sharpened = Array2::<f64>::zeros(image.dim());
    Zip::from(&mut sharpened)
        .and(image)
        .and(&blurred)
        .for_each(|out, &orig, &blur| {
            let value = (orig - weight * blur) / (1.0 - weight);
            *out = value.round().clamp(0.0, max_value);
        });
    Ok(sharpened)
}
