use crate::errors::PipelineError;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};
use std::fmt;

/// Largest kernel side any blur step will build.
pub const MAX_KERNEL_SIZE: i64 = 4095;

/// Which filter a blur step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurType {
    Box,
    Gaussian,
    Median,
    Bilateral,
}

impl BlurType {
    pub const ALL: [BlurType; 4] = [
        BlurType::Box,
        BlurType::Gaussian,
        BlurType::Median,
        BlurType::Bilateral,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BlurType::Box => "Box Blur",
            BlurType::Gaussian => "Gaussian Blur",
            BlurType::Median => "Median Filter",
            BlurType::Bilateral => "Bilateral Filter",
        }
    }

    /// Exact, case-sensitive label match. Any label that is not one of the four
    /// known ones selects `Box`, which is what the pipeline editor emits as its default.
    pub fn from_label(label: &str) -> Self {
        BlurType::ALL
            .into_iter()
            .find(|t| t.label() == label)
            .unwrap_or(BlurType::Box)
    }
}

impl fmt::Display for BlurType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Turns a user-facing radius into the integer radius the kernels are sized from.
/// Adds one half then truncates toward zero, so negative radii are not rounded away.
pub fn kernel_radius(radius: f64) -> i64 {
    (radius + 0.5) as i64
}

/// `scale * radius + 1`, saturating, and only if it fits `1..=MAX_KERNEL_SIZE`.
fn kernel_size(filter: &'static str, radius: i64, scale: i64) -> Result<i32, PipelineError> {
    let size = radius.saturating_mul(scale).saturating_add(1);
    if !(1..=MAX_KERNEL_SIZE).contains(&size) {
        return Err(PipelineError::InvalidKernel { filter, size });
    }
    Ok(size as i32)
}

/// Softens `input` with the chosen filter.
pub fn blur(input: &Mat, blur_type: BlurType, radius: f64) -> Result<Mat, PipelineError> {
    let radius = kernel_radius(radius);
    let mut output = Mat::default();
    match blur_type {
        BlurType::Box => {
            let k = kernel_size("box blur", radius, 2)?;
            imgproc::blur_def(input, &mut output, Size::new(k, k))?;
        }
        BlurType::Gaussian => {
            let k = kernel_size("gaussian blur", radius, 6)?;
            imgproc::gaussian_blur_def(input, &mut output, Size::new(k, k), radius as f64)?;
        }
        BlurType::Median => {
            let k = kernel_size("median filter", radius, 2)?;
            imgproc::median_blur(input, &mut output, k)?;
        }
        BlurType::Bilateral => {
            // d = -1 lets OpenCV size the window from sigma_space as 2 * round(1.5 * sigma) + 1.
            // Non-positive sigmas are replaced by 1 there.
            if radius > 0 {
                kernel_size("bilateral filter", (radius as f64 * 1.5).round() as i64, 2)?;
            }
            imgproc::bilateral_filter_def(input, &mut output, -1, radius as f64, radius as f64)?;
        }
    }
    Ok(output)
}
