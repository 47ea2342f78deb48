//! RGBA edge filter: grayscale, box blur, Sobel, hysteresis thresholding

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::frame::PixelBuffer;
use crate::error::{PipelineError, Result};
use crate::pipeline::edges;

/// Edge detector tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParameters {
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Box blur window, odd and positive
    pub blur_kernel_size: u32,
    /// Frames wider or taller than this are passed through unfiltered
    pub max_dimension: u32,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 150.0,
            blur_kernel_size: 3,
            max_dimension: 8192,
        }
    }
}

impl FilterParameters {
    pub fn validate(&self) -> Result<()> {
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(PipelineError::InvalidParameters(format!(
                "blur kernel size must be odd and positive, got {}",
                self.blur_kernel_size
            )));
        }
        if !self.low_threshold.is_finite() || !self.high_threshold.is_finite() {
            return Err(PipelineError::InvalidParameters(
                "thresholds must be finite".into(),
            ));
        }
        if self.low_threshold < 0.0 || self.low_threshold > self.high_threshold {
            return Err(PipelineError::InvalidParameters(format!(
                "need 0 <= low ({}) <= high ({})",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.max_dimension == 0 {
            return Err(PipelineError::InvalidParameters(
                "max dimension must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Edge filter with a pass-through mode.
///
/// Parameters live behind an `ArcSwap`, so the producer thread reads them
/// without locking while another thread reconfigures.
pub struct FrameFilter {
    params: ArcSwap<FilterParameters>,
}

impl FrameFilter {
    pub fn new(params: FilterParameters) -> Result<Self> {
        params.validate()?;
        debug!("Frame filter initialized: {:?}", params);
        Ok(Self {
            params: ArcSwap::from_pointee(params),
        })
    }

    pub fn parameters(&self) -> FilterParameters {
        **self.params.load()
    }

    /// Swap in new parameters; the next frame picks them up
    pub fn set_parameters(&self, params: FilterParameters) -> Result<()> {
        params.validate()?;
        self.params.store(Arc::new(params));
        debug!("Frame filter reconfigured: {:?}", params);
        Ok(())
    }

    /// Filter one frame, never failing.
    ///
    /// Disabled: the input is handed back untouched. Enabled: the edge map,
    /// or the untouched input if filtering failed.
    pub fn apply(&self, input: PixelBuffer, enabled: bool) -> PixelBuffer {
        if input.is_empty() {
            return PixelBuffer::empty();
        }
        if !enabled {
            return input;
        }

        match catch_unwind(AssertUnwindSafe(|| self.try_apply(&input))) {
            Ok(Ok(edges)) => edges,
            Ok(Err(e)) => {
                warn!("Edge filter failed, passing frame through: {}", e);
                metrics::counter!("filter_fallbacks").increment(1);
                input
            }
            Err(_panic) => {
                warn!("Edge filter panicked, passing frame through");
                metrics::counter!("filter_fallbacks").increment(1);
                input
            }
        }
    }

    /// Run the edge detector, reporting failures instead of falling back
    pub fn try_apply(&self, input: &PixelBuffer) -> Result<PixelBuffer> {
        let params = self.parameters();
        let (width, height) = (input.width(), input.height());

        if width > params.max_dimension || height > params.max_dimension {
            return Err(PipelineError::Filter(format!(
                "unsupported frame size {}x{} (max {})",
                width, height, params.max_dimension
            )));
        }
        if input.is_empty() {
            return Ok(PixelBuffer::empty());
        }

        let start = Instant::now();
        let (w, h) = (width as usize, height as usize);

        let gray = edges::rgba_to_gray(input.as_bytes());
        let blurred = edges::box_blur(&gray, w, h, params.blur_kernel_size as usize);
        let gradients = edges::sobel(&blurred, w, h);
        let thin = edges::non_max_suppression(&gradients, w, h);
        let edge_map = edges::hysteresis(
            &thin,
            w,
            h,
            params.low_threshold,
            params.high_threshold,
        );

        metrics::histogram!("filter_time_us").record(start.elapsed().as_micros() as f64);

        PixelBuffer::new(width, height, edges::gray_to_rgba(&edge_map))
    }
}
