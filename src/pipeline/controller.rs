//! Pipeline lifecycle and the host-facing producer/consumer entry points

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use tracing::{debug, error, info, warn};

use crate::capture::convert::FrameConverter;
use crate::capture::frame::{FrameLayout, PixelBuffer, PlanarImage};
use crate::display::context::SurfaceContext;
use crate::display::renderer::{RenderOutcome, TextureRenderer};
use crate::error::{PipelineError, Result};
use crate::pipeline::filter::{FilterParameters, FrameFilter};
use crate::pipeline::stage::{FrameStage, Publish, StageSnapshot, StagedFrame};
use crate::Config;

/// Library identification string
pub fn version() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"))
}

/// State reachable from the camera thread
struct Shared {
    converter: FrameConverter,
    /// `None` once the pipeline is destroyed
    filter: ArcSwapOption<FrameFilter>,
    stage: FrameStage,
    generation: AtomicU64,
}

/// Camera-side handle. Cheap to clone and `Send`, so it can live on
/// whatever thread the host delivers frames on.
#[derive(Clone)]
pub struct FrameProducer {
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Frame-available callback: convert, filter and stage one frame.
    ///
    /// Never panics or returns an error; failures are logged and the frame
    /// is dropped. The image is not referenced after this returns.
    pub fn on_frame_available(&self, image: &PlanarImage<'_>, filter_enabled: bool) {
        self.guarded(|| self.publish(image, filter_enabled));
    }

    /// Same as [`on_frame_available`](Self::on_frame_available), taking the
    /// raw planes and geometry a camera API hands out
    pub fn on_frame_planes(&self, y: &[u8], u: &[u8], v: &[u8], layout: FrameLayout, filter_enabled: bool) {
        self.guarded(|| {
            let image = PlanarImage::from_planes(y, u, v, layout)?;
            self.publish(&image, filter_enabled)
        });
    }

    /// Panic and error boundary around one producer callback
    fn guarded(&self, callback: impl FnOnce() -> Result<Publish>) {
        match catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(_)) => {}
            Ok(Err(PipelineError::Destroyed)) => {
                debug!("Frame arrived after pipeline destroy, ignoring");
            }
            Ok(Err(e)) if e.is_precondition() => warn!("Dropping camera frame: {}", e),
            Ok(Err(e)) => error!("Frame processing failed: {}", e),
            Err(_panic) => error!("Panic in frame callback, frame dropped"),
        }
    }

    /// Convert and filter without staging
    pub fn process(&self, image: &PlanarImage<'_>, filter_enabled: bool) -> Result<PixelBuffer> {
        let filter = self.shared.filter.load_full().ok_or(PipelineError::Destroyed)?;
        let rgba = self.shared.converter.convert(image)?;
        Ok(filter.apply(rgba, filter_enabled))
    }

    fn publish(&self, image: &PlanarImage<'_>, filter_enabled: bool) -> Result<Publish> {
        let captured_at = Instant::now();
        let processed = self.process(image, filter_enabled)?;

        let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = StagedFrame::new(processed, generation, captured_at);
        Ok(self.shared.stage.publish(frame))
    }
}

/// Converter, filter, stage and renderer wired together.
///
/// The `Pipeline` itself belongs to the GPU thread; hand the camera thread a
/// [`FrameProducer`] from [`Pipeline::producer`].
pub struct Pipeline {
    shared: Arc<Shared>,
    /// `None` once destroyed
    renderer: Option<TextureRenderer>,
}

impl Pipeline {
    pub fn init(config: &Config) -> Result<Self> {
        info!("{} initializing", version());

        let filter = FrameFilter::new(config.filter)?;
        let shared = Arc::new(Shared {
            converter: FrameConverter::new(config.camera.color_range),
            filter: ArcSwapOption::from_pointee(filter),
            stage: FrameStage::new(),
            generation: AtomicU64::new(0),
        });

        Ok(Self {
            shared,
            renderer: Some(TextureRenderer::new(config.display.clear_color)),
        })
    }

    /// Same as `init`, with a caller-built renderer
    pub fn with_renderer(config: &Config, renderer: TextureRenderer) -> Result<Self> {
        let mut pipeline = Self::init(config)?;
        pipeline.renderer = Some(renderer);
        Ok(pipeline)
    }

    pub fn producer(&self) -> FrameProducer {
        FrameProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn on_frame_available(&self, image: &PlanarImage<'_>, filter_enabled: bool) {
        self.producer().on_frame_available(image, filter_enabled);
    }

    pub fn on_surface_created(&mut self, gpu: SurfaceContext) {
        match self.renderer.as_mut() {
            Some(renderer) => renderer.on_surface_created(gpu),
            None => warn!("on_surface_created after destroy, ignoring"),
        }
    }

    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        match self.renderer.as_mut() {
            Some(renderer) => renderer.on_surface_changed(width, height),
            None => warn!("on_surface_changed after destroy, ignoring"),
        }
    }

    pub fn on_surface_lost(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.on_surface_lost();
        }
    }

    /// Draw callback: upload the newest staged frame, if any, then render.
    pub fn on_draw_frame(&mut self, target: &wgpu::Texture) -> RenderOutcome {
        let Some(renderer) = self.renderer.as_mut() else {
            debug!("on_draw_frame after destroy, ignoring");
            return RenderOutcome::Skipped;
        };
        let stage = &self.shared.stage;

        let result = catch_unwind(AssertUnwindSafe(|| {
            if let Some(frame) = stage.take_latest() {
                metrics::histogram!("frame_latency_ms")
                    .record(frame.captured_at.elapsed().as_secs_f64() * 1000.0);

                match renderer.upload(&frame.pixels, frame.width, frame.height) {
                    Ok(()) => {}
                    Err(PipelineError::RendererNotReady) => {
                        debug!(generation = frame.generation, "Renderer not ready, frame skipped");
                    }
                    Err(e) => warn!(generation = frame.generation, "Texture upload failed: {}", e),
                }
            }
            renderer.render(target)
        }));

        result.unwrap_or_else(|_panic| {
            error!("Panic in draw callback");
            RenderOutcome::Skipped
        })
    }

    pub fn filter_parameters(&self) -> Option<FilterParameters> {
        self.shared.filter.load().as_ref().map(|f| f.parameters())
    }

    pub fn set_filter_parameters(&self, params: FilterParameters) -> Result<()> {
        match self.shared.filter.load().as_ref() {
            Some(filter) => filter.set_parameters(params),
            None => Err(PipelineError::Destroyed),
        }
    }

    pub fn stats(&self) -> StageSnapshot {
        self.shared.stage.stats()
    }

    pub fn renderer(&self) -> Option<&TextureRenderer> {
        self.renderer.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.renderer.is_none()
    }

    /// Release the filter, staged frame and GPU resources. Idempotent.
    ///
    /// Producer handles stay valid but every later frame is discarded.
    pub fn destroy(&mut self) {
        let Some(mut renderer) = self.renderer.take() else {
            return;
        };

        self.shared.filter.store(None);
        self.shared.stage.close();
        renderer.destroy();

        let stats = self.shared.stage.stats();
        info!(
            "Pipeline destroyed: {} published, {} rendered, {} dropped",
            stats.published, stats.taken, stats.dropped
        );
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
