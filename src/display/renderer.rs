//! Texture upload and full-screen quad draw

use std::borrow::Cow;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use wgpu::*;

use crate::display::context::SurfaceContext;
use crate::display::resources::{GpuResources, QUAD_SHADER};
use crate::error::{PipelineError, Result};

/// What a `render` call put on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// No GPU context yet, nothing touched
    Skipped,
    /// Target cleared to the background color only
    Cleared,
    /// Quad drawn with the current frame texture
    Drawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

enum RendererState {
    Uninitialized,
    Ready {
        gpu: SurfaceContext,
        resources: GpuResources,
    },
    /// Resource creation failed: every render is a clear
    Degraded { gpu: SurfaceContext },
}

/// Owns the GPU side of the pipeline. Every method must run on the thread
/// that drives the host's graphics context.
pub struct TextureRenderer {
    state: RendererState,
    viewport: Option<Viewport>,
    clear_color: Color,
    shader_source: Cow<'static, str>,
}

impl TextureRenderer {
    pub fn new(clear_color: [f64; 4]) -> Self {
        Self::with_shader(clear_color, QUAD_SHADER)
    }

    /// Renderer using custom WGSL with the quad's `vs_main`/`fs_main` interface
    pub fn with_shader(clear_color: [f64; 4], shader_source: impl Into<Cow<'static, str>>) -> Self {
        let [r, g, b, a] = clear_color;
        Self {
            state: RendererState::Uninitialized,
            viewport: None,
            clear_color: Color { r, g, b, a },
            shader_source: shader_source.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, RendererState::Ready { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.state, RendererState::Degraded { .. })
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Size of the frame texture, if resources are live
    pub fn texture_size(&self) -> Option<(u32, u32)> {
        match &self.state {
            RendererState::Ready { resources, .. } => Some(resources.texture_size()),
            _ => None,
        }
    }

    /// Acquire shader program, texture and quad buffers.
    ///
    /// Failure leaves the renderer degraded: `render` keeps clearing the
    /// target and never faults.
    #[instrument(skip_all)]
    pub fn on_surface_created(&mut self, gpu: SurfaceContext) {
        self.release();

        self.state = match GpuResources::create(&gpu, &self.shader_source) {
            Ok(resources) => {
                info!("Renderer ready ({:?})", gpu.format);
                RendererState::Ready { gpu, resources }
            }
            Err(e) => {
                error!("Renderer disabled, GPU resource creation failed: {}", e);
                RendererState::Degraded { gpu }
            }
        };
    }

    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        info!("Surface changed: {}x{}", width, height);
        self.viewport = Some(Viewport { width, height });
    }

    /// Surface gone: drop GPU objects, wait for the next `on_surface_created`
    pub fn on_surface_lost(&mut self) {
        info!("Surface lost");
        self.release();
    }

    /// Replace the texture image. Dimensions may differ from the last call.
    pub fn upload(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        let RendererState::Ready { gpu, resources } = &mut self.state else {
            return Err(PipelineError::RendererNotReady);
        };

        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize * 4 {
            return Err(PipelineError::BufferSize {
                width,
                height,
                len: pixels.len(),
            });
        }
        let max = gpu.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(PipelineError::Gpu(format!(
                "frame {}x{} exceeds max texture size {}",
                width, height, max
            )));
        }

        resources.write_texture(gpu, pixels, width, height)
    }

    /// Draw the textured quad into `target`, or clear it if there is
    /// nothing valid to draw with.
    pub fn render(&mut self, target: &Texture) -> RenderOutcome {
        let gpu = match &self.state {
            RendererState::Uninitialized => return RenderOutcome::Skipped,
            RendererState::Ready { gpu, .. } | RendererState::Degraded { gpu } => gpu,
        };
        if !target.usage().contains(TextureUsages::RENDER_ATTACHMENT) {
            warn!("Render target is not a render attachment, skipping");
            return RenderOutcome::Skipped;
        }

        let render_start = Instant::now();
        let resources = match &self.state {
            RendererState::Ready { resources, .. } if target.format() == gpu.format => Some(resources),
            RendererState::Ready { .. } => {
                warn!(
                    "Target format {:?} does not match surface format {:?}",
                    target.format(),
                    gpu.format
                );
                None
            }
            _ => None,
        };

        let viewport = self.viewport.map(|vp| Viewport {
            width: vp.width.min(target.width()),
            height: vp.height.min(target.height()),
        });
        let drawable = resources.filter(|_| viewport.map_or(true, |vp| vp.width > 0 && vp.height > 0));

        let view = target.create_view(&TextureViewDescriptor::default());
        let mut encoder = gpu.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(self.clear_color),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(resources) = drawable {
                if let Some(vp) = viewport {
                    render_pass.set_viewport(0.0, 0.0, vp.width as f32, vp.height as f32, 0.0, 1.0);
                }
                resources.draw(&mut render_pass);
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));

        let render_time = render_start.elapsed();
        metrics::histogram!("render_time_us").record(render_time.as_micros() as f64);

        if drawable.is_some() {
            RenderOutcome::Drawn
        } else {
            RenderOutcome::Cleared
        }
    }

    /// Release GPU objects; safe to call repeatedly
    pub fn destroy(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        match std::mem::replace(&mut self.state, RendererState::Uninitialized) {
            RendererState::Ready { resources, .. } => {
                drop(resources);
                debug!("Renderer resources released");
            }
            RendererState::Degraded { .. } | RendererState::Uninitialized => {}
        }
    }
}
