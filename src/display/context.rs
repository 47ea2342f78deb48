//! Host graphics context: the device, queue and surface format the renderer draws with

use std::sync::Arc;

use tracing::{info, instrument};
use wgpu::*;

use crate::capture::frame::PixelBuffer;
use crate::error::{PipelineError, Result};

/// GPU context handed to the renderer when the surface comes up.
///
/// On a device the host builds this from its own window surface; the demo
/// runner and the tests use [`SurfaceContext::headless`].
#[derive(Clone)]
pub struct SurfaceContext {
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    /// Format of the textures `render` will be asked to draw into
    pub format: TextureFormat,
}

impl SurfaceContext {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, format: TextureFormat) -> Self {
        Self {
            device,
            queue,
            format,
        }
    }

    /// Context with no window, rendering into offscreen targets
    #[instrument]
    pub async fn headless(format: TextureFormat) -> Result<Self> {
        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| PipelineError::Gpu("No suitable GPU adapter found".into()))?;

        info!("GPU: {} ({:?})", adapter.get_info().name, adapter.get_info().backend);

        // Mobile-class limits: same budget a GLES 3 surface would give us
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("edgecam device"),
                    required_features: Features::empty(),
                    required_limits: Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| PipelineError::Gpu(e.to_string()))?;

        Ok(Self::new(Arc::new(device), Arc::new(queue), format))
    }

    /// Offscreen render target in the context's format
    pub fn create_target(&self, width: u32, height: u32) -> Texture {
        self.device.create_texture(&TextureDescriptor {
            label: Some("Offscreen Target"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: self.format,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Copy an RGBA8 target back to the CPU
    pub fn read_target(&self, target: &Texture) -> Result<PixelBuffer> {
        if !matches!(
            target.format(),
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb
        ) {
            return Err(PipelineError::Gpu(format!(
                "readback needs an RGBA8 target, got {:?}",
                target.format()
            )));
        }

        let (width, height) = (target.width(), target.height());
        let row_bytes = width * 4;
        let padded_row = row_bytes.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded_row as u64 * height as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            ImageCopyTexture {
                texture: target,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            ImageCopyBuffer {
                buffer: &buffer,
                layout: ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(Maintain::Wait);

        rx.recv()
            .map_err(|e| PipelineError::Gpu(e.to_string()))?
            .map_err(|e| PipelineError::Gpu(e.to_string()))?;

        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        buffer.unmap();

        PixelBuffer::new(width, height, pixels)
    }
}
