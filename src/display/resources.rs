//! GPU objects behind the full-screen textured quad

use bytemuck::{Pod, Zeroable};
use tracing::debug;
use wgpu::util::DeviceExt;
use wgpu::*;

use crate::display::context::SurfaceContext;
use crate::error::{PipelineError, Result};

/// Quad shader: pass-through positions, sample the frame texture
pub const QUAD_SHADER: &str = r#"
    struct VertexInput {
        @location(0) position: vec2<f32>,
        @location(1) tex_coord: vec2<f32>,
    };

    struct VertexOutput {
        @builtin(position) clip_position: vec4<f32>,
        @location(0) tex_coord: vec2<f32>,
    };

    @vertex
    fn vs_main(in: VertexInput) -> VertexOutput {
        var out: VertexOutput;
        out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
        out.tex_coord = in.tex_coord;
        return out;
    }

    @group(0) @binding(0) var frame_texture: texture_2d<f32>;
    @group(0) @binding(1) var frame_sampler: sampler;

    @fragment
    fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
        return textureSample(frame_texture, frame_sampler, in.tex_coord);
    }
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    tex_coord: [f32; 2],
}

const VERTEX_ATTRIBUTES: [VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

// Texture row 0 is the top of the image
const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
    Vertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
    Vertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

pub const QUAD_INDEX_COUNT: u32 = QUAD_INDICES.len() as u32;

const FRAME_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Everything the quad draw needs, acquired together and released together.
///
/// `create` either returns a complete set or an error with nothing left
/// allocated. Dropping the value releases the texture and buffers once.
pub struct GpuResources {
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    sampler: Sampler,
    texture: Texture,
    bind_group: BindGroup,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
}

impl GpuResources {
    pub fn create(gpu: &SurfaceContext, shader_source: &str) -> Result<Self> {
        let device = &gpu.device;

        // Program: shader module + pipeline, checked as one unit
        device.push_error_scope(ErrorFilter::Validation);
        let (pipeline, bind_group_layout) = Self::create_program(device, gpu.format, shader_source);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::Shader(err.to_string()));
        }

        // Texture, sampler and quad geometry
        device.push_error_scope(ErrorFilter::OutOfMemory);
        device.push_error_scope(ErrorFilter::Validation);

        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Nearest,
            ..Default::default()
        });
        let texture = Self::create_texture(device, 1, 1);
        let bind_group = Self::create_bind_group(device, &bind_group_layout, &texture, &sampler);

        let vertex_buffer = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("Quad Indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: BufferUsages::INDEX,
        });

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            texture.destroy();
            vertex_buffer.destroy();
            index_buffer.destroy();
            return Err(PipelineError::Gpu(err.to_string()));
        }

        debug!("GPU resources created");
        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler,
            texture,
            bind_group,
            vertex_buffer,
            index_buffer,
        })
    }

    pub fn texture_size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    /// Re-specify the frame texture; storage follows the new dimensions
    pub fn write_texture(&mut self, gpu: &SurfaceContext, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        if (width, height) != self.texture_size() {
            let texture = Self::create_texture(&gpu.device, width, height);
            self.bind_group =
                Self::create_bind_group(&gpu.device, &self.bind_group_layout, &texture, &self.sampler);
            let old = std::mem::replace(&mut self.texture, texture);
            old.destroy();
            debug!("Frame texture resized to {}x{}", width, height);
        }

        gpu.queue.write_texture(
            ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            pixels,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }

    /// Record the quad draw: 2 triangles, 6 indices
    pub fn draw(&self, pass: &mut RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), IndexFormat::Uint16);
        pass.draw_indexed(0..QUAD_INDEX_COUNT, 0, 0..1);
    }

    fn create_program(device: &Device, format: TextureFormat, source: &str) -> (RenderPipeline, BindGroupLayout) {
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Quad Pipeline"),
            layout: Some(&pipeline_layout),
            cache: None,
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as BufferAddress,
                    step_mode: VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(ColorTargetState {
                    format,
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::ALL,
                })],
            }),
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
        });

        (pipeline, bind_group_layout)
    }

    fn create_texture(device: &Device, width: u32, height: u32) -> Texture {
        device.create_texture(&TextureDescriptor {
            label: Some("Frame Texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn create_bind_group(device: &Device, layout: &BindGroupLayout, texture: &Texture, sampler: &Sampler) -> BindGroup {
        let view = texture.create_view(&TextureViewDescriptor::default());
        device.create_bind_group(&BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(sampler),
                },
            ],
        })
    }
}

impl Drop for GpuResources {
    fn drop(&mut self) {
        self.texture.destroy();
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        debug!("GPU resources released");
    }
}
