use wgpu::util::DeviceExt;

use crate::compile::{
    compile_stage, ProgramStage, ShaderSources, ATTRIB_POSITION, ATTRIB_TEXTURE_COORDINATE,
};
use crate::error::{RendererError, Result};

use super::context::{capture_errors, RenderingContext};
use super::uniforms::{
    FilterUniforms, QUAD_POSITIONS, QUAD_TEXTURE_COORDINATES, QUAD_VERTEX_COUNT,
};

/// Texel format of the accumulation target; sums routinely exceed 1.0.
pub(crate) const ACCUMULATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const FRAME_UNIFORM_BINDING: u32 = 0;
const VIDEOFRAME_BINDING: u32 = 1;
const VIDEOFRAME_SAMPLER_BINDING: u32 = 2;

const ADDITIVE: wgpu::BlendComponent = wgpu::BlendComponent {
    src_factor: wgpu::BlendFactor::SrcAlpha,
    dst_factor: wgpu::BlendFactor::One,
    operation: wgpu::BlendOperation::Add,
};

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x2,
    offset: 0,
    shader_location: ATTRIB_POSITION,
}];

const TEXTURE_COORDINATE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x2,
    offset: 0,
    shader_location: ATTRIB_TEXTURE_COORDINATE,
}];

/// Which variant of the program a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassKind {
    /// First frame after a clear: replaces the accumulator contents.
    Overwrite,
    /// Every later frame: added on top of the accumulator.
    Accumulate,
    /// Accumulator scaled into an output buffer.
    Normalize,
}

impl PassKind {
    fn label(self) -> &'static str {
        match self {
            PassKind::Overwrite => "accumulate (overwrite)",
            PassKind::Accumulate => "accumulate (additive)",
            PassKind::Normalize => "normalize",
        }
    }

    pub(crate) fn blend(self) -> Option<wgpu::BlendState> {
        match self {
            PassKind::Accumulate => Some(wgpu::BlendState {
                color: ADDITIVE,
                alpha: ADDITIVE,
            }),
            PassKind::Overwrite | PassKind::Normalize => None,
        }
    }

    fn load_op(self) -> wgpu::LoadOp<wgpu::Color> {
        match self {
            PassKind::Accumulate => wgpu::LoadOp::Load,
            PassKind::Overwrite | PassKind::Normalize => {
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
            }
        }
    }
}

/// The accumulate/normalize program and the geometry it draws.
pub(crate) struct ShaderProgram {
    bind_layout: wgpu::BindGroupLayout,
    overwrite: wgpu::RenderPipeline,
    accumulate: wgpu::RenderPipeline,
    normalize: wgpu::RenderPipeline,
    positions: wgpu::Buffer,
    texture_coordinates: wgpu::Buffer,
}

impl ShaderProgram {
    pub fn new(
        context: &RenderingContext,
        sources: &ShaderSources,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let device = context.device();
        let vertex_module = compile_stage(device, &sources.vertex, ProgramStage::Vertex)?;
        let fragment_module = compile_stage(device, &sources.fragment, ProgramStage::Fragment)?;

        let (linked, error) = capture_errors(device, || {
            let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("filter bind layout"),
                entries: &bind_layout_entries(),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("filter pipeline layout"),
                bind_group_layouts: &[&bind_layout],
                push_constant_ranges: &[],
            });
            let build = |kind: PassKind, format: wgpu::TextureFormat| {
                build_pipeline(
                    device,
                    &layout,
                    &vertex_module,
                    &fragment_module,
                    kind,
                    format,
                )
            };
            let overwrite = build(PassKind::Overwrite, ACCUMULATION_FORMAT);
            let accumulate = build(PassKind::Accumulate, ACCUMULATION_FORMAT);
            let normalize = build(PassKind::Normalize, output_format);
            (bind_layout, overwrite, accumulate, normalize)
        });
        if let Some(error) = error {
            return Err(RendererError::ProgramLink(error.to_string()));
        }
        let (bind_layout, overwrite, accumulate, normalize) = linked;

        let ((positions, texture_coordinates), error) = capture_errors(device, || {
            let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad positions"),
                contents: bytemuck::cast_slice(&QUAD_POSITIONS),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let texture_coordinates = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad texture coordinates"),
                contents: bytemuck::cast_slice(&QUAD_TEXTURE_COORDINATES),
                usage: wgpu::BufferUsages::VERTEX,
            });
            (positions, texture_coordinates)
        });
        if let Some(error) = error {
            return Err(RendererError::Allocation {
                what: "quad vertices",
                message: error.to_string(),
            });
        }

        tracing::debug!(output_format = ?output_format, "linked filter program");
        Ok(Self {
            bind_layout,
            overwrite,
            accumulate,
            normalize,
            positions,
            texture_coordinates,
        })
    }

    fn pipeline(&self, kind: PassKind) -> &wgpu::RenderPipeline {
        match kind {
            PassKind::Overwrite => &self.overwrite,
            PassKind::Accumulate => &self.accumulate,
            PassKind::Normalize => &self.normalize,
        }
    }

    /// Records one full-viewport draw of `source` into `target`.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        kind: PassKind,
        source: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        target: &wgpu::TextureView,
        uniforms: FilterUniforms,
    ) {
        // Each pass gets its own uniform buffer so batched passes never share a weight.
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("filter uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kind.label()),
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: FRAME_UNIFORM_BINDING,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: VIDEOFRAME_BINDING,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: VIDEOFRAME_SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(kind.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: kind.load_op(),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(self.pipeline(kind));
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.set_vertex_buffer(ATTRIB_POSITION, self.positions.slice(..));
        render_pass.set_vertex_buffer(ATTRIB_TEXTURE_COORDINATE, self.texture_coordinates.slice(..));
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }
}

fn bind_layout_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: FRAME_UNIFORM_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: VIDEOFRAME_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: VIDEOFRAME_SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex_module: &wgpu::ShaderModule,
    fragment_module: &wgpu::ShaderModule,
    kind: PassKind,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let vertex_buffers = [
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &TEXTURE_COORDINATE_ATTRIBUTES,
        },
    ];
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(kind.label()),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some("main"),
            buffers: &vertex_buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: kind.blend(),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
