use crate::error::{RendererError, Result};

use super::context::{capture_errors, RenderingContext};
use super::pipeline::{PassKind, ShaderProgram, ACCUMULATION_FORMAT};
use super::uniforms::FilterUniforms;

/// Off-screen float target holding the running sum of accumulated frames.
pub(crate) struct AccumulationBuffer {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    frame_count: u64,
}

impl AccumulationBuffer {
    /// Allocates a cleared target of the given size.
    pub fn new(context: &RenderingContext, width: u32, height: u32) -> Result<Self> {
        if !context.supports_blended_target(ACCUMULATION_FORMAT) {
            return Err(RendererError::TargetUnsupported {
                format: ACCUMULATION_FORMAT,
            });
        }
        context.check_dimensions(width, height)?;

        let (texture, error) = capture_errors(context.device(), || {
            context.device().create_texture(&wgpu::TextureDescriptor {
                label: Some("accumulation buffer"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: ACCUMULATION_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        });
        if let Some(error) = error {
            return Err(RendererError::Allocation {
                what: "accumulation buffer",
                message: error.to_string(),
            });
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut buffer = Self {
            texture,
            view,
            frame_count: 0,
        };
        buffer.clear(context)?;
        Ok(buffer)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Zeroes every channel and restarts the frame count.
    pub fn clear(&mut self, context: &RenderingContext) -> Result<()> {
        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("accumulation clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("accumulation clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        context.submit_and_wait(encoder)?;
        self.frame_count = 0;
        Ok(())
    }

    /// Adds one source frame and returns the new frame count.
    ///
    /// The first frame after a clear overwrites the target; later frames are
    /// blended on top at full weight. Returns once the GPU has finished.
    pub fn accumulate(
        &mut self,
        context: &RenderingContext,
        program: &ShaderProgram,
        source: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> Result<u64> {
        let kind = if self.frame_count == 0 {
            PassKind::Overwrite
        } else {
            PassKind::Accumulate
        };
        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("accumulate frame"),
            });
        program.encode_pass(
            context.device(),
            &mut encoder,
            kind,
            source,
            sampler,
            &self.view,
            FilterUniforms::passthrough(),
        );
        context.submit_and_wait(encoder)?;
        self.frame_count += 1;
        Ok(self.frame_count)
    }

    /// Draws the average of the accumulated frames into `target`.
    ///
    /// The accumulator is only read, so repeated calls produce the same image.
    pub fn normalize_into(
        &self,
        context: &RenderingContext,
        program: &ShaderProgram,
        sampler: &wgpu::Sampler,
        target: &wgpu::TextureView,
    ) -> Result<()> {
        if self.frame_count == 0 {
            return Err(RendererError::NothingAccumulated);
        }
        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("normalize accumulation"),
            });
        program.encode_pass(
            context.device(),
            &mut encoder,
            PassKind::Normalize,
            &self.view,
            sampler,
            target,
            FilterUniforms::new(normalization_weight(self.frame_count)),
        );
        context.submit_and_wait(encoder)
    }
}

impl Drop for AccumulationBuffer {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Multiplier that turns a sum of `frame_count` frames into their mean.
pub(crate) fn normalization_weight(frame_count: u64) -> f32 {
    (1.0 / frame_count as f64) as f32
}
