use crate::compile::ShaderSources;
use crate::error::Result;
use crate::types::{FormatDescription, PixelFormat};

use super::accumulation::AccumulationBuffer;
use super::context::RenderingContext;
use super::pipeline::ShaderProgram;
use super::pixel_buffer::PixelBuffer;
use super::pool::{OutputPool, PoolAcquire};
use super::texture_cache::{create_frame_sampler, BindTarget, TextureCache};

/// Pixel layout of every buffer the output pool vends.
pub(crate) const OUTPUT_PIXEL_FORMAT: PixelFormat = PixelFormat::Bgra8;

/// Everything `prepare` allocates for one negotiated format.
///
/// Dropping the value releases all of it; a failed [`allocate`](Self::allocate)
/// releases whatever it had built so far the same way.
pub(crate) struct PreparedResources {
    negotiated: FormatDescription,
    output_description: FormatDescription,
    source_cache: TextureCache,
    output_cache: TextureCache,
    sampler: wgpu::Sampler,
    program: ShaderProgram,
    accumulation: AccumulationBuffer,
    pool: OutputPool,
}

impl PreparedResources {
    pub fn allocate(
        context: &RenderingContext,
        sources: &ShaderSources,
        negotiated: FormatDescription,
        retained_buffer_count: usize,
    ) -> Result<Self> {
        let (width, height) = negotiated.dimensions();
        let accumulation = AccumulationBuffer::new(context, width, height)?;
        let program = ShaderProgram::new(context, sources, OUTPUT_PIXEL_FORMAT.texture_format())?;

        let mut pool = OutputPool::new(
            FormatDescription::new(width, height, OUTPUT_PIXEL_FORMAT),
            retained_buffer_count,
        )?;
        let output_description = pool.prewarm(context)?.format_description();

        tracing::debug!(
            input = %negotiated,
            output = %output_description,
            retained_buffer_count,
            "prepared renderer resources"
        );
        Ok(Self {
            negotiated,
            output_description,
            source_cache: TextureCache::new("source frames", BindTarget::Sampled),
            output_cache: TextureCache::new("output frames", BindTarget::RenderTarget),
            sampler: create_frame_sampler(context.device()),
            program,
            accumulation,
            pool,
        })
    }

    pub fn negotiated(&self) -> FormatDescription {
        self.negotiated
    }

    pub fn output_description(&self) -> FormatDescription {
        self.output_description
    }

    pub fn frame_count(&self) -> u64 {
        self.accumulation.frame_count()
    }

    /// Adds `frame` to the accumulator.
    ///
    /// Returns `None` when the frame could not be bound; nothing changes then.
    pub fn accumulate(
        &mut self,
        context: &RenderingContext,
        frame: &PixelBuffer,
    ) -> Result<Option<u64>> {
        let Some(source) = self.source_cache.bind(context, frame) else {
            tracing::warn!(buffer = frame.id(), "skipping frame that could not be bound");
            return Ok(None);
        };
        let frame_count =
            self.accumulation
                .accumulate(context, &self.program, &source, &self.sampler)?;
        tracing::trace!(buffer = frame.id(), frame_count, "accumulated frame");
        Ok(Some(frame_count))
    }

    /// Renders the current average into a pool buffer.
    ///
    /// Returns `None` when the pool stays exhausted after flushing the output
    /// cache, or when the vended buffer cannot be attached.
    pub fn render_output(&mut self, context: &RenderingContext) -> Result<Option<PixelBuffer>> {
        let Some(output) = self.acquire_output(context)? else {
            return Ok(None);
        };
        let Some(target) = self.output_cache.bind(context, &output) else {
            tracing::warn!(buffer = output.id(), "dropping output frame that could not be attached");
            return Ok(None);
        };
        self.accumulation
            .normalize_into(context, &self.program, &self.sampler, &target)?;
        tracing::trace!(
            buffer = output.id(),
            frame_count = self.accumulation.frame_count(),
            cached_targets = self.output_cache.len(),
            "rendered normalized frame"
        );
        Ok(Some(output))
    }

    fn acquire_output(&mut self, context: &RenderingContext) -> Result<Option<PixelBuffer>> {
        if let PoolAcquire::Vended(buffer) = self.pool.acquire(context)? {
            return Ok(Some(buffer));
        }
        self.output_cache.flush();
        match self.pool.acquire(context)? {
            PoolAcquire::Vended(buffer) => Ok(Some(buffer)),
            PoolAcquire::WouldExceed => {
                tracing::debug!(
                    threshold = self.pool.threshold(),
                    allocated = self.pool.allocated(),
                    outstanding = self.pool.outstanding(),
                    "output pool exhausted; dropping frame"
                );
                Ok(None)
            }
        }
    }

    pub fn reset(&mut self, context: &RenderingContext) -> Result<()> {
        self.accumulation.clear(context)
    }
}
