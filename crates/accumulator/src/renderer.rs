use std::sync::Arc;

use crate::compile::ShaderSources;
use crate::config::{RendererConfig, MAX_RETAINED_BUFFER_COUNT};
use crate::error::{RendererError, Result};
use crate::gpu::{PixelBuffer, PreparedResources, RenderingContext};
use crate::types::{FormatDescription, PixelFormat, RendererState};

/// Outcome of [`Renderer::accumulate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Accumulation {
    /// The frame was added; carries the frame count including it.
    Added(u64),
    /// The frame could not be bound as a texture and contributed nothing.
    Skipped,
}

impl Accumulation {
    pub fn was_added(self) -> bool {
        matches!(self, Accumulation::Added(_))
    }
}

/// Accumulates same-sized frames and renders their average on demand.
///
/// Every method that touches the GPU runs with the renderer's context current
/// and leaves the caller's current context as it found it. The renderer is not
/// reentrant; callers must serialize access to one instance.
pub struct Renderer {
    context: Arc<RenderingContext>,
    config: RendererConfig,
    resources: Option<PreparedResources>,
}

impl Renderer {
    /// Creates a renderer with its own rendering context.
    pub fn new(config: RendererConfig) -> Result<Self> {
        let context = RenderingContext::new(&config)?;
        Ok(Self::with_context(Arc::new(context), config))
    }

    /// Creates a renderer on an existing context, e.g. one shared with the
    /// producer of the source frames.
    pub fn with_context(context: Arc<RenderingContext>, config: RendererConfig) -> Self {
        Self {
            context,
            config,
            resources: None,
        }
    }

    pub fn context(&self) -> &Arc<RenderingContext> {
        &self.context
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The only pixel format `accumulate` accepts.
    pub fn input_pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgra8
    }

    /// Output frames are always separate pool buffers, never the input frame.
    pub fn operates_in_place(&self) -> bool {
        false
    }

    pub fn state(&self) -> RendererState {
        match &self.resources {
            None => RendererState::Uninitialized,
            Some(resources) if resources.frame_count() > 0 => RendererState::Accumulating,
            Some(_) => RendererState::Prepared,
        }
    }

    /// Frames accumulated since the last prepare or reset.
    pub fn frame_count(&self) -> u64 {
        self.resources
            .as_ref()
            .map_or(0, PreparedResources::frame_count)
    }

    /// Format of the buffers [`copy_rendered_pixel_buffer`](Self::copy_rendered_pixel_buffer)
    /// returns, or `None` before `prepare`.
    pub fn output_format_description(&self) -> Option<FormatDescription> {
        self.resources
            .as_ref()
            .map(PreparedResources::output_description)
    }

    /// Format every accumulated frame must match, or `None` before `prepare`.
    pub fn negotiated_format(&self) -> Option<FormatDescription> {
        self.resources.as_ref().map(PreparedResources::negotiated)
    }

    /// Allocates everything needed to accumulate frames of `input`.
    ///
    /// Releases whatever an earlier call allocated first, so it can be called
    /// again whenever the input format changes. `retained_buffer_count` caps
    /// how many output buffers may be held by consumers at once. On failure
    /// the renderer is left torn down.
    pub fn prepare(
        &mut self,
        input: &FormatDescription,
        retained_buffer_count: usize,
    ) -> Result<()> {
        self.teardown();

        if input.is_empty() {
            return Err(RendererError::InvalidFormat(*input));
        }
        if input.pixel_format != self.input_pixel_format() {
            return Err(RendererError::UnsupportedFormat(*input));
        }
        if retained_buffer_count == 0 {
            return Err(RendererError::EmptyPool);
        }
        if retained_buffer_count > MAX_RETAINED_BUFFER_COUNT {
            return Err(RendererError::PoolTooLarge {
                requested: retained_buffer_count,
                max: MAX_RETAINED_BUFFER_COUNT,
            });
        }

        let sources = ShaderSources::load(self.config.shader_dir.as_deref())?;
        let resources = self.context.with_context(|context| {
            PreparedResources::allocate(context, &sources, *input, retained_buffer_count)
        })?;
        match resources {
            Ok(resources) => {
                self.resources = Some(resources);
                tracing::debug!(format = %input, retained_buffer_count, "renderer prepared");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(format = %input, error = %err, "renderer preparation failed");
                Err(err)
            }
        }
    }

    /// [`prepare`](Self::prepare) with the retained-buffer count from the config.
    pub fn prepare_with_default_retention(&mut self, input: &FormatDescription) -> Result<()> {
        let retained_buffer_count = self.config.retained_buffer_count;
        self.prepare(input, retained_buffer_count)
    }

    /// Adds `frame` to the running sum.
    ///
    /// Blocks until the GPU has finished. A frame that cannot be bound is
    /// skipped without changing the frame count.
    pub fn accumulate(&mut self, frame: &PixelBuffer) -> Result<Accumulation> {
        let resources = self.resources.as_mut().ok_or(RendererError::NotPrepared)?;
        check_frame(&resources.negotiated(), frame)?;

        let added = self
            .context
            .with_context(|context| resources.accumulate(context, frame))??;
        Ok(match added {
            Some(frame_count) => Accumulation::Added(frame_count),
            None => Accumulation::Skipped,
        })
    }

    /// Renders the average of the accumulated frames into a pool buffer.
    ///
    /// Returns `Ok(None)` when the frame should be dropped: every pool buffer
    /// is still held downstream, or the output buffer could not be attached.
    /// The accumulator is not modified.
    pub fn copy_rendered_pixel_buffer(&mut self) -> Result<Option<PixelBuffer>> {
        let resources = self.resources.as_mut().ok_or(RendererError::NotPrepared)?;
        if resources.frame_count() == 0 {
            return Err(RendererError::NothingAccumulated);
        }
        self.context
            .with_context(|context| resources.render_output(context))?
    }

    /// Clears the accumulator while keeping every allocation.
    pub fn reset(&mut self) -> Result<()> {
        let resources = self.resources.as_mut().ok_or(RendererError::NotPrepared)?;
        self.context
            .with_context(|context| resources.reset(context))??;
        tracing::debug!("accumulator reset");
        Ok(())
    }

    /// Releases every GPU resource `prepare` allocated. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        let Some(resources) = self.resources.take() else {
            return;
        };
        // A lost context cannot be made current; the resources are dropped regardless.
        if self.context.with_context(|_| drop(resources)).is_err() {
            tracing::warn!("tore down renderer on a lost context");
            return;
        }
        tracing::debug!("renderer torn down");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("context", &self.context)
            .field("state", &self.state())
            .field("frame_count", &self.frame_count())
            .finish()
    }
}

fn check_frame(negotiated: &FormatDescription, frame: &PixelBuffer) -> Result<()> {
    let actual = frame.format_description();
    if actual.dimensions() != negotiated.dimensions() {
        return Err(RendererError::DimensionMismatch {
            expected_width: negotiated.width,
            expected_height: negotiated.height,
            actual_width: actual.width,
            actual_height: actual.height,
        });
    }
    if actual.pixel_format != negotiated.pixel_format {
        return Err(RendererError::FormatMismatch {
            expected: negotiated.pixel_format,
            actual: actual.pixel_format,
        });
    }
    Ok(())
}
