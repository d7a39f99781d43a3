use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{RendererError, Result};
use crate::types::{FormatDescription, PixelFormat};

use super::context::{capture_errors, ContextId, RenderingContext};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Usage every pixel buffer allocation carries: sampleable, renderable, and
/// copyable in both directions so producers and consumers can move pixels.
pub(crate) const PIXEL_BUFFER_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

pub(crate) struct PixelStorage {
    pub id: u64,
    pub context: ContextId,
    pub description: FormatDescription,
    pub texture: wgpu::Texture,
}

impl PixelStorage {
    pub(crate) fn allocate(
        context: &RenderingContext,
        description: FormatDescription,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Result<Arc<Self>> {
        if description.is_empty() {
            return Err(RendererError::InvalidFormat(description));
        }
        context.check_dimensions(description.width, description.height)?;

        let (texture, error) = capture_errors(context.device(), || {
            context.device().create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: description.extent(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: description.pixel_format.texture_format(),
                usage,
                view_formats: &[],
            })
        });
        if let Some(error) = error {
            return Err(RendererError::Allocation {
                what: "pixel buffer",
                message: error.to_string(),
            });
        }

        Ok(Arc::new(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            context: context.id(),
            description,
            texture,
        }))
    }
}

/// Reference-counted handle to a GPU-resident image.
///
/// Cloning is cheap and shares the allocation. A buffer vended by the output
/// pool counts against the pool's retained-buffer ceiling for as long as any
/// clone of it is alive, so consumers should drop it once they are done.
#[derive(Clone)]
pub struct PixelBuffer {
    pub(crate) storage: Arc<PixelStorage>,
}

impl PixelBuffer {
    pub(crate) fn from_storage(storage: Arc<PixelStorage>) -> Self {
        Self { storage }
    }

    /// Allocates an uninitialised buffer on `context`.
    pub fn new(context: &RenderingContext, description: FormatDescription) -> Result<Self> {
        PixelStorage::allocate(context, description, PIXEL_BUFFER_USAGE, "pixel buffer")
            .map(Self::from_storage)
    }

    /// Allocates a buffer and fills it with tightly packed pixel rows.
    pub fn from_pixels(
        context: &RenderingContext,
        description: FormatDescription,
        pixels: &[u8],
    ) -> Result<Self> {
        let buffer = Self::new(context, description)?;
        buffer.write_pixels(context, pixels)?;
        Ok(buffer)
    }

    /// Convenience for `from_pixels` with a BGRA8 layout.
    pub fn from_bgra(
        context: &RenderingContext,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        Self::from_pixels(
            context,
            FormatDescription::new(width, height, PixelFormat::Bgra8),
            pixels,
        )
    }

    pub fn id(&self) -> u64 {
        self.storage.id
    }

    pub fn width(&self) -> u32 {
        self.storage.description.width
    }

    pub fn height(&self) -> u32 {
        self.storage.description.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.storage.description.pixel_format
    }

    pub fn format_description(&self) -> FormatDescription {
        self.storage.description
    }

    /// Id of the context the allocation lives on.
    pub fn context_id(&self) -> ContextId {
        self.storage.context
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.storage.texture
    }

    /// Whether both handles refer to the same allocation.
    pub fn same_allocation(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    fn byte_len(&self) -> usize {
        let description = self.storage.description;
        description.width as usize
            * description.height as usize
            * description.pixel_format.bytes_per_pixel() as usize
    }

    fn check_context(&self, context: &RenderingContext) -> Result<()> {
        if self.storage.context != context.id() {
            return Err(RendererError::Allocation {
                what: "pixel transfer",
                message: "buffer belongs to a different rendering context".to_string(),
            });
        }
        Ok(())
    }

    /// Replaces the contents with tightly packed rows in the buffer's own layout.
    pub fn write_pixels(&self, context: &RenderingContext, pixels: &[u8]) -> Result<()> {
        self.check_context(context)?;
        let expected = self.byte_len();
        if pixels.len() != expected {
            return Err(RendererError::DataLength {
                expected,
                actual: pixels.len(),
                description: self.storage.description,
            });
        }
        let description = self.storage.description;
        context.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(description.width * description.pixel_format.bytes_per_pixel()),
                rows_per_image: Some(description.height),
            },
            description.extent(),
        );
        Ok(())
    }

    /// Copies the contents back to the CPU as tightly packed rows.
    ///
    /// Blocks until the GPU has finished every submitted command touching the
    /// buffer.
    pub fn read_pixels(&self, context: &RenderingContext) -> Result<Vec<u8>> {
        self.check_context(context)?;
        let description = self.storage.description;
        let row_bytes = (description.width * description.pixel_format.bytes_per_pixel()) as usize;
        let padded_row_bytes = padded_bytes_per_row(row_bytes as u32) as usize;

        let readback = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixel buffer readback"),
            size: (padded_row_bytes * description.height as usize) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pixel buffer readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes as u32),
                    rows_per_image: Some(description.height),
                },
            },
            description.extent(),
        );
        context.submit_and_wait(encoder)?;

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        context.wait_idle()?;
        receiver
            .recv()
            .map_err(|err| RendererError::Readback(err.to_string()))?
            .map_err(|err| RendererError::Readback(err.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity(row_bytes * description.height as usize);
        for row in mapped.chunks(padded_row_bytes) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }
        drop(mapped);
        readback.unmap();
        Ok(pixels)
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("id", &self.storage.id)
            .field("format", &self.storage.description)
            .field("context", &self.storage.context)
            .finish()
    }
}

impl RenderingContext {
    /// Allocates a pixel buffer that the renderer on this context can bind.
    pub fn create_pixel_buffer(&self, description: FormatDescription) -> Result<PixelBuffer> {
        PixelBuffer::new(self, description)
    }
}

/// Rounds a row up to wgpu's copy alignment.
pub(crate) fn padded_bytes_per_row(row_bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    row_bytes.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(257), 512);
        assert_eq!(padded_bytes_per_row(1920 * 4), 7680);
    }

    #[test]
    fn pixel_buffer_usage_allows_sampling_and_rendering() {
        assert!(PIXEL_BUFFER_USAGE.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(PIXEL_BUFFER_USAGE.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(PIXEL_BUFFER_USAGE.contains(wgpu::TextureUsages::COPY_SRC));
    }
}
