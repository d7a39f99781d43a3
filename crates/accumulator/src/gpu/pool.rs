use std::sync::Arc;

use crate::config::MAX_RETAINED_BUFFER_COUNT;
use crate::error::{RendererError, Result};
use crate::types::FormatDescription;

use super::context::RenderingContext;
use super::pixel_buffer::{PixelBuffer, PixelStorage, PIXEL_BUFFER_USAGE};

/// Outcome of asking the pool for a buffer.
#[derive(Debug)]
pub(crate) enum PoolAcquire {
    Vended(PixelBuffer),
    /// Handing out another buffer would exceed the allocation threshold.
    WouldExceed,
}

/// Bounded set of pool-owned output buffers.
///
/// A buffer is outstanding while any [`PixelBuffer`] handle to it is alive
/// outside the pool. Texture caches only keep weak references, so a consumer
/// dropping its handle is enough to release a buffer. Released buffers are
/// recycled; new ones are allocated only while fewer than `threshold` exist.
pub(crate) struct OutputPool {
    description: FormatDescription,
    threshold: usize,
    storages: Vec<Arc<PixelStorage>>,
}

impl OutputPool {
    pub fn new(description: FormatDescription, threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(RendererError::EmptyPool);
        }
        if threshold > MAX_RETAINED_BUFFER_COUNT {
            return Err(RendererError::PoolTooLarge {
                requested: threshold,
                max: MAX_RETAINED_BUFFER_COUNT,
            });
        }
        if description.is_empty() {
            return Err(RendererError::InvalidFormat(description));
        }
        Ok(Self {
            description,
            threshold,
            storages: Vec::new(),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn allocated(&self) -> usize {
        self.storages.len()
    }

    pub fn outstanding(&self) -> usize {
        self.storages
            .iter()
            .filter(|storage| is_outstanding(storage))
            .count()
    }

    pub fn acquire(&mut self, context: &RenderingContext) -> Result<PoolAcquire> {
        if let Some(storage) = self.storages.iter().find(|storage| !is_outstanding(storage)) {
            return Ok(PoolAcquire::Vended(PixelBuffer::from_storage(Arc::clone(
                storage,
            ))));
        }
        if self.storages.len() >= self.threshold {
            tracing::trace!(
                threshold = self.threshold,
                "output pool would exceed its allocation threshold"
            );
            return Ok(PoolAcquire::WouldExceed);
        }

        let storage = PixelStorage::allocate(
            context,
            self.description,
            PIXEL_BUFFER_USAGE,
            "output pool buffer",
        )?;
        self.storages.push(Arc::clone(&storage));
        tracing::trace!(
            buffer = storage.id,
            allocated = self.storages.len(),
            "allocated output pool buffer"
        );
        Ok(PoolAcquire::Vended(PixelBuffer::from_storage(storage)))
    }

    /// Drains the pool to its threshold once so allocation failures surface now.
    ///
    /// Returns one of the buffers so callers can inspect what the pool vends;
    /// everything is released back to the pool when the caller drops it.
    pub fn prewarm(&mut self, context: &RenderingContext) -> Result<PixelBuffer> {
        let mut held = Vec::new();
        while let PoolAcquire::Vended(buffer) = self.acquire(context)? {
            held.push(buffer);
        }
        tracing::debug!(
            allocated = held.len(),
            threshold = self.threshold,
            "pre-warmed output pool"
        );
        held.into_iter().next().ok_or(RendererError::EmptyPool)
    }
}

fn is_outstanding(storage: &Arc<PixelStorage>) -> bool {
    Arc::strong_count(storage) > 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    #[test]
    fn zero_threshold_is_rejected() {
        let description = FormatDescription::new(4, 4, PixelFormat::Bgra8);
        assert!(matches!(
            OutputPool::new(description, 0),
            Err(RendererError::EmptyPool)
        ));
    }

    #[test]
    fn oversized_threshold_is_rejected() {
        let description = FormatDescription::new(8, 8, PixelFormat::Bgra8);
        assert!(matches!(
            OutputPool::new(description, usize::MAX),
            Err(RendererError::PoolTooLarge {
                requested: usize::MAX,
                max: MAX_RETAINED_BUFFER_COUNT,
            })
        ));
        let pool = OutputPool::new(description, MAX_RETAINED_BUFFER_COUNT).unwrap();
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn empty_dimensions_are_rejected() {
        let description = FormatDescription::new(0, 4, PixelFormat::Bgra8);
        assert!(matches!(
            OutputPool::new(description, 2),
            Err(RendererError::InvalidFormat(_))
        ));
    }

    #[test]
    fn new_pool_allocates_lazily() {
        let description = FormatDescription::new(8, 8, PixelFormat::Bgra8);
        let pool = OutputPool::new(description, 3).unwrap();
        assert_eq!(pool.threshold(), 3);
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.outstanding(), 0);
    }
}
