use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::context::{capture_errors, RenderingContext};
use super::pixel_buffer::{PixelBuffer, PixelStorage};

/// How a bound texture will be used by the pass that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindTarget {
    /// Sampled through the shader's `videoframe` input.
    Sampled,
    /// Attached as the pass's color target.
    RenderTarget,
}

impl BindTarget {
    fn required_usage(self) -> wgpu::TextureUsages {
        match self {
            BindTarget::Sampled => wgpu::TextureUsages::TEXTURE_BINDING,
            BindTarget::RenderTarget => wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }
}

struct CacheEntry {
    // Not a hold: pools count outstanding buffers by strong references only.
    storage: Weak<PixelStorage>,
    view: wgpu::TextureView,
}

/// Wraps pixel buffers as texture views without copying their pixels.
///
/// Views are keyed by allocation, so a small rotating set of buffers (a camera
/// pool, the renderer's output pool) only pays for view creation once per
/// allocation. Entries never keep a buffer outstanding: once every handle to
/// an allocation is gone its entry is dropped on the next miss or
/// [`flush`](Self::flush).
pub(crate) struct TextureCache {
    label: &'static str,
    target: BindTarget,
    entries: HashMap<u64, CacheEntry>,
}

impl TextureCache {
    pub fn new(label: &'static str, target: BindTarget) -> Self {
        Self {
            label,
            target,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns a view of `buffer`, or `None` when it cannot be bound here.
    ///
    /// Failure is soft: the caller abandons the current pass only.
    pub fn bind(
        &mut self,
        context: &RenderingContext,
        buffer: &PixelBuffer,
    ) -> Option<wgpu::TextureView> {
        let storage = &buffer.storage;
        if let Some(entry) = self.entries.get(&storage.id) {
            return Some(entry.view.clone());
        }
        self.purge_released();

        if storage.context != context.id() {
            tracing::warn!(
                cache = self.label,
                buffer = storage.id,
                "pixel buffer belongs to another rendering context; cannot bind"
            );
            return None;
        }
        let usage = storage.texture.usage();
        if !usage.contains(self.target.required_usage()) {
            tracing::warn!(
                cache = self.label,
                buffer = storage.id,
                ?usage,
                target = ?self.target,
                "pixel buffer usage does not permit this binding"
            );
            return None;
        }

        let (view, error) = capture_errors(context.device(), || {
            storage.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(self.label),
                ..Default::default()
            })
        });
        if let Some(error) = error {
            tracing::warn!(cache = self.label, buffer = storage.id, %error, "failed to create texture view");
            return None;
        }

        tracing::trace!(cache = self.label, buffer = storage.id, "cached texture view");
        self.entries.insert(
            storage.id,
            CacheEntry {
                storage: Arc::downgrade(storage),
                view: view.clone(),
            },
        );
        Some(view)
    }

    fn purge_released(&mut self) {
        self.entries.retain(|_, entry| entry.storage.strong_count() > 0);
    }

    /// Drops every cached view.
    pub fn flush(&mut self) {
        if !self.entries.is_empty() {
            tracing::trace!(cache = self.label, released = self.entries.len(), "flushed texture cache");
        }
        self.entries.clear();
    }
}

/// Shared sampler for every binding: linear filtering, edge clamping, and no
/// mipmapping since sources and targets are always sampled 1:1.
pub(crate) fn create_frame_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("frame sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_require_matching_usage() {
        assert_eq!(
            BindTarget::Sampled.required_usage(),
            wgpu::TextureUsages::TEXTURE_BINDING
        );
        assert_eq!(
            BindTarget::RenderTarget.required_usage(),
            wgpu::TextureUsages::RENDER_ATTACHMENT
        );
    }

    #[test]
    fn new_cache_is_empty() {
        let mut cache = TextureCache::new("source frames", BindTarget::Sampled);
        assert_eq!(cache.len(), 0);
        cache.flush();
        assert_eq!(cache.len(), 0);
    }
}
