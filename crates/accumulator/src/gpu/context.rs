use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use wgpu::TextureFormatFeatureFlags;

use crate::config::RendererConfig;
use crate::error::{RendererError, Result};
use crate::types::{AdapterProfile, GpuPowerPreference};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<ContextId>> = const { Cell::new(None) };
}

/// Identity of a [`RenderingContext`], usable as the thread's "current context".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates an id for a caller-owned context that is not a [`RenderingContext`].
    pub fn foreign() -> Self {
        Self::next()
    }
}

/// Returns the context current on the calling thread, if any.
pub fn current_context() -> Option<ContextId> {
    CURRENT_CONTEXT.with(|slot| slot.get())
}

/// Replaces the context current on the calling thread.
pub fn make_current(context: Option<ContextId>) {
    CURRENT_CONTEXT.with(|slot| slot.set(context));
}

/// Makes a context current for its lifetime and restores the previous one on drop.
///
/// Restoration also happens while unwinding, so a panic inside a guarded body
/// leaves the thread's current context exactly as it was found.
#[must_use = "the previous context is restored as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<ContextId>,
    target: ContextId,
    // The slot is thread-local, so the guard must be dropped on the thread that made it.
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    pub fn enter(target: ContextId) -> Self {
        let previous = current_context();
        if previous != Some(target) {
            make_current(Some(target));
        }
        Self {
            previous,
            target,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.previous != Some(self.target) {
            make_current(self.previous);
        }
    }
}

/// Runs `body` with any errors wgpu raises captured instead of sent to the
/// uncaptured-error handler.
///
/// Validation errors are reported in preference to out-of-memory errors.
pub(crate) fn capture_errors<T>(
    device: &wgpu::Device,
    body: impl FnOnce() -> T,
) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = body();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, validation.or(out_of_memory))
}

/// The renderer's GPU execution context: one wgpu device plus its queue.
pub struct RenderingContext {
    id: ContextId,
    _instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    profile: AdapterProfile,
    lost: Arc<AtomicBool>,
}

impl RenderingContext {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backend.backends(),
            ..Default::default()
        });

        let power_preference = match config.power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| RendererError::AdapterUnavailable(err.to_string()))?;

        let limits = adapter.limits();
        let profile = AdapterProfile::from_wgpu(&adapter.get_info(), &limits);
        tracing::debug!(
            name = %profile.name,
            backend = ?profile.backend,
            device_type = ?profile.device_type,
            is_software = profile.is_software(),
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("accumulator device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| RendererError::DeviceCreation(err.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "uncaptured wgpu error");
        }));

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            lost_flag.store(true, Ordering::SeqCst);
            tracing::error!(?reason, %message, "GPU device lost");
        });

        let id = ContextId::next();
        tracing::debug!(context = ?id, "created rendering context");

        Ok(Self {
            id,
            _instance: instance,
            adapter,
            device,
            queue,
            profile,
            lost,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.profile
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Runs `body` with this context current on the calling thread.
    ///
    /// Whatever context was current before the call is current again when it
    /// returns, on every exit path. A lost device cannot be made current and is
    /// reported as [`RendererError::ContextLost`].
    pub fn with_context<R>(&self, body: impl FnOnce(&Self) -> R) -> Result<R> {
        if self.is_lost() {
            return Err(RendererError::ContextLost);
        }
        let _guard = ContextGuard::enter(self.id);
        Ok(body(self))
    }

    /// Whether `format` can be rendered into with blending enabled.
    pub(crate) fn supports_blended_target(&self, format: wgpu::TextureFormat) -> bool {
        let features = self.adapter.get_texture_format_features(format);
        features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            && features.flags.contains(TextureFormatFeatureFlags::BLENDABLE)
    }

    pub(crate) fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        let max = self.profile.max_texture_dimension_2d;
        if width > max || height > max {
            return Err(RendererError::DimensionsTooLarge { width, height, max });
        }
        Ok(())
    }

    /// Submits `encoder` and blocks until the GPU has finished executing it.
    pub(crate) fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        self.queue.submit(std::iter::once(encoder.finish()));
        self.wait_idle()
    }

    pub(crate) fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|err| {
                tracing::error!(error = %err, "failed waiting for GPU completion");
                RendererError::ContextLost
            })
    }
}

impl std::fmt::Debug for RenderingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderingContext")
            .field("id", &self.id)
            .field("adapter", &self.profile.name)
            .field("backend", &self.profile.backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_previous_context() {
        let outer = ContextId::foreign();
        let inner = ContextId::foreign();
        make_current(Some(outer));
        {
            let _guard = ContextGuard::enter(inner);
            assert_eq!(current_context(), Some(inner));
        }
        assert_eq!(current_context(), Some(outer));
        make_current(None);
    }

    #[test]
    fn guard_restores_empty_slot() {
        make_current(None);
        let target = ContextId::foreign();
        {
            let _guard = ContextGuard::enter(target);
            assert_eq!(current_context(), Some(target));
        }
        assert_eq!(current_context(), None);
    }

    #[test]
    fn nested_guard_on_same_context_keeps_it_current() {
        let target = ContextId::foreign();
        let outer = ContextGuard::enter(target);
        {
            let _inner = ContextGuard::enter(target);
        }
        assert_eq!(current_context(), Some(target));
        drop(outer);
        assert_eq!(current_context(), None);
    }

    #[test]
    fn guard_restores_on_early_return() {
        fn fallible(target: ContextId) -> std::result::Result<(), &'static str> {
            let _guard = ContextGuard::enter(target);
            Err::<(), _>("bail")?;
            Ok(())
        }

        let outer = ContextId::foreign();
        make_current(Some(outer));
        assert!(fallible(ContextId::foreign()).is_err());
        assert_eq!(current_context(), Some(outer));
        make_current(None);
    }

    #[test]
    fn guard_restores_during_unwind() {
        let outer = ContextId::foreign();
        make_current(Some(outer));
        let result = std::panic::catch_unwind(|| {
            let _guard = ContextGuard::enter(ContextId::foreign());
            panic!("render pass failed");
        });
        assert!(result.is_err());
        assert_eq!(current_context(), Some(outer));
        make_current(None);
    }

    #[test]
    fn current_context_is_per_thread() {
        let id = ContextId::foreign();
        make_current(Some(id));
        let other = std::thread::spawn(current_context).join().unwrap();
        assert_eq!(other, None);
        make_current(None);
    }
}
