//! GPU side of the accumulator.
//!
//! - `context` owns the wgpu device and queue, the thread-local "current
//!   context" slot, and the guard that restores it.
//! - `pixel_buffer` is the shareable image handle passed between producers,
//!   the renderer, and consumers.
//! - `texture_cache` wraps pixel buffers as views without copying, keyed by
//!   allocation.
//! - `pipeline` links the GLSL program into the overwrite, additive, and
//!   normalize pipelines; `uniforms` mirrors its uniform block and quad.
//! - `accumulation` owns the float target and the frame counter.
//! - `pool` bounds how many output buffers may be outstanding at once.
//! - `state` bundles everything `prepare` allocates and runs the per-frame
//!   algorithms on top of it.

mod accumulation;
mod context;
mod pipeline;
mod pixel_buffer;
mod pool;
mod state;
mod texture_cache;
mod uniforms;

pub(crate) use context::capture_errors;
pub use context::{current_context, make_current, ContextGuard, ContextId, RenderingContext};
pub use pixel_buffer::PixelBuffer;
pub(crate) use state::PreparedResources;
pub use uniforms::FilterUniforms;
