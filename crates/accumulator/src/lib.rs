//! Frame accumulation renderer.
//!
//! The crate averages a stream of same-sized BGRA frames on the GPU. Frames are
//! added into a half-float off-screen target; on request the running sum is
//! scaled by `1 / frame_count` into a buffer taken from a bounded output pool.
//! The overall flow is:
//!
//! ```text
//!   producer ── PixelBuffer ──▶ Renderer::accumulate ──▶ source TextureCache
//!                                        │                      │
//!                                        ▼                      ▼
//!                               AccumulationBuffer ◀── overwrite / additive pass
//!                                        │
//!   consumer ◀── PixelBuffer ◀── Renderer::copy_rendered_pixel_buffer
//!                    ▲                   │ normalize pass (1 / frame_count)
//!                    └── OutputPool ◀────┘ (None once every buffer is held)
//! ```
//!
//! `Renderer` owns everything `prepare` allocates and drives the state machine
//! `Uninitialized → Prepared → Accumulating`. All GPU work runs with the
//! renderer's [`RenderingContext`] made current through a [`ContextGuard`], so
//! callers juggling their own contexts on the same thread get theirs back on
//! every exit path.

mod compile;
mod config;
mod error;
mod gpu;
mod renderer;
mod types;

pub use compile::{ShaderSources, FRAGMENT_SHADER_FILE, VERTEX_SHADER_FILE};
pub use config::{
    ConfigError, RendererConfig, DEFAULT_RETAINED_BUFFER_COUNT, MAX_RETAINED_BUFFER_COUNT,
};
pub use error::{ErrorKind, RendererError, Result};
pub use gpu::{
    current_context, make_current, ContextGuard, ContextId, FilterUniforms, PixelBuffer,
    RenderingContext,
};
pub use renderer::{Accumulation, Renderer};
pub use types::{
    AdapterProfile, FormatDescription, GpuBackend, GpuPowerPreference, PixelFormat,
    RendererState,
};
