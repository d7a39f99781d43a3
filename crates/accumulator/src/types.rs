use serde::{Deserialize, Serialize};

/// Pixel layouts a [`PixelBuffer`](crate::PixelBuffer) can carry.
///
/// The renderer only ever consumes and produces [`PixelFormat::Bgra8`]; the
/// other layout exists so upstream code can describe frames it cannot hand
/// over, and so those frames are rejected instead of silently reinterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit packed blue/green/red/alpha, 8 bits per channel.
    Bgra8,
    /// 32-bit packed red/green/blue/alpha, 8 bits per channel.
    Rgba8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        4
    }

    pub(crate) fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
            PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Bgra8 => f.write_str("BGRA8"),
            PixelFormat::Rgba8 => f.write_str("RGBA8"),
        }
    }
}

/// Width, height and pixel layout shared by every frame of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDescription {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl FormatDescription {
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel_format,
        }
    }

    /// Describes an existing buffer, e.g. the first frame of a capture session.
    pub fn for_pixel_buffer(buffer: &crate::PixelBuffer) -> Self {
        Self::new(buffer.width(), buffer.height(), buffer.pixel_format())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub(crate) fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl std::fmt::Display for FormatDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.pixel_format)
    }
}

/// GPU power preference used when picking an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuPowerPreference {
    /// Prefer integrated or low-power adapters.
    Low,
    /// Prefer discrete/high-performance adapters.
    #[default]
    High,
}

/// Restricts which graphics APIs wgpu may open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    #[default]
    Auto,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl GpuBackend {
    pub(crate) fn backends(self) -> wgpu::Backends {
        match self {
            GpuBackend::Auto => wgpu::Backends::all(),
            GpuBackend::Vulkan => wgpu::Backends::VULKAN,
            GpuBackend::Metal => wgpu::Backends::METAL,
            GpuBackend::Dx12 => wgpu::Backends::DX12,
            GpuBackend::Gl => wgpu::Backends::GL,
        }
    }
}

/// Lightweight summary of the adapter backing a rendering context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension_2d: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
            || self.name.to_ascii_lowercase().contains("llvmpipe")
    }
}

/// Observable lifecycle state of a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// Nothing is allocated; `prepare` has not run or `teardown` released everything.
    Uninitialized,
    /// Buffers are allocated and the accumulator is empty.
    Prepared,
    /// At least one frame has been accumulated since the last reset.
    Accumulating,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_description_reports_empty_dimensions() {
        assert!(FormatDescription::new(0, 10, PixelFormat::Bgra8).is_empty());
        assert!(FormatDescription::new(10, 0, PixelFormat::Bgra8).is_empty());
        assert!(!FormatDescription::new(1, 1, PixelFormat::Bgra8).is_empty());
    }

    #[test]
    fn format_description_display_is_compact() {
        let description = FormatDescription::new(1920, 1080, PixelFormat::Bgra8);
        assert_eq!(description.to_string(), "1920x1080 BGRA8");
    }

    #[test]
    fn bgra_maps_to_bgra_texture() {
        assert_eq!(
            PixelFormat::Bgra8.texture_format(),
            wgpu::TextureFormat::Bgra8Unorm
        );
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
    }

    #[test]
    fn software_adapters_are_detected_by_name() {
        let profile = AdapterProfile {
            name: "llvmpipe (LLVM 17.0.6, 256 bits)".to_string(),
            backend: wgpu::Backend::Vulkan,
            device_type: wgpu::DeviceType::Other,
            max_texture_dimension_2d: 8192,
        };
        assert!(profile.is_software());
    }
}
