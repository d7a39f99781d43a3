use crate::types::{FormatDescription, PixelFormat};

/// Broad classification of a [`RendererError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller used the renderer incorrectly (wrong state, mismatched frame).
    Precondition,
    /// The GPU environment could not provide a resource the renderer needs.
    Environment,
}

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("renderer is not prepared; call prepare() first")]
    NotPrepared,
    #[error("accumulation buffer is empty; accumulate at least one frame first")]
    NothingAccumulated,
    #[error("frame is {actual_width}x{actual_height}, renderer was prepared for {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("frame pixel format is {actual}, renderer was prepared for {expected}")]
    FormatMismatch {
        expected: PixelFormat,
        actual: PixelFormat,
    },
    #[error("unsupported input format {0}; only BGRA8 frames can be accumulated")]
    UnsupportedFormat(FormatDescription),
    #[error("invalid format description {0}")]
    InvalidFormat(FormatDescription),
    #[error("{width}x{height} exceeds the GPU max texture dimension of {max}")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },
    #[error("buffer of {actual} bytes does not match {expected} bytes required for {description}")]
    DataLength {
        expected: usize,
        actual: usize,
        description: FormatDescription,
    },
    #[error("failed to find a suitable GPU adapter: {0}")]
    AdapterUnavailable(String),
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(String),
    #[error("rendering context was lost and cannot be made current")]
    ContextLost,
    #[error("{format:?} cannot be used as a blendable render target on this adapter")]
    TargetUnsupported { format: wgpu::TextureFormat },
    #[error("failed to allocate {what}: {message}")]
    Allocation { what: &'static str, message: String },
    #[error("failed to compile {stage} shader: {message}")]
    ShaderCompile { stage: &'static str, message: String },
    #[error("failed to link shader program: {0}")]
    ProgramLink(String),
    #[error("output buffer pool needs a retained buffer count of at least 1")]
    EmptyPool,
    #[error("retained buffer count {requested} exceeds the output pool limit of {max}")]
    PoolTooLarge { requested: usize, max: usize },
    #[error("failed to read back pixel buffer: {0}")]
    Readback(String),
    #[error("failed to read shader override {path}: {source}")]
    ShaderSource {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RendererError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RendererError::NotPrepared
            | RendererError::NothingAccumulated
            | RendererError::DimensionMismatch { .. }
            | RendererError::FormatMismatch { .. }
            | RendererError::DataLength { .. } => ErrorKind::Precondition,
            _ => ErrorKind::Environment,
        }
    }

    pub fn is_precondition(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }
}

pub type Result<T, E = RendererError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_preconditions() {
        assert!(RendererError::NotPrepared.is_precondition());
        assert!(RendererError::NothingAccumulated.is_precondition());
        assert!(RendererError::FormatMismatch {
            expected: PixelFormat::Bgra8,
            actual: PixelFormat::Rgba8,
        }
        .is_precondition());
    }

    #[test]
    fn allocation_failures_are_environmental() {
        let err = RendererError::Allocation {
            what: "accumulation texture",
            message: "out of memory".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Environment);
        assert_eq!(RendererError::ContextLost.kind(), ErrorKind::Environment);
    }

    #[test]
    fn mismatch_message_names_both_sizes() {
        let err = RendererError::DimensionMismatch {
            expected_width: 640,
            expected_height: 480,
            actual_width: 320,
            actual_height: 240,
        };
        let message = err.to_string();
        assert!(message.contains("320x240"));
        assert!(message.contains("640x480"));
    }
}
