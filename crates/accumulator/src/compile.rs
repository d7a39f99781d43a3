use std::borrow::Cow;
use std::path::Path;

use wgpu::naga::ShaderStage;

use crate::error::{RendererError, Result};
use crate::gpu::capture_errors;

/// File name looked up in the shader override directory for the vertex stage.
pub const VERTEX_SHADER_FILE: &str = "accumulate.vert";
/// File name looked up in the shader override directory for the fragment stage.
pub const FRAGMENT_SHADER_FILE: &str = "accumulate.frag";

/// Vertex attribute slot of `position`.
pub(crate) const ATTRIB_POSITION: u32 = 0;
/// Vertex attribute slot of `texturecoordinate`.
pub(crate) const ATTRIB_TEXTURE_COORDINATE: u32 = 1;

/// GLSL sources for the accumulate/normalize program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: Cow::Borrowed(VERTEX_SHADER_GLSL),
            fragment: Cow::Borrowed(FRAGMENT_SHADER_GLSL),
        }
    }
}

impl ShaderSources {
    /// Resolves the program sources, preferring files in `shader_dir`.
    ///
    /// Each stage falls back to the embedded source independently when its file
    /// is absent; a file that exists but cannot be read is an error.
    pub fn load(shader_dir: Option<&Path>) -> Result<Self> {
        let mut sources = Self::default();
        let Some(dir) = shader_dir else {
            return Ok(sources);
        };
        if let Some(vertex) = read_override(dir, VERTEX_SHADER_FILE)? {
            sources.vertex = Cow::Owned(vertex);
        }
        if let Some(fragment) = read_override(dir, FRAGMENT_SHADER_FILE)? {
            sources.fragment = Cow::Owned(fragment);
        }
        Ok(sources)
    }
}

fn read_override(dir: &Path, name: &str) -> Result<Option<String>> {
    let path = dir.join(name);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no shader override; using embedded source");
        return Ok(None);
    }
    let source = std::fs::read_to_string(&path)
        .map_err(|source| RendererError::ShaderSource { path: path.clone(), source })?;
    tracing::debug!(path = %path.display(), "loaded shader override");
    Ok(Some(source))
}

/// The two stages of the filter program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgramStage {
    Vertex,
    Fragment,
}

impl ProgramStage {
    pub(crate) fn label(self) -> &'static str {
        match self {
            ProgramStage::Vertex => "vertex",
            ProgramStage::Fragment => "fragment",
        }
    }

    fn naga_stage(self) -> ShaderStage {
        match self {
            ProgramStage::Vertex => ShaderStage::Vertex,
            ProgramStage::Fragment => ShaderStage::Fragment,
        }
    }
}

/// Compiles one GLSL stage, turning validation failures into an error.
pub(crate) fn compile_stage(
    device: &wgpu::Device,
    source: &str,
    stage: ProgramStage,
) -> Result<wgpu::ShaderModule> {
    let label = stage.label();
    let (module, error) = capture_errors(device, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source.to_owned()),
                stage: stage.naga_stage(),
                defines: &[],
            },
        })
    });
    match error {
        Some(error) => Err(RendererError::ShaderCompile {
            stage: label,
            message: error.to_string(),
        }),
        None => Ok(module),
    }
}

/// Pass-through vertex stage for the full-viewport quad.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 position;
layout(location = 1) in vec2 texturecoordinate;

layout(location = 0) out vec2 v_texcoord;

void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    v_texcoord = texturecoordinate;
}
";

/// Samples `videoframe` and scales every channel by `multiplier`.
///
/// The uniform block layout must match [`FilterUniforms`](crate::gpu::FilterUniforms).
const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_texcoord;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform FilterParams {
    float multiplier;
} params;

layout(set = 0, binding = 1) uniform texture2D videoframe;
layout(set = 0, binding = 2) uniform sampler videoframe_sampler;

void main() {
    out_color = texture(sampler2D(videoframe, videoframe_sampler), v_texcoord) * params.multiplier;
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_sources_keep_attribute_and_uniform_names() {
        let sources = ShaderSources::default();
        assert!(sources.vertex.contains("layout(location = 0) in vec2 position"));
        assert!(sources
            .vertex
            .contains("layout(location = 1) in vec2 texturecoordinate"));
        assert!(sources.fragment.contains("float multiplier"));
        assert!(sources.fragment.contains("texture2D videoframe"));
    }

    #[test]
    fn missing_override_directory_entries_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FRAGMENT_SHADER_FILE), "// custom").unwrap();

        let sources = ShaderSources::load(Some(dir.path())).unwrap();
        assert_eq!(sources.vertex, ShaderSources::default().vertex);
        assert_eq!(sources.fragment, "// custom");
    }

    #[test]
    fn no_directory_means_embedded_sources() {
        assert_eq!(ShaderSources::load(None).unwrap(), ShaderSources::default());
    }

    #[test]
    fn program_stages_map_to_their_own_labels() {
        assert_eq!(ProgramStage::Vertex.label(), "vertex");
        assert_eq!(ProgramStage::Fragment.label(), "fragment");
        assert_eq!(ProgramStage::Vertex.naga_stage(), ShaderStage::Vertex);
        assert_eq!(ProgramStage::Fragment.naga_stage(), ShaderStage::Fragment);
    }
}
