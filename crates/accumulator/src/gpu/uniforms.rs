use bytemuck::{Pod, Zeroable};

/// `FilterParams` uniform block of the fragment stage.
///
/// std140 rounds a block holding a single float up to 16 bytes.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterUniforms {
    pub multiplier: f32,
    _padding: [f32; 3],
}

unsafe impl Zeroable for FilterUniforms {}
unsafe impl Pod for FilterUniforms {}

impl FilterUniforms {
    pub fn new(multiplier: f32) -> Self {
        Self {
            multiplier,
            _padding: [0.0; 3],
        }
    }

    /// Weight that copies the source through unchanged.
    pub fn passthrough() -> Self {
        Self::new(1.0)
    }
}

/// Full-viewport quad, drawn as a triangle strip.
pub(crate) const QUAD_POSITIONS: [[f32; 2]; 4] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [1.0, 1.0],
];

/// Texture coordinates matching [`QUAD_POSITIONS`].
///
/// Texture rows start at the top, so clip-space bottom maps to `v = 1`.
/// Sampling and writing through the same mapping keeps every pass upright.
pub(crate) const QUAD_TEXTURE_COORDINATES: [[f32; 2]; 4] = [
    [0.0, 1.0],
    [1.0, 1.0],
    [0.0, 0.0],
    [1.0, 0.0],
];

pub(crate) const QUAD_VERTEX_COUNT: u32 = QUAD_POSITIONS.len() as u32;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn filter_uniforms_follow_std140_layout() {
        let uniforms = FilterUniforms::new(0.25);
        let base = &uniforms as *const _ as usize;

        assert_eq!(align_of::<FilterUniforms>(), 16);
        assert_eq!(size_of::<FilterUniforms>(), 16);
        assert_eq!((&uniforms.multiplier as *const _ as usize) - base, 0);
        assert_eq!(&bytemuck::bytes_of(&uniforms)[..4], &0.25f32.to_ne_bytes());
    }

    #[test]
    fn quad_covers_viewport_upright() {
        for (position, uv) in QUAD_POSITIONS.iter().zip(QUAD_TEXTURE_COORDINATES.iter()) {
            assert_eq!(uv[0], (position[0] + 1.0) * 0.5);
            assert_eq!(uv[1], (1.0 - position[1]) * 0.5);
        }
        assert_eq!(QUAD_VERTEX_COUNT, 4);
    }

    #[test]
    fn passthrough_weight_is_one() {
        assert_eq!(FilterUniforms::passthrough().multiplier, 1.0);
    }
}
