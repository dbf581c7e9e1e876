use std::path::PathBuf;

use super::resources::MAX_SHADOW_MAPS;
use crate::error::{AshError, Result};

/// Where the pre-compiled SPIR-V for each pass lives.
#[derive(Clone, Debug)]
pub struct ShaderPaths {
    pub directory: PathBuf,
    pub depth_prepass_vertex: String,
    pub shadow_vertex: String,
    pub shadow_geometry: String,
    pub fullscreen_vertex: String,
    pub ssao_fragment: String,
    pub ssao_blur_fragment: String,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./shaders"),
            depth_prepass_vertex: "depth_prepass.vert.spv".into(),
            shadow_vertex: "vert.spv".into(),
            shadow_geometry: "shadows.geom.spv".into(),
            fullscreen_vertex: "fullscreen.vert.spv".into(),
            ssao_fragment: "ssao.frag.spv".into(),
            ssao_blur_fragment: "ssao_blur.frag.spv".into(),
        }
    }
}

impl ShaderPaths {
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, file: &str) -> PathBuf {
        self.directory.join(file)
    }
}

/// Shadow-map array settings.
#[derive(Clone, Debug)]
pub struct ShadowSettings {
    /// Width and height of every layer, in texels.
    pub resolution: u32,
    /// Layers in the shadow-map array; also the framebuffer layer count.
    pub num_shadow_maps: u32,
    pub depth_bias_constant: f32,
    pub depth_bias_slope: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            resolution: 2048,
            num_shadow_maps: 4,
            depth_bias_constant: 1.25,
            depth_bias_slope: 1.75,
        }
    }
}

impl ShadowSettings {
    pub fn new(resolution: u32, num_shadow_maps: u32) -> Self {
        Self {
            resolution,
            num_shadow_maps,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            return Err(AshError::InvalidConfig(
                "shadow map resolution must be non-zero".into(),
            ));
        }
        if self.num_shadow_maps == 0 {
            return Err(AshError::InvalidConfig(
                "at least one shadow map is required".into(),
            ));
        }
        if self.num_shadow_maps as usize > MAX_SHADOW_MAPS {
            return Err(AshError::InvalidConfig(format!(
                "{} shadow maps requested, at most {MAX_SHADOW_MAPS} light matrices available",
                self.num_shadow_maps
            )));
        }
        Ok(())
    }
}
