//! Depth pre-pass, shadow, SSAO and SSAO blur passes for a deferred Vulkan
//! renderer built on `ash`.
//!
//! Passes borrow everything long-lived (device, command pool, G-buffer
//! images, uniform buffers) through a [`Runtime`] and own only the objects
//! they create. All native calls go through [`vulkan::GpuDevice`], so the
//! same passes run against [`vulkan::AshDevice`] or the headless
//! [`vulkan::RecordingDevice`].

pub mod error;
pub mod renderer;
pub mod vulkan;

pub use error::{AshError, Result};
pub use renderer::{
    AmbientOcclusionBlurPass, AmbientOcclusionPass, DepthPrePass, Frame, FrameSlot, GeometryPass,
    ImageBlock, MaterialKind, RenderPass, Runtime, ShaderPaths, ShadowPass, ShadowSettings,
};

pub mod prelude {
    pub use crate::error::{AshError, Result};
    pub use crate::renderer::{
        AmbientOcclusionBlurPass, AmbientOcclusionPass, DepthPrePass, Drawable, Entity, Frame,
        FrameSlot, GeometryPass, ImageBlock, IndexedMesh, MaterialKind, MeshEntity, PerFrame,
        PerFrameData, PerObjectData, RenderPass, Runtime, ShaderPaths, ShadowPass, ShadowSettings,
        Vertex, FRAMES_IN_FLIGHT,
    };
    pub use crate::vulkan::{AshDevice, GpuDevice, RecordingDevice, ShaderRegistry, SpirvShaderRegistry};
}
