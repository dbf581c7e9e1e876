pub mod config;
pub mod entity;
pub mod frame;
pub mod material;
pub mod passes;
pub mod resources;
pub mod runtime;

pub use config::{ShaderPaths, ShadowSettings};
pub use entity::{Drawable, Entity, EntityLists, IndexedMesh, MeshEntity};
pub use frame::{Frame, FrameSlot, PerFrame, FRAMES_IN_FLIGHT};
pub use material::{MaterialKind, PerMaterial};
pub use passes::{
    AmbientOcclusionBlurPass, AmbientOcclusionPass, DepthPrePass, GeometryPass, RenderPass,
    ShadowPass,
};
pub use resources::{ImageBlock, PerFrameData, PerObjectData, Vertex, MAX_OBJECTS, MAX_SHADOW_MAPS};
pub use runtime::Runtime;
