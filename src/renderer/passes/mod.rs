//! Render passes of the deferred pipeline.
//!
//! Every pass is inert after construction: native objects are created by
//! [`RenderPass::initialize`] and destroyed, newest first, by
//! [`RenderPass::shutdown`]. Recording a frame returns the slot's command
//! buffer for the caller to submit.

mod common;
mod fullscreen;
mod geometry;

pub mod ambient_occlusion;
pub mod ambient_occlusion_blur;
pub mod depth_prepass;
pub mod shadow_pass;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use ash::vk;

use super::entity::Entity;
use super::frame::Frame;
use crate::error::Result;

pub use ambient_occlusion::AmbientOcclusionPass;
pub use ambient_occlusion_blur::AmbientOcclusionBlurPass;
pub use depth_prepass::DepthPrePass;
pub use shadow_pass::ShadowPass;

/// A pass that owns its native objects and records one command buffer per frame.
pub trait RenderPass {
    fn name(&self) -> &'static str;

    /// Creates every native object. Fails with
    /// [`crate::AshError::AlreadyInitialized`] when called twice; on any other
    /// failure nothing created so far is left alive.
    fn initialize(&mut self) -> Result<()>;

    /// Destroys what `initialize` created. A no-op when not initialized.
    fn shutdown(&mut self);

    /// Records the pass into the command buffer of `frame.slot` and returns it.
    fn draw(&mut self, frame: &Frame) -> Result<vk::CommandBuffer>;

    fn is_initialized(&self) -> bool;
}

/// A pass that draws scene entities, bucketed by material.
pub trait GeometryPass: RenderPass {
    /// Queues `entity` for every subsequent frame until [`Self::clear_entities`].
    /// The pass keeps a weak reference only.
    fn add_entity_to_draw(&mut self, entity: &Arc<dyn Entity>);

    fn clear_entities(&mut self);

    fn entity_count(&self) -> usize;
}
