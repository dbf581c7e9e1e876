use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Errors raised while creating pass resources or recording frames.
///
/// Every native failure is fatal for the operation that hit it: nothing in
/// this crate retries a Vulkan call.
#[derive(Debug, Error)]
pub enum AshError {
    #[error("Vulkan error: {0}")]
    VulkanError(String),

    #[error("Failed to load shader {}: {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame slot {index} out of range (frames in flight: {count})")]
    InvalidFrameSlot { index: usize, count: usize },

    #[error("Expected {expected} per-frame resources, got {actual}")]
    FrameCountMismatch { expected: usize, actual: usize },

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),

    #[error("Object index {index} outside the per-object buffer ({max} objects)")]
    ObjectIndexOutOfRange { index: u32, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<vk::Result> for AshError {
    fn from(result: vk::Result) -> Self {
        AshError::VulkanError(format!("{result:?}"))
    }
}

pub type Result<T> = std::result::Result<T, AshError>;

/// Wraps a failed native call with the operation that issued it.
pub(crate) fn vk_context(what: &str) -> impl FnOnce(vk::Result) -> AshError + '_ {
    move |e| AshError::VulkanError(format!("{what}: {e}"))
}
