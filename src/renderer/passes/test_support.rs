//! Headless runtime for pass tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk::{self, Handle};
use parking_lot::Mutex;

use crate::error::{AshError, Result};
use crate::renderer::config::ShaderPaths;
use crate::renderer::entity::{Entity, IndexedMesh, MeshEntity};
use crate::renderer::frame::{PerFrame, FRAMES_IN_FLIGHT};
use crate::renderer::material::MaterialKind;
use crate::renderer::resources::ImageBlock;
use crate::renderer::runtime::Runtime;
use crate::vulkan::{RecordedCommand, RecordingDevice, ShaderRegistry};

pub const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 1280,
    height: 720,
};

/// Hands out fake modules and remembers what was asked for.
#[derive(Default)]
pub struct StubShaders {
    loaded: Mutex<Vec<(PathBuf, vk::ShaderStageFlags)>>,
    missing: Mutex<Option<String>>,
}

impl StubShaders {
    /// Makes every later load of a path ending in `file` fail.
    pub fn make_missing(&self, file: &str) {
        *self.missing.lock() = Some(file.to_owned());
    }

    pub fn loaded(&self) -> Vec<(PathBuf, vk::ShaderStageFlags)> {
        self.loaded.lock().clone()
    }
}

impl ShaderRegistry for StubShaders {
    fn load_shader(&self, path: &Path, stage: vk::ShaderStageFlags) -> Result<vk::ShaderModule> {
        if let Some(file) = self.missing.lock().as_deref() {
            if path.ends_with(file) {
                return Err(AshError::ShaderLoad {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                });
            }
        }
        let mut loaded = self.loaded.lock();
        loaded.push((path.to_path_buf(), stage));
        Ok(vk::ShaderModule::from_raw(0x5000 + loaded.len() as u64))
    }
}

pub struct Fixture {
    pub device: Arc<RecordingDevice>,
    pub shaders: Arc<StubShaders>,
    pub runtime: Runtime,
}

pub fn plane_mesh() -> IndexedMesh {
    IndexedMesh {
        vertex_buffer: vk::Buffer::from_raw(0x9100),
        index_buffer: vk::Buffer::from_raw(0x9101),
        index_count: 6,
        index_type: vk::IndexType::UINT16,
        object_index: 0,
    }
}

impl Fixture {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let device = Arc::new(RecordingDevice::new());
        let shaders = Arc::new(StubShaders::default());
        let runtime = Runtime {
            device: device.clone(),
            command_pool: vk::CommandPool::from_raw(0xC0),
            extent: EXTENT,
            swapchain_image_count: FRAMES_IN_FLIGHT,
            shader_registry: shaders.clone(),
            shader_paths: ShaderPaths::with_directory("/shaders"),
            per_frame_buffers: PerFrame::from_fn(|slot| {
                vk::Buffer::from_raw(0x9000 + slot.index() as u64)
            }),
            per_object_buffers: PerFrame::from_fn(|slot| {
                vk::Buffer::from_raw(0x9010 + slot.index() as u64)
            }),
            fullscreen_plane: Arc::new(plane_mesh()),
        };
        Self {
            device,
            shaders,
            runtime,
        }
    }
}

pub fn image(raw: u64, format: vk::Format) -> ImageBlock {
    ImageBlock::new(
        vk::Image::from_raw(0x7000 + raw),
        vk::ImageView::from_raw(0x8000 + raw),
        format,
    )
}

/// A mesh entity whose `object_index` identifies it in recorded draws.
pub fn entity(object_index: u32, material: MaterialKind) -> Arc<dyn Entity> {
    Arc::new(MeshEntity {
        mesh: IndexedMesh {
            vertex_buffer: vk::Buffer::from_raw(0xA000 + object_index as u64),
            index_buffer: vk::Buffer::from_raw(0xB000 + object_index as u64),
            index_count: 36,
            index_type: vk::IndexType::UINT32,
            object_index,
        },
        material,
    })
}

/// `first_instance` of every indexed draw, in recording order.
pub fn drawn_objects(commands: &[RecordedCommand]) -> Vec<u32> {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::DrawIndexed { first_instance, .. } => Some(*first_instance),
            _ => None,
        })
        .collect()
}

/// Commands with labels and buffer binds stripped, for checking pass structure.
pub fn skeleton(commands: &[RecordedCommand]) -> Vec<RecordedCommand> {
    commands
        .iter()
        .filter(|command| {
            matches!(
                command,
                RecordedCommand::Begin
                    | RecordedCommand::End
                    | RecordedCommand::BeginRenderPass { .. }
                    | RecordedCommand::EndRenderPass
            )
        })
        .cloned()
        .collect()
}

/// Checks the invariants every balanced lifecycle ends with.
pub fn assert_released(device: &RecordingDevice) {
    assert_eq!(device.live_objects(), 0, "native objects leaked");
    assert!(
        device.validation_errors().is_empty(),
        "validation errors: {:?}",
        device.validation_errors()
    );
}
