use std::sync::{Arc, Weak};

use ash::vk;

use super::frame::Frame;
use super::material::{MaterialKind, PerMaterial};
use super::resources::MAX_OBJECTS;
use crate::error::{AshError, Result};
use crate::vulkan::GpuDevice;

/// Something that records its own draw commands into a pass's command buffer.
///
/// Pipelines and descriptor sets are already bound when `draw` runs.
pub trait Drawable: Send + Sync {
    fn draw(
        &self,
        device: &dyn GpuDevice,
        command_buffer: vk::CommandBuffer,
        frame: &Frame,
    ) -> Result<()>;
}

/// A scene entity a geometry pass can draw.
pub trait Entity: Drawable {
    fn material(&self) -> MaterialKind;
}

/// GPU buffers of an indexed triangle mesh using [`super::Vertex`] layout.
#[derive(Clone, Copy, Debug)]
pub struct IndexedMesh {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub index_type: vk::IndexType,
    /// Row in the per-object storage buffer, passed as `first_instance`.
    pub object_index: u32,
}

impl Drawable for IndexedMesh {
    fn draw(
        &self,
        device: &dyn GpuDevice,
        command_buffer: vk::CommandBuffer,
        _frame: &Frame,
    ) -> Result<()> {
        if self.object_index as usize >= MAX_OBJECTS {
            return Err(AshError::ObjectIndexOutOfRange {
                index: self.object_index,
                max: MAX_OBJECTS,
            });
        }
        device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer], &[0]);
        device.cmd_bind_index_buffer(command_buffer, self.index_buffer, 0, self.index_type);
        device.cmd_draw_indexed(
            command_buffer,
            self.index_count,
            1,
            0,
            0,
            self.object_index,
        );
        Ok(())
    }
}

/// An [`IndexedMesh`] tagged with the material it is shaded with.
#[derive(Clone, Copy, Debug)]
pub struct MeshEntity {
    pub mesh: IndexedMesh,
    pub material: MaterialKind,
}

impl Drawable for MeshEntity {
    fn draw(
        &self,
        device: &dyn GpuDevice,
        command_buffer: vk::CommandBuffer,
        frame: &Frame,
    ) -> Result<()> {
        self.mesh.draw(device, command_buffer, frame)
    }
}

impl Entity for MeshEntity {
    fn material(&self) -> MaterialKind {
        self.material
    }
}

/// Entities queued for a geometry pass, bucketed by material.
///
/// Buckets keep insertion order and hold weak references: the scene owns the
/// entities, and one dropped before the frame is recorded is skipped.
#[derive(Default)]
pub struct EntityLists {
    buckets: PerMaterial<Vec<Weak<dyn Entity>>>,
}

impl EntityLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: &Arc<dyn Entity>) {
        let bucket = &mut self.buckets[entity.material()];
        bucket.retain(|weak| weak.strong_count() > 0);
        bucket.push(Arc::downgrade(entity));
    }

    /// Forgets entities the scene has dropped. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        for (_, bucket) in self.buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|weak| weak.strong_count() > 0);
            removed += before - bucket.len();
        }
        removed
    }

    pub fn clear(&mut self) {
        for (_, bucket) in self.buckets.iter_mut() {
            bucket.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.values().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_len(&self, kind: MaterialKind) -> usize {
        self.buckets[kind].len()
    }

    /// Entities of `kind` still alive, in insertion order.
    pub fn live(&self, kind: MaterialKind) -> impl Iterator<Item = Arc<dyn Entity>> + '_ {
        self.buckets[kind].iter().filter_map(move |weak| {
            let entity = weak.upgrade();
            if entity.is_none() {
                log::warn!("Skipping {} entity dropped before draw", kind.name());
            }
            entity
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged(MaterialKind);

    impl Drawable for Tagged {
        fn draw(&self, _: &dyn GpuDevice, _: vk::CommandBuffer, _: &Frame) -> Result<()> {
            Ok(())
        }
    }

    impl Entity for Tagged {
        fn material(&self) -> MaterialKind {
            self.0
        }
    }

    #[test]
    fn buckets_by_material() {
        let diffuse: Arc<dyn Entity> = Arc::new(Tagged(MaterialKind::Diffuse));
        let micro: Arc<dyn Entity> = Arc::new(Tagged(MaterialKind::Microfacets));
        let mut lists = EntityLists::new();
        lists.push(&micro);
        lists.push(&diffuse);
        lists.push(&micro);

        assert_eq!(lists.len(), 3);
        assert_eq!(lists.bucket_len(MaterialKind::Diffuse), 1);
        assert_eq!(lists.bucket_len(MaterialKind::Microfacets), 2);

        lists.clear();
        assert!(lists.is_empty());
    }

    #[test]
    fn dropped_entities_are_skipped() {
        let kept: Arc<dyn Entity> = Arc::new(Tagged(MaterialKind::Diffuse));
        let dropped: Arc<dyn Entity> = Arc::new(Tagged(MaterialKind::Diffuse));
        let mut lists = EntityLists::new();
        lists.push(&dropped);
        lists.push(&kept);
        drop(dropped);

        let live: Vec<_> = lists.live(MaterialKind::Diffuse).collect();
        assert_eq!(live.len(), 1);
        assert!(Arc::ptr_eq(&live[0], &kept));
    }

    #[test]
    fn prune_forgets_dropped_entities() {
        let kept: Arc<dyn Entity> = Arc::new(Tagged(MaterialKind::Microfacets));
        let mut lists = EntityLists::new();
        for _ in 0..3 {
            let transient: Arc<dyn Entity> = Arc::new(Tagged(MaterialKind::Diffuse));
            lists.push(&transient);
        }
        lists.push(&kept);
        // Each push drops earlier dead entries of its bucket.
        assert_eq!(lists.bucket_len(MaterialKind::Diffuse), 1);

        assert_eq!(lists.prune(), 1);
        assert_eq!(lists.prune(), 0);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists.bucket_len(MaterialKind::Microfacets), 1);
    }

    #[test]
    fn mesh_rejects_object_index_past_storage_buffer() {
        use crate::vulkan::RecordingDevice;

        let mesh = IndexedMesh {
            vertex_buffer: vk::Buffer::null(),
            index_buffer: vk::Buffer::null(),
            index_count: 3,
            index_type: vk::IndexType::UINT16,
            object_index: MAX_OBJECTS as u32,
        };
        let device = RecordingDevice::new();
        let result = mesh.draw(&device, vk::CommandBuffer::null(), &Frame::first());

        assert!(matches!(
            result,
            Err(AshError::ObjectIndexOutOfRange { index, max: MAX_OBJECTS }) if index == MAX_OBJECTS as u32
        ));
        assert!(device.commands(vk::CommandBuffer::null()).is_empty());
    }
}
