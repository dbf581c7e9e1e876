use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Upper bound on objects addressed through the per-object storage buffer.
pub const MAX_OBJECTS: usize = 1024;

/// Light matrices carried in [`PerFrameData`]; bounds the shadow-map layer count.
pub const MAX_SHADOW_MAPS: usize = 4;

/// An image owned by the external image manager, borrowed by a pass as an
/// attachment or sampled input. Passes never destroy these handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBlock {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

impl ImageBlock {
    pub fn new(image: vk::Image, view: vk::ImageView, format: vk::Format) -> Self {
        Self {
            image,
            view,
            format,
        }
    }
}

/// Per-frame uniform block (set 0, binding 0 for geometry passes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PerFrameData {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec4,
    /// Light view-projection per shadow-map layer, selected in the geometry stage.
    pub light_view_projection: [Mat4; MAX_SHADOW_MAPS],
}

/// Per-object record in the storage buffer (set 1, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PerObjectData {
    pub model: Mat4,
    pub normal_matrix: Mat4,
}

impl PerFrameData {
    pub const SIZE: vk::DeviceSize = size_of::<Self>() as vk::DeviceSize;
}

impl PerObjectData {
    /// Range of the whole per-object buffer.
    pub const BUFFER_RANGE: vk::DeviceSize = (size_of::<Self>() * MAX_OBJECTS) as vk::DeviceSize;
}

/// Mesh vertex as laid out in vertex buffers bound at binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, normal) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(2)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Vertex, uv) as u32),
        ]
    }
}
