pub mod descriptor_layout;
pub mod descriptor_set;
pub mod device;
pub mod recording;
pub mod shader_registry;

pub use descriptor_layout::DescriptorSetLayoutBuilder;
pub use descriptor_set::DescriptorPoolPlan;
pub use device::{AshDevice, GpuDevice};
pub use recording::{ObjectKind, RecordedCommand, RecordingDevice};
pub use shader_registry::{ShaderRegistry, SpirvShaderRegistry};
