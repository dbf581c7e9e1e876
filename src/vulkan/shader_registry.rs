use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use super::GpuDevice;
use crate::error::{vk_context, AshError, Result};

/// Source of compiled shader modules for pass pipelines.
///
/// Modules returned here stay owned by the registry; passes only reference
/// them while building pipelines.
pub trait ShaderRegistry: Send + Sync {
    fn load_shader(&self, path: &Path, stage: vk::ShaderStageFlags) -> Result<vk::ShaderModule>;
}

/// Loads pre-compiled SPIR-V from disk and caches one module per path.
pub struct SpirvShaderRegistry {
    device: Arc<dyn GpuDevice>,
    modules: Mutex<HashMap<PathBuf, vk::ShaderModule>>,
}

impl SpirvShaderRegistry {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.modules.lock().len()
    }

    /// Destroys every cached module. Pipelines already built keep working.
    pub fn clear(&self) {
        let mut modules = self.modules.lock();
        for (path, module) in modules.drain() {
            log::debug!("Destroying shader module {}", path.display());
            self.device.destroy_shader_module(module);
        }
    }

    fn read_spirv(path: &Path) -> Result<Vec<u32>> {
        let to_error = |source| AshError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(to_error)?;
        ash::util::read_spv(&mut file).map_err(to_error)
    }
}

impl ShaderRegistry for SpirvShaderRegistry {
    fn load_shader(&self, path: &Path, stage: vk::ShaderStageFlags) -> Result<vk::ShaderModule> {
        let mut modules = self.modules.lock();
        if let Some(module) = modules.get(path) {
            return Ok(*module);
        }

        let code = Self::read_spirv(path)?;
        let module = self
            .device
            .create_shader_module(&code)
            .map_err(vk_context(&format!(
                "Failed to create shader module from {}",
                path.display()
            )))?;
        log::debug!(
            "Loaded {stage:?} shader {} ({} words)",
            path.display(),
            code.len()
        );
        modules.insert(path.to_path_buf(), module);
        Ok(module)
    }
}

impl Drop for SpirvShaderRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
