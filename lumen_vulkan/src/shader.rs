use crate::device::AshDevice;
use crate::VulkanError;
use ash::vk;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads a SPIR-V binary from disk as 32 bit words.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>, VulkanError> {
    let io_error = |source| VulkanError::ShaderIo {
        path: PathBuf::from(path),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_error)?;
    let code = ash::util::read_spv(&mut file).map_err(io_error)?;
    debug!("Loaded {} ({} words)", path.display(), code.len());
    Ok(code)
}

/// Lives only as long as the pipeline creation call that consumes it.
pub(crate) struct ShaderModule {
    device: Arc<AshDevice>,
    pub(crate) handle: vk::ShaderModule,
}

impl ShaderModule {
    pub(crate) fn new(device: Arc<AshDevice>, code: &[u32]) -> Result<Self, VulkanError> {
        let handle = unsafe {
            device
                .core
                .create_shader_module(&vk::ShaderModuleCreateInfo::builder().code(code), None)
        }?;
        Ok(Self { device, handle })
    }

    pub(crate) fn load(device: Arc<AshDevice>, path: &Path) -> Result<Self, VulkanError> {
        let code = load_spirv(path)?;
        Self::new(device, &code)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_shader_module(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_words_from_file() {
        let path = std::env::temp_dir().join("lumen_vulkan_shader_words.spv");
        let words: [u32; 3] = [0x0723_0203, 0x0001_0000, 42];
        let mut file = std::fs::File::create(&path).unwrap();
        for word in words {
            file.write_all(&word.to_le_bytes()).unwrap();
        }
        drop(file);

        assert_eq!(load_spirv(&path).unwrap(), words.to_vec());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_spirv(Path::new("shaders/does_not_exist.spv")).unwrap_err();
        assert!(err.to_string().contains("does_not_exist.spv"));
    }
}
