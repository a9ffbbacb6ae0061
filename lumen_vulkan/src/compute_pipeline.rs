use crate::command::CommandPool;
use crate::device::AshDevice;
use crate::pipeline::{PipelineLayout, ENTRY_POINT_NAME};
use crate::shader::ShaderModule;
use crate::VulkanError;
use ash::vk;
use std::path::Path;
use std::sync::Arc;

/// Ray tracing pipeline plus the command pool and buffer it is recorded into.
/// The pool lives on the compute family, which may differ from graphics.
pub struct ComputePipeline {
    device: Arc<AshDevice>,
    pub layout: PipelineLayout,
    pub handle: vk::Pipeline,
    pub command_pool: CommandPool,
    pub command_buffer: vk::CommandBuffer,
}

impl ComputePipeline {
    pub fn new(
        device: Arc<AshDevice>,
        shader: &Path,
        set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self, VulkanError> {
        let module = ShaderModule::load(device.clone(), shader)?;
        let layout = PipelineLayout::new(device.clone(), &[set_layout])?;

        let create_info = vk::ComputePipelineCreateInfo::builder()
            .layout(layout.handle)
            .stage(
                vk::PipelineShaderStageCreateInfo::builder()
                    .module(module.handle)
                    .stage(vk::ShaderStageFlags::COMPUTE)
                    .name(ENTRY_POINT_NAME)
                    .build(),
            )
            .build();

        let handle = unsafe {
            device
                .core
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, err)| err)?[0];
        drop(module);

        let command_pool = match CommandPool::new(
            device.clone(),
            device.queues.compute.family_index,
            vk::CommandPoolCreateFlags::empty(),
        ) {
            Ok(command_pool) => command_pool,
            Err(err) => {
                unsafe { device.core.destroy_pipeline(handle, None) };
                return Err(err);
            }
        };

        let command_buffer = match command_pool.allocate(1) {
            Ok(command_buffers) => command_buffers[0],
            Err(err) => {
                unsafe { device.core.destroy_pipeline(handle, None) };
                return Err(err);
            }
        };

        info!(
            "Created compute pipeline from {} on family {}",
            shader.display(),
            command_pool.family_index
        );

        Ok(Self {
            device,
            layout,
            handle,
            command_pool,
            command_buffer,
        })
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_pipeline(self.handle, None) };
    }
}
