use crate::device::AshDevice;
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

/// Local workgroup edge length declared by the ray tracing shader.
pub const COMPUTE_WORKGROUP_SIZE: u32 = 16;

/// Workgroups needed to cover every pixel of a `width` x `height` image.
pub fn dispatch_group_count(width: u32, height: u32) -> [u32; 3] {
    [
        (width + COMPUTE_WORKGROUP_SIZE - 1) / COMPUTE_WORKGROUP_SIZE,
        (height + COMPUTE_WORKGROUP_SIZE - 1) / COMPUTE_WORKGROUP_SIZE,
        1,
    ]
}

pub struct CommandPool {
    device: Arc<AshDevice>,
    pub handle: vk::CommandPool,
    pub family_index: u32,
}

impl CommandPool {
    pub fn new(
        device: Arc<AshDevice>,
        family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self, VulkanError> {
        let handle = unsafe {
            device.core.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .queue_family_index(family_index)
                    .flags(flags),
                None,
            )
        }?;

        Ok(Self {
            device,
            handle,
            family_index,
        })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>, VulkanError> {
        Ok(unsafe {
            self.device.core.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(self.handle)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(count),
            )
        }?)
    }

    pub fn free(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.device
                .core
                .free_command_buffers(self.handle, command_buffers)
        };
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_command_pool(self.handle, None) };
    }
}

/// Buffer views of one uploaded mesh.
#[derive(Debug, Clone)]
pub struct GeometryDraw {
    pub buffer: vk::Buffer,
    pub index_offset: vk::DeviceSize,
    pub vertex_offsets: Vec<vk::DeviceSize>,
    pub index_count: u32,
}

pub(crate) struct GraphicsRecording<'a> {
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub geometries: &'a [GeometryDraw],
    pub clear_color: [f32; 4],
}

/// Records one reusable command buffer per framebuffer.
pub(crate) fn record_graphics_commands(
    device: &AshDevice,
    command_buffers: &[vk::CommandBuffer],
    framebuffers: &[vk::Framebuffer],
    recording: &GraphicsRecording,
) -> Result<(), VulkanError> {
    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: recording.clear_color,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ];

    for (&command_buffer, &framebuffer) in command_buffers.iter().zip(framebuffers) {
        unsafe {
            device.core.begin_command_buffer(
                command_buffer,
                &vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE),
            )?;

            if let Some(debug_utils) = &device.instance.debug_utils {
                debug_utils.cmd_begin_label(command_buffer, "Graphics Pass", [0.0, 0.5, 1.0, 1.0]);
            }

            device.core.cmd_begin_render_pass(
                command_buffer,
                &vk::RenderPassBeginInfo::builder()
                    .render_pass(recording.render_pass)
                    .framebuffer(framebuffer)
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: recording.extent,
                    })
                    .clear_values(&clear_values),
                vk::SubpassContents::INLINE,
            );

            device.core.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                recording.pipeline,
            );

            for geometry in recording.geometries {
                let buffers = vec![geometry.buffer; geometry.vertex_offsets.len()];
                device.core.cmd_bind_vertex_buffers(
                    command_buffer,
                    0,
                    &buffers,
                    &geometry.vertex_offsets,
                );
                device.core.cmd_bind_index_buffer(
                    command_buffer,
                    geometry.buffer,
                    geometry.index_offset,
                    vk::IndexType::UINT16,
                );
                device.core.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    recording.pipeline_layout,
                    0,
                    &[recording.descriptor_set],
                    &[],
                );
                device
                    .core
                    .cmd_draw_indexed(command_buffer, geometry.index_count, 1, 0, 0, 0);
            }

            device.core.cmd_end_render_pass(command_buffer);

            if let Some(debug_utils) = &device.instance.debug_utils {
                debug_utils.cmd_end_label(command_buffer);
            }

            device.core.end_command_buffer(command_buffer)?;
        }
    }

    Ok(())
}

/// Records the single ray tracing dispatch.
pub(crate) fn record_compute_commands(
    device: &AshDevice,
    command_buffer: vk::CommandBuffer,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    image_extent: vk::Extent2D,
) -> Result<(), VulkanError> {
    let [x, y, z] = dispatch_group_count(image_extent.width, image_extent.height);

    unsafe {
        device.core.begin_command_buffer(
            command_buffer,
            &vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE),
        )?;

        if let Some(debug_utils) = &device.instance.debug_utils {
            debug_utils.cmd_begin_label(command_buffer, "Raytrace Dispatch", [1.0, 0.5, 0.0, 1.0]);
        }

        device
            .core
            .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::COMPUTE, pipeline);
        device.core.cmd_bind_descriptor_sets(
            command_buffer,
            vk::PipelineBindPoint::COMPUTE,
            pipeline_layout,
            0,
            &[descriptor_set],
            &[],
        );
        device.core.cmd_dispatch(command_buffer, x, y, z);

        if let Some(debug_utils) = &device.instance.debug_utils {
            debug_utils.cmd_end_label(command_buffer);
        }

        device.core.end_command_buffer(command_buffer)?;
    }

    debug!("Recorded compute dispatch {}x{}x{}", x, y, z);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_partial_tiles() {
        assert_eq!(dispatch_group_count(800, 600), [50, 38, 1]);
        assert_eq!(dispatch_group_count(16, 16), [1, 1, 1]);
        assert_eq!(dispatch_group_count(17, 1), [2, 1, 1]);
    }

    #[test]
    fn dispatch_of_empty_image_is_empty() {
        assert_eq!(dispatch_group_count(0, 0), [0, 0, 1]);
    }
}
