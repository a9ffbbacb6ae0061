use crate::buffer::{Buffer, BufferDescription};
use crate::command::CommandPool;
use crate::device::{AshDevice, AshQueue};
use crate::image::{aspect_flags_for, full_subresource_range};
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Byte offset of each region when the regions are laid end to end, and the total size.
pub(crate) fn region_offsets(regions: &[&[u8]]) -> (Vec<vk::DeviceSize>, vk::DeviceSize) {
    let mut offsets = Vec::with_capacity(regions.len());
    let mut total = 0;
    for region in regions {
        offsets.push(total);
        total += region.len() as vk::DeviceSize;
    }
    (offsets, total)
}

/// The exact bytes an upload of `regions` places in the destination buffer.
pub fn pack_regions(regions: &[&[u8]]) -> Vec<u8> {
    regions.concat()
}

/// Access masks and stages of a supported image layout transition.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    pub fn between(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<Self, VulkanError> {
        use vk::AccessFlags as Access;
        use vk::ImageLayout as Layout;
        use vk::PipelineStageFlags as Stage;

        let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
            (Layout::PREINITIALIZED, Layout::TRANSFER_SRC_OPTIMAL) => {
                (Access::HOST_WRITE, Access::TRANSFER_READ, Stage::HOST, Stage::TRANSFER)
            }
            (Layout::PREINITIALIZED, Layout::TRANSFER_DST_OPTIMAL) => {
                (Access::HOST_WRITE, Access::TRANSFER_WRITE, Stage::HOST, Stage::TRANSFER)
            }
            (Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL) => (
                Access::empty(),
                Access::TRANSFER_WRITE,
                Stage::TOP_OF_PIPE,
                Stage::TRANSFER,
            ),
            (Layout::TRANSFER_DST_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => (
                Access::TRANSFER_WRITE,
                Access::SHADER_READ,
                Stage::TRANSFER,
                Stage::FRAGMENT_SHADER,
            ),
            (Layout::UNDEFINED, Layout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
                Access::empty(),
                Access::DEPTH_STENCIL_ATTACHMENT_READ | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
                Stage::TOP_OF_PIPE,
                Stage::EARLY_FRAGMENT_TESTS,
            ),
            (Layout::UNDEFINED, Layout::COLOR_ATTACHMENT_OPTIMAL) => (
                Access::empty(),
                Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE,
                Stage::TOP_OF_PIPE,
                Stage::COLOR_ATTACHMENT_OUTPUT,
            ),
            (Layout::UNDEFINED, Layout::GENERAL) => (
                Access::empty(),
                Access::SHADER_READ | Access::SHADER_WRITE,
                Stage::TOP_OF_PIPE,
                Stage::COMPUTE_SHADER | Stage::FRAGMENT_SHADER,
            ),
            (old, new) => return Err(VulkanError::UnsupportedLayoutTransition { old, new }),
        };

        Ok(Self {
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        })
    }
}

/// A primary command buffer submitted once, then waited on with the queue idle.
pub struct OneTimeCommands<'a> {
    device: &'a AshDevice,
    pool: &'a CommandPool,
    queue: AshQueue,
    pub command_buffer: vk::CommandBuffer,
}

impl<'a> OneTimeCommands<'a> {
    pub fn begin(
        device: &'a AshDevice,
        pool: &'a CommandPool,
        queue: AshQueue,
    ) -> Result<Self, VulkanError> {
        let command_buffer = pool.allocate(1)?[0];
        let commands = Self {
            device,
            pool,
            queue,
            command_buffer,
        };

        unsafe {
            device.core.begin_command_buffer(
                command_buffer,
                &vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
        }?;

        Ok(commands)
    }

    pub fn submit_and_wait(self) -> Result<(), VulkanError> {
        unsafe {
            self.device.core.end_command_buffer(self.command_buffer)?;

            let command_buffers = [self.command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            self.device.core.queue_submit(
                self.queue.handle,
                &[submit_info.build()],
                vk::Fence::null(),
            )?;
            self.device.core.queue_wait_idle(self.queue.handle)?;
        }
        Ok(())
    }
}

impl Drop for OneTimeCommands<'_> {
    fn drop(&mut self) {
        self.pool.free(&[self.command_buffer]);
    }
}

/// Host to device copies and layout changes on one queue.
pub struct StagingTransfer {
    device: Arc<AshDevice>,
    queue: AshQueue,
    pool: CommandPool,
}

impl StagingTransfer {
    pub fn new(device: Arc<AshDevice>, queue: AshQueue) -> Result<Self, VulkanError> {
        let pool = CommandPool::new(
            device.clone(),
            queue.family_index,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        Ok(Self {
            device,
            queue,
            pool,
        })
    }

    pub fn run<F>(&self, record: F) -> Result<(), VulkanError>
    where
        F: FnOnce(&AshDevice, vk::CommandBuffer),
    {
        let commands = OneTimeCommands::begin(&self.device, &self.pool, self.queue)?;
        record(&self.device, commands.command_buffer);
        commands.submit_and_wait()
    }

    fn copy_buffer(&self, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> Result<(), VulkanError> {
        self.run(|device, command_buffer| unsafe {
            device.core.cmd_copy_buffer(
                command_buffer,
                src.handle,
                dst.handle,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                }],
            );
        })
    }

    /// Uploads `regions` end to end into a new device local buffer and
    /// returns it with the offset of each region.
    pub fn upload_to_device_local(
        &self,
        name: &str,
        regions: &[&[u8]],
        usage: vk::BufferUsageFlags,
    ) -> Result<(Buffer, Vec<vk::DeviceSize>), VulkanError> {
        self.upload_shared(name, regions, usage, &[])
    }

    /// Same as `upload_to_device_local`, for a buffer read by other queue
    /// families than the one doing the copy.
    pub fn upload_shared(
        &self,
        name: &str,
        regions: &[&[u8]],
        usage: vk::BufferUsageFlags,
        queue_families: &[u32],
    ) -> Result<(Buffer, Vec<vk::DeviceSize>), VulkanError> {
        let (offsets, size) = region_offsets(regions);
        if size == 0 {
            return Err(VulkanError::InvalidGeometry(format!("{} has no data", name)));
        }

        let mut staging = Buffer::new(
            self.device.clone(),
            &format!("{} Staging", name),
            &BufferDescription::new(size, vk::BufferUsageFlags::TRANSFER_SRC),
            HOST_COHERENT,
        )?;
        for (region, &offset) in regions.iter().zip(&offsets) {
            staging.write_at(offset as usize, region)?;
        }

        let buffer = Buffer::new(
            self.device.clone(),
            name,
            &BufferDescription::new(size, usage | vk::BufferUsageFlags::TRANSFER_DST)
                .shared_by(queue_families),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        self.copy_buffer(&staging, &buffer, size)?;
        drop(staging);

        debug!("Uploaded {} bytes into {} ({} regions)", size, name, regions.len());
        Ok((buffer, offsets))
    }

    /// Copies a device local buffer back to the host. The buffer needs
    /// TRANSFER_SRC usage.
    pub fn download_from_device_local(&self, buffer: &Buffer) -> Result<Vec<u8>, VulkanError> {
        let readback = Buffer::new(
            self.device.clone(),
            "Readback",
            &BufferDescription::new(buffer.size, vk::BufferUsageFlags::TRANSFER_DST),
            HOST_COHERENT,
        )?;

        self.copy_buffer(buffer, &readback, buffer.size)?;
        readback.read()
    }

    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<(), VulkanError> {
        let transition = LayoutTransition::between(old_layout, new_layout)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(full_subresource_range(aspect_flags_for(format)))
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access)
            .build();

        self.run(|device, command_buffer| unsafe {
            device.core.cmd_pipeline_barrier(
                command_buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_contiguous() {
        let index = [1u8; 6];
        let position = [2u8; 36];
        let normal = [3u8; 36];
        let (offsets, total) = region_offsets(&[&index, &position, &normal]);
        assert_eq!(offsets, vec![0, 6, 42]);
        assert_eq!(total, 78);
    }

    #[test]
    fn packed_bytes_sit_at_their_offsets() {
        let regions: [&[u8]; 3] = [&[0xAA, 0xBB], &[1, 2, 3, 4], &[9]];
        let packed = pack_regions(&regions);
        let (offsets, total) = region_offsets(&regions);

        assert_eq!(packed.len() as u64, total);
        for (region, offset) in regions.iter().zip(offsets) {
            let offset = offset as usize;
            assert_eq!(&packed[offset..offset + region.len()], *region);
        }
    }

    #[test]
    fn supported_transitions() {
        let depth = LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert_eq!(depth.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(depth.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);

        let sampled = LayoutTransition::between(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(sampled.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sampled.dst_access, vk::AccessFlags::SHADER_READ);

        let storage =
            LayoutTransition::between(vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL).unwrap();
        assert!(storage.dst_access.contains(vk::AccessFlags::SHADER_WRITE));
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let err = LayoutTransition::between(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(err, VulkanError::UnsupportedLayoutTransition { .. }));
        assert!(err.is_unsupported_environment());
    }
}
