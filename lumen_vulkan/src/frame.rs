use crate::device::AshDevice;
use crate::swapchain::Swapchain;
use crate::sync::{ComputeFence, Semaphore};
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FrameState {
    Idle,
    ImageAcquired,
    GraphicsSubmitted,
    Presented,
    ComputeSubmitted,
}

/// Enforces the per-frame step order. Without a compute stage a presented
/// frame goes straight back to idle.
#[derive(Debug, Clone)]
pub struct FrameStateMachine {
    state: FrameState,
    compute_enabled: bool,
}

impl FrameStateMachine {
    pub fn new(compute_enabled: bool) -> Self {
        Self {
            state: FrameState::Idle,
            compute_enabled,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    fn next_state(&self) -> FrameState {
        match self.state {
            FrameState::Idle => FrameState::ImageAcquired,
            FrameState::ImageAcquired => FrameState::GraphicsSubmitted,
            FrameState::GraphicsSubmitted => FrameState::Presented,
            FrameState::Presented if self.compute_enabled => FrameState::ComputeSubmitted,
            FrameState::Presented | FrameState::ComputeSubmitted => FrameState::Idle,
        }
    }

    pub fn advance(&mut self, next: FrameState) -> Result<(), VulkanError> {
        if next != self.next_state() {
            return Err(VulkanError::FrameOrder {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Drops a half finished frame after a failed step.
    pub fn abandon(&mut self) {
        self.state = FrameState::Idle;
    }
}

struct ComputeSync {
    graphics_finished: Semaphore,
    compute_finished: Semaphore,
    fence: ComputeFence,
    submitted_once: bool,
}

/// Per frame synchronization state for the graphics and ray tracing queues.
pub struct FrameOrchestrator {
    device: Arc<AshDevice>,
    image_available: Semaphore,
    render_finished: Semaphore,
    compute: Option<ComputeSync>,
    machine: FrameStateMachine,
    acquire_timeout_ns: u64,
}

impl FrameOrchestrator {
    pub fn new(
        device: Arc<AshDevice>,
        compute_enabled: bool,
        acquire_timeout_ns: u64,
    ) -> Result<Self, VulkanError> {
        let compute = if compute_enabled {
            Some(ComputeSync {
                graphics_finished: Semaphore::new(device.clone())?,
                compute_finished: Semaphore::new(device.clone())?,
                fence: ComputeFence::new(device.clone())?,
                submitted_once: false,
            })
        } else {
            None
        };

        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            device,
            compute,
            machine: FrameStateMachine::new(compute_enabled),
            acquire_timeout_ns,
        })
    }

    pub fn state(&self) -> FrameState {
        self.machine.state()
    }

    /// Blocks until the last ray tracing dispatch retired, without rearming the fence.
    pub fn wait_for_compute(&mut self) -> Result<(), VulkanError> {
        match &mut self.compute {
            Some(compute) => compute.fence.wait(u64::MAX),
            None => Ok(()),
        }
    }

    /// Acquire, draw, present, then dispatch the ray tracer for the next frame.
    pub fn render_frame(
        &mut self,
        swapchain: &Swapchain,
        graphics_command_buffers: &[vk::CommandBuffer],
        compute_command_buffer: Option<vk::CommandBuffer>,
    ) -> Result<u32, VulkanError> {
        let result = self.run_steps(swapchain, graphics_command_buffers, compute_command_buffer);
        if result.is_err() {
            self.machine.abandon();
        }
        result
    }

    fn run_steps(
        &mut self,
        swapchain: &Swapchain,
        graphics_command_buffers: &[vk::CommandBuffer],
        compute_command_buffer: Option<vk::CommandBuffer>,
    ) -> Result<u32, VulkanError> {
        let queues = self.device.queues;

        let image_index =
            swapchain.acquire_next_image(self.image_available.handle, self.acquire_timeout_ns)?;
        self.machine.advance(FrameState::ImageAcquired)?;

        let command_buffer = *graphics_command_buffers
            .get(image_index as usize)
            .ok_or(VulkanError::MissingResource("graphics command buffer"))?;

        let mut wait_semaphores = vec![self.image_available.handle];
        let mut wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let mut signal_semaphores = vec![self.render_finished.handle];
        if let Some(compute) = &self.compute {
            if compute.submitted_once {
                wait_semaphores.push(compute.compute_finished.handle);
                wait_stages.push(vk::PipelineStageFlags::FRAGMENT_SHADER);
            }
            signal_semaphores.push(compute.graphics_finished.handle);
        }

        let command_buffers = [command_buffer];
        let graphics_submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            self.device
                .core
                .queue_submit(queues.graphics.handle, &[graphics_submit], vk::Fence::null())
        }?;
        self.machine.advance(FrameState::GraphicsSubmitted)?;

        swapchain.present(queues.present.handle, self.render_finished.handle, image_index)?;
        self.machine.advance(FrameState::Presented)?;

        if let Some(compute) = &mut self.compute {
            let command_buffer =
                compute_command_buffer.ok_or(VulkanError::MissingResource("compute command buffer"))?;

            compute.fence.wait_and_reset(u64::MAX)?;

            let wait_semaphores = [compute.graphics_finished.handle];
            let wait_stages = [vk::PipelineStageFlags::COMPUTE_SHADER];
            let signal_semaphores = [compute.compute_finished.handle];
            let command_buffers = [command_buffer];
            let compute_submit = vk::SubmitInfo::builder()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores)
                .build();
            compute
                .fence
                .submit(&self.device, queues.compute.handle, compute_submit)?;
            compute.submitted_once = true;
            self.machine.advance(FrameState::ComputeSubmitted)?;
        }

        self.machine.advance(FrameState::Idle)?;
        Ok(image_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAYTRACE_FRAME: [FrameState; 5] = [
        FrameState::ImageAcquired,
        FrameState::GraphicsSubmitted,
        FrameState::Presented,
        FrameState::ComputeSubmitted,
        FrameState::Idle,
    ];

    #[test]
    fn raytrace_frames_cycle_through_compute() {
        let mut machine = FrameStateMachine::new(true);
        for _frame in 0..2 {
            for state in RAYTRACE_FRAME {
                machine.advance(state).unwrap();
            }
        }
        assert_eq!(machine.state(), FrameState::Idle);
    }

    #[test]
    fn raster_frames_skip_compute() {
        let mut machine = FrameStateMachine::new(false);
        machine.advance(FrameState::ImageAcquired).unwrap();
        machine.advance(FrameState::GraphicsSubmitted).unwrap();
        machine.advance(FrameState::Presented).unwrap();
        assert!(machine.advance(FrameState::ComputeSubmitted).is_err());
        machine.advance(FrameState::Idle).unwrap();
    }

    #[test]
    fn out_of_order_steps_are_rejected() {
        let mut machine = FrameStateMachine::new(true);
        let err = machine.advance(FrameState::GraphicsSubmitted).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::FrameOrder {
                from: FrameState::Idle,
                to: FrameState::GraphicsSubmitted
            }
        ));

        machine.advance(FrameState::ImageAcquired).unwrap();
        machine.advance(FrameState::GraphicsSubmitted).unwrap();
        machine.advance(FrameState::Presented).unwrap();
        // Compute must run before the next frame starts.
        assert!(machine.advance(FrameState::Idle).is_err());
        assert_eq!(machine.state(), FrameState::Presented);
    }

    #[test]
    fn abandoned_frame_restarts_from_idle() {
        let mut machine = FrameStateMachine::new(true);
        machine.advance(FrameState::ImageAcquired).unwrap();
        machine.abandon();
        machine.advance(FrameState::ImageAcquired).unwrap();
    }
}
