use crate::device::AshDevice;
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

pub struct Semaphore {
    device: Arc<AshDevice>,
    pub handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<AshDevice>) -> Result<Self, VulkanError> {
        let handle = unsafe {
            device
                .core
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }?;
        Ok(Self { device, handle })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_semaphore(self.handle, None) };
    }
}

pub struct Fence {
    device: Arc<AshDevice>,
    pub handle: vk::Fence,
}

impl Fence {
    pub fn new(device: Arc<AshDevice>, signaled: bool) -> Result<Self, VulkanError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let handle = unsafe {
            device
                .core
                .create_fence(&vk::FenceCreateInfo::builder().flags(flags), None)
        }?;
        Ok(Self { device, handle })
    }

    pub fn wait(&self, timeout_ns: u64) -> Result<(), VulkanError> {
        unsafe {
            self.device
                .core
                .wait_for_fences(&[self.handle], true, timeout_ns)
        }?;
        Ok(())
    }

    pub fn reset(&self) -> Result<(), VulkanError> {
        unsafe { self.device.core.reset_fences(&[self.handle]) }?;
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_fence(self.handle, None) };
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SubmissionState {
    /// Fence signaled, work retired, fence not yet reset.
    Signaled,
    /// Fence reset, ready for exactly one submission.
    Armed,
    /// Work submitted and not yet waited on.
    InFlight,
}

/// Host side bookkeeping for a fence that guards one reusable command buffer.
#[derive(Debug, Clone)]
pub struct SubmissionGate {
    state: SubmissionState,
}

impl Default for SubmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionGate {
    /// Matches a fence created in the signaled state.
    pub fn new() -> Self {
        Self {
            state: SubmissionState::Signaled,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// Whether a host wait on the fence can return.
    pub fn needs_wait(&self) -> bool {
        self.state == SubmissionState::InFlight
    }

    pub fn on_waited(&mut self) {
        if self.state == SubmissionState::InFlight {
            self.state = SubmissionState::Signaled;
        }
    }

    pub fn on_reset(&mut self) -> Result<(), VulkanError> {
        match self.state {
            SubmissionState::InFlight => Err(VulkanError::ComputeStillInFlight),
            SubmissionState::Signaled | SubmissionState::Armed => {
                self.state = SubmissionState::Armed;
                Ok(())
            }
        }
    }

    pub fn begin_submit(&mut self) -> Result<(), VulkanError> {
        match self.state {
            SubmissionState::Armed => {
                self.state = SubmissionState::InFlight;
                Ok(())
            }
            _ => Err(VulkanError::ComputeStillInFlight),
        }
    }

    /// The queue rejected the submission, so the fence was never handed over.
    pub fn submit_failed(&mut self) {
        if self.state == SubmissionState::InFlight {
            self.state = SubmissionState::Armed;
        }
    }
}

/// Fence gating re-submission of the compute command buffer.
pub struct ComputeFence {
    fence: Fence,
    gate: SubmissionGate,
}

impl ComputeFence {
    pub fn new(device: Arc<AshDevice>) -> Result<Self, VulkanError> {
        Ok(Self {
            fence: Fence::new(device, true)?,
            gate: SubmissionGate::new(),
        })
    }

    pub fn state(&self) -> SubmissionState {
        self.gate.state()
    }

    /// Blocks until the last submission retired, leaving the fence signaled.
    pub fn wait(&mut self, timeout_ns: u64) -> Result<(), VulkanError> {
        if self.gate.needs_wait() {
            self.fence.wait(timeout_ns)?;
            self.gate.on_waited();
        }
        Ok(())
    }

    pub fn wait_and_reset(&mut self, timeout_ns: u64) -> Result<(), VulkanError> {
        self.wait(timeout_ns)?;
        if self.gate.state() == SubmissionState::Signaled {
            self.fence.reset()?;
        }
        self.gate.on_reset()
    }

    pub fn submit(
        &mut self,
        device: &AshDevice,
        queue: vk::Queue,
        submit_info: vk::SubmitInfo,
    ) -> Result<(), VulkanError> {
        self.gate.begin_submit()?;
        if let Err(err) = unsafe { device.core.queue_submit(queue, &[submit_info], self.fence.handle) } {
            self.gate.submit_failed();
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_signaled_and_must_be_reset_before_submit() {
        let mut gate = SubmissionGate::new();
        assert!(!gate.needs_wait());
        assert!(matches!(gate.begin_submit(), Err(VulkanError::ComputeStillInFlight)));

        gate.on_reset().unwrap();
        gate.begin_submit().unwrap();
        assert_eq!(gate.state(), SubmissionState::InFlight);
    }

    #[test]
    fn second_submit_without_wait_is_rejected() {
        let mut gate = SubmissionGate::new();
        gate.on_reset().unwrap();
        gate.begin_submit().unwrap();

        assert!(matches!(gate.begin_submit(), Err(VulkanError::ComputeStillInFlight)));
        assert!(matches!(gate.on_reset(), Err(VulkanError::ComputeStillInFlight)));
        assert_eq!(gate.state(), SubmissionState::InFlight);
    }

    #[test]
    fn wait_then_reset_allows_next_submit() {
        let mut gate = SubmissionGate::new();
        for _frame in 0..3 {
            if gate.needs_wait() {
                gate.on_waited();
            }
            gate.on_reset().unwrap();
            gate.begin_submit().unwrap();
        }
        assert!(gate.needs_wait());
    }

    #[test]
    fn failed_submit_returns_to_armed() {
        let mut gate = SubmissionGate::new();
        gate.on_reset().unwrap();
        gate.begin_submit().unwrap();
        gate.submit_failed();
        assert_eq!(gate.state(), SubmissionState::Armed);
        assert!(!gate.needs_wait());
        gate.begin_submit().unwrap();
    }
}
