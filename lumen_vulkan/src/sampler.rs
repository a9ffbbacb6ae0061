use crate::device::AshDevice;
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

/// Linear filtering clamped to the edge unless set otherwise.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SamplerDescription {
    pub address_mode: vk::SamplerAddressMode,
    pub filter: vk::Filter,
}

impl Default for SamplerDescription {
    fn default() -> Self {
        Self {
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            filter: vk::Filter::LINEAR,
        }
    }
}

pub struct Sampler {
    device: Arc<AshDevice>,
    pub handle: vk::Sampler,
}

impl Sampler {
    pub fn new(device: Arc<AshDevice>, description: &SamplerDescription) -> Result<Self, VulkanError> {
        let address_mode = description.address_mode;
        let filter = description.filter;

        let handle = unsafe {
            device.core.create_sampler(
                &vk::SamplerCreateInfo::builder()
                    .mag_filter(filter)
                    .min_filter(filter)
                    .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                    .address_mode_u(address_mode)
                    .address_mode_v(address_mode)
                    .address_mode_w(address_mode)
                    .max_anisotropy(1.0)
                    .compare_op(vk::CompareOp::NEVER)
                    .min_lod(0.0)
                    .max_lod(0.0)
                    .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE),
                None,
            )
        }?;

        Ok(Self { device, handle })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_sampler(self.handle, None) };
    }
}
