mod buffer;
mod command;
mod compute_pipeline;
mod debug_utils;
mod descriptor_set;
mod device;
mod frame;
mod geometry;
mod image;
mod instance;
mod memory;
mod physical_device;
mod pipeline;
mod renderer;
mod resource_manager;
mod sampler;
mod scene;
mod shader;
mod swapchain;
mod sync;
mod transfer;
mod uniform;

pub use buffer::*;
pub use command::{dispatch_group_count, CommandPool, GeometryDraw, COMPUTE_WORKGROUP_SIZE};
pub use compute_pipeline::ComputePipeline;
pub use descriptor_set::*;
pub use device::*;
pub use frame::*;
pub use geometry::*;
pub use image::*;
pub use instance::*;
pub use memory::{find_memory_type_index, memory_location_for};
pub use physical_device::*;
pub use pipeline::{GraphicsPipeline, GraphicsPipelineDescription, PipelineLayout, RenderPass};
pub use renderer::*;
pub use resource_manager::ResourceManager;
pub use sampler::*;
pub use scene::*;
pub use shader::load_spirv;
pub use swapchain::*;
pub use sync::*;
pub use transfer::{pack_regions, LayoutTransition, OneTimeCommands, StagingTransfer};
pub use uniform::*;

pub use ash;

#[macro_use]
extern crate log;

#[derive(thiserror::Error, Debug)]
pub enum VulkanError {
    #[error("Vk error: {0}")]
    Vk(#[from] ash::vk::Result),

    #[error("Gpu alloc error: {0}")]
    GpuAlloc(#[from] gpu_allocator::AllocationError),

    #[error("Failed to load vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("No physical device satisfies the renderer requirements")]
    NoSuitableDevice,

    #[error("No supported depth format")]
    NoSupportedDepthFormat,

    #[error("No memory type matches bits {type_bits:#b} with properties {properties:?}")]
    NoMatchingMemoryType {
        type_bits: u32,
        properties: ash::vk::MemoryPropertyFlags,
    },

    #[error("Unsupported image layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: ash::vk::ImageLayout,
        new: ash::vk::ImageLayout,
    },

    #[error("Timed out acquiring swapchain image")]
    AcquireTimeout,

    #[error("Compute work submitted again before its fence was waited on")]
    ComputeStillInFlight,

    #[error("Frame step {to:?} is not allowed after {from:?}")]
    FrameOrder {
        from: frame::FrameState,
        to: frame::FrameState,
    },

    #[error("Failed to read shader {path}: {source}")]
    ShaderIo {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Allocation is not host mapped")]
    MemoryNotMapped,

    #[error("Write of {len} bytes at offset {offset} exceeds {capacity} bytes")]
    WriteOutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("Missing {0}")]
    MissingResource(&'static str),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("{phase} failed: {source}")]
    Setup {
        phase: &'static str,
        source: Box<VulkanError>,
    },
}

impl VulkanError {
    /// True for failures caused by the host environment (hardware, driver or
    /// configuration) rather than by a transient GPU call.
    pub fn is_unsupported_environment(&self) -> bool {
        match self {
            VulkanError::Loading(_)
            | VulkanError::NoSuitableDevice
            | VulkanError::NoSupportedDepthFormat
            | VulkanError::NoMatchingMemoryType { .. }
            | VulkanError::UnsupportedLayoutTransition { .. } => true,
            VulkanError::Setup { source, .. } => source.is_unsupported_environment(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, VulkanError>;

/// Tags the error of a set-up phase with the phase name.
pub(crate) trait SetupPhase<T> {
    fn phase(self, phase: &'static str) -> Result<T>;
}

impl<T, E: Into<VulkanError>> SetupPhase<T> for std::result::Result<T, E> {
    fn phase(self, phase: &'static str) -> Result<T> {
        self.map_err(|err| VulkanError::Setup {
            phase,
            source: Box::new(err.into()),
        })
    }
}

slotmap::new_key_type! {
    pub struct BufferKey;
    pub struct ImageKey;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn setup_phase_wraps_and_keeps_classification() {
        let result: std::result::Result<(), VulkanError> = Err(VulkanError::NoSuitableDevice);
        let err = result.phase("Device selection").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Device selection failed: No physical device satisfies the renderer requirements"
        );
        assert!(err.is_unsupported_environment());
    }

    #[test]
    fn gpu_call_failures_are_not_environment_errors() {
        let err: VulkanError = vk::Result::ERROR_OUT_OF_DEVICE_MEMORY.into();
        assert!(!err.is_unsupported_environment());
        assert!(!VulkanError::AcquireTimeout.is_unsupported_environment());
    }
}
