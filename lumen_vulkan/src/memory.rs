use crate::device::AshDevice;
use crate::VulkanError;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

/// First memory type allowed by `type_bits` whose properties include every
/// flag in `desired`.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    desired: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_properties.memory_types[..memory_properties.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(desired)
        })
        .map(|(index, _memory_type)| index as u32)
}

/// Allocator location whose required flags are covered by `desired`.
pub fn memory_location_for(desired: vk::MemoryPropertyFlags) -> MemoryLocation {
    let host_coherent = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    if desired.contains(host_coherent | vk::MemoryPropertyFlags::HOST_CACHED) {
        MemoryLocation::GpuToCpu
    } else if desired.contains(host_coherent) {
        MemoryLocation::CpuToGpu
    } else if desired.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        MemoryLocation::GpuOnly
    } else {
        MemoryLocation::Unknown
    }
}

/// Picks the memory type, then lets the allocator sub-allocate from exactly
/// that type.
pub(crate) fn allocate_memory(
    device: &AshDevice,
    name: &str,
    requirements: vk::MemoryRequirements,
    desired: vk::MemoryPropertyFlags,
    linear: bool,
) -> Result<Allocation, VulkanError> {
    let memory_type_index =
        find_memory_type_index(&device.memory_properties, requirements.memory_type_bits, desired)
            .ok_or(VulkanError::NoMatchingMemoryType {
                type_bits: requirements.memory_type_bits,
                properties: desired,
            })?;

    let requirements = vk::MemoryRequirements {
        memory_type_bits: 1 << memory_type_index,
        ..requirements
    };

    let allocation = device.allocator().allocate(&AllocationCreateDesc {
        name,
        requirements,
        location: memory_location_for(desired),
        linear,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    })?;

    trace!(
        "Allocated {} bytes for {} from memory type {}",
        allocation.size(),
        name,
        memory_type_index
    );

    Ok(allocation)
}

pub(crate) fn free_memory(device: &AshDevice, allocation: Allocation) {
    if let Err(err) = device.allocator().free(allocation) {
        error!("Failed to free allocation: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (index, flags) in types.iter().enumerate() {
            properties.memory_types[index] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        properties
    }

    #[test]
    fn requires_superset_of_desired_flags() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let desired = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type_index(&properties, 0b111, desired), Some(2));
        assert_eq!(
            find_memory_type_index(&properties, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
    }

    #[test]
    fn respects_requirement_bits() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        assert_eq!(
            find_memory_type_index(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
        assert_eq!(
            find_memory_type_index(&properties, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }

    #[test]
    fn ignores_types_past_reported_count() {
        let mut properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        assert_eq!(
            find_memory_type_index(&properties, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }

    #[test]
    fn maps_property_flags_to_locations() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(memory_location_for(host), MemoryLocation::CpuToGpu);
        assert_eq!(
            memory_location_for(host | vk::MemoryPropertyFlags::HOST_CACHED),
            MemoryLocation::GpuToCpu
        );
        assert_eq!(
            memory_location_for(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location_for(vk::MemoryPropertyFlags::HOST_VISIBLE),
            MemoryLocation::Unknown
        );
    }
}
