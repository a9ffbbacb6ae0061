use crate::instance::{AshInstance, Surface};
use crate::VulkanError;
use ash::vk;
use std::ffi::{c_char, CStr};

fn c_str_to_string(c_str: &[c_char]) -> String {
    unsafe {
        CStr::from_ptr(c_str.as_ptr())
            .to_string_lossy()
            .into_owned()
    }
}

fn supports_extension(extension_list: &[vk::ExtensionProperties], name: &CStr) -> bool {
    extension_list.iter().any(|extension_properties| {
        name == unsafe { CStr::from_ptr(extension_properties.extension_name.as_ptr()) }
    })
}

fn sum_memory_heaps(memory_heaps: &[vk::MemoryHeap], contains_flags: vk::MemoryHeapFlags) -> u64 {
    memory_heaps
        .iter()
        .filter(|memory_heap| memory_heap.flags.contains(contains_flags))
        .map(|memory_heap| memory_heap.size)
        .sum()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PhysicalDeviceType {
    Integrated,
    Discrete,
    Unknown,
}

impl PhysicalDeviceType {
    pub(crate) fn from_vulkan(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            _ => Self::Unknown,
        }
    }
}

/// Queue family chosen for each role. Roles may share a family.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scans the families once, keeping the first family that advertises each
    /// role. A family without queues is never picked. Transfer falls back to
    /// the graphics family, whose queues always accept transfer commands.
    pub fn resolve(
        queue_family_properties: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();

        for (index, family) in queue_family_properties.iter().enumerate() {
            if family.queue_count == 0 {
                continue;
            }
            let index = index as u32;
            let flags = family.queue_flags;

            if indices.graphics.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.compute.is_none() && flags.contains(vk::QueueFlags::COMPUTE) {
                indices.compute = Some(index);
            }
            if indices.transfer.is_none() && flags.contains(vk::QueueFlags::TRANSFER) {
                indices.transfer = Some(index);
            }
            if indices.present.is_none() && supports_present(index) {
                indices.present = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        if indices.transfer.is_none() {
            indices.transfer = indices.graphics;
        }

        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some()
            && self.present.is_some()
            && self.compute.is_some()
            && self.transfer.is_some()
    }

    /// Distinct family indices in role order, one queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(4);
        for index in [self.graphics, self.present, self.compute, self.transfer]
            .into_iter()
            .flatten()
        {
            if !families.contains(&index) {
                families.push(index);
            }
        }
        families
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub name: String,
    pub device_type: PhysicalDeviceType,
    pub supports_swapchain: bool,
    pub device_local_bytes: u64,
}

/// Per-device facts the selection rule looks at.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub info: PhysicalDeviceInfo,
    pub queue_families: QueueFamilyIndices,
}

impl DeviceCandidate {
    pub fn is_suitable(&self) -> bool {
        self.info.device_type == PhysicalDeviceType::Discrete
            && self.info.supports_swapchain
            && self.queue_families.is_complete()
    }
}

/// First discrete GPU with swapchain support and every queue role resolved.
pub fn select_physical_device(candidates: &[DeviceCandidate]) -> Option<usize> {
    candidates.iter().position(DeviceCandidate::is_suitable)
}

pub struct PhysicalDevice {
    pub handle: vk::PhysicalDevice,
    pub info: PhysicalDeviceInfo,
    pub queue_families: QueueFamilyIndices,
    pub queue_family_properties: Vec<vk::QueueFamilyProperties>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl PhysicalDevice {
    fn new(
        instance: &AshInstance,
        surface: &Surface,
        handle: vk::PhysicalDevice,
    ) -> Result<Self, VulkanError> {
        let properties = unsafe { instance.core.get_physical_device_properties(handle) };
        let memory_properties = unsafe { instance.core.get_physical_device_memory_properties(handle) };
        let queue_family_properties =
            unsafe { instance.core.get_physical_device_queue_family_properties(handle) };
        let extensions = unsafe { instance.core.enumerate_device_extension_properties(handle) }?;

        let queue_families = QueueFamilyIndices::resolve(&queue_family_properties, |index| {
            match unsafe {
                instance
                    .surface
                    .get_physical_device_surface_support(handle, index, surface.handle)
            } {
                Ok(supported) => supported,
                Err(err) => {
                    error!("Failed to query surface support for family {}: {}", index, err);
                    false
                }
            }
        });

        let heaps = &memory_properties.memory_heaps[..memory_properties.memory_heap_count as usize];

        Ok(Self {
            handle,
            info: PhysicalDeviceInfo {
                name: c_str_to_string(&properties.device_name),
                device_type: PhysicalDeviceType::from_vulkan(properties.device_type),
                supports_swapchain: supports_extension(
                    &extensions,
                    ash::extensions::khr::Swapchain::name(),
                ),
                device_local_bytes: sum_memory_heaps(heaps, vk::MemoryHeapFlags::DEVICE_LOCAL),
            },
            queue_families,
            queue_family_properties,
            memory_properties,
        })
    }

    fn candidate(&self) -> DeviceCandidate {
        DeviceCandidate {
            info: self.info.clone(),
            queue_families: self.queue_families,
        }
    }

    /// Enumerates the GPUs and returns the first one able to drive `surface`.
    pub fn select(instance: &AshInstance, surface: &Surface) -> Result<Self, VulkanError> {
        let handles = unsafe { instance.core.enumerate_physical_devices() }?;

        let mut devices = Vec::with_capacity(handles.len());
        for handle in handles {
            let device = PhysicalDevice::new(instance, surface, handle)?;
            debug!(
                "Found {} ({:?}) swapchain: {} queues: {:?}",
                device.info.name,
                device.info.device_type,
                device.info.supports_swapchain,
                device.queue_families
            );
            devices.push(device);
        }

        let candidates: Vec<DeviceCandidate> = devices.iter().map(PhysicalDevice::candidate).collect();
        let index = select_physical_device(&candidates).ok_or(VulkanError::NoSuitableDevice)?;
        let device = devices.swap_remove(index);

        info!(
            "Selected {} ({:?}, {} MiB device local) queue families {:?}",
            device.info.name,
            device.info.device_type,
            device.info.device_local_bytes / (1024 * 1024),
            device.queue_families
        );

        Ok(device)
    }

    pub fn format_properties(&self, instance: &AshInstance, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            instance
                .core
                .get_physical_device_format_properties(self.handle, format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn candidate(device_type: PhysicalDeviceType, name: &str) -> DeviceCandidate {
        DeviceCandidate {
            info: PhysicalDeviceInfo {
                name: name.to_string(),
                device_type,
                supports_swapchain: true,
                device_local_bytes: 0,
            },
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
                compute: Some(0),
                transfer: Some(0),
            },
        }
    }

    #[test]
    fn resolves_split_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::resolve(&families, |index| index == 1);

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.compute, Some(1));
        assert_eq!(indices.transfer, Some(0));
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn prefers_first_family_per_role() {
        let all = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
        let families = [family(vk::QueueFlags::COMPUTE), family(all), family(all)];
        let indices = QueueFamilyIndices::resolve(&families, |_| true);

        assert_eq!(indices.compute, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.transfer, Some(1));
    }

    #[test]
    fn missing_capability_leaves_role_unset() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let indices = QueueFamilyIndices::resolve(&families, |_| true);
        assert_eq!(indices.compute, None);
        assert!(!indices.is_complete());

        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::resolve(&families, |_| false);
        assert_eq!(indices.present, None);
        assert!(!indices.is_complete());

        let indices = QueueFamilyIndices::resolve(&[family(vk::QueueFlags::COMPUTE)], |_| true);
        assert_eq!(indices.graphics, None);
        assert_eq!(indices.transfer, None);
    }

    #[test]
    fn transfer_falls_back_to_graphics() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::resolve(&families, |_| true);
        assert_eq!(indices.transfer, Some(0));
        assert!(indices.is_complete());
    }

    #[test]
    fn empty_family_is_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::resolve(&families, |_| true);
        assert_eq!(indices.graphics, Some(1));
    }

    #[test]
    fn discrete_gpu_wins_over_integrated() {
        let candidates = [
            candidate(PhysicalDeviceType::Integrated, "igpu"),
            candidate(PhysicalDeviceType::Discrete, "dgpu"),
        ];
        assert_eq!(select_physical_device(&candidates), Some(1));
    }

    #[test]
    fn first_qualifying_device_is_selected() {
        let mut no_swapchain = candidate(PhysicalDeviceType::Discrete, "a");
        no_swapchain.info.supports_swapchain = false;
        let mut no_compute = candidate(PhysicalDeviceType::Discrete, "b");
        no_compute.queue_families.compute = None;
        let candidates = [
            no_swapchain,
            no_compute,
            candidate(PhysicalDeviceType::Discrete, "c"),
            candidate(PhysicalDeviceType::Discrete, "d"),
        ];
        assert_eq!(select_physical_device(&candidates), Some(2));
    }

    #[test]
    fn no_qualifying_device() {
        let candidates = [candidate(PhysicalDeviceType::Integrated, "igpu")];
        assert_eq!(select_physical_device(&candidates), None);
        assert_eq!(select_physical_device(&[]), None);
    }
}
