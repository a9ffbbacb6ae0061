use crate::instance::AshInstance;
use crate::physical_device::PhysicalDevice;
use crate::VulkanError;
use ash::vk;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Copy, Clone, Debug)]
pub struct AshQueue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

#[derive(Copy, Clone, Debug)]
pub struct DeviceQueues {
    pub graphics: AshQueue,
    pub present: AshQueue,
    pub compute: AshQueue,
    pub transfer: AshQueue,
}

impl DeviceQueues {
    /// Families that touch resources written on one queue and read on the other.
    pub fn graphics_and_compute(&self) -> [u32; 2] {
        [self.graphics.family_index, self.compute.family_index]
    }
}

pub struct AshDevice {
    pub instance: Arc<AshInstance>,
    pub physical: vk::PhysicalDevice,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queues: DeviceQueues,
    pub core: ash::Device,
    pub swapchain: ash::extensions::khr::Swapchain,
    pub allocator: ManuallyDrop<Mutex<gpu_allocator::vulkan::Allocator>>,
}

impl AshDevice {
    pub fn new(
        instance: Arc<AshInstance>,
        physical_device: &PhysicalDevice,
    ) -> Result<Self, VulkanError> {
        let families = physical_device.queue_families;
        let (Some(graphics), Some(present), Some(compute), Some(transfer)) = (
            families.graphics,
            families.present,
            families.compute,
            families.transfer,
        ) else {
            return Err(VulkanError::NoSuitableDevice);
        };

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique_families()
            .into_iter()
            .map(|family_index| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family_index)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let device_extension_names_raw = [ash::extensions::khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let core = unsafe {
            instance.core.create_device(
                physical_device.handle,
                &vk::DeviceCreateInfo::builder()
                    .queue_create_infos(&queue_create_infos)
                    .enabled_extension_names(&device_extension_names_raw)
                    .enabled_features(&features),
                None,
            )
        }?;

        let queue = |family_index: u32| AshQueue {
            family_index,
            handle: unsafe { core.get_device_queue(family_index, 0) },
        };
        let queues = DeviceQueues {
            graphics: queue(graphics),
            present: queue(present),
            compute: queue(compute),
            transfer: queue(transfer),
        };

        let swapchain = ash::extensions::khr::Swapchain::new(&instance.core, &core);

        let allocator = match gpu_allocator::vulkan::Allocator::new(
            &gpu_allocator::vulkan::AllocatorCreateDesc {
                instance: instance.core.clone(),
                device: core.clone(),
                physical_device: physical_device.handle,
                debug_settings: gpu_allocator::AllocatorDebugSettings::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            },
        ) {
            Ok(allocator) => allocator,
            Err(err) => {
                unsafe { core.destroy_device(None) };
                return Err(err.into());
            }
        };

        info!(
            "Created logical device: graphics {} present {} compute {} transfer {}",
            graphics, present, compute, transfer
        );

        Ok(Self {
            instance,
            physical: physical_device.handle,
            memory_properties: physical_device.memory_properties,
            queues,
            core,
            swapchain,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
        })
    }

    pub fn set_object_name<T: vk::Handle>(&self, object: T, name: &str) {
        if let Some(debug_utils) = &self.instance.debug_utils {
            debug_utils.set_object_name(self.core.handle(), object, name);
        }
    }

    pub(crate) fn allocator(&self) -> MutexGuard<'_, gpu_allocator::vulkan::Allocator> {
        self.allocator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn wait_idle(&self) -> Result<(), VulkanError> {
        unsafe { self.core.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.core.destroy_device(None);
        }
    }
}
