use crate::debug_utils::DebugUtils;
use crate::VulkanError;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER_NAME: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

pub struct AshInstance {
    pub entry: ash::Entry,
    pub core: ash::Instance,
    pub surface: ash::extensions::khr::Surface,
    pub debug_utils: Option<DebugUtils>,
}

impl AshInstance {
    pub fn new(
        app_name: &str,
        validation: bool,
        display_handle: RawDisplayHandle,
    ) -> Result<Self, VulkanError> {
        let app_name = CString::new(app_name).unwrap_or_default();
        let engine_name = CString::new("Lumen Vulkan Backend").unwrap_or_default();

        let entry = unsafe { ash::Entry::load() }?;

        let validation = validation && layer_available(&entry, VALIDATION_LAYER_NAME);
        let layer_names_raw = if validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            Vec::new()
        };

        let mut extension_names_raw =
            ash_window::enumerate_required_extensions(display_handle)?.to_vec();
        if validation {
            extension_names_raw.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name.as_c_str())
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let core = unsafe {
            entry.create_instance(
                &vk::InstanceCreateInfo::builder()
                    .application_info(&app_info)
                    .enabled_layer_names(&layer_names_raw)
                    .enabled_extension_names(&extension_names_raw),
                None,
            )
        }?;

        let debug_utils = if validation {
            match DebugUtils::new(&entry, &core) {
                Ok(debug_utils) => Some(debug_utils),
                Err(err) => {
                    warn!("Failed to create debug messenger: {}", err);
                    None
                }
            }
        } else {
            None
        };

        let surface = ash::extensions::khr::Surface::new(&entry, &core);

        info!(
            "Created vulkan instance (validation {})",
            if debug_utils.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            core,
            surface,
            debug_utils,
        })
    }
}

impl Drop for AshInstance {
    fn drop(&mut self) {
        self.debug_utils.take();
        unsafe {
            self.core.destroy_instance(None);
        }
    }
}

fn layer_available(entry: &ash::Entry, name: &CStr) -> bool {
    let layers = match entry.enumerate_instance_layer_properties() {
        Ok(layers) => layers,
        Err(err) => {
            warn!("Failed to enumerate instance layers: {}", err);
            return false;
        }
    };

    let found = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == name);

    if !found {
        warn!("{:?} requested but not installed", name);
    }
    found
}

/// Presentation surface, destroyed before the instance that created it.
pub struct Surface {
    pub instance: Arc<AshInstance>,
    pub handle: vk::SurfaceKHR,
}

impl Surface {
    pub fn new<W: HasRawWindowHandle + HasRawDisplayHandle>(
        instance: Arc<AshInstance>,
        window: &W,
    ) -> Result<Self, VulkanError> {
        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.core,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }?;

        Ok(Self { instance, handle })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance.surface.destroy_surface(self.handle, None);
        }
    }
}
