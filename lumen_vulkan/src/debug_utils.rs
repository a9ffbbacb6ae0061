use ash::vk;
use std::ffi::{CStr, CString};

pub struct DebugUtils {
    loader: ash::extensions::ext::DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugUtils {
    pub(crate) fn new(entry: &ash::Entry, instance: &ash::Instance) -> ash::prelude::VkResult<Self> {
        let loader = ash::extensions::ext::DebugUtils::new(entry, instance);
        let messenger = unsafe {
            loader.create_debug_utils_messenger(
                &vk::DebugUtilsMessengerCreateInfoEXT::builder()
                    .message_severity(
                        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                            | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                    )
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(vulkan_debug_callback)),
                None,
            )?
        };

        Ok(Self { loader, messenger })
    }

    pub(crate) fn set_object_name<T: vk::Handle>(&self, device: vk::Device, object: T, name: &str) {
        let Ok(name) = CString::new(name) else {
            return;
        };

        let result = unsafe {
            self.loader.set_debug_utils_object_name(
                device,
                &vk::DebugUtilsObjectNameInfoEXT::builder()
                    .object_type(T::TYPE)
                    .object_handle(object.as_raw())
                    .object_name(name.as_c_str()),
            )
        };

        if let Err(err) = result {
            warn!("Failed to name {:?} object: {}", T::TYPE, err);
        }
    }

    pub(crate) fn cmd_begin_label(
        &self,
        command_buffer: vk::CommandBuffer,
        label_name: &str,
        label_color: [f32; 4],
    ) {
        let Ok(label_name) = CString::new(label_name) else {
            return;
        };

        unsafe {
            self.loader.cmd_begin_debug_utils_label(
                command_buffer,
                &vk::DebugUtilsLabelEXT::builder()
                    .label_name(label_name.as_c_str())
                    .color(label_color),
            );
        }
    }

    pub(crate) fn cmd_end_label(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.loader.cmd_end_debug_utils_label(command_buffer);
        }
    }
}

impl Drop for DebugUtils {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    use std::borrow::Cow;
    let callback_data = *p_callback_data;
    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => trace!("{}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => info!("{}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("{}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("{}", message),
        _ => info!("Unknown severity {:?}: {}", message_severity, message),
    }

    vk::FALSE
}
