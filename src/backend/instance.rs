// Vulkan instance bootstrap
//
// Responsibilities:
// - Loading the Vulkan library
// - Instance creation with the window system's surface extensions
// - Validation layers + debug messenger (debug builds only)

use super::error::{RenderError, RenderResult};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

const ENGINE_NAME: &CStr = c"Vortex Engine";
const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

/// The API context: loader entry, instance and optional diagnostics channel.
///
/// Created first and destroyed last.
#[derive(Clone)]
pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `display` - Display handle of the window the renderer will present to
    /// * `enable_validation` - Enable Khronos validation and route its messages into `log`
    pub fn new(
        app_name: &str,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> RenderResult<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        if enable_validation && !Self::validation_layers_supported(&entry)? {
            return Err(RenderError::Unsupported(
                "validation layers requested but not available".into(),
            ));
        }

        let app_name = CString::new(app_name)
            .map_err(|_| RenderError::Unsupported("application name contains a NUL byte".into()))?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for whatever platform the window lives on
        let mut extensions = ash_window::enumerate_required_extensions(display)
            .map_err(RenderError::init("instance extension list"))?
            .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = layer_names(enable_validation);

        // Chained into the create info so instance creation and destruction
        // are covered by validation too
        let mut instance_messenger_info = messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if enable_validation {
            create_info = create_info.push_next(&mut instance_messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(RenderError::init("instance"))?;

        let debug_utils = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = unsafe {
                debug_utils.create_debug_utils_messenger(&messenger_create_info(), None)
            }
            .map_err(RenderError::init("debug messenger"))?;
            log::debug!("Validation layers enabled");
            Some((debug_utils, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn validation_layers_supported(entry: &Entry) -> RenderResult<bool> {
        #[allow(unused_unsafe)]
        let available = unsafe { entry.enumerate_instance_layer_properties() }
            .map_err(RenderError::init("instance layer list"))?;

        Ok(VALIDATION_LAYERS.iter().all(|wanted| {
            available.iter().any(|layer| {
                let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                name == *wanted
            })
        }))
    }

    /// Destroys the debug messenger and then the instance.
    ///
    /// # Safety
    /// Every object created from this instance must already be destroyed.
    pub unsafe fn destroy(&mut self) {
        if let Some((debug_utils, messenger)) = self.debug_utils.take() {
            debug_utils.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}

fn layer_names(enable_validation: bool) -> Vec<*const c_char> {
    if enable_validation {
        VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
    } else {
        Vec::new()
    }
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[Vulkan] {}", message),
        _ => log::trace!("[Vulkan] {}", message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_only_requested_with_validation() {
        assert!(layer_names(false).is_empty());
        assert_eq!(layer_names(true).len(), VALIDATION_LAYERS.len());
    }

    #[test]
    fn messenger_covers_warnings_and_errors() {
        let info = messenger_create_info();
        let wanted = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
        assert!(info.message_severity.contains(wanted));
        assert!(info.message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION));
        assert!(info.pfn_user_callback.is_some());
    }
}
