//! Vulkan instance management.
//!
//! Creates the `VkInstance` after checking that every extension the window
//! system needs is present, enables the Khronos validation layer when asked
//! and available, and routes validation messages into `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use minivk_rhi::instance::Instance;
//!
//! # fn example(window_extensions: &[*const std::ffi::c_char]) -> Result<(), minivk_rhi::RhiError> {
//! let instance = Instance::new("minivk", window_extensions, cfg!(debug_assertions))?;
//! let _vk_instance = instance.handle();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the loader entry, the instance and the optional debug messenger.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates the instance.
    ///
    /// `required_extensions` are the surface extensions reported by the
    /// window system. Each must be offered by the loader.
    ///
    /// # Errors
    ///
    /// - [`RhiError::LoadingError`] when no Vulkan loader is installed
    /// - [`RhiError::MissingExtension`] when a required extension is absent
    /// - [`RhiError::VulkanError`] when instance creation fails
    pub fn new(
        app_name: &str,
        required_extensions: &[*const c_char],
        enable_validation: bool,
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let layers = unsafe { entry.enumerate_instance_layer_properties()? };
        debug!("Instance layer count = {}", layers.len());
        let validation_available = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME));
        let use_validation = enable_validation && validation_available;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
        debug!("Instance extension count = {}", available.len());
        let available_names: Vec<&CStr> = available
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();

        let mut extensions = Vec::with_capacity(required_extensions.len() + 1);
        for &name in required_extensions {
            let name = unsafe { CStr::from_ptr(name) };
            check_extension(&available_names, name)?;
            extensions.push(name.as_ptr());
        }

        let debug_utils_available = available_names.contains(&ash::ext::debug_utils::NAME);
        let use_debug_utils = use_validation && debug_utils_available;
        if use_debug_utils {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_name = CString::new(app_name)
            .map_err(|e| RhiError::SurfaceError(format!("Invalid application name: {}", e)))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let layer_names = if use_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan instance created ({} extension(s), validation: {})",
            extensions.len(),
            use_validation
        );

        let (debug_utils, debug_messenger) = if use_debug_utils {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            };
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// True when the debug messenger is installed.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        info!("Debug messenger created");
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

fn check_extension(available: &[&CStr], name: &CStr) -> RhiResult<()> {
    if available.contains(&name) {
        debug!("Found instance extension {:?}", name);
        Ok(())
    } else {
        Err(RhiError::MissingExtension(name.to_string_lossy().into_owned()))
    }
}

/// Short label for the message type bits of a debug message.
fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL) {
        "General"
    } else {
        "Unknown"
    }
}

/// Forwards validation layer messages to `tracing` at the matching level.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid callback data pointer or null.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };
    let kind = message_type_label(message_type);

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[Vulkan {}] {}", kind, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[Vulkan {}] {}", kind, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!("[Vulkan {}] {}", kind, message);
    } else {
        debug!("[Vulkan {}] {}", kind, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_creation_without_validation() {
        let extensions = [ash::khr::surface::NAME.as_ptr()];
        match Instance::new("minivk-test", &extensions, false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) | Err(RhiError::MissingExtension(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_unknown_extension_is_reported() {
        let extensions = [c"VK_MINIVK_not_a_real_extension".as_ptr()];
        match Instance::new("minivk-test", &extensions, false) {
            Err(RhiError::MissingExtension(name)) => {
                assert_eq!(name, "VK_MINIVK_not_a_real_extension");
            }
            Err(RhiError::LoadingError(_)) => eprintln!("Skipping test: Vulkan not available"),
            Err(e) => panic!("Unexpected error: {:?}", e),
            Ok(_) => panic!("instance created with a bogus extension"),
        }
    }

    #[test]
    fn test_check_extension() {
        let available = [ash::khr::surface::NAME, ash::ext::debug_utils::NAME];
        assert!(check_extension(&available, ash::khr::surface::NAME).is_ok());
        assert!(matches!(
            check_extension(&available, ash::khr::xcb_surface::NAME),
            Err(RhiError::MissingExtension(name)) if name == "VK_KHR_xcb_surface"
        ));
    }

    #[test]
    fn test_message_type_label() {
        assert_eq!(
            message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "Validation"
        );
        assert_eq!(
            message_type_label(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            ),
            "Performance"
        );
        assert_eq!(
            message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::empty()),
            "Unknown"
        );
    }
}
