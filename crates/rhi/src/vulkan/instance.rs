//! Vulkan instance management.
//!
//! This module handles VkInstance creation, the optional validation layer
//! and its debug messenger, and adapter enumeration.
//!
//! # Example
//!
//! ```no_run
//! use fivemapper_rhi::backend::Instance as _;
//! use fivemapper_rhi::vulkan::VulkanInstance;
//!
//! // Headless instance with validation in debug builds
//! let instance = VulkanInstance::new(cfg!(debug_assertions), None)
//!     .expect("Failed to create Vulkan instance");
//! let adapters = instance.enumerate_adapters().expect("Failed to enumerate adapters");
//! ```

use std::ffi::CStr;
use std::sync::Arc;

use ash::{Entry, vk};
use raw_window_handle::RawDisplayHandle;
use tracing::{error, info, warn};

use super::adapter::VulkanAdapter;
use crate::backend::Instance;
use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance state shared by every object created from it.
pub(crate) struct InstanceShared {
    pub(crate) entry: Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            // Destroy debug messenger before instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Vulkan instance wrapper with optional validation layer support.
///
/// Devices and swapchains keep the underlying instance alive, so this value
/// may be dropped before them.
pub struct VulkanInstance {
    shared: Arc<InstanceShared>,
}

impl VulkanInstance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `enable_validation` - Enables the Khronos validation layer and routes
    ///   its messages to `tracing`, if the layer is installed
    /// * `display` - Display the instance will present to. `None` creates a
    ///   headless instance without surface extensions
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Required surface extensions are not available
    /// - Instance creation fails
    pub fn new(enable_validation: bool, display: Option<RawDisplayHandle>) -> RhiResult<Self> {
        // Load the Vulkan library
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"FiveMapper")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"FiveMapper")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = match display {
            Some(display) => ash_window::enumerate_required_extensions(display)?.to_vec(),
            None => Vec::new(),
        };
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API 1.3, {} extension(s))",
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => {
                    info!("Validation layers enabled");
                    (Some(debug_utils), Some(messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        Ok(Self {
            shared: Arc::new(InstanceShared {
                entry,
                instance,
                surface_loader,
                debug_utils,
                debug_messenger,
            }),
        })
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.shared.debug_messenger.is_some()
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.shared.instance
    }

    /// Checks if the Khronos validation layer is available.
    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let found = available_layers.iter().any(|layer| {
            let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            layer_name == VALIDATION_LAYER_NAME
        });

        Ok(found)
    }

    /// Sets up the debug messenger for validation layer callbacks.
    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

        Ok(messenger)
    }
}

impl Instance for VulkanInstance {
    type Adapter = VulkanAdapter;

    fn enumerate_adapters(&self) -> RhiResult<Vec<VulkanAdapter>> {
        let devices = unsafe { self.shared.instance.enumerate_physical_devices()? };
        Ok(devices
            .into_iter()
            .map(|device| VulkanAdapter::new(self.shared.clone(), device))
            .collect())
    }
}

/// Debug callback function for validation layer messages.
///
/// # Safety
///
/// This function is called from the Vulkan driver and must follow the
/// Vulkan specification for debug callbacks.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
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

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            info!("[Vulkan {}] {}", type_str, message);
        }
    }

    vk::FALSE
}
