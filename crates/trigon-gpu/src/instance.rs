//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

/// Required instance extensions for windowed rendering.
pub fn required_instance_extensions(enable_validation: bool) -> Vec<&'static CStr> {
    let mut extensions = vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ];

    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME);
    }

    extensions
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// Fails with [`GpuError::MissingValidationLayer`] if validation was requested
/// but the layer is not installed, and with [`GpuError::ExtensionNotSupported`]
/// if a required surface extension is absent.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name).unwrap_or_default();

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"trigon")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let extensions = required_instance_extensions(enable_validation);
    check_extension_support(entry, &extensions)?;
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let layers = if enable_validation {
        let layers = validation_layers();
        check_layer_support(entry, &layers)?;
        layers
    } else {
        vec![]
    };
    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}

/// Check that all required instance extensions are present.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
unsafe fn check_extension_support(entry: &ash::Entry, required: &[&CStr]) -> Result<()> {
    let available = entry.enumerate_instance_extension_properties(None)?;

    for ext in required {
        let found = available.iter().any(|props| {
            let name = CStr::from_ptr(props.extension_name.as_ptr());
            name == *ext
        });
        if !found {
            return Err(GpuError::ExtensionNotSupported(
                ext.to_string_lossy().into_owned(),
            ));
        }
    }

    Ok(())
}

/// Check that all requested layers are installed.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
unsafe fn check_layer_support(entry: &ash::Entry, requested: &[&CStr]) -> Result<()> {
    let available = entry.enumerate_instance_layer_properties()?;

    for layer in requested {
        let found = available.iter().any(|props| {
            let name = CStr::from_ptr(props.layer_name.as_ptr());
            name == *layer
        });
        if !found {
            return Err(GpuError::MissingValidationLayer(
                layer.to_string_lossy().into_owned(),
            ));
        }
    }

    Ok(())
}
