//! Physical device selection and logical device creation.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::CStr;

/// Queue family indices for graphics and presentation.
///
/// The two capabilities may live on the same family or on different ones;
/// each index is tracked separately so that index 0 is never conflated with
/// "not found".
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    /// First family supporting graphics operations.
    pub graphics: Option<u32>,
    /// First family able to present to the target surface.
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Whether both required families were found.
    pub const fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

/// Plain-data snapshot of everything device scoring looks at.
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub has_geometry_shader: bool,
    pub queues_complete: bool,
    pub extensions_supported: bool,
    pub has_surface_formats: bool,
    pub has_present_modes: bool,
}

/// Score a device for selection. Zero means unusable.
///
/// Discrete GPUs get a large head start; the maximum 2D image dimension acts
/// as a rough capability tiebreaker among devices of the same type.
pub fn score_device(profile: &DeviceProfile) -> u32 {
    if !profile.has_geometry_shader
        || !profile.queues_complete
        || !profile.extensions_supported
        || !profile.has_surface_formats
        || !profile.has_present_modes
    {
        return 0;
    }

    let mut score = 0;
    if profile.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score += profile.max_image_dimension_2d;

    score
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Find queue families supporting graphics and present-to-surface.
///
/// Scans families in index order, keeping the first match for each
/// capability, and stops as soon as both are found.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilyIndices> {
    let families = instance.get_physical_device_queue_family_properties(physical_device);

    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i);
        }

        if indices.present.is_none()
            && surface_loader.get_physical_device_surface_support(physical_device, i, surface)?
        {
            indices.present = Some(i);
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// Check that a device supports all required extensions.
///
/// # Safety
/// All handles must be valid.
unsafe fn check_device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<bool> {
    let available = instance.enumerate_device_extension_properties(physical_device)?;

    Ok(required_device_extensions().iter().all(|ext| {
        available.iter().any(|props| {
            let name = CStr::from_ptr(props.extension_name.as_ptr());
            name == *ext
        })
    }))
}

/// Query the scoring profile for one physical device.
///
/// # Safety
/// All handles must be valid.
unsafe fn query_device_profile(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(DeviceProfile, QueueFamilyIndices)> {
    let properties = instance.get_physical_device_properties(physical_device);
    let features = instance.get_physical_device_features(physical_device);

    let indices = find_queue_families(instance, physical_device, surface_loader, surface)?;
    let extensions_supported = check_device_extensions(instance, physical_device)?;

    // Only query surface support once the swapchain extension is known to
    // exist; the queries are meaningless without it.
    let (has_surface_formats, has_present_modes) = if extensions_supported {
        let formats = surface_loader
            .get_physical_device_surface_formats(physical_device, surface)?;
        let present_modes = surface_loader
            .get_physical_device_surface_present_modes(physical_device, surface)?;
        (!formats.is_empty(), !present_modes.is_empty())
    } else {
        (false, false)
    };

    let profile = DeviceProfile {
        device_type: properties.device_type,
        max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        has_geometry_shader: features.geometry_shader == vk::TRUE,
        queues_complete: indices.is_complete(),
        extensions_supported,
        has_surface_formats,
        has_present_modes,
    };

    Ok((profile, indices))
}

/// Select the highest-scoring physical device that can present to `surface`.
///
/// Ties keep the first device enumerated. Fails with
/// [`GpuError::NoSuitableDevice`] if no device scores above zero.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = instance.enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut best: Option<(vk::PhysicalDevice, QueueFamilyIndices)> = None;
    let mut best_score = 0u32;

    for device in devices {
        let (profile, indices) = query_device_profile(instance, device, surface_loader, surface)?;
        let score = score_device(&profile);

        let properties = instance.get_physical_device_properties(device);
        let name = CStr::from_ptr(properties.device_name.as_ptr());
        tracing::debug!("Device {:?} scored {}", name, score);

        if score > best_score {
            best = Some((device, indices));
            best_score = score;
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

/// Create the logical device and retrieve the graphics and present queues.
///
/// # Safety
/// All handles must be valid and the indices must be complete.
pub unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    indices: QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let graphics = indices.graphics.ok_or(GpuError::NoSuitableDevice)?;
    let present = indices.present.ok_or(GpuError::NoSuitableDevice)?;

    let mut unique_families = std::collections::HashSet::new();
    unique_families.insert(graphics);
    unique_families.insert(present);

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions = required_device_extensions();
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance.create_device(physical_device, &device_create_info, None)?;

    let graphics_queue = device.get_device_queue(graphics, 0);
    let present_queue = device.get_device_queue(present, 0);

    Ok((device, graphics_queue, present_queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usable_profile() -> DeviceProfile {
        DeviceProfile {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            max_image_dimension_2d: 16384,
            has_geometry_shader: true,
            queues_complete: true,
            extensions_supported: true,
            has_surface_formats: true,
            has_present_modes: true,
        }
    }

    #[test]
    fn discrete_gpu_outscores_integrated() {
        let discrete = usable_profile();
        let integrated = DeviceProfile {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..usable_profile()
        };

        assert_eq!(score_device(&discrete), 1000 + 16384);
        assert_eq!(score_device(&integrated), 16384);
        assert!(score_device(&discrete) > score_device(&integrated));
    }

    #[test]
    fn missing_geometry_shader_is_unusable() {
        let profile = DeviceProfile {
            has_geometry_shader: false,
            ..usable_profile()
        };

        // A discrete GPU with a huge image limit still scores zero.
        assert_eq!(score_device(&profile), 0);
    }

    #[test]
    fn incomplete_queues_are_unusable() {
        let profile = DeviceProfile {
            queues_complete: false,
            ..usable_profile()
        };
        assert_eq!(score_device(&profile), 0);
    }

    #[test]
    fn missing_extensions_are_unusable() {
        let profile = DeviceProfile {
            extensions_supported: false,
            ..usable_profile()
        };
        assert_eq!(score_device(&profile), 0);
    }

    #[test]
    fn empty_surface_lists_are_unusable() {
        let no_formats = DeviceProfile {
            has_surface_formats: false,
            ..usable_profile()
        };
        let no_modes = DeviceProfile {
            has_present_modes: false,
            ..usable_profile()
        };
        assert_eq!(score_device(&no_formats), 0);
        assert_eq!(score_device(&no_modes), 0);
    }

    #[test]
    fn queue_indices_completeness() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());

        // Family index 0 is a valid answer, not a sentinel.
        indices.graphics = Some(0);
        assert!(!indices.is_complete());

        indices.present = Some(0);
        assert!(indices.is_complete());
    }
}
