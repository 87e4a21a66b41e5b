//! GPU context management.

use crate::debug::DebugMessenger;
use crate::device::{create_device, select_physical_device, QueueFamilyIndices};
use crate::error::{GpuError, Result};
use crate::instance::create_instance;
use crate::surface::SurfaceContext;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    pub(crate) queue_families: QueueFamilyIndices,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the selected queue family indices.
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        // Selection guarantees completeness before device creation.
        self.queue_families.graphics.unwrap_or(0)
    }

    /// Wait for the device to be idle.
    ///
    /// A full stop-the-world barrier: used to gate swapchain teardown and
    /// final cleanup.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.device.destroy_device(None);
            if let Some(debug) = &self.debug {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "trigon".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context and the surface for a window.
    ///
    /// Device selection is surface-aware (present support is part of the
    /// suitability score), so the surface is created before a physical
    /// device is picked.
    ///
    /// # Safety
    /// The window must have valid display and window handles for the
    /// lifetime of the returned surface.
    pub unsafe fn build<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let entry = ash::Entry::load().map_err(|e| GpuError::LoadingFailed(e.to_string()))?;

        let instance = create_instance(&entry, &self.app_name, self.enable_validation)?;

        let debug = if self.enable_validation {
            Some(DebugMessenger::new(&entry, &instance)?)
        } else {
            None
        };

        let (surface, surface_loader) = SurfaceContext::create_surface(&entry, &instance, window)?;

        let (physical_device, queue_families) =
            select_physical_device(&instance, &surface_loader, surface)?;

        let properties = instance.get_physical_device_properties(physical_device);
        let name = std::ffi::CStr::from_ptr(properties.device_name.as_ptr());
        tracing::info!("Selected GPU: {}", name.to_string_lossy());

        let (device, graphics_queue, present_queue) =
            create_device(&instance, physical_device, queue_families)?;

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let surface_ctx = SurfaceContext {
            surface,
            surface_loader,
            swapchain_loader,
        };

        let gpu = GpuContext {
            entry,
            instance,
            debug,
            physical_device,
            device,
            queue_families,
            graphics_queue,
            present_queue,
        };

        Ok((gpu, surface_ctx))
    }
}
