//! Swapchain management.

use crate::device::QueueFamilyIndices;
use crate::error::{GpuError, Result};
use ash::vk;

/// Outcome of an image acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAcquire {
    /// An image was acquired. `suboptimal` means the swapchain still works
    /// but no longer matches the surface exactly.
    Acquired { index: u32, suboptimal: bool },
    /// The swapchain is stale; nothing was acquired and the caller must
    /// rebuild before rendering.
    OutOfDate,
}

/// Swapchain wrapper.
///
/// `images` are owned by the presentation engine; `image_views` are
/// app-owned, one per image, index-aligned.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain and its image views.
    ///
    /// If graphics and present live on different queue families the images
    /// are created with concurrent sharing across both; a single family
    /// gets exclusive sharing, which avoids ownership transfers.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        indices: QueueFamilyIndices,
    ) -> Result<Self> {
        let image_count = select_image_count(capabilities);

        let graphics = indices.graphics.ok_or(GpuError::NoSuitableDevice)?;
        let present = indices.present.ok_or(GpuError::NoSuitableDevice)?;
        let queue_families = [graphics, present];

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        create_info = if graphics == present {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        };

        let swapchain = swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        // The driver may hand back more images than requested; the actual
        // count is re-queried and fixes the view/framebuffer count for the
        // lifetime of this swapchain.
        let images = swapchain_loader.get_swapchain_images(swapchain)?;

        let image_views: Vec<_> = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                device.create_image_view(&view_info, None)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug_assert_eq!(images.len(), image_views.len());

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Acquire the next presentable image.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<ImageAcquire> {
        let result = swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((index, suboptimal)) => Ok(ImageAcquire::Acquired { index, suboptimal }),
            // No image was acquired; the semaphore is untouched and the
            // caller must recreate the swapchain before trying again.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(ImageAcquire::OutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present an image. Returns `true` if the swapchain is stale
    /// (suboptimal or out-of-date) and should be rebuilt.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = swapchain_loader.queue_present(queue, &present_info);

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Destroy the swapchain and its image views.
    ///
    /// # Safety
    /// All handles must be valid and the swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

/// Select the surface format: 8-bit BGRA with sRGB nonlinear color space
/// when available, otherwise the first supported entry.
///
/// The fallback is arbitrary; callers must not assume it matches the
/// preferred format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for format in available {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            return *format;
        }
    }

    available[0]
}

/// Select the present mode: mailbox (low-latency triple buffering) when
/// available, otherwise FIFO, which the platform is required to support.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    for &mode in available {
        if mode == vk::PresentModeKHR::MAILBOX {
            return mode;
        }
    }

    vk::PresentModeKHR::FIFO
}

/// Calculate the swapchain extent.
///
/// A `current_extent.width` of `u32::MAX` means the surface lets the
/// swapchain pick; the window's framebuffer size is then clamped into the
/// capability bounds. Otherwise the platform has already fixed the extent.
pub fn select_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_width: u32,
    framebuffer_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: framebuffer_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Select the number of swapchain images to request.
///
/// One more than the minimum avoids blocking on the driver, clamped to the
/// declared maximum. A maximum of zero means unbounded.
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }

    image_count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(f: vk::Format, cs: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: f,
            color_space: cs,
        }
    }

    fn capabilities(
        min_count: u32,
        max_count: u32,
        current: (u32, u32),
        min_extent: (u32, u32),
        max_extent: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min_extent.0,
                height: min_extent.1,
            },
            max_image_extent: vk::Extent2D {
                width: max_extent.0,
                height: max_extent.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn format_prefers_bgra_srgb() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = select_surface_format(&available);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_requires_matching_color_space() {
        // Right format, wrong color space: not the preferred pair.
        let available = [
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::BT709_LINEAR_EXT),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = select_surface_format(&available);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::BT709_LINEAR_EXT);
    }

    #[test]
    fn format_falls_back_to_first_entry() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = select_surface_format(&available);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let available = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(select_present_mode(&available), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(select_present_mode(&available), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn present_mode_total_on_empty_input() {
        assert_eq!(select_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_current_when_fixed() {
        let caps = capabilities(2, 0, (800, 600), (1, 1), (4096, 4096));

        // The window size is ignored when the platform fixed the extent.
        let extent = select_extent(&caps, 1920, 1080);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn extent_clamps_framebuffer_size_on_sentinel() {
        let caps = capabilities(2, 0, (u32::MAX, u32::MAX), (1, 1), (4096, 4096));

        let extent = select_extent(&caps, 1024, 768);
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 768);

        let oversized = select_extent(&caps, 10_000, 10_000);
        assert_eq!(oversized.width, 4096);
        assert_eq!(oversized.height, 4096);

        let undersized = select_extent(&caps, 0, 0);
        assert_eq!(undersized.width, 1);
        assert_eq!(undersized.height, 1);
    }

    #[test]
    fn image_count_requests_one_extra() {
        let caps = capabilities(2, 8, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(select_image_count(&caps), 3);
    }

    #[test]
    fn image_count_respects_max_bound() {
        // min == max == 2: the +1 heuristic must not push past the maximum.
        let caps = capabilities(2, 2, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(select_image_count(&caps), 2);
    }

    #[test]
    fn image_count_unbounded_when_max_is_zero() {
        let caps = capabilities(3, 0, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(select_image_count(&caps), 4);
    }
}
