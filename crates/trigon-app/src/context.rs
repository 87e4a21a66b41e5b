//! Render context: everything the frame loop touches.

use std::sync::Arc;

use ash::vk;
use trigon_gpu::command::CommandPool;
use trigon_gpu::pipeline::GraphicsPipeline;
use trigon_gpu::render_target::{create_render_pass, Framebuffers};
use trigon_gpu::swapchain::{
    select_extent, select_present_mode, select_surface_format, Swapchain,
};
use trigon_gpu::sync::FrameSync;
use trigon_gpu::{GpuContext, SurfaceContext};
use winit::window::Window;

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Advance the frame slot cursor, wrapping at the slot count.
pub const fn next_frame_index(current: usize, frames_in_flight: usize) -> usize {
    (current + 1) % frames_in_flight
}

/// Everything one frame slot owns.
///
/// Keeping the sync primitives and the command buffer in one aggregate,
/// indexed by the frame counter, rules out index-misalignment between
/// parallel arrays.
pub struct FrameSlot {
    /// Synchronization primitives for this slot.
    pub sync: FrameSync,
    /// Command buffer re-recorded each time the slot comes around.
    pub command_buffer: vk::CommandBuffer,
}

/// Render context shared across the frame loop.
pub struct RenderContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device and queues.
    pub gpu: GpuContext,
    /// Surface context for windowed rendering.
    pub surface: SurfaceContext,
    /// Current swapchain.
    pub swapchain: Swapchain,
    /// Surface format chosen at startup; fixed for the app lifetime so the
    /// render pass and pipeline survive swapchain rebuilds.
    surface_format: vk::SurfaceFormatKHR,
    /// Present mode chosen at startup.
    present_mode: vk::PresentModeKHR,
    /// The render pass shared by all framebuffers.
    pub render_pass: vk::RenderPass,
    /// Framebuffers, one per swapchain image.
    pub framebuffers: Framebuffers,
    /// The triangle pipeline.
    pub pipeline: GraphicsPipeline,
    /// Command pool the frame slots allocate from.
    pub command_pool: CommandPool,
    /// Frame slots, cycled by `current_frame`.
    pub frames: Vec<FrameSlot>,
    /// Index of the slot the next frame will use.
    pub current_frame: usize,
    /// Total frames rendered.
    pub frame_count: u64,
}

impl RenderContext {
    /// Create the full render context for a window.
    ///
    /// # Safety
    /// The window must have valid handles and the GPU/surface contexts must
    /// belong to it.
    pub unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        surface: SurfaceContext,
        vertex_shader: &[u32],
        fragment_shader: &[u32],
    ) -> anyhow::Result<Self> {
        let support = surface.query_support(gpu.physical_device())?;
        let surface_format = select_surface_format(&support.formats);
        let present_mode = select_present_mode(&support.present_modes);

        let size = window.inner_size();
        let extent = select_extent(&support.capabilities, size.width.max(1), size.height.max(1));

        // SAFETY: All handles are valid; queue families come from selection
        let swapchain = unsafe {
            Swapchain::new(
                gpu.device(),
                &surface.swapchain_loader,
                surface.surface,
                &support.capabilities,
                surface_format,
                present_mode,
                extent,
                gpu.queue_families(),
            )?
        };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );

        // SAFETY: Device is valid
        let render_pass = unsafe { create_render_pass(gpu.device(), swapchain.format)? };

        // SAFETY: Render pass and image views are valid
        let framebuffers = unsafe {
            Framebuffers::new(
                gpu.device(),
                render_pass,
                &swapchain.image_views,
                swapchain.extent,
            )?
        };

        // SAFETY: Device and render pass are valid, shaders are SPIR-V
        let pipeline = unsafe {
            GraphicsPipeline::new(gpu.device(), render_pass, vertex_shader, fragment_shader)?
        };

        // SAFETY: Device is valid and the graphics family exists
        let command_pool = unsafe {
            CommandPool::new(
                gpu.device(),
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };

        // SAFETY: Device and command pool are valid
        let command_buffers = unsafe {
            command_pool.allocate_command_buffers(gpu.device(), FRAMES_IN_FLIGHT as u32)?
        };

        let mut frames = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for command_buffer in command_buffers {
            frames.push(FrameSlot {
                // SAFETY: Device is valid
                sync: unsafe { FrameSync::new(gpu.device())? },
                command_buffer,
            });
        }

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            surface_format,
            present_mode,
            render_pass,
            framebuffers,
            pipeline,
            command_pool,
            frames,
            current_frame: 0,
            frame_count: 0,
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Rebuild the swapchain and everything bound to its images.
    ///
    /// The device-idle wait gates the teardown: nothing may still reference
    /// the old image views when they are destroyed. The render pass and
    /// pipeline are kept because the surface format is fixed at startup.
    ///
    /// Errors here are retryable: the surface may be mid-resize and valid
    /// again next frame, so the caller decides whether to abort.
    pub fn rebuild_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        debug_assert!(width > 0 && height > 0);

        self.gpu.wait_idle()?;

        // SAFETY: Device is idle, nothing references these anymore
        unsafe {
            self.framebuffers.destroy(self.gpu.device());
            self.swapchain
                .destroy(self.gpu.device(), &self.surface.swapchain_loader);
        }

        // The support snapshot is queried fresh: capabilities change with
        // the window.
        let support = self.surface.query_support(self.gpu.physical_device())?;
        let extent = select_extent(&support.capabilities, width, height);

        // SAFETY: All handles are valid
        self.swapchain = unsafe {
            Swapchain::new(
                self.gpu.device(),
                &self.surface.swapchain_loader,
                self.surface.surface,
                &support.capabilities,
                self.surface_format,
                self.present_mode,
                extent,
                self.gpu.queue_families(),
            )?
        };

        // SAFETY: The new image views are valid
        self.framebuffers = unsafe {
            Framebuffers::new(
                self.gpu.device(),
                self.render_pass,
                &self.swapchain.image_views,
                self.swapchain.extent,
            )?
        };

        tracing::debug!(
            "Swapchain rebuilt: {}x{} ({} images)",
            self.swapchain.extent.width,
            self.swapchain.extent.height,
            self.swapchain.images.len()
        );

        Ok(())
    }

    /// Tear down all GPU resources.
    ///
    /// # Safety
    /// The GPU must be idle and no resource may still be in use.
    pub unsafe fn cleanup(&mut self) {
        let device = self.gpu.device();

        // SAFETY: Caller guarantees the GPU is idle
        unsafe {
            for frame in &self.frames {
                frame.sync.destroy(device);
            }
            self.frames.clear();

            self.pipeline.destroy(device);
            self.framebuffers.destroy(device);
            device.destroy_render_pass(self.render_pass, None);
            self.command_pool.destroy(device);

            self.swapchain
                .destroy(device, &self.surface.swapchain_loader);
            self.surface.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_cycles() {
        let mut index = 0;
        let mut trace = Vec::new();

        for _ in 0..6 {
            trace.push(index);
            index = next_frame_index(index, FRAMES_IN_FLIGHT);
        }

        assert_eq!(trace, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn frame_index_handles_other_slot_counts() {
        assert_eq!(next_frame_index(2, 3), 0);
        assert_eq!(next_frame_index(0, 1), 0);
    }
}
