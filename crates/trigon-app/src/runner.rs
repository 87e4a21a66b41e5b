//! Application runner and event loop.

use std::sync::Arc;

use ash::vk;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trigon_gpu::command::submit_command_buffers;
use trigon_gpu::swapchain::ImageAcquire;
use trigon_gpu::sync::{reset_fence, wait_for_fence};
use trigon_gpu::GpuContextBuilder;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::context::{next_frame_index, RenderContext};

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Vertex shader SPIR-V words.
    pub vertex_shader: Vec<u32>,
    /// Fragment shader SPIR-V words.
    pub fragment_shader: Vec<u32>,
}

impl AppConfig {
    /// Create a new config with the given title and shader pair.
    pub fn new(title: impl Into<String>, vertex_shader: Vec<u32>, fragment_shader: Vec<u32>) -> Self {
        Self {
            title: title.into(),
            width: 800,
            height: 600,
            validation: cfg!(debug_assertions),
            vertex_shader,
            fragment_shader,
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Tracks whether the swapchain must be rebuilt before the next frame.
///
/// Staleness signals (out-of-date acquire, suboptimal present) and window
/// resizes both funnel into this flag; the render loop consumes it
/// synchronously at the top of each iteration instead of reacting inside
/// event callbacks.
#[derive(Debug, Default)]
pub(crate) struct SwapchainHealth {
    stale: bool,
    resize_pending: bool,
}

impl SwapchainHealth {
    /// Record a staleness signal from acquire or present.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Record a window resize event.
    pub fn record_resize(&mut self) {
        self.resize_pending = true;
    }

    /// Whether a rebuild must run before rendering the next frame.
    pub fn needs_rebuild(&self) -> bool {
        self.stale || self.resize_pending
    }

    /// Clear after a successful rebuild.
    pub fn clear(&mut self) {
        self.stale = false;
        self.resize_pending = false;
    }
}

/// Run the renderer with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and drives the
/// event loop until the window is closed. Startup failures propagate out;
/// per-frame failures after startup are logged and retried.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        state: None,
    };

    event_loop.run_app(&mut runner)?;

    Ok(())
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner {
    config: AppConfig,
    state: Option<AppState>,
}

/// Internal application state.
struct AppState {
    ctx: RenderContext,
    health: SwapchainHealth,
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Renderer ready");
            }
            Err(e) => {
                error!("Failed to initialize renderer: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e:#}");
                    }
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(_) => {
                // Only record the event; the rebuild happens synchronously
                // inside the render loop.
                if let Some(state) = &mut self.state {
                    state.health.record_resize();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl AppRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        // SAFETY: The window outlives the surface; both live in AppState
        let (gpu, surface) = unsafe {
            GpuContextBuilder::new()
                .app_name(&self.config.title)
                .validation(self.config.validation)
                .build(window.as_ref())?
        };

        // SAFETY: GPU and surface belong to this window
        let ctx = unsafe {
            RenderContext::new(
                window,
                gpu,
                surface,
                &self.config.vertex_shader,
                &self.config.fragment_shader,
            )?
        };

        Ok(AppState {
            ctx,
            health: SwapchainHealth::default(),
        })
    }
}

impl AppState {
    /// Render one frame: wait on the slot fence, acquire, record, submit,
    /// present, then advance the frame index.
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let size = self.ctx.window.inner_size();
        if size.width == 0 || size.height == 0 {
            // Minimized: keep polling events without rendering. A pending
            // rebuild waits here too; a zero-sized swapchain is never built.
            return Ok(());
        }

        if self.health.needs_rebuild() {
            self.ctx.rebuild_swapchain(size.width, size.height)?;
            self.health.clear();
        }

        let device = self.ctx.gpu.device();
        let slot = &self.ctx.frames[self.ctx.current_frame];
        let image_available = slot.sync.image_available;
        let render_finished = slot.sync.render_finished;
        let in_flight = slot.sync.in_flight;
        let command_buffer = slot.command_buffer;

        // Backpressure: block until the GPU finished the previous use of
        // this slot's resources.
        unsafe {
            wait_for_fence(device, in_flight, u64::MAX)?;
        }

        let acquired = unsafe {
            self.ctx.swapchain.acquire(
                &self.ctx.surface.swapchain_loader,
                image_available,
                u64::MAX,
            )?
        };

        let image_index = match acquired {
            ImageAcquire::OutOfDate => {
                // Nothing was acquired; never submit or present against a
                // stale swapchain. The fence stays signaled for the retry.
                self.health.mark_stale();
                return Ok(());
            }
            ImageAcquire::Acquired { index, suboptimal } => {
                if suboptimal {
                    self.health.mark_stale();
                }
                index
            }
        };

        unsafe {
            // Reset only after a successful acquire so the skip path above
            // leaves the slot reusable.
            reset_fence(device, in_flight)?;

            self.record_commands(command_buffer, image_index)?;

            let wait_semaphores = [image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [render_finished];
            let command_buffers = [command_buffer];
            submit_command_buffers(
                device,
                self.ctx.gpu.graphics_queue(),
                &command_buffers,
                &wait_semaphores,
                &wait_stages,
                &signal_semaphores,
                in_flight,
            )?;

            let stale = self.ctx.swapchain.present(
                &self.ctx.surface.swapchain_loader,
                self.ctx.gpu.present_queue(),
                image_index,
                &signal_semaphores,
            )?;
            if stale {
                self.health.mark_stale();
            }
        }

        self.ctx.current_frame = next_frame_index(self.ctx.current_frame, self.ctx.frames.len());
        self.ctx.frame_count += 1;

        Ok(())
    }

    /// Record the triangle pass into a command buffer.
    ///
    /// # Safety
    /// The command buffer's slot fence must have signaled.
    unsafe fn record_commands(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> anyhow::Result<()> {
        let device = self.ctx.gpu.device();
        let extent = self.ctx.extent();

        // SAFETY: The slot fence gated reuse of this buffer
        unsafe {
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(command_buffer, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            }];
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.ctx.render_pass)
                .framebuffer(self.ctx.framebuffers.get(image_index))
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );

            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.ctx.pipeline.pipeline,
            );

            // Viewport and scissor are dynamic so the pipeline survives
            // swapchain rebuilds.
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);

            device.cmd_draw(command_buffer, 3, 1, 0, 0);

            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer)?;
        }

        Ok(())
    }

    fn shutdown(&mut self) {
        if self.ctx.frame_count > 0 {
            info!("Rendered {} frames", self.ctx.frame_count);
        }

        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // SAFETY: Device is idle
        unsafe {
            self.ctx.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_starts_clean() {
        let health = SwapchainHealth::default();
        assert!(!health.needs_rebuild());
    }

    #[test]
    fn stale_signal_requires_rebuild() {
        let mut health = SwapchainHealth::default();
        health.mark_stale();
        assert!(health.needs_rebuild());

        health.clear();
        assert!(!health.needs_rebuild());
    }

    #[test]
    fn resize_requires_rebuild() {
        let mut health = SwapchainHealth::default();
        health.record_resize();
        assert!(health.needs_rebuild());
    }

    // Ten iterations, one resize injected at iteration 5: the loop must
    // rebuild exactly once while the frame cursor keeps cycling.
    #[test]
    fn single_resize_triggers_single_rebuild() {
        let mut health = SwapchainHealth::default();
        let mut current_frame = 0;
        let mut frame_trace = Vec::new();
        let mut rebuilds = 0;

        for iteration in 0..10 {
            if iteration == 5 {
                health.record_resize();
            }

            if health.needs_rebuild() {
                rebuilds += 1;
                health.clear();
            }

            frame_trace.push(current_frame);
            current_frame = next_frame_index(current_frame, 2);
        }

        assert_eq!(rebuilds, 1);
        assert_eq!(frame_trace, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn no_rebuild_without_signal() {
        let mut health = SwapchainHealth::default();
        let mut rebuilds = 0;

        for _ in 0..10 {
            if health.needs_rebuild() {
                rebuilds += 1;
                health.clear();
            }
        }

        assert_eq!(rebuilds, 0);
    }
}
