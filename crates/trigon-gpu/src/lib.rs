//! Vulkan abstraction layer for the trigon renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Validation layer plumbing
//! - Swapchain handling and surface queries
//! - Render pass, framebuffer, and pipeline creation
//! - Command buffer and synchronization primitives

pub mod command;
pub mod context;
pub mod debug;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod render_target;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use context::{GpuContext, GpuContextBuilder};
pub use device::QueueFamilyIndices;
pub use error::{GpuError, Result};
pub use pipeline::GraphicsPipeline;
pub use render_target::{create_render_pass, Framebuffers};
pub use shader::load_spirv;
pub use surface::{SurfaceContext, SwapchainSupport};
pub use swapchain::{ImageAcquire, Swapchain};
pub use sync::{create_fence, create_semaphore, FrameSync};
