//! trigon viewer
//!
//! Opens a window and renders a triangle through the swapchain with two
//! frames in flight.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p trigon-viewer
//! ```
//!
//! Shaders are loaded as prebuilt SPIR-V from `shaders/` next to the
//! working directory; set `TRIGON_SHADER_DIR` to point elsewhere.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)
//! - `TRIGON_SHADER_DIR`: Directory containing `triangle.vert.spv` and
//!   `triangle.frag.spv`

use std::path::PathBuf;

use trigon_app::{run, AppConfig};
use trigon_gpu::load_spirv;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn main() -> anyhow::Result<()> {
    let shader_dir = std::env::var_os("TRIGON_SHADER_DIR")
        .map_or_else(|| PathBuf::from("shaders"), PathBuf::from);

    let vertex_shader = load_spirv(shader_dir.join("triangle.vert.spv"))?;
    let fragment_shader = load_spirv(shader_dir.join("triangle.frag.spv"))?;

    run(AppConfig::new("trigon viewer", vertex_shader, fragment_shader)
        .with_size(WIDTH, HEIGHT))
}
