//! # Render Engine
//!
//! A real-time 3D renderer built directly on Vulkan, centered on the
//! per-frame synchronization protocol, swapchain lifecycle (including
//! resize recovery), typed command recording, and a composable pipeline
//! abstraction that interchangeable rendering effects plug into.
//!
//! The engine drives one frame per [`render::VulkanRenderer::render`]
//! call. The CPU records frame `i + 1` while the GPU executes frame `i`;
//! the fence/semaphore protocol in [`render::frame`] is what makes that
//! overlap safe.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use render_engine::config::EngineConfig;
//! use render_engine::render::{FrameUniforms, VulkanRenderer};
//! use render_engine::window::Window;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = VulkanRenderer::new(&mut window, &config, "shaders")?;
//!     while window.is_active() {
//!         window.poll_events();
//!         if window.is_minimized() {
//!             window.wait_events();
//!             continue;
//!         }
//!         renderer.render(&mut window, &FrameUniforms::default())?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

/// Engine configuration (TOML-backed, passed at construction)
pub mod config;
/// GLFW window wrapper and surface creation
pub mod window;
/// Vulkan rendering core
pub mod render;

pub use config::{Config, ConfigError, EngineConfig};
pub use render::{VulkanError, VulkanRenderer, VulkanResult};
pub use window::{Window, WindowError};
