//! Frame pacing and swapchain lifecycle.
//!
//! This crate orchestrates the render loop:
//! - Device bring-up and ownership ([`DeviceResources`])
//! - Per-slot pacing against the GPU ([`FrameSynchronizer`])
//! - Resize, reset and shutdown
//!
//! Everything is generic over a [`fivemapper_rhi::backend::Device`], so the
//! same code drives the Vulkan backend and the simulated one.

pub mod config;
pub mod device_resources;
pub mod frame_sync;
pub mod renderer;

pub use config::{DEFAULT_FRAME_COUNT, FrameSyncConfig};
pub use device_resources::{DeviceResources, RenderTarget};
pub use frame_sync::{FrameBegin, FrameEnd, FramePhase, FrameStats, FrameSynchronizer, SlotTable};
pub use renderer::Renderer;
