//! Render Hardware Interface for frame pacing.
//!
//! This crate defines the GPU objects frame synchronization needs and two
//! backends for them. It handles:
//! - Adapter enumeration and selection
//! - Graphics, compute and copy queues
//! - Monotonic frame fences
//! - Swapchains and per-buffer render target views
//! - Command list recording (barriers, viewport, scissor, clear)
//!
//! The [`vulkan`] backend drives real hardware through `ash`. The [`sim`]
//! backend is a deterministic software GPU used by tests and headless runs.

mod error;
mod types;

pub mod adapter;
pub mod backend;
pub mod descriptor;
pub mod queue;
pub mod sim;
pub mod sync;
pub mod vulkan;

pub use error::{ErrorCategory, RhiError, RhiResult};
pub use types::*;

// Re-export ash types that users might need
pub use ash::vk;
