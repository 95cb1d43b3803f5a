//! Platform layer for FiveMapper.
//!
//! This crate provides:
//! - The winit window, usable as the renderer's window source
//! - Raw mouse and keyboard input
//! - Window and graphics settings persisted as JSON

mod config;
mod input;
mod window;

pub use config::{GraphicsSettings, WindowConfig, WindowSettings};
pub use input::{InputState, KeyCode};
pub use window::{WINDOW_TITLE, Window};

// Re-export winit types that users might need
pub use winit::event::{DeviceEvent, WindowEvent};
pub use winit::event_loop::EventLoop;
