//! Window stand-in for headless runs.

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};

use crate::backend::WindowSource;
use crate::types::Extent2D;

/// A window with a size and no native handles.
///
/// The size fields are public so tests can simulate a resize or a
/// minimize between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessWindow {
    pub width: u32,
    pub height: u32,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl HasDisplayHandle for HeadlessWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl HasWindowHandle for HeadlessWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl WindowSource for HeadlessWindow {
    fn client_size(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }
}
