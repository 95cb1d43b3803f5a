//! Window management using winit.

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

use fivemapper_core::{Error, Result};
use fivemapper_rhi::Extent2D;
use fivemapper_rhi::backend::WindowSource;

use crate::config::WindowSettings;

pub const WINDOW_TITLE: &str = "FiveMapper";

/// The application window.
///
/// Implements [`WindowSource`], so the renderer can create its surface from
/// it and re-query the client size whenever it rebuilds the swapchain.
pub struct Window {
    window: WinitWindow,
    borderless: bool,
}

impl Window {
    /// Creates the window at the position and size in `settings`.
    pub fn new(event_loop: &ActiveEventLoop, settings: &WindowSettings) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_position(PhysicalPosition::new(settings.x, settings.y))
            .with_inner_size(PhysicalSize::new(settings.width, settings.height))
            .with_decorations(!settings.borderless)
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!(
            "Window created: {}x{} at ({}, {}){}",
            settings.width,
            settings.height,
            settings.x,
            settings.y,
            if settings.borderless { ", borderless" } else { "" }
        );

        Ok(Self {
            window,
            borderless: settings.borderless,
        })
    }

    #[inline]
    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    /// Get a reference to the underlying winit window.
    #[inline]
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    #[inline]
    pub fn is_borderless(&self) -> bool {
        self.borderless
    }

    /// Switches between a decorated and a borderless window. Returns the new
    /// state.
    pub fn toggle_borderless(&mut self) -> bool {
        self.borderless = !self.borderless;
        self.window.set_decorations(!self.borderless);
        tracing::debug!("Borderless: {}", self.borderless);
        self.borderless
    }

    /// Outer position in physical pixels, if the platform reports one.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.window.outer_position().ok().map(|p| (p.x, p.y))
    }

    /// Writes the current geometry into `settings`. A minimized window keeps
    /// the last usable size.
    pub fn store_geometry(&self, settings: &mut WindowSettings) {
        if let Some((x, y)) = self.position() {
            settings.x = x;
            settings.y = y;
        }
        let size = self.client_size();
        if !size.is_empty() {
            settings.width = size.width;
            settings.height = size.height;
        }
        settings.borderless = self.borderless;
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl HasDisplayHandle for Window {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl HasWindowHandle for Window {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl WindowSource for Window {
    fn client_size(&self) -> Extent2D {
        let size = self.window.inner_size();
        Extent2D::new(size.width, size.height)
    }
}
