//! FiveMapper - Main Entry Point
//!
//! Opens the window, brings up the Vulkan device and presents a cleared
//! frame every iteration of the event loop, paced by the frame
//! synchronizer.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use raw_window_handle::HasDisplayHandle;
use tracing::{debug, error, info, trace, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use fivemapper_core::Timer;
use fivemapper_platform::{InputState, Window, WindowConfig};
use fivemapper_renderer::{FrameSyncConfig, Renderer};
use fivemapper_rhi::vulkan::{VulkanDevice, VulkanInstance};
use fivemapper_rhi::{ErrorCategory, RhiError, RhiResult};

const CLEAR_COLOR: [f32; 4] = [0.05, 0.08, 0.12, 1.0];
const STATS_PERIOD: Duration = Duration::from_secs(5);

/// Everything that exists only while the window is open.
///
/// The renderer is declared first so it drains and drops before the
/// instance and the window its surface was created from.
struct Running {
    renderer: Renderer<VulkanDevice>,
    _instance: VulkanInstance,
    window: Window,
}

struct App {
    config_path: Option<PathBuf>,
    config: WindowConfig,
    running: Option<Running>,
    input: InputState,
    timer: Timer,
    frames_at_last_report: u64,
    exit_error: Option<anyhow::Error>,
}

impl App {
    fn new() -> Self {
        let config_path = WindowConfig::default_path();
        let config = match &config_path {
            Some(path) => WindowConfig::load_or_default(path),
            None => {
                warn!("No config directory available, settings will not persist");
                WindowConfig::default()
            }
        };

        Self {
            config_path,
            config,
            running: None,
            input: InputState::new(),
            timer: Timer::new(),
            frames_at_last_report: 0,
            exit_error: None,
        }
    }

    fn frame_sync_config(&self) -> FrameSyncConfig {
        let graphics = &self.config.graphics;
        FrameSyncConfig::default()
            .with_sync_interval(graphics.sync_interval)
            .with_wait_timeout(graphics.wait_timeout_ms.map(Duration::from_millis))
            .with_validation(graphics.gpu_validation)
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let window = Window::new(event_loop, &self.config.window)?;
        let display = window
            .display_handle()
            .context("window has no display handle")?
            .as_raw();

        let sync_config = self.frame_sync_config();
        let instance = VulkanInstance::new(sync_config.enable_validation, Some(display))
            .context("failed to create Vulkan instance")?;
        let renderer = Renderer::new(&instance, &window, sync_config)
            .context("failed to initialize the renderer")?;

        Ok(Running {
            renderer,
            _instance: instance,
            window,
        })
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        if self.input.borderless_toggle_requested() {
            self.config.window.borderless = running.window.toggle_borderless();
        }
        let (dx, dy) = self.input.take_mouse_delta();
        if dx != 0.0 || dy != 0.0 {
            trace!("Mouse delta: ({}, {})", dx, dy);
        }
        self.input.end_frame();

        let delta = self.timer.tick();
        trace!("Frame delta: {:?}", delta);

        let result = running
            .renderer
            .recreate_if_needed(&running.window)
            .and_then(|_| running.renderer.render_frame(|target| target.clear(CLEAR_COLOR)));
        if let Err(e) = result {
            self.recover(event_loop, e);
            return;
        }

        if let Some(elapsed) = self.timer.lap(STATS_PERIOD) {
            let stats = running.renderer.stats();
            let frames = stats.frames_completed - self.frames_at_last_report;
            self.frames_at_last_report = stats.frames_completed;
            info!(
                "{:.1} fps, {} frames, {} CPU blocks ({:?} blocked), GPU at fence value {}",
                frames as f64 / elapsed.as_secs_f64(),
                stats.frames_completed,
                stats.cpu_blocks,
                stats.blocked_time,
                stats.last_completed_value
            );
        }
    }

    fn resize(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        running.window.store_geometry(&mut self.config.window);
        if let Err(e) = running.renderer.resize(&running.window) {
            self.recover(event_loop, e);
        }
    }

    /// Resets the renderer after a per-frame error, or exits if the device
    /// cannot be recovered.
    fn recover(&mut self, event_loop: &ActiveEventLoop, e: RhiError) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        match e.category() {
            // Minimized: nothing to draw until the next resize.
            ErrorCategory::ResizeInProgress if matches!(e, RhiError::ResizeInProgress) => {
                debug!("Skipping frame while the swapchain is invalidated");
                return;
            }
            ErrorCategory::Fatal => {
                error!("Unrecoverable GPU error: {}", e);
                event_loop.exit();
                return;
            }
            _ => warn!("Frame failed: {}; resetting", e),
        }

        let reset: RhiResult<bool> = running.renderer.reset(&running.window);
        if let Err(e) = reset {
            error!("Reset failed: {}", e);
            event_loop.exit();
        }
    }

    fn save_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(e) = self.config.save(path) {
            warn!("Failed to save settings: {}", e);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }

        match self.start(event_loop) {
            Ok(running) => {
                info!(
                    "Initialization complete on '{}', entering main loop",
                    running.renderer.adapter_info().name
                );
                self.running = Some(running);
            }
            Err(e) => {
                error!("Startup failed: {:#}", e);
                self.exit_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.resize(event_loop);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                debug!("Scale factor changed to {}", scale_factor);
                self.resize(event_loop);
            }
            WindowEvent::Moved(_) => {
                if let Some(running) = &self.running {
                    running.window.store_geometry(&mut self.config.window);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.on_raw_mouse_motion(dx, dy);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut running) = self.running.take() {
            running.window.store_geometry(&mut self.config.window);
            if let Err(e) = running.renderer.shutdown() {
                error!("Renderer shutdown failed: {}", e);
            }
        }
        self.save_config();
    }
}

fn main() -> Result<()> {
    fivemapper_core::init_logging();
    info!("Starting FiveMapper");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    match app.exit_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
