//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] struct that ties the device
//! resources to the frame synchronizer and exposes a frame-at-a-time API to
//! the application.

use tracing::{error, info};

use fivemapper_rhi::backend::{Adapter, Device, Instance, WindowSource};
use fivemapper_rhi::{AdapterInfo, PresentStatus, RhiResult};

use crate::config::FrameSyncConfig;
use crate::device_resources::{DeviceResources, RenderTarget};
use crate::frame_sync::{FrameEnd, FramePhase, FrameStats, FrameSynchronizer};

/// Paced renderer over one device.
///
/// # Example
///
/// ```
/// use fivemapper_renderer::{FrameSyncConfig, Renderer};
/// use fivemapper_rhi::sim::{HeadlessWindow, SimGpu, SimInstance};
///
/// let gpu = SimGpu::new();
/// let window = HeadlessWindow::new(640, 480);
/// let mut renderer = Renderer::new(
///     &SimInstance::single(gpu.clone()),
///     &window,
///     FrameSyncConfig::default(),
/// )
/// .unwrap();
///
/// for _ in 0..5 {
///     renderer.render_frame(|target| target.clear([0.1, 0.1, 0.1, 1.0])).unwrap();
/// }
/// renderer.shutdown().unwrap();
/// assert_eq!(gpu.stats().presents, 5);
/// ```
///
/// # Resource Destruction
///
/// Dropping the renderer shuts it down first: the GPU is drained before any
/// object it may still use is destroyed.
pub struct Renderer<D: Device> {
    sync: FrameSynchronizer,
    resources: DeviceResources<D>,
    config: FrameSyncConfig,
    /// Set when a present reported the swapchain no longer matches.
    needs_recreate: bool,
}

impl<D: Device> Renderer<D> {
    /// Creates a renderer on the first capable adapter of `instance`.
    ///
    /// # Errors
    ///
    /// Returns an error if device bring-up fails.
    pub fn new<I>(instance: &I, window: &dyn WindowSource, config: FrameSyncConfig) -> RhiResult<Self>
    where
        I: Instance,
        I::Adapter: Adapter<Device = D>,
    {
        let resources = DeviceResources::new(instance, window, &config)?;
        Ok(Self::from_resources(resources, config))
    }

    pub fn from_resources(resources: DeviceResources<D>, config: FrameSyncConfig) -> Self {
        info!(
            "Renderer initialized on '{}' ({} frames in flight, sync interval {})",
            resources.adapter_info().name,
            resources.frame_count(),
            resources.sync_interval()
        );

        Self {
            sync: FrameSynchronizer::new(resources.frame_count()),
            resources,
            config,
            needs_recreate: false,
        }
    }

    #[inline]
    pub fn config(&self) -> &FrameSyncConfig {
        &self.config
    }

    #[inline]
    pub fn adapter_info(&self) -> &AdapterInfo {
        self.resources.adapter_info()
    }

    #[inline]
    pub fn resources(&self) -> &DeviceResources<D> {
        &self.resources
    }

    #[inline]
    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.sync
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.sync.phase()
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.sync.stats()
    }

    /// True if the last present asked for the swapchain to be rebuilt.
    #[inline]
    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate
    }

    /// Changes the sync interval used by subsequent presents.
    pub fn set_sync_interval(&mut self, sync_interval: u32) {
        self.config.sync_interval = sync_interval;
        self.resources.set_sync_interval(sync_interval);
    }

    /// Starts a frame and returns the target to record into.
    pub fn begin_frame(&mut self) -> RhiResult<RenderTarget<'_, D>> {
        let begin = self.sync.begin_frame(&mut self.resources)?;
        self.resources.frame_target(begin.slot)
    }

    /// Submits and presents the frame started by [`begin_frame`](Self::begin_frame).
    pub fn end_frame(&mut self) -> RhiResult<FrameEnd> {
        let end = self.sync.end_frame(&mut self.resources)?;
        if end.status == PresentStatus::Suboptimal {
            self.needs_recreate = true;
        }
        Ok(end)
    }

    /// Runs one whole frame, letting `record` fill the target in between.
    pub fn render_frame<F>(&mut self, record: F) -> RhiResult<FrameEnd>
    where
        F: FnOnce(&mut RenderTarget<'_, D>),
    {
        let mut target = self.begin_frame()?;
        record(&mut target);
        self.end_frame()
    }

    /// Rebuilds the swapchain for the window's new size.
    ///
    /// Returns `false` while the window is minimized; call again once it
    /// has a client area.
    pub fn resize(&mut self, window: &dyn WindowSource) -> RhiResult<bool> {
        let recreated = self.sync.recreate(&mut self.resources, window)?;
        if recreated {
            self.needs_recreate = false;
        }
        Ok(recreated)
    }

    /// Rebuilds the swapchain if a present reported it suboptimal or a
    /// previous resize was deferred.
    pub fn recreate_if_needed(&mut self, window: &dyn WindowSource) -> RhiResult<bool> {
        if self.needs_recreate || self.sync.is_invalidated() {
            self.resize(window)
        } else {
            Ok(false)
        }
    }

    /// Recovers from a per-frame error.
    pub fn reset(&mut self, window: &dyn WindowSource) -> RhiResult<bool> {
        let recreated = self.sync.reset(&mut self.resources, window)?;
        if recreated {
            self.needs_recreate = false;
        }
        Ok(recreated)
    }

    /// Drains the GPU and releases the views. Safe to call more than once.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        self.sync.shutdown(&mut self.resources)
    }
}

impl<D: Device> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Renderer shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fivemapper_rhi::RhiError;
    use fivemapper_rhi::sim::{HeadlessWindow, SimDevice, SimGpu, SimInstance};

    fn renderer(gpu: &SimGpu) -> Renderer<SimDevice> {
        let window = HeadlessWindow::new(640, 480);
        Renderer::new(&SimInstance::single(gpu.clone()), &window, FrameSyncConfig::default())
            .unwrap()
    }

    #[test]
    fn test_render_frame_clears_active_slot() {
        let gpu = SimGpu::new();
        let mut renderer = renderer(&gpu);

        let end = renderer
            .render_frame(|target| target.clear([1.0, 0.0, 0.0, 1.0]))
            .unwrap();
        assert_eq!(end.slot, 0);
        assert_eq!(end.fence_value, 1);
        assert!(gpu.stats().violations.is_empty());
    }

    #[test]
    fn test_sync_interval_change_requests_recreate() {
        let gpu = SimGpu::new();
        let mut renderer = renderer(&gpu);
        renderer.set_sync_interval(0);
        assert_eq!(renderer.config().sync_interval, 0);
        assert_eq!(renderer.resources().sync_interval(), 0);

        let window = HeadlessWindow::new(640, 480);
        assert!(!renderer.recreate_if_needed(&window).unwrap());

        let end = renderer.render_frame(|_| {}).unwrap();
        assert_eq!(end.status, PresentStatus::Suboptimal);
        assert!(renderer.needs_recreate());

        assert!(renderer.recreate_if_needed(&window).unwrap());
        assert!(!renderer.needs_recreate());
        let end = renderer.render_frame(|_| {}).unwrap();
        assert_eq!(end.status, PresentStatus::Presented);
    }

    #[test]
    fn test_deferred_resize_is_retried() {
        let gpu = SimGpu::new();
        let mut renderer = renderer(&gpu);

        assert!(!renderer.resize(&HeadlessWindow::new(0, 0)).unwrap());
        assert!(matches!(renderer.begin_frame(), Err(RhiError::ResizeInProgress)));

        assert!(renderer.recreate_if_needed(&HeadlessWindow::new(300, 200)).unwrap());
        assert!(renderer.begin_frame().is_ok());
        renderer.end_frame().unwrap();
        assert_eq!(gpu.stats().swapchain_recreations, 1);
    }

    #[test]
    fn test_drop_shuts_down() {
        let gpu = SimGpu::new();
        {
            let mut renderer = renderer(&gpu);
            renderer.render_frame(|_| {}).unwrap();
        }
        assert_eq!(gpu.stats().live_views, 0);
    }
}
