//! Device bring-up and ownership of every GPU object.
//!
//! [`DeviceResources`] is created once per device. It selects the adapter,
//! creates the queues, the frame fence, the swapchain, one render target
//! view per buffer and one command list per frame slot.
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order:
//! 1. Command lists
//! 2. Render target views
//! 3. Swapchain (and its surface)
//! 4. Frame fence
//! 5. Queues
//! 6. Device

use tracing::{debug, info, warn};

use fivemapper_rhi::adapter::select_adapter;
use fivemapper_rhi::backend::{Adapter, CommandList, Device, Instance, Swapchain, WindowSource};
use fivemapper_rhi::descriptor::ViewHeap;
use fivemapper_rhi::queue::CommandQueueSet;
use fivemapper_rhi::sync::FrameFence;
use fivemapper_rhi::{
    AdapterInfo, Extent2D, FrameSlot, QueueKind, RhiError, RhiResult, ScissorRect, SwapchainDesc,
    ViewKind, Viewport,
};

use crate::config::FrameSyncConfig;

/// GPU objects shared by every frame.
pub struct DeviceResources<D: Device> {
    pub(crate) command_lists: Vec<D::CommandList>,
    pub(crate) views: ViewHeap<D::View>,
    pub(crate) swapchain: D::Swapchain,
    pub(crate) fence: FrameFence<D::Fence>,
    pub(crate) queues: CommandQueueSet<D::Queue>,
    device: D,
    adapter_info: AdapterInfo,
    pub(crate) viewport: Viewport,
    pub(crate) scissor: ScissorRect,
    frame_count: usize,
    pub(crate) sync_interval: u32,
}

impl<D: Device> DeviceResources<D> {
    /// Selects an adapter from `instance` and brings up a device on it.
    ///
    /// # Errors
    ///
    /// Returns an error if no hardware adapter supports
    /// `config.min_feature_level`, or if any object creation fails. No
    /// partially initialized state is returned.
    pub fn new<I>(instance: &I, window: &dyn WindowSource, config: &FrameSyncConfig) -> RhiResult<Self>
    where
        I: Instance,
        I::Adapter: Adapter<Device = D>,
    {
        config.validate()?;
        let selection = select_adapter(instance, config.min_feature_level)?;
        Self::from_device(selection.device, selection.info, window, config)
    }

    /// Brings up frame resources on an already created device.
    pub fn from_device(
        device: D,
        adapter_info: AdapterInfo,
        window: &dyn WindowSource,
        config: &FrameSyncConfig,
    ) -> RhiResult<Self> {
        config.validate()?;
        let frame_count = config.frame_count;

        let queues = CommandQueueSet::new(&device)?;
        let fence = FrameFence::new(device.create_fence(0)?, config.wait_timeout)?;

        let size = window.client_size();
        if size.is_empty() {
            return Err(RhiError::InitializationFailed(format!(
                "window client area is {}x{}",
                size.width, size.height
            )));
        }

        let desc = SwapchainDesc {
            buffer_count: frame_count,
            width: size.width,
            height: size.height,
            sync_interval: config.sync_interval,
            acquire_timeout: config.wait_timeout,
        };
        let swapchain = device.create_swapchain(queues.graphics(), window, &desc)?;
        check_buffer_count(&swapchain, frame_count)?;

        let views = ViewHeap::new(&device, ViewKind::RenderTarget, frame_count)?;

        let mut command_lists = Vec::with_capacity(frame_count);
        for slot in 0..frame_count {
            command_lists.push(device.create_command_list(QueueKind::Graphics)?);
            debug!("Created command list for slot {}", slot);
        }

        let extent = swapchain.extent();
        let mut resources = Self {
            command_lists,
            views,
            swapchain,
            fence,
            queues,
            device,
            adapter_info,
            viewport: Viewport::from_extent(extent),
            scissor: ScissorRect::from_extent(extent),
            frame_count,
            sync_interval: config.sync_interval,
        };
        resources.bind_views()?;

        info!(
            "Device resources ready on '{}': {}x{}, {} frames in flight",
            resources.adapter_info.name, extent.width, extent.height, frame_count
        );

        Ok(resources)
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    #[inline]
    pub fn queues(&self) -> &CommandQueueSet<D::Queue> {
        &self.queues
    }

    #[inline]
    pub fn fence(&self) -> &FrameFence<D::Fence> {
        &self.fence
    }

    #[inline]
    pub fn swapchain(&self) -> &D::Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn views(&self) -> &ViewHeap<D::View> {
        &self.views
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[inline]
    pub fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn scissor(&self) -> ScissorRect {
        self.scissor
    }

    #[inline]
    pub fn sync_interval(&self) -> u32 {
        self.sync_interval
    }

    /// Takes effect on the next present; backends that bake the interval
    /// into the swapchain report `Suboptimal` until it is recreated.
    pub fn set_sync_interval(&mut self, sync_interval: u32) {
        self.sync_interval = sync_interval;
    }

    /// Creates a render target view for every swapchain buffer.
    pub fn bind_views(&mut self) -> RhiResult<()> {
        for slot in 0..self.frame_count {
            let image = self.swapchain.buffer(slot)?;
            let handle = self.views.view_handle(slot)?;
            self.views.bind_view(&self.device, &image, handle)?;
        }
        debug!("Bound {} render target views", self.frame_count);
        Ok(())
    }

    /// Drops every render target view. Must precede swapchain recreation.
    pub fn release_views(&mut self) -> usize {
        self.views.release_views()
    }

    /// Rebuilds the swapchain buffers at the given size, then rebinds the
    /// views and recomputes viewport and scissor.
    ///
    /// The caller must have drained the GPU. Views still bound are released
    /// first, and if rebinding fails every view bound so far is released
    /// again, so no view outlives the buffers it was created for.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let stale = self.release_views();
        if stale > 0 {
            warn!("Released {} stale render target views before recreation", stale);
        }

        self.swapchain.recreate(width, height)?;
        check_buffer_count(&self.swapchain, self.frame_count)?;

        let extent = self.swapchain.extent();
        self.viewport = Viewport::from_extent(extent);
        self.scissor = ScissorRect::from_extent(extent);
        if let Err(e) = self.bind_views() {
            let released = self.release_views();
            debug!("Rebinding failed, released {} partial views", released);
            return Err(e);
        }

        info!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Borrows the command list and view of `slot` for recording.
    pub fn frame_target(&mut self, slot: FrameSlot) -> RhiResult<RenderTarget<'_, D>> {
        let handle = self.views.view_handle(slot)?;
        let view = self.views.resolve(handle)?;
        let count = self.command_lists.len();
        let list = self
            .command_lists
            .get_mut(slot)
            .ok_or(RhiError::SlotOutOfRange { slot, count })?;

        Ok(RenderTarget {
            slot,
            list,
            view,
            viewport: self.viewport,
            scissor: self.scissor,
        })
    }
}

fn check_buffer_count<S: Swapchain>(swapchain: &S, expected: usize) -> RhiResult<()> {
    let actual = swapchain.buffer_count();
    if actual != expected {
        return Err(RhiError::InitializationFailed(format!(
            "swapchain holds {actual} buffers, {expected} required"
        )));
    }
    Ok(())
}

/// The buffer a frame records into, between the two state transitions.
pub struct RenderTarget<'a, D: Device> {
    slot: FrameSlot,
    list: &'a mut D::CommandList,
    view: &'a D::View,
    viewport: Viewport,
    scissor: ScissorRect,
}

impl<D: Device> RenderTarget<'_, D> {
    #[inline]
    pub fn slot(&self) -> FrameSlot {
        self.slot
    }

    #[inline]
    pub fn command_list(&mut self) -> &mut D::CommandList {
        self.list
    }

    #[inline]
    pub fn view(&self) -> &D::View {
        self.view
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn scissor(&self) -> ScissorRect {
        self.scissor
    }

    /// Clears the whole buffer to `color`.
    pub fn clear(&mut self, color: [f32; 4]) {
        self.list.clear_render_target(self.view, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fivemapper_rhi::sim::{HeadlessWindow, SimAdapterDesc, SimDevice, SimGpu, SimInstance};
    use fivemapper_rhi::{FeatureLevel, ResourceState};

    fn bring_up(gpu: &SimGpu) -> DeviceResources<SimDevice> {
        let instance = SimInstance::single(gpu.clone());
        let window = HeadlessWindow::new(640, 480);
        DeviceResources::new(&instance, &window, &FrameSyncConfig::default()).unwrap()
    }

    #[test]
    fn test_bring_up_creates_one_of_everything_per_slot() {
        let gpu = SimGpu::new();
        let resources = bring_up(&gpu);

        assert_eq!(resources.frame_count(), 3);
        assert_eq!(resources.swapchain().buffer_count(), 3);
        assert_eq!(resources.views().bound_count(), 3);
        assert_eq!(resources.command_lists.len(), 3);
        assert_eq!(resources.extent(), Extent2D::new(640, 480));
        assert_eq!(resources.viewport().width, 640.0);
        assert_eq!(resources.scissor().bottom, 480);
        assert_eq!(gpu.stats().live_views, 3);
    }

    #[test]
    fn test_bring_up_rejects_minimized_window() {
        let gpu = SimGpu::new();
        let instance = SimInstance::single(gpu.clone());
        let window = HeadlessWindow::new(0, 0);
        let result = DeviceResources::new(&instance, &window, &FrameSyncConfig::default());
        assert!(matches!(result, Err(RhiError::InitializationFailed(_))));
    }

    #[test]
    fn test_bring_up_without_capable_adapter() {
        let gpu = SimGpu::new();
        let instance = SimInstance::new(
            gpu.clone(),
            vec![
                SimAdapterDesc::software("WARP"),
                SimAdapterDesc::hardware("Old GPU", FeatureLevel::V1_2),
            ],
        );
        let window = HeadlessWindow::new(640, 480);
        let result = DeviceResources::new(&instance, &window, &FrameSyncConfig::default());
        assert!(matches!(result, Err(RhiError::NoCapableAdapter(_))));
    }

    #[test]
    fn test_recreate_swapchain_rebinds_views() {
        let gpu = SimGpu::new();
        let mut resources = bring_up(&gpu);

        assert_eq!(resources.release_views(), 3);
        assert_eq!(gpu.stats().live_views, 0);

        resources.recreate_swapchain(1024, 768).unwrap();
        assert_eq!(resources.extent(), Extent2D::new(1024, 768));
        assert_eq!(resources.viewport().height, 768.0);
        assert_eq!(resources.views().bound_count(), 3);
        assert!(gpu.stats().violations.is_empty());
    }

    #[test]
    fn test_failed_rebind_leaves_no_views() {
        let gpu = SimGpu::new();
        let mut resources = bring_up(&gpu);
        resources.release_views();

        gpu.fail_view_creation_after(1);
        assert!(matches!(
            resources.recreate_swapchain(800, 600),
            Err(RhiError::InitializationFailed(_))
        ));
        assert_eq!(resources.views().bound_count(), 0);
        assert_eq!(gpu.stats().live_views, 0);

        resources.recreate_swapchain(800, 600).unwrap();
        assert_eq!(resources.views().bound_count(), 3);
        assert!(gpu.stats().violations.is_empty());
    }

    #[test]
    fn test_recreate_releases_views_left_bound() {
        let gpu = SimGpu::new();
        let mut resources = bring_up(&gpu);

        resources.recreate_swapchain(1024, 768).unwrap();
        assert_eq!(resources.views().bound_count(), 3);
        assert_eq!(gpu.stats().live_views, 3);
        assert!(gpu.stats().violations.is_empty());
    }

    #[test]
    fn test_frame_target_clear_records_into_slot_list() {
        let gpu = SimGpu::new();
        let mut resources = bring_up(&gpu);

        let mut target = resources.frame_target(1).unwrap();
        assert_eq!(target.slot(), 1);
        assert_eq!(target.view().slot(), 1);
        target.command_list().begin().unwrap();
        target.clear([0.0, 0.0, 0.0, 1.0]);
        assert_eq!(target.command_list().len(), 1);

        assert!(matches!(
            resources.frame_target(3),
            Err(RhiError::SlotOutOfRange { slot: 3, count: 3 })
        ));
        assert_eq!(gpu.buffer_state(1), Some(ResourceState::Presentable));
    }
}
