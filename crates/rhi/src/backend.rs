//! Backend traits.
//!
//! Every frame-pacing component is written against these traits so the
//! same code drives the Vulkan backend and the simulated GPU used in tests.
//! Each trait mirrors one GPU object; associated types tie the objects of a
//! backend together so a queue only accepts its own device's command lists.

use std::time::Duration;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::RhiResult;
use crate::types::{
    AdapterInfo, Extent2D, FeatureLevel, FrameSlot, PresentStatus, QueueKind, ResourceState,
    ScissorRect, SwapchainDesc, ViewKind, Viewport, WaitStatus,
};

/// Window collaborator: native handles plus a client size that is
/// re-queried on demand.
pub trait WindowSource: HasDisplayHandle + HasWindowHandle {
    /// Current client-area size in physical pixels.
    fn client_size(&self) -> Extent2D;
}

/// Entry point of a backend; enumerates adapters.
pub trait Instance {
    type Adapter: Adapter;

    /// Returns adapters in enumeration order.
    fn enumerate_adapters(&self) -> RhiResult<Vec<Self::Adapter>>;
}

/// A physical GPU.
pub trait Adapter {
    type Device: Device;

    fn info(&self) -> AdapterInfo;

    /// Creates a logical device, failing if the adapter cannot provide
    /// `min_level`. The returned device is kept and used.
    fn create_device(&self, min_level: FeatureLevel) -> RhiResult<Self::Device>;
}

/// Logical device. Owns every other GPU object.
pub trait Device {
    type Queue: CommandQueue<Fence = Self::Fence, CommandList = Self::CommandList>;
    type Fence: Fence;
    type CommandList: CommandList<Image = Self::Image, View = Self::View>;
    type Swapchain: Swapchain<Queue = Self::Queue, Image = Self::Image>;
    type Image: Clone;
    type View;

    fn create_queue(&self, kind: QueueKind) -> RhiResult<Self::Queue>;

    fn create_fence(&self, initial_value: u64) -> RhiResult<Self::Fence>;

    /// Creates a swapchain for `window` presenting from `queue`.
    fn create_swapchain(
        &self,
        queue: &Self::Queue,
        window: &dyn WindowSource,
        desc: &SwapchainDesc,
    ) -> RhiResult<Self::Swapchain>;

    fn create_command_list(&self, kind: QueueKind) -> RhiResult<Self::CommandList>;

    /// Distance in bytes between consecutive descriptors of `kind`.
    fn view_stride(&self, kind: ViewKind) -> usize;

    fn create_render_target_view(&self, image: &Self::Image) -> RhiResult<Self::View>;
}

/// Ordered execution channel. Submissions are fire-and-forget.
pub trait CommandQueue {
    type Fence: Fence;
    type CommandList;

    fn kind(&self) -> QueueKind;

    fn submit(&self, list: &Self::CommandList) -> RhiResult<()>;

    /// Enqueues a GPU-side update of `fence` to `value`, ordered after
    /// everything already submitted to this queue.
    fn signal(&self, fence: &Self::Fence, value: u64) -> RhiResult<()>;
}

/// Monotonic 64-bit completion counter with a blocking CPU wait.
pub trait Fence {
    /// Highest value the GPU has reached. Never cached.
    fn completed_value(&self) -> RhiResult<u64>;

    /// Blocks until the counter reaches `value`. `None` waits forever.
    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<WaitStatus>;
}

/// Rotating pool of presentable buffers.
pub trait Swapchain {
    type Queue;
    type Image: Clone;

    fn buffer_count(&self) -> usize;

    fn extent(&self) -> Extent2D;

    /// Index of the buffer the presentation engine wants rendered next.
    /// Stable until the next [`Swapchain::present`].
    fn current_slot(&mut self) -> RhiResult<FrameSlot>;

    fn buffer(&self, slot: FrameSlot) -> RhiResult<Self::Image>;

    fn present(&mut self, queue: &Self::Queue, sync_interval: u32) -> RhiResult<PresentStatus>;

    /// Rebuilds every buffer at the new size. All views of the old buffers
    /// must have been released and all GPU work referencing them retired.
    fn recreate(&mut self, width: u32, height: u32) -> RhiResult<()>;
}

/// Recorded command stream for one queue.
pub trait CommandList {
    type Image;
    type View;

    fn kind(&self) -> QueueKind;

    /// Resets the list and opens it for recording.
    fn begin(&mut self) -> RhiResult<()>;

    fn resource_barrier(&mut self, image: &Self::Image, before: ResourceState, after: ResourceState);

    fn set_viewport(&mut self, viewport: &Viewport);

    fn set_scissor(&mut self, scissor: &ScissorRect);

    fn clear_render_target(&mut self, view: &Self::View, color: [f32; 4]);

    fn end(&mut self) -> RhiResult<()>;
}
