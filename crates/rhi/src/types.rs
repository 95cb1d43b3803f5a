//! Plain data types shared by every backend.

use std::fmt;
use std::time::Duration;

/// Index of a frame slot in `[0, frame_count)`.
///
/// A slot maps one-to-one to a swapchain buffer, a render-target view,
/// a command list and a pending fence value.
pub type FrameSlot = usize;

/// The three independent execution queues a device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Draw, clear and present work.
    Graphics,
    /// Async compute work.
    Compute,
    /// Upload and copy work.
    Copy,
}

impl QueueKind {
    /// All queue kinds in creation order.
    pub const ALL: [QueueKind; 3] = [QueueKind::Graphics, QueueKind::Compute, QueueKind::Copy];
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueKind::Graphics => "graphics",
            QueueKind::Compute => "compute",
            QueueKind::Copy => "copy",
        };
        f.write_str(name)
    }
}

/// Minimum capability level a device must support.
///
/// For the Vulkan backend this is the core API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureLevel {
    pub major: u32,
    pub minor: u32,
}

impl FeatureLevel {
    pub const V1_2: FeatureLevel = FeatureLevel::new(1, 2);
    pub const V1_3: FeatureLevel = FeatureLevel::new(1, 3);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for FeatureLevel {
    fn default() -> Self {
        FeatureLevel::V1_3
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Logical state of a swapchain buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Owned by the presentation engine; may be scanned out.
    #[default]
    Presentable,
    /// Writable as a color target.
    Renderable,
}

/// Kind of view a descriptor heap stores. The stride between entries
/// is kind-specific and queried from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    RenderTarget,
    DepthStencil,
    ShaderResource,
    Sampler,
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero (e.g. a minimized window).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rasterizer viewport covering the full swapchain extent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport at the origin spanning `extent` with depth range `[0, 1]`.
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle in pixels, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            left: 0,
            top: 0,
            right: extent.width.min(i32::MAX as u32) as i32,
            bottom: extent.height.min(i32::MAX as u32) as i32,
        }
    }
}

/// Result of a blocking fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

/// Result of a present call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// The buffer was queued for display.
    Presented,
    /// The buffer was queued, but the swapchain should be recreated.
    Suboptimal,
}

/// Parameters for swapchain creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub buffer_count: usize,
    pub width: u32,
    pub height: u32,
    /// 0 presents immediately, 1 or more waits for vertical blank.
    pub sync_interval: u32,
    /// Bound on the host wait for a buffer to become available. `None`
    /// waits indefinitely.
    pub acquire_timeout: Option<Duration>,
}

/// Description of an enumerated adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    /// Software rasterizers and fallback adapters are never selected.
    pub is_software: bool,
    /// Highest feature level the adapter reports.
    pub feature_level: FeatureLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_level_ordering() {
        assert!(FeatureLevel::V1_2 < FeatureLevel::V1_3);
        assert!(FeatureLevel::new(2, 0) > FeatureLevel::V1_3);
        assert_eq!(FeatureLevel::V1_3.to_string(), "1.3");
    }

    #[test]
    fn test_viewport_from_extent() {
        let viewport = Viewport::from_extent(Extent2D::new(1280, 720));
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 0.0);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_scissor_from_extent() {
        let scissor = ScissorRect::from_extent(Extent2D::new(800, 600));
        assert_eq!(
            scissor,
            ScissorRect {
                left: 0,
                top: 0,
                right: 800,
                bottom: 600
            }
        );
    }

    #[test]
    fn test_empty_extent() {
        assert!(Extent2D::new(0, 720).is_empty());
        assert!(Extent2D::new(1280, 0).is_empty());
        assert!(!Extent2D::new(1, 1).is_empty());
    }
}
