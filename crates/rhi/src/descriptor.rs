//! Render-target view heap.
//!
//! This module provides a fixed-size table of view descriptors addressed
//! the way a CPU descriptor heap is: each heap owns a unique base address
//! and entry `i` lives at `base + i * stride`, where the stride is queried
//! once from the device for the heap's [`ViewKind`].
//!
//! # Overview
//!
//! One heap entry exists per swapchain buffer. After every swapchain
//! (re)creation the owner binds a fresh view into each entry with
//! [`ViewHeap::bind_view`]; before recreation it calls
//! [`ViewHeap::release_views`] so no view outlives the buffer it refers to.
//!
//! # Example
//!
//! ```no_run
//! use fivemapper_rhi::descriptor::ViewHeap;
//! use fivemapper_rhi::sim::SimGpu;
//! use fivemapper_rhi::ViewKind;
//!
//! # fn example() -> Result<(), fivemapper_rhi::RhiError> {
//! let gpu = SimGpu::new();
//! let device = gpu.device();
//! let heap = ViewHeap::new(&device, ViewKind::RenderTarget, 3)?;
//!
//! let handle = heap.view_handle(1)?;
//! assert_eq!(handle.offset_from(heap.base()), heap.stride());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::backend::Device;
use crate::error::{RhiError, RhiResult};
use crate::types::{FrameSlot, ViewKind};

/// Start of the address range heap bases are carved from. Never zero so a
/// default handle is always invalid.
const HEAP_ARENA_START: usize = 0x1000_0000;

/// Heaps are aligned to this boundary.
const HEAP_ALIGNMENT: usize = 0x1000;

static NEXT_HEAP_BASE: AtomicUsize = AtomicUsize::new(HEAP_ARENA_START);

/// CPU address of a view descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewHandle(usize);

impl ViewHandle {
    /// Raw address value.
    #[inline]
    pub fn ptr(self) -> usize {
        self.0
    }

    /// Byte distance from `base` to this handle.
    #[inline]
    pub fn offset_from(self, base: ViewHandle) -> usize {
        self.0.wrapping_sub(base.0)
    }
}

/// Fixed-size table of views of a single kind.
pub struct ViewHeap<V> {
    kind: ViewKind,
    base: ViewHandle,
    stride: usize,
    entries: Vec<Option<V>>,
}

impl<V> ViewHeap<V> {
    /// Creates a heap with `count` empty entries.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InitializationFailed`] if `count` is zero or the
    /// device reports a zero stride for `kind`.
    pub fn new<D>(device: &D, kind: ViewKind, count: usize) -> RhiResult<Self>
    where
        D: Device<View = V>,
    {
        if count == 0 {
            return Err(RhiError::InitializationFailed(format!(
                "{kind:?} heap needs at least one entry"
            )));
        }

        let stride = device.view_stride(kind);
        if stride == 0 {
            return Err(RhiError::InitializationFailed(format!(
                "device reports zero stride for {kind:?} views"
            )));
        }

        let size = (stride * count).next_multiple_of(HEAP_ALIGNMENT);
        let base = ViewHandle(NEXT_HEAP_BASE.fetch_add(size, Ordering::Relaxed));

        debug!(
            "Created {:?} heap: {} entries, stride {}, base {:#x}",
            kind, count, stride, base.0
        );

        Ok(Self {
            kind,
            base,
            stride,
            entries: (0..count).map(|_| None).collect(),
        })
    }

    #[inline]
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    #[inline]
    pub fn base(&self) -> ViewHandle {
        self.base
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Address of the entry for `slot`: `base + slot * stride`.
    pub fn view_handle(&self, slot: FrameSlot) -> RhiResult<ViewHandle> {
        if slot >= self.entries.len() {
            return Err(RhiError::SlotOutOfRange {
                slot,
                count: self.entries.len(),
            });
        }
        Ok(ViewHandle(self.base.0 + slot * self.stride))
    }

    /// Creates a view of `image` and stores it at `handle`, replacing
    /// whatever was bound there.
    pub fn bind_view<D>(&mut self, device: &D, image: &D::Image, handle: ViewHandle) -> RhiResult<()>
    where
        D: Device<View = V>,
    {
        let index = self.index_of(handle)?;
        let view = device.create_render_target_view(image)?;
        self.entries[index] = Some(view);
        Ok(())
    }

    /// Returns the view bound at `handle`.
    pub fn resolve(&self, handle: ViewHandle) -> RhiResult<&V> {
        let index = self.index_of(handle)?;
        self.entries[index].as_ref().ok_or_else(|| {
            RhiError::InvalidHandle(format!("no view bound at {:#x}", handle.0))
        })
    }

    /// Drops every bound view and returns how many there were.
    pub fn release_views(&mut self) -> usize {
        let released = self.entries.iter_mut().filter_map(Option::take).count();
        if released > 0 {
            debug!("Released {} {:?} view(s)", released, self.kind);
        }
        released
    }

    /// Number of entries that currently hold a view.
    pub fn bound_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    fn index_of(&self, handle: ViewHandle) -> RhiResult<usize> {
        let offset = handle
            .0
            .checked_sub(self.base.0)
            .ok_or_else(|| RhiError::InvalidHandle(format!("{:#x} is below heap base", handle.0)))?;

        if offset % self.stride != 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{:#x} is not aligned to stride {}",
                handle.0, self.stride
            )));
        }

        let index = offset / self.stride;
        if index >= self.entries.len() {
            return Err(RhiError::InvalidHandle(format!(
                "{:#x} is past the end of the heap",
                handle.0
            )));
        }

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Device, Swapchain};
    use crate::sim::{HeadlessWindow, SimGpu};
    use crate::types::{QueueKind, SwapchainDesc};

    #[test]
    fn test_handles_follow_stride() {
        let gpu = SimGpu::new();
        let device = gpu.device();
        let heap = ViewHeap::new(&device, ViewKind::RenderTarget, 3).unwrap();
        let stride = device.view_stride(ViewKind::RenderTarget);

        assert_eq!(heap.stride(), stride);
        for slot in 0..3 {
            let handle = heap.view_handle(slot).unwrap();
            assert_eq!(handle.ptr(), heap.base().ptr() + slot * stride);
        }
    }

    #[test]
    fn test_stride_is_kind_specific() {
        let gpu = SimGpu::new();
        let device = gpu.device();
        let rtv = ViewHeap::new(&device, ViewKind::RenderTarget, 2).unwrap();
        let srv = ViewHeap::new(&device, ViewKind::ShaderResource, 2).unwrap();

        assert_ne!(rtv.stride(), srv.stride());
        assert_ne!(rtv.base(), srv.base());
    }

    #[test]
    fn test_slot_out_of_range() {
        let gpu = SimGpu::new();
        let heap = ViewHeap::new(&gpu.device(), ViewKind::RenderTarget, 3).unwrap();
        assert!(matches!(
            heap.view_handle(3),
            Err(RhiError::SlotOutOfRange { slot: 3, count: 3 })
        ));
    }

    #[test]
    fn test_rejects_foreign_and_misaligned_handles() {
        let gpu = SimGpu::new();
        let device = gpu.device();
        let heap = ViewHeap::new(&device, ViewKind::RenderTarget, 3).unwrap();

        let misaligned = ViewHandle(heap.base().ptr() + 1);
        assert!(matches!(heap.resolve(misaligned), Err(RhiError::InvalidHandle(_))));
        assert!(matches!(heap.resolve(ViewHandle::default()), Err(RhiError::InvalidHandle(_))));

        let past_end = ViewHandle(heap.base().ptr() + 3 * heap.stride());
        assert!(matches!(heap.resolve(past_end), Err(RhiError::InvalidHandle(_))));
    }

    #[test]
    fn test_bind_resolve_release() {
        let gpu = SimGpu::new();
        let device = gpu.device();
        let queue = device.create_queue(QueueKind::Graphics).unwrap();
        let window = HeadlessWindow::new(640, 480);
        let desc = SwapchainDesc {
            buffer_count: 3,
            width: 640,
            height: 480,
            sync_interval: 1,
            acquire_timeout: None,
        };
        let swapchain = device.create_swapchain(&queue, &window, &desc).unwrap();
        let mut heap = ViewHeap::new(&device, ViewKind::RenderTarget, 3).unwrap();

        let handle = heap.view_handle(1).unwrap();
        assert!(heap.resolve(handle).is_err());

        heap.bind_view(&device, &swapchain.buffer(1).unwrap(), handle).unwrap();
        assert_eq!(heap.resolve(handle).unwrap().slot(), 1);
        assert_eq!(heap.bound_count(), 1);
        assert_eq!(gpu.stats().live_views, 1);

        assert_eq!(heap.release_views(), 1);
        assert_eq!(heap.bound_count(), 0);
        assert_eq!(gpu.stats().live_views, 0);
    }
}
