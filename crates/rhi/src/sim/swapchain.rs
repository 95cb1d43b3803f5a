//! Simulated presentation engine.

use tracing::debug;

use super::{SimEvent, SimGpu, SimImage, SimQueue};
use crate::backend::Swapchain;
use crate::error::{RhiError, RhiResult};
use crate::types::{Extent2D, FrameSlot, PresentStatus, ResourceState, SwapchainDesc};

/// Swapchain whose buffer order is rotation unless a script is queued with
/// [`SimGpu::script_present_order`].
pub struct SimSwapchain {
    gpu: SimGpu,
    buffer_count: usize,
    extent: Extent2D,
    /// Buffer handed out by `current_slot`, held until present.
    current: Option<FrameSlot>,
    next_in_rotation: FrameSlot,
    /// Interval the swapchain was built for; toggling vsync needs a rebuild.
    sync_interval: u32,
}

impl SimSwapchain {
    pub(super) fn new(gpu: SimGpu, desc: &SwapchainDesc) -> RhiResult<Self> {
        if desc.buffer_count == 0 {
            return Err(RhiError::InitializationFailed(
                "swapchain needs at least one buffer".to_string(),
            ));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::InitializationFailed(format!(
                "cannot create a {}x{} swapchain",
                desc.width, desc.height
            )));
        }

        {
            let mut state = gpu.lock();
            state.generation += 1;
            state.buffer_states = vec![ResourceState::Presentable; desc.buffer_count];
        }

        debug!(
            "Simulated swapchain created: {}x{}, {} buffers",
            desc.width, desc.height, desc.buffer_count
        );

        Ok(Self {
            gpu,
            buffer_count: desc.buffer_count,
            extent: Extent2D::new(desc.width, desc.height),
            current: None,
            next_in_rotation: 0,
            sync_interval: desc.sync_interval,
        })
    }
}

impl Swapchain for SimSwapchain {
    type Queue = SimQueue;
    type Image = SimImage;

    fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn current_slot(&mut self) -> RhiResult<FrameSlot> {
        if let Some(slot) = self.current {
            return Ok(slot);
        }

        let mut state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }

        let slot = match state.present_script.pop_front() {
            Some(slot) if slot < self.buffer_count => slot,
            Some(slot) => {
                state.violation(format!("scripted buffer {slot} out of range"));
                self.next_in_rotation
            }
            None => self.next_in_rotation,
        };
        self.current = Some(slot);
        Ok(slot)
    }

    fn buffer(&self, slot: FrameSlot) -> RhiResult<SimImage> {
        if slot >= self.buffer_count {
            return Err(RhiError::SlotOutOfRange {
                slot,
                count: self.buffer_count,
            });
        }
        Ok(SimImage {
            slot,
            generation: self.gpu.lock().generation,
        })
    }

    fn present(&mut self, _queue: &SimQueue, sync_interval: u32) -> RhiResult<PresentStatus> {
        let mut state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        if state.fail_next_present {
            state.fail_next_present = false;
            self.current = None;
            return Err(RhiError::PresentFailed("simulated present failure".to_string()));
        }

        let Some(slot) = self.current.take() else {
            return Err(RhiError::PresentFailed("no buffer acquired".to_string()));
        };

        if state.buffer_states.get(slot) != Some(&ResourceState::Presentable) {
            state.violation(format!("presented buffer {slot} while not presentable"));
        }

        state.presents += 1;
        state.stats.presents += 1;
        state.events.push(SimEvent::Present { slot });
        state.retire_due();
        drop(state);
        self.gpu.notify();

        self.next_in_rotation = (slot + 1) % self.buffer_count;

        if (sync_interval == 0) != (self.sync_interval == 0) {
            self.sync_interval = sync_interval;
            return Ok(PresentStatus::Suboptimal);
        }
        Ok(PresentStatus::Presented)
    }

    fn recreate(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let mut state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        if width == 0 || height == 0 {
            return Err(RhiError::InitializationFailed(format!(
                "cannot recreate a {width}x{height} swapchain"
            )));
        }
        if state.stats.live_views > 0 {
            let live = state.stats.live_views;
            state.violation(format!("swapchain recreated with {live} live view(s)"));
        }
        if !state.in_flight.is_empty() {
            let pending = state.in_flight.len();
            state.violation(format!("swapchain recreated with {pending} signal(s) in flight"));
        }

        state.generation += 1;
        state.buffer_states = vec![ResourceState::Presentable; self.buffer_count];
        state.stats.swapchain_recreations += 1;
        state.events.push(SimEvent::Recreate { width, height });
        drop(state);

        self.extent = Extent2D::new(width, height);
        self.current = None;
        self.next_in_rotation = 0;
        debug!("Simulated swapchain recreated: {}x{}", width, height);
        Ok(())
    }
}
