//! Simulated GPU backend.
//!
//! A deterministic, CPU-only implementation of the backend traits. It
//! models one GPU timeline shared by every queue, a presentation engine
//! with a configurable buffer order, and the per-buffer resource states,
//! so frame pacing can be exercised and inspected without a driver.
//!
//! # Pacing
//!
//! [`GpuPacing`] decides when a queued fence signal is reached:
//!
//! - `Immediate`: as soon as it is enqueued.
//! - `Lagged(k)`: after `k` further presents. A blocking CPU wait on a
//!   lagged value completes the queued work up to that value, as a real GPU
//!   eventually would.
//! - `Manual`: only through [`SimGpu::complete_all`] or
//!   [`SimGpu::complete_through`], typically from another thread.
//!
//! # Inspection
//!
//! [`SimGpu::stats`] returns counters (blocking waits, signals, presents,
//! live views, device creation attempts) and every detected misuse, such as
//! a barrier from the wrong state or a clear through a stale view.
//! [`SimGpu::events`] returns the ordered log of GPU-visible operations.

mod device;
mod swapchain;
mod window;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::types::{FrameSlot, QueueKind, ResourceState};

pub use device::{
    SimAdapter, SimAdapterDesc, SimCommandList, SimDevice, SimFence, SimImage, SimInstance,
    SimQueue, SimView,
};
pub use swapchain::SimSwapchain;
pub use window::HeadlessWindow;

/// When queued GPU work completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPacing {
    #[default]
    Immediate,
    /// Work completes `n` presents after it was queued.
    Lagged(u64),
    Manual,
}

/// GPU-visible operation, in the order the simulated GPU saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Submit {
        queue: QueueKind,
    },
    Barrier {
        slot: FrameSlot,
        before: ResourceState,
        after: ResourceState,
    },
    Clear {
        slot: FrameSlot,
        color: [f32; 4],
    },
    Signal {
        queue: QueueKind,
        value: u64,
    },
    Present {
        slot: FrameSlot,
    },
    Recreate {
        width: u32,
        height: u32,
    },
}

/// Counters and detected misuse.
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    /// Adapter names, in the order a device creation was attempted.
    pub device_creation_attempts: Vec<String>,
    /// Calls that reached the fence's blocking primitive.
    pub blocking_waits: u64,
    pub submits: u64,
    pub signals: u64,
    pub presents: u64,
    pub swapchain_recreations: u64,
    pub views_created: u64,
    pub live_views: usize,
    pub violations: Vec<String>,
}

#[derive(Debug)]
struct PendingSignal {
    fence: usize,
    value: u64,
    due: u64,
}

#[derive(Debug, Default)]
struct GpuState {
    pacing: GpuPacing,
    presents: u64,
    in_flight: VecDeque<PendingSignal>,
    fence_values: Vec<u64>,
    buffer_states: Vec<ResourceState>,
    generation: u64,
    present_script: VecDeque<FrameSlot>,
    device_lost: bool,
    fail_next_present: bool,
    /// View creations left before the next one fails.
    views_before_failure: Option<u64>,
    failing_queues: HashSet<QueueKind>,
    stats: SimStats,
    events: Vec<SimEvent>,
}

impl GpuState {
    fn violation(&mut self, message: String) {
        trace!("GPU misuse: {}", message);
        self.stats.violations.push(message);
    }

    fn complete(&mut self, signal: PendingSignal) {
        let current = &mut self.fence_values[signal.fence];
        *current = (*current).max(signal.value);
    }

    fn enqueue_signal(&mut self, fence: usize, value: u64) {
        let due = match self.pacing {
            GpuPacing::Immediate => {
                self.complete(PendingSignal { fence, value, due: 0 });
                return;
            }
            GpuPacing::Lagged(lag) => self.presents.saturating_add(lag),
            GpuPacing::Manual => u64::MAX,
        };
        self.in_flight.push_back(PendingSignal { fence, value, due });
    }

    /// Completes work whose due present count has been reached.
    fn retire_due(&mut self) {
        while self
            .in_flight
            .front()
            .is_some_and(|signal| signal.due <= self.presents)
        {
            if let Some(signal) = self.in_flight.pop_front() {
                self.complete(signal);
            }
        }
    }

    /// Completes queued work in order until `fence` reaches `value`.
    fn retire_through(&mut self, fence: usize, value: u64) {
        while self.fence_values[fence] < value {
            match self.in_flight.pop_front() {
                Some(signal) => self.complete(signal),
                None => break,
            }
        }
    }

    fn retire_all(&mut self) {
        while let Some(signal) = self.in_flight.pop_front() {
            self.complete(signal);
        }
    }
}

/// Handle to a simulated GPU. Cheap to clone; all clones share one timeline.
#[derive(Clone, Default)]
pub struct SimGpu {
    shared: Arc<(Mutex<GpuState>, Condvar)>,
}

impl SimGpu {
    /// Creates a GPU that completes work immediately.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pacing(pacing: GpuPacing) -> Self {
        let gpu = Self::new();
        gpu.set_pacing(pacing);
        gpu
    }

    /// Changes pacing for work queued from now on.
    pub fn set_pacing(&self, pacing: GpuPacing) {
        self.lock().pacing = pacing;
    }

    /// Returns a device on this GPU.
    pub fn device(&self) -> SimDevice {
        SimDevice::new(self.clone())
    }

    pub fn stats(&self) -> SimStats {
        self.lock().stats.clone()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Makes the presentation engine hand out `slots` in this order before
    /// falling back to rotation.
    pub fn script_present_order(&self, slots: impl IntoIterator<Item = FrameSlot>) {
        self.lock().present_script.extend(slots);
    }

    /// The next present fails with [`crate::RhiError::PresentFailed`].
    pub fn fail_next_present(&self) {
        self.lock().fail_next_present = true;
    }

    /// After `count` more successful render target views, the next view
    /// creation fails once with [`crate::RhiError::InitializationFailed`].
    pub fn fail_view_creation_after(&self, count: u64) {
        self.lock().views_before_failure = Some(count);
    }

    /// Queue creation of `kind` fails from now on.
    pub fn fail_queue_creation(&self, kind: QueueKind) {
        self.lock().failing_queues.insert(kind);
    }

    /// Every subsequent operation reports [`crate::RhiError::DeviceLost`].
    /// Blocked waiters are woken.
    pub fn lose_device(&self) {
        self.lock().device_lost = true;
        self.notify();
    }

    /// Completes all queued work.
    pub fn complete_all(&self) {
        self.lock().retire_all();
        self.notify();
    }

    /// Completes queued work in order up to and including the signal of
    /// `value`.
    pub fn complete_through(&self, value: u64) {
        {
            let mut state = self.lock();
            while state
                .in_flight
                .front()
                .is_some_and(|signal| signal.value <= value)
            {
                if let Some(signal) = state.in_flight.pop_front() {
                    state.complete(signal);
                }
            }
        }
        self.notify();
    }

    /// Number of fence signals queued but not yet reached.
    pub fn pending_signals(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Current state of swapchain buffer `slot`.
    pub fn buffer_state(&self, slot: FrameSlot) -> Option<ResourceState> {
        self.lock().buffer_states.get(slot).copied()
    }

    fn lock(&self) -> MutexGuard<'_, GpuState> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.shared.1.notify_all();
    }

    fn condvar(&self) -> &Condvar {
        &self.shared.1
    }
}
