//! Frame fence: the CPU/GPU completion counter used for frame pacing.
//!
//! A single backend [`Fence`] carries a monotonically increasing 64-bit
//! value. Every signal request draws a fresh value from one global counter,
//! so values signaled for the same frame slot are strictly increasing and
//! values never decrease across slots either.
//!
//! # Overview
//!
//! ```text
//! CPU                                   GPU queue
//! ---                                   ---------
//! submit(frame N commands)  ─────────▶  execute
//! signal_next(slot) = V     ─────────▶  fence := V  (when reached)
//! ...
//! wait_for(slot, V)         ◀─ blocks only while completed_value() < V
//! ```
//!
//! [`FrameFence::wait_for`] checks the completed value first and returns
//! without touching the blocking primitive when the GPU is already there.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backend::{CommandQueue, Fence};
use crate::error::{RhiError, RhiResult};
use crate::types::{FrameSlot, WaitStatus};

/// How a [`FrameFence::wait_for`] call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The GPU had already reached the value; the CPU did not block.
    AlreadyComplete,
    /// The CPU blocked on the fence for `waited`.
    Blocked { waited: Duration },
}

impl WaitOutcome {
    #[inline]
    pub fn blocked(&self) -> bool {
        matches!(self, WaitOutcome::Blocked { .. })
    }
}

/// Fence plus the global counter its signal values are drawn from.
///
/// Per-slot pending values are not kept here; the caller records the value
/// returned by [`FrameFence::signal_next`] against its slot.
pub struct FrameFence<F> {
    fence: F,
    /// Last value handed out by [`FrameFence::signal_next`] or
    /// [`FrameFence::signal_queue`].
    last_issued: u64,
    /// `None` blocks indefinitely.
    timeout: Option<Duration>,
}

impl<F: Fence> FrameFence<F> {
    /// Wraps `fence`, whose current value becomes the starting point.
    pub fn new(fence: F, timeout: Option<Duration>) -> RhiResult<Self> {
        let start = fence.completed_value()?;
        Ok(Self {
            fence,
            last_issued: start,
            timeout,
        })
    }

    /// Returns the wrapped backend fence.
    #[inline]
    pub fn inner(&self) -> &F {
        &self.fence
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[inline]
    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    /// Highest value the GPU has completed.
    #[inline]
    pub fn completed_value(&self) -> RhiResult<u64> {
        self.fence.completed_value()
    }

    /// Issues the next value on `queue` for the frame recorded in `slot`
    /// and returns it.
    ///
    /// The counter only advances if the queue accepted the signal.
    pub fn signal_next<Q>(&mut self, queue: &Q, slot: FrameSlot) -> RhiResult<u64>
    where
        Q: CommandQueue<Fence = F>,
    {
        let value = self.signal_queue(queue)?;
        debug!("Slot {} retires at {}", slot, value);
        Ok(value)
    }

    /// Issues the next value on `queue` without attributing it to a slot.
    /// Used when draining queues.
    pub fn signal_queue<Q>(&mut self, queue: &Q) -> RhiResult<u64>
    where
        Q: CommandQueue<Fence = F>,
    {
        let value = self.last_issued + 1;
        queue.signal(&self.fence, value)?;
        self.last_issued = value;
        debug!("Signal {} enqueued on {} queue", value, queue.kind());
        Ok(value)
    }

    /// Waits until the GPU has completed `value` for `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SynchronizationTimeout`] if a timeout is
    /// configured and expires, or [`RhiError::DeviceLost`].
    pub fn wait_for(&self, slot: FrameSlot, value: u64) -> RhiResult<WaitOutcome> {
        self.block_until(value, Some(slot))
    }

    /// Waits until the GPU has completed `value`, regardless of slot.
    pub fn wait_for_value(&self, value: u64) -> RhiResult<WaitOutcome> {
        self.block_until(value, None)
    }

    fn block_until(&self, value: u64, slot: Option<FrameSlot>) -> RhiResult<WaitOutcome> {
        if self.fence.completed_value()? >= value {
            return Ok(WaitOutcome::AlreadyComplete);
        }

        let start = Instant::now();
        match self.fence.wait(value, self.timeout)? {
            WaitStatus::Signaled => {
                let waited = start.elapsed();
                debug!("Blocked {:?} for fence value {} (slot {:?})", waited, value, slot);
                Ok(WaitOutcome::Blocked { waited })
            }
            WaitStatus::TimedOut => {
                let waited = start.elapsed();
                warn!(
                    "Fence wait for value {} (slot {:?}) timed out after {:?}",
                    value, slot, waited
                );
                Err(RhiError::SynchronizationTimeout {
                    slot,
                    value,
                    waited,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Device;
    use crate::sim::{GpuPacing, SimGpu};
    use crate::types::QueueKind;

    fn fence_on(gpu: &SimGpu, timeout: Option<Duration>) -> FrameFence<crate::sim::SimFence> {
        let fence = gpu.device().create_fence(0).unwrap();
        FrameFence::new(fence, timeout).unwrap()
    }

    #[test]
    fn test_signal_values_strictly_increase() {
        let gpu = SimGpu::with_pacing(GpuPacing::Immediate);
        let queue = gpu.device().create_queue(QueueKind::Graphics).unwrap();
        let mut fence = fence_on(&gpu, None);

        let mut previous = [0u64; 3];
        for frame in 0..12 {
            let slot = frame % 3;
            let value = fence.signal_next(&queue, slot).unwrap();
            assert!(value > previous[slot]);
            assert_eq!(fence.last_issued(), value);
            previous[slot] = value;
        }
        assert_eq!(fence.last_issued(), 12);
    }

    #[test]
    fn test_completed_wait_skips_blocking_primitive() {
        let gpu = SimGpu::with_pacing(GpuPacing::Immediate);
        let queue = gpu.device().create_queue(QueueKind::Graphics).unwrap();
        let mut fence = fence_on(&gpu, None);

        let value = fence.signal_next(&queue, 0).unwrap();
        assert_eq!(fence.completed_value().unwrap(), value);

        let outcome = fence.wait_for(0, value).unwrap();
        assert_eq!(outcome, WaitOutcome::AlreadyComplete);
        assert_eq!(gpu.stats().blocking_waits, 0);
    }

    #[test]
    fn test_pending_wait_blocks() {
        let gpu = SimGpu::with_pacing(GpuPacing::Lagged(2));
        let queue = gpu.device().create_queue(QueueKind::Graphics).unwrap();
        let mut fence = fence_on(&gpu, None);

        let value = fence.signal_next(&queue, 1).unwrap();
        assert!(fence.completed_value().unwrap() < value);

        let outcome = fence.wait_for(1, value).unwrap();
        assert!(outcome.blocked());
        assert_eq!(gpu.stats().blocking_waits, 1);
        assert!(fence.completed_value().unwrap() >= value);
    }

    #[test]
    fn test_timeout_reports_slot_and_value() {
        let gpu = SimGpu::with_pacing(GpuPacing::Manual);
        let queue = gpu.device().create_queue(QueueKind::Graphics).unwrap();
        let mut fence = fence_on(&gpu, Some(Duration::from_millis(10)));

        let value = fence.signal_next(&queue, 2).unwrap();
        match fence.wait_for(2, value) {
            Err(RhiError::SynchronizationTimeout {
                slot,
                value: timed_out,
                ..
            }) => {
                assert_eq!(slot, Some(2));
                assert_eq!(timed_out, value);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_signal_does_not_advance() {
        let gpu = SimGpu::with_pacing(GpuPacing::Immediate);
        let queue = gpu.device().create_queue(QueueKind::Graphics).unwrap();
        let mut fence = fence_on(&gpu, None);

        fence.signal_next(&queue, 0).unwrap();
        gpu.lose_device();

        assert!(matches!(fence.signal_next(&queue, 1), Err(RhiError::DeviceLost)));
        assert_eq!(fence.last_issued(), 1);
    }
}
