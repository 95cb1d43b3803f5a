//! Frame synchronization.
//!
//! This module provides the [`FrameSynchronizer`], which paces the render
//! loop against the GPU across the pool of frame slots.
//!
//! # Overview
//!
//! Each iteration of the render loop is one frame:
//!
//! ```text
//! begin_frame                                   end_frame
//! ───────────                                   ─────────
//! slot := swapchain.current_slot()              barrier RENDERABLE -> PRESENTABLE
//! wait until fence >= pending(slot)   <- CPU    close + submit on graphics
//! retire(slot)                           block  pending(slot) := signal_next()
//! barrier PRESENTABLE -> RENDERABLE             present
//! viewport / scissor
//! ```
//!
//! The active slot is whatever the presentation engine reports; it is never
//! predicted by rotation. The CPU blocks only when the GPU has not yet
//! completed the last work submitted for that slot, so at most
//! `frame_count` frames are in flight.
//!
//! # Phases
//!
//! `Idle -> AwaitingSlot -> Recording -> Submitted -> Presented -> Idle`.
//! A failure inside a frame leaves the synchronizer `Faulted` until
//! [`FrameSynchronizer::reset`]. While a resize is in progress
//! (between [`FrameSynchronizer::invalidate`] and a successful
//! [`FrameSynchronizer::recreate`]) frame operations fail with
//! [`RhiError::ResizeInProgress`].

use std::time::Duration;

use tracing::{debug, info, warn};

use fivemapper_rhi::backend::{CommandList, CommandQueue, Device, Swapchain, WindowSource};
use fivemapper_rhi::sync::WaitOutcome;
use fivemapper_rhi::{FrameSlot, PresentStatus, ResourceState, RhiError, RhiResult};

use crate::device_resources::DeviceResources;

/// Shadow table of per-slot pacing state.
///
/// The only place pending fence values and buffer states are written.
#[derive(Debug, Clone)]
pub struct SlotTable {
    /// Last fence value signaled for each slot.
    pending: Vec<u64>,
    /// Last fence value known complete when the slot was reused.
    retired: Vec<u64>,
    states: Vec<ResourceState>,
    presents: Vec<u64>,
}

impl SlotTable {
    pub fn new(slot_count: usize) -> Self {
        Self {
            pending: vec![0; slot_count],
            retired: vec![0; slot_count],
            states: vec![ResourceState::Presentable; slot_count],
            presents: vec![0; slot_count],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn check(&self, slot: FrameSlot) -> RhiResult<()> {
        if slot >= self.pending.len() {
            return Err(RhiError::SlotOutOfRange {
                slot,
                count: self.pending.len(),
            });
        }
        Ok(())
    }

    /// Fence value the GPU must reach before `slot` may be reused.
    pub fn pending(&self, slot: FrameSlot) -> RhiResult<u64> {
        self.check(slot)?;
        Ok(self.pending[slot])
    }

    pub fn retired(&self, slot: FrameSlot) -> RhiResult<u64> {
        self.check(slot)?;
        Ok(self.retired[slot])
    }

    pub fn state(&self, slot: FrameSlot) -> RhiResult<ResourceState> {
        self.check(slot)?;
        Ok(self.states[slot])
    }

    /// Number of times the buffer of `slot` was presented.
    pub fn presents(&self, slot: FrameSlot) -> RhiResult<u64> {
        self.check(slot)?;
        Ok(self.presents[slot])
    }

    /// Records the value just signaled for `slot`.
    pub fn record_signal(&mut self, slot: FrameSlot, value: u64) -> RhiResult<()> {
        self.check(slot)?;
        debug_assert!(value > self.pending[slot], "fence values must increase per slot");
        self.pending[slot] = value;
        Ok(())
    }

    /// Marks the work last submitted for `slot` as finished, given the
    /// fence value the GPU has completed.
    pub fn retire(&mut self, slot: FrameSlot, completed: u64) -> RhiResult<()> {
        self.check(slot)?;
        let pending = self.pending[slot];
        if completed < pending {
            return Err(RhiError::SlotNotRetirable {
                slot,
                pending,
                completed,
            });
        }
        self.retired[slot] = pending;
        Ok(())
    }

    /// Moves the buffer of `slot` from `before` to `after`.
    pub fn transition(
        &mut self,
        slot: FrameSlot,
        before: ResourceState,
        after: ResourceState,
    ) -> RhiResult<()> {
        self.check(slot)?;
        let found = self.states[slot];
        if found != before {
            return Err(RhiError::ResourceStateMismatch {
                slot,
                expected: before,
                found,
            });
        }
        self.states[slot] = after;
        Ok(())
    }

    pub fn mark_presented(&mut self, slot: FrameSlot) -> RhiResult<()> {
        self.check(slot)?;
        self.presents[slot] += 1;
        Ok(())
    }

    /// Fresh swapchain buffers start presentable.
    pub fn reset_states(&mut self) {
        self.states.fill(ResourceState::Presentable);
    }
}

/// Where the synchronizer is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    AwaitingSlot,
    Recording,
    Submitted,
    Presented,
    /// A frame operation failed; only `reset` leaves this phase.
    Faulted,
    ShutDown,
}

impl FramePhase {
    pub fn name(self) -> &'static str {
        match self {
            FramePhase::Idle => "idle",
            FramePhase::AwaitingSlot => "awaiting_slot",
            FramePhase::Recording => "recording",
            FramePhase::Submitted => "submitted",
            FramePhase::Presented => "presented",
            FramePhase::Faulted => "faulted",
            FramePhase::ShutDown => "shut_down",
        }
    }

    /// True while a frame has been begun but not presented.
    #[inline]
    pub fn in_frame(self) -> bool {
        matches!(
            self,
            FramePhase::AwaitingSlot
                | FramePhase::Recording
                | FramePhase::Submitted
                | FramePhase::Presented
        )
    }
}

/// Pacing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames_completed: u64,
    /// Frames whose `begin_frame` had to block on the fence.
    pub cpu_blocks: u64,
    pub blocked_time: Duration,
    pub last_completed_value: u64,
}

/// Result of [`FrameSynchronizer::begin_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBegin {
    pub slot: FrameSlot,
    /// Fence value waited for before the slot was reused.
    pub awaited_value: u64,
    pub outcome: WaitOutcome,
}

/// Result of [`FrameSynchronizer::end_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEnd {
    pub slot: FrameSlot,
    /// Fence value signaled for this frame's work.
    pub fence_value: u64,
    pub status: PresentStatus,
}

/// Orchestrates frame pacing over a [`DeviceResources`].
///
/// Owns no GPU object; it is the sole writer of the active slot and of the
/// per-slot pending fence values.
#[derive(Debug)]
pub struct FrameSynchronizer {
    slots: SlotTable,
    phase: FramePhase,
    active_slot: Option<FrameSlot>,
    invalidated: bool,
    stats: FrameStats,
}

impl FrameSynchronizer {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: SlotTable::new(slot_count),
            phase: FramePhase::Idle,
            active_slot: None,
            invalidated: false,
            stats: FrameStats::default(),
        }
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Slot of the frame being recorded.
    #[inline]
    pub fn active_slot(&self) -> Option<FrameSlot> {
        self.active_slot
    }

    /// True between `invalidate` and a successful `recreate`.
    #[inline]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    fn reject(&self, operation: &'static str) -> RhiError {
        RhiError::InvalidFramePhase {
            operation,
            phase: self.phase.name(),
        }
    }

    /// Checks that frame operations are allowed at all.
    fn check_open(&self, operation: &'static str) -> RhiResult<()> {
        if self.phase == FramePhase::ShutDown {
            return Err(self.reject(operation));
        }
        if self.invalidated {
            return Err(RhiError::ResizeInProgress);
        }
        Ok(())
    }

    fn fault(&mut self, error: &RhiError) {
        warn!(
            "Frame failed in phase {} (slot {:?}): {}",
            self.phase.name(),
            self.active_slot,
            error
        );
        self.phase = FramePhase::Faulted;
    }

    /// Starts a frame: waits until the current slot's buffer is free, then
    /// opens its command list with the buffer renderable.
    ///
    /// # Errors
    ///
    /// - [`RhiError::ResizeInProgress`] while invalidated
    /// - [`RhiError::InvalidFramePhase`] unless idle
    /// - [`RhiError::SynchronizationTimeout`] if a timeout is configured
    pub fn begin_frame<D: Device>(&mut self, res: &mut DeviceResources<D>) -> RhiResult<FrameBegin> {
        self.check_open("begin_frame")?;
        if self.phase != FramePhase::Idle {
            return Err(self.reject("begin_frame"));
        }

        self.phase = FramePhase::AwaitingSlot;
        match self.open_slot(res) {
            Ok(begin) => {
                self.phase = FramePhase::Recording;
                Ok(begin)
            }
            Err(e) => {
                self.fault(&e);
                Err(e)
            }
        }
    }

    fn open_slot<D: Device>(&mut self, res: &mut DeviceResources<D>) -> RhiResult<FrameBegin> {
        let slot = res.swapchain.current_slot()?;
        let awaited_value = self.slots.pending(slot)?;

        // CPU throttling point
        let outcome = res.fence.wait_for(slot, awaited_value)?;
        let completed = res.fence.completed_value()?;
        self.slots.retire(slot, completed)?;

        if let WaitOutcome::Blocked { waited } = outcome {
            self.stats.cpu_blocks += 1;
            self.stats.blocked_time += waited;
        }
        self.stats.last_completed_value = completed;

        self.slots
            .transition(slot, ResourceState::Presentable, ResourceState::Renderable)?;
        let image = res.swapchain.buffer(slot)?;
        let list = &mut res.command_lists[slot];
        list.begin()?;
        list.resource_barrier(&image, ResourceState::Presentable, ResourceState::Renderable);
        list.set_viewport(&res.viewport);
        list.set_scissor(&res.scissor);

        self.active_slot = Some(slot);
        debug!(
            "Frame {} on slot {} (awaited {}, {:?})",
            self.stats.frames_completed + 1,
            slot,
            awaited_value,
            outcome
        );

        Ok(FrameBegin {
            slot,
            awaited_value,
            outcome,
        })
    }

    /// Finishes the frame: returns the buffer to presentable, submits,
    /// signals the slot's fence value and presents.
    pub fn end_frame<D: Device>(&mut self, res: &mut DeviceResources<D>) -> RhiResult<FrameEnd> {
        self.check_open("end_frame")?;
        let slot = match (self.phase, self.active_slot) {
            (FramePhase::Recording, Some(slot)) => slot,
            _ => return Err(self.reject("end_frame")),
        };

        match self.submit_and_present(res, slot) {
            Ok(end) => {
                self.active_slot = None;
                self.stats.frames_completed += 1;
                self.phase = FramePhase::Idle;
                Ok(end)
            }
            Err(e) => {
                self.fault(&e);
                Err(e)
            }
        }
    }

    fn submit_and_present<D: Device>(
        &mut self,
        res: &mut DeviceResources<D>,
        slot: FrameSlot,
    ) -> RhiResult<FrameEnd> {
        self.slots
            .transition(slot, ResourceState::Renderable, ResourceState::Presentable)?;
        let image = res.swapchain.buffer(slot)?;
        let list = &mut res.command_lists[slot];
        list.resource_barrier(&image, ResourceState::Renderable, ResourceState::Presentable);
        list.end()?;

        let graphics = res.queues.graphics();
        graphics.submit(list)?;
        self.phase = FramePhase::Submitted;

        let fence_value = res.fence.signal_next(graphics, slot)?;
        self.slots.record_signal(slot, fence_value)?;

        let status = res.swapchain.present(graphics, res.sync_interval)?;
        self.phase = FramePhase::Presented;
        self.slots.mark_presented(slot)?;

        if status == PresentStatus::Suboptimal {
            debug!("Present of slot {} reported a suboptimal swapchain", slot);
        }

        Ok(FrameEnd {
            slot,
            fence_value,
            status,
        })
    }

    /// Waits until every queue and every slot is idle.
    ///
    /// Each queue gets a fresh signal that is waited on in turn, graphics
    /// first; then every slot's pending value is waited on and retired.
    pub fn drain<D: Device>(&mut self, res: &mut DeviceResources<D>) -> RhiResult<()> {
        for (kind, queue) in res.queues.iter() {
            let value = res.fence.signal_queue(queue)?;
            res.fence.wait_for_value(value)?;
            debug!("{} queue drained at {}", kind, value);
        }

        for slot in 0..self.slots.len() {
            let pending = self.slots.pending(slot)?;
            res.fence.wait_for(slot, pending)?;
            let completed = res.fence.completed_value()?;
            self.slots.retire(slot, completed)?;
            self.stats.last_completed_value = completed;
        }

        Ok(())
    }

    /// Drains the GPU, then releases every view. Safe to call more than once.
    ///
    /// If the drain fails the views stay bound: after a timeout the
    /// synchronizer is left `Faulted` and a later call retries the drain.
    /// A lost device runs no further work, so its views are released and the
    /// synchronizer is shut down regardless.
    pub fn shutdown<D: Device>(&mut self, res: &mut DeviceResources<D>) -> RhiResult<()> {
        if self.phase == FramePhase::ShutDown {
            debug!("Frame synchronizer already shut down");
            return Ok(());
        }

        if let Err(e) = self.drain(res) {
            if e.is_fatal() {
                let released = res.release_views();
                self.phase = FramePhase::ShutDown;
                self.active_slot = None;
                warn!("Shut down on a lost device ({} views released): {}", released, e);
            } else {
                self.fault(&e);
                warn!("Shutdown could not drain the GPU, views kept: {}", e);
            }
            return Err(e);
        }

        let released = res.release_views();
        self.phase = FramePhase::ShutDown;
        self.active_slot = None;
        info!(
            "Frame synchronizer shut down after {} frames ({} views released)",
            self.stats.frames_completed, released
        );
        Ok(())
    }

    /// Begins a resize: drains the GPU and releases the views. Frame
    /// operations fail with [`RhiError::ResizeInProgress`] until
    /// [`recreate`](Self::recreate) succeeds.
    pub fn invalidate<D: Device>(&mut self, res: &mut DeviceResources<D>) -> RhiResult<()> {
        match self.phase {
            FramePhase::Idle | FramePhase::Faulted => {}
            _ => return Err(self.reject("invalidate")),
        }
        if self.invalidated {
            return Ok(());
        }

        self.drain(res)?;
        res.release_views();
        self.invalidated = true;
        debug!("Swapchain invalidated");
        Ok(())
    }

    /// Rebuilds the swapchain at the window's current size.
    ///
    /// Returns `Ok(false)` and stays invalidated while the window has no
    /// client area (minimized).
    pub fn recreate<D: Device>(
        &mut self,
        res: &mut DeviceResources<D>,
        window: &dyn WindowSource,
    ) -> RhiResult<bool> {
        self.invalidate(res)?;

        let size = window.client_size();
        if size.is_empty() {
            debug!("Recreation deferred: window is {}x{}", size.width, size.height);
            return Ok(false);
        }

        if let Err(e) = res.recreate_swapchain(size.width, size.height) {
            self.fault(&e);
            return Err(e);
        }

        self.slots.reset_states();
        self.active_slot = None;
        self.invalidated = false;
        self.phase = FramePhase::Idle;
        Ok(true)
    }

    /// Recovers from a failed frame: abandons it, drains and recreates.
    pub fn reset<D: Device>(
        &mut self,
        res: &mut DeviceResources<D>,
        window: &dyn WindowSource,
    ) -> RhiResult<bool> {
        if self.phase == FramePhase::ShutDown {
            return Err(self.reject("reset"));
        }
        if self.phase.in_frame() {
            debug!("Abandoning frame on slot {:?}", self.active_slot);
            self.phase = FramePhase::Faulted;
        }

        info!("Resetting frame synchronization");
        match self.recreate(res, window) {
            Ok(recreated) => Ok(recreated),
            Err(e) => {
                self.phase = FramePhase::Faulted;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameSyncConfig;
    use fivemapper_rhi::sim::{GpuPacing, HeadlessWindow, SimDevice, SimGpu, SimInstance};

    fn setup(pacing: GpuPacing) -> (SimGpu, DeviceResources<SimDevice>, FrameSynchronizer) {
        let gpu = SimGpu::with_pacing(pacing);
        let instance = SimInstance::single(gpu.clone());
        let window = HeadlessWindow::new(320, 240);
        let resources =
            DeviceResources::new(&instance, &window, &FrameSyncConfig::default()).unwrap();
        (gpu, resources, FrameSynchronizer::new(3))
    }

    #[test]
    fn test_slot_table_transitions() {
        let mut table = SlotTable::new(3);
        table
            .transition(0, ResourceState::Presentable, ResourceState::Renderable)
            .unwrap();
        assert_eq!(table.state(0).unwrap(), ResourceState::Renderable);

        let err = table
            .transition(0, ResourceState::Presentable, ResourceState::Renderable)
            .unwrap_err();
        assert!(matches!(
            err,
            RhiError::ResourceStateMismatch {
                slot: 0,
                expected: ResourceState::Presentable,
                found: ResourceState::Renderable,
            }
        ));

        table.reset_states();
        assert_eq!(table.state(0).unwrap(), ResourceState::Presentable);
    }

    #[test]
    fn test_slot_table_retire_requires_completion() {
        let mut table = SlotTable::new(2);
        table.record_signal(1, 5).unwrap();
        assert!(matches!(
            table.retire(1, 4),
            Err(RhiError::SlotNotRetirable {
                slot: 1,
                pending: 5,
                completed: 4
            })
        ));
        table.retire(1, 7).unwrap();
        assert_eq!(table.retired(1).unwrap(), 5);
        assert!(matches!(
            table.pending(2),
            Err(RhiError::SlotOutOfRange { slot: 2, count: 2 })
        ));
    }

    #[test]
    fn test_frame_cycle_phases() {
        let (_gpu, mut res, mut sync) = setup(GpuPacing::Immediate);

        let begin = sync.begin_frame(&mut res).unwrap();
        assert_eq!(sync.phase(), FramePhase::Recording);
        assert_eq!(sync.active_slot(), Some(begin.slot));
        assert_eq!(begin.outcome, WaitOutcome::AlreadyComplete);

        let end = sync.end_frame(&mut res).unwrap();
        assert_eq!(sync.phase(), FramePhase::Idle);
        assert_eq!(end.slot, begin.slot);
        assert_eq!(end.status, PresentStatus::Presented);
        assert_eq!(sync.slots().pending(end.slot).unwrap(), end.fence_value);
        assert_eq!(sync.slots().presents(end.slot).unwrap(), 1);
        assert_eq!(sync.stats().frames_completed, 1);
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let (_gpu, mut res, mut sync) = setup(GpuPacing::Immediate);

        assert!(matches!(
            sync.end_frame(&mut res),
            Err(RhiError::InvalidFramePhase {
                operation: "end_frame",
                phase: "idle"
            })
        ));

        sync.begin_frame(&mut res).unwrap();
        assert!(matches!(
            sync.begin_frame(&mut res),
            Err(RhiError::InvalidFramePhase {
                operation: "begin_frame",
                phase: "recording"
            })
        ));
        assert!(sync.invalidate(&mut res).is_err());
    }

    #[test]
    fn test_invalidated_rejects_frames() {
        let (_gpu, mut res, mut sync) = setup(GpuPacing::Immediate);

        sync.invalidate(&mut res).unwrap();
        assert!(sync.is_invalidated());
        assert!(matches!(sync.begin_frame(&mut res), Err(RhiError::ResizeInProgress)));
        assert!(matches!(sync.end_frame(&mut res), Err(RhiError::ResizeInProgress)));
        assert_eq!(res.views().bound_count(), 0);

        let window = HeadlessWindow::new(800, 600);
        assert!(sync.recreate(&mut res, &window).unwrap());
        assert!(!sync.is_invalidated());
        sync.begin_frame(&mut res).unwrap();
    }

    #[test]
    fn test_recreate_deferred_while_minimized() {
        let (_gpu, mut res, mut sync) = setup(GpuPacing::Immediate);

        let minimized = HeadlessWindow::new(0, 0);
        assert!(!sync.recreate(&mut res, &minimized).unwrap());
        assert!(sync.is_invalidated());

        let restored = HeadlessWindow::new(320, 240);
        assert!(sync.recreate(&mut res, &restored).unwrap());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (gpu, mut res, mut sync) = setup(GpuPacing::Lagged(2));

        sync.begin_frame(&mut res).unwrap();
        sync.end_frame(&mut res).unwrap();
        assert_eq!(gpu.pending_signals(), 1);

        sync.shutdown(&mut res).unwrap();
        assert_eq!(gpu.pending_signals(), 0);
        assert_eq!(sync.phase(), FramePhase::ShutDown);
        assert_eq!(gpu.stats().live_views, 0);

        sync.shutdown(&mut res).unwrap();
        assert!(matches!(
            sync.begin_frame(&mut res),
            Err(RhiError::InvalidFramePhase {
                phase: "shut_down",
                ..
            })
        ));
    }

    #[test]
    fn test_shutdown_keeps_views_until_drained() {
        let gpu = SimGpu::with_pacing(GpuPacing::Manual);
        let instance = SimInstance::single(gpu.clone());
        let window = HeadlessWindow::new(320, 240);
        let config = FrameSyncConfig::default().with_wait_timeout(Some(Duration::from_millis(20)));
        let mut res = DeviceResources::new(&instance, &window, &config).unwrap();
        let mut sync = FrameSynchronizer::new(3);

        for _ in 0..3 {
            sync.begin_frame(&mut res).unwrap();
            sync.end_frame(&mut res).unwrap();
        }

        assert!(matches!(
            sync.shutdown(&mut res),
            Err(RhiError::SynchronizationTimeout { .. })
        ));
        assert_eq!(sync.phase(), FramePhase::Faulted);
        assert!(gpu.pending_signals() > 0);
        assert_eq!(res.views().bound_count(), 3);
        assert_eq!(gpu.stats().live_views, 3);

        gpu.complete_all();
        gpu.set_pacing(GpuPacing::Immediate);
        sync.shutdown(&mut res).unwrap();
        assert_eq!(sync.phase(), FramePhase::ShutDown);
        assert_eq!(gpu.pending_signals(), 0);
        assert_eq!(gpu.stats().live_views, 0);
    }

    #[test]
    fn test_failed_recreate_recovers_on_reset() {
        let (gpu, mut res, mut sync) = setup(GpuPacing::Immediate);
        let window = HeadlessWindow::new(640, 480);

        gpu.fail_view_creation_after(1);
        assert!(sync.recreate(&mut res, &window).is_err());
        assert_eq!(sync.phase(), FramePhase::Faulted);
        assert_eq!(gpu.stats().live_views, 0);

        assert!(sync.reset(&mut res, &window).unwrap());
        assert_eq!(sync.phase(), FramePhase::Idle);
        assert_eq!(res.views().bound_count(), 3);
        sync.begin_frame(&mut res).unwrap();
        sync.end_frame(&mut res).unwrap();
        assert!(gpu.stats().violations.is_empty());
    }

    #[test]
    fn test_pending_values_recorded_per_slot() {
        let (_gpu, mut res, mut sync) = setup(GpuPacing::Immediate);

        let mut last = [0u64; 3];
        for _ in 0..7 {
            sync.begin_frame(&mut res).unwrap();
            let end = sync.end_frame(&mut res).unwrap();
            assert!(end.fence_value > last[end.slot]);
            assert_eq!(sync.slots().pending(end.slot).unwrap(), end.fence_value);
            assert_eq!(res.fence().last_issued(), end.fence_value);
            last[end.slot] = end.fence_value;
        }
    }

    #[test]
    fn test_drain_signals_every_queue_in_order() {
        let (gpu, mut res, mut sync) = setup(GpuPacing::Lagged(2));
        gpu.clear_events();

        sync.drain(&mut res).unwrap();

        let signals: Vec<_> = gpu
            .events()
            .into_iter()
            .filter_map(|event| match event {
                fivemapper_rhi::sim::SimEvent::Signal { queue, value } => Some((queue, value)),
                _ => None,
            })
            .collect();
        assert_eq!(
            signals,
            vec![
                (fivemapper_rhi::QueueKind::Graphics, 1),
                (fivemapper_rhi::QueueKind::Compute, 2),
                (fivemapper_rhi::QueueKind::Copy, 3),
            ]
        );
        assert_eq!(gpu.pending_signals(), 0);
    }
}
