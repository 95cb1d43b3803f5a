//! Simulated instance, adapters, device and device-owned objects.

use std::time::{Duration, Instant};

use tracing::debug;

use super::{SimEvent, SimGpu, SimSwapchain};
use crate::backend::{Adapter, CommandList, CommandQueue, Device, Fence, Instance, WindowSource};
use crate::error::{RhiError, RhiResult};
use crate::types::{
    AdapterInfo, FeatureLevel, FrameSlot, QueueKind, ResourceState, ScissorRect, SwapchainDesc,
    ViewKind, Viewport, WaitStatus,
};

/// Description of a simulated adapter.
#[derive(Debug, Clone)]
pub struct SimAdapterDesc {
    pub name: String,
    pub is_software: bool,
    pub feature_level: FeatureLevel,
}

impl SimAdapterDesc {
    pub fn hardware(name: &str, feature_level: FeatureLevel) -> Self {
        Self {
            name: name.to_string(),
            is_software: false,
            feature_level,
        }
    }

    pub fn software(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_software: true,
            feature_level: FeatureLevel::V1_3,
        }
    }
}

/// Simulated instance listing a fixed set of adapters.
pub struct SimInstance {
    gpu: SimGpu,
    adapters: Vec<SimAdapterDesc>,
}

impl SimInstance {
    pub fn new(gpu: SimGpu, adapters: Vec<SimAdapterDesc>) -> Self {
        Self { gpu, adapters }
    }

    /// One hardware adapter at feature level 1.3.
    pub fn single(gpu: SimGpu) -> Self {
        Self::new(gpu, vec![SimAdapterDesc::hardware("Simulated GPU", FeatureLevel::V1_3)])
    }
}

impl Instance for SimInstance {
    type Adapter = SimAdapter;

    fn enumerate_adapters(&self) -> RhiResult<Vec<SimAdapter>> {
        Ok(self
            .adapters
            .iter()
            .enumerate()
            .map(|(index, desc)| SimAdapter {
                gpu: self.gpu.clone(),
                desc: desc.clone(),
                index: index as u32,
            })
            .collect())
    }
}

pub struct SimAdapter {
    gpu: SimGpu,
    desc: SimAdapterDesc,
    index: u32,
}

impl Adapter for SimAdapter {
    type Device = SimDevice;

    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.desc.name.clone(),
            vendor_id: 0x1af4,
            device_id: self.index,
            is_software: self.desc.is_software,
            feature_level: self.desc.feature_level,
        }
    }

    fn create_device(&self, min_level: FeatureLevel) -> RhiResult<SimDevice> {
        self.gpu
            .lock()
            .stats
            .device_creation_attempts
            .push(self.desc.name.clone());

        if self.desc.feature_level < min_level {
            return Err(RhiError::FeatureLevelUnsupported {
                required: min_level,
                supported: self.desc.feature_level,
            });
        }

        Ok(SimDevice::new(self.gpu.clone()))
    }
}

/// Simulated logical device.
#[derive(Clone)]
pub struct SimDevice {
    gpu: SimGpu,
}

impl SimDevice {
    pub(super) fn new(gpu: SimGpu) -> Self {
        Self { gpu }
    }

    /// The GPU this device runs on.
    pub fn gpu(&self) -> &SimGpu {
        &self.gpu
    }

    fn check_alive(&self) -> RhiResult<()> {
        if self.gpu.lock().device_lost {
            return Err(RhiError::DeviceLost);
        }
        Ok(())
    }
}

impl Device for SimDevice {
    type Queue = SimQueue;
    type Fence = SimFence;
    type CommandList = SimCommandList;
    type Swapchain = SimSwapchain;
    type Image = SimImage;
    type View = SimView;

    fn create_queue(&self, kind: QueueKind) -> RhiResult<SimQueue> {
        let state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        if state.failing_queues.contains(&kind) {
            return Err(RhiError::InitializationFailed(format!(
                "{kind} queue creation refused"
            )));
        }
        Ok(SimQueue {
            gpu: self.gpu.clone(),
            kind,
        })
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<SimFence> {
        let mut state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        state.fence_values.push(initial_value);
        Ok(SimFence {
            gpu: self.gpu.clone(),
            id: state.fence_values.len() - 1,
        })
    }

    fn create_swapchain(
        &self,
        _queue: &SimQueue,
        _window: &dyn WindowSource,
        desc: &SwapchainDesc,
    ) -> RhiResult<SimSwapchain> {
        self.check_alive()?;
        SimSwapchain::new(self.gpu.clone(), desc)
    }

    fn create_command_list(&self, kind: QueueKind) -> RhiResult<SimCommandList> {
        self.check_alive()?;
        Ok(SimCommandList {
            kind,
            commands: Vec::new(),
            recording: false,
        })
    }

    fn view_stride(&self, kind: ViewKind) -> usize {
        match kind {
            ViewKind::RenderTarget => 32,
            ViewKind::DepthStencil => 48,
            ViewKind::ShaderResource => 64,
            ViewKind::Sampler => 16,
        }
    }

    fn create_render_target_view(&self, image: &SimImage) -> RhiResult<SimView> {
        let mut state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        match state.views_before_failure {
            Some(0) => {
                state.views_before_failure = None;
                return Err(RhiError::InitializationFailed(format!(
                    "view creation refused for buffer {}",
                    image.slot
                )));
            }
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        state.stats.views_created += 1;
        state.stats.live_views += 1;
        Ok(SimView {
            gpu: self.gpu.clone(),
            image: image.clone(),
        })
    }
}

/// Simulated execution queue.
pub struct SimQueue {
    gpu: SimGpu,
    kind: QueueKind,
}

impl CommandQueue for SimQueue {
    type Fence = SimFence;
    type CommandList = SimCommandList;

    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn submit(&self, list: &SimCommandList) -> RhiResult<()> {
        let mut state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        if list.recording {
            state.violation(format!("{} queue: submitted an open command list", self.kind));
        }
        if list.kind != self.kind {
            state.violation(format!(
                "{} list submitted to {} queue",
                list.kind, self.kind
            ));
        }

        state.stats.submits += 1;
        state.events.push(SimEvent::Submit { queue: self.kind });

        for command in &list.commands {
            match *command {
                SimCommand::Barrier {
                    image: SimImage { slot, generation },
                    before,
                    after,
                } => {
                    if generation != state.generation {
                        state.violation(format!("barrier on stale buffer {slot}"));
                        continue;
                    }
                    match state.buffer_states.get(slot).copied() {
                        Some(found) if found == before => state.buffer_states[slot] = after,
                        Some(found) => {
                            state.violation(format!(
                                "barrier {before:?} -> {after:?} on buffer {slot} in {found:?}"
                            ));
                            state.buffer_states[slot] = after;
                        }
                        None => state.violation(format!("barrier on unknown buffer {slot}")),
                    }
                    state.events.push(SimEvent::Barrier {
                        slot,
                        before,
                        after,
                    });
                }
                SimCommand::Clear {
                    image: SimImage { slot, generation },
                    color,
                } => {
                    if generation != state.generation {
                        state.violation(format!("clear through stale view of buffer {slot}"));
                    } else if state.buffer_states.get(slot) != Some(&ResourceState::Renderable) {
                        state.violation(format!("clear of buffer {slot} while not renderable"));
                    }
                    state.events.push(SimEvent::Clear { slot, color });
                }
                SimCommand::Viewport(_) | SimCommand::Scissor(_) => {}
            }
        }

        Ok(())
    }

    fn signal(&self, fence: &SimFence, value: u64) -> RhiResult<()> {
        let mut state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        state.stats.signals += 1;
        state.events.push(SimEvent::Signal {
            queue: self.kind,
            value,
        });
        state.enqueue_signal(fence.id, value);
        drop(state);
        self.gpu.notify();
        Ok(())
    }
}

/// Simulated timeline fence.
pub struct SimFence {
    gpu: SimGpu,
    id: usize,
}

impl Fence for SimFence {
    fn completed_value(&self) -> RhiResult<u64> {
        let state = self.gpu.lock();
        if state.device_lost {
            return Err(RhiError::DeviceLost);
        }
        Ok(state.fence_values[self.id])
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<WaitStatus> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.gpu.lock();
        state.stats.blocking_waits += 1;

        loop {
            if state.device_lost {
                return Err(RhiError::DeviceLost);
            }
            if state.pacing != super::GpuPacing::Manual {
                state.retire_through(self.id, value);
            }
            if state.fence_values[self.id] >= value {
                return Ok(WaitStatus::Signaled);
            }

            state = match deadline {
                None => self
                    .gpu
                    .condvar()
                    .wait(state)
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("Simulated fence wait for {} timed out", value);
                        return Ok(WaitStatus::TimedOut);
                    }
                    self.gpu
                        .condvar()
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

/// A swapchain buffer. Identifies the buffer and the swapchain generation
/// it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimImage {
    pub slot: FrameSlot,
    pub generation: u64,
}

/// Render-target view of a [`SimImage`]. Live views are counted so leaks
/// and views kept across a recreate show up in [`super::SimStats`].
pub struct SimView {
    gpu: SimGpu,
    image: SimImage,
}

impl SimView {
    pub fn slot(&self) -> FrameSlot {
        self.image.slot
    }

    pub fn image(&self) -> SimImage {
        self.image
    }
}

impl Drop for SimView {
    fn drop(&mut self) {
        let mut state = self.gpu.lock();
        state.stats.live_views = state.stats.live_views.saturating_sub(1);
    }
}

#[derive(Debug, Clone)]
enum SimCommand {
    Barrier {
        image: SimImage,
        before: ResourceState,
        after: ResourceState,
    },
    Viewport(Viewport),
    Scissor(ScissorRect),
    Clear {
        image: SimImage,
        color: [f32; 4],
    },
}

/// Records commands and replays them against the GPU state on submit.
pub struct SimCommandList {
    kind: QueueKind,
    commands: Vec<SimCommand>,
    recording: bool,
}

impl SimCommandList {
    /// Number of commands recorded since the last `begin`.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Last viewport recorded, if any.
    pub fn viewport(&self) -> Option<Viewport> {
        self.commands.iter().rev().find_map(|command| match command {
            SimCommand::Viewport(viewport) => Some(*viewport),
            _ => None,
        })
    }

    /// Last scissor rectangle recorded, if any.
    pub fn scissor(&self) -> Option<ScissorRect> {
        self.commands.iter().rev().find_map(|command| match command {
            SimCommand::Scissor(scissor) => Some(*scissor),
            _ => None,
        })
    }
}

impl CommandList for SimCommandList {
    type Image = SimImage;
    type View = SimView;

    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn begin(&mut self) -> RhiResult<()> {
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn resource_barrier(&mut self, image: &SimImage, before: ResourceState, after: ResourceState) {
        self.commands.push(SimCommand::Barrier {
            image: *image,
            before,
            after,
        });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(SimCommand::Viewport(*viewport));
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        self.commands.push(SimCommand::Scissor(*scissor));
    }

    fn clear_render_target(&mut self, view: &SimView, color: [f32; 4]) {
        self.commands.push(SimCommand::Clear {
            image: view.image,
            color,
        });
    }

    fn end(&mut self) -> RhiResult<()> {
        if !self.recording {
            return Err(RhiError::InvalidFramePhase {
                operation: "close command list",
                phase: "not recording",
            });
        }
        self.recording = false;
        Ok(())
    }
}
