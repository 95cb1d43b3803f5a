//! Vulkan queue submission.

use std::sync::Arc;

use ash::vk;

use super::command::VulkanCommandList;
use super::device::DeviceShared;
use super::fence::TimelineFence;
use crate::backend::CommandQueue;
use crate::error::RhiResult;
use crate::types::QueueKind;

/// A device queue serving one [`QueueKind`].
///
/// Kinds that share a Vulkan queue (small queue families) are still
/// submitted in program order because a single thread drives them.
pub struct VulkanQueue {
    device: Arc<DeviceShared>,
    handle: vk::Queue,
    kind: QueueKind,
}

impl VulkanQueue {
    pub(crate) fn new(device: Arc<DeviceShared>, handle: vk::Queue, kind: QueueKind) -> Self {
        Self {
            device,
            handle,
            kind,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    /// Queue family this queue belongs to.
    #[inline]
    pub fn family(&self) -> u32 {
        self.device.location(self.kind).family
    }

    /// Submits an empty batch that signals a binary semaphore once all
    /// earlier work on this queue has finished.
    pub(crate) fn signal_binary(&self, semaphore: vk::Semaphore) -> RhiResult<()> {
        let signal_semaphores = [semaphore];
        let submit_info = vk::SubmitInfo::default().signal_semaphores(&signal_semaphores);
        unsafe {
            self.device
                .device
                .queue_submit(self.handle, &[submit_info], vk::Fence::null())?;
        }
        Ok(())
    }
}

impl CommandQueue for VulkanQueue {
    type Fence = TimelineFence;
    type CommandList = VulkanCommandList;

    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn submit(&self, list: &VulkanCommandList) -> RhiResult<()> {
        let command_buffers = [list.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .device
                .queue_submit(self.handle, &[submit_info], vk::Fence::null())?;
        }
        Ok(())
    }

    fn signal(&self, fence: &TimelineFence, value: u64) -> RhiResult<()> {
        let signal_semaphores = [fence.handle()];
        let signal_values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);
        unsafe {
            self.device
                .device
                .queue_submit(self.handle, &[submit_info], vk::Fence::null())?;
        }
        Ok(())
    }
}

// Safety: vk::Queue is a handle; external synchronization is provided by the
// single thread driving frame submission.
unsafe impl Send for VulkanQueue {}
unsafe impl Sync for VulkanQueue {}
