//! Timeline semaphore used as the frame fence.
//!
//! A Vulkan 1.2 timeline semaphore carries a 64-bit counter that queues
//! advance with a signal operation and the host reads or waits on, which
//! is exactly the monotonic completion counter frame pacing needs.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use super::device::DeviceShared;
use crate::backend::Fence;
use crate::error::RhiResult;
use crate::types::WaitStatus;

/// Timeline semaphore wrapper.
pub struct TimelineFence {
    device: Arc<DeviceShared>,
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    /// Creates a timeline semaphore starting at `initial_value`.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub(crate) fn new(device: Arc<DeviceShared>, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.device.create_semaphore(&create_info, None)? };

        debug!("Created timeline semaphore (initial value {})", initial_value);

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Fence for TimelineFence {
    fn completed_value(&self) -> RhiResult<u64> {
        let value = unsafe { self.device.device.get_semaphore_counter_value(self.semaphore)? };
        Ok(value)
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<WaitStatus> {
        let timeout_ns = timeout
            .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX);

        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        match unsafe { self.device.device.wait_semaphores(&wait_info, timeout_ns) } {
            Ok(()) => Ok(WaitStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(WaitStatus::TimedOut),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline semaphore");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TimelineFence>();
    }
}
