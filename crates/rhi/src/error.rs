//! RHI-specific error types.

use std::time::Duration;

use ash::vk;
use thiserror::Error;

use crate::types::{FeatureLevel, QueueKind, ResourceState};

/// Coarse classification of an [`RhiError`], used by callers to pick a
/// recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised while bringing the device up; startup should abort.
    Initialization,
    /// A bounded CPU wait on the frame fence expired.
    SynchronizationTimeout,
    /// The swapchain is being (or must be) rebuilt.
    ResizeInProgress,
    /// A single frame failed; recover by draining and recreating.
    PerFrame,
    /// The device is gone. Nothing can be recovered.
    Fatal,
}

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// Every hardware adapter was rejected
    #[error("No hardware adapter supports feature level {0}")]
    NoCapableAdapter(FeatureLevel),

    /// A trial device creation was refused by the adapter
    #[error("Feature level {required} required, adapter supports {supported}")]
    FeatureLevelUnsupported {
        required: FeatureLevel,
        supported: FeatureLevel,
    },

    /// One of the execution queues could not be created
    #[error("Failed to create {kind} queue: {reason}")]
    QueueCreationFailed { kind: QueueKind, reason: String },

    /// Generic bring-up failure (swapchain, views, command lists)
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// The GPU did not reach a fence value within the configured timeout
    #[error("Timed out after {waited:?} waiting for fence value {value} (slot {slot:?})")]
    SynchronizationTimeout {
        slot: Option<usize>,
        value: u64,
        waited: Duration,
    },

    /// A frame operation was attempted between invalidate and recreate
    #[error("Swapchain resize in progress")]
    ResizeInProgress,

    /// The presentation engine reports the swapchain no longer matches the surface
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// Presentation failed for a reason other than an out-of-date swapchain
    #[error("Present failed: {0}")]
    PresentFailed(String),

    /// The device was removed or reset
    #[error("Device lost")]
    DeviceLost,

    /// A frame slot outside the pool was addressed
    #[error("Frame slot {slot} out of range (pool holds {count})")]
    SlotOutOfRange { slot: usize, count: usize },

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A frame operation was called out of order
    #[error("Cannot {operation} while frame is {phase}")]
    InvalidFramePhase {
        operation: &'static str,
        phase: &'static str,
    },

    /// A slot was retired before the GPU reached its pending value
    #[error("Slot {slot} retired at completed value {completed}, pending {pending}")]
    SlotNotRetirable {
        slot: usize,
        pending: u64,
        completed: u64,
    },

    /// A transition was recorded from a state the buffer is not in
    #[error("Buffer {slot} is {found:?}, expected {expected:?}")]
    ResourceStateMismatch {
        slot: usize,
        expected: ResourceState,
        found: ResourceState,
    },
}

impl RhiError {
    /// Returns the recovery category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RhiError::LoadingError(_)
            | RhiError::NoCapableAdapter(_)
            | RhiError::FeatureLevelUnsupported { .. }
            | RhiError::QueueCreationFailed { .. }
            | RhiError::InitializationFailed(_)
            | RhiError::SurfaceError(_) => ErrorCategory::Initialization,
            RhiError::SynchronizationTimeout { .. } => ErrorCategory::SynchronizationTimeout,
            RhiError::ResizeInProgress | RhiError::SwapchainOutOfDate => {
                ErrorCategory::ResizeInProgress
            }
            RhiError::DeviceLost => ErrorCategory::Fatal,
            RhiError::VulkanError(_)
            | RhiError::PresentFailed(_)
            | RhiError::SlotOutOfRange { .. }
            | RhiError::InvalidHandle(_)
            | RhiError::InvalidFramePhase { .. }
            | RhiError::SlotNotRetirable { .. }
            | RhiError::ResourceStateMismatch { .. } => ErrorCategory::PerFrame,
        }
    }

    /// Returns true if the device can no longer be used.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }
}

impl From<vk::Result> for RhiError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SwapchainOutOfDate,
            vk::Result::ERROR_SURFACE_LOST_KHR => {
                RhiError::SurfaceError("surface lost".to_string())
            }
            other => RhiError::VulkanError(other),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
