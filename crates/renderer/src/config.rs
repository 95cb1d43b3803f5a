//! Frame pacing configuration.

use std::time::Duration;

use fivemapper_rhi::{FeatureLevel, RhiError, RhiResult};

/// Number of swapchain buffers, and therefore frames in flight.
pub const DEFAULT_FRAME_COUNT: usize = 3;

/// Settings for device bring-up and frame pacing.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fivemapper_renderer::FrameSyncConfig;
///
/// let config = FrameSyncConfig::default()
///     .with_sync_interval(0)
///     .with_wait_timeout(Some(Duration::from_millis(500)));
/// assert_eq!(config.frame_count, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSyncConfig {
    /// Swapchain buffers, command lists and view slots.
    pub frame_count: usize,
    /// Lowest feature level an adapter must accept a device at.
    pub min_feature_level: FeatureLevel,
    /// 0 presents without waiting for vertical blank.
    pub sync_interval: u32,
    /// `None` blocks indefinitely on the frame fence.
    pub wait_timeout: Option<Duration>,
    /// Enables the backend's validation layer.
    pub enable_validation: bool,
}

impl Default for FrameSyncConfig {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            min_feature_level: FeatureLevel::V1_3,
            sync_interval: 1,
            wait_timeout: None,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl FrameSyncConfig {
    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn with_min_feature_level(mut self, level: FeatureLevel) -> Self {
        self.min_feature_level = level;
        self
    }

    pub fn with_sync_interval(mut self, sync_interval: u32) -> Self {
        self.sync_interval = sync_interval;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Rejects settings no device could be brought up with.
    pub fn validate(&self) -> RhiResult<()> {
        if self.frame_count == 0 {
            return Err(RhiError::InitializationFailed(
                "frame count must be at least 1".to_string(),
            ));
        }
        if self.wait_timeout == Some(Duration::ZERO) {
            return Err(RhiError::InitializationFailed(
                "wait timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FrameSyncConfig::default();
        assert_eq!(config.frame_count, 3);
        assert_eq!(config.min_feature_level, FeatureLevel::V1_3);
        assert_eq!(config.sync_interval, 1);
        assert_eq!(config.wait_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = FrameSyncConfig::default()
            .with_frame_count(2)
            .with_min_feature_level(FeatureLevel::V1_2)
            .with_validation(false);
        assert_eq!(config.frame_count, 2);
        assert_eq!(config.min_feature_level, FeatureLevel::V1_2);
        assert!(!config.enable_validation);
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        assert!(FrameSyncConfig::default().with_frame_count(0).validate().is_err());
        assert!(
            FrameSyncConfig::default()
                .with_wait_timeout(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
    }
}
