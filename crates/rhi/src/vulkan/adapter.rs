//! Physical device (GPU) description and trial device creation.
//!
//! # Overview
//!
//! Each enumerated physical device becomes a [`VulkanAdapter`]. Creating a
//! device on it checks, in order:
//! 1. The reported API version against the requested feature level
//! 2. A graphics-capable queue family
//! 3. Timeline semaphores and dynamic rendering
//! 4. The swapchain extension
//!
//! Compute and transfer queues prefer dedicated families and fall back to
//! the graphics family.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use super::device::VulkanDevice;
use super::instance::InstanceShared;
use crate::backend::Adapter;
use crate::error::{RhiError, RhiResult};
use crate::types::{AdapterInfo, FeatureLevel, QueueKind};

/// Queue family indices for the three queue kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family used for compute work.
    pub compute_family: Option<u32>,
    /// Index of the queue family used for copy work.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics is the only family that must exist; the others fall back
    /// to it.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some()
    }

    /// Family serving `kind`.
    pub fn family_for(&self, kind: QueueKind) -> Option<u32> {
        match kind {
            QueueKind::Graphics => self.graphics_family,
            QueueKind::Compute => self.compute_family.or(self.graphics_family),
            QueueKind::Copy => self.transfer_family.or(self.graphics_family),
        }
    }
}

/// Where a queue kind lives: family index and queue index inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QueueLocation {
    pub(crate) family: u32,
    pub(crate) index: u32,
}

/// Assigns each queue kind a distinct queue inside its family while the
/// family has queues left; afterwards kinds share the family's last queue.
pub(crate) fn assign_queues(
    families: &QueueFamilyIndices,
    family_queue_counts: &[u32],
) -> Option<[QueueLocation; 3]> {
    let mut used: Vec<(u32, u32)> = Vec::new();
    let mut locations = [QueueLocation { family: 0, index: 0 }; 3];

    for (slot, kind) in QueueKind::ALL.into_iter().enumerate() {
        let family = families.family_for(kind)?;
        let available = *family_queue_counts.get(family as usize)?;
        if available == 0 {
            return None;
        }

        let taken = match used.iter_mut().find(|(f, _)| *f == family) {
            Some((_, count)) => {
                *count += 1;
                *count - 1
            }
            None => {
                used.push((family, 1));
                0
            }
        };

        locations[slot] = QueueLocation {
            family,
            index: taken.min(available - 1),
        };
    }

    Some(locations)
}

/// An enumerated physical device.
pub struct VulkanAdapter {
    instance: Arc<InstanceShared>,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    queue_families: QueueFamilyIndices,
    family_queue_counts: Vec<u32>,
}

impl VulkanAdapter {
    pub(crate) fn new(instance: Arc<InstanceShared>, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };
        let family_properties = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        let queue_families = find_queue_families(&family_properties);
        let family_queue_counts = family_properties.iter().map(|f| f.queue_count).collect();

        Self {
            instance,
            physical_device,
            properties,
            queue_families,
            family_queue_counts,
        }
    }

    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    fn feature_level(&self) -> FeatureLevel {
        FeatureLevel::new(
            vk::api_version_major(self.properties.api_version),
            vk::api_version_minor(self.properties.api_version),
        )
    }

    /// Checks the Vulkan 1.2/1.3 features frame pacing relies on.
    fn check_features(&self) -> RhiResult<()> {
        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut features_1_2)
                .push_next(&mut features_1_3);
            unsafe {
                self.instance
                    .instance
                    .get_physical_device_features2(self.physical_device, &mut features)
            };
        }

        if features_1_2.timeline_semaphore == vk::FALSE {
            return Err(RhiError::InitializationFailed(format!(
                "'{}' does not support timeline semaphores",
                self.device_name()
            )));
        }
        if features_1_3.dynamic_rendering == vk::FALSE {
            return Err(RhiError::InitializationFailed(format!(
                "'{}' does not support dynamic rendering",
                self.device_name()
            )));
        }

        let extensions = unsafe {
            self.instance
                .instance
                .enumerate_device_extension_properties(self.physical_device)?
        };
        let has_swapchain = extensions.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == ash::khr::swapchain::NAME
        });
        if !has_swapchain {
            return Err(RhiError::InitializationFailed(format!(
                "'{}' does not support VK_KHR_swapchain",
                self.device_name()
            )));
        }

        Ok(())
    }
}

impl Adapter for VulkanAdapter {
    type Device = VulkanDevice;

    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.device_name().to_string(),
            vendor_id: self.properties.vendor_id,
            device_id: self.properties.device_id,
            is_software: self.properties.device_type == vk::PhysicalDeviceType::CPU,
            feature_level: self.feature_level(),
        }
    }

    fn create_device(&self, min_level: FeatureLevel) -> RhiResult<VulkanDevice> {
        let supported = self.feature_level();
        if supported < min_level {
            return Err(RhiError::FeatureLevelUnsupported {
                required: min_level,
                supported,
            });
        }

        let locations = assign_queues(&self.queue_families, &self.family_queue_counts)
            .ok_or_else(|| {
                RhiError::InitializationFailed(format!(
                    "'{}' has no graphics queue family",
                    self.device_name()
                ))
            })?;

        self.check_features()?;

        debug!(
            "Trial device on '{}': families {:?}",
            self.device_name(),
            self.queue_families
        );

        VulkanDevice::new(self.instance.clone(), self.physical_device, locations)
    }
}

/// Finds queue family indices for different operations.
fn find_queue_families(queue_families: &[vk::QueueFamilyProperties]) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    let mut dedicated_transfer_family: Option<u32> = None;
    let mut dedicated_compute_family: Option<u32> = None;

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_compute = family.queue_flags.contains(vk::QueueFlags::COMPUTE);
        let has_transfer = family.queue_flags.contains(vk::QueueFlags::TRANSFER);

        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }

        // Compute queue - prefer dedicated compute queue
        if has_compute {
            if !has_graphics && dedicated_compute_family.is_none() {
                dedicated_compute_family = Some(i);
            } else if indices.compute_family.is_none() {
                indices.compute_family = Some(i);
            }
        }

        // Transfer queue - prefer dedicated transfer queue
        if has_transfer {
            if !has_graphics && !has_compute && dedicated_transfer_family.is_none() {
                dedicated_transfer_family = Some(i);
            } else if indices.transfer_family.is_none() {
                indices.transfer_family = Some(i);
            }
        }
    }

    if let Some(dedicated) = dedicated_compute_family {
        indices.compute_family = Some(dedicated);
    }
    if let Some(dedicated) = dedicated_transfer_family {
        indices.transfer_family = Some(dedicated);
    }

    // Graphics families implicitly support compute and transfer
    if indices.transfer_family.is_none() {
        indices.transfer_family = indices.graphics_family;
    }
    if indices.compute_family.is_none() {
        indices.compute_family = indices.graphics_family;
    }

    indices
}
