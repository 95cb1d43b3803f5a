//! Vulkan logical device.
//!
//! [`VulkanDevice`] creates the logical device with one queue per
//! [`QueueKind`], timeline semaphores and dynamic rendering enabled, and
//! implements the backend [`Device`] trait on top of it.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use super::adapter::QueueLocation;
use super::command::VulkanCommandList;
use super::fence::TimelineFence;
use super::instance::InstanceShared;
use super::queue::VulkanQueue;
use super::swapchain::{VulkanImage, VulkanSwapchain, VulkanView};
use crate::backend::{CommandQueue, Device, WindowSource};
use crate::error::{RhiError, RhiResult};
use crate::types::{QueueKind, SwapchainDesc, ViewKind};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Device state shared by every object created from it. Destroyed when the
/// last queue, fence, swapchain, list or view is gone.
pub(crate) struct DeviceShared {
    pub(crate) instance: Arc<InstanceShared>,
    pub(crate) device: ash::Device,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    queue_locations: [QueueLocation; 3],
}

impl DeviceShared {
    pub(crate) fn location(&self, kind: QueueKind) -> QueueLocation {
        match kind {
            QueueKind::Graphics => self.queue_locations[0],
            QueueKind::Compute => self.queue_locations[1],
            QueueKind::Copy => self.queue_locations[2],
        }
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

/// Vulkan logical device wrapper.
///
/// Cheap to clone; clones refer to the same device.
#[derive(Clone)]
pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
}

impl VulkanDevice {
    pub(crate) fn new(
        instance: Arc<InstanceShared>,
        physical_device: vk::PhysicalDevice,
        queue_locations: [QueueLocation; 3],
    ) -> RhiResult<Self> {
        // One create info per family, asking for as many queues as the
        // highest index assigned in it
        let mut family_counts: Vec<(u32, u32)> = Vec::with_capacity(3);
        for location in &queue_locations {
            match family_counts.iter_mut().find(|(f, _)| *f == location.family) {
                Some((_, count)) => *count = (*count).max(location.index + 1),
                None => family_counts.push((location.family, location.index + 1)),
            }
        }

        let priorities: Vec<Vec<f32>> = family_counts
            .iter()
            .map(|&(_, count)| vec![1.0f32; count as usize])
            .collect();

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = family_counts
            .iter()
            .zip(&priorities)
            .map(|(&(family, _), priorities)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(priorities)
            })
            .collect();

        debug!(
            "Creating {} queue family slot(s): {:?}",
            queue_create_infos.len(),
            family_counts
        );

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &device);

        Ok(Self {
            shared: Arc::new(DeviceShared {
                instance,
                device,
                physical_device,
                swapchain_loader,
                queue_locations,
            }),
        })
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.shared.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.shared.physical_device
    }
}

impl Device for VulkanDevice {
    type Queue = VulkanQueue;
    type Fence = TimelineFence;
    type CommandList = VulkanCommandList;
    type Swapchain = VulkanSwapchain;
    type Image = VulkanImage;
    type View = VulkanView;

    fn create_queue(&self, kind: QueueKind) -> RhiResult<VulkanQueue> {
        let location = self.shared.location(kind);
        let handle = unsafe {
            self.shared
                .device
                .get_device_queue(location.family, location.index)
        };
        debug!(
            "{} queue retrieved from family {} index {}",
            kind, location.family, location.index
        );
        Ok(VulkanQueue::new(self.shared.clone(), handle, kind))
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<TimelineFence> {
        TimelineFence::new(self.shared.clone(), initial_value)
    }

    fn create_swapchain(
        &self,
        queue: &VulkanQueue,
        window: &dyn WindowSource,
        desc: &SwapchainDesc,
    ) -> RhiResult<VulkanSwapchain> {
        if queue.kind() != QueueKind::Graphics {
            return Err(RhiError::InitializationFailed(format!(
                "swapchain must present from the graphics queue, got {}",
                queue.kind()
            )));
        }
        VulkanSwapchain::new(self.shared.clone(), queue.family(), window, desc)
    }

    fn create_command_list(&self, kind: QueueKind) -> RhiResult<VulkanCommandList> {
        VulkanCommandList::new(self.shared.clone(), self.shared.location(kind).family, kind)
    }

    fn view_stride(&self, kind: ViewKind) -> usize {
        match kind {
            ViewKind::RenderTarget | ViewKind::DepthStencil => size_of::<vk::ImageView>(),
            ViewKind::ShaderResource => size_of::<vk::DescriptorImageInfo>(),
            ViewKind::Sampler => size_of::<vk::Sampler>(),
        }
    }

    fn create_render_target_view(&self, image: &VulkanImage) -> RhiResult<VulkanView> {
        VulkanView::new(self.shared.clone(), image)
    }
}

// Safety: ash::Device and the instance loaders are Send + Sync; the raw
// handles are plain integers.
unsafe impl Send for DeviceShared {}
unsafe impl Sync for DeviceShared {}
