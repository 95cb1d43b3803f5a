//! Swapchain management.
//!
//! This module handles surface and VkSwapchainKHR creation, buffer
//! acquisition and presentation.
//!
//! # Overview
//!
//! The [`VulkanSwapchain`] owns the window surface and exactly
//! `buffer_count` images. Acquisition is synchronized on the host: the
//! acquire call signals a fence the swapchain waits on before handing out
//! the index, so the buffer is free for the presentation engine by the time
//! recording starts. The index stays current until [`Swapchain::present`].
//!
//! Presentation submits an empty batch on the graphics queue that signals a
//! per-buffer semaphore, which the present operation waits on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use super::device::DeviceShared;
use super::queue::VulkanQueue;
use crate::backend::{Swapchain, WindowSource};
use crate::error::{RhiError, RhiResult};
use crate::types::{Extent2D, FrameSlot, PresentStatus, SwapchainDesc};

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// A swapchain buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanImage {
    pub handle: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// Color attachment view of a swapchain buffer.
pub struct VulkanView {
    device: Arc<DeviceShared>,
    handle: vk::ImageView,
    extent: vk::Extent2D,
}

impl VulkanView {
    pub(crate) fn new(device: Arc<DeviceShared>, image: &VulkanImage) -> RhiResult<Self> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());

        let handle = unsafe { device.device.create_image_view(&create_info, None)? };

        Ok(Self {
            device,
            handle,
            extent: image.extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for VulkanView {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.handle, None);
        }
    }
}

/// Full color subresource of a single-mip, single-layer image.
pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Vulkan swapchain wrapper.
///
/// Not thread-safe; the render loop thread owns it.
pub struct VulkanSwapchain {
    device: Arc<DeviceShared>,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    buffer_count: usize,
    /// Interval the current present mode was chosen for.
    sync_interval: u32,
    /// Host fence signaled by image acquisition.
    acquire_fence: vk::Fence,
    /// Per-buffer semaphores the present operation waits on.
    render_finished: Vec<vk::Semaphore>,
    /// Index handed out by `current_slot`, held until present.
    acquired: Option<u32>,
    /// Index acquired whose fence has not been waited on yet.
    acquiring: Option<u32>,
    /// `None` waits for a buffer indefinitely.
    acquire_timeout: Option<Duration>,
}

impl VulkanSwapchain {
    /// Creates the surface for `window` and a swapchain of exactly
    /// `desc.buffer_count` images on it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The window handles are unavailable or surface creation fails
    /// - The graphics queue family cannot present to the surface
    /// - The surface cannot hold `desc.buffer_count` images
    /// - Swapchain or synchronization object creation fails
    pub(crate) fn new(
        device: Arc<DeviceShared>,
        present_family: u32,
        window: &dyn WindowSource,
        desc: &SwapchainDesc,
    ) -> RhiResult<Self> {
        let display_handle = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get window handle: {e}")))?;

        // SAFETY: the handles come from a live window; the surface is
        // destroyed in Drop before the instance can go away.
        let surface = unsafe {
            ash_window::create_surface(
                &device.instance.entry,
                &device.instance.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| RhiError::SurfaceError(format!("Failed to create Vulkan surface: {e}")))?
        };

        // From here on Drop cleans up whatever was created
        let mut swapchain = Self {
            device,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            buffer_count: desc.buffer_count,
            sync_interval: desc.sync_interval,
            acquire_fence: vk::Fence::null(),
            render_finished: Vec::new(),
            acquired: None,
            acquiring: None,
            acquire_timeout: desc.acquire_timeout,
        };

        let present_support = unsafe {
            swapchain
                .device
                .instance
                .surface_loader
                .get_physical_device_surface_support(
                    swapchain.device.physical_device,
                    present_family,
                    surface,
                )?
        };
        if !present_support {
            return Err(RhiError::SurfaceError(format!(
                "queue family {present_family} cannot present to this surface"
            )));
        }

        swapchain.acquire_fence = unsafe {
            swapchain
                .device
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)?
        };

        for _ in 0..desc.buffer_count {
            let semaphore = unsafe {
                swapchain
                    .device
                    .device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
            };
            swapchain.render_finished.push(semaphore);
        }

        swapchain.build(desc.width, desc.height)?;
        info!("Window surface and swapchain created");

        Ok(swapchain)
    }

    /// (Re)creates the swapchain at the given size, retiring the old one.
    fn build(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device,
            self.surface,
            &self.device.instance.surface_loader,
        )?;

        if !support.is_adequate() {
            return Err(RhiError::InitializationFailed(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, self.sync_interval);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = check_image_count(&support.capabilities, self.buffer_count)?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let loader = &self.device.swapchain_loader;
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        let images = unsafe { loader.get_swapchain_images(swapchain)? };
        if images.len() != self.buffer_count {
            return Err(RhiError::InitializationFailed(format!(
                "requested {} swapchain images, driver created {}",
                self.buffer_count,
                images.len()
            )));
        }

        self.images = images;
        self.format = surface_format.format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.acquired = None;

        debug!("Swapchain holds {} images", self.images.len());
        Ok(())
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

impl Swapchain for VulkanSwapchain {
    type Queue = VulkanQueue;
    type Image = VulkanImage;

    fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    fn extent(&self) -> Extent2D {
        Extent2D::new(self.extent.width, self.extent.height)
    }

    fn current_slot(&mut self) -> RhiResult<FrameSlot> {
        if let Some(index) = self.acquired {
            return Ok(index as FrameSlot);
        }

        let timeout = timeout_ns(self.acquire_timeout);
        let start = Instant::now();

        // A timed-out fence wait keeps the acquired index; only the wait is
        // retried.
        let index = match self.acquiring {
            Some(index) => index,
            None => {
                let (index, suboptimal) = unsafe {
                    self.device.swapchain_loader.acquire_next_image(
                        self.swapchain,
                        timeout,
                        vk::Semaphore::null(),
                        self.acquire_fence,
                    )
                }
                .map_err(|e| acquire_error(e, start))?;
                if suboptimal {
                    debug!("Acquire reported a suboptimal swapchain");
                }
                self.acquiring = Some(index);
                index
            }
        };

        let device = &self.device.device;
        unsafe {
            device
                .wait_for_fences(&[self.acquire_fence], true, timeout)
                .map_err(|e| acquire_error(e, start))?;
            device.reset_fences(&[self.acquire_fence])?;
        }

        self.acquiring = None;
        self.acquired = Some(index);
        Ok(index as FrameSlot)
    }

    fn buffer(&self, slot: FrameSlot) -> RhiResult<VulkanImage> {
        let handle = *self.images.get(slot).ok_or(RhiError::SlotOutOfRange {
            slot,
            count: self.images.len(),
        })?;
        Ok(VulkanImage {
            handle,
            format: self.format,
            extent: self.extent,
        })
    }

    fn present(&mut self, queue: &VulkanQueue, sync_interval: u32) -> RhiResult<PresentStatus> {
        let Some(index) = self.acquired.take() else {
            return Err(RhiError::PresentFailed("no image acquired".to_string()));
        };
        let render_finished = self.render_finished[index as usize];

        queue.signal_binary(render_finished)?;

        let swapchains = [self.swapchain];
        let image_indices = [index];
        let wait_semaphores = [render_finished];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.device
                .swapchain_loader
                .queue_present(queue.handle(), &present_info)
        };

        let interval_changed = (sync_interval == 0) != (self.sync_interval == 0);
        if interval_changed {
            debug!(
                "Sync interval changed {} -> {}, swapchain needs recreation",
                self.sync_interval, sync_interval
            );
            self.sync_interval = sync_interval;
        }

        match result {
            Ok(false) if !interval_changed => Ok(PresentStatus::Presented),
            Ok(_) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::SwapchainOutOfDate),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(RhiError::DeviceLost),
            Err(e) => Err(RhiError::PresentFailed(format!("{e:?}"))),
        }
    }

    fn recreate(&mut self, width: u32, height: u32) -> RhiResult<()> {
        // Wait for device to be idle before recreating
        unsafe {
            self.device.device.device_wait_idle()?;
            if self.acquiring.take().is_some() {
                let device = &self.device.device;
                device.wait_for_fences(&[self.acquire_fence], true, u64::MAX)?;
                device.reset_fences(&[self.acquire_fence])?;
            }
        }

        info!("Recreating swapchain for new size: {}x{}", width, height);
        self.build(width, height)
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        let device = &self.device.device;
        unsafe {
            if let Err(e) = device.device_wait_idle() {
                warn!("Failed to wait for device idle before swapchain drop: {:?}", e);
            }
            for &semaphore in &self.render_finished {
                device.destroy_semaphore(semaphore, None);
            }
            if self.acquire_fence != vk::Fence::null() {
                device.destroy_fence(self.acquire_fence, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.device
                    .swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            self.device
                .instance
                .surface_loader
                .destroy_surface(self.surface, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Chooses the surface format.
///
/// Prefers R8G8B8A8_UNORM, then B8G8R8A8_UNORM, both with SRGB_NONLINEAR.
/// Falls back to the first available format.
/// Host timeout in nanoseconds; `None` is Vulkan's "no timeout".
fn timeout_ns(timeout: Option<Duration>) -> u64 {
    match timeout {
        Some(timeout) => u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX),
        None => u64::MAX,
    }
}

/// An acquire that ran out of time is a synchronization timeout with no
/// fence value attached.
fn acquire_error(result: vk::Result, start: Instant) -> RhiError {
    match result {
        vk::Result::TIMEOUT | vk::Result::NOT_READY => {
            warn!("No swapchain buffer available after {:?}", start.elapsed());
            RhiError::SynchronizationTimeout {
                slot: None,
                value: 0,
                waited: start.elapsed(),
            }
        }
        other => other.into(),
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for preferred in [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM] {
        if let Some(&format) = formats.iter().find(|f| {
            f.format == preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            debug!("Selected surface format {:?}", preferred);
            return format;
        }
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

/// Chooses the present mode for a sync interval.
///
/// Interval 0 prefers MAILBOX, then IMMEDIATE; anything else, and the
/// fallback, is FIFO, which every implementation supports.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR], sync_interval: u32) -> vk::PresentModeKHR {
    if sync_interval == 0 {
        for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if present_modes.contains(&mode) {
                debug!("Selected {:?} present mode (no vsync)", mode);
                return mode;
            }
        }
    }

    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the requested size to the surface's min/max extents.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Checks that the surface can hold exactly `requested` images.
fn check_image_count(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: usize,
) -> RhiResult<u32> {
    let requested = u32::try_from(requested).unwrap_or(u32::MAX);
    let too_few = requested < capabilities.min_image_count;
    // A max_image_count of 0 means there is no maximum
    let too_many = capabilities.max_image_count > 0 && requested > capabilities.max_image_count;

    if too_few || too_many {
        return Err(RhiError::InitializationFailed(format!(
            "surface supports {}..={} images, {} requested",
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            },
            requested
        )));
    }

    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_timeout_ns() {
        assert_eq!(timeout_ns(None), u64::MAX);
        assert_eq!(timeout_ns(Some(Duration::from_millis(20))), 20_000_000);
        assert_eq!(timeout_ns(Some(Duration::MAX)), u64::MAX);
    }

    #[test]
    fn test_acquire_timeout_maps_to_synchronization_timeout() {
        let start = Instant::now();
        for result in [vk::Result::TIMEOUT, vk::Result::NOT_READY] {
            assert!(matches!(
                acquire_error(result, start),
                RhiError::SynchronizationTimeout { slot: None, .. }
            ));
        }
        assert!(matches!(
            acquire_error(vk::Result::ERROR_OUT_OF_DATE_KHR, start),
            RhiError::SwapchainOutOfDate
        ));
        assert!(matches!(
            acquire_error(vk::Result::ERROR_DEVICE_LOST, start),
            RhiError::DeviceLost
        ));
    }

    #[test]
    fn test_choose_surface_format_prefers_rgba_unorm() {
        let formats = vec![
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::R8G8B8A8_UNORM),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::A2B10G10R10_UNORM_PACK32
        );
    }

    #[test]
    fn test_present_mode_follows_sync_interval() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes, 0), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, 1), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&modes, 2), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_present_mode_without_mailbox() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, 0), vk::PresentModeKHR::IMMEDIATE);

        let fifo_only = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&fifo_only, 0), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));
    }

    #[test]
    fn test_exact_image_count() {
        let bounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(check_image_count(&bounded, 3).unwrap(), 3);
        assert!(check_image_count(&bounded, 4).is_err());
        assert!(check_image_count(&bounded, 1).is_err());

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(check_image_count(&unbounded, 8).unwrap(), 8);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
