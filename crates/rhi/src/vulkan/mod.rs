//! Vulkan backend.
//!
//! Maps the backend traits onto Vulkan 1.3: timeline semaphores serve as
//! frame fences, swapchain images are acquired on the host, and clears use
//! dynamic rendering.

mod adapter;
mod command;
mod device;
mod fence;
mod instance;
mod queue;
mod swapchain;

pub use adapter::{QueueFamilyIndices, VulkanAdapter};
pub use command::{LayoutTransition, VulkanCommandList, layout_transition};
pub use device::VulkanDevice;
pub use fence::TimelineFence;
pub use instance::VulkanInstance;
pub use queue::VulkanQueue;
pub use swapchain::{SwapchainSupportDetails, VulkanImage, VulkanSwapchain, VulkanView};
