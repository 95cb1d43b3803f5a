//! Command list recording.
//!
//! Each [`VulkanCommandList`] owns its own command pool with a single
//! primary buffer. `begin` resets the whole pool, which is only legal once
//! the previous submission of the list has completed; frame pacing
//! guarantees that before a slot's list is reused.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use super::device::DeviceShared;
use super::swapchain::{VulkanImage, VulkanView, color_subresource_range};
use crate::backend::CommandList;
use crate::error::{RhiError, RhiResult};
use crate::types::{QueueKind, ResourceState, ScissorRect, Viewport};

/// Layouts, stages and access masks of one state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// Maps a buffer state transition to its Vulkan barrier parameters.
///
/// Presentable to renderable discards the previous contents: the buffer is
/// fully cleared every frame.
pub fn layout_transition(before: ResourceState, after: ResourceState) -> LayoutTransition {
    match (before, after) {
        (ResourceState::Presentable, ResourceState::Renderable) => LayoutTransition {
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        },
        (ResourceState::Renderable, ResourceState::Presentable) => LayoutTransition {
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: vk::AccessFlags::empty(),
        },
        (ResourceState::Renderable, ResourceState::Renderable) => LayoutTransition {
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        },
        (ResourceState::Presentable, ResourceState::Presentable) => LayoutTransition {
            old_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::empty(),
        },
    }
}

/// A command pool plus one primary command buffer.
pub struct VulkanCommandList {
    device: Arc<DeviceShared>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    kind: QueueKind,
    recording: bool,
}

impl VulkanCommandList {
    pub(crate) fn new(device: Arc<DeviceShared>, family: u32, kind: QueueKind) -> RhiResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(family);
        let pool = unsafe { device.device.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = match unsafe { device.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.device.destroy_command_pool(pool, None) };
                return Err(e.into());
            }
        };

        debug!("Created {} command list (family {})", kind, family);

        Ok(Self {
            device,
            pool,
            buffer,
            kind,
            recording: false,
        })
    }

    /// Returns the command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }
}

impl CommandList for VulkanCommandList {
    type Image = VulkanImage;
    type View = VulkanView;

    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn begin(&mut self) -> RhiResult<()> {
        let device = &self.device.device;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
            device.begin_command_buffer(self.buffer, &begin_info)?;
        }

        self.recording = true;
        Ok(())
    }

    fn resource_barrier(&mut self, image: &VulkanImage, before: ResourceState, after: ResourceState) {
        let transition = layout_transition(before, after);
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(transition.old_layout)
            .new_layout(transition.new_layout)
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.handle)
            .subresource_range(color_subresource_range());

        unsafe {
            self.device.device.cmd_pipeline_barrier(
                self.buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe {
            self.device
                .device
                .cmd_set_viewport(self.buffer, 0, &[viewport]);
        }
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.left,
                y: scissor.top,
            },
            extent: vk::Extent2D {
                width: (scissor.right - scissor.left).max(0) as u32,
                height: (scissor.bottom - scissor.top).max(0) as u32,
            },
        };
        unsafe {
            self.device.device.cmd_set_scissor(self.buffer, 0, &[rect]);
        }
    }

    fn clear_render_target(&mut self, view: &VulkanView, color: [f32; 4]) {
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(view.handle())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            });
        let color_attachments = [color_attachment];

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: view.extent(),
            })
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe {
            let device = &self.device.device;
            device.cmd_begin_rendering(self.buffer, &rendering_info);
            device.cmd_end_rendering(self.buffer);
        }
    }

    fn end(&mut self) -> RhiResult<()> {
        if !self.recording {
            return Err(RhiError::InvalidFramePhase {
                operation: "end",
                phase: "closed",
            });
        }

        unsafe { self.device.device.end_command_buffer(self.buffer)? };
        self.recording = false;
        Ok(())
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        // Destroying the pool frees its buffers
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_to_render_discards_contents() {
        let t = layout_transition(ResourceState::Presentable, ResourceState::Renderable);
        assert_eq!(t.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(t.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(t.dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_render_to_present() {
        let t = layout_transition(ResourceState::Renderable, ResourceState::Presentable);
        assert_eq!(t.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(t.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(t.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_transitions_chain() {
        let forward = layout_transition(ResourceState::Presentable, ResourceState::Renderable);
        let back = layout_transition(ResourceState::Renderable, ResourceState::Presentable);
        assert_eq!(forward.new_layout, back.old_layout);
    }
}
