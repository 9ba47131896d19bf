use std::sync::Arc;

use ash::vk;

use crate::core::device::RhiDevice;

pub struct RhiCommandPool {
    handle: vk::CommandPool,
    device: Arc<RhiDevice>,
    queue_family: u32,
}

impl RhiCommandPool {
    pub fn new(device: Arc<RhiDevice>, queue_family: u32, flags: vk::CommandPoolCreateFlags, debug_name: &str) -> Self {
        let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family).flags(flags);
        let handle = unsafe { device.create_command_pool(&pool_info, None).unwrap() };
        device.set_debug_name(handle, debug_name);
        Self { handle, device, queue_family }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn alloc_command_buffer(&self, debug_name: &str) -> RhiCommandBuffer {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let handle = unsafe { self.device.allocate_command_buffers(&alloc_info).unwrap()[0] };
        self.device.set_debug_name(handle, debug_name);
        RhiCommandBuffer {
            handle,
            device: self.device.clone(),
        }
    }

    /// Frees every buffer allocated from the pool as well.
    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}

pub struct RhiCommandBuffer {
    handle: vk::CommandBuffer,
    device: Arc<RhiDevice>,
}

impl RhiCommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn reset(&self) {
        unsafe {
            self.device.reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty()).unwrap();
        }
    }

    #[inline]
    pub fn begin(&self, flags: vk::CommandBufferUsageFlags) {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe {
            self.device.begin_command_buffer(self.handle, &begin_info).unwrap();
        }
    }

    #[inline]
    pub fn end(&self) {
        unsafe {
            self.device.end_command_buffer(self.handle).unwrap();
        }
    }

    /// Single image-memory barrier, the only barrier shape the transfer
    /// path records.
    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.handle,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            );
        }
    }

    pub fn copy_buffer_to_image(&self, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent3D) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(extent);
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.handle,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
        }
    }
}
