//! Thread-safe GPU upload channel.
//!
//! One command buffer, one fence, one lock. Every upload records, submits
//! and waits synchronously, so callers on any thread see completed GPU
//! state when a call returns. Throughput is traded for simplicity; asset
//! loading is the only client.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use ash::vk;
use lumen_rhi::core::buffer::RhiBuffer;
use lumen_rhi::core::command::{RhiCommandBuffer, RhiCommandPool};
use lumen_rhi::core::device::RhiDevice;
use lumen_rhi::core::image::RhiImage2D;
use lumen_rhi::core::queue::RhiQueue;
use lumen_rhi::core::synchronize::RhiFence;

struct TransferInner {
    command_pool: RhiCommandPool,
    command_buffer: RhiCommandBuffer,
    fence: RhiFence,
}

pub struct TransferChannel {
    device: Arc<RhiDevice>,
    allocator: Arc<vk_mem::Allocator>,
    queue: RhiQueue,
    // `None` once shut down; every op checks under this lock
    inner: Mutex<Option<TransferInner>>,
}

// new & shutdown
impl TransferChannel {
    pub fn new(device: Arc<RhiDevice>, allocator: Arc<vk_mem::Allocator>, queue: RhiQueue) -> Self {
        let command_pool = RhiCommandPool::new(
            device.clone(),
            queue.family_index(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "transfer-pool",
        );
        let command_buffer = command_pool.alloc_command_buffer("transfer-cmd");
        let fence = RhiFence::new(device.clone(), false, "transfer-fence");

        Self {
            device,
            allocator,
            queue,
            inner: Mutex::new(Some(TransferInner {
                command_pool,
                command_buffer,
                fence,
            })),
        }
    }

    /// Waits out any in-flight submission, then destroys the channel's GPU
    /// objects. Later uploads fail; repeated calls are no-ops.
    pub fn shutdown(&self) {
        let inner = self.inner.lock().unwrap().take();
        let Some(inner) = inner else {
            return;
        };
        // every op is synchronous, so this returns immediately unless a
        // submit raced the shutdown
        self.queue.wait_idle(&self.device);
        inner.fence.destroy();
        inner.command_pool.destroy();
        log::info!("transfer channel shut down");
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }
}

// getters
impl TransferChannel {
    #[inline]
    pub fn device(&self) -> &Arc<RhiDevice> {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> Arc<vk_mem::Allocator> {
        self.allocator.clone()
    }
}

// resource creation
impl TransferChannel {
    pub fn create_vertex_buffer(&self, size: vk::DeviceSize, debug_name: &str) -> anyhow::Result<RhiBuffer> {
        let guard = self.inner.lock().unwrap();
        guard.as_ref().context("transfer channel is shut down")?;
        RhiBuffer::new_vertex_buffer(self.allocator.clone(), size, debug_name)
    }

    pub fn create_index_buffer(&self, size: vk::DeviceSize, debug_name: &str) -> anyhow::Result<RhiBuffer> {
        let guard = self.inner.lock().unwrap();
        guard.as_ref().context("transfer channel is shut down")?;
        RhiBuffer::new_index_buffer(self.allocator.clone(), size, debug_name)
    }

    pub fn create_image_2d(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        debug_name: &str,
    ) -> anyhow::Result<RhiImage2D> {
        let guard = self.inner.lock().unwrap();
        guard.as_ref().context("transfer channel is shut down")?;
        RhiImage2D::new(
            &self.device,
            self.allocator.clone(),
            extent,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            debug_name,
        )
    }
}

// uploads
impl TransferChannel {
    /// Writes `data` into a host-visible buffer. Serialized with every
    /// other channel op.
    pub fn upload_buffer(&self, buffer: &mut RhiBuffer, data: &[u8]) -> anyhow::Result<()> {
        let guard = self.inner.lock().unwrap();
        guard.as_ref().context("transfer channel is shut down")?;
        buffer.write_bytes(data)
    }

    /// Stages `data` and copies it into `image`, leaving the image in
    /// `SHADER_READ_ONLY_OPTIMAL`. Blocks until the GPU copy completes.
    pub fn upload_image(&self, image: &RhiImage2D, data: &[u8]) -> anyhow::Result<()> {
        let guard = self.inner.lock().unwrap();
        let inner = guard.as_ref().context("transfer channel is shut down")?;

        let mut staging =
            RhiBuffer::new_staging_buffer(self.allocator.clone(), data.len() as vk::DeviceSize, "transfer-staging")?;
        if let Err(e) = staging.write_bytes(data) {
            staging.destroy();
            return Err(e);
        }

        let cmd = &inner.command_buffer;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        cmd.image_barrier(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::ImageMemoryBarrier::default()
                .image(image.handle())
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                ),
        );
        cmd.copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            vk::Extent3D {
                width: image.extent().width,
                height: image.extent().height,
                depth: 1,
            },
        );
        cmd.image_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::ImageMemoryBarrier::default()
                .image(image.handle())
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                ),
        );
        cmd.end();

        let command_buffers = [cmd.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        self.queue.submit(&self.device, std::slice::from_ref(&submit), Some(&inner.fence));
        inner.fence.wait();
        inner.fence.reset();
        cmd.reset();

        staging.destroy();
        Ok(())
    }
}
