//! Frames-in-flight pacing against the presentation chain.
//!
//! The slot count is fixed at creation and independent of the swap chain's
//! image count; per-image state (framebuffer, finished semaphore, fence
//! back-reference) is rebuilt on every swap-chain recreation while the
//! slots live for the whole application.

use std::sync::Arc;

use ash::vk;
use itertools::Itertools;
use lumen_rhi::core::command::{RhiCommandBuffer, RhiCommandPool};
use lumen_rhi::core::device::RhiDevice;
use lumen_rhi::core::queue::RhiQueue;
use lumen_rhi::core::swapchain::RhiSwapchain;
use lumen_rhi::core::synchronize::{RhiFence, RhiSemaphore};

use crate::platform::window_system::RenderWindow;

/// Per-frame resources recycled round-robin.
struct FrameSlot {
    acquire_semaphore: RhiSemaphore,
    // created signaled so the first wait falls through
    in_flight_fence: RhiFence,
    command_buffer: RhiCommandBuffer,
    active: bool,
    image_index: u32,
}

pub struct FrameScheduler {
    device: Arc<RhiDevice>,
    graphics_queue: RhiQueue,
    swapchain: RhiSwapchain,
    render_pass: vk::RenderPass,

    // image-indexed state, rebuilt with the swapchain
    framebuffers: Vec<vk::Framebuffer>,
    image_finished_semaphores: Vec<RhiSemaphore>,
    // which slot's fence guards each image, if any
    image_fences: Vec<Option<usize>>,

    command_pool: RhiCommandPool,
    slots: Vec<FrameSlot>,
    current_slot: usize,
    resize_pending: bool,
}

// new & destroy
impl FrameScheduler {
    pub fn new(
        device: Arc<RhiDevice>,
        graphics_queue: RhiQueue,
        swapchain: RhiSwapchain,
        render_pass: vk::RenderPass,
        frames_in_flight: usize,
    ) -> Self {
        let command_pool = RhiCommandPool::new(
            device.clone(),
            graphics_queue.family_index(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "frame-pool",
        );

        let slots = (0..frames_in_flight.max(1))
            .map(|idx| FrameSlot {
                acquire_semaphore: RhiSemaphore::new(device.clone(), &format!("slot-{idx}-acquire")),
                in_flight_fence: RhiFence::new(device.clone(), true, &format!("slot-{idx}-fence")),
                command_buffer: command_pool.alloc_command_buffer(&format!("slot-{idx}-cmd")),
                active: false,
                image_index: 0,
            })
            .collect_vec();

        let mut scheduler = Self {
            device,
            graphics_queue,
            swapchain,
            render_pass,
            framebuffers: Vec::new(),
            image_finished_semaphores: Vec::new(),
            image_fences: Vec::new(),
            command_pool,
            slots,
            current_slot: 0,
            resize_pending: false,
        };
        scheduler.create_image_resources();
        scheduler
    }

    pub fn destroy(mut self) {
        self.destroy_image_resources();
        for slot in self.slots.drain(..) {
            slot.acquire_semaphore.destroy();
            slot.in_flight_fence.destroy();
        }
        self.command_pool.destroy();
        self.swapchain.destroy();
    }
}

// frame loop
impl FrameScheduler {
    /// Blocks until this slot's previous workload is done and acquires a
    /// presentation image for it.
    ///
    /// Returns `false` when the frame must be skipped (stale surface or a
    /// pending resize); the swap chain has already been recreated in that
    /// case and the caller should simply try again next iteration.
    pub fn begin_frame(&mut self, window: &dyn RenderWindow) -> bool {
        self.slots[self.current_slot].in_flight_fence.wait();

        if self.resize_pending {
            self.resize_pending = false;
            self.recreate_swapchain(window);
            return false;
        }

        let acquired = self.swapchain.acquire(&self.slots[self.current_slot].acquire_semaphore);
        let Some(image_index) = acquired else {
            self.recreate_swapchain(window);
            return false;
        };

        // an older slot may still have GPU work targeting this image
        if let Some(owner) = self.image_fences[image_index as usize] {
            self.slots[owner].in_flight_fence.wait();
        }
        self.image_fences[image_index as usize] = Some(self.current_slot);

        let slot = &mut self.slots[self.current_slot];
        slot.in_flight_fence.reset();
        slot.image_index = image_index;
        slot.active = true;
        true
    }

    /// Records the frame's commands into the current slot: render pass
    /// against the acquired image's framebuffer around the caller's draws.
    /// Pure CPU work, nothing is submitted.
    pub fn record(&mut self, clear_color: [f32; 4], draw: impl FnOnce(&ash::Device, vk::CommandBuffer)) {
        let slot = &self.slots[self.current_slot];
        debug_assert!(slot.active, "record called outside begin_frame/end_frame");

        let cmd = &slot.command_buffer;
        cmd.reset();
        cmd.begin(vk::CommandBufferUsageFlags::empty());

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let render_pass_bi = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[slot.image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.swapchain.extent(),
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(cmd.handle(), &render_pass_bi, vk::SubpassContents::INLINE);
        }
        draw(&self.device, cmd.handle());
        unsafe {
            self.device.cmd_end_render_pass(cmd.handle());
        }
        cmd.end();
    }

    /// Submits the current slot and presents its image, then advances the
    /// round-robin index. A stale surface at present recreates the swap
    /// chain; any other failure is fatal.
    pub fn end_frame(&mut self, window: &dyn RenderWindow) {
        let image_index = {
            let slot = &mut self.slots[self.current_slot];
            debug_assert!(slot.active, "end_frame without begin_frame");
            slot.active = false;
            slot.image_index
        };
        let slot = &self.slots[self.current_slot];

        let (wait_semaphores, signal_semaphores) = frame_submit_semaphores(
            slot.acquire_semaphore.handle(),
            self.image_finished_semaphores[image_index as usize].handle(),
        );
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer.handle()];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        self.graphics_queue.submit(&self.device, std::slice::from_ref(&submit), Some(&slot.in_flight_fence));

        let stale = self.swapchain.present(
            &self.graphics_queue,
            image_index,
            &self.image_finished_semaphores[image_index as usize],
        );
        if stale || self.resize_pending {
            self.resize_pending = false;
            self.recreate_swapchain(window);
        }

        self.current_slot = (self.current_slot + 1) % self.slots.len();
    }

    /// Flags the surface as stale; consumed on the next `begin_frame` or
    /// `end_frame`.
    #[inline]
    pub fn on_window_resize(&mut self) {
        self.resize_pending = true;
    }
}

/// Semaphore layout for one frame submit: wait the slot's acquire
/// semaphore, signal only the acquired image's finished semaphore (which
/// present then waits). Slot reuse is gated by the in-flight fence, so a
/// slot-owned binary semaphore in the signal list would still be signaled
/// when the slot comes around again.
fn frame_submit_semaphores(
    acquire: vk::Semaphore,
    image_finished: vk::Semaphore,
) -> ([vk::Semaphore; 1], [vk::Semaphore; 1]) {
    ([acquire], [image_finished])
}

// swapchain recreation
impl FrameScheduler {
    fn recreate_swapchain(&mut self, window: &dyn RenderWindow) {
        // a minimized window reports a zero extent; wait it out
        let extent = loop {
            let [width, height] = window.inner_size();
            if width > 0 && height > 0 {
                break vk::Extent2D { width, height };
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        };

        self.device.wait_idle();
        self.destroy_image_resources();
        self.swapchain.recreate(extent);
        self.create_image_resources();
        log::info!("swapchain recreated at {}x{}", extent.width, extent.height);
    }

    fn create_image_resources(&mut self) {
        self.framebuffers = self
            .swapchain
            .image_views()
            .iter()
            .enumerate()
            .map(|(idx, view)| {
                let attachments = [*view];
                let framebuffer_ci = vk::FramebufferCreateInfo::default()
                    .render_pass(self.render_pass)
                    .attachments(&attachments)
                    .width(self.swapchain.extent().width)
                    .height(self.swapchain.extent().height)
                    .layers(1);
                let framebuffer = unsafe { self.device.create_framebuffer(&framebuffer_ci, None).unwrap() };
                self.device.set_debug_name(framebuffer, &format!("framebuffer-{idx}"));
                framebuffer
            })
            .collect_vec();

        self.image_finished_semaphores = (0..self.swapchain.image_count())
            .map(|idx| RhiSemaphore::new(self.device.clone(), &format!("image-{idx}-finished")))
            .collect_vec();
        self.image_fences = vec![None; self.swapchain.image_count()];
    }

    fn destroy_image_resources(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
        for semaphore in self.image_finished_semaphores.drain(..) {
            semaphore.destroy();
        }
        self.image_fences.clear();
    }
}

// getters
impl FrameScheduler {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn submit_signals_only_the_image_finished_semaphore() {
        let acquire = vk::Semaphore::from_raw(0x10);
        let image_finished = vk::Semaphore::from_raw(0x20);
        let (waits, signals) = frame_submit_semaphores(acquire, image_finished);
        assert_eq!(waits, [acquire]);
        assert_eq!(signals, [image_finished]);
        assert!(!signals.contains(&acquire));
    }
}
