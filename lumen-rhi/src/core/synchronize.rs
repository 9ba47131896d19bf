//! CPU-visible and GPU-only synchronization primitives.

use std::sync::Arc;

use ash::vk;

use crate::core::device::RhiDevice;

pub struct RhiFence {
    fence: vk::Fence,
    device: Arc<RhiDevice>,
}

impl RhiFence {
    /// # param
    /// * signaled - create the fence in the signaled state
    pub fn new(device: Arc<RhiDevice>, signaled: bool, debug_name: &str) -> Self {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence =
            unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None).unwrap() };
        device.set_debug_name(fence, debug_name);
        Self { fence, device }
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks the calling thread until the GPU signals the fence.
    #[inline]
    pub fn wait(&self) {
        unsafe {
            self.device.wait_for_fences(std::slice::from_ref(&self.fence), true, u64::MAX).unwrap();
        }
    }

    #[inline]
    pub fn reset(&self) {
        unsafe {
            self.device.reset_fences(std::slice::from_ref(&self.fence)).unwrap();
        }
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Binary semaphore for GPU→GPU queue ordering.
pub struct RhiSemaphore {
    semaphore: vk::Semaphore,
    device: Arc<RhiDevice>,
}

impl RhiSemaphore {
    pub fn new(device: Arc<RhiDevice>, debug_name: &str) -> Self {
        let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None).unwrap() };
        device.set_debug_name(semaphore, debug_name);
        Self { semaphore, device }
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
