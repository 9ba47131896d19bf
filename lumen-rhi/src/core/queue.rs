use ash::vk;

use crate::core::device::RhiDevice;
use crate::core::synchronize::RhiFence;

/// A device queue together with the family it was created from.
///
/// Submission failure is a device-level error and aborts the process.
#[derive(Clone, Copy)]
pub struct RhiQueue {
    handle: vk::Queue,
    family_index: u32,
}

impl RhiQueue {
    pub fn new(device: &RhiDevice, family_index: u32) -> Self {
        let handle = unsafe { device.get_device_queue(family_index, 0) };
        Self { handle, family_index }
    }

    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    #[inline]
    pub fn submit(&self, device: &RhiDevice, submits: &[vk::SubmitInfo], fence: Option<&RhiFence>) {
        unsafe {
            device
                .queue_submit(self.handle, submits, fence.map_or(vk::Fence::null(), |f| f.handle()))
                .unwrap();
        }
    }

    /// Equivalent to waiting a fence on the last submission.
    #[inline]
    pub fn wait_idle(&self, device: &RhiDevice) {
        unsafe { device.queue_wait_idle(self.handle).unwrap() }
    }
}
