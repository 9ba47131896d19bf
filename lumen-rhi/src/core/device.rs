use std::ffi::CString;
use std::ops::Deref;

use ash::vk;
use itertools::Itertools;

/// Logical device plus the extension function tables used by this engine.
///
/// The function pointers are immutable for the lifetime of the application,
/// so the whole struct is shared as `Arc<RhiDevice>` between the render
/// thread and the asset loader threads.
pub struct RhiDevice {
    device: ash::Device,
    swapchain_pf: ash::khr::swapchain::Device,
    debug_utils_pf: Option<ash::ext::debug_utils::Device>,

    physical_device: vk::PhysicalDevice,
    graphics_family: u32,
    transfer_family: u32,
}

// new & destroy
impl RhiDevice {
    pub fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        graphics_family: u32,
        transfer_family: u32,
        enable_debug_utils: bool,
    ) -> Self {
        let queue_priorities = [1.0_f32];
        let queue_create_infos = [graphics_family, transfer_family]
            .iter()
            .unique()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*family)
                    .queue_priorities(&queue_priorities)
            })
            .collect_vec();

        let device_exts = [ash::khr::swapchain::NAME.as_ptr()];
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts);

        let device = unsafe { instance.create_device(pdevice, &device_create_info, None).unwrap() };
        log::info!(
            "logical device created (graphics family {}, transfer family {})",
            graphics_family,
            transfer_family
        );

        let swapchain_pf = ash::khr::swapchain::Device::new(instance, &device);
        let debug_utils_pf = enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        Self {
            device,
            swapchain_pf,
            debug_utils_pf,
            physical_device: pdevice,
            graphics_family,
            transfer_family,
        }
    }

    pub fn destroy(&self) {
        log::info!("destroying device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// getters
impl RhiDevice {
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn swapchain_pf(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_pf
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    #[inline]
    pub fn transfer_family(&self) -> u32 {
        self.transfer_family
    }
}

// tools
impl RhiDevice {
    /// Blocks until every queue on the device has drained.
    #[inline]
    pub fn wait_idle(&self) {
        unsafe { self.device.device_wait_idle().unwrap() }
    }

    /// No-op when debug utils were not enabled at instance creation.
    pub fn set_debug_name(&self, handle: impl vk::Handle, name: &str) {
        let Some(debug_utils) = &self.debug_utils_pf else {
            return;
        };
        let name = CString::new(name).unwrap_or_default();
        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(&name);
        unsafe {
            // best effort only
            let _ = debug_utils.set_debug_utils_object_name(&info);
        }
    }
}

impl Deref for RhiDevice {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
