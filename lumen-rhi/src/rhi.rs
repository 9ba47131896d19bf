//! Instance, device and allocator bring-up.

use std::ffi::{c_void, CStr};
use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::core::device::RhiDevice;
use crate::core::queue::RhiQueue;
use crate::core::swapchain::RhiSurface;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Root of the rendering hardware interface: instance, surface, device,
/// queues and the memory allocator.
///
/// Everything that outlives a frame hangs off this type. Destruction is
/// explicit and ordered; `Drop` never touches the device.
pub struct Rhi {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    physical_device: vk::PhysicalDevice,
    device: Arc<RhiDevice>,
    surface: Arc<RhiSurface>,

    graphics_queue: RhiQueue,
    transfer_queue: RhiQueue,

    allocator: Option<Arc<vk_mem::Allocator>>,
}

// new & destroy
impl Rhi {
    pub fn new(
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        app_name: &str,
    ) -> anyhow::Result<Self> {
        let entry = unsafe { ash::Entry::load().context("failed to load the Vulkan loader")? };

        let enable_debug = cfg!(debug_assertions) && Self::validation_layer_available(&entry);
        let instance = Self::create_instance(&entry, display_handle, app_name, enable_debug)?;
        let debug_messenger = enable_debug.then(|| Self::create_debug_messenger(&entry, &instance));

        let surface_handle = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
                .context("failed to create window surface")?
        };
        let surface = Arc::new(RhiSurface::new(
            surface_handle,
            ash::khr::surface::Instance::new(&entry, &instance),
        ));

        let (physical_device, graphics_family) = Self::pick_physical_device(&instance, &surface)?;
        let transfer_family = Self::pick_transfer_family(&instance, physical_device, graphics_family);

        let device = Arc::new(RhiDevice::new(
            &instance,
            physical_device,
            graphics_family,
            transfer_family,
            enable_debug,
        ));
        let graphics_queue = RhiQueue::new(&device, graphics_family);
        let transfer_queue = RhiQueue::new(&device, transfer_family);

        let allocator_ci = vk_mem::AllocatorCreateInfo::new(&instance, &device, physical_device);
        let allocator =
            Arc::new(unsafe { vk_mem::Allocator::new(allocator_ci).context("failed to create the allocator")? });

        Ok(Self {
            _entry: entry,
            instance,
            debug_messenger,
            physical_device,
            device,
            surface,
            graphics_queue,
            transfer_queue,
            allocator: Some(allocator),
        })
    }

    /// Tears the whole stack down in reverse creation order. The caller
    /// must have destroyed every resource created from the allocator.
    pub fn destroy(mut self) {
        if let Some(allocator) = self.allocator.take() {
            if Arc::strong_count(&allocator) > 1 {
                log::warn!("allocator still shared at shutdown, GPU memory will leak");
            }
            drop(allocator);
        }
        self.device.destroy();
        self.surface.destroy();
        unsafe {
            if let Some((pf, messenger)) = self.debug_messenger.take() {
                pf.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::info!("rhi destroyed");
    }
}

// init helpers
impl Rhi {
    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
            return false;
        };
        layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME))
    }

    fn create_instance(
        entry: &ash::Entry,
        display_handle: RawDisplayHandle,
        app_name: &str,
        enable_debug: bool,
    ) -> anyhow::Result<ash::Instance> {
        let app_name = std::ffi::CString::new(app_name)?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("unsupported windowing platform")?
            .to_vec();
        if enable_debug {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if enable_debug { vec![VALIDATION_LAYER_NAME.as_ptr()] } else { vec![] };

        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance =
            unsafe { entry.create_instance(&instance_ci, None).context("failed to create instance")? };
        log::info!("instance created (validation: {enable_debug})");
        Ok(instance)
    }

    fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> (ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT) {
        let pf = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger_ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback));
        let messenger = unsafe { pf.create_debug_utils_messenger(&messenger_ci, None).unwrap() };
        (pf, messenger)
    }

    /// Picks the first physical device with a queue family that can both
    /// render and present to the surface, preferring discrete GPUs.
    fn pick_physical_device(
        instance: &ash::Instance,
        surface: &RhiSurface,
    ) -> anyhow::Result<(vk::PhysicalDevice, u32)> {
        let pdevices = unsafe { instance.enumerate_physical_devices().context("no Vulkan devices")? };

        let candidates = pdevices
            .iter()
            .filter_map(|pdevice| {
                let graphics_family = Self::find_graphics_family(instance, surface, *pdevice)?;
                let props = unsafe { instance.get_physical_device_properties(*pdevice) };
                Some((*pdevice, graphics_family, props))
            })
            .collect_vec();

        candidates
            .iter()
            .find(|(_, _, props)| props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .or_else(|| candidates.first())
            .map(|(pdevice, family, props)| {
                log::info!("using physical device: {:?}", props.device_name_as_c_str().unwrap_or_default());
                (*pdevice, *family)
            })
            .context("no suitable physical device found")
    }

    fn find_graphics_family(instance: &ash::Instance, surface: &RhiSurface, pdevice: vk::PhysicalDevice) -> Option<u32> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        families.iter().enumerate().find_map(|(idx, family)| {
            let idx = idx as u32;
            let supports_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let supports_present = unsafe {
                surface
                    .pf()
                    .get_physical_device_surface_support(pdevice, idx, surface.handle())
                    .unwrap_or(false)
            };
            (supports_graphics && supports_present).then_some(idx)
        })
    }

    /// First family with transfer support; falls back to the graphics
    /// family, which always supports transfer implicitly.
    fn pick_transfer_family(instance: &ash::Instance, pdevice: vk::PhysicalDevice, graphics_family: u32) -> u32 {
        let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::TRANSFER))
            .map(|idx| idx as u32)
            .unwrap_or(graphics_family)
    }
}

// getters
impl Rhi {
    #[inline]
    pub fn device(&self) -> &Arc<RhiDevice> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> &Arc<RhiSurface> {
        &self.surface
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> RhiQueue {
        self.graphics_queue
    }

    #[inline]
    pub fn transfer_queue(&self) -> RhiQueue {
        self.transfer_queue
    }

    /// Valid until `destroy` is called.
    #[inline]
    pub fn allocator(&self) -> Arc<vk_mem::Allocator> {
        self.allocator.as_ref().unwrap().clone()
    }
}

unsafe extern "system" fn vk_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    msg_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() {
        std::borrow::Cow::Borrowed("<empty>")
    } else {
        unsafe { CStr::from_ptr((*callback_data).p_message).to_string_lossy() }
    };
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[vulkan][{msg_type:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[vulkan][{msg_type:?}] {message}");
    } else {
        log::debug!("[vulkan][{msg_type:?}] {message}");
    }
    vk::FALSE
}
