use std::sync::Arc;

use ash::vk;
use itertools::Itertools;

use crate::core::device::RhiDevice;
use crate::core::queue::RhiQueue;
use crate::core::synchronize::RhiSemaphore;

/// Window surface plus the instance-level function table needed to query it.
pub struct RhiSurface {
    handle: vk::SurfaceKHR,
    pf: ash::khr::surface::Instance,
}

impl RhiSurface {
    pub fn new(handle: vk::SurfaceKHR, pf: ash::khr::surface::Instance) -> Self {
        Self { handle, pf }
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn pf(&self) -> &ash::khr::surface::Instance {
        &self.pf
    }

    pub fn destroy(&self) {
        unsafe {
            self.pf.destroy_surface(self.handle, None);
        }
    }
}

/// Swapchain and the per-image resources derived from it.
///
/// `recreate` tears down only what the swapchain itself owns; the frame
/// scheduler rebuilds its per-image framebuffers and semaphores afterwards.
pub struct RhiSwapchain {
    device: Arc<RhiDevice>,
    surface: Arc<RhiSurface>,

    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    extent: vk::Extent2D,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    present_mode: vk::PresentModeKHR,
}

// new & recreate
impl RhiSwapchain {
    pub fn new(
        device: Arc<RhiDevice>,
        surface: Arc<RhiSurface>,
        extent_hint: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
    ) -> Self {
        let mut swapchain = Self {
            device,
            surface,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            extent: vk::Extent2D::default(),
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            present_mode,
        };
        swapchain.create_swapchain(extent_hint);
        swapchain.create_image_views();
        swapchain
    }

    /// Destroys the old swapchain and builds a new one for the current
    /// surface size. The caller must have waited the device idle.
    pub fn recreate(&mut self, extent_hint: vk::Extent2D) {
        self.destroy_image_views();
        unsafe {
            self.device.swapchain_pf().destroy_swapchain(self.handle, None);
        }
        self.create_swapchain(extent_hint);
        self.create_image_views();
    }

    fn create_swapchain(&mut self, extent_hint: vk::Extent2D) {
        let pdevice = self.device.physical_device();
        let surface_pf = self.surface.pf();
        let capabilities = unsafe {
            surface_pf.get_physical_device_surface_capabilities(pdevice, self.surface.handle()).unwrap()
        };
        let formats =
            unsafe { surface_pf.get_physical_device_surface_formats(pdevice, self.surface.handle()).unwrap() };
        let present_modes = unsafe {
            surface_pf.get_physical_device_surface_present_modes(pdevice, self.surface.handle()).unwrap()
        };

        let surface_format = formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
            .unwrap_or(formats[0]);

        let present_mode = if present_modes.contains(&self.present_mode) {
            self.present_mode
        } else {
            // guaranteed by every conformant driver
            vk::PresentModeKHR::FIFO
        };

        // special value: the surface lets the swapchain decide
        let extent = if capabilities.current_extent.width == u32::MAX {
            vk::Extent2D {
                width: extent_hint
                    .width
                    .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: extent_hint
                    .height
                    .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        } else {
            capabilities.current_extent
        };

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let swapchain_ci = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        self.handle = unsafe { self.device.swapchain_pf().create_swapchain(&swapchain_ci, None).unwrap() };
        self.images = unsafe { self.device.swapchain_pf().get_swapchain_images(self.handle).unwrap() };
        self.extent = extent;
        self.format = surface_format.format;
        self.color_space = surface_format.color_space;

        log::info!(
            "swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            self.images.len(),
            surface_format.format,
            present_mode
        );
    }

    fn create_image_views(&mut self) {
        self.image_views = self
            .images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                let view_ci = vk::ImageViewCreateInfo::default()
                    .image(*image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .level_count(1)
                            .layer_count(1),
                    );
                let view = unsafe { self.device.create_image_view(&view_ci, None).unwrap() };
                self.device.set_debug_name(view, &format!("swapchain-view-{idx}"));
                self.device.set_debug_name(*image, &format!("swapchain-image-{idx}"));
                view
            })
            .collect_vec();
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe {
                self.device.destroy_image_view(view, None);
            }
        }
    }

    pub fn destroy(mut self) {
        self.destroy_image_views();
        unsafe {
            self.device.swapchain_pf().destroy_swapchain(self.handle, None);
        }
    }
}

// acquire & present
impl RhiSwapchain {
    /// Acquires the next presentation image.
    ///
    /// Returns `None` when the swapchain is out of date and must be
    /// recreated before any image can be acquired. A suboptimal result
    /// still yields a usable image and is treated as success.
    pub fn acquire(&self, semaphore: &RhiSemaphore) -> Option<u32> {
        let result = unsafe {
            self.device.swapchain_pf().acquire_next_image(
                self.handle,
                u64::MAX,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, _suboptimal)) => Some(image_index),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => None,
            Err(e) => panic!("failed to acquire swapchain image: {e:?}"),
        }
    }

    /// Queues the image for presentation.
    ///
    /// Returns `true` when the swapchain has gone stale (suboptimal or out
    /// of date) and should be recreated before the next frame.
    pub fn present(&self, queue: &RhiQueue, image_index: u32, wait_semaphore: &RhiSemaphore) -> bool {
        let wait_semaphores = [wait_semaphore.handle()];
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.device.swapchain_pf().queue_present(queue.handle(), &present_info) };
        match result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => panic!("failed to present swapchain image: {e:?}"),
        }
    }
}

// getters
impl RhiSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}
