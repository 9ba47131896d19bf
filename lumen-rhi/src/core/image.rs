use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::core::device::RhiDevice;

/// VMA-backed 2D image, device-local.
pub struct RhiImage2D {
    handle: vk::Image,
    allocation: vk_mem::Allocation,
    extent: vk::Extent2D,
    format: vk::Format,
    allocator: Arc<vk_mem::Allocator>,
}

// Image data only changes through the transfer channel, which serializes
// every upload behind its own lock.
unsafe impl Send for RhiImage2D {}
unsafe impl Sync for RhiImage2D {}

impl RhiImage2D {
    pub fn new(
        device: &RhiDevice,
        allocator: Arc<vk_mem::Allocator>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            ..Default::default()
        };

        let (handle, allocation) = unsafe {
            allocator
                .create_image(&image_ci, &alloc_ci)
                .with_context(|| format!("failed to allocate image {debug_name} ({}x{})", extent.width, extent.height))?
        };
        device.set_debug_name(handle, debug_name);

        Ok(Self {
            handle,
            allocation,
            extent,
            format,
            allocator,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn destroy(mut self) {
        unsafe {
            self.allocator.destroy_image(self.handle, &mut self.allocation);
        }
    }
}

/// Sampled image together with its view and sampler, the unit the material
/// system hands to descriptor updates.
pub struct RhiTexture {
    image: RhiImage2D,
    view: vk::ImageView,
    sampler: vk::Sampler,
    device: Arc<RhiDevice>,
}

impl RhiTexture {
    pub fn new(device: Arc<RhiDevice>, image: RhiImage2D, debug_name: &str) -> anyhow::Result<Self> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        let view = match unsafe { device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                image.destroy();
                return Err(e).with_context(|| format!("failed to create image view for {debug_name}"));
            }
        };
        device.set_debug_name(view, &format!("{debug_name}-view"));

        let sampler_ci = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = match unsafe { device.create_sampler(&sampler_ci, None) } {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe {
                    device.destroy_image_view(view, None);
                }
                image.destroy();
                return Err(e).with_context(|| format!("failed to create sampler for {debug_name}"));
            }
        };
        device.set_debug_name(sampler, &format!("{debug_name}-sampler"));

        Ok(Self {
            image,
            view,
            sampler,
            device,
        })
    }

    #[inline]
    pub fn image(&self) -> &RhiImage2D {
        &self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.view, None);
        }
        self.image.destroy();
    }
}
