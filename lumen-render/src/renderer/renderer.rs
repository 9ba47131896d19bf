//! Top-level renderer facade: device bring-up, the mesh pipeline and the
//! per-frame driving API.

use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use lumen_rhi::core::swapchain::RhiSwapchain;
use lumen_rhi::rhi::Rhi;

use crate::asset::model::{Model, Vertex3D};
use crate::platform::window_system::RenderWindow;
use crate::renderer::frame_scheduler::FrameScheduler;
use crate::renderer::settings::RendererSettings;
use crate::transfer::channel::TransferChannel;

pub struct Renderer {
    rhi: Rhi,
    scheduler: FrameScheduler,
    transfer: Arc<TransferChannel>,

    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,

    settings: RendererSettings,
}

// new & shutdown
impl Renderer {
    pub fn new(window: &dyn RenderWindow, settings: RendererSettings) -> anyhow::Result<Self> {
        let rhi = Rhi::new(window.raw_display_handle(), window.raw_window_handle(), &settings.app_name)?;
        let device = rhi.device().clone();

        let [width, height] = window.inner_size();
        let swapchain = RhiSwapchain::new(
            device.clone(),
            rhi.surface().clone(),
            vk::Extent2D { width, height },
            settings.present_mode,
        );

        let render_pass = Self::create_render_pass(&device, swapchain.format());
        let (pipeline_layout, pipeline) = Self::create_mesh_pipeline(&device, render_pass, &settings)?;

        let scheduler =
            FrameScheduler::new(device.clone(), rhi.graphics_queue(), swapchain, render_pass, settings.frames_in_flight);
        let transfer = Arc::new(TransferChannel::new(device, rhi.allocator(), rhi.transfer_queue()));

        log::info!("renderer initialized ({} frames in flight)", scheduler.frames_in_flight());
        Ok(Self {
            rhi,
            scheduler,
            transfer,
            render_pass,
            pipeline_layout,
            pipeline,
            settings,
        })
    }

    /// Full teardown. Callers must release models through the asset hub
    /// first so no GPU buffer outlives the allocator.
    pub fn shutdown(self) {
        self.rhi.device().wait_idle();
        self.scheduler.destroy();
        unsafe {
            let device = self.rhi.device();
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
        self.transfer.shutdown();
        self.rhi.destroy();
        log::info!("renderer shut down");
    }
}

// frame loop
impl Renderer {
    /// See [`FrameScheduler::begin_frame`]; `false` means skip this frame.
    pub fn begin_frame(&mut self, window: &dyn RenderWindow) -> bool {
        self.scheduler.begin_frame(window)
    }

    /// Records draws for every GPU-resident mesh of `models`. Meshes whose
    /// buffers never got uploaded are skipped silently.
    pub fn render(&mut self, models: &[Arc<Model>]) {
        let pipeline = self.pipeline;
        let extent = self.scheduler.extent();
        let clear_color = self.settings.clear_color;

        self.scheduler.record(clear_color, |device, cmd| unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            let scissor = vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            };
            device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));

            for model in models {
                for mesh in &model.meshes {
                    let (Some(vertex_buffer), Some(index_buffer)) = (&mesh.vertex_buffer, &mesh.index_buffer)
                    else {
                        continue;
                    };
                    device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.handle()], &[0]);
                    device.cmd_bind_index_buffer(cmd, index_buffer.handle(), 0, vk::IndexType::UINT32);
                    device.cmd_draw_indexed(cmd, mesh.indices.len() as u32, 1, 0, 0, 0);
                }
            }
        });
    }

    pub fn end_frame(&mut self, window: &dyn RenderWindow) {
        self.scheduler.end_frame(window);
    }

    #[inline]
    pub fn on_window_resize(&mut self) {
        self.scheduler.on_window_resize();
    }

    /// Blocks until no submitted frame is still executing. Callers use
    /// this before destroying resources a frame might reference.
    #[inline]
    pub fn wait_idle(&self) {
        self.rhi.device().wait_idle();
    }

    /// Upload path shared with the asset hub.
    #[inline]
    pub fn transfer_channel(&self) -> Arc<TransferChannel> {
        self.transfer.clone()
    }
}

// pipeline setup
impl Renderer {
    fn create_render_pass(device: &ash::Device, format: vk::Format) -> vk::RenderPass {
        let attachments = [vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        }];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];
        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        }];

        let render_pass_ci = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { device.create_render_pass(&render_pass_ci, None).unwrap() }
    }

    fn create_mesh_pipeline(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        settings: &RendererSettings,
    ) -> anyhow::Result<(vk::PipelineLayout, vk::Pipeline)> {
        let vert_module = Self::load_shader_module(device, &settings.shader_dir.join("model.vert.spv"))?;
        let frag_module = Self::load_shader_module(device, &settings.shader_dir.join("model.frag.spv"))?;

        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(entry),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(entry),
        ];

        let bindings = Vertex3D::vertex_input_bindings();
        let attributes = Vertex3D::vertex_input_attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // viewport and scissor are dynamic so resize never rebuilds the pipeline
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let layout_ci = vk::PipelineLayoutCreateInfo::default();
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_ci, None).unwrap() };

        let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
                .map_err(|(_, e)| e)
                .unwrap()[0]
        };

        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }
        Ok((pipeline_layout, pipeline))
    }

    fn load_shader_module(device: &ash::Device, path: &std::path::Path) -> anyhow::Result<vk::ShaderModule> {
        let mut file =
            std::fs::File::open(path).with_context(|| format!("failed to open shader {}", path.display()))?;
        let code = ash::util::read_spv(&mut file).with_context(|| format!("invalid SPIR-V in {}", path.display()))?;
        let module_ci = vk::ShaderModuleCreateInfo::default().code(&code);
        Ok(unsafe { device.create_shader_module(&module_ci, None)? })
    }
}
