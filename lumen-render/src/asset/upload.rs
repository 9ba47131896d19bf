//! Seam between CPU-parsed models and GPU residency.

use ash::vk;
use lumen_rhi::core::image::RhiTexture;

use crate::asset::model::{Material, Mesh, Model};
use crate::transfer::channel::TransferChannel;

/// Makes parsed model data GPU-resident and tears it down again.
///
/// The asset hub only talks to this trait, which keeps it testable without
/// a device.
pub trait ModelUploader: Send + Sync {
    /// Creates and fills the mesh's GPU buffers. Empty meshes are skipped.
    fn upload_mesh(&self, mesh: &mut Mesh, debug_name: &str) -> anyhow::Result<()>;

    /// Creates the material's texture when the source asset references one.
    fn upload_material(&self, material: &mut Material, debug_name: &str) -> anyhow::Result<()>;

    /// Releases every GPU resource the model owns.
    fn destroy_model(&self, model: &mut Model);

    fn is_alive(&self) -> bool;

    fn shutdown(&self);
}

impl ModelUploader for TransferChannel {
    fn upload_mesh(&self, mesh: &mut Mesh, debug_name: &str) -> anyhow::Result<()> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Ok(());
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let mut vertex_buffer =
            self.create_vertex_buffer(vertex_bytes.len() as vk::DeviceSize, &format!("{debug_name}-vertices"))?;
        if let Err(e) = self.upload_buffer(&mut vertex_buffer, vertex_bytes) {
            vertex_buffer.destroy();
            return Err(e);
        }

        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
        let index_buffer =
            self.create_index_buffer(index_bytes.len() as vk::DeviceSize, &format!("{debug_name}-indices"));
        let mut index_buffer = match index_buffer {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.destroy();
                return Err(e);
            }
        };
        if let Err(e) = self.upload_buffer(&mut index_buffer, index_bytes) {
            vertex_buffer.destroy();
            index_buffer.destroy();
            return Err(e);
        }

        mesh.vertex_buffer = Some(vertex_buffer);
        mesh.index_buffer = Some(index_buffer);
        Ok(())
    }

    /// Image decoding is not wired up yet, so any referenced base-color
    /// texture becomes a 1x1 white placeholder the shader can sample.
    fn upload_material(&self, material: &mut Material, debug_name: &str) -> anyhow::Result<()> {
        if !material.has_base_color_texture || material.texture.is_some() {
            return Ok(());
        }

        let image =
            self.create_image_2d(vk::Extent2D { width: 1, height: 1 }, vk::Format::R8G8B8A8_SRGB, debug_name)?;
        let white_pixel = 0xFFFF_FFFF_u32.to_ne_bytes();
        if let Err(e) = self.upload_image(&image, &white_pixel) {
            image.destroy();
            return Err(e);
        }

        match RhiTexture::new(self.device().clone(), image, debug_name) {
            Ok(texture) => {
                material.texture = Some(texture);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn destroy_model(&self, model: &mut Model) {
        for mesh in &mut model.meshes {
            if let Some(buffer) = mesh.vertex_buffer.take() {
                buffer.destroy();
            }
            if let Some(buffer) = mesh.index_buffer.take() {
                buffer.destroy();
            }
        }
        for material in &mut model.materials {
            if let Some(texture) = material.texture.take() {
                texture.destroy();
            }
        }
        model.loaded = false;
    }

    fn is_alive(&self) -> bool {
        TransferChannel::is_alive(self)
    }

    fn shutdown(&self) {
        TransferChannel::shutdown(self);
    }
}
