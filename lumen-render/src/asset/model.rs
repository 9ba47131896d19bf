//! CPU and GPU representation of loaded models.

use ash::vk;
use glam::{Mat4, Vec4};
use lumen_rhi::core::buffer::RhiBuffer;
use lumen_rhi::core::image::RhiTexture;

/// Interleaved vertex layout shared by every mesh pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex3D {
    pub fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Self, normal) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Self, uv) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 3,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Self, color) as u32,
            },
        ]
    }
}

/// One drawable primitive. GPU buffers are `None` until the uploader has
/// run, and again after the model is destroyed.
pub struct Mesh {
    pub vertices: Vec<Vertex3D>,
    pub indices: Vec<u32>,
    pub vertex_buffer: Option<RhiBuffer>,
    pub index_buffer: Option<RhiBuffer>,
    pub material_index: usize,
    pub topology: vk::PrimitiveTopology,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            vertex_buffer: None,
            index_buffer: None,
            material_index: 0,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        }
    }
}

pub struct Material {
    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    /// Set when the source asset references a base-color image; the actual
    /// texture stays a placeholder until image loading is wired up.
    pub has_base_color_texture: bool,
    pub texture: Option<RhiTexture>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            has_base_color_texture: false,
            texture: None,
        }
    }
}

/// Scene-graph node with a baked local transform.
#[derive(Default)]
pub struct Node {
    pub name: String,
    pub transform: Mat4,
    pub mesh_indices: Vec<u32>,
    pub children: Vec<Node>,
}

pub struct Model {
    pub name: String,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub root: Option<Node>,
    pub loaded: bool,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meshes: Vec::new(),
            materials: Vec::new(),
            root: None,
            loaded: false,
        }
    }
}

/// Unit-cube geometry with per-face normals folded into 8 shared vertices
/// and per-vertex debug colors. Winding is clockwise, front face +Z.
pub fn cube_mesh_data() -> (Vec<Vertex3D>, Vec<u32>) {
    let vertices = vec![
        // front face
        Vertex3D { position: [-0.5, -0.5, 0.5], normal: [0.0, 0.0, 1.0], uv: [0.0, 0.0], color: [1.0, 0.0, 0.0, 1.0] },
        Vertex3D { position: [0.5, -0.5, 0.5], normal: [0.0, 0.0, 1.0], uv: [1.0, 0.0], color: [0.0, 1.0, 0.0, 1.0] },
        Vertex3D { position: [0.5, 0.5, 0.5], normal: [0.0, 0.0, 1.0], uv: [1.0, 1.0], color: [0.0, 0.0, 1.0, 1.0] },
        Vertex3D { position: [-0.5, 0.5, 0.5], normal: [0.0, 0.0, 1.0], uv: [0.0, 1.0], color: [1.0, 1.0, 0.0, 1.0] },
        // back face
        Vertex3D {
            position: [-0.5, -0.5, -0.5],
            normal: [0.0, 0.0, -1.0],
            uv: [1.0, 0.0],
            color: [1.0, 0.0, 1.0, 1.0],
        },
        Vertex3D {
            position: [0.5, -0.5, -0.5],
            normal: [0.0, 0.0, -1.0],
            uv: [0.0, 0.0],
            color: [0.0, 1.0, 1.0, 1.0],
        },
        Vertex3D {
            position: [0.5, 0.5, -0.5],
            normal: [0.0, 0.0, -1.0],
            uv: [0.0, 1.0],
            color: [1.0, 1.0, 1.0, 1.0],
        },
        Vertex3D {
            position: [-0.5, 0.5, -0.5],
            normal: [0.0, 0.0, -1.0],
            uv: [1.0, 1.0],
            color: [0.5, 0.5, 0.5, 1.0],
        },
    ];

    #[rustfmt::skip]
    let indices = vec![
        0, 1, 2,  2, 3, 0, // front
        4, 6, 5,  6, 4, 7, // back
        4, 0, 3,  3, 7, 4, // left
        1, 5, 6,  6, 2, 1, // right
        3, 2, 6,  6, 7, 3, // top
        4, 5, 1,  1, 0, 4, // bottom
    ];

    (vertices, indices)
}

/// CPU side of the builtin cube: red material, root node named "Cube"
/// referencing the single mesh. GPU buffers are left for the uploader.
pub fn build_cube_model() -> Model {
    let (vertices, indices) = cube_mesh_data();
    let mut model = Model::new("cube");
    model.meshes.push(Mesh {
        vertices,
        indices,
        ..Default::default()
    });
    model.materials.push(Material {
        base_color_factor: Vec4::new(0.8, 0.2, 0.2, 1.0),
        metallic_factor: 0.0,
        roughness_factor: 0.5,
        ..Default::default()
    });
    model.root = Some(Node {
        name: "Cube".to_string(),
        transform: Mat4::IDENTITY,
        mesh_indices: vec![0],
        children: Vec::new(),
    });
    model.loaded = true;
    model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex3D>(), 48);
        assert_eq!(std::mem::offset_of!(Vertex3D, position), 0);
        assert_eq!(std::mem::offset_of!(Vertex3D, normal), 12);
        assert_eq!(std::mem::offset_of!(Vertex3D, uv), 24);
        assert_eq!(std::mem::offset_of!(Vertex3D, color), 32);
    }

    #[test]
    fn cube_geometry_is_deterministic() {
        let (vertices_a, indices_a) = cube_mesh_data();
        let (vertices_b, indices_b) = cube_mesh_data();
        assert_eq!(vertices_a.len(), 8);
        assert_eq!(indices_a.len(), 36);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&vertices_a), bytemuck::cast_slice::<_, u8>(&vertices_b));
        assert_eq!(indices_a, indices_b);
    }

    #[test]
    fn cube_indices_stay_in_range() {
        let (vertices, indices) = cube_mesh_data();
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn cube_model_shape() {
        let model = build_cube_model();
        assert_eq!(model.name, "cube");
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.materials.len(), 1);
        assert!(model.loaded);

        let root = model.root.as_ref().unwrap();
        assert_eq!(root.name, "Cube");
        assert_eq!(root.mesh_indices, vec![0]);
        assert_eq!(model.materials[0].base_color_factor, Vec4::new(0.8, 0.2, 0.2, 1.0));
        assert_eq!(model.materials[0].metallic_factor, 0.0);
        assert_eq!(model.materials[0].roughness_factor, 0.5);
        assert!(!model.materials[0].has_base_color_texture);
    }
}
