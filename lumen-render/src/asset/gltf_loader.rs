//! CPU-side glTF parsing. No GPU work happens here; buffers and textures
//! are filled in afterwards by the uploader.

use std::path::Path;

use anyhow::Context;
use ash::vk;
use glam::{Mat4, Quat, Vec3, Vec4};

use crate::asset::model::{Material, Mesh, Model, Node, Vertex3D};

/// Parses a `.gltf`/`.glb` file into a CPU-resident model.
pub fn load_model_file(path: impl AsRef<Path>) -> anyhow::Result<Model> {
    let path = path.as_ref();
    let (document, buffers, _images) =
        gltf::import(path).with_context(|| format!("failed to import {}", path.display()))?;

    let mut model = Model::new(path.to_string_lossy());
    model.materials = document.materials().map(parse_material).collect();
    model.meshes = document
        .meshes()
        .map(|mesh| parse_mesh(&mesh, &buffers))
        .collect::<anyhow::Result<Vec<_>>>()?;
    model.root = parse_scene(&document);
    model.loaded = true;

    log::info!(
        "parsed {}: {} meshes, {} materials",
        path.display(),
        model.meshes.len(),
        model.materials.len()
    );
    Ok(model)
}

fn parse_material(material: gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    Material {
        base_color_factor: Vec4::from_array(pbr.base_color_factor()),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        has_base_color_texture: pbr.base_color_texture().is_some(),
        texture: None,
    }
}

/// Only the first primitive of each mesh is used. A mesh without
/// primitives stays empty and is skipped at upload and draw time.
fn parse_mesh(mesh: &gltf::Mesh, buffers: &[gltf::buffer::Data]) -> anyhow::Result<Mesh> {
    let Some(primitive) = mesh.primitives().next() else {
        return Ok(Mesh::default());
    };

    let reader = primitive.reader(|buffer| Some(&*buffers[buffer.index()]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .with_context(|| format!("mesh {} has no POSITION attribute", mesh.index()))?
        .collect();
    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|iter| iter.collect());
    let uvs: Option<Vec<[f32; 2]>> = reader.read_tex_coords(0).map(|iter| iter.into_f32().collect());
    let colors: Option<Vec<[f32; 4]>> = reader.read_colors(0).map(|iter| iter.into_rgba_f32().collect());

    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, position)| Vertex3D {
            position: *position,
            normal: normals.as_ref().and_then(|n| n.get(i).copied()).unwrap_or([0.0, 0.0, 1.0]),
            uv: uvs.as_ref().and_then(|t| t.get(i).copied()).unwrap_or([0.0, 0.0]),
            color: colors.as_ref().and_then(|c| c.get(i).copied()).unwrap_or([1.0, 1.0, 1.0, 1.0]),
        })
        .collect();

    // non-indexed primitives draw their vertices in order
    let indices = reader
        .read_indices()
        .map(|iter| iter.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    Ok(Mesh {
        vertices,
        indices,
        vertex_buffer: None,
        index_buffer: None,
        material_index: primitive.material().index().unwrap_or(0),
        topology: primitive_topology(primitive.mode()),
    })
}

fn parse_scene(document: &gltf::Document) -> Option<Node> {
    let scene = document.default_scene().or_else(|| document.scenes().next())?;
    let mut root = Node {
        name: "Root".to_string(),
        transform: Mat4::IDENTITY,
        ..Default::default()
    };
    root.children = scene.nodes().map(parse_node).collect();
    Some(root)
}

fn parse_node(node: gltf::Node) -> Node {
    Node {
        name: node.name().unwrap_or_default().to_string(),
        transform: node_transform(&node.transform()),
        mesh_indices: node.mesh().map(|mesh| mesh.index() as u32).into_iter().collect(),
        children: node.children().map(parse_node).collect(),
    }
}

/// Baked local transform: either the node's explicit matrix or its TRS
/// components composed as T * R * S.
pub fn node_transform(transform: &gltf::scene::Transform) -> Mat4 {
    match transform {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from_cols_array_2d(matrix),
        gltf::scene::Transform::Decomposed { translation, rotation, scale } => Mat4::from_scale_rotation_translation(
            Vec3::from_array(*scale),
            Quat::from_xyzw(rotation[0], rotation[1], rotation[2], rotation[3]),
            Vec3::from_array(*translation),
        ),
    }
}

fn primitive_topology(mode: gltf::mesh::Mode) -> vk::PrimitiveTopology {
    match mode {
        gltf::mesh::Mode::Points => vk::PrimitiveTopology::POINT_LIST,
        gltf::mesh::Mode::Lines => vk::PrimitiveTopology::LINE_LIST,
        // closest available; the final segment is dropped
        gltf::mesh::Mode::LineLoop => vk::PrimitiveTopology::LINE_STRIP,
        gltf::mesh::Mode::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        gltf::mesh::Mode::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
        gltf::mesh::Mode::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        gltf::mesh::Mode::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // one triangle: positions (0,0,0) (1,0,0) (0,1,0), u16 indices 0,1,2
    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Tri", "mesh": 0, "translation": [1.0, 2.0, 3.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
        "buffers": [{
            "byteLength": 42,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIA"
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    fn write_temp_gltf(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_minimal_triangle() {
        let path = write_temp_gltf("lumen-triangle.gltf", TRIANGLE_GLTF);
        let model = load_model_file(&path).unwrap();

        assert!(model.loaded);
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
        // defaults for missing attributes
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
        assert_eq!(mesh.vertices[0].color, [1.0, 1.0, 1.0, 1.0]);
        assert!(mesh.vertex_buffer.is_none());
        assert!(mesh.index_buffer.is_none());

        let root = model.root.unwrap();
        assert_eq!(root.children.len(), 1);
        let tri = &root.children[0];
        assert_eq!(tri.name, "Tri");
        assert_eq!(tri.mesh_indices, vec![0]);
        assert_eq!(tri.transform, Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
    }

    // same triangle without an index accessor
    const NON_INDEXED_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Tri", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "buffers": [{
            "byteLength": 42,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIA"
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            }
        ]
    }"#;

    #[test]
    fn non_indexed_primitives_get_sequential_indices() {
        let path = write_temp_gltf("lumen-non-indexed.gltf", NON_INDEXED_GLTF);
        let model = load_model_file(&path).unwrap();

        let mesh = &model.meshes[0];
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_model_file("/nonexistent/model.gltf").is_err());
    }

    #[test]
    fn matrix_transform_matches_columns() {
        let matrix = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 3.0, 0.0],
            [4.0, 5.0, 6.0, 1.0],
        ];
        let m = node_transform(&gltf::scene::Transform::Matrix { matrix });
        assert_eq!(m, Mat4::from_cols_array_2d(&matrix));
    }

    #[test]
    fn decomposed_transform_composes_trs() {
        let transform = gltf::scene::Transform::Decomposed {
            translation: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [2.0, 2.0, 2.0],
        };
        let expected = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::IDENTITY,
            Vec3::new(1.0, 2.0, 3.0),
        );
        assert_eq!(node_transform(&transform), expected);
    }
}
