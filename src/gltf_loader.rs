use anyhow::{anyhow, Context};
use glam::{Mat3, Mat4, Vec3};
use lumen_vulkan::{GeometryData, PrimitiveBuilder, SceneInput};
use std::path::Path;

pub fn load_scene(path: &Path) -> anyhow::Result<SceneInput> {
    let (gltf_doc, buffers, _images) = {
        let now = std::time::Instant::now();
        let result = gltf::import(path).with_context(|| format!("Failed to import {}", path.display()))?;
        info!("File Loading: {}", now.elapsed().as_secs_f32());
        result
    };

    let scene = build_scene(&gltf_doc, &buffers)?;
    if scene.geometries.is_empty() {
        return Err(anyhow!("{} contains no meshes", path.display()));
    }

    info!(
        "Loaded {}: {} primitives, {} ray traced triangles",
        path.display(),
        scene.geometries.len(),
        scene.primitives.len()
    );
    Ok(scene)
}

/// Meshes are placed in world space by walking the scene's node tree.
fn build_scene(gltf_doc: &gltf::Document, gltf_buffers: &[gltf::buffer::Data]) -> anyhow::Result<SceneInput> {
    let mut builder = PrimitiveBuilder::new();
    let mut geometries = Vec::new();

    match gltf_doc.default_scene().or_else(|| gltf_doc.scenes().next()) {
        Some(gltf_scene) => {
            for gltf_node in gltf_scene.nodes() {
                load_node(gltf_buffers, &gltf_node, Mat4::IDENTITY, &mut builder, &mut geometries)?;
            }
        }
        None => {
            for gltf_mesh in gltf_doc.meshes() {
                load_mesh(gltf_buffers, &gltf_mesh, Mat4::IDENTITY, &mut builder, &mut geometries)?;
            }
        }
    }

    Ok(SceneInput {
        geometries,
        primitives: builder.build(),
        ..Default::default()
    })
}

fn load_node(
    gltf_buffers: &[gltf::buffer::Data],
    gltf_node: &gltf::Node,
    parent_transform: Mat4,
    builder: &mut PrimitiveBuilder,
    geometries: &mut Vec<GeometryData>,
) -> anyhow::Result<()> {
    let transform = parent_transform * Mat4::from_cols_array_2d(&gltf_node.transform().matrix());

    if let Some(gltf_mesh) = gltf_node.mesh() {
        load_mesh(gltf_buffers, &gltf_mesh, transform, builder, geometries)?;
    }

    for child in gltf_node.children() {
        load_node(gltf_buffers, &child, transform, builder, geometries)?;
    }
    Ok(())
}

fn load_mesh(
    gltf_buffers: &[gltf::buffer::Data],
    gltf_mesh: &gltf::Mesh,
    transform: Mat4,
    builder: &mut PrimitiveBuilder,
    geometries: &mut Vec<GeometryData>,
) -> anyhow::Result<()> {
    let name = gltf_mesh.name().unwrap_or("Unnamed Mesh");
    for gltf_primitive in gltf_mesh.primitives() {
        let geometry = load_primitive(gltf_buffers, &gltf_primitive, transform, builder)
            .with_context(|| format!("Mesh {} primitive {}", name, gltf_primitive.index()))?;
        geometries.push(geometry);
    }
    Ok(())
}

fn load_primitive(
    gltf_buffers: &[gltf::buffer::Data],
    gltf_primitive: &gltf::Primitive,
    transform: Mat4,
    builder: &mut PrimitiveBuilder,
) -> anyhow::Result<GeometryData> {
    if gltf_primitive.mode() != gltf::mesh::Mode::Triangles {
        return Err(anyhow!("Only triangle lists are supported"));
    }

    let reader = gltf_primitive.reader(|buffer| Some(&gltf_buffers[buffer.index()]));

    let positions: Vec<[f32; 3]> = match reader.read_positions() {
        None => return Err(anyhow!("Mesh contains no vertex positions")),
        Some(positions) => positions
            .map(|position| transform.transform_point3(Vec3::from_array(position)).to_array())
            .collect(),
    };

    let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();
    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        None => return Err(anyhow!("Mesh primitive doesn't contain normals")),
        Some(normals) => normals
            .map(|normal| (normal_matrix * Vec3::from_array(normal)).normalize_or_zero().to_array())
            .collect(),
    };

    let indices = match reader.read_indices() {
        Some(indices) => narrow_indices(indices.into_u32())?,
        None => narrow_indices(0..positions.len() as u32)?,
    };
    check_indices(&indices, positions.len())?;

    let material_id = gltf_primitive.material().index().unwrap_or(0) as u32;
    for triangle in indices.chunks_exact(3) {
        let corner = |i: usize| Vec3::from_array(positions[triangle[i] as usize]);
        builder.add_triangle([corner(0), corner(1), corner(2)], material_id);
    }

    Ok(GeometryData::with_normals(&indices, &positions, &normals)?)
}

fn check_indices(indices: &[u16], vertex_count: usize) -> anyhow::Result<()> {
    match indices.iter().find(|&&index| index as usize >= vertex_count) {
        Some(index) => Err(anyhow!(
            "Index {} is out of range for {} vertices",
            index,
            vertex_count
        )),
        None => Ok(()),
    }
}

/// The geometry path only draws 16 bit indices.
pub fn narrow_indices(indices: impl IntoIterator<Item = u32>) -> anyhow::Result<Vec<u16>> {
    indices
        .into_iter()
        .map(|index| {
            u16::try_from(index).map_err(|_| anyhow!("Index {} does not fit in 16 bits", index))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrows_small_indices() {
        assert_eq!(narrow_indices([0, 1, 65535]).unwrap(), vec![0, 1, 65535]);
    }

    #[test]
    fn rejects_wide_indices() {
        let err = narrow_indices([0, 70000]).unwrap_err();
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        assert!(check_indices(&[0, 1, 2], 3).is_ok());
        let err = check_indices(&[0, 1, 3], 3).unwrap_err();
        assert!(err.to_string().contains("Index 3"));
    }

    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": NODES,
        "meshes": [{ "name": "Triangle", "primitives": [{ "attributes": { "POSITION": 0, "NORMAL": 1 } }] }],
        "buffers": [{
            "byteLength": 72,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAAAAAAAAAAAAIA/AAAAAAAAAAAAAIA/AAAAAAAAAAAAAIA/"
        }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 72 }],
        "accessors": [
            { "bufferView": 0, "byteOffset": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 0, "byteOffset": 36, "componentType": 5126, "count": 3, "type": "VEC3" }
        ]
    }"#;

    fn triangle_scene(nodes: &str) -> SceneInput {
        let json = TRIANGLE_GLTF.replace("NODES", nodes);
        let (gltf_doc, buffers, _images) = gltf::import_slice(json.as_bytes()).unwrap();
        build_scene(&gltf_doc, &buffers).unwrap()
    }

    fn first_position(scene: &SceneInput) -> [f32; 3] {
        let bytes = &scene.geometries[0].position.bytes;
        [0, 1, 2].map(|i| {
            let at = i * 4;
            f32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        })
    }

    #[test]
    fn node_translation_moves_geometry() {
        let scene = triangle_scene(r#"[{ "mesh": 0, "translation": [10.0, 0.0, 0.0] }]"#);
        assert_eq!(scene.primitives.len(), 1);
        assert_eq!(scene.primitives[0].v0.x, 10.0);
        assert_eq!(scene.primitives[0].v1.x, 11.0);
        assert_eq!(first_position(&scene), [10.0, 0.0, 0.0]);
    }

    #[test]
    fn child_nodes_accumulate_parent_transforms() {
        let scene = triangle_scene(
            r#"[
                { "children": [1], "scale": [2.0, 2.0, 2.0] },
                { "mesh": 0, "translation": [10.0, 0.0, 0.0] }
            ]"#,
        );
        assert_eq!(scene.geometries.len(), 1);
        assert_eq!(scene.primitives[0].v0.x, 20.0);
        assert_eq!(scene.primitives[0].v1.x, 22.0);
        assert_eq!(scene.primitives[0].v2.y, 2.0);
    }

    #[test]
    fn normals_use_inverse_transpose() {
        let scene = triangle_scene(r#"[{ "mesh": 0, "scale": [1.0, 1.0, 4.0] }]"#);
        let bytes = &scene.geometries[0].surface.bytes;
        let z = f32::from_ne_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(z, 1.0);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_scene(Path::new("does/not/exist.gltf")).is_err());
    }
}
