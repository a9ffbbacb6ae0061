use lumen_vulkan::{default_primitives, GeometryData, SceneInput};

/// Unit cube with flat shaded faces, wound counter-clockwise from outside.
pub fn cube() -> anyhow::Result<GeometryData> {
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // normal, u axis, v axis
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in FACES {
        let base = positions.len() as u16;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            positions.push([0, 1, 2].map(|i| 0.5 * (normal[i] + su * u[i] + sv * v[i])));
            normals.push(normal);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    Ok(GeometryData::with_normals(&indices, &positions, &normals)?)
}

pub fn builtin_scene() -> anyhow::Result<SceneInput> {
    Ok(SceneInput {
        geometries: vec![cube()?],
        primitives: default_primitives(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn cube_has_six_quads() {
        let cube = cube().unwrap();
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.position.info.count, 24);
    }

    #[test]
    fn cube_faces_point_outwards() {
        let cube = cube().unwrap();
        let floats = |bytes: &[u8]| -> Vec<Vec3> {
            let values: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            values.chunks_exact(3).map(Vec3::from_slice).collect()
        };
        let positions = floats(&cube.position.bytes);
        let normals = floats(&cube.surface.bytes);
        let indices: Vec<u16> = cube
            .index
            .bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_ne_bytes([chunk[0], chunk[1]]))
            .collect();

        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| positions[triangle[i] as usize]);
            let winding = (b - a).cross(c - a).normalize();
            assert!(winding.abs_diff_eq(normals[triangle[0] as usize], 1e-5));
        }
    }
}
