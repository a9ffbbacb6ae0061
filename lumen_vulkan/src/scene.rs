use glam::{Vec3, Vec4};

#[repr(u32)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PrimitiveKind {
    Plane = 0,
    Triangle = 1,
}

/// One entry of the ray tracer's primitive storage buffer.
///
/// Planes use `v0` as a point on the plane and `v1` as its normal.
/// Triangles store their corners in `v0..v2`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuPrimitive {
    pub kind: u32,
    pub id: u32,
    pub material_id: u32,
    pub pad: u32,
    pub v0: Vec4,
    pub v1: Vec4,
    pub v2: Vec4,
}

impl GpuPrimitive {
    pub fn kind(&self) -> Option<PrimitiveKind> {
        match self.kind {
            0 => Some(PrimitiveKind::Plane),
            1 => Some(PrimitiveKind::Triangle),
            _ => None,
        }
    }
}

/// Issues primitive ids from its own counter, starting at zero.
#[derive(Debug, Default, Clone)]
pub struct PrimitiveBuilder {
    next_id: u32,
    primitives: Vec<GpuPrimitive>,
}

impl PrimitiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: PrimitiveKind, material_id: u32, vertices: [Vec4; 3]) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.primitives.push(GpuPrimitive {
            kind: kind as u32,
            id,
            material_id,
            pad: 0,
            v0: vertices[0],
            v1: vertices[1],
            v2: vertices[2],
        });
        id
    }

    pub fn add_plane(&mut self, point: Vec3, normal: Vec3, material_id: u32) -> u32 {
        self.push(
            PrimitiveKind::Plane,
            material_id,
            [
                point.extend(1.0),
                normal.normalize_or_zero().extend(0.0),
                Vec4::ZERO,
            ],
        )
    }

    pub fn add_triangle(&mut self, corners: [Vec3; 3], material_id: u32) -> u32 {
        self.push(
            PrimitiveKind::Triangle,
            material_id,
            corners.map(|corner| corner.extend(1.0)),
        )
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn primitives(&self) -> &[GpuPrimitive] {
        &self.primitives
    }

    pub fn build(self) -> Vec<GpuPrimitive> {
        self.primitives
    }
}

/// Ground plane plus a single triangle, used when no scene file is given.
pub fn default_primitives() -> Vec<GpuPrimitive> {
    let mut builder = PrimitiveBuilder::new();
    builder.add_plane(Vec3::new(0.0, -1.0, 0.0), Vec3::Y, 0);
    builder.add_triangle(
        [
            Vec3::new(-1.5, -1.0, 0.0),
            Vec3::new(1.5, -1.0, 0.0),
            Vec3::new(0.0, 1.5, 0.0),
        ],
        1,
    );
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_per_builder() {
        let mut builder = PrimitiveBuilder::new();
        assert_eq!(builder.add_plane(Vec3::ZERO, Vec3::Y, 0), 0);
        assert_eq!(builder.add_triangle([Vec3::X, Vec3::Y, Vec3::Z], 2), 1);
        assert_eq!(builder.add_plane(Vec3::ONE, Vec3::Z, 1), 2);

        let ids: Vec<u32> = builder.primitives().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        // A second builder does not share the first one's counter.
        let mut other = PrimitiveBuilder::new();
        assert_eq!(other.add_plane(Vec3::ZERO, Vec3::Y, 0), 0);
    }

    #[test]
    fn plane_normal_is_normalized_direction() {
        let mut builder = PrimitiveBuilder::new();
        builder.add_plane(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 4.0, 0.0), 5);
        let plane = builder.build()[0];
        assert_eq!(plane.kind(), Some(PrimitiveKind::Plane));
        assert_eq!(plane.v0, Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(plane.v1, Vec4::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(plane.material_id, 5);
    }

    #[test]
    fn gpu_layout_is_std430_friendly() {
        assert_eq!(std::mem::size_of::<GpuPrimitive>(), 64);
        assert_eq!(std::mem::offset_of!(GpuPrimitive, v0), 16);
        assert_eq!(default_primitives().len(), 2);
    }
}
