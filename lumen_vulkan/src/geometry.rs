use crate::command::GeometryDraw;
use crate::resource_manager::ResourceManager;
use crate::transfer::StagingTransfer;
use crate::{BufferKey, VulkanError};
use ash::vk;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AttributeKind {
    Index,
    Position,
    Normal,
    TexCoord,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VertexAttributeInfo {
    pub byte_stride: usize,
    pub count: usize,
    pub component_length: u32,
    pub component_byte_size: u32,
}

impl VertexAttributeInfo {
    pub fn tightly_packed<T>(count: usize, component_length: u32) -> Self {
        let component_byte_size = std::mem::size_of::<T>() as u32;
        Self {
            byte_stride: (component_length * component_byte_size) as usize,
            count,
            component_length,
            component_byte_size,
        }
    }

    fn vertex_format(&self) -> Option<vk::Format> {
        match (self.component_length, self.component_byte_size) {
            (2, 4) => Some(vk::Format::R32G32_SFLOAT),
            (3, 4) => Some(vk::Format::R32G32B32_SFLOAT),
            (4, 4) => Some(vk::Format::R32G32B32A32_SFLOAT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttributeData {
    pub kind: AttributeKind,
    pub bytes: Vec<u8>,
    pub info: VertexAttributeInfo,
}

impl AttributeData {
    pub fn new<T: bytemuck::Pod>(kind: AttributeKind, data: &[T], component_length: u32) -> Self {
        let components = component_length as usize;
        Self {
            kind,
            bytes: bytemuck::cast_slice(data).to_vec(),
            info: VertexAttributeInfo::tightly_packed::<T>(data.len() / components.max(1), component_length),
        }
    }
}

/// Raw mesh data: 16 bit indices, positions and either normals or texture coordinates.
#[derive(Debug, Clone)]
pub struct GeometryData {
    pub index: AttributeData,
    pub position: AttributeData,
    pub surface: AttributeData,
}

impl GeometryData {
    pub fn new(indices: &[u16], positions: &[[f32; 3]], surface: AttributeData) -> Result<Self, VulkanError> {
        let geometry = Self {
            index: AttributeData::new(AttributeKind::Index, indices, 1),
            position: AttributeData::new(AttributeKind::Position, positions.concat().as_slice(), 3),
            surface,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn with_normals(
        indices: &[u16],
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
    ) -> Result<Self, VulkanError> {
        let normals = AttributeData::new(AttributeKind::Normal, normals.concat().as_slice(), 3);
        Self::new(indices, positions, normals)
    }

    pub fn with_tex_coords(
        indices: &[u16],
        positions: &[[f32; 3]],
        tex_coords: &[[f32; 2]],
    ) -> Result<Self, VulkanError> {
        let tex_coords = AttributeData::new(AttributeKind::TexCoord, tex_coords.concat().as_slice(), 2);
        Self::new(indices, positions, tex_coords)
    }

    /// Two triangles covering clip space, counter-clockwise on screen, with uvs.
    pub fn fullscreen_quad() -> Result<Self, VulkanError> {
        Self::with_tex_coords(
            &[0, 3, 2, 2, 1, 0],
            &[
                [-1.0, -1.0, 0.0],
                [1.0, -1.0, 0.0],
                [1.0, 1.0, 0.0],
                [-1.0, 1.0, 0.0],
            ],
            &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        )
    }

    pub fn validate(&self) -> Result<(), VulkanError> {
        if self.index.kind != AttributeKind::Index || self.position.kind != AttributeKind::Position {
            return Err(VulkanError::InvalidGeometry(
                "index and position regions are mislabelled".to_string(),
            ));
        }
        if !matches!(self.surface.kind, AttributeKind::Normal | AttributeKind::TexCoord) {
            return Err(VulkanError::InvalidGeometry(format!(
                "third region must hold normals or uvs, got {:?}",
                self.surface.kind
            )));
        }
        if self.index.info.component_byte_size != 2 {
            return Err(VulkanError::InvalidGeometry("indices must be 16 bit".to_string()));
        }
        for attribute in [&self.position, &self.surface] {
            if attribute.info.vertex_format().is_none() {
                return Err(VulkanError::InvalidGeometry(format!(
                    "{:?} has unsupported layout {:?}",
                    attribute.kind, attribute.info
                )));
            }
        }
        if self.position.info.count != self.surface.info.count {
            return Err(VulkanError::InvalidGeometry(format!(
                "{} positions but {} {:?} entries",
                self.position.info.count, self.surface.info.count, self.surface.kind
            )));
        }
        if self.index.info.count == 0 {
            return Err(VulkanError::InvalidGeometry("mesh has no indices".to_string()));
        }
        Ok(())
    }

    pub fn index_count(&self) -> u32 {
        self.index.info.count as u32
    }

    pub fn regions(&self) -> [&AttributeData; 3] {
        [&self.index, &self.position, &self.surface]
    }

    /// Vertex bindings and attributes: position at location 0, the surface attribute at location 1.
    pub fn vertex_input_descriptions(
        &self,
    ) -> (
        Vec<vk::VertexInputBindingDescription>,
        Vec<vk::VertexInputAttributeDescription>,
    ) {
        let mut bindings = Vec::with_capacity(2);
        let mut attributes = Vec::with_capacity(2);

        for (location, attribute) in [&self.position, &self.surface].into_iter().enumerate() {
            let location = location as u32;
            bindings.push(vk::VertexInputBindingDescription {
                binding: location,
                stride: attribute.info.byte_stride as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            });
            attributes.push(vk::VertexInputAttributeDescription {
                location,
                binding: location,
                format: attribute
                    .info
                    .vertex_format()
                    .unwrap_or(vk::Format::R32G32B32_SFLOAT),
                offset: 0,
            });
        }

        (bindings, attributes)
    }
}

/// Where each region of a packed geometry buffer starts.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GeometryLayout {
    pub offsets: BTreeMap<AttributeKind, vk::DeviceSize>,
    pub total_size: vk::DeviceSize,
}

impl GeometryLayout {
    pub fn new(geometry: &GeometryData) -> Self {
        let mut offsets = BTreeMap::new();
        let mut total_size = 0;
        for region in geometry.regions() {
            offsets.insert(region.kind, total_size);
            total_size += region.bytes.len() as vk::DeviceSize;
        }
        Self { offsets, total_size }
    }

    pub fn offset(&self, kind: AttributeKind) -> Option<vk::DeviceSize> {
        self.offsets.get(&kind).copied()
    }
}

/// One device local buffer holding every region of a mesh. The buffer itself
/// lives in the resource arena.
pub struct GeometryBuffer {
    pub key: BufferKey,
    pub handle: vk::Buffer,
    pub layout: GeometryLayout,
    pub surface_kind: AttributeKind,
    pub index_count: u32,
}

impl GeometryBuffer {
    pub fn upload(
        transfer: &StagingTransfer,
        resources: &mut ResourceManager,
        name: &str,
        geometry: &GeometryData,
    ) -> Result<Self, VulkanError> {
        geometry.validate()?;
        let layout = GeometryLayout::new(geometry);

        let regions = geometry.regions().map(|region| region.bytes.as_slice());
        let (buffer, offsets) = transfer.upload_to_device_local(
            name,
            &regions,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        debug_assert_eq!(offsets, layout.offsets.values().copied().collect::<Vec<_>>());

        let handle = buffer.handle;
        Ok(Self {
            key: resources.insert_buffer(buffer),
            handle,
            layout,
            surface_kind: geometry.surface.kind,
            index_count: geometry.index_count(),
        })
    }

    pub fn draw(&self) -> GeometryDraw {
        let offset = |kind| self.layout.offset(kind).unwrap_or(0);
        GeometryDraw {
            buffer: self.handle,
            index_offset: offset(AttributeKind::Index),
            vertex_offsets: vec![offset(AttributeKind::Position), offset(self.surface_kind)],
            index_count: self.index_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> GeometryData {
        GeometryData::with_normals(
            &[0, 1, 2],
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0.0, 0.0, 1.0]; 3],
        )
        .unwrap()
    }

    #[test]
    fn offsets_follow_region_order() {
        let geometry = triangle();
        let layout = GeometryLayout::new(&geometry);

        let index_bytes = 3 * 2;
        let position_bytes = 3 * 12;
        let normal_bytes = 3 * 12;
        assert_eq!(layout.offset(AttributeKind::Index), Some(0));
        assert_eq!(layout.offset(AttributeKind::Position), Some(index_bytes));
        assert_eq!(
            layout.offset(AttributeKind::Normal),
            Some(index_bytes + position_bytes)
        );
        assert_eq!(layout.offset(AttributeKind::TexCoord), None);
        assert_eq!(layout.total_size, index_bytes + position_bytes + normal_bytes);
    }

    #[test]
    fn draw_reads_arena_buffer_at_region_offsets() {
        let geometry = triangle();
        let mesh = GeometryBuffer {
            key: BufferKey::default(),
            handle: vk::Buffer::null(),
            layout: GeometryLayout::new(&geometry),
            surface_kind: geometry.surface.kind,
            index_count: geometry.index_count(),
        };

        let draw = mesh.draw();
        assert_eq!(draw.buffer, mesh.handle);
        assert_eq!(draw.index_offset, 0);
        assert_eq!(draw.vertex_offsets, vec![6, 6 + 36]);
        assert_eq!(draw.index_count, 3);
    }

    #[test]
    fn quad_uses_tex_coords() {
        let quad = GeometryData::fullscreen_quad().unwrap();
        let layout = GeometryLayout::new(&quad);
        assert_eq!(quad.index_count(), 6);
        assert_eq!(layout.offset(AttributeKind::TexCoord), Some(12 + 48));
        assert_eq!(layout.total_size, 12 + 48 + 32);
    }

    #[test]
    fn vertex_input_comes_from_strides() {
        let (bindings, attributes) = GeometryData::fullscreen_quad()
            .unwrap()
            .vertex_input_descriptions();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].stride, 12);
        assert_eq!(bindings[1].stride, 8);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[1].location, 1);
    }

    #[test]
    fn mismatched_vertex_counts_are_rejected() {
        let result = GeometryData::with_normals(
            &[0, 1, 2],
            &[[0.0; 3], [1.0; 3], [2.0; 3]],
            &[[0.0, 0.0, 1.0]; 2],
        );
        assert!(matches!(result, Err(VulkanError::InvalidGeometry(_))));
    }

    #[test]
    fn empty_index_list_is_rejected() {
        let result = GeometryData::with_normals(&[], &[[0.0; 3]], &[[0.0; 3]]);
        assert!(result.is_err());
    }
}
