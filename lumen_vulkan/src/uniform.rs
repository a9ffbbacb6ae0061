use crate::buffer::{Buffer, BufferDescription};
use crate::device::AshDevice;
use crate::VulkanError;
use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use std::marker::PhantomData;
use std::sync::Arc;

pub const ROTATION_DEGREES_PER_SECOND: f32 = 60.0;
pub const CAMERA_EYE: Vec3 = Vec3::new(0.0, 1.0, 10.0);
pub const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;

/// Block layout shared with `vert.spv` and `quad.vert.spv`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GraphicsUniform {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl GraphicsUniform {
    /// Model spun about +Y by the elapsed time, fixed camera looking at the origin.
    pub fn animated(elapsed_seconds: f32, aspect_ratio: f32) -> Self {
        let angle = (elapsed_seconds * ROTATION_DEGREES_PER_SECOND).to_radians();
        Self {
            model: Mat4::from_rotation_y(angle),
            view: Mat4::look_at_rh(CAMERA_EYE, Vec3::ZERO, Vec3::Y),
            proj: vulkan_projection(FIELD_OF_VIEW_DEGREES.to_radians(), aspect_ratio),
        }
    }
}

/// Right handed perspective with zero to one depth and Y pointing down.
pub fn vulkan_projection(fov_y_radians: f32, aspect_ratio: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y_radians, aspect_ratio, NEAR_PLANE, FAR_PLANE);
    proj.y_axis.y = -proj.y_axis.y;
    proj
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCamera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub light: Vec3,
    pub fov_radians: f32,
}

impl Default for RayCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 6.0),
            look_at: Vec3::ZERO,
            up: Vec3::Y,
            light: Vec3::new(4.0, 8.0, 4.0),
            fov_radians: FIELD_OF_VIEW_DEGREES.to_radians(),
        }
    }
}

/// Block layout shared with `raytrace.comp.spv`. Field order is part of the shader contract.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ComputeUniform {
    pub position: Vec4,
    pub look_at: Vec4,
    pub up: Vec4,
    pub light: Vec4,
    pub fov: f32,
    pub aspect_ratio: f32,
    pub primitive_count: u32,
    pub pad: u32,
}

impl ComputeUniform {
    pub fn new(camera: &RayCamera, aspect_ratio: f32, primitive_count: u32) -> Self {
        Self {
            position: camera.position.extend(1.0),
            look_at: camera.look_at.extend(1.0),
            up: camera.up.extend(0.0),
            light: camera.light.extend(1.0),
            fov: camera.fov_radians,
            aspect_ratio,
            primitive_count,
            pad: 0,
        }
    }
}

/// Host visible, coherent buffer holding exactly one `T`.
pub struct UniformBuffer<T: bytemuck::Pod> {
    buffer: Buffer,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    pub fn new(device: Arc<AshDevice>, name: &str, initial: &T) -> Result<Self, VulkanError> {
        let buffer = Buffer::new(
            device,
            name,
            &BufferDescription::new(
                std::mem::size_of::<T>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            ),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mut uniform = Self {
            buffer,
            _marker: PhantomData,
        };
        uniform.write(initial)?;
        Ok(uniform)
    }

    /// Coherent memory, so no flush. Callers keep the GPU off the buffer while writing.
    pub fn write(&mut self, value: &T) -> Result<(), VulkanError> {
        self.buffer.write(bytemuck::bytes_of(value))
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphics_block_is_three_matrices() {
        assert_eq!(std::mem::size_of::<GraphicsUniform>(), 3 * 64);
        let uniform = GraphicsUniform::animated(0.0, 1.0);
        let bytes = bytemuck::bytes_of(&uniform);
        assert_eq!(&bytes[..64], bytemuck::bytes_of(&Mat4::IDENTITY));
    }

    #[test]
    fn compute_block_matches_shader_offsets() {
        assert_eq!(std::mem::size_of::<ComputeUniform>(), 80);
        assert_eq!(std::mem::offset_of!(ComputeUniform, light), 48);
        assert_eq!(std::mem::offset_of!(ComputeUniform, fov), 64);
        assert_eq!(std::mem::offset_of!(ComputeUniform, primitive_count), 72);
    }

    #[test]
    fn projection_flips_y() {
        let flipped = vulkan_projection(1.0, 1.5);
        let standard = Mat4::perspective_rh(1.0, 1.5, NEAR_PLANE, FAR_PLANE);
        assert_eq!(flipped.y_axis.y, -standard.y_axis.y);
        assert_eq!(flipped.x_axis, standard.x_axis);
        assert_eq!(flipped.z_axis, standard.z_axis);
    }

    #[test]
    fn model_turns_sixty_degrees_per_second() {
        let uniform = GraphicsUniform::animated(1.5, 4.0 / 3.0);
        let expected = Mat4::from_rotation_y(90f32.to_radians());
        assert!(uniform.model.abs_diff_eq(expected, 1e-5));

        let point = uniform.view.transform_point3(CAMERA_EYE);
        assert!(point.abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn compute_uniform_packs_camera() {
        let camera = RayCamera::default();
        let uniform = ComputeUniform::new(&camera, 2.0, 7);
        assert_eq!(uniform.position, camera.position.extend(1.0));
        assert_eq!(uniform.up.w, 0.0);
        assert_eq!(uniform.primitive_count, 7);
        assert_eq!(uniform.aspect_ratio, 2.0);
    }
}
