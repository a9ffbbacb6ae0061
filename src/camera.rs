use glam::Vec3;
use lumen_vulkan::RayCamera;

/// Circles the ray tracing camera around the origin at a fixed height.
#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    pub radius: f32,
    pub height: f32,
    pub degrees_per_second: f32,
    pub fov_degrees: f32,
    pub light: Vec3,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            radius: 6.0,
            height: 1.0,
            degrees_per_second: 20.0,
            fov_degrees: 45.0,
            light: Vec3::new(4.0, 8.0, 4.0),
        }
    }
}

impl OrbitCamera {
    pub fn at(&self, elapsed_seconds: f32) -> RayCamera {
        let angle = (elapsed_seconds * self.degrees_per_second).to_radians();
        RayCamera {
            position: Vec3::new(
                self.radius * angle.sin(),
                self.height,
                self.radius * angle.cos(),
            ),
            look_at: Vec3::ZERO,
            up: Vec3::Y,
            light: self.light,
            fov_radians: self.fov_degrees.to_radians(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_default_ray_camera() {
        let camera = OrbitCamera::default().at(0.0);
        let expected = RayCamera::default();
        assert!(camera.position.abs_diff_eq(expected.position, 1e-6));
        assert_eq!(camera.look_at, expected.look_at);
        assert_eq!(camera.fov_radians, expected.fov_radians);
    }

    #[test]
    fn keeps_radius_and_height() {
        let orbit = OrbitCamera::default();
        for t in [0.5, 3.0, 17.25] {
            let position = orbit.at(t).position;
            let flat = Vec3::new(position.x, 0.0, position.z);
            assert!((flat.length() - orbit.radius).abs() < 1e-4);
            assert_eq!(position.y, orbit.height);
        }
    }

    #[test]
    fn quarter_turn_after_four_and_a_half_seconds() {
        let position = OrbitCamera::default().at(4.5).position;
        assert!(position.abs_diff_eq(Vec3::new(6.0, 1.0, 0.0), 1e-4));
    }
}
