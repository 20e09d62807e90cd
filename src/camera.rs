use glam::{Mat4, Vec3};

use crate::picking::Ray;

/// How the camera maps view space to clip space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in degrees.
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
        /// Values above 1 magnify.
        zoom: f32,
    },
}

/// A camera looking from `position` toward `target`.
///
/// # Example
/// ```
/// use gles3d::{Camera, Vec3};
///
/// let mut camera = Camera::perspective(60.0, 16.0 / 9.0, 0.1, 100.0)
///     .at(Vec3::new(0.0, 2.0, 8.0))
///     .looking_at(Vec3::ZERO);
/// camera.set_aspect(1.0);
/// let view_proj = camera.projection_matrix() * camera.view_matrix();
/// # let _ = view_proj;
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    /// Portrait phone perspective, 5 units back from the origin.
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov: 65.0,
                aspect: 750.0 / 1334.0,
                near: 0.01,
                far: 1000.0,
            },
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective {
                fov: fov_degrees,
                aspect,
                near,
                far,
            },
            ..Default::default()
        }
    }

    pub fn orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                near,
                far,
                zoom: 1.0,
            },
            ..Default::default()
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or(Vec3::NEG_Z)
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or(Vec3::X)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective {
                fov,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov.to_radians(), aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                near,
                far,
                zoom,
            } => {
                let zoom = zoom.max(f32::EPSILON);
                let cx = (left + right) * 0.5;
                let cy = (top + bottom) * 0.5;
                let hw = (right - left) * 0.5 / zoom;
                let hh = (top - bottom) * 0.5 / zoom;
                Mat4::orthographic_rh_gl(cx - hw, cx + hw, cy - hh, cy + hh, near, far)
            }
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Updates the aspect ratio after a resize. Orthographic cameras keep
    /// their height and widen or narrow horizontally.
    pub fn set_aspect(&mut self, new_aspect: f32) {
        if !new_aspect.is_finite() || new_aspect <= 0.0 {
            return;
        }
        match &mut self.projection {
            Projection::Perspective { aspect, .. } => *aspect = new_aspect,
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                ..
            } => {
                let half_w = (*top - *bottom) * new_aspect * 0.5;
                let cx = (*left + *right) * 0.5;
                *left = cx - half_w;
                *right = cx + half_w;
            }
        }
    }

    /// Picking ray through window pixel `(x, y)`, origin top-left.
    pub fn ray_from_screen(&self, x: f32, y: f32, width: f32, height: f32) -> Ray {
        Ray::from_screen(x, y, width, height, self.view_matrix(), self.projection_matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_moves_world_opposite_to_camera() {
        let camera = Camera::new().at(Vec3::new(0.0, 0.0, 5.0)).looking_at(Vec3::ZERO);
        let p = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn set_aspect_updates_perspective() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 10.0);
        camera.set_aspect(2.0);
        assert!(matches!(camera.projection, Projection::Perspective { aspect, .. } if aspect == 2.0));
        camera.set_aspect(0.0);
        assert!(matches!(camera.projection, Projection::Perspective { aspect, .. } if aspect == 2.0));
    }

    #[test]
    fn orthographic_zoom_shrinks_view() {
        let mut camera = Camera::orthographic(-2.0, 2.0, 2.0, -2.0, 0.1, 10.0);
        let edge = Vec3::new(2.0, 0.0, -1.0);
        let before = camera.projection_matrix().project_point3(edge);
        if let Projection::Orthographic { zoom, .. } = &mut camera.projection {
            *zoom = 2.0;
        }
        let after = camera.projection_matrix().project_point3(edge);
        assert!((before.x - 1.0).abs() < 1e-5);
        assert!((after.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn orthographic_set_aspect_keeps_height() {
        let mut camera = Camera::orthographic(-1.0, 1.0, 1.0, -1.0, 0.1, 10.0);
        camera.set_aspect(2.0);
        assert!(matches!(
            camera.projection,
            Projection::Orthographic { left, right, top, .. } if left == -2.0 && right == 2.0 && top == 1.0
        ));
    }

    #[test]
    fn center_ray_follows_forward() {
        let camera = Camera::new().at(Vec3::new(3.0, 0.0, 0.0)).looking_at(Vec3::ZERO);
        let ray = camera.ray_from_screen(375.0, 667.0, 750.0, 1334.0);
        assert!((ray.direction - Vec3::NEG_X).length() < 1e-3);
    }
}
