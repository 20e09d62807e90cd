//! View-frustum culling against bounding spheres.

use glam::{Mat4, Vec3, Vec4};

/// The six clip planes of a view-projection matrix, normals pointing inwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extracts the planes from a GL-convention (`z` in `[-1, 1]`) matrix.
    pub fn from_matrix(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2].map(normalize_plane);
        Self { planes }
    }

    /// `false` only if the sphere lies entirely outside some plane.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(center) + p.w >= -radius)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }

    /// Sphere test with a local-space sphere under `world`.
    pub fn intersects_transformed_sphere(&self, world: &Mat4, center: Vec3, radius: f32) -> bool {
        let scale = world
            .x_axis
            .truncate()
            .length()
            .max(world.y_axis.truncate().length())
            .max(world.z_axis.truncate().length());
        self.intersects_sphere(world.transform_point3(center), radius * scale)
    }
}

fn normalize_plane(p: Vec4) -> Vec4 {
    let len = p.truncate().length();
    if len > f32::EPSILON { p / len } else { p }
}
