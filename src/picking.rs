//! Ray casting for picking scene objects.
//!
//! - [`Ray`]: origin and direction, with box, sphere, triangle, segment and point tests
//! - [`Raycaster`]: a ray plus the distance range and precisions used for lines and points
//! - [`Intersect`]: one hit, as collected by [`Scene::raycast`](crate::Scene::raycast)
//!
//! # Example
//!
//! ```
//! use gles3d::{Ray, Vec3};
//!
//! let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
//! let t = ray.intersect_sphere(Vec3::ZERO, 1.0).unwrap();
//! assert!((t - 4.0).abs() < 1e-5);
//! ```

use glam::{Mat4, Vec3, Vec4};

use crate::graphic::GraphicId;

/// A ray in 3D space with a normalized direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// The direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Ray through a window pixel, from the near plane into the scene.
    pub fn from_screen(
        screen_x: f32,
        screen_y: f32,
        screen_width: f32,
        screen_height: f32,
        view_matrix: Mat4,
        projection_matrix: Mat4,
    ) -> Self {
        let ndc_x = (2.0 * screen_x / screen_width) - 1.0;
        let ndc_y = 1.0 - (2.0 * screen_y / screen_height);

        // GL clip space: near plane at z = -1.
        let inv_view_proj = (projection_matrix * view_matrix).inverse();
        let near_world = inv_view_proj * Vec4::new(ndc_x, ndc_y, -1.0, 1.0);
        let far_world = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);

        let near_point = near_world.truncate() / near_world.w;
        let far_point = far_world.truncate() / far_world.w;

        Self {
            origin: near_point,
            direction: (far_point - near_point).normalize_or_zero(),
        }
    }

    #[inline]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// The ray in another space. The direction is renormalized, so distances
    /// measured on the result are in the target space's units.
    pub fn transform(&self, m: &Mat4) -> Ray {
        Ray::new(m.transform_point3(self.origin), m.transform_vector3(self.direction))
    }

    /// Distance to the nearest hit with an axis-aligned box, if any.
    pub fn intersect_aabb(&self, min: Vec3, max: Vec3) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for i in 0..3 {
            let origin = self.origin[i];
            let dir = self.direction[i];

            if dir.abs() < f32::EPSILON {
                if origin < min[i] || origin > max[i] {
                    return None;
                }
            } else {
                let inv_dir = 1.0 / dir;
                let mut t1 = (min[i] - origin) * inv_dir;
                let mut t2 = (max[i] - origin) * inv_dir;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        if t_min > 0.0 {
            Some(t_min)
        } else if t_max > 0.0 {
            Some(t_max)
        } else {
            None
        }
    }

    /// Distance to the nearest hit with a sphere, if any.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.dot(oc) - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        let sqrt_disc = discriminant.sqrt();
        let t1 = -b - sqrt_disc;
        let t2 = -b + sqrt_disc;
        if t1 > 0.0 {
            Some(t1)
        } else if t2 > 0.0 {
            Some(t2)
        } else {
            None
        }
    }

    /// Möller–Trumbore ray/triangle test.
    ///
    /// With `cull_back` set, triangles wound clockwise as seen from the ray
    /// origin are ignored.
    pub fn intersect_triangle(&self, a: Vec3, b: Vec3, c: Vec3, cull_back: bool) -> Option<f32> {
        const EPS: f32 = 1e-7;
        let edge1 = b - a;
        let edge2 = c - a;
        let p = self.direction.cross(edge2);
        let det = edge1.dot(p);

        if cull_back {
            if det < EPS {
                return None;
            }
        } else if det.abs() < EPS {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = self.origin - a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(q) * inv_det;
        (t > EPS).then_some(t)
    }

    /// Closest approach between the ray and segment `v0`–`v1`.
    ///
    /// Returns the squared distance, the ray parameter and the closest point
    /// on the segment.
    pub fn distance_sq_to_segment(&self, v0: Vec3, v1: Vec3) -> (f32, f32, Vec3) {
        let seg = v1 - v0;
        let c = seg.dot(seg);
        if c < f32::EPSILON {
            let t = (v0 - self.origin).dot(self.direction).max(0.0);
            return (self.point_at(t).distance_squared(v0), t, v0);
        }

        let w = self.origin - v0;
        let b = self.direction.dot(seg);
        let d = self.direction.dot(w);
        let e = seg.dot(w);
        let denom = c - b * b;

        let mut s = if denom > f32::EPSILON {
            ((e - b * d) / denom).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut t = b * s - d;
        if t < 0.0 {
            t = 0.0;
            s = (e / c).clamp(0.0, 1.0);
        }

        let on_segment = v0 + seg * s;
        (self.point_at(t).distance_squared(on_segment), t, on_segment)
    }

    /// Squared distance from `point` to the ray (clamped at the origin), and the ray parameter.
    pub fn distance_sq_to_point(&self, point: Vec3) -> (f32, f32) {
        let t = (point - self.origin).dot(self.direction).max(0.0);
        (self.point_at(t).distance_squared(point), t)
    }
}

/// A ray plus the parameters used when testing non-solid primitives.
#[derive(Clone, Copy, Debug)]
pub struct Raycaster {
    pub ray: Ray,
    /// Hits closer than this are ignored.
    pub near: f32,
    /// Hits farther than this are ignored.
    pub far: f32,
    /// Maximum distance from a line segment that still counts as a hit.
    pub line_precision: f32,
    /// Maximum distance from a point that still counts as a hit.
    pub point_precision: f32,
}

impl Raycaster {
    pub fn new(ray: Ray) -> Self {
        Self {
            ray,
            near: 0.0,
            far: f32::INFINITY,
            line_precision: 1.0,
            point_precision: 1.0,
        }
    }

    pub fn in_range(&self, distance: f32) -> bool {
        distance >= self.near && distance <= self.far
    }
}

/// One ray hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intersect {
    /// World-space distance from the ray origin.
    pub distance: f32,
    /// World-space hit point.
    pub point: Vec3,
    pub graphic: GraphicId,
    /// Index of the triangle, segment or point that was hit.
    pub index: usize,
}

/// Sorts hits nearest first.
pub fn sort_intersects(hits: &mut [Intersect]) {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_hit_and_back_face() {
        let ray = Ray::new(Vec3::new(0.2, 0.2, 5.0), Vec3::NEG_Z);
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        let t = ray.intersect_triangle(a, b, c, true).unwrap();
        assert!((t - 5.0).abs() < 1e-5);

        // Same triangle wound the other way faces away from the ray.
        assert!(ray.intersect_triangle(a, c, b, true).is_none());
        assert!(ray.intersect_triangle(a, c, b, false).is_some());
    }

    #[test]
    fn triangle_miss_outside_edges() {
        let ray = Ray::new(Vec3::new(1.0, 1.0, 5.0), Vec3::NEG_Z);
        assert!(ray.intersect_triangle(Vec3::ZERO, Vec3::X, Vec3::Y, false).is_none());
    }

    #[test]
    fn segment_closest_approach() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let (dist_sq, t, point) =
            ray.distance_sq_to_segment(Vec3::new(-1.0, 0.5, 0.0), Vec3::new(1.0, 0.5, 0.0));
        assert!((dist_sq - 0.25).abs() < 1e-5);
        assert!((t - 5.0).abs() < 1e-5);
        assert!((point - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-5);
    }

    #[test]
    fn segment_behind_origin_clamps() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let (dist_sq, t, _) = ray.distance_sq_to_segment(Vec3::new(-1.0, 0.0, 3.0), Vec3::new(1.0, 0.0, 3.0));
        assert_eq!(t, 0.0);
        assert!((dist_sq - 9.0).abs() < 1e-4);
    }

    #[test]
    fn point_distance() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let (dist_sq, t) = ray.distance_sq_to_point(Vec3::new(3.0, 2.0, 0.0));
        assert!((dist_sq - 4.0).abs() < 1e-5);
        assert!((t - 3.0).abs() < 1e-5);
    }

    #[test]
    fn aabb_from_inside_returns_exit() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let t = ray.intersect_aabb(Vec3::splat(-1.0), Vec3::splat(1.0)).unwrap();
        assert!((t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn transform_into_local_space() {
        let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::NEG_X);
        let to_local = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)).inverse();
        let local = ray.transform(&to_local);
        assert!(local.origin.length() < 1e-5);
        assert_eq!(local.direction, Vec3::NEG_X);
    }

    #[test]
    fn screen_center_ray_points_forward() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
        let ray = Ray::from_screen(50.0, 50.0, 100.0, 100.0, view, proj);
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-4);
        assert!((ray.origin.z - 4.9).abs() < 1e-3);
    }
}
