use glam::{Mat4, Vec3};

use super::{Graphic, GraphicId};
use crate::gls::Primitive;
use crate::material::Side;
use crate::picking::{Intersect, Raycaster};

/// Tests the ray against a graphic's primitives.
///
/// Work happens in the graphic's local space; hit points and distances are
/// converted back to world space before they are recorded.
pub(super) fn raycast_graphic(
    graphic: &Graphic,
    id: GraphicId,
    raycaster: &Raycaster,
    world: &Mat4,
    hits: &mut Vec<Intersect>,
) {
    let geometry = graphic.geometry();
    let primitive = graphic.primitive();

    let scale = world
        .x_axis
        .truncate()
        .length()
        .max(world.y_axis.truncate().length())
        .max(world.z_axis.truncate().length());
    if scale < f32::EPSILON {
        return;
    }

    let slack = match primitive {
        Primitive::Lines | Primitive::LineStrip | Primitive::LineLoop => raycaster.line_precision,
        Primitive::Points => raycaster.point_precision,
        _ => 0.0,
    };
    let (center, radius) = geometry.bounding_sphere();
    let sphere = radius * scale + slack;
    if raycaster
        .ray
        .intersect_sphere(world.transform_point3(center), sphere)
        .is_none()
        && raycaster.ray.origin.distance(world.transform_point3(center)) > sphere
    {
        return;
    }

    let local = raycaster.ray.transform(&world.inverse());
    let vertices = geometry.vertices();
    let indices = geometry.indices();
    let vertex = |k: usize| -> Vec3 {
        let i = indices.map_or(k, |ix| ix[k] as usize);
        vertices[i].pos()
    };

    let mut record = |local_point: Vec3, index: usize| {
        let point = world.transform_point3(local_point);
        let distance = raycaster.ray.origin.distance(point);
        if raycaster.in_range(distance) {
            hits.push(Intersect {
                distance,
                point,
                graphic: id,
                index,
            });
        }
    };

    let total = geometry.draw_count();
    for group in graphic.groups() {
        let range = group.range(total);
        match primitive {
            Primitive::Triangles => {
                let side = group.material.side;
                let mut k = range.start;
                while k + 2 < range.end {
                    let (a, b, c) = (vertex(k), vertex(k + 1), vertex(k + 2));
                    let t = match side {
                        Side::Front => local.intersect_triangle(a, b, c, true),
                        Side::Back => local.intersect_triangle(a, c, b, true),
                        Side::Double => local.intersect_triangle(a, b, c, false),
                    };
                    if let Some(t) = t {
                        record(local.point_at(t), k / 3);
                    }
                    k += 3;
                }
            }
            Primitive::Lines | Primitive::LineStrip => {
                let step = if primitive == Primitive::Lines { 2 } else { 1 };
                let precision = raycaster.line_precision / scale;
                let mut k = range.start;
                while k + 1 < range.end {
                    let (dist_sq, _, on_segment) = local.distance_sq_to_segment(vertex(k), vertex(k + 1));
                    if dist_sq <= precision * precision {
                        record(on_segment, k / step);
                    }
                    k += step;
                }
            }
            Primitive::Points => {
                let precision = raycaster.point_precision / scale;
                for k in range {
                    let p = vertex(k);
                    let (dist_sq, _) = local.distance_sq_to_point(p);
                    if dist_sq <= precision * precision {
                        record(p, k);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::Renderable;
    use super::*;
    use crate::color::Color;
    use crate::geometry::Geometry;
    use crate::material::Material;
    use crate::picking::Ray;
    use crate::scene::{Arena, NodeTree};

    fn graphic_id() -> GraphicId {
        let mut arena = Arena::new();
        GraphicId(arena.insert(()))
    }

    fn cast(graphic: &Graphic, world: Mat4, raycaster: &Raycaster) -> Vec<Intersect> {
        let mut hits = Vec::new();
        graphic.raycast(graphic_id(), raycaster, &world, &mut hits);
        hits
    }

    #[test]
    fn cube_front_face_hit_in_world_space() {
        let mut tree = NodeTree::new();
        let g = Graphic::mesh(tree.create("cube"), Arc::new(Geometry::cube(2.0)), Material::basic(Color::RED));
        let world = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        // Off-center so the ray does not graze the diagonal shared by two triangles.
        let rc = Raycaster::new(Ray::new(Vec3::new(0.3, 0.2, 0.0), Vec3::NEG_Z));

        let hits = cast(&g, world, &rc);
        // Back faces are culled: only the near face is hit.
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance - 9.0).abs() < 1e-4);
        assert!((hits[0].point - Vec3::new(0.3, 0.2, -9.0)).length() < 1e-4);
    }

    #[test]
    fn double_sided_hits_both_faces() {
        let mut tree = NodeTree::new();
        let mat = Material::basic(Color::RED).side(Side::Double);
        let g = Graphic::mesh(tree.create("cube"), Arc::new(Geometry::cube(2.0)), mat);
        let rc = Raycaster::new(Ray::new(Vec3::new(0.3, 0.2, 10.0), Vec3::NEG_Z));
        assert_eq!(cast(&g, Mat4::IDENTITY, &rc).len(), 2);
    }

    #[test]
    fn far_limit_filters_hits() {
        let mut tree = NodeTree::new();
        let g = Graphic::mesh(tree.create("cube"), Arc::new(Geometry::cube(2.0)), Material::basic(Color::RED));
        let mut rc = Raycaster::new(Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z));
        rc.far = 5.0;
        assert!(cast(&g, Mat4::IDENTITY, &rc).is_empty());
    }

    #[test]
    fn line_strip_hit_within_precision() {
        let mut tree = NodeTree::new();
        let points = [Vec3::new(-1.0, 0.1, 0.0), Vec3::new(1.0, 0.1, 0.0), Vec3::new(1.0, 5.0, 0.0)];
        let g = Graphic::line_strip(tree.create("l"), Arc::new(Geometry::line_strip(&points)), Material::basic(Color::RED));
        let mut rc = Raycaster::new(Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z));
        rc.line_precision = 0.2;

        let hits = cast(&g, Mat4::IDENTITY, &rc);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);

        rc.line_precision = 0.05;
        assert!(cast(&g, Mat4::IDENTITY, &rc).is_empty());
    }

    #[test]
    fn points_hit_nearest_vertex() {
        let mut tree = NodeTree::new();
        let points = [Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.0, 0.05, -2.0)];
        let g = Graphic::points(tree.create("p"), Arc::new(Geometry::points(&points)), Material::point(Color::RED, 3.0));
        let mut rc = Raycaster::new(Ray::new(Vec3::ZERO, Vec3::NEG_Z));
        rc.point_precision = 0.1;

        let hits = cast(&g, Mat4::IDENTITY, &rc);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 1);
    }
}
