//! Drawable objects.
//!
//! A [`Graphic`] binds a scene node to a shared [`Geometry`] and one or more
//! [`MaterialGroup`]s, each drawing a range of the geometry's elements with
//! its own material. The topology and any per-kind data live in
//! [`GraphicKind`]; behaviour common to all kinds goes through the
//! [`Renderable`] trait.

mod raycast;
mod rigged;

pub use rigged::{RiggedMesh, Skeleton};

use std::ops::Range;
use std::sync::Arc;

use glam::{Mat3, Mat4};
use log::warn;

use crate::error::Result;
use crate::geometry::Geometry;
use crate::gls::{GraphicsState, IndexType, Primitive};
use crate::material::Material;
use crate::picking::{Intersect, Raycaster};
use crate::scene::{Handle, NodeId, NodeTree};
use crate::shaders::ShaderDefines;

/// Handle to a graphic owned by a [`Scene`](crate::Scene).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphicId(pub(crate) Handle);

/// Per-frame data shared by every `render_setup` call.
pub struct RenderInfo<'a> {
    pub view: Mat4,
    pub projection: Mat4,
    pub nodes: &'a NodeTree,
}

/// Behaviour shared by every drawable.
pub trait Renderable {
    /// Uploads per-object uniforms to the current program.
    fn render_setup(&mut self, state: &mut GraphicsState, info: &RenderInfo<'_>);

    /// Appends hits against this object's primitives to `hits`.
    fn raycast(&self, id: GraphicId, raycaster: &Raycaster, world: &Mat4, hits: &mut Vec<Intersect>);

    /// Releases GPU resources. Calling it twice is harmless.
    fn dispose(&mut self, state: &mut GraphicsState);
}

/// A material applied to a range of the geometry's elements.
#[derive(Clone, Debug)]
pub struct MaterialGroup {
    pub material: Material,
    pub start: usize,
    /// `None` draws to the end of the geometry.
    pub count: Option<usize>,
}

impl MaterialGroup {
    /// The element range, clipped to `total`.
    pub fn range(&self, total: usize) -> Range<usize> {
        let start = self.start.min(total);
        let end = match self.count {
            Some(count) => start.saturating_add(count).min(total),
            None => total,
        };
        start..end
    }
}

#[derive(Debug)]
pub enum GraphicKind {
    Mesh,
    Lines,
    LineStrip,
    Points,
    Rigged(RiggedMesh),
}

impl GraphicKind {
    pub fn primitive(&self) -> Primitive {
        match self {
            GraphicKind::Mesh | GraphicKind::Rigged(_) => Primitive::Triangles,
            GraphicKind::Lines => Primitive::Lines,
            GraphicKind::LineStrip => Primitive::LineStrip,
            GraphicKind::Points => Primitive::Points,
        }
    }
}

#[derive(Debug)]
pub struct Graphic {
    node: NodeId,
    geometry: Arc<Geometry>,
    kind: GraphicKind,
    groups: Vec<MaterialGroup>,
    defines: ShaderDefines,
    /// Skip frustum culling for this graphic.
    pub frustum_culled: bool,
    disposed: bool,
}

impl Graphic {
    fn new(node: NodeId, geometry: Arc<Geometry>, kind: GraphicKind, material: Material) -> Self {
        geometry.acquire();
        let defines = match &kind {
            GraphicKind::Rigged(rigged) => rigged.defines(),
            _ => ShaderDefines::new(),
        };
        Self {
            node,
            geometry,
            kind,
            groups: vec![MaterialGroup {
                material,
                start: 0,
                count: None,
            }],
            defines,
            frustum_culled: true,
            disposed: false,
        }
    }

    pub fn mesh(node: NodeId, geometry: Arc<Geometry>, material: Material) -> Self {
        Self::new(node, geometry, GraphicKind::Mesh, material)
    }

    /// Independent segments, one per pair of vertices.
    pub fn lines(node: NodeId, geometry: Arc<Geometry>, material: Material) -> Self {
        Self::new(node, geometry, GraphicKind::Lines, material)
    }

    pub fn line_strip(node: NodeId, geometry: Arc<Geometry>, material: Material) -> Self {
        Self::new(node, geometry, GraphicKind::LineStrip, material)
    }

    pub fn points(node: NodeId, geometry: Arc<Geometry>, material: Material) -> Self {
        Self::new(node, geometry, GraphicKind::Points, material)
    }

    /// Skinned mesh. The geometry should carry skin attributes.
    pub fn rigged(node: NodeId, geometry: Arc<Geometry>, material: Material, skeleton: Skeleton) -> Self {
        if geometry.skin().is_none() {
            warn!("rigged graphic created on geometry without skin attributes");
        }
        Self::new(node, geometry, GraphicKind::Rigged(RiggedMesh::new(skeleton)), material)
    }

    /// Replaces the groups with a single material covering everything.
    pub fn set_material(&mut self, material: Material) {
        self.groups.clear();
        self.groups.push(MaterialGroup {
            material,
            start: 0,
            count: None,
        });
    }

    /// Adds a material for `count` elements starting at `start`.
    pub fn add_group(&mut self, material: Material, start: usize, count: usize) {
        self.groups.push(MaterialGroup {
            material,
            start,
            count: Some(count),
        });
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    pub fn kind(&self) -> &GraphicKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut GraphicKind {
        &mut self.kind
    }

    pub fn primitive(&self) -> Primitive {
        self.kind.primitive()
    }

    pub fn groups(&self) -> &[MaterialGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [MaterialGroup] {
        &mut self.groups
    }

    pub fn defines(&self) -> &ShaderDefines {
        &self.defines
    }

    pub fn defines_mut(&mut self) -> &mut ShaderDefines {
        &mut self.defines
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Issues the draw call for one material group. The geometry must be bound.
    pub fn draw_group(&self, state: &mut GraphicsState, group: usize) {
        let Some(group) = self.groups.get(group) else {
            return;
        };
        let range = group.range(self.geometry.draw_count());
        if range.is_empty() {
            return;
        }
        let mode = self.primitive();
        let count = range.len() as i32;
        if self.geometry.is_indexed() {
            let offset = (range.start * IndexType::U32.size()) as i32;
            state.draw_elements(mode, count, IndexType::U32, offset);
        } else {
            state.draw_arrays(mode, range.start as i32, count);
        }
    }

    /// Binds the geometry, uploading it if needed.
    pub fn bind_geometry(&self, state: &mut GraphicsState) -> Result<()> {
        self.geometry.bind(state)
    }
}

impl Renderable for Graphic {
    fn render_setup(&mut self, state: &mut GraphicsState, info: &RenderInfo<'_>) {
        let world = info.nodes.world_matrix(self.node);
        let mv = info.view * world;
        let mvp = info.projection * mv;

        if let Some(loc) = state.uniform("MVP") {
            state.set_uniform_mat4(loc, &mvp);
        }
        if let Some(loc) = state.uniform("MV") {
            state.set_uniform_mat4(loc, &mv);
        }
        if let Some(loc) = state.uniform("MNormal") {
            state.set_uniform_mat3(loc, &normal_matrix(&mv));
        }
        if let GraphicKind::Rigged(rigged) = &mut self.kind {
            rigged.upload_bones(state, info.nodes, &world);
        }
    }

    fn raycast(&self, id: GraphicId, raycaster: &Raycaster, world: &Mat4, hits: &mut Vec<Intersect>) {
        raycast::raycast_graphic(self, id, raycaster, world, hits);
    }

    fn dispose(&mut self, state: &mut GraphicsState) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.geometry.release(state);
    }
}

/// Only an exactly singular (or non-finite) matrix is refused; small scales
/// give tiny but valid determinants.
pub(crate) fn is_invertible(det: f32) -> bool {
    det != 0.0 && det.is_finite()
}

/// Inverse-transpose of the upper 3×3, for transforming normals.
fn normal_matrix(mv: &Mat4) -> Mat3 {
    let m = Mat3::from_mat4(*mv);
    if !is_invertible(m.determinant()) {
        return Mat3::IDENTITY;
    }
    m.inverse().transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::gls::{GlCall, HeadlessContext, Program};
    use glam::Vec3;

    const VS: &str = "uniform mat4 MVP;\nuniform mat4 MV;\nuniform mat3 MNormal;\nvoid main() {}";
    const FS: &str = "uniform vec4 MatColor;\nvoid main() {}";

    fn state_with_program() -> (HeadlessContext, GraphicsState) {
        let ctx = HeadlessContext::new();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));
        let program = Program::build(&mut gs, "test", VS, FS).unwrap();
        gs.use_program(program.id());
        ctx.clear_calls();
        (ctx, gs)
    }

    #[test]
    fn shared_geometry_is_released_by_last_owner() {
        let (_ctx, mut gs) = state_with_program();
        let mut tree = NodeTree::new();
        let geom = Arc::new(Geometry::cube(1.0));
        let mut a = Graphic::mesh(tree.create("a"), geom.clone(), Material::basic(Color::RED));
        let mut b = Graphic::mesh(tree.create("b"), geom.clone(), Material::basic(Color::RED));
        geom.bind(&mut gs).unwrap();
        assert_eq!(geom.owners(), 2);

        a.dispose(&mut gs);
        a.dispose(&mut gs);
        assert_eq!(geom.owners(), 1);
        assert!(geom.is_uploaded());
        assert_eq!(gs.stats().buffers, 2);

        b.dispose(&mut gs);
        assert!(!geom.is_uploaded());
        assert_eq!(gs.stats().buffers, 0);
    }

    #[test]
    fn render_setup_uploads_transforms() {
        let (ctx, mut gs) = state_with_program();
        let mut tree = NodeTree::new();
        let node = tree.create("mesh");
        tree.set_position(node, Vec3::new(0.0, 0.0, -5.0));
        let mut g = Graphic::mesh(node, Arc::new(Geometry::cube(1.0)), Material::basic(Color::WHITE));

        let info = RenderInfo {
            view: Mat4::IDENTITY,
            projection: Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0),
            nodes: &tree,
        };
        g.render_setup(&mut gs, &info);
        assert_eq!(ctx.count(|c| matches!(c, GlCall::UniformMatrix { .. })), 3);
        assert_eq!(gs.stats().uniform_sets, 3);
    }

    #[test]
    fn groups_draw_their_ranges() {
        let (ctx, mut gs) = state_with_program();
        let mut tree = NodeTree::new();
        let geom = Arc::new(Geometry::cube(1.0));
        let mut g = Graphic::mesh(tree.create("m"), geom.clone(), Material::basic(Color::RED));
        g.groups_mut()[0].count = Some(12);
        g.add_group(Material::basic(Color::BLUE), 12, 100);

        g.bind_geometry(&mut gs).unwrap();
        ctx.clear_calls();
        g.draw_group(&mut gs, 0);
        g.draw_group(&mut gs, 1);
        g.draw_group(&mut gs, 7);

        let draws: Vec<_> = ctx.calls().into_iter().filter(GlCall::is_draw).collect();
        assert_eq!(
            draws,
            vec![
                GlCall::DrawElements {
                    mode: Primitive::Triangles,
                    count: 12,
                    index_type: IndexType::U32,
                    offset: 0
                },
                GlCall::DrawElements {
                    mode: Primitive::Triangles,
                    count: 24,
                    index_type: IndexType::U32,
                    offset: 48
                },
            ]
        );
    }

    #[test]
    fn non_indexed_lines_draw_arrays() {
        let (ctx, mut gs) = state_with_program();
        let mut tree = NodeTree::new();
        let geom = Arc::new(Geometry::line_strip(&[Vec3::ZERO, Vec3::X, Vec3::Y]));
        let g = Graphic::line_strip(tree.create("l"), geom, Material::basic(Color::GREEN));
        g.bind_geometry(&mut gs).unwrap();
        g.draw_group(&mut gs, 0);
        assert_eq!(
            ctx.count(|c| *c == GlCall::DrawArrays { mode: Primitive::LineStrip, first: 0, count: 3 }),
            1
        );
    }

    #[test]
    fn singular_normal_matrix_falls_back_to_identity() {
        assert_eq!(normal_matrix(&Mat4::from_scale(Vec3::ZERO)), Mat3::IDENTITY);
    }

    #[test]
    fn tiny_scale_still_inverts_normals() {
        let n = normal_matrix(&Mat4::from_scale(Vec3::new(0.001, 0.002, 0.001)));
        assert!((n.x_axis.x - 1000.0).abs() < 0.5);
        assert!((n.y_axis.y - 500.0).abs() < 0.5);
        assert!(!is_invertible(f32::NAN));
        assert!(is_invertible(1e-9));
    }
}
