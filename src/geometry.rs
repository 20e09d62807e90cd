//! Vertex data, built-in primitives and shared GPU buffers.
//!
//! A [`Geometry`] keeps its vertex data on the CPU and uploads it lazily the
//! first time it is bound, and again whenever the graphics context has been
//! replaced. It is meant to be shared between graphics through an
//! `Arc<Geometry>`: every owner calls [`Geometry::acquire`] once and
//! [`Geometry::release`] when done, and the GPU buffers are deleted only
//! when the last owner lets go.
//!
//! # Vertex layout
//!
//! | Attribute       | Components | Offset | Location |
//! |-----------------|------------|--------|----------|
//! | position        | 3 × f32    | 0      | 0        |
//! | normal          | 3 × f32    | 12     | 1        |
//! | uv              | 2 × f32    | 24     | 2        |
//! | bone indices    | 4 × f32    | 0      | 3 (skin buffer) |
//! | bone weights    | 4 × f32    | 16     | 4 (skin buffer) |

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{RenderError, Result};
use crate::gls::{BufferId, BufferTarget, BufferUsage, GraphicsState, VertexArrayId};

/// Bones that may influence a single vertex.
pub const BONE_INFLUENCERS: usize = 4;

/// A vertex with position, normal and texture coordinates (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: i32 = std::mem::size_of::<Vertex>() as i32;

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    /// Position only; used by line and point geometry.
    pub fn at(p: Vec3) -> Self {
        Self::new(p.into(), [0.0, 0.0, 1.0], [0.0, 0.0])
    }

    pub fn pos(&self) -> Vec3 {
        Vec3::from(self.position)
    }
}

/// Per-vertex skinning data, stored in its own buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinVertex {
    /// Bone indices, as floats for GLSL ES attribute compatibility.
    pub bones: [f32; BONE_INFLUENCERS],
    pub weights: [f32; BONE_INFLUENCERS],
}

impl SkinVertex {
    pub const STRIDE: i32 = std::mem::size_of::<SkinVertex>() as i32;
}

#[derive(Debug)]
struct GpuBuffers {
    generation: u64,
    vao: VertexArrayId,
    vbo: BufferId,
    skin: Option<BufferId>,
    ibo: Option<BufferId>,
}

/// Vertex data plus lazily uploaded GPU buffers.
#[derive(Debug)]
pub struct Geometry {
    vertices: Vec<Vertex>,
    indices: Option<Vec<u32>>,
    skin: Option<Vec<SkinVertex>>,
    bounds: (Vec3, Vec3),
    sphere: (Vec3, f32),
    owners: AtomicUsize,
    gpu: Mutex<Option<GpuBuffers>>,
}

impl Geometry {
    /// Indexed geometry. An empty index list means non-indexed drawing.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self> {
        if let Some(bad) = indices.iter().find(|i| **i as usize >= vertices.len()) {
            return Err(RenderError::InvalidGeometry(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }
        let indices = (!indices.is_empty()).then_some(indices);
        Ok(Self::build(vertices, indices))
    }

    /// Geometry drawn straight from the vertex list.
    pub fn non_indexed(vertices: Vec<Vertex>) -> Self {
        Self::build(vertices, None)
    }

    fn build(vertices: Vec<Vertex>, indices: Option<Vec<u32>>) -> Self {
        let bounds = compute_bounds(&vertices);
        let center = (bounds.0 + bounds.1) * 0.5;
        let radius = vertices
            .iter()
            .map(|v| v.pos().distance(center))
            .fold(0.0f32, f32::max);
        Self {
            vertices,
            indices,
            skin: None,
            bounds,
            sphere: (center, radius),
            owners: AtomicUsize::new(0),
            gpu: Mutex::new(None),
        }
    }

    /// Attaches skinning attributes, one entry per vertex.
    pub fn with_skin(mut self, skin: Vec<SkinVertex>) -> Result<Self> {
        if skin.len() != self.vertices.len() {
            return Err(RenderError::InvalidGeometry(format!(
                "{} skin entries for {} vertices",
                skin.len(),
                self.vertices.len()
            )));
        }
        self.skin = Some(skin);
        Ok(self)
    }

    /// Axis-aligned cube centered at the origin.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // Each face has its own vertices for correct normals.
        #[rustfmt::skip]
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([ 0.0,  0.0,  1.0], [[-h, -h,  h], [ h, -h,  h], [ h,  h,  h], [-h,  h,  h]]),
            ([ 0.0,  0.0, -1.0], [[ h, -h, -h], [-h, -h, -h], [-h,  h, -h], [ h,  h, -h]]),
            ([ 0.0,  1.0,  0.0], [[-h,  h,  h], [ h,  h,  h], [ h,  h, -h], [-h,  h, -h]]),
            ([ 0.0, -1.0,  0.0], [[-h, -h, -h], [ h, -h, -h], [ h, -h,  h], [-h, -h,  h]]),
            ([ 1.0,  0.0,  0.0], [[ h, -h,  h], [ h, -h, -h], [ h,  h, -h], [ h,  h,  h]]),
            ([-1.0,  0.0,  0.0], [[-h, -h, -h], [-h, -h,  h], [-h,  h,  h], [-h,  h, -h]]),
        ];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, corners) in faces {
            let base = vertices.len() as u32;
            for (corner, uv) in corners.into_iter().zip(uvs) {
                vertices.push(Vertex::new(corner, normal, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        Self::build(vertices, Some(indices))
    }

    /// UV sphere centered at the origin.
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();
                vertices.push(Vertex::new(
                    [x * radius, y * radius, z * radius],
                    [x, y, z],
                    [seg as f32 / segments as f32, ring as f32 / rings as f32],
                ));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;
                indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        Self::build(vertices, Some(indices))
    }

    /// Horizontal plane on XZ facing +Y.
    pub fn plane(width: f32, depth: f32) -> Self {
        let (hw, hd) = (width * 0.5, depth * 0.5);
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-hw, 0.0, hd], up, [0.0, 0.0]),
            Vertex::new([hw, 0.0, hd], up, [1.0, 0.0]),
            Vertex::new([hw, 0.0, -hd], up, [1.0, 1.0]),
            Vertex::new([-hw, 0.0, -hd], up, [0.0, 1.0]),
        ];
        Self::build(vertices, Some(vec![0, 1, 2, 2, 3, 0]))
    }

    /// Unit quad spanning `[0, 1]` on X and Y, used by overlay panels.
    pub fn unit_quad() -> Self {
        let n = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([0.0, 0.0, 0.0], n, [0.0, 0.0]),
            Vertex::new([1.0, 0.0, 0.0], n, [1.0, 0.0]),
            Vertex::new([1.0, 1.0, 0.0], n, [1.0, 1.0]),
            Vertex::new([0.0, 1.0, 0.0], n, [0.0, 1.0]),
        ];
        Self::build(vertices, Some(vec![0, 2, 1, 0, 3, 2]))
    }

    /// Point cloud.
    pub fn points(points: &[Vec3]) -> Self {
        Self::from_points(points)
    }

    /// Independent segments, one per pair of points. A trailing odd point is dropped.
    pub fn lines(points: &[Vec3]) -> Self {
        Self::from_points(&points[..points.len() & !1])
    }

    /// Connected polyline through every point.
    pub fn line_strip(points: &[Vec3]) -> Self {
        Self::from_points(points)
    }

    fn from_points(points: &[Vec3]) -> Self {
        Self::non_indexed(points.iter().copied().map(Vertex::at).collect())
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    pub fn skin(&self) -> Option<&[SkinVertex]> {
        self.skin.as_deref()
    }

    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Element count of a full draw: indices when indexed, vertices otherwise.
    pub fn draw_count(&self) -> usize {
        self.indices
            .as_ref()
            .map_or(self.vertices.len(), Vec::len)
    }

    /// `(min, max)` corners in local space.
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        self.bounds
    }

    /// `(center, radius)` in local space.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        self.sphere
    }

    /// Recomputes smooth vertex normals from the triangle list.
    ///
    /// Only valid before the first upload; data already on the GPU is not refreshed.
    pub fn recalculate_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = [0.0; 3];
        }
        let triangles: Vec<[usize; 3]> = match &self.indices {
            Some(idx) => idx
                .chunks_exact(3)
                .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
                .collect(),
            None => (0..self.vertices.len() / 3)
                .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
                .collect(),
        };
        for [i0, i1, i2] in triangles {
            let p0 = self.vertices[i0].pos();
            let face = (self.vertices[i1].pos() - p0).cross(self.vertices[i2].pos() - p0);
            for i in [i0, i1, i2] {
                let n = Vec3::from(self.vertices[i].normal) + face;
                self.vertices[i].normal = n.into();
            }
        }
        for v in &mut self.vertices {
            v.normal = Vec3::from(v.normal).normalize_or_zero().into();
        }
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    /// Registers one more owner.
    pub fn acquire(&self) -> usize {
        self.owners.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn owners(&self) -> usize {
        self.owners.load(Ordering::Acquire)
    }

    /// Drops one owner. The last owner deletes the GPU buffers; returns `true` then.
    pub fn release(&self, state: &mut GraphicsState) -> bool {
        let previous = self
            .owners
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => {
                self.delete_buffers(state);
                true
            }
            Ok(_) => false,
            Err(_) => {
                warn!("geometry released with no owners");
                false
            }
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.lock().is_some()
    }

    fn delete_buffers(&self, state: &mut GraphicsState) {
        let Some(gpu) = self.gpu.lock().take() else {
            return;
        };
        if gpu.generation != state.generation() {
            // Objects died with the previous context.
            return;
        }
        state.delete_vertex_array(gpu.vao);
        state.delete_buffer(gpu.vbo);
        if let Some(skin) = gpu.skin {
            state.delete_buffer(skin);
        }
        if let Some(ibo) = gpu.ibo {
            state.delete_buffer(ibo);
        }
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Binds the vertex array, uploading first if needed.
    pub fn bind(&self, state: &mut GraphicsState) -> Result<()> {
        let mut gpu = self.gpu.lock();
        let stale = gpu
            .as_ref()
            .is_none_or(|g| g.generation != state.generation());
        if stale {
            *gpu = Some(self.upload(state)?);
        }
        if let Some(g) = gpu.as_ref() {
            state.bind_vertex_array(Some(g.vao));
        }
        Ok(())
    }

    fn upload(&self, state: &mut GraphicsState) -> Result<GpuBuffers> {
        let vao = state.create_vertex_array()?;
        let mut buffers = Vec::with_capacity(3);
        let needed = 1 + usize::from(self.skin.is_some()) + usize::from(self.indices.is_some());
        for _ in 0..needed {
            match state.create_buffer() {
                Ok(b) => buffers.push(b),
                Err(e) => {
                    for b in buffers {
                        state.delete_buffer(b);
                    }
                    state.delete_vertex_array(vao);
                    return Err(e);
                }
            }
        }
        let mut buffers = buffers.into_iter();
        let mut next = || buffers.next().unwrap_or(BufferId::NONE);

        state.bind_vertex_array(Some(vao));

        let vbo = next();
        state.bind_buffer(BufferTarget::Array, Some(vbo));
        state.buffer_data(
            BufferTarget::Array,
            bytemuck::cast_slice(&self.vertices),
            BufferUsage::StaticDraw,
        );
        for (loc, size, offset) in [(0, 3, 0), (1, 3, 12), (2, 2, 24)] {
            state.enable_vertex_attrib_array(loc);
            state.vertex_attrib_pointer_f32(loc, size, Vertex::STRIDE, offset);
        }

        let skin = self.skin.as_ref().map(|skin| {
            let id = next();
            state.bind_buffer(BufferTarget::Array, Some(id));
            state.buffer_data(
                BufferTarget::Array,
                bytemuck::cast_slice(skin),
                BufferUsage::StaticDraw,
            );
            let width = BONE_INFLUENCERS as i32;
            for (loc, offset) in [(3, 0), (4, width * 4)] {
                state.enable_vertex_attrib_array(loc);
                state.vertex_attrib_pointer_f32(loc, width, SkinVertex::STRIDE, offset);
            }
            id
        });

        let ibo = self.indices.as_ref().map(|indices| {
            let id = next();
            state.bind_buffer(BufferTarget::ElementArray, Some(id));
            state.buffer_data(
                BufferTarget::ElementArray,
                bytemuck::cast_slice(indices),
                BufferUsage::StaticDraw,
            );
            id
        });

        debug!(
            "uploaded geometry: {} vertices, {} indices",
            self.vertices.len(),
            self.indices.as_ref().map_or(0, Vec::len)
        );
        Ok(GpuBuffers {
            generation: state.generation(),
            vao,
            vbo,
            skin,
            ibo,
        })
    }
}

fn compute_bounds(vertices: &[Vertex]) -> (Vec3, Vec3) {
    if vertices.is_empty() {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    vertices.iter().fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(min, max), v| (min.min(v.pos()), max.max(v.pos())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gls::{GlCall, HeadlessContext};

    fn state() -> (HeadlessContext, GraphicsState) {
        let ctx = HeadlessContext::new();
        let gs = GraphicsState::new(Box::new(ctx.clone()));
        (ctx, gs)
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let geom = Geometry::new(
            vec![
                Vertex::at(Vec3::ZERO),
                Vertex::at(Vec3::new(1.0, 2.0, 3.0)),
                Vertex::at(Vec3::new(-1.0, -1.0, -1.0)),
            ],
            vec![0, 1, 2],
        )
        .unwrap();
        let (min, max) = geom.bounding_box();
        assert_eq!(min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
        let (center, radius) = geom.bounding_sphere();
        assert_eq!(center, Vec3::new(0.0, 0.5, 1.0));
        assert!(radius > 0.0);
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let err = Geometry::new(vec![Vertex::at(Vec3::ZERO)], vec![0, 1, 0]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidGeometry(_)));
    }

    #[test]
    fn skin_must_match_vertex_count() {
        let geom = Geometry::line_strip(&[Vec3::ZERO, Vec3::X]);
        assert!(geom.with_skin(vec![SkinVertex::default()]).is_err());
    }

    #[test]
    fn lines_drop_unpaired_point() {
        let geom = Geometry::lines(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        assert_eq!(geom.draw_count(), 2);
        assert!(!geom.is_indexed());
    }

    #[test]
    fn primitives_have_expected_sizes() {
        assert_eq!(Geometry::cube(1.0).draw_count(), 36);
        assert_eq!(Geometry::plane(2.0, 2.0).vertices().len(), 4);
        let sphere = Geometry::sphere(0.5, 16, 8);
        assert_eq!(sphere.vertices().len(), 17 * 9);
        assert!((sphere.bounding_sphere().1 - 0.5).abs() < 1e-4);
    }

    #[test]
    fn upload_is_lazy_and_happens_once() {
        let (ctx, mut gs) = state();
        let geom = Geometry::cube(1.0);
        assert!(!geom.is_uploaded());

        geom.bind(&mut gs).unwrap();
        geom.bind(&mut gs).unwrap();
        assert_eq!(ctx.count(|c| matches!(c, GlCall::CreateVertexArray(_))), 1);
        assert_eq!(gs.stats().buffers, 2);
        assert_eq!(gs.stats().vaos, 1);
    }

    #[test]
    fn last_owner_releases_buffers() {
        let (_ctx, mut gs) = state();
        let geom = std::sync::Arc::new(Geometry::cube(1.0));
        geom.acquire();
        geom.acquire();
        geom.bind(&mut gs).unwrap();

        assert!(!geom.release(&mut gs));
        assert!(geom.is_uploaded());
        assert_eq!(gs.stats().buffers, 2);

        assert!(geom.release(&mut gs));
        assert!(!geom.is_uploaded());
        assert_eq!(gs.stats().buffers, 0);
        assert_eq!(gs.stats().vaos, 0);

        assert!(!geom.release(&mut gs));
        assert_eq!(geom.owners(), 0);
    }

    #[test]
    fn context_change_triggers_reupload() {
        let (_ctx, mut gs) = state();
        let geom = Geometry::plane(1.0, 1.0);
        geom.bind(&mut gs).unwrap();

        let next = HeadlessContext::new();
        gs.set_context(Box::new(next.clone()));
        geom.bind(&mut gs).unwrap();
        assert_eq!(next.count(|c| matches!(c, GlCall::CreateVertexArray(_))), 1);
    }

    #[test]
    fn recalculated_normals_face_outwards() {
        let mut geom = Geometry::plane(1.0, 1.0);
        geom.recalculate_normals();
        for v in geom.vertices() {
            assert!((Vec3::from(v.normal) - Vec3::Y).length() < 1e-5);
        }
    }
}
