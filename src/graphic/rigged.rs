use glam::Mat4;
use log::error;

use crate::error::{RenderError, Result};
use crate::geometry::BONE_INFLUENCERS;
use crate::gls::GraphicsState;
use crate::scene::{NodeId, NodeTree};
use crate::shaders::ShaderDefines;

/// Bone nodes and their inverse bind matrices.
#[derive(Clone, Debug)]
pub struct Skeleton {
    bones: Vec<NodeId>,
    inverse_bind: Vec<Mat4>,
}

impl Skeleton {
    pub fn new(bones: Vec<NodeId>, inverse_bind: Vec<Mat4>) -> Result<Self> {
        if bones.len() != inverse_bind.len() {
            return Err(RenderError::InvalidGeometry(format!(
                "{} bones but {} inverse bind matrices",
                bones.len(),
                inverse_bind.len()
            )));
        }
        Ok(Self {
            bones,
            inverse_bind,
        })
    }

    pub fn bones(&self) -> &[NodeId] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Writes `offset * bone_world * inverse_bind` for every bone into `out`,
    /// replacing its contents.
    pub fn bone_matrices(&self, nodes: &NodeTree, offset: &Mat4, out: &mut Vec<Mat4>) {
        out.clear();
        out.extend(
            self.bones
                .iter()
                .zip(&self.inverse_bind)
                .map(|(bone, inv_bind)| *offset * nodes.world_matrix(*bone) * *inv_bind),
        );
    }
}

/// Skinning data for a rigged graphic.
#[derive(Debug)]
pub struct RiggedMesh {
    skeleton: Skeleton,
    /// Reused every frame.
    bone_buffer: Vec<Mat4>,
}

impl RiggedMesh {
    pub fn new(skeleton: Skeleton) -> Self {
        let bone_buffer = Vec::with_capacity(skeleton.len());
        Self {
            skeleton,
            bone_buffer,
        }
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub(crate) fn defines(&self) -> ShaderDefines {
        let mut defines = ShaderDefines::new();
        defines
            .set("BONE_INFLUENCERS", BONE_INFLUENCERS)
            .set("TOTAL_BONES", self.skeleton.len().max(1));
        defines
    }

    /// Bone matrices from the last upload, in mesh space.
    pub fn bone_buffer(&self) -> &[Mat4] {
        &self.bone_buffer
    }

    /// Uploads `mBones` relative to the mesh's own world transform.
    pub(crate) fn upload_bones(&mut self, state: &mut GraphicsState, nodes: &NodeTree, world: &Mat4) {
        let inverse = if super::is_invertible(world.determinant()) {
            world.inverse()
        } else {
            error!("skinning: inverting matrix failed, using identity");
            Mat4::IDENTITY
        };
        self.skeleton
            .bone_matrices(nodes, &inverse, &mut self.bone_buffer);
        if self.bone_buffer.is_empty() {
            return;
        }
        if let Some(loc) = state.uniform("mBones") {
            state.set_uniform_mat4_array(loc, &self.bone_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gls::{GlCall, HeadlessContext, Program};
    use glam::Vec3;

    #[test]
    fn mismatched_skeleton_is_rejected() {
        let mut tree = NodeTree::new();
        let bone = tree.create("bone");
        assert!(Skeleton::new(vec![bone], vec![]).is_err());
    }

    #[test]
    fn bone_matrices_are_relative_to_mesh() {
        let mut tree = NodeTree::new();
        let mesh = tree.create("mesh");
        let bone = tree.create("bone");
        tree.set_position(mesh, Vec3::new(1.0, 0.0, 0.0));
        tree.set_position(bone, Vec3::new(1.0, 2.0, 0.0));

        let mut rigged = RiggedMesh::new(Skeleton::new(vec![bone], vec![Mat4::IDENTITY]).unwrap());
        let ctx = HeadlessContext::new();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));
        let vs = "uniform mat4 mBones[TOTAL_BONES];\nvoid main() {}";
        let program = Program::build(&mut gs, "skin", vs, "void main() {}").unwrap();
        gs.use_program(program.id());

        let world = tree.world_matrix(mesh);
        rigged.upload_bones(&mut gs, &tree, &world);
        let capacity = rigged.bone_buffer.capacity();
        rigged.upload_bones(&mut gs, &tree, &world);

        assert_eq!(rigged.bone_buffer().len(), 1);
        let offset = rigged.bone_buffer()[0].w_axis.truncate();
        assert!((offset - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
        assert_eq!(rigged.bone_buffer.capacity(), capacity);
        assert_eq!(
            ctx.count(|c| matches!(c, GlCall::UniformMatrix { values: 16, .. })),
            2
        );
    }

    #[test]
    fn singular_world_falls_back_to_identity() {
        let mut tree = NodeTree::new();
        let bone = tree.create("bone");
        tree.set_position(bone, Vec3::new(0.0, 3.0, 0.0));
        let mut rigged = RiggedMesh::new(Skeleton::new(vec![bone], vec![Mat4::IDENTITY]).unwrap());
        let mut gs = GraphicsState::new(Box::new(HeadlessContext::new()));

        rigged.upload_bones(&mut gs, &tree, &Mat4::from_scale(Vec3::ZERO));
        let offset = rigged.bone_buffer()[0].w_axis.truncate();
        assert_eq!(offset, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn centimetre_scale_mesh_skins_relative_to_itself() {
        let mut tree = NodeTree::new();
        let mesh = tree.create("mesh");
        let bone = tree.create("bone");
        tree.set_scale(mesh, Vec3::splat(0.001));
        tree.set_scale(bone, Vec3::splat(0.001));
        let mut rigged = RiggedMesh::new(Skeleton::new(vec![bone], vec![Mat4::IDENTITY]).unwrap());
        let mut gs = GraphicsState::new(Box::new(HeadlessContext::new()));

        let world = tree.world_matrix(mesh);
        rigged.upload_bones(&mut gs, &tree, &world);
        let m = rigged.bone_buffer()[0];
        assert!((m.x_axis.x - 1.0).abs() < 1e-3);
        assert!((m.z_axis.z - 1.0).abs() < 1e-3);
    }

    #[test]
    fn defines_carry_bone_counts() {
        let mut tree = NodeTree::new();
        let bones = vec![tree.create("a"), tree.create("b")];
        let rigged = RiggedMesh::new(Skeleton::new(bones, vec![Mat4::IDENTITY; 2]).unwrap());
        let defines = rigged.defines();
        assert_eq!(defines.get("BONE_INFLUENCERS"), Some("4"));
        assert_eq!(defines.get("TOTAL_BONES"), Some("2"));
    }
}
