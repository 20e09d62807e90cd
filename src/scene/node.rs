//! The scene graph hierarchy.
//!
//! Nodes live in a [`NodeTree`] arena and are addressed by [`NodeId`]. Every
//! node has at most one parent, a local [`Transform`] and a cached world
//! matrix (`world = parent_world * local`).
//!
//! Mutating a transform marks the node and its whole subtree dirty right
//! away; world matrices are recomputed only when read. Because marking is
//! top-down and recomputation resolves ancestors first, a clean node always
//! has clean ancestors, and a dirty node always has dirty descendants.
//!
//! ```
//! use gles3d::{NodeTree, Vec3};
//!
//! let mut tree = NodeTree::new();
//! let a = tree.create("a");
//! let b = tree.create("b");
//! tree.add_child(a, b).unwrap();
//!
//! tree.set_position(a, Vec3::new(1.0, 0.0, 0.0));
//! tree.set_position(b, Vec3::new(0.0, 2.0, 0.0));
//! assert_eq!(tree.world_position(b), Vec3::new(1.0, 2.0, 0.0));
//! ```

use std::cell::Cell;
use std::collections::HashSet;

use glam::{Mat4, Quat, Vec3};

use super::arena::{Arena, Handle};
use super::transform::Transform;
use crate::error::{RenderError, Result};

/// Handle to a node in a [`NodeTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) Handle);

#[derive(Debug)]
struct Node {
    name: String,
    visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    transform: Transform,
    local: Mat4,
    world: Cell<Mat4>,
    dirty: Cell<bool>,
}

impl Node {
    fn new(name: String) -> Self {
        Self {
            name,
            visible: true,
            parent: None,
            children: Vec::new(),
            transform: Transform::default(),
            local: Mat4::IDENTITY,
            world: Cell::new(Mat4::IDENTITY),
            dirty: Cell::new(true),
        }
    }
}

/// Arena-backed node hierarchy.
///
/// Passing a [`NodeId`] whose node was destroyed is a usage error and panics.
#[derive(Debug, Default)]
pub struct NodeTree {
    nodes: Arena<Node>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached root-level node.
    pub fn create(&mut self, name: impl Into<String>) -> NodeId {
        NodeId(self.nodes.insert(Node::new(name.into())))
    }

    /// Creates a node directly under `parent`.
    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let mut node = Node::new(name.into());
        node.parent = Some(parent);
        let id = NodeId(self.nodes.insert(node));
        self.node_mut(parent).children.push(id);
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.0) {
            Some(node) => node,
            None => panic!("stale node handle {id:?}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.0) {
            Some(node) => node,
            None => panic!("stale node handle {id:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// `true` if `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.node(n).parent;
        }
        false
    }

    /// Attaches `child` under `parent`, detaching it from its previous parent first.
    ///
    /// Fails when `child` is `parent` itself or one of its ancestors.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.is_ancestor(child, parent) {
            return Err(RenderError::Hierarchy(format!(
                "cannot add `{}` under its own descendant `{}`",
                self.node(child).name,
                self.node(parent).name
            )));
        }
        self.detach(child);
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
        self.mark_dirty(child);
        Ok(())
    }

    /// Detaches `child` if `parent` is its parent. Returns whether anything changed.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.node(child).parent != Some(parent) {
            return false;
        }
        self.detach(child);
        true
    }

    /// Makes `id` a root-level node.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node_mut(id).parent.take() else {
            return;
        };
        self.node_mut(parent).children.retain(|c| *c != id);
        self.mark_dirty(id);
    }

    /// Removes `id` and its whole subtree, returning every removed id (root first).
    pub(crate) fn destroy(&mut self, id: NodeId) -> Vec<NodeId> {
        self.detach(id);
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.nodes.remove(n.0) {
                stack.extend(node.children.iter().rev().copied());
                removed.push(n);
            }
        }
        removed
    }

    /// Fills `out` with `id` and every descendant reached through visible
    /// nodes. A hidden node prunes its whole subtree; a stale `id` yields nothing.
    pub fn collect_visible(&self, id: NodeId, out: &mut HashSet<NodeId>) {
        out.clear();
        if self.nodes.get(id.0).is_none_or(|n| !n.visible) {
            return;
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.insert(n);
            stack.extend(
                self.node(n)
                    .children
                    .iter()
                    .copied()
                    .filter(|c| self.node(*c).visible),
            );
        }
    }

    /// `id` and all its descendants, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.node(n).children.iter().rev().copied());
        }
        out
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.node_mut(id).name = name.into();
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(h, _)| NodeId(h))
    }

    pub fn visible(&self, id: NodeId) -> bool {
        self.node(id).visible
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        self.node_mut(id).visible = visible;
    }

    /// Visible itself and through every ancestor.
    pub fn is_visible_in_hierarchy(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node(n);
            if !node.visible {
                return false;
            }
            current = node.parent;
        }
        true
    }

    // ------------------------------------------------------------------
    // Local transform
    // ------------------------------------------------------------------

    pub fn transform(&self, id: NodeId) -> Transform {
        self.node(id).transform
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) {
        let node = self.node_mut(id);
        node.transform = transform;
        node.local = transform.matrix();
        self.mark_dirty(id);
    }

    fn update_transform(&mut self, id: NodeId, f: impl FnOnce(&mut Transform)) {
        let mut t = self.node(id).transform;
        f(&mut t);
        self.set_transform(id, t);
    }

    pub fn position(&self, id: NodeId) -> Vec3 {
        self.node(id).transform.position
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) {
        self.update_transform(id, |t| t.position = position);
    }

    pub fn rotation(&self, id: NodeId) -> Quat {
        self.node(id).transform.rotation
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) {
        self.update_transform(id, |t| t.rotation = rotation);
    }

    /// Rotation from XYZ Euler angles in radians.
    pub fn set_rotation_euler(&mut self, id: NodeId, x: f32, y: f32, z: f32) {
        self.update_transform(id, |t| *t = t.euler(x, y, z));
    }

    pub fn scale(&self, id: NodeId) -> Vec3 {
        self.node(id).transform.scale
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) {
        self.update_transform(id, |t| t.scale = scale);
    }

    /// Replaces the local transform with the decomposition of `m`.
    pub fn set_matrix(&mut self, id: NodeId, m: &Mat4) {
        self.set_transform(id, Transform::from_matrix(m));
    }

    pub fn local_matrix(&self, id: NodeId) -> Mat4 {
        self.node(id).local
    }

    pub fn translate_on_axis(&mut self, id: NodeId, axis: Vec3, distance: f32) {
        self.update_transform(id, |t| t.translate_on_axis(axis, distance));
    }

    pub fn translate_x(&mut self, id: NodeId, distance: f32) {
        self.translate_on_axis(id, Vec3::X, distance);
    }

    pub fn translate_y(&mut self, id: NodeId, distance: f32) {
        self.translate_on_axis(id, Vec3::Y, distance);
    }

    pub fn translate_z(&mut self, id: NodeId, distance: f32) {
        self.translate_on_axis(id, Vec3::Z, distance);
    }

    pub fn rotate_on_axis(&mut self, id: NodeId, axis: Vec3, angle: f32) {
        self.update_transform(id, |t| t.rotate_on_axis(axis, angle));
    }

    pub fn rotate_x(&mut self, id: NodeId, angle: f32) {
        self.rotate_on_axis(id, Vec3::X, angle);
    }

    pub fn rotate_y(&mut self, id: NodeId, angle: f32) {
        self.rotate_on_axis(id, Vec3::Y, angle);
    }

    pub fn rotate_z(&mut self, id: NodeId, angle: f32) {
        self.rotate_on_axis(id, Vec3::Z, angle);
    }

    /// Turns the node so its -Z axis points at `target` (world space).
    pub fn look_at(&mut self, id: NodeId, target: Vec3, up: Vec3) {
        let eye = self.world_position(id);
        let dir = target - eye;
        if dir.length_squared() < f32::EPSILON {
            return;
        }
        let world_rot = Quat::from_mat4(&Mat4::look_to_rh(eye, dir, up).inverse());
        let parent_rot = self
            .parent(id)
            .map_or(Quat::IDENTITY, |p| self.world_quaternion(p));
        self.set_rotation(id, (parent_rot.inverse() * world_rot).normalize());
    }

    // ------------------------------------------------------------------
    // World transform
    // ------------------------------------------------------------------

    /// Marks `id` and its descendants dirty. Subtrees already dirty are skipped.
    fn mark_dirty(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = self.node(n);
            if node.dirty.replace(true) && n != id {
                continue;
            }
            stack.extend(node.children.iter().copied());
        }
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.node(id).dirty.get()
    }

    /// World matrix of `id`, recomputing the dirty part of its ancestor chain.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let node = self.node(id);
        if !node.dirty.get() {
            return node.world.get();
        }
        let parent_world = node
            .parent
            .map_or(Mat4::IDENTITY, |p| self.world_matrix(p));
        let world = parent_world * node.local;
        node.world.set(world);
        node.dirty.set(false);
        world
    }

    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).w_axis.truncate()
    }

    pub fn world_quaternion(&self, id: NodeId) -> Quat {
        self.world_matrix(id).to_scale_rotation_translation().1
    }

    pub fn world_scale(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).to_scale_rotation_translation().0
    }

    /// World-space forward (-Z) direction.
    pub fn world_direction(&self, id: NodeId) -> Vec3 {
        (self.world_quaternion(id) * Vec3::NEG_Z).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn world_is_product_of_locals() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        let c = tree.create("c");
        tree.add_child(a, b).unwrap();
        tree.add_child(b, c).unwrap();

        tree.set_position(a, Vec3::new(1.0, 0.0, 0.0));
        tree.set_rotation(b, Quat::from_rotation_y(FRAC_PI_2));
        tree.set_scale(c, Vec3::splat(2.0));
        tree.set_position(c, Vec3::new(0.0, 0.0, 3.0));

        let expected = tree.local_matrix(a) * tree.local_matrix(b) * tree.local_matrix(c);
        assert!(approx(tree.world_matrix(c), expected));
    }

    #[test]
    fn mutating_a_middle_node_reaches_descendants() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        let c = tree.create("c");
        tree.add_child(a, b).unwrap();
        tree.add_child(b, c).unwrap();
        let _ = tree.world_matrix(c);
        assert!(!tree.is_dirty(c));

        tree.set_position(b, Vec3::new(0.0, 5.0, 0.0));
        assert!(tree.is_dirty(b));
        assert!(tree.is_dirty(c));
        assert!(!tree.is_dirty(a));
        assert_eq!(tree.world_position(c), Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn clean_node_implies_clean_ancestors() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        tree.add_child(a, b).unwrap();
        let _ = tree.world_matrix(b);
        assert!(!tree.is_dirty(a));
        assert!(!tree.is_dirty(b));
    }

    #[test]
    fn reparenting_detaches_first() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        let c = tree.create("c");
        tree.add_child(a, c).unwrap();
        tree.add_child(b, c).unwrap();
        assert!(tree.children(a).is_empty());
        assert_eq!(tree.children(b), &[c]);
        assert_eq!(tree.parent(c), Some(b));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        tree.add_child(a, b).unwrap();
        assert!(matches!(tree.add_child(b, a), Err(RenderError::Hierarchy(_))));
        assert!(tree.add_child(a, a).is_err());
        assert_eq!(tree.parent(a), None);
    }

    #[test]
    fn remove_child_only_for_actual_parent() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        let c = tree.create("c");
        tree.add_child(a, c).unwrap();
        assert!(!tree.remove_child(b, c));
        assert!(tree.remove_child(a, c));
        assert_eq!(tree.parent(c), None);
    }

    #[test]
    fn destroy_removes_subtree() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        let c = tree.create("c");
        tree.add_child(a, b).unwrap();
        tree.add_child(b, c).unwrap();
        let removed = tree.destroy(b);
        assert_eq!(removed, vec![b, c]);
        assert!(tree.contains(a));
        assert!(!tree.contains(c));
        assert!(tree.children(a).is_empty());
    }

    #[test]
    fn hidden_parent_hides_children() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        let b = tree.create("b");
        tree.add_child(a, b).unwrap();
        tree.set_visible(a, false);
        assert!(tree.visible(b));
        assert!(!tree.is_visible_in_hierarchy(b));
    }

    #[test]
    fn look_at_points_forward_axis() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        tree.look_at(a, Vec3::new(10.0, 0.0, 0.0), Vec3::Y);
        assert!((tree.world_direction(a) - Vec3::X).length() < 1e-4);
    }

    #[test]
    #[should_panic(expected = "stale node handle")]
    fn stale_handle_panics() {
        let mut tree = NodeTree::new();
        let a = tree.create("a");
        tree.destroy(a);
        tree.position(a);
    }
}
