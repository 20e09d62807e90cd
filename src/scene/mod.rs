//! Scene graph: the node hierarchy plus what hangs off it.
//!
//! A [`Scene`] owns a [`NodeTree`] with a permanent root node, the
//! [`Graphic`]s drawn at those nodes and the [`Light`]s attached to them.
//! Graphics and lights refer to their node by id; destroying a node subtree
//! through the scene also disposes everything attached to it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gles3d::{Color, Geometry, Graphic, Material, Scene, Vec3};
//!
//! let mut scene = Scene::new();
//! let node = scene.create_node("box");
//! scene.nodes_mut().set_position(node, Vec3::new(0.0, 1.0, -4.0));
//! let id = scene.add_graphic(Graphic::mesh(
//!     node,
//!     Arc::new(Geometry::cube(1.0)),
//!     Material::standard(Color::RED),
//! ));
//! assert_eq!(scene.graphic(id).map(|g| g.node()), Some(node));
//! ```

mod arena;
mod node;
mod transform;

pub use arena::{Arena, Handle};
pub use node::{NodeId, NodeTree};
pub use transform::Transform;

use std::collections::HashSet;

use crate::color::Color;
use crate::error::{RenderError, Result};
use crate::gls::GraphicsState;
use crate::graphic::{Graphic, GraphicId, Renderable};
use crate::light::Light;
use crate::picking::{Intersect, Raycaster, sort_intersects};

/// Handle to a light owned by a [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId(pub(crate) Handle);

#[derive(Debug)]
pub(crate) struct LightEntry {
    pub node: NodeId,
    pub light: Light,
}

#[derive(Debug)]
pub struct Scene {
    nodes: NodeTree,
    root: NodeId,
    graphics: Arena<Graphic>,
    lights: Arena<LightEntry>,
    /// Clear color for frames of this scene; `None` keeps the renderer's.
    pub background: Option<Color>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut nodes = NodeTree::new();
        let root = nodes.create("root");
        Self {
            nodes,
            root,
            graphics: Arena::new(),
            lights: Arena::new(),
            background: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn nodes(&self) -> &NodeTree {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut NodeTree {
        &mut self.nodes
    }

    /// Creates a node under the root.
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.create_child(self.root, name)
    }

    /// Creates a node under `parent`.
    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        self.nodes.create_child(parent, name)
    }

    /// Destroys `node` and its subtree, disposing attached graphics and removing lights.
    ///
    /// The root cannot be destroyed.
    pub fn destroy_node(&mut self, node: NodeId, state: &mut GraphicsState) -> Result<usize> {
        if node == self.root {
            return Err(RenderError::Hierarchy("the scene root cannot be destroyed".into()));
        }
        let removed = self.nodes.destroy(node);

        let doomed: Vec<_> = self
            .graphics
            .iter()
            .filter(|(_, g)| removed.contains(&g.node()))
            .map(|(h, _)| h)
            .collect();
        for h in doomed {
            if let Some(mut g) = self.graphics.remove(h) {
                g.dispose(state);
            }
        }

        let dark: Vec<_> = self
            .lights
            .iter()
            .filter(|(_, l)| removed.contains(&l.node))
            .map(|(h, _)| h)
            .collect();
        for h in dark {
            self.lights.remove(h);
        }
        Ok(removed.len())
    }

    // ------------------------------------------------------------------
    // Graphics
    // ------------------------------------------------------------------

    /// Takes ownership of `graphic`.
    ///
    /// # Panics
    ///
    /// If the graphic's node does not belong to this scene.
    pub fn add_graphic(&mut self, graphic: Graphic) -> GraphicId {
        assert!(
            self.nodes.contains(graphic.node()),
            "graphic attached to a node outside this scene"
        );
        GraphicId(self.graphics.insert(graphic))
    }

    pub fn graphic(&self, id: GraphicId) -> Option<&Graphic> {
        self.graphics.get(id.0)
    }

    pub fn graphic_mut(&mut self, id: GraphicId) -> Option<&mut Graphic> {
        self.graphics.get_mut(id.0)
    }

    pub fn graphics(&self) -> impl Iterator<Item = (GraphicId, &Graphic)> {
        self.graphics.iter().map(|(h, g)| (GraphicId(h), g))
    }

    pub fn graphic_count(&self) -> usize {
        self.graphics.len()
    }

    /// Removes and disposes a graphic. Returns `false` for an unknown id.
    pub fn remove_graphic(&mut self, id: GraphicId, state: &mut GraphicsState) -> bool {
        match self.graphics.remove(id.0) {
            Some(mut g) => {
                g.dispose(state);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Lights
    // ------------------------------------------------------------------

    pub fn add_light(&mut self, node: NodeId, light: Light) -> LightId {
        assert!(self.nodes.contains(node), "light attached to a node outside this scene");
        LightId(self.lights.insert(LightEntry { node, light }))
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id.0).map(|e| &e.light)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id.0).map(|e| &mut e.light)
    }

    pub fn remove_light(&mut self, id: LightId) -> Option<Light> {
        self.lights.remove(id.0).map(|e| e.light)
    }

    /// Every light with the node it is attached to.
    pub fn lights(&self) -> impl Iterator<Item = (NodeId, &Light)> {
        self.lights.iter().map(|(_, e)| (e.node, &e.light))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Hits against every visible graphic under the root, nearest first.
    pub fn raycast(&self, raycaster: &Raycaster) -> Vec<Intersect> {
        let mut reachable = HashSet::new();
        self.nodes.collect_visible(self.root, &mut reachable);
        let mut hits = Vec::new();
        for (h, g) in self.graphics.iter() {
            if !reachable.contains(&g.node()) {
                continue;
            }
            let world = self.nodes.world_matrix(g.node());
            g.raycast(GraphicId(h), raycaster, &world, &mut hits);
        }
        sort_intersects(&mut hits);
        hits
    }

    /// Disposes every graphic. Nodes and lights are kept.
    pub fn dispose(&mut self, state: &mut GraphicsState) {
        for mut g in self.graphics.drain() {
            g.dispose(state);
        }
    }

    /// Borrows the node tree and the graphics separately.
    pub(crate) fn split_mut(&mut self) -> (&NodeTree, &mut Arena<Graphic>, &Arena<LightEntry>) {
        (&self.nodes, &mut self.graphics, &self.lights)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::geometry::Geometry;
    use crate::gls::HeadlessContext;
    use crate::material::Material;
    use crate::picking::Ray;
    use glam::Vec3;

    fn state() -> GraphicsState {
        GraphicsState::new(Box::new(HeadlessContext::new()))
    }

    #[test]
    fn destroying_a_subtree_disposes_its_graphics() {
        let mut gs = state();
        let mut scene = Scene::new();
        let parent = scene.create_node("parent");
        let child = scene.create_child(parent, "child");
        let geom = Arc::new(Geometry::cube(1.0));
        let g = scene.add_graphic(Graphic::mesh(child, geom.clone(), Material::basic(Color::RED)));
        let l = scene.add_light(child, Light::point(Color::WHITE, 1.0));

        assert_eq!(scene.destroy_node(parent, &mut gs).unwrap(), 2);
        assert!(scene.graphic(g).is_none());
        assert!(scene.light(l).is_none());
        assert_eq!(geom.owners(), 0);
        assert!(scene.destroy_node(scene.root(), &mut gs).is_err());
    }

    #[test]
    fn raycast_sorts_and_skips_hidden() {
        let mut scene = Scene::new();
        let near = scene.create_node("near");
        let far = scene.create_node("far");
        let hidden = scene.create_node("hidden");
        scene.nodes_mut().set_position(near, Vec3::new(0.0, 0.0, -5.0));
        scene.nodes_mut().set_position(far, Vec3::new(0.0, 0.0, -10.0));
        scene.nodes_mut().set_position(hidden, Vec3::new(0.0, 0.0, -2.0));
        scene.nodes_mut().set_visible(hidden, false);

        let geom = Arc::new(Geometry::cube(1.0));
        let far_id = scene.add_graphic(Graphic::mesh(far, geom.clone(), Material::basic(Color::RED)));
        let near_id = scene.add_graphic(Graphic::mesh(near, geom.clone(), Material::basic(Color::RED)));
        scene.add_graphic(Graphic::mesh(hidden, geom, Material::basic(Color::RED)));

        let hits = scene.raycast(&Raycaster::new(Ray::new(Vec3::new(0.1, 0.2, 0.0), Vec3::NEG_Z)));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].graphic, near_id);
        assert_eq!(hits[1].graphic, far_id);
        assert!((hits[0].distance - 4.5).abs() < 1e-4);
    }

    #[test]
    fn remove_and_dispose() {
        let mut gs = state();
        let mut scene = Scene::new();
        let node = scene.create_node("n");
        let geom = Arc::new(Geometry::plane(1.0, 1.0));
        let a = scene.add_graphic(Graphic::mesh(node, geom.clone(), Material::basic(Color::RED)));
        scene.add_graphic(Graphic::mesh(node, geom.clone(), Material::basic(Color::RED)));

        assert!(scene.remove_graphic(a, &mut gs));
        assert!(!scene.remove_graphic(a, &mut gs));
        assert_eq!(geom.owners(), 1);
        scene.dispose(&mut gs);
        assert_eq!(geom.owners(), 0);
        assert_eq!(scene.graphic_count(), 0);
    }

    #[test]
    fn children_inherit_root_transform() {
        let mut scene = Scene::new();
        let a = scene.create_node("a");
        let root = scene.root();
        scene.nodes_mut().set_position(root, Vec3::X);
        assert_eq!(scene.nodes().world_position(a), Vec3::X);
    }
}
