//! Per-frame orchestration.
//!
//! A frame walks through [`RenderStage`]s in order:
//!
//! 1. `FrameBegin`: reset per-frame counters.
//! 2. `SceneTraverse`: walk the visible nodes under the scene root, gather
//!    lights, cull graphics against the camera
//!    frustum, resolve a program per material group and sort the draw list.
//! 3. `Draw`: clear, then draw opaque items grouped by program and material,
//!    then transparent items back to front.
//! 4. `GuiOverlay`: draw the panels on top.
//! 5. `FrameEnd`: record what the frame did.
//!
//! An error in any stage abandons the rest of the frame and returns the
//! renderer to `Idle`. The state cache stays consistent because every call
//! already made went through it.

use std::cmp::Ordering;
use std::collections::HashSet;

use glam::Mat4;
use log::{debug, trace};

use crate::camera::Camera;
use crate::color::Color;
use crate::culling::Frustum;
use crate::error::Result;
use crate::gls::{ClearMask, GraphicsState, ProgramId};
use crate::graphic::{GraphicId, RenderInfo, Renderable};
use crate::gui::GuiRoot;
use crate::light::LightSet;
use crate::scene::{NodeId, Scene};
use crate::shaders::ShaderManager;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderStage {
    #[default]
    Idle,
    FrameBegin,
    SceneTraverse,
    Draw,
    GuiOverlay,
    FrameEnd,
}

/// What one frame did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Graphics that survived culling and were drawn.
    pub graphics: usize,
    pub culled: usize,
    /// Directional plus point lights uploaded this frame.
    pub lights: usize,
    pub panels: usize,
    pub draw_calls: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// `true` when the frame produced new pixels and should be presented.
    pub rendered: bool,
    pub stats: RenderStats,
}

#[derive(Clone, Copy, Debug)]
struct RenderItem {
    graphic: GraphicId,
    group: usize,
    program: ProgramId,
    material: u64,
    lit: bool,
    /// Distance along the view direction.
    depth: f32,
}

#[derive(Debug)]
pub struct Renderer {
    stage: RenderStage,
    failed_stage: Option<RenderStage>,
    shaders: ShaderManager,
    lights: LightSet,
    opaque: Vec<RenderItem>,
    transparent: Vec<RenderItem>,
    /// Visible nodes under the scene root this frame.
    reachable: HashSet<NodeId>,
    /// Clear color used when the scene has no background.
    pub clear_color: Color,
    stats: RenderStats,
    frames: u64,
    had_scene: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            stage: RenderStage::Idle,
            failed_stage: None,
            shaders: ShaderManager::new(),
            lights: LightSet::new(),
            opaque: Vec::new(),
            transparent: Vec::new(),
            reachable: HashSet::new(),
            clear_color: Color::GRAY,
            stats: RenderStats::default(),
            frames: 0,
            had_scene: false,
        }
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    /// Stage at which the most recent frame failed, if it did.
    pub fn failed_stage(&self) -> Option<RenderStage> {
        self.failed_stage
    }

    /// Stats of the last completed frame.
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderManager {
        &mut self.shaders
    }

    /// Forces the next frame to clear even if nothing is visible.
    pub fn invalidate(&mut self) {
        self.had_scene = true;
    }

    /// Renders one frame of `scene` seen from `camera`, with `gui` on top.
    pub fn render(
        &mut self,
        state: &mut GraphicsState,
        scene: &mut Scene,
        camera: &Camera,
        mut gui: Option<&mut GuiRoot>,
    ) -> Result<FrameReport> {
        let before = state.stats();
        self.enter(RenderStage::FrameBegin);
        self.failed_stage = None;
        self.stats = RenderStats::default();

        let result = self.run_stages(state, scene, camera, gui.as_deref_mut());
        match result {
            Ok(rendered) => {
                self.enter(RenderStage::FrameEnd);
                self.stats.draw_calls = state.stats().since(&before).draw_calls;
                self.frames += 1;
                trace!("frame {} done: {:?}", self.frames, self.stats);
                self.enter(RenderStage::Idle);
                Ok(FrameReport {
                    rendered,
                    stats: self.stats,
                })
            }
            Err(e) => {
                debug!("frame abandoned during {:?}: {e}", self.stage);
                self.failed_stage = Some(self.stage);
                self.opaque.clear();
                self.transparent.clear();
                self.enter(RenderStage::Idle);
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: RenderStage) {
        trace!("render stage {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn run_stages(
        &mut self,
        state: &mut GraphicsState,
        scene: &mut Scene,
        camera: &Camera,
        gui: Option<&mut GuiRoot>,
    ) -> Result<bool> {
        self.enter(RenderStage::SceneTraverse);
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        self.traverse(state, scene, &view, &projection)?;

        let has_scene = !self.opaque.is_empty() || !self.transparent.is_empty();
        let gui_changed = gui.as_ref().is_some_and(|g| g.is_changed());
        if !has_scene && !self.had_scene && !gui_changed {
            return Ok(false);
        }

        self.enter(RenderStage::Draw);
        let background = scene.background.unwrap_or(self.clear_color);
        state.set_clear_color(background);
        state.clear(ClearMask::ALL);
        self.draw(state, scene, &view, &projection)?;
        self.had_scene = has_scene;

        if let Some(gui) = gui {
            self.enter(RenderStage::GuiOverlay);
            match state.viewport() {
                Some(vp) if vp.width > 0 && vp.height > 0 => {
                    self.stats.panels = gui.render(state, &mut self.shaders, vp.width as u32, vp.height as u32)?;
                    gui.mark_drawn();
                }
                _ => debug!("no viewport set, skipping gui overlay"),
            }
        }
        Ok(true)
    }

    fn traverse(&mut self, state: &mut GraphicsState, scene: &mut Scene, view: &Mat4, projection: &Mat4) -> Result<()> {
        self.opaque.clear();
        self.transparent.clear();
        let frustum = Frustum::from_matrix(&(*projection * *view));
        let root = scene.root();
        let (nodes, graphics, lights) = scene.split_mut();
        nodes.collect_visible(root, &mut self.reachable);

        let reachable = &self.reachable;
        self.lights.collect(
            nodes,
            lights
                .iter()
                .filter(|(_, e)| reachable.contains(&e.node))
                .map(|(_, e)| (e.node, &e.light)),
            view,
        );
        self.stats.lights = self.lights.directional_count() + self.lights.point_count();

        for (handle, graphic) in graphics.iter() {
            if graphic.is_disposed() || !self.reachable.contains(&graphic.node()) {
                continue;
            }
            let world = nodes.world_matrix(graphic.node());
            let (center, radius) = graphic.geometry().bounding_sphere();
            if graphic.frustum_culled && !frustum.intersects_transformed_sphere(&world, center, radius) {
                self.stats.culled += 1;
                continue;
            }
            let depth = -(*view * world).transform_point3(center).z;

            for (group, g) in graphic.groups().iter().enumerate() {
                let program = self.shaders.program(state, g.material.shader_name(), graphic.defines())?;
                let item = RenderItem {
                    graphic: GraphicId(handle),
                    group,
                    program,
                    material: g.material.id(),
                    lit: g.material.is_lit(),
                    depth,
                };
                if g.material.is_transparent() {
                    self.transparent.push(item);
                } else {
                    self.opaque.push(item);
                }
            }
            self.stats.graphics += 1;
        }

        self.opaque
            .sort_unstable_by_key(|item| (item.program, item.material, item.graphic));
        self.transparent
            .sort_by(|a, b| b.depth.partial_cmp(&a.depth).unwrap_or(Ordering::Equal));
        Ok(())
    }

    fn draw(&mut self, state: &mut GraphicsState, scene: &mut Scene, view: &Mat4, projection: &Mat4) -> Result<()> {
        let (nodes, graphics, _) = scene.split_mut();
        let info = RenderInfo {
            view: *view,
            projection: *projection,
            nodes,
        };

        for item in self.opaque.iter().chain(self.transparent.iter()) {
            let Some(graphic) = graphics.get_mut(item.graphic.0) else {
                continue;
            };
            state.use_program(item.program);
            if item.lit {
                self.lights.upload(state, item.program);
            }
            graphic.groups()[item.group].material.render_setup(state)?;
            graphic.render_setup(state, &info);
            graphic.bind_geometry(state)?;
            graphic.draw_group(state, item.group);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::geometry::Geometry;
    use crate::gls::{Capability, GlCall, HeadlessContext};
    use crate::graphic::Graphic;
    use crate::gui::Panel;
    use crate::light::Light;
    use crate::material::Material;

    fn setup() -> (HeadlessContext, GraphicsState, Scene, Camera) {
        let ctx = HeadlessContext::new();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));
        gs.set_viewport(0, 0, 750, 1334);
        let camera = Camera::new().at(Vec3::new(0.0, 0.0, 10.0)).looking_at(Vec3::ZERO);
        (ctx, gs, Scene::new(), camera)
    }

    fn add_cube(scene: &mut Scene, at: Vec3, material: Material) -> GraphicId {
        let node = scene.create_node("cube");
        scene.nodes_mut().set_position(node, at);
        scene.add_graphic(Graphic::mesh(node, Arc::new(Geometry::cube(1.0)), material))
    }

    #[test]
    fn draws_visible_graphics_and_culls_the_rest() {
        let (ctx, mut gs, mut scene, camera) = setup();
        add_cube(&mut scene, Vec3::ZERO, Material::basic(Color::RED));
        add_cube(&mut scene, Vec3::new(1.0, 0.0, 0.0), Material::basic(Color::RED));
        add_cube(&mut scene, Vec3::new(0.0, 0.0, 50.0), Material::basic(Color::RED));

        let mut renderer = Renderer::new();
        let report = renderer.render(&mut gs, &mut scene, &camera, None).unwrap();
        assert!(report.rendered);
        assert_eq!(report.stats.graphics, 2);
        assert_eq!(report.stats.culled, 1);
        assert_eq!(report.stats.draw_calls, 2);
        assert_eq!(ctx.draw_count(), 2);
        assert_eq!(renderer.stage(), RenderStage::Idle);
        assert_eq!(renderer.frames(), 1);
    }

    #[test]
    fn only_nodes_under_the_root_are_drawn() {
        let (ctx, mut gs, mut scene, camera) = setup();
        let id = add_cube(&mut scene, Vec3::ZERO, Material::basic(Color::RED));
        let node = scene.graphic(id).unwrap().node();
        let lamp = scene.create_node("lamp");
        scene.add_light(lamp, Light::directional(Color::WHITE, 1.0));
        let root = scene.root();
        let mut renderer = Renderer::new();

        assert!(scene.nodes_mut().remove_child(root, node));
        scene.nodes_mut().detach(lamp);
        let report = renderer.render(&mut gs, &mut scene, &camera, None).unwrap();
        assert_eq!(report.stats.graphics, 0);
        assert_eq!(report.stats.lights, 0);
        assert_eq!(ctx.draw_count(), 0);

        scene.nodes_mut().add_child(root, node).unwrap();
        let report = renderer.render(&mut gs, &mut scene, &camera, None).unwrap();
        assert_eq!(report.stats.graphics, 1);
        assert_eq!(ctx.draw_count(), 1);
    }

    #[test]
    fn hidden_parent_hides_its_subtree() {
        let (ctx, mut gs, mut scene, camera) = setup();
        let group = scene.create_node("group");
        let child = scene.create_child(group, "cube");
        let cube = Arc::new(Geometry::cube(1.0));
        scene.add_graphic(Graphic::mesh(child, cube, Material::basic(Color::RED)));
        scene.nodes_mut().set_visible(group, false);

        let report = Renderer::new().render(&mut gs, &mut scene, &camera, None).unwrap();
        assert_eq!(report.stats.graphics, 0);
        assert_eq!(ctx.draw_count(), 0);
    }

    #[test]
    fn graphics_on_destroyed_nodes_are_skipped() {
        let (ctx, mut gs, mut scene, camera) = setup();
        let id = add_cube(&mut scene, Vec3::ZERO, Material::basic(Color::RED));
        add_cube(&mut scene, Vec3::new(1.0, 0.0, 0.0), Material::basic(Color::RED));
        let node = scene.graphic(id).unwrap().node();
        scene.nodes_mut().destroy(node);

        let report = Renderer::new().render(&mut gs, &mut scene, &camera, None).unwrap();
        assert_eq!(report.stats.graphics, 1);
        assert_eq!(ctx.draw_count(), 1);
    }

    #[test]
    fn culling_can_be_disabled_per_graphic() {
        let (_ctx, mut gs, mut scene, camera) = setup();
        let behind = add_cube(&mut scene, Vec3::new(0.0, 0.0, 50.0), Material::basic(Color::RED));
        scene.graphic_mut(behind).unwrap().frustum_culled = false;

        let report = Renderer::new().render(&mut gs, &mut scene, &camera, None).unwrap();
        assert_eq!(report.stats.culled, 0);
        assert_eq!(report.stats.graphics, 1);
    }

    #[test]
    fn second_frame_reuses_programs_and_state() {
        let (ctx, mut gs, mut scene, camera) = setup();
        add_cube(&mut scene, Vec3::ZERO, Material::basic(Color::RED));
        let mut renderer = Renderer::new();
        renderer.render(&mut gs, &mut scene, &camera, None).unwrap();

        ctx.clear_calls();
        renderer.render(&mut gs, &mut scene, &camera, None).unwrap();
        assert_eq!(ctx.count(|c| matches!(c, GlCall::LinkProgram(_))), 0);
        assert_eq!(ctx.count(|c| matches!(c, GlCall::UseProgram(_))), 0);
        assert_eq!(ctx.count(|c| matches!(c, GlCall::BufferData { .. })), 0);
        assert_eq!(ctx.draw_count(), 1);
    }

    #[test]
    fn opaque_items_are_grouped_by_program() {
        let (ctx, mut gs, mut scene, camera) = setup();
        add_cube(&mut scene, Vec3::new(-1.0, 0.0, 0.0), Material::basic(Color::RED));
        add_cube(&mut scene, Vec3::new(0.0, 0.0, 0.0), Material::standard(Color::RED));
        add_cube(&mut scene, Vec3::new(1.0, 0.0, 0.0), Material::basic(Color::RED));
        let mut renderer = Renderer::new();
        renderer.render(&mut gs, &mut scene, &camera, None).unwrap();

        ctx.clear_calls();
        renderer.render(&mut gs, &mut scene, &camera, None).unwrap();
        // Sorted by program: at most one switch into each of the two programs.
        assert!(ctx.count(|c| matches!(c, GlCall::UseProgram(_))) <= 2);
        assert_eq!(ctx.draw_count(), 3);
    }

    #[test]
    fn transparent_items_draw_back_to_front() {
        let (ctx, mut gs, mut scene, camera) = setup();
        let glass = Material::basic(Color::BLUE.with_alpha(0.5));
        let near = add_cube(&mut scene, Vec3::new(0.0, 0.0, 2.0), glass.clone());
        let far = add_cube(&mut scene, Vec3::new(0.0, 0.0, -2.0), glass);
        let mut renderer = Renderer::new();
        renderer.render(&mut gs, &mut scene, &camera, None).unwrap();

        let items: Vec<_> = renderer.transparent.iter().map(|i| i.graphic).collect();
        assert_eq!(items, vec![far, near]);
        assert_eq!(ctx.draw_count(), 2);
    }

    #[test]
    fn lights_are_uploaded_once_per_lit_program() {
        let (ctx, mut gs, mut scene, camera) = setup();
        add_cube(&mut scene, Vec3::new(-1.0, 0.0, 0.0), Material::standard(Color::RED));
        add_cube(&mut scene, Vec3::new(1.0, 0.0, 0.0), Material::standard(Color::GREEN));
        let lamp = scene.create_node("lamp");
        scene.add_light(lamp, Light::point(Color::WHITE, 1.0));

        let mut renderer = Renderer::new();
        let report = renderer.render(&mut gs, &mut scene, &camera, None).unwrap();
        assert_eq!(report.stats.lights, 1);
        let gets = ctx.count(|c| matches!(c, GlCall::GetUniformLocation(_, name) if name == "PointLightCount"));
        assert_eq!(gets, 1);

        // Both cubes share the program, so the second upload in the frame was skipped.
        let program = renderer.opaque[0].program;
        assert!(!renderer.lights.upload(&mut gs, program));
    }

    #[test]
    fn empty_frames_are_not_presented() {
        let (ctx, mut gs, mut scene, camera) = setup();
        let id = add_cube(&mut scene, Vec3::ZERO, Material::basic(Color::RED));
        let mut renderer = Renderer::new();
        assert!(renderer.render(&mut gs, &mut scene, &camera, None).unwrap().rendered);

        scene.remove_graphic(id, &mut gs);
        // The first empty frame still clears the old image away.
        assert!(renderer.render(&mut gs, &mut scene, &camera, None).unwrap().rendered);
        ctx.clear_calls();
        assert!(!renderer.render(&mut gs, &mut scene, &camera, None).unwrap().rendered);
        assert!(ctx.count(|c| matches!(c, GlCall::Clear(_))) == 0);
    }

    #[test]
    fn gui_only_frames_draw_when_panels_change() {
        let (_ctx, mut gs, mut scene, camera) = setup();
        let mut gui = GuiRoot::new();
        let panel = gui.add(Panel::new(10.0, 10.0, 100.0, 40.0));
        let mut renderer = Renderer::new();

        let report = renderer.render(&mut gs, &mut scene, &camera, Some(&mut gui)).unwrap();
        assert!(report.rendered);
        assert_eq!(report.stats.panels, 1);
        assert!(!renderer.render(&mut gs, &mut scene, &camera, Some(&mut gui)).unwrap().rendered);

        gui.panel_mut(panel).unwrap().color = Color::RED;
        assert!(renderer.render(&mut gs, &mut scene, &camera, Some(&mut gui)).unwrap().rendered);
        assert_eq!(gs.is_enabled(Capability::DepthTest), Some(false));
    }

    #[test]
    fn failed_frame_returns_to_idle_and_keeps_cache_consistent() {
        let (ctx, mut gs, mut scene, camera) = setup();
        add_cube(&mut scene, Vec3::ZERO, Material::standard(Color::RED));
        ctx.fail_compilation_containing("PointLightDecay");

        let mut renderer = Renderer::new();
        assert!(renderer.render(&mut gs, &mut scene, &camera, None).is_err());
        assert_eq!(renderer.stage(), RenderStage::Idle);
        assert_eq!(renderer.failed_stage(), Some(RenderStage::SceneTraverse));
        assert_eq!(ctx.draw_count(), 0);
        assert_eq!(renderer.frames(), 0);

        // The cache still matches the context: enabling an enabled capability is absorbed.
        let hits = gs.stats().cap_hits;
        gs.enable(Capability::DepthTest);
        assert_eq!(gs.stats().cap_hits, hits + 1);
    }
}
