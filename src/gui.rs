//! Overlay panels drawn on top of the 3D scene.
//!
//! Panels are flat colored rectangles in window pixels (origin top-left),
//! nested so a child is positioned relative to its parent and hidden with
//! it. [`GuiRoot`] owns the tree, turns touches into [`GuiEvent`]s and tracks
//! whether anything changed since the last drawn frame.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Vec4};
use log::debug;

use crate::color::Color;
use crate::error::Result;
use crate::events::{TouchEvent, TouchPhase};
use crate::geometry::Geometry;
use crate::gls::{BlendEquation, BlendFactor, Capability, GraphicsState, IndexType, Primitive};
use crate::scene::{Arena, Handle};
use crate::shaders::{ShaderDefines, ShaderManager};

/// A rectangle in window pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Edges are inclusive on the top-left and exclusive on the bottom-right.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    fn as_vec4(&self) -> Vec4 {
        Vec4::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PanelId(Handle);

/// A colored rectangle, positioned relative to its parent.
#[derive(Clone, Debug)]
pub struct Panel {
    pub rect: Rect,
    pub color: Color,
    /// One-pixel outline drawn over the edges.
    pub border: Option<Color>,
    pub visible: bool,
    parent: Option<PanelId>,
    children: Vec<PanelId>,
}

impl Panel {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            rect: Rect::new(x, y, width, height),
            color: Color::PANEL_BG,
            border: None,
            visible: true,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn border(mut self, color: Color) -> Self {
        self.border = Some(color);
        self
    }

    pub fn parent(&self) -> Option<PanelId> {
        self.parent
    }

    pub fn children(&self) -> &[PanelId] {
        &self.children
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GuiEvent {
    /// A touch started on the panel.
    Press { panel: PanelId, x: f32, y: f32 },
    /// A touch started and ended on the same panel.
    Click { panel: PanelId, x: f32, y: f32 },
    CursorEnter(PanelId),
    CursorLeave(PanelId),
}

const BORDER_WIDTH: f32 = 1.0;

#[derive(Debug, Default)]
pub struct GuiRoot {
    panels: Arena<Panel>,
    roots: Vec<PanelId>,
    hovered: Option<PanelId>,
    pressed: HashMap<u64, PanelId>,
    changed: bool,
    quad: Option<Arc<Geometry>>,
    draw_list: Vec<(Rect, Color)>,
}

impl GuiRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a panel at the top level, drawn above earlier panels.
    pub fn add(&mut self, panel: Panel) -> PanelId {
        let id = PanelId(self.panels.insert(Panel { parent: None, ..panel }));
        self.roots.push(id);
        self.changed = true;
        id
    }

    /// Adds a panel inside `parent`.
    ///
    /// # Panics
    ///
    /// If `parent` is not in this GUI.
    pub fn add_child(&mut self, parent: PanelId, panel: Panel) -> PanelId {
        assert!(self.panels.contains(parent.0), "parent panel does not exist");
        let id = PanelId(self.panels.insert(Panel {
            parent: Some(parent),
            ..panel
        }));
        if let Some(p) = self.panels.get_mut(parent.0) {
            p.children.push(id);
        }
        self.changed = true;
        id
    }

    /// Removes a panel and its children. Returns how many panels were removed.
    pub fn remove(&mut self, id: PanelId) -> usize {
        let Some(panel) = self.panels.get(id.0) else {
            return 0;
        };
        match panel.parent {
            Some(parent) => {
                if let Some(p) = self.panels.get_mut(parent.0) {
                    p.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }

        let mut stack = vec![id];
        let mut removed = 0;
        while let Some(next) = stack.pop() {
            if let Some(panel) = self.panels.remove(next.0) {
                stack.extend(panel.children);
                removed += 1;
                if self.hovered == Some(next) {
                    self.hovered = None;
                }
                self.pressed.retain(|_, p| *p != next);
            }
        }
        self.changed = true;
        removed
    }

    pub fn panel(&self, id: PanelId) -> Option<&Panel> {
        self.panels.get(id.0)
    }

    /// Mutable access; marks the GUI as changed.
    pub fn panel_mut(&mut self, id: PanelId) -> Option<&mut Panel> {
        let panel = self.panels.get_mut(id.0)?;
        self.changed = true;
        Some(panel)
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Whether the panels changed since [`mark_drawn`](Self::mark_drawn).
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_drawn(&mut self) {
        self.changed = false;
    }

    /// Forces a redraw, e.g. after the surface was recreated.
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// The panel rectangle in window pixels.
    pub fn absolute_rect(&self, id: PanelId) -> Option<Rect> {
        let mut rect = self.panels.get(id.0)?.rect;
        let mut parent = self.panels.get(id.0)?.parent;
        while let Some(p) = parent {
            let panel = self.panels.get(p.0)?;
            rect = rect.offset(panel.rect.x, panel.rect.y);
            parent = panel.parent;
        }
        Some(rect)
    }

    /// The topmost visible panel under `(x, y)`.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<PanelId> {
        self.roots
            .iter()
            .rev()
            .find_map(|id| self.hit_panel(*id, 0.0, 0.0, x, y))
    }

    fn hit_panel(&self, id: PanelId, ox: f32, oy: f32, x: f32, y: f32) -> Option<PanelId> {
        let panel = self.panels.get(id.0)?;
        if !panel.visible {
            return None;
        }
        let rect = panel.rect.offset(ox, oy);
        if let Some(child) = panel
            .children
            .iter()
            .rev()
            .find_map(|c| self.hit_panel(*c, rect.x, rect.y, x, y))
        {
            return Some(child);
        }
        rect.contains(x, y).then_some(id)
    }

    /// Routes a touch to the panels, appending resulting events to `out`.
    ///
    /// Returns `true` if the touch landed on a panel, so callers can keep it
    /// away from the 3D scene.
    pub fn handle_touch(&mut self, touch: &TouchEvent, out: &mut Vec<GuiEvent>) -> bool {
        let hit = self.hit_test(touch.x, touch.y);
        match touch.phase {
            TouchPhase::Begin => {
                self.update_hover(hit, out);
                if let Some(panel) = hit {
                    self.pressed.insert(touch.sequence, panel);
                    out.push(GuiEvent::Press {
                        panel,
                        x: touch.x,
                        y: touch.y,
                    });
                }
            }
            TouchPhase::Move => self.update_hover(hit, out),
            TouchPhase::End => {
                let pressed = self.pressed.remove(&touch.sequence);
                if let Some(panel) = hit
                    && pressed == Some(panel)
                {
                    debug!("panel clicked at ({}, {})", touch.x, touch.y);
                    out.push(GuiEvent::Click {
                        panel,
                        x: touch.x,
                        y: touch.y,
                    });
                }
                // A lifted finger no longer hovers anything.
                self.update_hover(None, out);
                return hit.is_some() || pressed.is_some();
            }
        }
        hit.is_some() || self.pressed.contains_key(&touch.sequence)
    }

    fn update_hover(&mut self, hit: Option<PanelId>, out: &mut Vec<GuiEvent>) {
        if self.hovered == hit {
            return;
        }
        if let Some(old) = self.hovered {
            out.push(GuiEvent::CursorLeave(old));
        }
        if let Some(new) = hit {
            out.push(GuiEvent::CursorEnter(new));
        }
        self.hovered = hit;
    }

    /// Draws every visible panel with an orthographic projection over a
    /// `width` × `height` window. Returns the number of panels drawn.
    pub fn render(
        &mut self,
        state: &mut GraphicsState,
        shaders: &mut ShaderManager,
        width: u32,
        height: u32,
    ) -> Result<usize> {
        self.draw_list.clear();
        let mut panels = 0;
        for i in 0..self.roots.len() {
            let root = self.roots[i];
            panels += self.collect(root, 0.0, 0.0);
        }
        if self.draw_list.is_empty() {
            return Ok(0);
        }

        let program = shaders.program(state, "panel", &ShaderDefines::new())?;
        state.use_program(program);

        state.disable(Capability::DepthTest);
        state.disable(Capability::CullFace);
        state.disable(Capability::PolygonOffsetFill);
        state.set_depth_mask(false);
        state.enable(Capability::Blend);
        state.set_blend_equation(BlendEquation::Add);
        state.set_blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

        let projection = Mat4::orthographic_rh_gl(0.0, width as f32, height as f32, 0.0, -1.0, 1.0);
        if let Some(loc) = state.uniform("Projection") {
            state.set_uniform_mat4(loc, &projection);
        }

        let quad = self
            .quad
            .get_or_insert_with(|| {
                let quad = Arc::new(Geometry::unit_quad());
                quad.acquire();
                quad
            })
            .clone();
        quad.bind(state)?;
        let count = quad.draw_count() as i32;

        let rect_loc = state.uniform("PanelRect");
        let color_loc = state.uniform("PanelColor");
        for (rect, color) in &self.draw_list {
            if let Some(loc) = rect_loc {
                state.set_uniform_vec4(loc, rect.as_vec4());
            }
            if let Some(loc) = color_loc {
                state.set_uniform_vec4(loc, color.to_vec4());
            }
            state.draw_elements(Primitive::Triangles, count, IndexType::U32, 0);
        }
        Ok(panels)
    }

    /// Queues `id` and its visible children. Returns the number of panels queued.
    fn collect(&mut self, id: PanelId, ox: f32, oy: f32) -> usize {
        let Some(panel) = self.panels.get(id.0) else {
            return 0;
        };
        if !panel.visible {
            return 0;
        }
        let rect = panel.rect.offset(ox, oy);
        self.draw_list.push((rect, panel.color));
        if let Some(border) = panel.border {
            let b = BORDER_WIDTH;
            for edge in [
                Rect::new(rect.x, rect.y, rect.width, b),
                Rect::new(rect.x, rect.y + rect.height - b, rect.width, b),
                Rect::new(rect.x, rect.y, b, rect.height),
                Rect::new(rect.x + rect.width - b, rect.y, b, rect.height),
            ] {
                self.draw_list.push((edge, border));
            }
        }
        let children = panel.children.clone();
        1 + children
            .into_iter()
            .map(|c| self.collect(c, rect.x, rect.y))
            .sum::<usize>()
    }

    /// Releases the shared quad geometry.
    pub fn dispose(&mut self, state: &mut GraphicsState) {
        if let Some(quad) = self.quad.take() {
            quad.release(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gls::{GlCall, HeadlessContext};

    fn touch(x: f32, y: f32, phase: TouchPhase) -> TouchEvent {
        TouchEvent {
            x,
            y,
            sequence: 1,
            phase,
        }
    }

    #[test]
    fn children_are_positioned_relative_to_parent() {
        let mut gui = GuiRoot::new();
        let outer = gui.add(Panel::new(100.0, 50.0, 200.0, 200.0));
        let inner = gui.add_child(outer, Panel::new(10.0, 10.0, 20.0, 20.0));
        assert_eq!(gui.absolute_rect(inner), Some(Rect::new(110.0, 60.0, 20.0, 20.0)));
        assert_eq!(gui.hit_test(115.0, 65.0), Some(inner));
        assert_eq!(gui.hit_test(150.0, 150.0), Some(outer));
        assert_eq!(gui.hit_test(5.0, 5.0), None);

        gui.panel_mut(outer).unwrap().visible = false;
        assert_eq!(gui.hit_test(115.0, 65.0), None);
    }

    #[test]
    fn later_panels_are_on_top() {
        let mut gui = GuiRoot::new();
        gui.add(Panel::new(0.0, 0.0, 100.0, 100.0));
        let top = gui.add(Panel::new(50.0, 50.0, 100.0, 100.0));
        assert_eq!(gui.hit_test(75.0, 75.0), Some(top));
    }

    #[test]
    fn press_and_release_on_same_panel_clicks() {
        let mut gui = GuiRoot::new();
        let button = gui.add(Panel::new(0.0, 0.0, 50.0, 50.0));
        let mut events = Vec::new();

        assert!(gui.handle_touch(&touch(10.0, 10.0, TouchPhase::Begin), &mut events));
        assert!(gui.handle_touch(&touch(12.0, 12.0, TouchPhase::End), &mut events));
        assert_eq!(
            events,
            vec![
                GuiEvent::CursorEnter(button),
                GuiEvent::Press {
                    panel: button,
                    x: 10.0,
                    y: 10.0
                },
                GuiEvent::Click {
                    panel: button,
                    x: 12.0,
                    y: 12.0
                },
                GuiEvent::CursorLeave(button),
            ]
        );
    }

    #[test]
    fn dragging_off_a_panel_does_not_click() {
        let mut gui = GuiRoot::new();
        let button = gui.add(Panel::new(0.0, 0.0, 50.0, 50.0));
        let mut events = Vec::new();
        gui.handle_touch(&touch(10.0, 10.0, TouchPhase::Begin), &mut events);
        events.clear();
        gui.handle_touch(&touch(80.0, 80.0, TouchPhase::Move), &mut events);
        assert_eq!(events, vec![GuiEvent::CursorLeave(button)]);
        events.clear();
        gui.handle_touch(&touch(80.0, 80.0, TouchPhase::End), &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn touches_outside_panels_are_not_consumed() {
        let mut gui = GuiRoot::new();
        gui.add(Panel::new(0.0, 0.0, 50.0, 50.0));
        let mut events = Vec::new();
        assert!(!gui.handle_touch(&touch(300.0, 300.0, TouchPhase::Begin), &mut events));
        assert!(events.is_empty());
    }

    #[test]
    fn remove_drops_subtree_and_marks_changed() {
        let mut gui = GuiRoot::new();
        let outer = gui.add(Panel::new(0.0, 0.0, 10.0, 10.0));
        gui.add_child(outer, Panel::new(0.0, 0.0, 5.0, 5.0));
        gui.mark_drawn();
        assert!(!gui.is_changed());
        assert_eq!(gui.remove(outer), 2);
        assert!(gui.is_empty());
        assert!(gui.is_changed());
    }

    #[test]
    fn render_draws_each_panel_and_border_edge() {
        let ctx = HeadlessContext::new();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));
        let mut shaders = ShaderManager::new();
        let mut gui = GuiRoot::new();
        let outer = gui.add(Panel::new(0.0, 0.0, 100.0, 100.0).border(Color::WHITE));
        gui.add_child(outer, Panel::new(10.0, 10.0, 10.0, 10.0));
        let hidden = gui.add(Panel::new(0.0, 0.0, 5.0, 5.0));
        gui.panel_mut(hidden).unwrap().visible = false;

        ctx.clear_calls();
        let drawn = gui.render(&mut gs, &mut shaders, 750, 1334).unwrap();
        assert_eq!(drawn, 2);
        assert_eq!(ctx.draw_count(), 6);
        assert_eq!(gs.is_enabled(Capability::DepthTest), Some(false));
        assert!(ctx.count(|c| matches!(c, GlCall::Disable(Capability::CullFace))) == 1);

        gui.dispose(&mut gs);
        shaders.dispose(&mut gs);
        assert_eq!(gs.stats().buffers, 0);
    }

    #[test]
    fn empty_gui_draws_nothing() {
        let ctx = HeadlessContext::new();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));
        let mut shaders = ShaderManager::new();
        let mut gui = GuiRoot::new();
        ctx.clear_calls();
        assert_eq!(gui.render(&mut gs, &mut shaders, 10, 10).unwrap(), 0);
        assert!(ctx.calls().is_empty());
    }
}
