//! Scene lights and their per-frame uniform upload.
//!
//! Lights are attached to nodes: a point light shines from its node's world
//! position, a directional light along its node's forward (-Z) axis. Lit
//! shaders work in view space, so [`LightSet::collect`] transforms everything
//! by the camera's view matrix once per frame.

use std::collections::HashSet;

use glam::{Mat4, Vec3};
use log::warn;

use crate::color::Color;
use crate::gls::{GraphicsState, ProgramId};
use crate::scene::{NodeId, NodeTree};

pub const MAX_DIR_LIGHTS: usize = 4;
pub const MAX_POINT_LIGHTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Light {
    /// Uniform light reaching every surface.
    Ambient { color: Color, intensity: f32 },
    Directional { color: Color, intensity: f32 },
    /// `decay` is the quadratic attenuation factor.
    Point { color: Color, intensity: f32, decay: f32 },
}

impl Light {
    pub fn ambient(color: Color, intensity: f32) -> Self {
        Light::Ambient { color, intensity }
    }

    pub fn directional(color: Color, intensity: f32) -> Self {
        Light::Directional { color, intensity }
    }

    pub fn point(color: Color, intensity: f32) -> Self {
        Light::Point {
            color,
            intensity,
            decay: 1.0,
        }
    }
}

/// Lights gathered for one frame, ready for upload.
#[derive(Debug, Default)]
pub struct LightSet {
    ambient: Vec3,
    dir_color: Vec<Vec3>,
    dir_direction: Vec<Vec3>,
    point_color: Vec<Vec3>,
    point_position: Vec<Vec3>,
    point_decay: Vec<f32>,
    uploaded: HashSet<ProgramId>,
    overflow_warned: bool,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the set from visible lights.
    pub fn collect<'a>(
        &mut self,
        nodes: &NodeTree,
        lights: impl IntoIterator<Item = (NodeId, &'a Light)>,
        view: &Mat4,
    ) {
        self.ambient = Vec3::ZERO;
        self.dir_color.clear();
        self.dir_direction.clear();
        self.point_color.clear();
        self.point_position.clear();
        self.point_decay.clear();
        self.uploaded.clear();

        let mut dropped = 0;
        for (node, light) in lights {
            if !nodes.is_visible_in_hierarchy(node) {
                continue;
            }
            match *light {
                Light::Ambient { color, intensity } => {
                    self.ambient += color.scaled_rgb(intensity);
                }
                Light::Directional { color, intensity } => {
                    if self.dir_color.len() == MAX_DIR_LIGHTS {
                        dropped += 1;
                        continue;
                    }
                    let direction = view.transform_vector3(nodes.world_direction(node));
                    self.dir_color.push(color.scaled_rgb(intensity));
                    self.dir_direction.push(direction.normalize_or_zero());
                }
                Light::Point {
                    color,
                    intensity,
                    decay,
                } => {
                    if self.point_color.len() == MAX_POINT_LIGHTS {
                        dropped += 1;
                        continue;
                    }
                    self.point_color.push(color.scaled_rgb(intensity));
                    self.point_position
                        .push(view.transform_point3(nodes.world_position(node)));
                    self.point_decay.push(decay);
                }
            }
        }
        if dropped > 0 && !self.overflow_warned {
            warn!("{dropped} lights over the per-frame limit were ignored");
            self.overflow_warned = true;
        }
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn directional_count(&self) -> usize {
        self.dir_color.len()
    }

    pub fn point_count(&self) -> usize {
        self.point_color.len()
    }

    /// Uploads light uniforms to `program` (which must be current), once per frame.
    ///
    /// Returns `false` when the program already received this frame's lights.
    pub fn upload(&mut self, state: &mut GraphicsState, program: ProgramId) -> bool {
        if !self.uploaded.insert(program) {
            return false;
        }
        if let Some(loc) = state.uniform("AmbientLightColor") {
            state.set_uniform_vec3(loc, self.ambient);
        }
        if let Some(loc) = state.uniform("DirLightCount") {
            state.set_uniform_i32(loc, self.dir_color.len() as i32);
        }
        if let Some(loc) = state.uniform("PointLightCount") {
            state.set_uniform_i32(loc, self.point_color.len() as i32);
        }
        for (name, values) in [
            ("DirLightColor", &self.dir_color),
            ("DirLightDirection", &self.dir_direction),
            ("PointLightColor", &self.point_color),
            ("PointLightPosition", &self.point_position),
        ] {
            if values.is_empty() {
                continue;
            }
            if let Some(loc) = state.uniform(name) {
                state.set_uniform_vec3_array(loc, values);
            }
        }
        if !self.point_decay.is_empty()
            && let Some(loc) = state.uniform("PointLightDecay")
        {
            state.set_uniform_f32_array(loc, &self.point_decay);
        }
        true
    }
}
