//! Surface appearance and the pipeline state that goes with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::color::Color;
use crate::error::Result;
use crate::gls::{BlendEquation, BlendFactor, Capability, CullMode, GraphicsState};
use crate::texture::Texture2D;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Shading model, selecting the shader a material renders with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaterialKind {
    /// Unlit flat color (optionally textured).
    Basic,
    /// Blinn-Phong lit surface.
    Standard {
        emissive: Color,
        specular: Color,
        shininess: f32,
    },
    /// Screen-space sized points.
    Point { size: f32 },
}

/// Which triangle faces are drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Blending {
    None,
    /// Standard alpha blending.
    #[default]
    Normal,
    Additive,
    Custom {
        equation_rgb: BlendEquation,
        equation_alpha: BlendEquation,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    },
}

#[derive(Clone, Debug)]
pub struct Material {
    id: u64,
    pub kind: MaterialKind,
    pub color: Color,
    pub texture: Option<Arc<Texture2D>>,
    pub side: Side,
    pub blending: Blending,
    pub depth_test: bool,
    pub depth_write: bool,
    pub line_width: f32,
    /// `(factor, units)`; both zero disables polygon offset.
    pub polygon_offset: (f32, f32),
    /// Forces back-to-front sorting even when the color is opaque.
    pub transparent: bool,
}

impl Material {
    fn with_kind(kind: MaterialKind, color: Color) -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            color,
            texture: None,
            side: Side::Front,
            blending: Blending::Normal,
            depth_test: true,
            depth_write: true,
            line_width: 1.0,
            polygon_offset: (0.0, 0.0),
            transparent: false,
        }
    }

    pub fn basic(color: Color) -> Self {
        Self::with_kind(MaterialKind::Basic, color)
    }

    pub fn standard(color: Color) -> Self {
        Self::with_kind(
            MaterialKind::Standard {
                emissive: Color::BLACK,
                specular: Color::rgb(0.5, 0.5, 0.5),
                shininess: 30.0,
            },
            color,
        )
    }

    pub fn point(color: Color, size: f32) -> Self {
        Self::with_kind(MaterialKind::Point { size }, color)
    }

    pub fn texture(mut self, texture: Arc<Texture2D>) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn blending(mut self, blending: Blending) -> Self {
        self.blending = blending;
        self
    }

    pub fn depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    pub fn line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    pub fn polygon_offset(mut self, factor: f32, units: f32) -> Self {
        self.polygon_offset = (factor, units);
        self
    }

    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Process-unique id, used to group draws by material.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shader_name(&self) -> &'static str {
        match self.kind {
            MaterialKind::Basic => "basic",
            MaterialKind::Standard { .. } => "standard",
            MaterialKind::Point { .. } => "point",
        }
    }

    /// Whether the shader consumes scene lights.
    pub fn is_lit(&self) -> bool {
        matches!(self.kind, MaterialKind::Standard { .. })
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent || self.color.a < 1.0
    }

    /// Pushes pipeline state and material uniforms for the current program.
    pub fn render_setup(&self, state: &mut GraphicsState) -> Result<()> {
        match self.side {
            Side::Front => {
                state.enable(Capability::CullFace);
                state.set_cull_face(CullMode::Back);
            }
            Side::Back => {
                state.enable(Capability::CullFace);
                state.set_cull_face(CullMode::Front);
            }
            Side::Double => state.disable(Capability::CullFace),
        }

        if self.depth_test {
            state.enable(Capability::DepthTest);
        } else {
            state.disable(Capability::DepthTest);
        }
        state.set_depth_mask(self.depth_write);
        state.set_line_width(self.line_width);

        let (factor, units) = self.polygon_offset;
        if factor != 0.0 || units != 0.0 {
            state.enable(Capability::PolygonOffsetFill);
            state.set_polygon_offset(factor, units);
        } else {
            state.disable(Capability::PolygonOffsetFill);
        }

        self.apply_blending(state);

        if let Some(loc) = state.uniform("MatColor") {
            state.set_uniform_vec4(loc, self.color.to_vec4());
        }
        match self.kind {
            MaterialKind::Basic => {}
            MaterialKind::Standard {
                emissive,
                specular,
                shininess,
            } => {
                if let Some(loc) = state.uniform("MatEmissive") {
                    state.set_uniform_vec3(loc, emissive.to_vec3());
                }
                if let Some(loc) = state.uniform("MatSpecular") {
                    state.set_uniform_vec3(loc, specular.to_vec3());
                }
                if let Some(loc) = state.uniform("MatShininess") {
                    state.set_uniform_f32(loc, shininess);
                }
            }
            MaterialKind::Point { size } => {
                if let Some(loc) = state.uniform("MatPointSize") {
                    state.set_uniform_f32(loc, size);
                }
            }
        }

        let textured = match &self.texture {
            Some(texture) => {
                texture.bind(state, 0)?;
                if let Some(loc) = state.uniform("MatTexture") {
                    state.set_uniform_i32(loc, 0);
                }
                true
            }
            None => false,
        };
        if let Some(loc) = state.uniform("UseTexture") {
            state.set_uniform_i32(loc, i32::from(textured));
        }
        Ok(())
    }

    fn apply_blending(&self, state: &mut GraphicsState) {
        match self.blending {
            Blending::None => state.disable(Capability::Blend),
            Blending::Normal => {
                state.enable(Capability::Blend);
                state.set_blend_equation(BlendEquation::Add);
                state.set_blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
            }
            Blending::Additive => {
                state.enable(Capability::Blend);
                state.set_blend_equation(BlendEquation::Add);
                state.set_blend_func(BlendFactor::SrcAlpha, BlendFactor::One);
            }
            Blending::Custom {
                equation_rgb,
                equation_alpha,
                src_rgb,
                dst_rgb,
                src_alpha,
                dst_alpha,
            } => {
                state.enable(Capability::Blend);
                state.set_blend_equation_separate(equation_rgb, equation_alpha);
                state.set_blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gls::{GlCall, HeadlessContext, Program};

    const VS: &str = "in vec3 VertexPosition;\nuniform mat4 MVP;\nvoid main() {}";
    const FS: &str = "uniform vec4 MatColor;\nuniform int UseTexture;\nuniform sampler2D MatTexture;\nvoid main() {}";

    fn setup() -> (HeadlessContext, GraphicsState) {
        let ctx = HeadlessContext::new();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));
        let program = Program::build(&mut gs, "basic", VS, FS).unwrap();
        gs.use_program(program.id());
        ctx.clear_calls();
        (ctx, gs)
    }

    #[test]
    fn ids_are_unique() {
        let a = Material::basic(Color::WHITE);
        let b = Material::basic(Color::WHITE);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn shader_follows_kind() {
        assert_eq!(Material::basic(Color::RED).shader_name(), "basic");
        assert_eq!(Material::standard(Color::RED).shader_name(), "standard");
        assert_eq!(Material::point(Color::RED, 4.0).shader_name(), "point");
        assert!(Material::standard(Color::RED).is_lit());
    }

    #[test]
    fn translucent_color_counts_as_transparent() {
        assert!(Material::basic(Color::WHITE.with_alpha(0.5)).is_transparent());
        assert!(!Material::basic(Color::WHITE).is_transparent());
    }

    #[test]
    fn repeated_setup_only_sets_uniforms() {
        let (ctx, mut gs) = setup();
        let mat = Material::basic(Color::RED).side(Side::Double);
        mat.render_setup(&mut gs).unwrap();
        let first = ctx.calls().len();
        ctx.clear_calls();

        mat.render_setup(&mut gs).unwrap();
        let calls = ctx.calls();
        assert!(calls.len() < first);
        assert!(calls.iter().all(|c| matches!(c, GlCall::Uniform { .. })));
    }

    #[test]
    fn double_sided_disables_culling() {
        let (ctx, mut gs) = setup();
        Material::basic(Color::RED)
            .side(Side::Double)
            .render_setup(&mut gs)
            .unwrap();
        assert_eq!(gs.is_enabled(Capability::CullFace), Some(false));
        assert_eq!(ctx.count(|c| *c == GlCall::Disable(Capability::CullFace)), 1);
    }

    #[test]
    fn texture_is_bound_on_unit_zero() {
        let (ctx, mut gs) = setup();
        let tex = Arc::new(Texture2D::solid([255, 0, 0, 255]));
        Material::basic(Color::WHITE)
            .texture(tex.clone())
            .render_setup(&mut gs)
            .unwrap();
        assert!(tex.is_uploaded());
        assert_eq!(ctx.count(|c| matches!(c, GlCall::ActiveTexture(0))), 1);
    }
}
