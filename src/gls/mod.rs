//! Graphics context state cache.
//!
//! [`GraphicsState`] owns the [`GlContext`] and keeps a shadow copy of every
//! piece of pipeline state the renderer touches. Each setter compares against
//! the shadow and only reaches the context when the value actually changes;
//! after any method returns, shadow and context agree.
//!
//! Shadows start out undefined (`None`), so the first call for each piece of
//! state always goes through. Replacing the context ([`GraphicsState::set_context`])
//! resets every shadow at once; there is no partial reset.
//!
//! # Example
//!
//! ```
//! use gles3d::gls::{Capability, GraphicsState, HeadlessContext, Primitive};
//!
//! let mut gs = GraphicsState::new(Box::new(HeadlessContext::new()));
//! let before = gs.stats();
//!
//! gs.enable(Capability::ScissorTest);
//! gs.enable(Capability::ScissorTest); // absorbed, counted as a hit
//! gs.set_viewport(0, 0, 800, 600);
//! gs.draw_arrays(Primitive::Triangles, 0, 3);
//! gs.draw_arrays(Primitive::Triangles, 0, 3);
//!
//! let delta = gs.stats().since(&before);
//! assert_eq!(delta.cap_hits, 1);
//! assert_eq!(delta.draw_calls, 2);
//! ```

mod context;
#[cfg(feature = "glow")]
mod glow_backend;
mod headless;
mod program;
mod stats;
mod uniform;

pub use context::*;
#[cfg(feature = "glow")]
pub use glow_backend::GlowContext;
pub use headless::{GlCall, HeadlessContext};
pub use program::{ATTRIBUTE_LOCATIONS, Program};
pub use stats::Stats;
pub use uniform::{Lookup, UniformRegistry};

use std::collections::{HashMap, HashSet};

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use log::{Level, debug, info, log};

use crate::color::Color;
use crate::error::{RenderError, Result};
use stats::release;

/// A viewport or scissor rectangle in window pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Separate RGB/alpha blend factors, compared and stored as one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BlendFuncState {
    src_rgb: BlendFactor,
    dst_rgb: BlendFactor,
    src_alpha: BlendFactor,
    dst_alpha: BlendFactor,
}

/// Upper bound on error codes drained after a single call.
const MAX_DRAINED_ERRORS: usize = 8;
/// Context errors are reported, not fatal.
const CONTEXT_ERROR_LEVEL: Level = Level::Warn;

/// Caching wrapper around a [`GlContext`].
pub struct GraphicsState {
    ctx: Box<dyn GlContext>,
    generation: u64,
    check_errors: bool,
    stats: Stats,
    uniforms: UniformRegistry,
    seen_programs: HashSet<ProgramId>,

    capabilities: HashMap<Capability, bool>,
    active_texture: Option<u32>,
    bound_textures: HashMap<u32, Option<TextureId>>,
    vertex_array: Option<Option<VertexArrayId>>,
    viewport: Option<Viewport>,
    scissor: Option<Viewport>,
    clear_color: Option<[f32; 4]>,
    line_width: Option<f32>,
    front_face: Option<FrontFace>,
    cull_face: Option<CullMode>,
    depth_func: Option<DepthFunc>,
    depth_mask: Option<bool>,
    blend_equation: Option<(BlendEquation, BlendEquation)>,
    blend_func: Option<BlendFuncState>,
    polygon_offset: Option<(f32, f32)>,
    program: Option<ProgramId>,
}

impl GraphicsState {
    /// Wraps `ctx` and applies the default pipeline state.
    pub fn new(ctx: Box<dyn GlContext>) -> Self {
        let mut state = Self {
            ctx,
            generation: 0,
            check_errors: false,
            stats: Stats::default(),
            uniforms: UniformRegistry::new(),
            seen_programs: HashSet::new(),
            capabilities: HashMap::new(),
            active_texture: None,
            bound_textures: HashMap::new(),
            vertex_array: None,
            viewport: None,
            scissor: None,
            clear_color: None,
            line_width: None,
            front_face: None,
            cull_face: None,
            depth_func: None,
            depth_mask: None,
            blend_equation: None,
            blend_func: None,
            polygon_offset: None,
            program: None,
        };
        info!("graphics context: {}", state.ctx.get_string(StringName::Version));
        state.set_default_state();
        state
    }

    /// Replaces the context after it was lost and re-acquired.
    ///
    /// Every shadow returns to undefined, memoized uniform locations are
    /// dropped and live object counts restart from zero (objects of the old
    /// context are gone). The generation number changes so lazily uploaded
    /// resources know to upload again.
    pub fn set_context(&mut self, ctx: Box<dyn GlContext>) {
        self.ctx = ctx;
        self.generation += 1;
        self.uniforms.clear();
        self.seen_programs.clear();
        self.stats.shaders = 0;
        self.stats.vaos = 0;
        self.stats.buffers = 0;
        self.stats.textures = 0;
        info!(
            "graphics context replaced (generation {}): {}",
            self.generation,
            self.ctx.get_string(StringName::Version)
        );
        self.set_default_state();
    }

    /// Increments whenever the underlying context is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Direct access to the context for calls that carry no cached state.
    pub(crate) fn raw(&self) -> &dyn GlContext {
        self.ctx.as_ref()
    }

    pub fn gl_version(&self) -> String {
        self.ctx.get_string(StringName::Version)
    }

    /// Marks every shadow undefined so the next call of each kind reaches the context.
    pub fn reset(&mut self) {
        self.capabilities.clear();
        self.active_texture = None;
        self.bound_textures.clear();
        self.vertex_array = None;
        self.viewport = None;
        self.scissor = None;
        self.clear_color = None;
        self.line_width = None;
        self.front_face = None;
        self.cull_face = None;
        self.depth_func = None;
        self.depth_mask = None;
        self.blend_equation = None;
        self.blend_func = None;
        self.polygon_offset = None;
        self.program = None;
    }

    /// Resets the shadows and applies the engine's baseline pipeline state.
    pub fn set_default_state(&mut self) {
        self.reset();
        self.set_clear_color(Color::BLACK);
        self.enable(Capability::DepthTest);
        self.set_depth_func(DepthFunc::LessEqual);
        self.set_depth_mask(true);
        self.set_front_face(FrontFace::Ccw);
        self.set_cull_face(CullMode::Back);
        self.enable(Capability::CullFace);
        self.enable(Capability::Blend);
        self.set_blend_equation(BlendEquation::Add);
        self.set_blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        self.enable(Capability::PolygonOffsetFill);
    }

    /// Enables draining and logging of context errors after every real call.
    pub fn set_check_errors(&mut self, enabled: bool) {
        self.check_errors = enabled;
    }

    pub fn check_errors(&self) -> bool {
        self.check_errors
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> Stats {
        self.stats
    }

    fn check(&self, op: &str) {
        if !self.check_errors {
            return;
        }
        for _ in 0..MAX_DRAINED_ERRORS {
            let code = self.ctx.get_error();
            if code == 0 {
                return;
            }
            log!(CONTEXT_ERROR_LEVEL, "graphics error 0x{code:04x} after {op}");
        }
    }

    // ========================================================================
    // Capabilities and fixed-function state
    // ========================================================================

    pub fn enable(&mut self, cap: Capability) {
        if self.capabilities.get(&cap) == Some(&true) {
            self.stats.cap_hits += 1;
            return;
        }
        self.ctx.enable(cap);
        self.check("enable");
        self.capabilities.insert(cap, true);
    }

    pub fn disable(&mut self, cap: Capability) {
        if self.capabilities.get(&cap) == Some(&false) {
            self.stats.cap_hits += 1;
            return;
        }
        self.ctx.disable(cap);
        self.check("disable");
        self.capabilities.insert(cap, false);
    }

    /// Cached capability state, `None` while undefined.
    pub fn is_enabled(&self, cap: Capability) -> Option<bool> {
        self.capabilities.get(&cap).copied()
    }

    pub fn set_clear_color(&mut self, color: Color) {
        let rgba = color.to_array();
        if self.clear_color == Some(rgba) {
            return;
        }
        self.ctx.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
        self.check("clear_color");
        self.clear_color = Some(rgba);
    }

    /// Clears the selected buffers. Never cached.
    pub fn clear(&mut self, mask: ClearMask) {
        self.ctx.clear(mask);
        self.check("clear");
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let vp = Viewport {
            x,
            y,
            width,
            height,
        };
        if self.viewport == Some(vp) {
            return;
        }
        self.ctx.viewport(x, y, width, height);
        self.check("viewport");
        self.viewport = Some(vp);
    }

    /// The viewport last set, `None` while undefined.
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let rect = Viewport {
            x,
            y,
            width,
            height,
        };
        if self.scissor == Some(rect) {
            return;
        }
        self.ctx.scissor(x, y, width, height);
        self.check("scissor");
        self.scissor = Some(rect);
    }

    pub fn set_line_width(&mut self, width: f32) {
        if self.line_width == Some(width) {
            return;
        }
        self.ctx.line_width(width);
        self.check("line_width");
        self.line_width = Some(width);
    }

    pub fn set_front_face(&mut self, face: FrontFace) {
        if self.front_face == Some(face) {
            return;
        }
        self.ctx.front_face(face);
        self.check("front_face");
        self.front_face = Some(face);
    }

    pub fn set_cull_face(&mut self, mode: CullMode) {
        if self.cull_face == Some(mode) {
            return;
        }
        self.ctx.cull_face(mode);
        self.check("cull_face");
        self.cull_face = Some(mode);
    }

    pub fn set_depth_func(&mut self, func: DepthFunc) {
        if self.depth_func == Some(func) {
            return;
        }
        self.ctx.depth_func(func);
        self.check("depth_func");
        self.depth_func = Some(func);
    }

    pub fn set_depth_mask(&mut self, write: bool) {
        if self.depth_mask == Some(write) {
            return;
        }
        self.ctx.depth_mask(write);
        self.check("depth_mask");
        self.depth_mask = Some(write);
    }

    /// Same equation for RGB and alpha.
    pub fn set_blend_equation(&mut self, mode: BlendEquation) {
        if self.blend_equation == Some((mode, mode)) {
            return;
        }
        self.ctx.blend_equation(mode);
        self.check("blend_equation");
        self.blend_equation = Some((mode, mode));
    }

    pub fn set_blend_equation_separate(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        if self.blend_equation == Some((rgb, alpha)) {
            return;
        }
        self.ctx.blend_equation_separate(rgb, alpha);
        self.check("blend_equation_separate");
        self.blend_equation = Some((rgb, alpha));
    }

    /// Same factors for RGB and alpha.
    pub fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        let wanted = BlendFuncState {
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        };
        if self.blend_func == Some(wanted) {
            return;
        }
        self.ctx.blend_func(src, dst);
        self.check("blend_func");
        self.blend_func = Some(wanted);
    }

    pub fn set_blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        let wanted = BlendFuncState {
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        };
        if self.blend_func == Some(wanted) {
            return;
        }
        self.ctx
            .blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
        self.check("blend_func_separate");
        self.blend_func = Some(wanted);
    }

    pub fn set_polygon_offset(&mut self, factor: f32, units: f32) {
        if self.polygon_offset == Some((factor, units)) {
            return;
        }
        self.ctx.polygon_offset(factor, units);
        self.check("polygon_offset");
        self.polygon_offset = Some((factor, units));
    }

    // ========================================================================
    // Programs and uniforms
    // ========================================================================

    pub fn create_program(&mut self) -> Result<ProgramId> {
        let id = self.ctx.create_program().map_err(RenderError::Context)?;
        self.check("create_program");
        Ok(id)
    }

    /// Deletes `program` and forgets everything cached about it.
    pub fn delete_program(&mut self, program: ProgramId) {
        self.ctx.delete_program(program);
        self.check("delete_program");
        self.uniforms.forget(program);
        if self.seen_programs.remove(&program) {
            release(&mut self.stats.shaders, "program");
        }
        if self.program == Some(program) {
            // The name may be recycled; force the next use through.
            self.program = None;
        }
    }

    /// Makes `program` current. Returns `true` when the context was actually switched.
    ///
    /// # Panics
    ///
    /// Panics on the null program. The current-program shadow is left untouched.
    pub fn use_program(&mut self, program: ProgramId) -> bool {
        assert!(
            !program.is_null(),
            "use_program called with the null program handle"
        );
        if self.program == Some(program) {
            return false;
        }
        self.ctx.use_program(Some(program));
        self.check("use_program");
        self.program = Some(program);
        if self.seen_programs.insert(program) {
            self.stats.shaders += 1;
            debug!("new program activated, total: {}", self.stats.shaders);
        }
        true
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Location of `name` in `program`, memoized after the first lookup.
    pub fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        match self.uniforms.lookup(program, name) {
            Lookup::Hit(loc) => {
                self.stats.uniloc_hits += 1;
                loc
            }
            Lookup::Miss => {
                let loc = self.ctx.get_uniform_location(program, name);
                self.stats.uniloc_misses += 1;
                self.uniforms.store(program, name, loc);
                loc
            }
        }
    }

    /// Location of `name` in the current program.
    pub fn uniform(&mut self, name: &str) -> Option<UniformLocation> {
        let program = self.program?;
        self.uniform_location(program, name)
    }

    pub fn set_uniform_i32(&mut self, loc: UniformLocation, x: i32) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_1i(loc, x);
        self.check("uniform_1i");
    }

    pub fn set_uniform_f32(&mut self, loc: UniformLocation, x: f32) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_1f(loc, x);
        self.check("uniform_1f");
    }

    pub fn set_uniform_vec2(&mut self, loc: UniformLocation, v: Vec2) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_2f(loc, v.x, v.y);
        self.check("uniform_2f");
    }

    pub fn set_uniform_vec3(&mut self, loc: UniformLocation, v: Vec3) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_3f(loc, v.x, v.y, v.z);
        self.check("uniform_3f");
    }

    pub fn set_uniform_vec4(&mut self, loc: UniformLocation, v: Vec4) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_4f(loc, v.x, v.y, v.z, v.w);
        self.check("uniform_4f");
    }

    pub fn set_uniform_f32_array(&mut self, loc: UniformLocation, values: &[f32]) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_1fv(loc, values);
        self.check("uniform_1fv");
    }

    pub fn set_uniform_vec3_array(&mut self, loc: UniformLocation, values: &[Vec3]) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_3fv(loc, bytemuck::cast_slice(values));
        self.check("uniform_3fv");
    }

    pub fn set_uniform_mat3(&mut self, loc: UniformLocation, m: &Mat3) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_matrix3fv(loc, &m.to_cols_array());
        self.check("uniform_matrix3fv");
    }

    pub fn set_uniform_mat4(&mut self, loc: UniformLocation, m: &Mat4) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_matrix4fv(loc, &m.to_cols_array());
        self.check("uniform_matrix4fv");
    }

    /// Uploads a whole matrix array with a single call.
    pub fn set_uniform_mat4_array(&mut self, loc: UniformLocation, mats: &[Mat4]) {
        self.stats.uniform_sets += 1;
        self.ctx.uniform_matrix4fv(loc, bytemuck::cast_slice(mats));
        self.check("uniform_matrix4fv");
    }

    // ========================================================================
    // Buffers and vertex arrays
    // ========================================================================

    pub fn create_buffer(&mut self) -> Result<BufferId> {
        let id = self.ctx.create_buffer().map_err(RenderError::Context)?;
        self.check("create_buffer");
        self.stats.buffers += 1;
        Ok(id)
    }

    pub fn delete_buffer(&mut self, buffer: BufferId) {
        self.ctx.delete_buffer(buffer);
        self.check("delete_buffer");
        release(&mut self.stats.buffers, "buffer");
    }

    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>) {
        self.ctx.bind_buffer(target, buffer);
        self.check("bind_buffer");
    }

    pub fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.ctx.buffer_data(target, data, usage);
        self.check("buffer_data");
    }

    pub fn create_vertex_array(&mut self) -> Result<VertexArrayId> {
        let id = self
            .ctx
            .create_vertex_array()
            .map_err(RenderError::Context)?;
        self.check("create_vertex_array");
        self.stats.vaos += 1;
        Ok(id)
    }

    pub fn delete_vertex_array(&mut self, vao: VertexArrayId) {
        self.ctx.delete_vertex_array(vao);
        self.check("delete_vertex_array");
        release(&mut self.stats.vaos, "vertex array");
        // Deleting the bound array reverts the binding to zero.
        if self.vertex_array == Some(Some(vao)) {
            self.vertex_array = Some(None);
        }
    }

    pub fn bind_vertex_array(&mut self, vao: Option<VertexArrayId>) {
        if self.vertex_array == Some(vao) {
            return;
        }
        self.ctx.bind_vertex_array(vao);
        self.check("bind_vertex_array");
        self.vertex_array = Some(vao);
    }

    pub fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.ctx.enable_vertex_attrib_array(index);
        self.check("enable_vertex_attrib_array");
    }

    pub fn vertex_attrib_pointer_f32(&mut self, index: u32, size: i32, stride: i32, offset: i32) {
        self.ctx.vertex_attrib_pointer_f32(index, size, stride, offset);
        self.check("vertex_attrib_pointer");
    }

    // ========================================================================
    // Textures
    // ========================================================================

    pub fn create_texture(&mut self) -> Result<TextureId> {
        let id = self.ctx.create_texture().map_err(RenderError::Context)?;
        self.check("create_texture");
        self.stats.textures += 1;
        Ok(id)
    }

    pub fn delete_texture(&mut self, texture: TextureId) {
        self.ctx.delete_texture(texture);
        self.check("delete_texture");
        release(&mut self.stats.textures, "texture");
        for bound in self.bound_textures.values_mut() {
            if *bound == Some(texture) {
                *bound = None;
            }
        }
    }

    pub fn active_texture(&mut self, unit: u32) {
        if self.active_texture == Some(unit) {
            return;
        }
        self.ctx.active_texture(unit);
        self.check("active_texture");
        self.active_texture = Some(unit);
    }

    /// Binds a 2D texture on the active unit.
    pub fn bind_texture_2d(&mut self, texture: Option<TextureId>) {
        match self.active_texture {
            Some(unit) if self.bound_textures.get(&unit) == Some(&texture) => {}
            Some(unit) => {
                self.ctx.bind_texture(TextureTarget::Texture2D, texture);
                self.check("bind_texture");
                self.bound_textures.insert(unit, texture);
            }
            None => {
                // Unknown unit: nothing to record the binding against.
                self.ctx.bind_texture(TextureTarget::Texture2D, texture);
                self.check("bind_texture");
            }
        }
    }

    pub fn tex_image_2d_rgba(&mut self, width: u32, height: u32, pixels: &[u8]) {
        self.ctx.tex_image_2d_rgba(
            TextureTarget::Texture2D,
            width as i32,
            height as i32,
            pixels,
        );
        self.check("tex_image_2d");
    }

    pub fn tex_parameter(&mut self, param: TextureParam) {
        self.ctx.tex_parameter(TextureTarget::Texture2D, param);
        self.check("tex_parameter");
    }

    pub fn generate_mipmap(&mut self) {
        self.ctx.generate_mipmap(TextureTarget::Texture2D);
        self.check("generate_mipmap");
    }

    // ========================================================================
    // Draw calls
    // ========================================================================

    /// Non-indexed draw. Always issued and counted.
    pub fn draw_arrays(&mut self, mode: Primitive, first: i32, count: i32) {
        self.ctx.draw_arrays(mode, first, count);
        self.check("draw_arrays");
        self.stats.draw_calls += 1;
    }

    /// Indexed draw from the bound element buffer. Always issued and counted.
    pub fn draw_elements(&mut self, mode: Primitive, count: i32, index_type: IndexType, offset: i32) {
        self.ctx.draw_elements(mode, count, index_type, offset);
        self.check("draw_elements");
        self.stats.draw_calls += 1;
    }
}
