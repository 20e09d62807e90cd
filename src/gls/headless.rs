//! A recording [`GlContext`] that needs no GPU.
//!
//! `HeadlessContext` hands out non-zero object names, remembers shader sources
//! and discovers uniforms by scanning them, and appends every call it receives
//! to a log. It is cheap to clone: clones share the same log, so a test can
//! give one clone to a [`GraphicsState`](crate::gls::GraphicsState) and keep
//! another to inspect what actually reached the "driver".
//!
//! ```
//! use gles3d::gls::{Capability, GlCall, GraphicsState, HeadlessContext};
//!
//! let ctx = HeadlessContext::new();
//! let mut gs = GraphicsState::new(Box::new(ctx.clone()));
//! ctx.clear_calls();
//!
//! gs.enable(Capability::ScissorTest);
//! gs.enable(Capability::ScissorTest);
//! assert_eq!(ctx.count(|c| matches!(c, GlCall::Enable(Capability::ScissorTest))), 1);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::context::*;

/// One call received by a [`HeadlessContext`].
#[derive(Clone, Debug, PartialEq)]
pub enum GlCall {
    Clear(ClearMask),
    ClearColor([f32; 4]),
    Enable(Capability),
    Disable(Capability),
    Viewport(i32, i32, i32, i32),
    Scissor(i32, i32, i32, i32),
    LineWidth(f32),
    FrontFace(FrontFace),
    CullFace(CullMode),
    DepthFunc(DepthFunc),
    DepthMask(bool),
    BlendEquation(BlendEquation),
    BlendEquationSeparate(BlendEquation, BlendEquation),
    BlendFunc(BlendFactor, BlendFactor),
    BlendFuncSeparate(BlendFactor, BlendFactor, BlendFactor, BlendFactor),
    PolygonOffset(f32, f32),
    CreateBuffer(BufferId),
    DeleteBuffer(BufferId),
    BindBuffer(BufferTarget, Option<BufferId>),
    BufferData { target: BufferTarget, len: usize },
    CreateVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    EnableVertexAttribArray(u32),
    VertexAttribPointer { index: u32, size: i32, stride: i32, offset: i32 },
    CreateTexture(TextureId),
    DeleteTexture(TextureId),
    ActiveTexture(u32),
    BindTexture(TextureTarget, Option<TextureId>),
    TexImage2d { width: i32, height: i32 },
    TexParameter(TextureParam),
    GenerateMipmap,
    CreateShader(ShaderId, ShaderKind),
    CompileShader(ShaderId),
    DeleteShader(ShaderId),
    CreateProgram(ProgramId),
    AttachShader(ProgramId, ShaderId),
    DetachShader(ProgramId, ShaderId),
    BindAttribLocation(ProgramId, u32, String),
    LinkProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    DeleteProgram(ProgramId),
    GetUniformLocation(ProgramId, String),
    Uniform { location: UniformLocation, values: usize },
    UniformMatrix { location: UniformLocation, values: usize },
    DrawArrays { mode: Primitive, first: i32, count: i32 },
    DrawElements { mode: Primitive, count: i32, index_type: IndexType, offset: i32 },
}

impl GlCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, GlCall::DrawArrays { .. } | GlCall::DrawElements { .. })
    }
}

#[derive(Debug, Default)]
struct ProgramRecord {
    shaders: Vec<ShaderId>,
    linked: bool,
    uniforms: HashMap<String, UniformLocation>,
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<GlCall>,
    next_name: u32,
    shaders: HashMap<ShaderId, (ShaderKind, String, bool)>,
    programs: HashMap<ProgramId, ProgramRecord>,
    fail_compile: Option<String>,
    fail_link: bool,
    errors: VecDeque<u32>,
}

impl Recorder {
    fn name(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }
}

/// Recording context for tests and headless runs.
#[derive(Clone, Debug, Default)]
pub struct HeadlessContext {
    inner: Rc<RefCell<Recorder>>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<GlCall> {
        self.inner.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    /// Counts recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.inner.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn draw_count(&self) -> usize {
        self.count(GlCall::is_draw)
    }

    /// Makes every shader whose source contains `needle` fail to compile.
    pub fn fail_compilation_containing(&self, needle: impl Into<String>) {
        self.inner.borrow_mut().fail_compile = Some(needle.into());
    }

    /// Makes the next link attempt fail.
    pub fn fail_next_link(&self) {
        self.inner.borrow_mut().fail_link = true;
    }

    /// Queues an error code for [`GlContext::get_error`] to report.
    pub fn push_error(&self, code: u32) {
        self.inner.borrow_mut().errors.push_back(code);
    }

    /// Number of live program objects.
    pub fn live_programs(&self) -> usize {
        self.inner.borrow().programs.len()
    }

    fn record(&self, call: GlCall) {
        self.inner.borrow_mut().calls.push(call);
    }
}

/// Extracts uniform names from GLSL source, dropping array suffixes.
fn scan_uniforms(source: &str) -> impl Iterator<Item = &str> {
    source.lines().filter_map(|line| {
        let line = line.trim();
        if !line.starts_with("uniform ") {
            return None;
        }
        let decl = line.split(';').next()?;
        let last = decl.split_whitespace().last()?;
        Some(last.split('[').next().unwrap_or(last))
    })
}

impl GlContext for HeadlessContext {
    fn get_string(&self, name: StringName) -> String {
        match name {
            StringName::Vendor => "gles3d".into(),
            StringName::Renderer => "headless".into(),
            StringName::Version => "OpenGL ES 3.0 (headless)".into(),
            StringName::ShadingLanguageVersion => "OpenGL ES GLSL ES 3.00".into(),
        }
    }

    fn get_error(&self) -> u32 {
        self.inner.borrow_mut().errors.pop_front().unwrap_or(0)
    }

    fn clear(&self, mask: ClearMask) {
        self.record(GlCall::Clear(mask));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::ClearColor([r, g, b, a]));
    }

    fn enable(&self, cap: Capability) {
        self.record(GlCall::Enable(cap));
    }

    fn disable(&self, cap: Capability) {
        self.record(GlCall::Disable(cap));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport(x, y, width, height));
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Scissor(x, y, width, height));
    }

    fn line_width(&self, width: f32) {
        self.record(GlCall::LineWidth(width));
    }

    fn front_face(&self, face: FrontFace) {
        self.record(GlCall::FrontFace(face));
    }

    fn cull_face(&self, mode: CullMode) {
        self.record(GlCall::CullFace(mode));
    }

    fn depth_func(&self, func: DepthFunc) {
        self.record(GlCall::DepthFunc(func));
    }

    fn depth_mask(&self, write: bool) {
        self.record(GlCall::DepthMask(write));
    }

    fn blend_equation(&self, mode: BlendEquation) {
        self.record(GlCall::BlendEquation(mode));
    }

    fn blend_equation_separate(&self, rgb: BlendEquation, alpha: BlendEquation) {
        self.record(GlCall::BlendEquationSeparate(rgb, alpha));
    }

    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) {
        self.record(GlCall::BlendFunc(src, dst));
    }

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.record(GlCall::BlendFuncSeparate(src_rgb, dst_rgb, src_alpha, dst_alpha));
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        self.record(GlCall::PolygonOffset(factor, units));
    }

    fn create_buffer(&self) -> Result<BufferId, String> {
        let id = BufferId(self.inner.borrow_mut().name());
        self.record(GlCall::CreateBuffer(id));
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        self.record(GlCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], _usage: BufferUsage) {
        self.record(GlCall::BufferData {
            target,
            len: data.len(),
        });
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, String> {
        let id = VertexArrayId(self.inner.borrow_mut().name());
        self.record(GlCall::CreateVertexArray(id));
        Ok(id)
    }

    fn delete_vertex_array(&self, vao: VertexArrayId) {
        self.record(GlCall::DeleteVertexArray(vao));
    }

    fn bind_vertex_array(&self, vao: Option<VertexArrayId>) {
        self.record(GlCall::BindVertexArray(vao));
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            stride,
            offset,
        });
    }

    fn create_texture(&self) -> Result<TextureId, String> {
        let id = TextureId(self.inner.borrow_mut().name());
        self.record(GlCall::CreateTexture(id));
        Ok(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.record(GlCall::DeleteTexture(texture));
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<TextureId>) {
        self.record(GlCall::BindTexture(target, texture));
    }

    fn tex_image_2d_rgba(&self, _target: TextureTarget, width: i32, height: i32, _pixels: &[u8]) {
        self.record(GlCall::TexImage2d { width, height });
    }

    fn tex_parameter(&self, _target: TextureTarget, param: TextureParam) {
        self.record(GlCall::TexParameter(param));
    }

    fn generate_mipmap(&self, _target: TextureTarget) {
        self.record(GlCall::GenerateMipmap);
    }

    fn create_shader(&self, kind: ShaderKind) -> Result<ShaderId, String> {
        let mut rec = self.inner.borrow_mut();
        let id = ShaderId(rec.name());
        rec.shaders.insert(id, (kind, String::new(), false));
        rec.calls.push(GlCall::CreateShader(id, kind));
        Ok(id)
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        if let Some(entry) = self.inner.borrow_mut().shaders.get_mut(&shader) {
            entry.1 = source.to_owned();
        }
    }

    fn compile_shader(&self, shader: ShaderId) {
        let mut rec = self.inner.borrow_mut();
        let needle = rec.fail_compile.clone();
        if let Some(entry) = rec.shaders.get_mut(&shader) {
            entry.2 = needle.is_none_or(|n| !entry.1.contains(&n));
        }
        rec.calls.push(GlCall::CompileShader(shader));
    }

    fn shader_compile_status(&self, shader: ShaderId) -> bool {
        self.inner
            .borrow()
            .shaders
            .get(&shader)
            .is_some_and(|entry| entry.2)
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        if self.shader_compile_status(shader) {
            String::new()
        } else {
            "ERROR: 0:1: simulated compile failure".into()
        }
    }

    fn delete_shader(&self, shader: ShaderId) {
        // Attached stages stay readable until the program is linked, as in GL.
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&self) -> Result<ProgramId, String> {
        let mut rec = self.inner.borrow_mut();
        let id = ProgramId(rec.name());
        rec.programs.insert(id, ProgramRecord::default());
        rec.calls.push(GlCall::CreateProgram(id));
        Ok(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        let mut rec = self.inner.borrow_mut();
        if let Some(p) = rec.programs.get_mut(&program) {
            p.shaders.push(shader);
        }
        rec.calls.push(GlCall::AttachShader(program, shader));
    }

    fn detach_shader(&self, program: ProgramId, shader: ShaderId) {
        let mut rec = self.inner.borrow_mut();
        if let Some(p) = rec.programs.get_mut(&program) {
            p.shaders.retain(|s| *s != shader);
        }
        rec.calls.push(GlCall::DetachShader(program, shader));
    }

    fn bind_attrib_location(&self, program: ProgramId, index: u32, name: &str) {
        self.record(GlCall::BindAttribLocation(program, index, name.to_owned()));
    }

    fn link_program(&self, program: ProgramId) {
        let mut rec = self.inner.borrow_mut();
        let fail = std::mem::take(&mut rec.fail_link);
        let mut uniforms = HashMap::new();
        if let Some(p) = rec.programs.get(&program) {
            for shader in &p.shaders {
                if let Some((_, source, _)) = rec.shaders.get(shader) {
                    for name in scan_uniforms(source) {
                        let next = UniformLocation(uniforms.len() as u32);
                        uniforms.entry(name.to_owned()).or_insert(next);
                    }
                }
            }
        }
        if let Some(p) = rec.programs.get_mut(&program) {
            p.linked = !fail;
            p.uniforms = uniforms;
        }
        rec.calls.push(GlCall::LinkProgram(program));
    }

    fn program_link_status(&self, program: ProgramId) -> bool {
        self.inner
            .borrow()
            .programs
            .get(&program)
            .is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        if self.program_link_status(program) {
            String::new()
        } else {
            "ERROR: simulated link failure".into()
        }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.record(GlCall::UseProgram(program));
    }

    fn delete_program(&self, program: ProgramId) {
        let mut rec = self.inner.borrow_mut();
        rec.programs.remove(&program);
        rec.calls.push(GlCall::DeleteProgram(program));
    }

    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let mut rec = self.inner.borrow_mut();
        rec.calls
            .push(GlCall::GetUniformLocation(program, name.to_owned()));
        rec.programs
            .get(&program)
            .and_then(|p| p.uniforms.get(name).copied())
    }

    fn uniform_1i(&self, location: UniformLocation, _x: i32) {
        self.record(GlCall::Uniform { location, values: 1 });
    }

    fn uniform_1f(&self, location: UniformLocation, _x: f32) {
        self.record(GlCall::Uniform { location, values: 1 });
    }

    fn uniform_2f(&self, location: UniformLocation, _x: f32, _y: f32) {
        self.record(GlCall::Uniform { location, values: 2 });
    }

    fn uniform_3f(&self, location: UniformLocation, _x: f32, _y: f32, _z: f32) {
        self.record(GlCall::Uniform { location, values: 3 });
    }

    fn uniform_4f(&self, location: UniformLocation, _x: f32, _y: f32, _z: f32, _w: f32) {
        self.record(GlCall::Uniform { location, values: 4 });
    }

    fn uniform_1fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(GlCall::Uniform {
            location,
            values: values.len(),
        });
    }

    fn uniform_3fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(GlCall::Uniform {
            location,
            values: values.len(),
        });
    }

    fn uniform_4fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(GlCall::Uniform {
            location,
            values: values.len(),
        });
    }

    fn uniform_matrix3fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(GlCall::UniformMatrix {
            location,
            values: values.len(),
        });
    }

    fn uniform_matrix4fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(GlCall::UniformMatrix {
            location,
            values: values.len(),
        });
    }

    fn draw_arrays(&self, mode: Primitive, first: i32, count: i32) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&self, mode: Primitive, count: i32, index_type: IndexType, offset: i32) {
        self.record(GlCall::DrawElements {
            mode,
            count,
            index_type,
            offset,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_are_discovered_from_sources() {
        let src = "uniform mat4 MVP;\n  uniform highp vec3 DirLightColor[4];\nvoid main() {}";
        let names: Vec<_> = scan_uniforms(src).collect();
        assert_eq!(names, vec!["MVP", "DirLightColor"]);
    }

    #[test]
    fn compile_failure_is_simulated() {
        let ctx = HeadlessContext::new();
        ctx.fail_compilation_containing("broken");
        let ok = ctx.create_shader(ShaderKind::Vertex).unwrap();
        ctx.shader_source(ok, "void main() {}");
        ctx.compile_shader(ok);
        let bad = ctx.create_shader(ShaderKind::Fragment).unwrap();
        ctx.shader_source(bad, "broken");
        ctx.compile_shader(bad);

        assert!(ctx.shader_compile_status(ok));
        assert!(!ctx.shader_compile_status(bad));
        assert!(!ctx.shader_info_log(bad).is_empty());
    }

    #[test]
    fn linked_program_exposes_uniform_locations() {
        let ctx = HeadlessContext::new();
        let vs = ctx.create_shader(ShaderKind::Vertex).unwrap();
        ctx.shader_source(vs, "uniform mat4 MVP;\nuniform mat4 MV;");
        let fs = ctx.create_shader(ShaderKind::Fragment).unwrap();
        ctx.shader_source(fs, "uniform vec4 MatColor;\nuniform mat4 MVP;");
        let p = ctx.create_program().unwrap();
        ctx.attach_shader(p, vs);
        ctx.attach_shader(p, fs);
        ctx.link_program(p);

        assert!(ctx.program_link_status(p));
        assert_eq!(ctx.get_uniform_location(p, "MVP"), Some(UniformLocation(0)));
        assert_eq!(
            ctx.get_uniform_location(p, "MatColor"),
            Some(UniformLocation(2))
        );
        assert_eq!(ctx.get_uniform_location(p, "nope"), None);
    }
}
