//! OpenGL ES 3.0 backend over [`glow`].
//!
//! Only built with the `glow` feature. Handles travel through the rest of the
//! crate as plain `u32` names and are rewrapped into glow's native types here.

use std::num::NonZeroU32;

use glow::HasContext;

use super::context::*;

/// Production [`GlContext`] backed by a loaded `glow::Context`.
pub struct GlowContext {
    gl: glow::Context,
}

impl GlowContext {
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    /// Loads GL entry points through a platform loader (EGL, glutin, SDL...).
    ///
    /// # Safety
    ///
    /// A context must be current on this thread and `loader` must return valid
    /// function pointers for it.
    pub unsafe fn from_loader_function<F>(loader: F) -> Self
    where
        F: FnMut(&str) -> *const std::os::raw::c_void,
    {
        let gl = unsafe { glow::Context::from_loader_function(loader) };
        Self { gl }
    }

    pub fn inner(&self) -> &glow::Context {
        &self.gl
    }
}

fn buffer(id: BufferId) -> Option<glow::NativeBuffer> {
    NonZeroU32::new(id.0).map(glow::NativeBuffer)
}

fn texture(id: TextureId) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id.0).map(glow::NativeTexture)
}

fn vertex_array(id: VertexArrayId) -> Option<glow::NativeVertexArray> {
    NonZeroU32::new(id.0).map(glow::NativeVertexArray)
}

fn shader(id: ShaderId) -> Option<glow::NativeShader> {
    NonZeroU32::new(id.0).map(glow::NativeShader)
}

fn program(id: ProgramId) -> Option<glow::NativeProgram> {
    NonZeroU32::new(id.0).map(glow::NativeProgram)
}

fn location(loc: UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(loc.0)
}

fn capability(cap: Capability) -> u32 {
    match cap {
        Capability::Blend => glow::BLEND,
        Capability::CullFace => glow::CULL_FACE,
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::PolygonOffsetFill => glow::POLYGON_OFFSET_FILL,
        Capability::ScissorTest => glow::SCISSOR_TEST,
        Capability::StencilTest => glow::STENCIL_TEST,
        Capability::Dither => glow::DITHER,
        Capability::SampleAlphaToCoverage => glow::SAMPLE_ALPHA_TO_COVERAGE,
    }
}

fn blend_equation(eq: BlendEquation) -> u32 {
    match eq {
        BlendEquation::Add => glow::FUNC_ADD,
        BlendEquation::Subtract => glow::FUNC_SUBTRACT,
        BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendEquation::Min => glow::MIN,
        BlendEquation::Max => glow::MAX,
    }
}

fn blend_factor(f: BlendFactor) -> u32 {
    match f {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => glow::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => glow::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::SrcAlphaSaturate => glow::SRC_ALPHA_SATURATE,
    }
}

fn depth_func(f: DepthFunc) -> u32 {
    match f {
        DepthFunc::Never => glow::NEVER,
        DepthFunc::Less => glow::LESS,
        DepthFunc::Equal => glow::EQUAL,
        DepthFunc::LessEqual => glow::LEQUAL,
        DepthFunc::Greater => glow::GREATER,
        DepthFunc::NotEqual => glow::NOTEQUAL,
        DepthFunc::GreaterEqual => glow::GEQUAL,
        DepthFunc::Always => glow::ALWAYS,
    }
}

fn primitive(p: Primitive) -> u32 {
    match p {
        Primitive::Points => glow::POINTS,
        Primitive::Lines => glow::LINES,
        Primitive::LineStrip => glow::LINE_STRIP,
        Primitive::LineLoop => glow::LINE_LOOP,
        Primitive::Triangles => glow::TRIANGLES,
        Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
        Primitive::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn buffer_target(t: BufferTarget) -> u32 {
    match t {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn texture_target(t: TextureTarget) -> u32 {
    match t {
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::CubeMap => glow::TEXTURE_CUBE_MAP,
    }
}

fn filter(f: TextureFilter) -> i32 {
    (match f {
        TextureFilter::Nearest => glow::NEAREST,
        TextureFilter::Linear => glow::LINEAR,
        TextureFilter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        TextureFilter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        TextureFilter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        TextureFilter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn wrap(w: TextureWrap) -> i32 {
    (match w {
        TextureWrap::Repeat => glow::REPEAT,
        TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        TextureWrap::MirroredRepeat => glow::MIRRORED_REPEAT,
    }) as i32
}

impl GlContext for GlowContext {
    fn get_string(&self, name: StringName) -> String {
        let param = match name {
            StringName::Vendor => glow::VENDOR,
            StringName::Renderer => glow::RENDERER,
            StringName::Version => glow::VERSION,
            StringName::ShadingLanguageVersion => glow::SHADING_LANGUAGE_VERSION,
        };
        unsafe { self.gl.get_parameter_string(param) }
    }

    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }

    fn clear(&self, mask: ClearMask) {
        let mut bits = 0;
        if mask.color {
            bits |= glow::COLOR_BUFFER_BIT;
        }
        if mask.depth {
            bits |= glow::DEPTH_BUFFER_BIT;
        }
        if mask.stencil {
            bits |= glow::STENCIL_BUFFER_BIT;
        }
        unsafe { self.gl.clear(bits) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn enable(&self, cap: Capability) {
        unsafe { self.gl.enable(capability(cap)) }
    }

    fn disable(&self, cap: Capability) {
        unsafe { self.gl.disable(capability(cap)) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) }
    }

    fn line_width(&self, width: f32) {
        unsafe { self.gl.line_width(width) }
    }

    fn front_face(&self, face: FrontFace) {
        let mode = match face {
            FrontFace::Ccw => glow::CCW,
            FrontFace::Cw => glow::CW,
        };
        unsafe { self.gl.front_face(mode) }
    }

    fn cull_face(&self, mode: CullMode) {
        let mode = match mode {
            CullMode::Front => glow::FRONT,
            CullMode::Back => glow::BACK,
            CullMode::FrontAndBack => glow::FRONT_AND_BACK,
        };
        unsafe { self.gl.cull_face(mode) }
    }

    fn depth_func(&self, func: DepthFunc) {
        unsafe { self.gl.depth_func(depth_func(func)) }
    }

    fn depth_mask(&self, write: bool) {
        unsafe { self.gl.depth_mask(write) }
    }

    fn blend_equation(&self, mode: BlendEquation) {
        unsafe { self.gl.blend_equation(blend_equation(mode)) }
    }

    fn blend_equation_separate(&self, rgb: BlendEquation, alpha: BlendEquation) {
        unsafe {
            self.gl
                .blend_equation_separate(blend_equation(rgb), blend_equation(alpha))
        }
    }

    fn blend_func(&self, src: BlendFactor, dst: BlendFactor) {
        unsafe { self.gl.blend_func(blend_factor(src), blend_factor(dst)) }
    }

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        unsafe {
            self.gl.blend_func_separate(
                blend_factor(src_rgb),
                blend_factor(dst_rgb),
                blend_factor(src_alpha),
                blend_factor(dst_alpha),
            )
        }
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }

    fn create_buffer(&self) -> Result<BufferId, String> {
        unsafe { self.gl.create_buffer() }.map(|b| BufferId(b.0.get()))
    }

    fn delete_buffer(&self, id: BufferId) {
        if let Some(b) = buffer(id) {
            unsafe { self.gl.delete_buffer(b) }
        }
    }

    fn bind_buffer(&self, target: BufferTarget, id: Option<BufferId>) {
        unsafe {
            self.gl
                .bind_buffer(buffer_target(target), id.and_then(buffer))
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let usage = match usage {
            BufferUsage::StaticDraw => glow::STATIC_DRAW,
            BufferUsage::DynamicDraw => glow::DYNAMIC_DRAW,
            BufferUsage::StreamDraw => glow::STREAM_DRAW,
        };
        unsafe {
            self.gl
                .buffer_data_u8_slice(buffer_target(target), data, usage)
        }
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, String> {
        unsafe { self.gl.create_vertex_array() }.map(|v| VertexArrayId(v.0.get()))
    }

    fn delete_vertex_array(&self, id: VertexArrayId) {
        if let Some(v) = vertex_array(id) {
            unsafe { self.gl.delete_vertex_array(v) }
        }
    }

    fn bind_vertex_array(&self, id: Option<VertexArrayId>) {
        unsafe { self.gl.bind_vertex_array(id.and_then(vertex_array)) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, glow::FLOAT, false, stride, offset)
        }
    }

    fn create_texture(&self) -> Result<TextureId, String> {
        unsafe { self.gl.create_texture() }.map(|t| TextureId(t.0.get()))
    }

    fn delete_texture(&self, id: TextureId) {
        if let Some(t) = texture(id) {
            unsafe { self.gl.delete_texture(t) }
        }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: TextureTarget, id: Option<TextureId>) {
        unsafe {
            self.gl
                .bind_texture(texture_target(target), id.and_then(texture))
        }
    }

    fn tex_image_2d_rgba(&self, target: TextureTarget, width: i32, height: i32, pixels: &[u8]) {
        unsafe {
            self.gl.tex_image_2d(
                texture_target(target),
                0,
                glow::RGBA8 as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(pixels)),
            )
        }
    }

    fn tex_parameter(&self, target: TextureTarget, param: TextureParam) {
        let (name, value) = match param {
            TextureParam::MinFilter(f) => (glow::TEXTURE_MIN_FILTER, filter(f)),
            TextureParam::MagFilter(f) => (glow::TEXTURE_MAG_FILTER, filter(f)),
            TextureParam::WrapS(w) => (glow::TEXTURE_WRAP_S, wrap(w)),
            TextureParam::WrapT(w) => (glow::TEXTURE_WRAP_T, wrap(w)),
        };
        unsafe {
            self.gl
                .tex_parameter_i32(texture_target(target), name, value)
        }
    }

    fn generate_mipmap(&self, target: TextureTarget) {
        unsafe { self.gl.generate_mipmap(texture_target(target)) }
    }

    fn create_shader(&self, kind: ShaderKind) -> Result<ShaderId, String> {
        let kind = match kind {
            ShaderKind::Vertex => glow::VERTEX_SHADER,
            ShaderKind::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(kind) }.map(|s| ShaderId(s.0.get()))
    }

    fn shader_source(&self, id: ShaderId, source: &str) {
        if let Some(s) = shader(id) {
            unsafe { self.gl.shader_source(s, source) }
        }
    }

    fn compile_shader(&self, id: ShaderId) {
        if let Some(s) = shader(id) {
            unsafe { self.gl.compile_shader(s) }
        }
    }

    fn shader_compile_status(&self, id: ShaderId) -> bool {
        shader(id).is_some_and(|s| unsafe { self.gl.get_shader_compile_status(s) })
    }

    fn shader_info_log(&self, id: ShaderId) -> String {
        shader(id)
            .map(|s| unsafe { self.gl.get_shader_info_log(s) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, id: ShaderId) {
        if let Some(s) = shader(id) {
            unsafe { self.gl.delete_shader(s) }
        }
    }

    fn create_program(&self) -> Result<ProgramId, String> {
        unsafe { self.gl.create_program() }.map(|p| ProgramId(p.0.get()))
    }

    fn attach_shader(&self, p: ProgramId, s: ShaderId) {
        if let (Some(p), Some(s)) = (program(p), shader(s)) {
            unsafe { self.gl.attach_shader(p, s) }
        }
    }

    fn detach_shader(&self, p: ProgramId, s: ShaderId) {
        if let (Some(p), Some(s)) = (program(p), shader(s)) {
            unsafe { self.gl.detach_shader(p, s) }
        }
    }

    fn bind_attrib_location(&self, p: ProgramId, index: u32, name: &str) {
        if let Some(p) = program(p) {
            unsafe { self.gl.bind_attrib_location(p, index, name) }
        }
    }

    fn link_program(&self, p: ProgramId) {
        if let Some(p) = program(p) {
            unsafe { self.gl.link_program(p) }
        }
    }

    fn program_link_status(&self, p: ProgramId) -> bool {
        program(p).is_some_and(|p| unsafe { self.gl.get_program_link_status(p) })
    }

    fn program_info_log(&self, p: ProgramId) -> String {
        program(p)
            .map(|p| unsafe { self.gl.get_program_info_log(p) })
            .unwrap_or_default()
    }

    fn use_program(&self, p: Option<ProgramId>) {
        unsafe { self.gl.use_program(p.and_then(program)) }
    }

    fn delete_program(&self, p: ProgramId) {
        if let Some(p) = program(p) {
            unsafe { self.gl.delete_program(p) }
        }
    }

    fn get_uniform_location(&self, p: ProgramId, name: &str) -> Option<UniformLocation> {
        let p = program(p)?;
        unsafe { self.gl.get_uniform_location(p, name) }.map(|l| UniformLocation(l.0))
    }

    fn uniform_1i(&self, loc: UniformLocation, x: i32) {
        unsafe { self.gl.uniform_1_i32(Some(&location(loc)), x) }
    }

    fn uniform_1f(&self, loc: UniformLocation, x: f32) {
        unsafe { self.gl.uniform_1_f32(Some(&location(loc)), x) }
    }

    fn uniform_2f(&self, loc: UniformLocation, x: f32, y: f32) {
        unsafe { self.gl.uniform_2_f32(Some(&location(loc)), x, y) }
    }

    fn uniform_3f(&self, loc: UniformLocation, x: f32, y: f32, z: f32) {
        unsafe { self.gl.uniform_3_f32(Some(&location(loc)), x, y, z) }
    }

    fn uniform_4f(&self, loc: UniformLocation, x: f32, y: f32, z: f32, w: f32) {
        unsafe { self.gl.uniform_4_f32(Some(&location(loc)), x, y, z, w) }
    }

    fn uniform_1fv(&self, loc: UniformLocation, values: &[f32]) {
        unsafe { self.gl.uniform_1_f32_slice(Some(&location(loc)), values) }
    }

    fn uniform_3fv(&self, loc: UniformLocation, values: &[f32]) {
        unsafe { self.gl.uniform_3_f32_slice(Some(&location(loc)), values) }
    }

    fn uniform_4fv(&self, loc: UniformLocation, values: &[f32]) {
        unsafe { self.gl.uniform_4_f32_slice(Some(&location(loc)), values) }
    }

    fn uniform_matrix3fv(&self, loc: UniformLocation, values: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_3_f32_slice(Some(&location(loc)), false, values)
        }
    }

    fn uniform_matrix4fv(&self, loc: UniformLocation, values: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(&location(loc)), false, values)
        }
    }

    fn draw_arrays(&self, mode: Primitive, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(primitive(mode), first, count) }
    }

    fn draw_elements(&self, mode: Primitive, count: i32, index_type: IndexType, offset: i32) {
        let ty = match index_type {
            IndexType::U16 => glow::UNSIGNED_SHORT,
            IndexType::U32 => glow::UNSIGNED_INT,
        };
        unsafe { self.gl.draw_elements(primitive(mode), count, ty, offset) }
    }
}
