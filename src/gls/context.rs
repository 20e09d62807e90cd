//! The raw, uncached graphics context boundary.
//!
//! [`GlContext`] mirrors the subset of OpenGL ES 3.0 the renderer needs, with
//! typed enums instead of raw `GLenum` values and `u32` handle newtypes where
//! `0` is the null object. Nothing above the [`GraphicsState`] cache talks to
//! a context directly.
//!
//! [`GraphicsState`]: crate::gls::GraphicsState

macro_rules! gl_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// The null object.
            pub const NONE: $name = $name(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

gl_handle!(
    /// A buffer object (vertex or index data).
    BufferId
);
gl_handle!(
    /// A texture object.
    TextureId
);
gl_handle!(
    /// A vertex array object.
    VertexArrayId
);
gl_handle!(
    /// A single shader stage object.
    ShaderId
);
gl_handle!(
    /// A linked program object.
    ProgramId
);

/// Location of a uniform inside one program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Server-side capabilities toggled with enable/disable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    CullFace,
    DepthTest,
    PolygonOffsetFill,
    ScissorTest,
    StencilTest,
    Dither,
    SampleAlphaToCoverage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

/// Which faces are discarded when [`Capability::CullFace`] is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    Front,
    Back,
    FrontAndBack,
}

/// Primitive topology for draw calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    Texture2D,
    CubeMap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

/// A texture parameter together with its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureParam {
    MinFilter(TextureFilter),
    MagFilter(TextureFilter),
    WrapS(TextureWrap),
    WrapT(TextureWrap),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

/// Context strings queried for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StringName {
    Vendor,
    Renderer,
    Version,
    ShadingLanguageVersion,
}

/// Buffers cleared by [`GlContext::clear`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearMask {
    pub const COLOR: ClearMask = ClearMask {
        color: true,
        depth: false,
        stencil: false,
    };
    pub const COLOR_DEPTH: ClearMask = ClearMask {
        color: true,
        depth: true,
        stencil: false,
    };
    pub const ALL: ClearMask = ClearMask {
        color: true,
        depth: true,
        stencil: true,
    };
}

/// Raw graphics context operations.
///
/// Implementations issue every call they receive; deduplication happens in
/// [`GraphicsState`](crate::gls::GraphicsState). Methods take `&self` because
/// the underlying APIs are stateful C handles, not Rust-owned data.
pub trait GlContext {
    fn get_string(&self, name: StringName) -> String;
    /// Pops the oldest pending error code, `0` when there is none.
    fn get_error(&self) -> u32;

    fn clear(&self, mask: ClearMask);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);

    fn enable(&self, cap: Capability);
    fn disable(&self, cap: Capability);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn line_width(&self, width: f32);
    fn front_face(&self, face: FrontFace);
    fn cull_face(&self, mode: CullMode);
    fn depth_func(&self, func: DepthFunc);
    fn depth_mask(&self, write: bool);
    fn blend_equation(&self, mode: BlendEquation);
    fn blend_equation_separate(&self, rgb: BlendEquation, alpha: BlendEquation);
    fn blend_func(&self, src: BlendFactor, dst: BlendFactor);
    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );
    fn polygon_offset(&self, factor: f32, units: f32);

    fn create_buffer(&self) -> Result<BufferId, String>;
    fn delete_buffer(&self, buffer: BufferId);
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>);
    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage);

    fn create_vertex_array(&self) -> Result<VertexArrayId, String>;
    fn delete_vertex_array(&self, vao: VertexArrayId);
    fn bind_vertex_array(&self, vao: Option<VertexArrayId>);
    fn enable_vertex_attrib_array(&self, index: u32);
    /// Float attribute pointer into the bound array buffer; `stride`/`offset` in bytes.
    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32);

    fn create_texture(&self) -> Result<TextureId, String>;
    fn delete_texture(&self, texture: TextureId);
    /// Selects texture unit `unit` (0-based, not `GL_TEXTURE0 + n`).
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: TextureTarget, texture: Option<TextureId>);
    fn tex_image_2d_rgba(&self, target: TextureTarget, width: i32, height: i32, pixels: &[u8]);
    fn tex_parameter(&self, target: TextureTarget, param: TextureParam);
    fn generate_mipmap(&self, target: TextureTarget);

    fn create_shader(&self, kind: ShaderKind) -> Result<ShaderId, String>;
    fn shader_source(&self, shader: ShaderId, source: &str);
    fn compile_shader(&self, shader: ShaderId);
    fn shader_compile_status(&self, shader: ShaderId) -> bool;
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&self, shader: ShaderId);

    fn create_program(&self) -> Result<ProgramId, String>;
    fn attach_shader(&self, program: ProgramId, shader: ShaderId);
    fn detach_shader(&self, program: ProgramId, shader: ShaderId);
    fn bind_attrib_location(&self, program: ProgramId, index: u32, name: &str);
    fn link_program(&self, program: ProgramId);
    fn program_link_status(&self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn use_program(&self, program: Option<ProgramId>);
    fn delete_program(&self, program: ProgramId);

    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn uniform_1i(&self, location: UniformLocation, x: i32);
    fn uniform_1f(&self, location: UniformLocation, x: f32);
    fn uniform_2f(&self, location: UniformLocation, x: f32, y: f32);
    fn uniform_3f(&self, location: UniformLocation, x: f32, y: f32, z: f32);
    fn uniform_4f(&self, location: UniformLocation, x: f32, y: f32, z: f32, w: f32);
    fn uniform_1fv(&self, location: UniformLocation, values: &[f32]);
    fn uniform_3fv(&self, location: UniformLocation, values: &[f32]);
    fn uniform_4fv(&self, location: UniformLocation, values: &[f32]);
    /// Column-major 3x3 matrices, `values.len()` a multiple of 9.
    fn uniform_matrix3fv(&self, location: UniformLocation, values: &[f32]);
    /// Column-major 4x4 matrices, `values.len()` a multiple of 16.
    fn uniform_matrix4fv(&self, location: UniformLocation, values: &[f32]);

    fn draw_arrays(&self, mode: Primitive, first: i32, count: i32);
    /// `offset` is a byte offset into the bound element array buffer.
    fn draw_elements(&self, mode: Primitive, count: i32, index_type: IndexType, offset: i32);
}
