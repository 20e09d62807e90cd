use log::{debug, warn};

use super::context::{ProgramId, ShaderId, ShaderKind};
use super::GraphicsState;
use crate::error::{RenderError, Result};

/// Fixed vertex attribute slots, bound before linking so every program
/// agrees with the vertex array layout built by geometry uploads.
pub const ATTRIBUTE_LOCATIONS: [(u32, &str); 5] = [
    (0, "VertexPosition"),
    (1, "VertexNormal"),
    (2, "VertexTexcoord"),
    (3, "MatricesIndices"),
    (4, "MatricesWeights"),
];

/// A linked shader program.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    name: String,
}

impl Program {
    /// Compiles both stages and links them.
    ///
    /// Compile and link failures come back as [`RenderError::ShaderCompile`]
    /// and [`RenderError::ProgramLink`] carrying the driver's info log. No
    /// objects are leaked on failure.
    pub fn build(
        state: &mut GraphicsState,
        name: &str,
        vertex: &str,
        fragment: &str,
    ) -> Result<Program> {
        let vs = compile(state, name, ShaderKind::Vertex, vertex)?;
        let fs = match compile(state, name, ShaderKind::Fragment, fragment) {
            Ok(fs) => fs,
            Err(e) => {
                state.raw().delete_shader(vs);
                return Err(e);
            }
        };

        let id = match state.create_program() {
            Ok(id) => id,
            Err(e) => {
                state.raw().delete_shader(vs);
                state.raw().delete_shader(fs);
                return Err(e);
            }
        };

        let gl = state.raw();
        gl.attach_shader(id, vs);
        gl.attach_shader(id, fs);
        for (index, attr) in ATTRIBUTE_LOCATIONS {
            gl.bind_attrib_location(id, index, attr);
        }
        gl.link_program(id);
        let linked = gl.program_link_status(id);
        let log = gl.program_info_log(id);
        gl.detach_shader(id, vs);
        gl.detach_shader(id, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        if !linked {
            state.delete_program(id);
            return Err(RenderError::ProgramLink {
                program: name.to_owned(),
                log,
            });
        }
        if !log.trim().is_empty() {
            warn!("program `{name}` linked with warnings: {log}");
        }

        debug!("program `{name}` linked as {id:?}");
        Ok(Program {
            id,
            name: name.to_owned(),
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deletes the program object; memoized uniform locations go with it.
    pub fn dispose(self, state: &mut GraphicsState) {
        state.delete_program(self.id);
    }
}

fn compile(state: &GraphicsState, program: &str, kind: ShaderKind, source: &str) -> Result<ShaderId> {
    let gl = state.raw();
    let shader = gl.create_shader(kind).map_err(RenderError::Context)?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if gl.shader_compile_status(shader) {
        return Ok(shader);
    }
    let log = gl.shader_info_log(shader);
    gl.delete_shader(shader);
    Err(RenderError::ShaderCompile {
        program: program.to_owned(),
        kind,
        log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gls::{GlCall, HeadlessContext};

    const VS: &str = "uniform mat4 MVP;\nvoid main() {}";
    const FS: &str = "uniform vec4 MatColor;\nvoid main() {}";

    #[test]
    fn builds_and_binds_attribute_slots() {
        let ctx = HeadlessContext::new();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));
        let program = Program::build(&mut gs, "basic", VS, FS).unwrap();

        assert_eq!(
            ctx.count(|c| matches!(c, GlCall::BindAttribLocation(..))),
            ATTRIBUTE_LOCATIONS.len()
        );
        assert!(gs.uniform_location(program.id(), "MVP").is_some());
        assert_eq!(ctx.count(|c| matches!(c, GlCall::DeleteShader(_))), 2);
    }

    #[test]
    fn compile_failure_reports_stage_and_log() {
        let ctx = HeadlessContext::new();
        ctx.fail_compilation_containing("MatColor");
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));

        let err = Program::build(&mut gs, "basic", VS, FS).unwrap_err();
        match err {
            RenderError::ShaderCompile { program, kind, log } => {
                assert_eq!(program, "basic");
                assert_eq!(kind, ShaderKind::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(ctx.live_programs(), 0);
    }

    #[test]
    fn link_failure_deletes_the_program() {
        let ctx = HeadlessContext::new();
        ctx.fail_next_link();
        let mut gs = GraphicsState::new(Box::new(ctx.clone()));

        let err = Program::build(&mut gs, "basic", VS, FS).unwrap_err();
        assert!(matches!(err, RenderError::ProgramLink { .. }));
        assert_eq!(ctx.live_programs(), 0);
    }
}
