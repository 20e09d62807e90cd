//! Built-in GLSL ES sources and the compiled program cache.
//!
//! Programs are compiled on first request and cached per shader name and
//! define set, so a rigged mesh (with `BONE_INFLUENCERS`/`TOTAL_BONES`)
//! and a static mesh using the same material end up with two programs.
//! Every source is prefixed with `#version 300 es`, default precision and
//! one `#define` line per entry.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};

use crate::error::{RenderError, Result};
use crate::gls::{GraphicsState, Program, ProgramId};
use crate::light::{MAX_DIR_LIGHTS, MAX_POINT_LIGHTS};

const HEADER: &str = "#version 300 es\nprecision highp float;\nprecision highp int;\n";

const BUILTINS: [(&str, &str, &str); 4] = [
    ("basic", include_str!("basic.vert"), include_str!("basic.frag")),
    (
        "standard",
        include_str!("standard.vert"),
        include_str!("standard.frag"),
    ),
    ("point", include_str!("point.vert"), include_str!("point.frag")),
    ("panel", include_str!("panel.vert"), include_str!("panel.frag")),
];

/// Preprocessor defines injected ahead of a shader body. Ordered, so equal
/// sets hash and compare equal regardless of insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderDefines(BTreeMap<String, String>);

impl ShaderDefines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.insert(name.into(), value.to_string());
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies every entry of `other` over this set.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    fn write_into(&self, out: &mut String) {
        for (name, value) in &self.0 {
            out.push_str("#define ");
            out.push_str(name);
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push('\n');
        }
    }
}

#[derive(Clone, Debug)]
struct ShaderSource {
    vertex: String,
    fragment: String,
}

/// Named shader sources plus the programs built from them.
#[derive(Debug)]
pub struct ShaderManager {
    sources: HashMap<String, ShaderSource>,
    /// Built variants per shader name, looked up by `&str` without allocating.
    programs: HashMap<String, Vec<(ShaderDefines, Program)>>,
    /// Programs replaced through `add_shader`, deleted on the next request.
    retired: Vec<Program>,
    generation: Option<u64>,
    base_defines: ShaderDefines,
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderManager {
    /// A manager with the built-in `basic`, `standard`, `point` and `panel` shaders.
    pub fn new() -> Self {
        let mut base_defines = ShaderDefines::new();
        base_defines
            .set("MAX_DIR_LIGHTS", MAX_DIR_LIGHTS)
            .set("MAX_POINT_LIGHTS", MAX_POINT_LIGHTS);

        let sources = BUILTINS
            .iter()
            .map(|(name, vertex, fragment)| {
                (
                    (*name).to_owned(),
                    ShaderSource {
                        vertex: (*vertex).to_owned(),
                        fragment: (*fragment).to_owned(),
                    },
                )
            })
            .collect();

        Self {
            sources,
            programs: HashMap::new(),
            retired: Vec::new(),
            generation: None,
            base_defines,
        }
    }

    /// Registers (or replaces) a shader. Bodies must omit the `#version` line.
    pub fn add_shader(&mut self, name: impl Into<String>, vertex: impl Into<String>, fragment: impl Into<String>) {
        let name = name.into();
        if let Some(variants) = self.programs.remove(&name) {
            self.retired.extend(variants.into_iter().map(|(_, program)| program));
        }
        self.sources.insert(
            name,
            ShaderSource {
                vertex: vertex.into(),
                fragment: fragment.into(),
            },
        );
    }

    pub fn has_shader(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Number of cached programs.
    pub fn len(&self) -> usize {
        self.programs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the program for `name` with `defines`, building it on first use.
    pub fn program(&mut self, state: &mut GraphicsState, name: &str, defines: &ShaderDefines) -> Result<ProgramId> {
        self.sync_generation(state);
        for program in self.retired.drain(..) {
            program.dispose(state);
        }

        if let Some(variants) = self.programs.get(name)
            && let Some((_, program)) = variants.iter().find(|(d, _)| d == defines)
        {
            return Ok(program.id());
        }

        let source = self
            .sources
            .get(name)
            .ok_or_else(|| RenderError::UnknownShader(name.to_owned()))?;
        let mut all = self.base_defines.clone();
        all.merge(defines);
        let vertex = assemble(&source.vertex, &all);
        let fragment = assemble(&source.fragment, &all);

        let program = Program::build(state, name, &vertex, &fragment)?;
        let id = program.id();
        debug!("built program `{name}` with {:?}", defines);
        self.programs
            .entry(name.to_owned())
            .or_default()
            .push((defines.clone(), program));
        Ok(id)
    }

    /// Deletes every cached program.
    pub fn dispose(&mut self, state: &mut GraphicsState) {
        self.sync_generation(state);
        for program in self.retired.drain(..) {
            program.dispose(state);
        }
        for (_, variants) in self.programs.drain() {
            for (_, program) in variants {
                program.dispose(state);
            }
        }
    }

    fn sync_generation(&mut self, state: &GraphicsState) {
        let current = state.generation();
        if self.generation == Some(current) {
            return;
        }
        if self.generation.is_some() {
            info!(
                "graphics context changed, dropping {} cached programs",
                self.len()
            );
        }
        // Objects from an older context are already gone.
        self.programs.clear();
        self.retired.clear();
        self.generation = Some(current);
    }
}

fn assemble(body: &str, defines: &ShaderDefines) -> String {
    let mut out = String::with_capacity(HEADER.len() + body.len() + 64);
    out.push_str(HEADER);
    defines.write_into(&mut out);
    out.push_str(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gls::{GlCall, HeadlessContext};

    fn setup() -> (HeadlessContext, GraphicsState) {
        let ctx = HeadlessContext::new();
        let gs = GraphicsState::new(Box::new(ctx.clone()));
        (ctx, gs)
    }

    fn links(ctx: &HeadlessContext) -> usize {
        ctx.count(|c| matches!(c, GlCall::LinkProgram(_)))
    }

    #[test]
    fn defines_render_in_order() {
        let mut defines = ShaderDefines::new();
        defines.set("B", 2).set("A", "");
        let src = assemble("void main() {}", &defines);
        assert!(src.starts_with("#version 300 es\n"));
        assert!(src.contains("#define A\n#define B 2\n"));
    }

    #[test]
    fn programs_are_cached_per_define_set() {
        let (ctx, mut gs) = setup();
        let mut sm = ShaderManager::new();
        let plain = ShaderDefines::new();
        let mut skinned = ShaderDefines::new();
        skinned.set("BONE_INFLUENCERS", 4).set("TOTAL_BONES", 2);

        let a = sm.program(&mut gs, "basic", &plain).unwrap();
        let b = sm.program(&mut gs, "basic", &plain).unwrap();
        let c = sm.program(&mut gs, "basic", &skinned).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(links(&ctx), 2);
        assert_eq!(sm.len(), 2);
    }

    #[test]
    fn cached_lookup_touches_nothing() {
        let (ctx, mut gs) = setup();
        let mut sm = ShaderManager::new();
        let mut skinned = ShaderDefines::new();
        skinned.set("TOTAL_BONES", 3);
        let first = sm.program(&mut gs, "standard", &skinned).unwrap();
        sm.program(&mut gs, "standard", &ShaderDefines::new()).unwrap();
        ctx.clear_calls();

        for _ in 0..3 {
            assert_eq!(sm.program(&mut gs, "standard", &skinned).unwrap(), first);
        }
        assert!(ctx.calls().is_empty());
        assert_eq!(sm.len(), 2);
    }

    #[test]
    fn unknown_shader_is_an_error() {
        let (_ctx, mut gs) = setup();
        let mut sm = ShaderManager::new();
        let err = sm.program(&mut gs, "toon", &ShaderDefines::new()).unwrap_err();
        assert!(matches!(err, RenderError::UnknownShader(name) if name == "toon"));
    }

    #[test]
    fn compile_failure_is_not_cached() {
        let (ctx, mut gs) = setup();
        let mut sm = ShaderManager::new();
        sm.add_shader("broken", "void main() { BROKEN }", "void main() {}");
        ctx.fail_compilation_containing("BROKEN");
        let err = sm.program(&mut gs, "broken", &ShaderDefines::new()).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { .. }));
        assert!(sm.is_empty());
    }

    #[test]
    fn replacing_a_shader_retires_old_programs() {
        let (ctx, mut gs) = setup();
        let mut sm = ShaderManager::new();
        let first = sm.program(&mut gs, "point", &ShaderDefines::new()).unwrap();
        sm.add_shader("point", "void main() {}", "void main() {}");
        let second = sm.program(&mut gs, "point", &ShaderDefines::new()).unwrap();
        assert_ne!(first, second);
        assert_eq!(ctx.count(|c| *c == GlCall::DeleteProgram(first)), 1);
    }

    #[test]
    fn context_change_rebuilds() {
        let (_ctx, mut gs) = setup();
        let mut sm = ShaderManager::new();
        sm.program(&mut gs, "standard", &ShaderDefines::new()).unwrap();

        let next = HeadlessContext::new();
        gs.set_context(Box::new(next.clone()));
        sm.program(&mut gs, "standard", &ShaderDefines::new()).unwrap();
        assert_eq!(links(&next), 1);
        assert_eq!(sm.len(), 1);
    }

    #[test]
    fn dispose_deletes_everything() {
        let (ctx, mut gs) = setup();
        let mut sm = ShaderManager::new();
        for name in ["basic", "standard", "point", "panel"] {
            sm.program(&mut gs, name, &ShaderDefines::new()).unwrap();
        }
        assert_eq!(ctx.live_programs(), 4);
        sm.dispose(&mut gs);
        assert_eq!(ctx.live_programs(), 0);
        assert!(sm.is_empty());
    }
}
