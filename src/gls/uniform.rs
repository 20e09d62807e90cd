use std::collections::HashMap;

use super::context::{ProgramId, UniformLocation};

/// Result of a registry lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Served from the memo table.
    Hit(Option<UniformLocation>),
    /// Not yet known for this program; caller must ask the context and [`UniformRegistry::store`].
    Miss,
}

/// Memoized uniform locations per `(program, name)`.
///
/// Absent uniforms are remembered too, so a shader that optimizes away a
/// uniform costs one context query in total rather than one per frame.
#[derive(Debug, Default)]
pub struct UniformRegistry {
    programs: HashMap<ProgramId, HashMap<String, Option<UniformLocation>>>,
}

impl UniformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, program: ProgramId, name: &str) -> Lookup {
        match self.programs.get(&program).and_then(|names| names.get(name)) {
            Some(loc) => Lookup::Hit(*loc),
            None => Lookup::Miss,
        }
    }

    pub fn store(&mut self, program: ProgramId, name: &str, location: Option<UniformLocation>) {
        self.programs
            .entry(program)
            .or_default()
            .insert(name.to_owned(), location);
    }

    /// Drops every memoized name of `program`.
    pub fn forget(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    pub fn clear(&mut self) {
        self.programs.clear();
    }

    /// Number of memoized names for `program`.
    pub fn len(&self, program: ProgramId) -> usize {
        self.programs.get(&program).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_locations_are_remembered() {
        let mut reg = UniformRegistry::new();
        let p = ProgramId(3);
        assert_eq!(reg.lookup(p, "MVP"), Lookup::Miss);

        reg.store(p, "MVP", None);
        assert_eq!(reg.lookup(p, "MVP"), Lookup::Hit(None));
        assert_eq!(reg.lookup(ProgramId(4), "MVP"), Lookup::Miss);
    }

    #[test]
    fn forget_drops_only_that_program() {
        let mut reg = UniformRegistry::new();
        reg.store(ProgramId(1), "a", Some(UniformLocation(0)));
        reg.store(ProgramId(2), "a", Some(UniformLocation(5)));

        reg.forget(ProgramId(1));
        assert_eq!(reg.len(ProgramId(1)), 0);
        assert_eq!(
            reg.lookup(ProgramId(2), "a"),
            Lookup::Hit(Some(UniformLocation(5)))
        );
    }
}
