/// Counters maintained by [`GraphicsState`](super::GraphicsState).
///
/// Object counts (`shaders`, `vaos`, `buffers`, `textures`) track live
/// objects: creations minus deletions. The remaining fields are cumulative
/// since the state was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Distinct programs activated at least once and not yet deleted.
    pub shaders: usize,
    pub vaos: usize,
    pub buffers: usize,
    pub textures: usize,
    /// Capability enable/disable calls absorbed by the cache.
    pub cap_hits: u64,
    pub uniloc_hits: u64,
    pub uniloc_misses: u64,
    pub uniform_sets: u64,
    pub draw_calls: u64,
}

impl Stats {
    /// Counter deltas from `earlier` to `self`; object counts are taken as-is.
    pub fn since(&self, earlier: &Stats) -> Stats {
        Stats {
            shaders: self.shaders,
            vaos: self.vaos,
            buffers: self.buffers,
            textures: self.textures,
            cap_hits: self.cap_hits.saturating_sub(earlier.cap_hits),
            uniloc_hits: self.uniloc_hits.saturating_sub(earlier.uniloc_hits),
            uniloc_misses: self.uniloc_misses.saturating_sub(earlier.uniloc_misses),
            uniform_sets: self.uniform_sets.saturating_sub(earlier.uniform_sets),
            draw_calls: self.draw_calls.saturating_sub(earlier.draw_calls),
        }
    }
}

/// Decrements a live-object counter, refusing to go below zero.
pub(crate) fn release(counter: &mut usize, what: &str) {
    if *counter == 0 {
        log::warn!("{what} deleted with no live {what}s recorded");
    } else {
        *counter -= 1;
    }
}
