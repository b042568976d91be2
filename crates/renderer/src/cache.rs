//! Cache of traced contour geometry.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use qd_common::{Field, GridSpec};

use crate::contour::{ContourEngine, ContourRequest, Interpolation};
use crate::path::Path;

/// Identity of one contouring request.
///
/// The field is identified by a hash of its contents and grid, so the same
/// values coming from different frames share geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    field: u64,
    lo: Option<u32>,
    hi: Option<u32>,
    exact_lo: bool,
    exact_hi: bool,
    data_lo: Option<u32>,
    data_hi: Option<u32>,
    depth: u32,
    interpolation: Interpolation,
    keep_triangles: bool,
    isoline: bool,
}

impl CacheKey {
    pub fn new(field: &Field, grid: &GridSpec, request: &ContourRequest) -> Self {
        let bits = |v: Option<f32>| v.map(f32::to_bits);
        Self {
            field: hash_field(field, grid),
            lo: bits(request.lo),
            hi: bits(request.hi),
            exact_lo: request.exact_lo,
            exact_hi: request.exact_hi,
            data_lo: bits(request.data_lo),
            data_hi: bits(request.data_hi),
            depth: request.depth,
            interpolation: request.interpolation,
            keep_triangles: request.keep_triangles,
            isoline: request.isoline,
        }
    }
}

/// Content hash of a field on a grid.
pub fn hash_field(field: &Field, grid: &GridSpec) -> u64 {
    let mut hasher = DefaultHasher::new();
    field.shape().hash(&mut hasher);
    for v in field.values() {
        v.map(f32::to_bits).hash(&mut hasher);
    }
    for c in [grid.dx, grid.dy, grid.first_x, grid.first_y] {
        c.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoizes [`ContourEngine`] results per [`CacheKey`].
///
/// While enabled, a key is traced at most once until the cache is cleared.
/// When disabled every request is traced and nothing is stored.
#[derive(Debug)]
pub struct ContourCache {
    entries: HashMap<CacheKey, Arc<Path>>,
    enabled: bool,
    last_was_cached: bool,
    hits: u64,
    misses: u64,
}

impl Default for ContourCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ContourCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            enabled: true,
            last_was_cached: false,
            hits: 0,
            misses: 0,
        }
    }

    /// Trace or fetch the geometry for a request.
    pub fn contour(
        &mut self,
        engine: &dyn ContourEngine,
        field: &Field,
        grid: &GridSpec,
        request: &ContourRequest,
    ) -> Arc<Path> {
        if !self.enabled {
            self.last_was_cached = false;
            self.misses += 1;
            return Arc::new(engine.contour(field, grid, request));
        }

        let key = CacheKey::new(field, grid, request);
        if let Some(path) = self.entries.get(&key) {
            self.hits += 1;
            self.last_was_cached = true;
            return Arc::clone(path);
        }

        self.misses += 1;
        self.last_was_cached = false;
        let path = Arc::new(engine.contour(field, grid, request));
        self.entries.insert(key, Arc::clone(&path));
        path
    }

    /// Whether the previous [`ContourCache::contour`] call was served from the cache.
    pub fn was_cached(&self) -> bool {
        self.last_was_cached
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable caching. Disabling drops all stored geometry.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.entries.clear();
        }
        self.enabled = enabled;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
