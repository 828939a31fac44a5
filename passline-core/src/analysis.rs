//! Analysis results and their per-unit cache

use crate::stage::{AnalysisKind, Invalidation, StageId};
use crate::unit::UnitId;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Type erased result of an analysis stage
pub type AnalysisResult = Arc<dyn Any + Send + Sync>;

/// Wrap a value as an analysis result
pub fn result<T: Any + Send + Sync>(value: T) -> AnalysisResult {
    Arc::new(value)
}

/// Analyses handed to a stage when it runs
///
/// Only the analyses the stage declared in `requires` are present.
#[derive(Default, Clone)]
pub struct AnalysisView {
    results: HashMap<StageId, AnalysisResult>,
}

impl std::fmt::Debug for AnalysisView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisView")
            .field("analyses", &self.results.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AnalysisView {
    /// Create an empty view
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: StageId, result: AnalysisResult) {
        self.results.insert(id, result);
    }

    /// Get the result of an analysis, downcast to its concrete type
    pub fn get<T: Any>(&self, id: StageId) -> Option<&T> {
        self.results.get(&id).and_then(|r| r.downcast_ref::<T>())
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.results.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Clone)]
struct CacheEntry {
    kind: AnalysisKind,
    result: AnalysisResult,
}

/// Memoized analysis results keyed by (stage, unit)
///
/// Entries remember their analysis kind so a transform's footprint can drop
/// exactly the kinds it declared.
#[derive(Default, Clone)]
pub struct AnalysisCache {
    entries: HashMap<(StageId, UnitId), CacheEntry>,
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl AnalysisCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: StageId, unit: UnitId) -> Option<&AnalysisResult> {
        self.entries.get(&(stage, unit)).map(|e| &e.result)
    }

    /// Get a cached result, downcast to its concrete type
    pub fn get_as<T: Any>(&self, stage: StageId, unit: UnitId) -> Option<&T> {
        self.get(stage, unit).and_then(|r| r.downcast_ref::<T>())
    }

    pub fn contains(&self, stage: StageId, unit: UnitId) -> bool {
        self.entries.contains_key(&(stage, unit))
    }

    pub fn insert(&mut self, stage: StageId, unit: UnitId, kind: AnalysisKind, result: AnalysisResult) {
        self.entries.insert((stage, unit), CacheEntry { kind, result });
    }

    /// Drop every entry of `unit` whose kind the footprint covers
    ///
    /// Returns the number of dropped entries.
    pub fn invalidate(&mut self, unit: UnitId, footprint: &Invalidation) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(_, u), entry| *u != unit || !footprint.covers(entry.kind));
        before - self.entries.len()
    }

    /// Drop everything cached for `unit`
    pub fn invalidate_unit(&mut self, unit: UnitId) -> usize {
        self.invalidate(unit, &Invalidation::All)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
