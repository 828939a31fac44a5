//! Stage metadata and stage bodies
//!
//! A stage is described twice. [`StageInfo`] is the static, IR independent
//! metadata the registry and the pipeline builder reason about. A
//! [`StageBody`] is the executable part, bound per IR in a [`StageTable`]
//! and only needed once a pipeline is run.

use crate::analysis::{AnalysisResult, AnalysisView};
use crate::error::StageError;
use crate::registry::StageRegistry;
use crate::unit::Module;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Stage identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StageId(&'static str);

impl StageId {
    /// Create a stage identity from its name
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Get the stage name
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// Hash and Eq both forward to the name, so lookups by `&str` are consistent.
impl Borrow<str> for StageId {
    fn borrow(&self) -> &str {
        self.0
    }
}

/// Whether a stage mutates its unit or only computes a result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Transform,
    Analysis,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Transform => write!(f, "transform"),
            StageKind::Analysis => write!(f, "analysis"),
        }
    }
}

/// The unit a stage runs on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Module,
    Function,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Module => write!(f, "module"),
            Granularity::Function => write!(f, "function"),
        }
    }
}

/// Kind of result an analysis produces, the unit of invalidation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AnalysisKind(pub &'static str);

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Analyses a transform may invalidate when it changes a unit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Invalidation {
    /// Preserves every analysis
    Nothing,
    /// Worst case, the default for transforms
    #[default]
    All,
    /// Only the listed kinds
    Kinds(Vec<AnalysisKind>),
}

impl Invalidation {
    /// Check whether this footprint covers the given analysis kind
    pub fn covers(&self, kind: AnalysisKind) -> bool {
        match self {
            Invalidation::Nothing => false,
            Invalidation::All => true,
            Invalidation::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

/// Static description of a stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub id: StageId,
    pub kind: StageKind,
    pub granularity: Granularity,
    /// Invalidation footprint, transforms only
    pub invalidates: Invalidation,
    /// Analyses served to this stage when it runs
    pub requires: Vec<StageId>,
    /// Stages that must be present earlier in any pipeline containing this one
    pub prerequisites: Vec<StageId>,
    /// Stages that, when present, must come earlier
    pub after: Vec<StageId>,
    pub description: &'static str,
}

impl StageInfo {
    /// Describe a transform, invalidating everything by default
    pub fn transform(id: StageId, granularity: Granularity) -> Self {
        Self {
            id,
            kind: StageKind::Transform,
            granularity,
            invalidates: Invalidation::All,
            requires: Vec::new(),
            prerequisites: Vec::new(),
            after: Vec::new(),
            description: "",
        }
    }

    /// Describe an analysis
    pub fn analysis(id: StageId, granularity: Granularity) -> Self {
        Self {
            kind: StageKind::Analysis,
            invalidates: Invalidation::Nothing,
            ..Self::transform(id, granularity)
        }
    }

    pub fn invalidates(mut self, footprint: Invalidation) -> Self {
        self.invalidates = footprint;
        self
    }

    /// Preserve everything except the given analyses
    pub fn invalidates_only(self, analyses: &[StageId]) -> Self {
        let kinds = analyses.iter().map(|id| AnalysisKind(id.name())).collect();
        self.invalidates(Invalidation::Kinds(kinds))
    }

    pub fn requires(mut self, analyses: &[StageId]) -> Self {
        self.requires.extend_from_slice(analyses);
        self
    }

    pub fn prerequisites(mut self, stages: &[StageId]) -> Self {
        self.prerequisites.extend_from_slice(stages);
        self
    }

    pub fn after(mut self, stages: &[StageId]) -> Self {
        self.after.extend_from_slice(stages);
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Get the analysis kind this stage produces, named after the stage
    pub fn analysis_kind(&self) -> AnalysisKind {
        AnalysisKind(self.id.name())
    }

    pub fn is_analysis(&self) -> bool {
        self.kind == StageKind::Analysis
    }
}

/// What a transform did to its unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The unit changed, the invalidation footprint applies
    Changed,
    /// Nothing changed, all analyses stay valid
    Unchanged,
}

/// A stage that mutates a unit of type `U`
pub trait Transform<U>: Send + Sync {
    /// Runs on the specific unit.
    fn run_on(&self, unit: &mut U, analyses: &AnalysisView) -> Result<Outcome, StageError>;
}

/// A stage that computes a cacheable result for a unit of type `U`
pub trait Analysis<U>: Send + Sync {
    /// Computes the result for the specific unit.
    fn analyze(&self, unit: &U, analyses: &AnalysisView) -> Result<AnalysisResult, StageError>;
}

/// Adapter turning a closure into a stage body
pub struct FnStage<F>(pub F);

impl<U, F> Transform<U> for FnStage<F>
where
    F: Fn(&mut U, &AnalysisView) -> Result<Outcome, StageError> + Send + Sync,
{
    fn run_on(&self, unit: &mut U, analyses: &AnalysisView) -> Result<Outcome, StageError> {
        (self.0)(unit, analyses)
    }
}

impl<U, F> Analysis<U> for FnStage<F>
where
    F: Fn(&U, &AnalysisView) -> Result<AnalysisResult, StageError> + Send + Sync,
{
    fn analyze(&self, unit: &U, analyses: &AnalysisView) -> Result<AnalysisResult, StageError> {
        (self.0)(unit, analyses)
    }
}

/// Stand-in body for stages whose implementation lives elsewhere
///
/// Transforms report no change, analyses produce `()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Placeholder;

impl<U> Transform<U> for Placeholder {
    fn run_on(&self, _unit: &mut U, _analyses: &AnalysisView) -> Result<Outcome, StageError> {
        Ok(Outcome::Unchanged)
    }
}

impl<U> Analysis<U> for Placeholder {
    fn analyze(&self, _unit: &U, _analyses: &AnalysisView) -> Result<AnalysisResult, StageError> {
        Ok(Arc::new(()))
    }
}

/// Executable part of a stage for the IR `M`
pub enum StageBody<M: Module> {
    ModuleTransform(Box<dyn Transform<M>>),
    FunctionTransform(Box<dyn Transform<M::Function>>),
    ModuleAnalysis(Box<dyn Analysis<M>>),
    FunctionAnalysis(Box<dyn Analysis<M::Function>>),
}

impl<M> StageBody<M>
where
    M: Module + 'static,
    M::Function: 'static,
{
    pub fn module_transform<F>(f: F) -> Self
    where
        F: Fn(&mut M, &AnalysisView) -> Result<Outcome, StageError> + Send + Sync + 'static,
    {
        StageBody::ModuleTransform(Box::new(FnStage(f)))
    }

    pub fn function_transform<F>(f: F) -> Self
    where
        F: Fn(&mut M::Function, &AnalysisView) -> Result<Outcome, StageError>
            + Send
            + Sync
            + 'static,
    {
        StageBody::FunctionTransform(Box::new(FnStage(f)))
    }

    pub fn module_analysis<F>(f: F) -> Self
    where
        F: Fn(&M, &AnalysisView) -> Result<AnalysisResult, StageError> + Send + Sync + 'static,
    {
        StageBody::ModuleAnalysis(Box::new(FnStage(f)))
    }

    pub fn function_analysis<F>(f: F) -> Self
    where
        F: Fn(&M::Function, &AnalysisView) -> Result<AnalysisResult, StageError>
            + Send
            + Sync
            + 'static,
    {
        StageBody::FunctionAnalysis(Box::new(FnStage(f)))
    }

    /// Build a placeholder body shaped after the stage metadata
    pub fn placeholder(info: &StageInfo) -> Self {
        match (info.kind, info.granularity) {
            (StageKind::Transform, Granularity::Module) => {
                StageBody::ModuleTransform(Box::new(Placeholder))
            }
            (StageKind::Transform, Granularity::Function) => {
                StageBody::FunctionTransform(Box::new(Placeholder))
            }
            (StageKind::Analysis, Granularity::Module) => {
                StageBody::ModuleAnalysis(Box::new(Placeholder))
            }
            (StageKind::Analysis, Granularity::Function) => {
                StageBody::FunctionAnalysis(Box::new(Placeholder))
            }
        }
    }
}

impl<M: Module> StageBody<M> {
    pub fn kind(&self) -> StageKind {
        match self {
            StageBody::ModuleTransform(_) | StageBody::FunctionTransform(_) => StageKind::Transform,
            StageBody::ModuleAnalysis(_) | StageBody::FunctionAnalysis(_) => StageKind::Analysis,
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            StageBody::ModuleTransform(_) | StageBody::ModuleAnalysis(_) => Granularity::Module,
            StageBody::FunctionTransform(_) | StageBody::FunctionAnalysis(_) => {
                Granularity::Function
            }
        }
    }

    /// Check the body agrees with the declared metadata
    pub fn matches(&self, info: &StageInfo) -> bool {
        self.kind() == info.kind && self.granularity() == info.granularity
    }
}

impl<M: Module> fmt::Debug for StageBody<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageBody({} {})", self.granularity(), self.kind())
    }
}

/// Binds stage identities to bodies for one IR
pub struct StageTable<M: Module> {
    bodies: HashMap<StageId, StageBody<M>>,
}

impl<M: Module> Default for StageTable<M> {
    fn default() -> Self {
        Self {
            bodies: HashMap::new(),
        }
    }
}

impl<M: Module> fmt::Debug for StageTable<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageTable")
            .field("count", &self.bodies.len())
            .finish()
    }
}

impl<M: Module> StageTable<M> {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a body, replacing any previous binding
    pub fn bind(&mut self, id: StageId, body: StageBody<M>) -> &mut Self {
        self.bodies.insert(id, body);
        self
    }

    pub fn get(&self, id: StageId) -> Option<&StageBody<M>> {
        self.bodies.get(&id)
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl<M> StageTable<M>
where
    M: Module + 'static,
    M::Function: 'static,
{
    /// Bind a placeholder to every registered stage
    ///
    /// Useful to dry-run a pipeline; real bodies can be bound on top.
    pub fn placeholders(registry: &StageRegistry) -> Self {
        let mut table = Self::new();
        for info in registry.iter() {
            table.bind(info.id, StageBody::placeholder(info));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOPS: StageId = StageId::new("loops");
    const DOMTREE: StageId = StageId::new("domtree");

    #[test]
    fn test_stage_info_defaults() {
        let t = StageInfo::transform(StageId::new("sink"), Granularity::Function);
        assert_eq!(t.kind, StageKind::Transform);
        assert_eq!(t.invalidates, Invalidation::All);

        let a = StageInfo::analysis(LOOPS, Granularity::Function).requires(&[DOMTREE]);
        assert!(a.is_analysis());
        assert_eq!(a.invalidates, Invalidation::Nothing);
        assert_eq!(a.analysis_kind(), AnalysisKind("loops"));
        assert_eq!(a.requires, vec![DOMTREE]);
    }

    #[test]
    fn test_invalidation_covers() {
        let only = StageInfo::transform(StageId::new("lcssa"), Granularity::Function)
            .invalidates_only(&[LOOPS]);
        assert!(only.invalidates.covers(AnalysisKind("loops")));
        assert!(!only.invalidates.covers(AnalysisKind("domtree")));
        assert!(Invalidation::All.covers(AnalysisKind("domtree")));
        assert!(!Invalidation::Nothing.covers(AnalysisKind("domtree")));

        // a footprint built from analysis ids matches what they produce
        let loops = StageInfo::analysis(LOOPS, Granularity::Function);
        assert!(only.invalidates.covers(loops.analysis_kind()));
    }

    #[test]
    fn test_stage_id_borrow() {
        let mut map = HashMap::new();
        map.insert(LOOPS, 1);
        assert_eq!(map.get("loops"), Some(&1));
        assert_eq!(LOOPS.to_string(), "loops");
    }
}
