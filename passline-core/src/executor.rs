//! Pipeline executor
//!
//! Runs a built [`Pipeline`] against one module. Each executor owns the
//! analysis cache of the unit it runs on; independent modules are driven by
//! independent executors sharing the same pipeline, registry and table.

use crate::analysis::{AnalysisCache, AnalysisResult, AnalysisView};
use crate::error::{ConfigurationError, ExecutionError};
use crate::pipeline::Pipeline;
use crate::registry::StageRegistry;
use crate::stage::{Analysis, Invalidation, Outcome, StageBody, StageId, StageInfo, StageTable};
use crate::unit::{Module, Unit, UnitId};
use tracing::{debug, instrument, trace, warn};

/// Where an executor stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    /// Nothing ran yet
    Pending,
    /// Every stage succeeded
    Compiled,
    /// The given stage failed; later stages did not run
    Failed { stage: StageId },
}

/// Counters collected during a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Stage invocations executed, per unit
    pub stages_run: usize,
    /// Analyses computed, including on-demand recomputation
    pub analyses_computed: usize,
    /// Analyses served from the cache
    pub cache_hits: usize,
    /// Cache entries dropped by transforms
    pub invalidated: usize,
}

/// Runs one pipeline on one module
pub struct Executor<'p, M: Module> {
    pipeline: &'p Pipeline,
    registry: &'p StageRegistry,
    table: &'p StageTable<M>,
    cache: AnalysisCache,
    status: UnitStatus,
    report: RunReport,
}

impl<M: Module> std::fmt::Debug for Executor<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("target", &self.pipeline.target())
            .field("status", &self.status)
            .field("report", &self.report)
            .field("cache", &self.cache)
            .finish()
    }
}

fn module_analysis<M: Module>(body: &StageBody<M>) -> Option<&dyn Analysis<M>> {
    match body {
        StageBody::ModuleAnalysis(a) => Some(a.as_ref()),
        _ => None,
    }
}

fn function_analysis<M: Module>(body: &StageBody<M>) -> Option<&dyn Analysis<M::Function>> {
    match body {
        StageBody::FunctionAnalysis(a) => Some(a.as_ref()),
        _ => None,
    }
}

type Picker<M, U> = fn(&StageBody<M>) -> Option<&dyn Analysis<U>>;

impl<'p, M: Module> Executor<'p, M> {
    /// Create an executor, checking that every stage the pipeline can reach
    /// has a body of the declared kind and granularity
    ///
    /// # Errors
    /// `UnknownStage`, `Unbound` or `BodyMismatch`.
    pub fn new(
        pipeline: &'p Pipeline,
        registry: &'p StageRegistry,
        table: &'p StageTable<M>,
    ) -> Result<Self, ConfigurationError> {
        let mut pending: Vec<StageId> = pipeline.stage_ids();
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let info = lookup(registry, id)?;
            let body = table.get(id).ok_or(ConfigurationError::Unbound(id))?;
            if !body.matches(info) {
                return Err(ConfigurationError::BodyMismatch {
                    stage: id,
                    declared: format!("{} {}", info.granularity, info.kind),
                    bound: format!("{} {}", body.granularity(), body.kind()),
                });
            }
            pending.extend(info.requires.iter().copied());
        }

        Ok(Self {
            pipeline,
            registry,
            table,
            cache: AnalysisCache::new(),
            status: UnitStatus::Pending,
            report: RunReport::default(),
        })
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn report(&self) -> RunReport {
        self.report
    }

    /// Get the analysis cache, still populated after a failure
    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Run every invocation in order
    ///
    /// # Errors
    /// The first stage failure, attributed to its stage and unit. The
    /// remaining stages do not run and the status becomes `Failed`.
    #[instrument(
        target = "passline::executor",
        skip_all,
        fields(unit = %module.unit_id(), stages = self.pipeline.len())
    )]
    pub fn run(&mut self, module: &mut M) -> Result<RunReport, ExecutionError> {
        if self.status != UnitStatus::Pending {
            return Err(ExecutionError::AlreadyRan);
        }

        let pipeline = self.pipeline;
        for inv in pipeline.invocations() {
            if let Err(err) = self.run_stage(inv.stage, module) {
                if let Some(stage) = err.stage() {
                    self.status = UnitStatus::Failed { stage };
                }
                warn!(target: "passline::executor", stage = %inv.stage, error = %err, "pipeline stopped");
                return Err(err);
            }
        }

        self.status = UnitStatus::Compiled;
        debug!(
            target: "passline::executor",
            stages = self.report.stages_run,
            computed = self.report.analyses_computed,
            hits = self.report.cache_hits,
            invalidated = self.report.invalidated,
            "pipeline finished"
        );
        Ok(self.report)
    }

    fn run_stage(&mut self, id: StageId, module: &mut M) -> Result<(), ExecutionError> {
        let registry = self.registry;
        let table = self.table;
        let info = lookup(registry, id)?;
        let body = table.get(id).ok_or(ConfigurationError::Unbound(id))?;
        trace!(target: "passline::executor", stage = %id, "running stage");

        match body {
            StageBody::ModuleTransform(transform) => {
                let module_id = module.unit_id();
                let view = self.view(info, &*module, module_analysis::<M>)?;
                let outcome = transform
                    .run_on(module, &view)
                    .map_err(|source| ExecutionError::StageFailed {
                        stage: id,
                        unit: module_id,
                        source,
                    })?;
                self.report.stages_run += 1;
                if outcome == Outcome::Changed {
                    let mut units = module.function_ids();
                    units.push(module_id);
                    self.invalidate(&units, &info.invalidates);
                }
            }
            StageBody::FunctionTransform(transform) => {
                let module_id = module.unit_id();
                for func in module.functions_mut() {
                    let func_id = func.unit_id();
                    let view = self.view(info, &*func, function_analysis::<M>)?;
                    let outcome = transform
                        .run_on(func, &view)
                        .map_err(|source| ExecutionError::StageFailed {
                            stage: id,
                            unit: func_id,
                            source,
                        })?;
                    self.report.stages_run += 1;
                    if outcome == Outcome::Changed {
                        self.invalidate(&[func_id, module_id], &info.invalidates);
                    }
                }
            }
            StageBody::ModuleAnalysis(_) => {
                self.ensure(id, &*module, module_analysis::<M>)?;
                self.report.stages_run += 1;
            }
            StageBody::FunctionAnalysis(_) => {
                for func in module.functions() {
                    self.ensure(id, func, function_analysis::<M>)?;
                    self.report.stages_run += 1;
                }
            }
        }
        Ok(())
    }

    /// Collect the analyses a stage declared, computing what is missing
    fn view<U: Unit>(
        &mut self,
        info: &StageInfo,
        unit: &U,
        pick: Picker<M, U>,
    ) -> Result<AnalysisView, ExecutionError> {
        let mut view = AnalysisView::new();
        for &required in &info.requires {
            let result = self.ensure(required, unit, pick)?;
            view.insert(required, result);
        }
        Ok(view)
    }

    /// Serve an analysis from the cache or compute and cache it
    fn ensure<U: Unit>(
        &mut self,
        id: StageId,
        unit: &U,
        pick: Picker<M, U>,
    ) -> Result<AnalysisResult, ExecutionError> {
        let unit_id = unit.unit_id();
        if let Some(cached) = self.cache.get(id, unit_id) {
            self.report.cache_hits += 1;
            trace!(target: "passline::executor", analysis = %id, %unit_id, "cache hit");
            return Ok(cached.clone());
        }

        let registry = self.registry;
        let table = self.table;
        let info = lookup(registry, id)?;
        let analysis = table
            .get(id)
            .and_then(pick)
            .ok_or(ConfigurationError::Unbound(id))?;

        // registry validation rules out cycles, so this recursion terminates
        let view = self.view(info, unit, pick)?;
        let result = analysis
            .analyze(unit, &view)
            .map_err(|source| ExecutionError::StageFailed {
                stage: id,
                unit: unit_id,
                source,
            })?;
        self.report.analyses_computed += 1;
        trace!(target: "passline::executor", analysis = %id, %unit_id, "analysis computed");
        self.cache
            .insert(id, unit_id, info.analysis_kind(), result.clone());
        Ok(result)
    }

    fn invalidate(&mut self, units: &[UnitId], footprint: &Invalidation) {
        for &unit in units {
            let dropped = self.cache.invalidate(unit, footprint);
            if dropped > 0 {
                trace!(target: "passline::executor", %unit, dropped, "analyses invalidated");
            }
            self.report.invalidated += dropped;
        }
    }
}

fn lookup(registry: &StageRegistry, id: StageId) -> Result<&StageInfo, ConfigurationError> {
    registry
        .get(id)
        .ok_or_else(|| ConfigurationError::UnknownStage {
            name: id.name().to_string(),
        })
}
