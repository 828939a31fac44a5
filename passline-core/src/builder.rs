//! Pipeline builder
//!
//! Targets customize the pipeline through a [`PhaseHooks`] table: one plain
//! function per phase, called in fixed phase order with a [`PhaseBuilder`].
//! A hook that wants the target independent behavior calls the generic hook
//! explicitly; there is no overriding.
//!
//! Building is pure configuration. No stage runs here, and the only failure
//! is a [`ConfigurationError`].

use crate::disabled::DisabledSet;
use crate::error::ConfigurationError;
use crate::pipeline::{Invocation, Pipeline, SkipReason, Skipped};
use crate::policy::Policy;
use crate::registry::StageRegistry;
use crate::stage::StageId;
use passline_config::{AmdgpuOptions, CodeGenOptions, Flag, OptLevel, Phase, PipelineConfig};
use tracing::{debug, instrument, trace};

/// Fills one phase of a pipeline
pub type PhaseHook = fn(&mut PhaseBuilder<'_>) -> Result<(), ConfigurationError>;

/// Hook that adds nothing
pub fn empty_phase(_builder: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    Ok(())
}

/// Per-target phase table
#[derive(Clone, Copy)]
pub struct PhaseHooks {
    pub preprocess: PhaseHook,
    pub mid_level_opt: PhaseHook,
    pub codegen_prepare: PhaseHook,
    pub pre_isel: PhaseHook,
    pub inst_select: PhaseHook,
    pub post_isel: PhaseHook,
}

impl PhaseHooks {
    /// A table where every phase is empty
    pub const EMPTY: PhaseHooks = PhaseHooks {
        preprocess: empty_phase,
        mid_level_opt: empty_phase,
        codegen_prepare: empty_phase,
        pre_isel: empty_phase,
        inst_select: empty_phase,
        post_isel: empty_phase,
    };

    /// Get the hook for a phase
    pub fn hook(&self, phase: Phase) -> PhaseHook {
        match phase {
            Phase::Preprocess => self.preprocess,
            Phase::MidLevelOpt => self.mid_level_opt,
            Phase::CodeGenPrepare => self.codegen_prepare,
            Phase::PreIsel => self.pre_isel,
            Phase::InstSelect => self.inst_select,
            Phase::PostIsel => self.post_isel,
        }
    }
}

impl std::fmt::Debug for PhaseHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseHooks").finish_non_exhaustive()
    }
}

impl Default for PhaseHooks {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Everything the builder needs to know about one target
#[derive(Debug, Clone)]
pub struct Target {
    pub name: &'static str,
    pub registry: StageRegistry,
    pub hooks: PhaseHooks,
    /// Stages meaningless for this target
    pub disabled: DisabledSet,
}

/// Builder state handed to phase hooks
pub struct PhaseBuilder<'a> {
    registry: &'a StageRegistry,
    disabled: &'a DisabledSet,
    config: &'a PipelineConfig,
    policy: Policy,
    phase: Phase,
    group: Option<&'static str>,
    /// Set while filling a branch the target left out; additions are logged
    suppressed: Option<SkipReason>,
    invocations: Vec<Invocation>,
    skipped: Vec<Skipped>,
}

impl<'a> PhaseBuilder<'a> {
    /// Get the session optimization level
    pub fn level(&self) -> OptLevel {
        self.policy.level()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn config(&self) -> &'a PipelineConfig {
        self.config
    }

    pub fn amdgpu(&self) -> &'a AmdgpuOptions {
        &self.config.amdgpu
    }

    pub fn codegen(&self) -> &'a CodeGenOptions {
        &self.config.codegen
    }

    /// Get the phase currently being filled
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Check a flag with the session policy
    pub fn is_enabled(&self, flag: &Flag) -> bool {
        self.policy.is_enabled(flag)
    }

    /// Check whether a stage is masked for this build
    pub fn is_disabled(&self, stage: StageId) -> bool {
        self.disabled.contains(stage)
    }

    /// Append an always-run stage
    ///
    /// Returns whether the stage was inserted; a disabled stage is skipped.
    ///
    /// # Errors
    /// `UnknownStage` when the stage is not registered.
    pub fn add(&mut self, stage: StageId) -> Result<bool, ConfigurationError> {
        if !self.admit(stage)? {
            return Ok(false);
        }
        self.push(stage);
        Ok(true)
    }

    /// Append an optional stage if the policy enables `flag`
    ///
    /// The disabled set is consulted first; the policy never sees a masked
    /// stage.
    ///
    /// # Errors
    /// `UnknownStage` when the stage is not registered.
    pub fn add_if(&mut self, stage: StageId, flag: &Flag) -> Result<bool, ConfigurationError> {
        if !self.admit(stage)? {
            return Ok(false);
        }
        let resolution = self.policy.resolve(flag);
        if !resolution.enabled() {
            trace!(target: "passline::policy", %stage, ?resolution, "stage turned off");
            self.record(stage, SkipReason::Policy(resolution));
            return Ok(false);
        }
        self.push(stage);
        Ok(true)
    }

    /// Append a stage the target only runs from `min_level` up
    ///
    /// # Errors
    /// `UnknownStage` when the stage is not registered.
    pub fn add_at(
        &mut self,
        stage: StageId,
        min_level: OptLevel,
    ) -> Result<bool, ConfigurationError> {
        self.at(min_level, |b| b.add(stage))
    }

    /// Append a stage when a target mode holds, logging `mode` otherwise
    ///
    /// # Errors
    /// `UnknownStage` when the stage is not registered.
    pub fn add_when(
        &mut self,
        stage: StageId,
        cond: bool,
        mode: &'static str,
    ) -> Result<bool, ConfigurationError> {
        self.when(cond, mode, |b| b.add(stage))
    }

    /// Fill a branch that only runs from `min_level` up
    ///
    /// Below the level every stage the branch offers is logged as skipped
    /// instead of inserted.
    pub fn at<T, F>(&mut self, min_level: OptLevel, f: F) -> Result<T, ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<T, ConfigurationError>,
    {
        let reason = (self.level() < min_level).then_some(SkipReason::Level(min_level));
        self.scoped(reason, f)
    }

    /// Fill a branch that only runs when `cond` holds
    pub fn when<T, F>(
        &mut self,
        cond: bool,
        mode: &'static str,
        f: F,
    ) -> Result<T, ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<T, ConfigurationError>,
    {
        let reason = (!cond).then_some(SkipReason::Mode(mode));
        self.scoped(reason, f)
    }

    /// Fill a branch that only runs when the policy enables `flag`
    pub fn gate<T, F>(&mut self, flag: &Flag, f: F) -> Result<T, ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<T, ConfigurationError>,
    {
        let resolution = self.policy.resolve(flag);
        let reason = (!resolution.enabled()).then_some(SkipReason::Policy(resolution));
        self.scoped(reason, f)
    }

    /// Insert a labelled atomic group
    ///
    /// Invocations added by `f` keep their relative order and carry `label`.
    pub fn group<F>(&mut self, label: &'static str, f: F) -> Result<(), ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<(), ConfigurationError>,
    {
        let outer = self.group.replace(label);
        let result = f(self);
        self.group = outer;
        result
    }

    /// Insert a labelled group when the policy enables `flag`
    pub fn group_if<F>(
        &mut self,
        label: &'static str,
        flag: &Flag,
        f: F,
    ) -> Result<(), ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<(), ConfigurationError>,
    {
        self.gate(flag, |b| b.group(label, f))
    }

    fn scoped<T, F>(&mut self, reason: Option<SkipReason>, f: F) -> Result<T, ConfigurationError>
    where
        F: FnOnce(&mut Self) -> Result<T, ConfigurationError>,
    {
        let outer = self.suppressed;
        // the outermost reason explains the whole branch
        if outer.is_none() {
            self.suppressed = reason;
        }
        let result = f(self);
        self.suppressed = outer;
        result
    }

    /// Decide whether an offered stage may go on to its own condition
    ///
    /// Checks run in order: registration, the disabled set, an enclosing
    /// branch left out, then masked prerequisites.
    fn admit(&mut self, stage: StageId) -> Result<bool, ConfigurationError> {
        let registry = self.registry;
        let Some(info) = registry.get(stage) else {
            return Err(ConfigurationError::UnknownStage {
                name: stage.name().to_string(),
            });
        };
        if self.disabled.contains(stage) {
            trace!(target: "passline::builder", %stage, "stage disabled for target");
            self.record(stage, SkipReason::Disabled);
            return Ok(false);
        }
        if let Some(reason) = self.suppressed {
            trace!(target: "passline::builder", %stage, %reason, "stage left out");
            self.record(stage, reason);
            return Ok(false);
        }
        let masked = info
            .prerequisites
            .iter()
            .copied()
            .find(|&p| !self.is_inserted(p) && self.is_masked(p));
        if let Some(prerequisite) = masked {
            debug!(target: "passline::builder", %stage, %prerequisite, "prerequisite masked");
            self.record(stage, SkipReason::Prerequisite(prerequisite));
            return Ok(false);
        }
        Ok(true)
    }

    fn is_inserted(&self, stage: StageId) -> bool {
        self.invocations.iter().any(|i| i.stage == stage)
    }

    /// Disabled directly, or dropped because its own prerequisite was
    fn is_masked(&self, stage: StageId) -> bool {
        self.disabled.contains(stage)
            || self.skipped.iter().any(|s| {
                s.stage == stage && matches!(s.reason, SkipReason::Prerequisite(_))
            })
    }

    fn record(&mut self, stage: StageId, reason: SkipReason) {
        self.skipped.push(Skipped {
            stage,
            phase: self.phase,
            reason,
        });
    }

    fn push(&mut self, stage: StageId) {
        // admit ran first
        let registry = self.registry;
        let Some(info) = registry.get(stage) else {
            return;
        };
        trace!(target: "passline::builder", %stage, phase = %self.phase, group = ?self.group, "stage added");
        self.invocations.push(Invocation {
            stage,
            phase: self.phase,
            group: self.group,
            kind: info.kind,
            granularity: info.granularity,
        });
    }
}

/// Resolves a target and a configuration into a [`Pipeline`]
pub struct PipelineBuilder<'a> {
    target: &'a Target,
    config: &'a PipelineConfig,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(target: &'a Target, config: &'a PipelineConfig) -> Self {
        Self { target, config }
    }

    /// Walk the phases in order and check ordering constraints
    ///
    /// # Errors
    /// Unknown stage names (in hooks or in the configuration's extra disabled
    /// list) and violated `prerequisites`/`after` constraints.
    #[instrument(
        target = "passline::builder",
        skip_all,
        fields(name = self.target.name, level = %self.config.opt_level)
    )]
    pub fn build(self) -> Result<Pipeline, ConfigurationError> {
        let mut disabled = self.target.disabled.clone();
        for name in &self.config.disabled {
            disabled.disable([self.target.registry.resolve(name)?]);
        }

        let mut state = PhaseBuilder {
            registry: &self.target.registry,
            disabled: &disabled,
            config: self.config,
            policy: Policy::new(self.config.opt_level),
            phase: Phase::Preprocess,
            group: None,
            suppressed: None,
            invocations: Vec::new(),
            skipped: Vec::new(),
        };

        for phase in Phase::ALL {
            state.phase = phase;
            let before = state.invocations.len();
            (self.target.hooks.hook(phase))(&mut state)?;
            debug!(
                target: "passline::builder",
                %phase,
                stages = state.invocations.len() - before,
                "phase assembled"
            );
        }

        let PhaseBuilder {
            invocations,
            skipped,
            ..
        } = state;
        check_order(&self.target.registry, &invocations)?;

        debug!(
            target: "passline::builder",
            stages = invocations.len(),
            skipped = skipped.len(),
            "pipeline built"
        );
        Ok(Pipeline::new(
            self.target.name,
            self.config.opt_level,
            invocations,
            skipped,
        ))
    }
}

/// Check declared ordering constraints over a finished invocation list
pub fn check_order(
    registry: &StageRegistry,
    invocations: &[Invocation],
) -> Result<(), ConfigurationError> {
    for (i, inv) in invocations.iter().enumerate() {
        let Some(info) = registry.get(inv.stage) else {
            return Err(ConfigurationError::UnknownStage {
                name: inv.stage.name().to_string(),
            });
        };
        let earlier = &invocations[..i];
        let ran_before = |other: StageId| earlier.iter().any(|e| e.stage == other);

        for &prerequisite in &info.prerequisites {
            if !ran_before(prerequisite) {
                return Err(ConfigurationError::MissingPrerequisite {
                    stage: inv.stage,
                    prerequisite,
                });
            }
        }
        for &after in &info.after {
            let present = invocations.iter().any(|e| e.stage == after);
            if present && !ran_before(after) {
                return Err(ConfigurationError::OrderViolation {
                    stage: inv.stage,
                    after,
                });
            }
        }
    }
    Ok(())
}
