//! Passline - ordered codegen pass pipelines
//!
//! Passline decides which compilation stages run, in what order and under
//! which conditions, then drives them over any IR that implements
//! [`Module`].
//!
//! # Architecture
//!
//! ```text
//! passline-config/  - Pure configuration data (levels, flags, options)
//! passline-core/    - Registry, policy, builder, executor, target tables
//! passline-cli/     - `passline` binary printing resolved pipelines
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use passline::{OptLevel, PipelineConfig, Session, StageTable, TargetKind};
//!
//! let session = Session::new(TargetKind::Amdgpu, &PipelineConfig::at(OptLevel::Aggressive))?;
//! let table = StageTable::placeholders(session.registry());
//! let mut executor = session.executor(&table)?;
//! executor.run(&mut module)?;
//! ```

pub use passline_config::{
    AmdgpuOptions, AtomicScanStrategy, CodeGenOptions, Flag, OptLevel, Phase, PipelineConfig,
};
pub use passline_core::*;

use tracing::instrument;

/// A target with one resolved pipeline, shared by all units of a session
///
/// The session is read only once built; hand out one [`Executor`] per unit.
#[derive(Debug, Clone)]
pub struct Session {
    target: Target,
    pipeline: Pipeline,
}

impl Session {
    /// Build the target table and its pipeline for `config`
    ///
    /// # Errors
    /// Any [`ConfigurationError`] raised while building.
    #[instrument(target = "passline::builder", skip(config), fields(level = %config.opt_level))]
    pub fn new(kind: TargetKind, config: &PipelineConfig) -> Result<Self, ConfigurationError> {
        let target = target(kind)?;
        let pipeline = PipelineBuilder::new(&target, config).build()?;
        Ok(Self { target, pipeline })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.target.registry
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Create an executor for one unit
    ///
    /// # Errors
    /// `Unbound` or `BodyMismatch` when `table` does not cover the pipeline.
    pub fn executor<'s, M: Module>(
        &'s self,
        table: &'s StageTable<M>,
    ) -> Result<Executor<'s, M>, ConfigurationError> {
        Executor::new(&self.pipeline, &self.target.registry, table)
    }
}
