//! Passline Core
//!
//! Stage registry, optimization policy, pipeline builder and executor.
//!
//! Building a pipeline is pure configuration and never runs a stage. A
//! built [`Pipeline`] is immutable and can be shared by any number of
//! [`Executor`]s, one per compilation unit.

pub mod analysis;
pub mod builder;
pub mod disabled;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod stage;
pub mod targets;
pub mod unit;

pub use analysis::{result, AnalysisCache, AnalysisResult, AnalysisView};
pub use builder::{check_order, PhaseBuilder, PhaseHook, PhaseHooks, PipelineBuilder, Target};
pub use disabled::DisabledSet;
pub use error::{ConfigurationError, ExecutionError, StageError};
pub use executor::{Executor, RunReport, UnitStatus};
pub use pipeline::{Invocation, Pipeline, SkipReason, Skipped};
pub use policy::{Policy, Resolution};
pub use registry::{RegistryBuilder, StageRegistry};
pub use stage::{
    Analysis, AnalysisKind, FnStage, Granularity, Invalidation, Outcome, Placeholder, StageBody,
    StageId, StageInfo, StageKind, StageTable, Transform,
};
pub use targets::{build_pipeline, target, TargetKind};
pub use unit::{Module, Unit, UnitId};

// 配置词汇表
pub use passline_config as config;
