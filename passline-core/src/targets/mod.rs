//! Target tables
//!
//! A target is a stage catalogue, a phase hook table and a disabled set.
//! [`build_pipeline`] is the single entry point a compilation driver needs.

pub mod amdgpu;
pub mod generic;

use crate::builder::{PipelineBuilder, Target};
use crate::disabled::DisabledSet;
use crate::error::ConfigurationError;
use crate::pipeline::Pipeline;
use crate::registry::StageRegistry;
use passline_config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known targets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Generic,
    #[default]
    Amdgpu,
}

impl TargetKind {
    pub const ALL: [TargetKind; 2] = [TargetKind::Generic, TargetKind::Amdgpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Generic => "generic",
            TargetKind::Amdgpu => "amdgpu",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown target '{s}'"))
    }
}

/// Assemble the target table for `kind`
///
/// # Errors
/// Fails when the stage catalogue does not validate.
pub fn target(kind: TargetKind) -> Result<Target, ConfigurationError> {
    let mut builder = StageRegistry::builder();
    let (hooks, disabled) = match kind {
        TargetKind::Generic => {
            generic::register(&mut builder);
            (generic::HOOKS, DisabledSet::new())
        }
        TargetKind::Amdgpu => {
            amdgpu::register(&mut builder);
            (amdgpu::HOOKS, amdgpu::disabled())
        }
    };

    Ok(Target {
        name: kind.as_str(),
        registry: builder.build()?,
        hooks,
        disabled,
    })
}

/// Produce the ordered pipeline for one target configuration
///
/// # Errors
/// Any [`ConfigurationError`] raised while building.
pub fn build_pipeline(
    kind: TargetKind,
    config: &PipelineConfig,
) -> Result<Pipeline, ConfigurationError> {
    let target = target(kind)?;
    PipelineBuilder::new(&target, config).build()
}
