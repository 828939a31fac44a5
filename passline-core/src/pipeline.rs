//! Resolved pipelines
//!
//! A [`Pipeline`] is the ordered list of stage invocations produced by the
//! [`PipelineBuilder`](crate::builder::PipelineBuilder). It has no mutating
//! API: once built, the order is fixed for the whole compilation session.

use crate::policy::Resolution;
use crate::stage::{Granularity, StageId, StageKind};
use passline_config::{OptLevel, Phase};
use serde::Serialize;
use std::fmt;

/// One stage invocation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub stage: StageId,
    pub phase: Phase,
    /// Atomic group the invocation was inserted in, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<&'static str>,
    pub kind: StageKind,
    pub granularity: Granularity,
}

/// Why a candidate stage was left out
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Masked by the disabled set
    Disabled,
    /// Turned off by the optimization policy
    Policy(Resolution),
    /// Below the level the target inserts it at
    Level(OptLevel),
    /// Left out by a target mode, such as late structurization
    Mode(&'static str),
    /// A hard prerequisite was masked, so the stage cannot run either
    Prerequisite(StageId),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "disabled for the target"),
            SkipReason::Policy(resolution) => write!(f, "{resolution}"),
            SkipReason::Level(level) => write!(f, "needs at least -O{}", *level as u8),
            SkipReason::Mode(mode) => f.write_str(mode),
            SkipReason::Prerequisite(stage) => write!(f, "needs {stage}, which is disabled"),
        }
    }
}

/// A candidate stage that did not make it into the pipeline
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub stage: StageId,
    pub phase: Phase,
    pub reason: SkipReason,
}

/// Fully resolved, ordered stage list for one target configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    target: &'static str,
    level: OptLevel,
    invocations: Vec<Invocation>,
    skipped: Vec<Skipped>,
}

impl Pipeline {
    pub(crate) fn new(
        target: &'static str,
        level: OptLevel,
        invocations: Vec<Invocation>,
        skipped: Vec<Skipped>,
    ) -> Self {
        Self {
            target,
            level,
            invocations,
            skipped,
        }
    }

    /// Get the target this pipeline was built for
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn level(&self) -> OptLevel {
        self.level
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Get the candidates left out while building, in decision order
    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    /// Get the ordered stage identities
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.invocations.iter().map(|i| i.stage).collect()
    }

    /// Get the ordered stage names
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.invocations.iter().map(|i| i.stage.name()).collect()
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.invocations.iter().any(|i| i.stage == stage)
    }

    /// Get the index of the first invocation of `stage`
    pub fn position(&self, stage: StageId) -> Option<usize> {
        self.invocations.iter().position(|i| i.stage == stage)
    }

    /// Count the invocations of `stage`
    pub fn count(&self, stage: StageId) -> usize {
        self.invocations.iter().filter(|i| i.stage == stage).count()
    }

    /// Iterate the invocations of one phase
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &Invocation> {
        self.invocations.iter().filter(move |i| i.phase == phase)
    }

    /// Iterate the invocations of one group
    pub fn group<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Invocation> + 'a {
        self.invocations
            .iter()
            .filter(move |i| i.group == Some(label))
    }

    /// Iterate invocations that belong to no group
    pub fn ungrouped(&self) -> impl Iterator<Item = &Invocation> {
        self.invocations.iter().filter(|i| i.group.is_none())
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pipeline for {} at {}:", self.target, self.level)?;
        for phase in Phase::ALL {
            let mut stages = self.phase(phase).peekable();
            if stages.peek().is_none() {
                continue;
            }
            writeln!(f, "  {phase}:")?;
            for inv in stages {
                match inv.group {
                    Some(group) => writeln!(f, "    {} [{group}]", inv.stage)?,
                    None => writeln!(f, "    {}", inv.stage)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(name: &'static str, phase: Phase, group: Option<&'static str>) -> Invocation {
        Invocation {
            stage: StageId::new(name),
            phase,
            group,
            kind: StageKind::Transform,
            granularity: Granularity::Function,
        }
    }

    fn sample() -> Pipeline {
        Pipeline::new(
            "test",
            OptLevel::Default,
            vec![
                invocation("early-cse", Phase::MidLevelOpt, Some("scalar")),
                invocation("early-cse", Phase::MidLevelOpt, None),
                invocation("amdgpu-isel", Phase::InstSelect, None),
            ],
            vec![Skipped {
                stage: StageId::new("sink"),
                phase: Phase::PreIsel,
                reason: SkipReason::Disabled,
            }],
        )
    }

    #[test]
    fn test_queries() {
        let pipeline = sample();
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.count(StageId::new("early-cse")), 2);
        assert_eq!(pipeline.position(StageId::new("amdgpu-isel")), Some(2));
        assert_eq!(pipeline.group("scalar").count(), 1);
        assert_eq!(pipeline.ungrouped().count(), 2);
        assert_eq!(pipeline.phase(Phase::InstSelect).count(), 1);
        assert!(!pipeline.contains(StageId::new("sink")));
        assert_eq!(pipeline.skipped()[0].reason, SkipReason::Disabled);
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.starts_with("pipeline for test at default:"));
        assert!(text.contains("  mid-level-opt:\n    early-cse [scalar]\n    early-cse\n"));
        assert!(text.contains("  isel:\n    amdgpu-isel\n"));
        assert!(!text.contains("pre-isel"));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::Level(OptLevel::Less).to_string(),
            "needs at least -O1"
        );
        assert_eq!(
            SkipReason::Mode("structurization runs late").to_string(),
            "structurization runs late"
        );
        assert_eq!(
            SkipReason::Prerequisite(StageId::new("amdgpu-isel")).to_string(),
            "needs amdgpu-isel, which is disabled"
        );
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["target"], "test");
        assert_eq!(json["invocations"][0]["stage"], "early-cse");
        assert_eq!(json["invocations"][0]["group"], "scalar");
        assert!(json["invocations"][1].get("group").is_none());
        assert_eq!(json["skipped"][0]["reason"], "disabled");
    }
}
