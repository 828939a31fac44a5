//! Disablement table
//!
//! Stages listed here are meaningless for the target (no exception
//! unwinding, no garbage collection, no stack maps). They are never
//! inserted, whatever the policy or the user asked for.

use crate::stage::StageId;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DisabledSet {
    stages: BTreeSet<StageId>,
}

impl DisabledSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask the given stages
    pub fn disable(&mut self, stages: impl IntoIterator<Item = StageId>) -> &mut Self {
        self.stages.extend(stages);
        self
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.stages.contains(&stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<StageId> for DisabledSet {
    fn from_iter<I: IntoIterator<Item = StageId>>(iter: I) -> Self {
        let mut set = Self::new();
        set.disable(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable() {
        let mut set = DisabledSet::new();
        assert!(set.is_empty());
        set.disable([StageId::new("funclet-layout"), StageId::new("stackmap-liveness")])
            .disable([StageId::new("funclet-layout")]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(StageId::new("stackmap-liveness")));
        assert!(!set.contains(StageId::new("sink")));
        // iteration is sorted by name
        assert_eq!(
            set.iter().map(|s| s.name()).collect::<Vec<_>>(),
            vec!["funclet-layout", "stackmap-liveness"]
        );
    }
}
