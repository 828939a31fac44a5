//! Stage registry
//!
//! The catalogue of stages a target knows about. It is assembled once with a
//! [`RegistryBuilder`], validated, and frozen; there is no removal. Masking a
//! stage at runtime is the job of the [`DisabledSet`](crate::disabled::DisabledSet).

use crate::error::ConfigurationError;
use crate::stage::{Granularity, Invalidation, StageId, StageInfo};
use std::collections::HashMap;

/// Collects stage descriptions before validation
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    stages: Vec<StageInfo>,
}

impl RegistryBuilder {
    /// Create a new empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage
    pub fn register(&mut self, info: StageInfo) -> &mut Self {
        self.stages.push(info);
        self
    }

    /// Register a module transform with the default footprint
    pub fn module_transform(&mut self, id: StageId) -> &mut Self {
        self.register(StageInfo::transform(id, Granularity::Module))
    }

    /// Register a function transform with the default footprint
    pub fn function_transform(&mut self, id: StageId) -> &mut Self {
        self.register(StageInfo::transform(id, Granularity::Function))
    }

    /// Validate and freeze
    ///
    /// # Errors
    /// Duplicate names, requirements that are not analyses of the same
    /// granularity, ordering edges to unregistered stages, analyses with an
    /// invalidation footprint and cycles between analyses.
    pub fn build(self) -> Result<StageRegistry, ConfigurationError> {
        let mut index = HashMap::with_capacity(self.stages.len());
        for (i, info) in self.stages.iter().enumerate() {
            if index.insert(info.id, i).is_some() {
                return Err(ConfigurationError::DuplicateStage(info.id));
            }
        }

        let registry = StageRegistry {
            stages: self.stages,
            index,
        };
        registry.validate()?;
        Ok(registry)
    }
}

/// Frozen stage catalogue
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageInfo>,
    index: HashMap<StageId, usize>,
}

impl StageRegistry {
    /// Start a new registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Get a stage by identity
    pub fn get(&self, id: StageId) -> Option<&StageInfo> {
        self.index.get(&id).map(|&i| &self.stages[i])
    }

    /// Look a stage up by name
    pub fn lookup(&self, name: &str) -> Option<&StageInfo> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// Resolve a name to a registered identity
    ///
    /// # Errors
    /// `UnknownStage` when nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<StageId, ConfigurationError> {
        self.lookup(name)
            .map(|info| info.id)
            .ok_or_else(|| ConfigurationError::UnknownStage {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.index.contains_key(&id)
    }

    /// Iterate stages in registration order
    pub fn iter(&self) -> impl Iterator<Item = &StageInfo> {
        self.stages.iter()
    }

    /// Get all stage names in registration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.id.name())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn require(&self, id: StageId) -> Result<&StageInfo, ConfigurationError> {
        self.get(id).ok_or_else(|| ConfigurationError::UnknownStage {
            name: id.name().to_string(),
        })
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        for info in &self.stages {
            if info.is_analysis() && info.invalidates != Invalidation::Nothing {
                return Err(ConfigurationError::AnalysisWithFootprint(info.id));
            }
            for &required in &info.requires {
                let dep = self.require(required)?;
                if !dep.is_analysis() {
                    return Err(ConfigurationError::NotAnAnalysis {
                        stage: info.id,
                        required,
                    });
                }
                if dep.granularity != info.granularity {
                    return Err(ConfigurationError::GranularityMismatch {
                        stage: info.id,
                        required,
                    });
                }
            }
            for &other in info.prerequisites.iter().chain(&info.after) {
                self.require(other)?;
            }
        }
        self.check_analysis_cycles()
    }

    // Depth first walk over `requires` edges between analyses.
    fn check_analysis_cycles(&self) -> Result<(), ConfigurationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        fn visit(
            registry: &StageRegistry,
            i: usize,
            marks: &mut [Mark],
        ) -> Result<(), ConfigurationError> {
            match marks[i] {
                Mark::Done => return Ok(()),
                Mark::Active => return Err(ConfigurationError::AnalysisCycle(registry.stages[i].id)),
                Mark::Unvisited => {}
            }
            marks[i] = Mark::Active;
            for required in &registry.stages[i].requires {
                visit(registry, registry.index[required], marks)?;
            }
            marks[i] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.stages.len()];
        for (i, info) in self.stages.iter().enumerate() {
            if info.is_analysis() {
                visit(self, i, &mut marks)?;
            }
        }
        Ok(())
    }
}
