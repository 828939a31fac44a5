//! 测试辅助工具
//!
//! 提供一个最小的玩具 IR，以及记录执行顺序的 stage 表

#![allow(dead_code)]

use passline::{
    result, AnalysisView, Granularity, Module, Outcome, StageBody, StageError, StageId,
    StageKind, StageRegistry, StageTable, Unit, UnitId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A function of the toy IR
#[derive(Debug, Clone)]
pub struct ToyFunction {
    pub id: UnitId,
    pub name: &'static str,
    /// Irreducible control flow cannot be annotated without structurizing
    pub irreducible: bool,
    pub structured: bool,
    /// Names of the stages that ran on this function, in order
    pub log: Vec<&'static str>,
}

impl Unit for ToyFunction {
    fn unit_id(&self) -> UnitId {
        self.id
    }
}

/// A module of the toy IR
#[derive(Debug, Clone)]
pub struct ToyModule {
    pub id: UnitId,
    pub functions: Vec<ToyFunction>,
    pub log: Vec<&'static str>,
}

impl Unit for ToyModule {
    fn unit_id(&self) -> UnitId {
        self.id
    }
}

impl Module for ToyModule {
    type Function = ToyFunction;

    fn functions(&self) -> &[ToyFunction] {
        &self.functions
    }

    fn functions_mut(&mut self) -> &mut [ToyFunction] {
        &mut self.functions
    }
}

/// Build a module whose functions get consecutive ids after the module's
pub fn module(base: u64, names: &[&'static str]) -> ToyModule {
    let functions = names
        .iter()
        .enumerate()
        .map(|(i, &name)| ToyFunction {
            id: UnitId(base + 1 + i as u64),
            name,
            irreducible: false,
            structured: false,
            log: Vec::new(),
        })
        .collect();
    ToyModule {
        id: UnitId(base),
        functions,
        log: Vec::new(),
    }
}

/// How many times each analysis was computed
#[derive(Debug, Default, Clone)]
pub struct Counters {
    counts: Arc<HashMap<StageId, AtomicUsize>>,
}

impl Counters {
    pub fn get(&self, id: StageId) -> usize {
        self.counts
            .get(&id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn bump(&self, id: StageId) {
        if let Some(count) = self.counts.get(&id) {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Bind every registered stage to a body that records its name
///
/// Transforms report no change and analyses count their computations.
pub fn recording_table(registry: &StageRegistry) -> (StageTable<ToyModule>, Counters) {
    let counts: HashMap<StageId, AtomicUsize> = registry
        .iter()
        .filter(|info| info.is_analysis())
        .map(|info| (info.id, AtomicUsize::new(0)))
        .collect();
    let counters = Counters {
        counts: Arc::new(counts),
    };

    let mut table = StageTable::new();
    for info in registry.iter() {
        let id = info.id;
        let body = match (info.kind, info.granularity) {
            (StageKind::Transform, Granularity::Module) => {
                StageBody::module_transform(move |m: &mut ToyModule, _: &AnalysisView| {
                    m.log.push(id.name());
                    Ok(Outcome::Unchanged)
                })
            }
            (StageKind::Transform, Granularity::Function) => {
                StageBody::function_transform(move |f: &mut ToyFunction, _: &AnalysisView| {
                    f.log.push(id.name());
                    Ok(Outcome::Unchanged)
                })
            }
            (StageKind::Analysis, Granularity::Module) => {
                let counters = counters.clone();
                StageBody::module_analysis(move |_: &ToyModule, _: &AnalysisView| {
                    counters.bump(id);
                    Ok(result(id.name()))
                })
            }
            (StageKind::Analysis, Granularity::Function) => {
                let counters = counters.clone();
                StageBody::function_analysis(move |f: &ToyFunction, _: &AnalysisView| {
                    counters.bump(id);
                    Ok(result(f.name))
                })
            }
        };
        table.bind(id, body);
    }
    (table, counters)
}

/// Structurizer body that marks functions structured and reports a change
pub fn structurizer() -> StageBody<ToyModule> {
    StageBody::function_transform(|f: &mut ToyFunction, _: &AnalysisView| {
        f.log.push("structurizecfg");
        f.structured = true;
        Ok(Outcome::Changed)
    })
}

/// Control flow annotation that refuses irreducible, unstructured input
pub fn strict_annotator() -> StageBody<ToyModule> {
    StageBody::function_transform(|f: &mut ToyFunction, _: &AnalysisView| {
        if f.irreducible && !f.structured {
            return Err(StageError::msg(format!("{} has irreducible control flow", f.name)));
        }
        f.log.push("si-annotate-control-flow");
        Ok(Outcome::Unchanged)
    })
}
