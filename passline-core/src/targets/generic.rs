//! Target independent codegen base
//!
//! Stages and phase hooks every target starts from. A target reuses them by
//! registering [`register`] into its own catalogue and calling the hooks
//! below from its own phase functions.

use crate::builder::{PhaseBuilder, PhaseHooks};
use crate::error::ConfigurationError;
use crate::registry::RegistryBuilder;
use crate::stage::{Granularity, Invalidation, StageId, StageInfo};
use passline_config::{Flag, OptLevel};

pub const VERIFY: StageId = StageId::new("verify");
pub const LOOP_REDUCE: StageId = StageId::new("loop-reduce");
pub const MERGE_ICMPS: StageId = StageId::new("mergeicmps");
pub const EXPAND_MEMCMP: StageId = StageId::new("expand-memcmp");
pub const GC_LOWERING: StageId = StageId::new("gc-lowering");
pub const SHADOW_STACK_GC_LOWERING: StageId = StageId::new("shadow-stack-gc-lowering");
pub const LOWER_CONSTANT_INTRINSICS: StageId = StageId::new("lower-constant-intrinsics");
pub const UNREACHABLE_BLOCK_ELIM: StageId = StageId::new("unreachableblockelim");
pub const CONSTANT_HOISTING: StageId = StageId::new("consthoist");
pub const REPLACE_WITH_VECLIB: StageId = StageId::new("replace-with-veclib");
pub const PARTIALLY_INLINE_LIBCALLS: StageId = StageId::new("partially-inline-libcalls");
pub const ENTRY_EXIT_INSTRUMENTER: StageId = StageId::new("ee-instrument");
pub const SCALARIZE_MASKED_MEM_INTRIN: StageId = StageId::new("scalarize-masked-mem-intrin");
pub const EXPAND_REDUCTIONS: StageId = StageId::new("expand-reductions");
pub const SELECT_OPTIMIZE: StageId = StageId::new("select-optimize");
pub const CODEGEN_PREPARE: StageId = StageId::new("codegenprepare");
pub const FINALIZE_ISEL: StageId = StageId::new("finalize-isel");
pub const FUNCLET_LAYOUT: StageId = StageId::new("funclet-layout");
pub const STACKMAP_LIVENESS: StageId = StageId::new("stackmap-liveness");
pub const LIVE_DEBUG_VALUES: StageId = StageId::new("live-debug-values");

pub const DOMTREE: StageId = StageId::new("domtree");
pub const LOOPS: StageId = StageId::new("loops");
pub const UNIFORMITY: StageId = StageId::new("uniformity");

/// Register the base stages and analyses
pub fn register(builder: &mut RegistryBuilder) {
    use Granularity::{Function, Module};

    builder
        .register(StageInfo::analysis(DOMTREE, Function).describe("dominator tree"))
        .register(
            StageInfo::analysis(LOOPS, Function)
                .requires(&[DOMTREE])
                .describe("natural loop forest"),
        )
        .register(
            StageInfo::analysis(UNIFORMITY, Function)
                .requires(&[DOMTREE])
                .describe("divergence of values and branches"),
        )
        .register(
            StageInfo::transform(VERIFY, Function)
                .invalidates(Invalidation::Nothing)
                .describe("IR verifier"),
        )
        .register(
            StageInfo::transform(LOOP_REDUCE, Function)
                .requires(&[LOOPS])
                .invalidates_only(&[UNIFORMITY])
                .describe("loop strength reduction"),
        )
        .function_transform(MERGE_ICMPS)
        .function_transform(EXPAND_MEMCMP)
        .function_transform(GC_LOWERING)
        .module_transform(SHADOW_STACK_GC_LOWERING)
        .function_transform(LOWER_CONSTANT_INTRINSICS)
        .function_transform(UNREACHABLE_BLOCK_ELIM)
        .register(
            StageInfo::transform(CONSTANT_HOISTING, Function)
                .requires(&[DOMTREE])
                .invalidates_only(&[UNIFORMITY]),
        )
        .function_transform(REPLACE_WITH_VECLIB)
        .function_transform(PARTIALLY_INLINE_LIBCALLS)
        .function_transform(ENTRY_EXIT_INSTRUMENTER)
        .function_transform(SCALARIZE_MASKED_MEM_INTRIN)
        .function_transform(EXPAND_REDUCTIONS)
        .register(StageInfo::transform(SELECT_OPTIMIZE, Function).requires(&[LOOPS]))
        .register(
            StageInfo::transform(CODEGEN_PREPARE, Function)
                .requires(&[LOOPS])
                .describe("target independent codegen preparation"),
        )
        .function_transform(FINALIZE_ISEL)
        .function_transform(FUNCLET_LAYOUT)
        .register(
            StageInfo::transform(STACKMAP_LIVENESS, Function).invalidates(Invalidation::Nothing),
        )
        .register(
            StageInfo::transform(LIVE_DEBUG_VALUES, Function).invalidates(Invalidation::Nothing),
        );
}

/// Flag for a base switch that runs above `-O0` unless the user turned it off
fn unless(disabled: bool) -> Flag {
    Flag {
        default: !disabled,
        explicit: None,
        min_level: OptLevel::Less,
    }
}

/// Flag for a base stage that runs above `-O0`
const OPTIMIZING: Flag = Flag::on().gated(OptLevel::Less);

/// Target independent IR passes, run at the end of mid-level optimization
pub fn add_ir_passes(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let codegen = b.codegen();

    // verification is not an optimization, the level gate does not apply
    b.add_when(VERIFY, !codegen.disable_verify, "verifier disabled")?;
    b.add_if(LOOP_REDUCE, &unless(codegen.disable_lsr))?;
    b.add_if(MERGE_ICMPS, &unless(codegen.disable_merge_icmps))?;
    b.add_if(EXPAND_MEMCMP, &OPTIMIZING)?;

    b.add(GC_LOWERING)?;
    b.add(SHADOW_STACK_GC_LOWERING)?;
    b.add(LOWER_CONSTANT_INTRINSICS)?;
    b.add(UNREACHABLE_BLOCK_ELIM)?;

    b.add_if(CONSTANT_HOISTING, &unless(codegen.disable_constant_hoisting))?;
    b.add_if(REPLACE_WITH_VECLIB, &OPTIMIZING)?;
    b.add_if(
        PARTIALLY_INLINE_LIBCALLS,
        &unless(codegen.disable_partial_libcall_inlining),
    )?;

    b.add(ENTRY_EXIT_INSTRUMENTER)?;
    b.add(SCALARIZE_MASKED_MEM_INTRIN)?;
    b.add(EXPAND_REDUCTIONS)?;

    b.add_if(SELECT_OPTIMIZE, &unless(codegen.disable_select_optimize))?;
    Ok(())
}

/// Target independent codegen preparation
pub fn add_codegen_prepare(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let flag = unless(b.codegen().disable_cgp);
    b.add_if(CODEGEN_PREPARE, &flag).map(drop)
}

/// Cleanup after instruction selection
pub fn add_post_isel(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    b.add(FINALIZE_ISEL)?;
    b.add(FUNCLET_LAYOUT)?;
    b.add(STACKMAP_LIVENESS)?;
    b.add(LIVE_DEBUG_VALUES)?;
    Ok(())
}

/// Phase table of a target that adds nothing of its own
pub const HOOKS: PhaseHooks = PhaseHooks {
    mid_level_opt: add_ir_passes,
    codegen_prepare: add_codegen_prepare,
    post_isel: add_post_isel,
    ..PhaseHooks::EMPTY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{PipelineBuilder, Target};
    use crate::pipeline::SkipReason;
    use crate::registry::StageRegistry;
    use passline_config::{Phase, PipelineConfig};

    fn target() -> Target {
        let mut builder = StageRegistry::builder();
        register(&mut builder);
        Target {
            name: "generic",
            registry: builder.build().unwrap(),
            hooks: HOOKS,
            disabled: Default::default(),
        }
    }

    #[test]
    fn test_o0_keeps_only_mandatory_stages() {
        let target = target();
        let config = PipelineConfig::at(OptLevel::None);
        let pipeline = PipelineBuilder::new(&target, &config).build().unwrap();

        assert_eq!(
            pipeline
                .phase(Phase::MidLevelOpt)
                .map(|i| i.stage.name())
                .collect::<Vec<_>>(),
            vec![
                "verify",
                "gc-lowering",
                "shadow-stack-gc-lowering",
                "lower-constant-intrinsics",
                "unreachableblockelim",
                "ee-instrument",
                "scalarize-masked-mem-intrin",
                "expand-reductions",
            ]
        );
        assert!(!pipeline.contains(CODEGEN_PREPARE));
    }

    #[test]
    fn test_disable_switches() {
        let target = target();
        let mut config = PipelineConfig::at(OptLevel::Default);
        let pipeline = PipelineBuilder::new(&target, &config).build().unwrap();
        assert!(pipeline.contains(LOOP_REDUCE));
        assert!(pipeline.contains(CODEGEN_PREPARE));

        config.codegen.disable_lsr = true;
        config.codegen.disable_cgp = true;
        config.codegen.disable_verify = true;
        let pipeline = PipelineBuilder::new(&target, &config).build().unwrap();
        assert!(!pipeline.contains(LOOP_REDUCE));
        assert!(!pipeline.contains(CODEGEN_PREPARE));
        assert!(!pipeline.contains(VERIFY));
        assert!(pipeline.contains(MERGE_ICMPS));
        assert!(pipeline
            .skipped()
            .iter()
            .any(|s| s.stage == VERIFY && s.reason == SkipReason::Mode("verifier disabled")));
    }

    #[test]
    fn test_post_isel() {
        let target = target();
        let pipeline = PipelineBuilder::new(&target, &PipelineConfig::default())
            .build()
            .unwrap();
        assert_eq!(
            pipeline
                .phase(Phase::PostIsel)
                .map(|i| i.stage.name())
                .collect::<Vec<_>>(),
            vec!["finalize-isel", "funclet-layout", "stackmap-liveness", "live-debug-values"]
        );
    }
}
