//! AMDGPU codegen pipeline
//!
//! Phase hooks, stage catalogue and disabled set of the GPU target. The
//! hooks call into [`generic`] where the target keeps the base behavior.
//!
//! Ordering contracts between stages are declared on the stage metadata and
//! checked when the pipeline is built. Placements that only work around
//! downstream problems (buffer fat pointer lowering sitting before the base
//! codegen preparation) are kept as plain insertion order.

use super::generic;
use crate::builder::{PhaseBuilder, PhaseHooks};
use crate::disabled::DisabledSet;
use crate::error::ConfigurationError;
use crate::registry::RegistryBuilder;
use crate::stage::{Granularity, Invalidation, StageId, StageInfo};
use passline_config::{AtomicScanStrategy, Flag, OptLevel};

pub const PRINTF_RUNTIME_BINDING: StageId = StageId::new("amdgpu-printf-runtime-binding");
pub const LOWER_CTOR_DTOR: StageId = StageId::new("amdgpu-lower-ctor-dtor");
pub const IMAGE_INTRINSIC_OPT: StageId = StageId::new("amdgpu-image-intrinsic-opt");
pub const EXPAND_VARIADICS: StageId = StageId::new("expand-variadics");
pub const AMDGPU_ALWAYS_INLINE: StageId = StageId::new("amdgpu-always-inline");
pub const ALWAYS_INLINE: StageId = StageId::new("always-inline");
pub const LOWER_MODULE_LDS: StageId = StageId::new("amdgpu-lower-module-lds");

pub const INFER_ADDRESS_SPACES: StageId = StageId::new("infer-address-spaces");
pub const ATOMIC_OPTIMIZER: StageId = StageId::new("amdgpu-atomic-optimizer");
pub const ATOMIC_EXPAND: StageId = StageId::new("atomic-expand");
pub const PROMOTE_ALLOCA: StageId = StageId::new("amdgpu-promote-alloca");
pub const AMDGPU_CODEGEN_PREPARE: StageId = StageId::new("amdgpu-codegenprepare");

pub const LOOP_DATA_PREFETCH: StageId = StageId::new("loop-data-prefetch");
pub const SEPARATE_CONST_OFFSET: StageId = StageId::new("separate-const-offset-from-gep");
pub const STRAIGHT_LINE_STRENGTH_REDUCE: StageId = StageId::new("slsr");
pub const GVN: StageId = StageId::new("gvn");
pub const EARLY_CSE: StageId = StageId::new("early-cse");
pub const NARY_REASSOCIATE: StageId = StageId::new("nary-reassociate");

pub const LOWER_KERNEL_ARGUMENTS: StageId = StageId::new("amdgpu-lower-kernel-arguments");
pub const LOWER_BUFFER_FAT_POINTERS: StageId = StageId::new("amdgpu-lower-buffer-fat-pointers");
pub const LOAD_STORE_VECTORIZER: StageId = StageId::new("load-store-vectorizer");
pub const LOWER_SWITCH: StageId = StageId::new("lower-switch");

pub const FLATTEN_CFG: StageId = StageId::new("flattencfg");
pub const SINK: StageId = StageId::new("sink");
pub const LATE_CODEGEN_PREPARE: StageId = StageId::new("amdgpu-late-codegenprepare");
pub const UNIFY_DIVERGENT_EXIT_NODES: StageId = StageId::new("amdgpu-unify-divergent-exit-nodes");
pub const FIX_IRREDUCIBLE: StageId = StageId::new("fix-irreducible");
pub const UNIFY_LOOP_EXITS: StageId = StageId::new("unify-loop-exits");
pub const STRUCTURIZE_CFG: StageId = StageId::new("structurizecfg");
pub const ANNOTATE_UNIFORM_VALUES: StageId = StageId::new("amdgpu-annotate-uniform");
pub const SI_ANNOTATE_CONTROL_FLOW: StageId = StageId::new("si-annotate-control-flow");
pub const REWRITE_UNDEF_FOR_PHI: StageId = StageId::new("amdgpu-rewrite-undef-for-phi");
pub const LCSSA: StageId = StageId::new("lcssa");
pub const PERF_HINT: StageId = StageId::new("amdgpu-perf-hint");

pub const ISEL: StageId = StageId::new("amdgpu-isel");
pub const FIX_SGPR_COPIES: StageId = StageId::new("si-fix-sgpr-copies");
pub const LOWER_I1_COPIES: StageId = StageId::new("si-lower-i1-copies");

/// Label of the straight-line scalar optimization group
pub const STRAIGHT_LINE_GROUP: &str = "straight-line-scalar-opts";

/// Stages meaningless on the GPU: no exceptions, stack maps or garbage collection
pub fn disabled() -> DisabledSet {
    [
        generic::STACKMAP_LIVENESS,
        generic::FUNCLET_LAYOUT,
        generic::SHADOW_STACK_GC_LOWERING,
    ]
    .into_iter()
    .collect()
}

/// Register the base catalogue plus the AMDGPU stages
pub fn register(builder: &mut RegistryBuilder) {
    use generic::{DOMTREE, LOOPS, UNIFORMITY};
    use Granularity::{Function, Module};

    generic::register(builder);

    // preprocessing, module wide
    builder
        .module_transform(PRINTF_RUNTIME_BINDING)
        .module_transform(LOWER_CTOR_DTOR)
        .function_transform(IMAGE_INTRINSIC_OPT)
        .module_transform(EXPAND_VARIADICS)
        .module_transform(AMDGPU_ALWAYS_INLINE)
        .register(StageInfo::transform(ALWAYS_INLINE, Module).after(&[AMDGPU_ALWAYS_INLINE]))
        .register(
            StageInfo::transform(LOWER_MODULE_LDS, Module)
                .describe("lower LDS globals into per-kernel structs"),
        );

    // mid-level optimization
    builder
        .function_transform(INFER_ADDRESS_SPACES)
        .register(StageInfo::transform(ATOMIC_OPTIMIZER, Function).requires(&[UNIFORMITY]))
        .register(StageInfo::transform(ATOMIC_EXPAND, Function).after(&[ATOMIC_OPTIMIZER]))
        .register(
            StageInfo::transform(PROMOTE_ALLOCA, Function)
                .after(&[LOWER_MODULE_LDS])
                .describe("promote private allocas to registers or LDS"),
        )
        .register(
            StageInfo::transform(AMDGPU_CODEGEN_PREPARE, Function)
                .requires(&[UNIFORMITY])
                .after(&[PROMOTE_ALLOCA]),
        );

    // straight-line scalar optimizations
    builder
        .register(StageInfo::transform(LOOP_DATA_PREFETCH, Function).requires(&[LOOPS]))
        .register(
            StageInfo::transform(SEPARATE_CONST_OFFSET, Function)
                .requires(&[DOMTREE, LOOPS])
                .invalidates_only(&[UNIFORMITY]),
        )
        .register(
            StageInfo::transform(STRAIGHT_LINE_STRENGTH_REDUCE, Function)
                .requires(&[DOMTREE])
                .invalidates_only(&[UNIFORMITY])
                .after(&[SEPARATE_CONST_OFFSET]),
        )
        .register(
            StageInfo::transform(GVN, Function)
                .requires(&[DOMTREE])
                .invalidates_only(&[UNIFORMITY]),
        )
        .register(
            StageInfo::transform(EARLY_CSE, Function)
                .requires(&[DOMTREE])
                .invalidates_only(&[UNIFORMITY]),
        )
        .register(
            StageInfo::transform(NARY_REASSOCIATE, Function)
                .requires(&[DOMTREE])
                .invalidates_only(&[UNIFORMITY])
                .after(&[STRAIGHT_LINE_STRENGTH_REDUCE]),
        );

    // codegen preparation
    builder
        .function_transform(LOWER_KERNEL_ARGUMENTS)
        .module_transform(LOWER_BUFFER_FAT_POINTERS)
        .function_transform(LOAD_STORE_VECTORIZER)
        .function_transform(LOWER_SWITCH);

    // control flow lowering ahead of selection
    builder
        .function_transform(FLATTEN_CFG)
        .register(StageInfo::transform(SINK, Function).requires(&[DOMTREE, LOOPS]))
        .register(StageInfo::transform(LATE_CODEGEN_PREPARE, Function).requires(&[UNIFORMITY]))
        .register(
            StageInfo::transform(UNIFY_DIVERGENT_EXIT_NODES, Function).requires(&[UNIFORMITY]),
        )
        .register(StageInfo::transform(FIX_IRREDUCIBLE, Function).requires(&[DOMTREE]))
        .register(
            StageInfo::transform(UNIFY_LOOP_EXITS, Function)
                .requires(&[LOOPS])
                .after(&[FIX_IRREDUCIBLE]),
        )
        .register(
            StageInfo::transform(STRUCTURIZE_CFG, Function)
                .requires(&[UNIFORMITY])
                .after(&[UNIFY_DIVERGENT_EXIT_NODES, UNIFY_LOOP_EXITS])
                .describe("structurize divergent control flow"),
        )
        .register(
            StageInfo::transform(ANNOTATE_UNIFORM_VALUES, Function)
                .requires(&[UNIFORMITY])
                .invalidates(Invalidation::Nothing)
                .after(&[LOWER_BUFFER_FAT_POINTERS]),
        )
        .register(
            StageInfo::transform(SI_ANNOTATE_CONTROL_FLOW, Function)
                .requires(&[UNIFORMITY])
                .prerequisites(&[STRUCTURIZE_CFG])
                .describe("annotate structurized control flow for the SI backend"),
        )
        .register(
            StageInfo::transform(REWRITE_UNDEF_FOR_PHI, Function)
                .requires(&[UNIFORMITY])
                .after(&[SI_ANNOTATE_CONTROL_FLOW]),
        )
        .register(
            StageInfo::transform(LCSSA, Function)
                .requires(&[DOMTREE, LOOPS])
                .invalidates_only(&[UNIFORMITY]),
        )
        .register(StageInfo::analysis(PERF_HINT, Module).describe("memory bound kernel hints"));

    // instruction selection
    builder
        .register(
            StageInfo::transform(ISEL, Function)
                .requires(&[UNIFORMITY])
                .after(&[LCSSA]),
        )
        .register(StageInfo::transform(FIX_SGPR_COPIES, Function).prerequisites(&[ISEL]))
        .register(
            StageInfo::transform(LOWER_I1_COPIES, Function)
                .prerequisites(&[ISEL])
                .after(&[FIX_SGPR_COPIES]),
        );
}

/// Pick global value numbering at the maximum level, early CSE otherwise
fn add_early_cse_or_gvn(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let aggressive = b.level() == OptLevel::Aggressive;
    b.add_at(GVN, OptLevel::Aggressive)?;
    b.add_when(EARLY_CSE, !aggressive, "gvn replaces it at -O3")?;
    Ok(())
}

fn add_straight_line_scalar_opts(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let opts = b.amdgpu();
    b.group_if(STRAIGHT_LINE_GROUP, &opts.scalar_ir_passes, |b| {
        b.add_if(LOOP_DATA_PREFETCH, &opts.loop_prefetch)?;
        b.add(SEPARATE_CONST_OFFSET)?;
        b.add(STRAIGHT_LINE_STRENGTH_REDUCE)?;
        // cleans up what strength reduction leaves before reassociating
        add_early_cse_or_gvn(b)?;
        b.add(NARY_REASSOCIATE)?;
        b.add(EARLY_CSE)?;
        Ok(())
    })
}

fn add_preprocess(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let opts = b.amdgpu();

    b.add(PRINTF_RUNTIME_BINDING)?;
    b.add_if(LOWER_CTOR_DTOR, &opts.lower_ctor_dtor)?;
    b.add_if(IMAGE_INTRINSIC_OPT, &opts.image_intrinsic_optimizer)?;
    b.add(EXPAND_VARIADICS)?;
    b.add(AMDGPU_ALWAYS_INLINE)?;
    b.add(ALWAYS_INLINE)?;
    b.add_if(LOWER_MODULE_LDS, &opts.lower_module_lds)?;
    Ok(())
}

fn add_mid_level_opt(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let opts = b.amdgpu();

    b.add_at(INFER_ADDRESS_SPACES, OptLevel::Less)?;

    let atomic_optimizer = Flag {
        default: opts.atomic_optimizer_strategy != AtomicScanStrategy::None,
        explicit: None,
        min_level: OptLevel::Less,
    };
    b.add_if(ATOMIC_OPTIMIZER, &atomic_optimizer)?;
    b.add(ATOMIC_EXPAND)?;

    b.at(OptLevel::Less, |b| {
        b.add(PROMOTE_ALLOCA)?;
        add_straight_line_scalar_opts(b)?;
        b.add(AMDGPU_CODEGEN_PREPARE)?;
        Ok(())
    })?;

    generic::add_ir_passes(b)?;

    b.gate(&opts.scalar_ir_passes, add_early_cse_or_gvn)
}

fn add_codegen_prepare(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let opts = b.amdgpu();

    b.add_if(LOWER_KERNEL_ARGUMENTS, &opts.lower_kernel_arguments)?;
    // kept ahead of the base preparation so function stages still see the
    // call graph as it was before it runs
    b.add(LOWER_BUFFER_FAT_POINTERS)?;
    generic::add_codegen_prepare(b)?;
    b.add_if(LOAD_STORE_VECTORIZER, &opts.load_store_vectorizer)?;
    b.add(LOWER_SWITCH)?;
    Ok(())
}

/// Why the structurizer and its annotations stay out, if they do
fn structurizer_mode(b: &PhaseBuilder<'_>) -> (bool, &'static str) {
    let opts = b.amdgpu();
    if b.is_enabled(&opts.late_structurize_cfg) {
        (false, "structurization runs late")
    } else if b.is_enabled(&opts.disable_structurizer) {
        (false, "structurizer disabled")
    } else {
        (true, "")
    }
}

fn add_pre_isel(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    let opts = b.amdgpu();
    let (structurize, mode) = structurizer_mode(b);

    b.add_at(FLATTEN_CFG, OptLevel::Less)?;
    b.add_at(SINK, OptLevel::Less)?;
    b.add(LATE_CODEGEN_PREPARE)?;
    // the structurizer does not recognize multi-exit regions
    b.add(UNIFY_DIVERGENT_EXIT_NODES)?;

    b.when(structurize, mode, |b| {
        b.add_if(FIX_IRREDUCIBLE, &opts.structurizer_workarounds)?;
        b.add_if(UNIFY_LOOP_EXITS, &opts.structurizer_workarounds)?;
        b.add(STRUCTURIZE_CFG)
    })?;

    b.add(ANNOTATE_UNIFORM_VALUES)?;

    b.when(structurize, mode, |b| {
        b.add(SI_ANNOTATE_CONTROL_FLOW)?;
        b.add(REWRITE_UNDEF_FOR_PHI)
    })?;

    b.add(LCSSA)?;
    b.add_at(PERF_HINT, OptLevel::Default)?;
    b.add(generic::UNIFORMITY)?;
    Ok(())
}

fn add_inst_select(b: &mut PhaseBuilder<'_>) -> Result<(), ConfigurationError> {
    b.add(ISEL)?;
    b.add(FIX_SGPR_COPIES)?;
    b.add(LOWER_I1_COPIES)?;
    Ok(())
}

pub const HOOKS: PhaseHooks = PhaseHooks {
    preprocess: add_preprocess,
    mid_level_opt: add_mid_level_opt,
    codegen_prepare: add_codegen_prepare,
    pre_isel: add_pre_isel,
    inst_select: add_inst_select,
    post_isel: generic::add_post_isel,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{PipelineBuilder, Target};
    use crate::pipeline::{Pipeline, SkipReason};
    use crate::registry::StageRegistry;
    use passline_config::{Phase, PipelineConfig};

    fn target() -> Target {
        let mut builder = StageRegistry::builder();
        register(&mut builder);
        Target {
            name: "amdgpu",
            registry: builder.build().unwrap(),
            hooks: HOOKS,
            disabled: disabled(),
        }
    }

    fn build(config: &PipelineConfig) -> Pipeline {
        PipelineBuilder::new(&target(), config).build().unwrap()
    }

    fn names(pipeline: &Pipeline, phase: Phase) -> Vec<&'static str> {
        pipeline.phase(phase).map(|i| i.stage.name()).collect()
    }

    #[test]
    fn test_preprocess_prologue() {
        let pipeline = build(&PipelineConfig::at(OptLevel::Default));
        assert_eq!(
            names(&pipeline, Phase::Preprocess),
            vec![
                "amdgpu-printf-runtime-binding",
                "amdgpu-lower-ctor-dtor",
                "amdgpu-image-intrinsic-opt",
                "expand-variadics",
                "amdgpu-always-inline",
                "always-inline",
                "amdgpu-lower-module-lds",
            ]
        );
    }

    #[test]
    fn test_codegen_prepare_order() {
        let pipeline = build(&PipelineConfig::at(OptLevel::Default));
        assert_eq!(
            names(&pipeline, Phase::CodeGenPrepare),
            vec![
                "amdgpu-lower-kernel-arguments",
                "amdgpu-lower-buffer-fat-pointers",
                "codegenprepare",
                "load-store-vectorizer",
                "lower-switch",
            ]
        );
    }

    #[test]
    fn test_inst_select_is_fixed() {
        for level in OptLevel::ALL {
            let pipeline = build(&PipelineConfig::at(level));
            assert_eq!(
                names(&pipeline, Phase::InstSelect),
                vec!["amdgpu-isel", "si-fix-sgpr-copies", "si-lower-i1-copies"]
            );
        }
    }

    #[test]
    fn test_atomic_optimizer_strategy() {
        let mut config = PipelineConfig::at(OptLevel::Less);
        assert!(build(&config).contains(ATOMIC_OPTIMIZER));

        config.amdgpu.atomic_optimizer_strategy = AtomicScanStrategy::None;
        assert!(!build(&config).contains(ATOMIC_OPTIMIZER));

        let pipeline = build(&PipelineConfig::at(OptLevel::None));
        assert!(!pipeline.contains(ATOMIC_OPTIMIZER));
        assert!(pipeline.contains(ATOMIC_EXPAND));
    }

    #[test]
    fn test_perf_hint_above_less() {
        assert!(!build(&PipelineConfig::at(OptLevel::Less)).contains(PERF_HINT));
        assert!(build(&PipelineConfig::at(OptLevel::Default)).contains(PERF_HINT));
    }

    #[test]
    fn test_workarounds_flag() {
        let mut config = PipelineConfig::at(OptLevel::Default);
        config.amdgpu.structurizer_workarounds = Flag::from(false);
        let pipeline = build(&config);
        assert!(!pipeline.contains(FIX_IRREDUCIBLE));
        assert!(!pipeline.contains(UNIFY_LOOP_EXITS));
        assert!(pipeline.contains(STRUCTURIZE_CFG));
    }

    #[test]
    fn test_loop_prefetch_only_when_requested_or_aggressive_default() {
        let pipeline = build(&PipelineConfig::at(OptLevel::Aggressive));
        assert!(!pipeline.contains(LOOP_DATA_PREFETCH));

        let mut config = PipelineConfig::at(OptLevel::Default);
        config.amdgpu.loop_prefetch = Flag::from(true);
        let pipeline = build(&config);
        assert_eq!(
            pipeline.group(STRAIGHT_LINE_GROUP).next().map(|i| i.stage),
            Some(LOOP_DATA_PREFETCH)
        );
    }

    #[test]
    fn test_disabled_generic_stages_are_logged() {
        let pipeline = build(&PipelineConfig::at(OptLevel::Default));
        for stage in disabled().iter() {
            assert!(!pipeline.contains(stage));
            assert!(pipeline
                .skipped()
                .iter()
                .any(|s| s.stage == stage && s.reason == SkipReason::Disabled));
        }
    }

    #[test]
    fn test_annotation_follows_masked_structurizer() {
        let mut config = PipelineConfig::at(OptLevel::Default);
        config.disabled.push("structurizecfg".to_string());
        let pipeline = build(&config);

        assert!(!pipeline.contains(SI_ANNOTATE_CONTROL_FLOW));
        assert!(pipeline.contains(REWRITE_UNDEF_FOR_PHI));
        assert!(pipeline.skipped().iter().any(|s| s.stage == SI_ANNOTATE_CONTROL_FLOW
            && s.reason == SkipReason::Prerequisite(STRUCTURIZE_CFG)));
    }

    #[test]
    fn test_masked_isel_drops_its_followers() {
        let mut config = PipelineConfig::at(OptLevel::Default);
        config.disabled.push("amdgpu-isel".to_string());
        let pipeline = build(&config);

        assert_eq!(pipeline.phase(Phase::InstSelect).count(), 0);
        for stage in [FIX_SGPR_COPIES, LOWER_I1_COPIES] {
            assert!(pipeline
                .skipped()
                .iter()
                .any(|s| s.stage == stage && s.reason == SkipReason::Prerequisite(ISEL)));
        }
    }

    fn reason(pipeline: &Pipeline, stage: StageId) -> Option<SkipReason> {
        pipeline
            .skipped()
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.reason)
    }

    #[test]
    fn test_o0_explains_level_gated_stages() {
        let pipeline = build(&PipelineConfig::at(OptLevel::None));

        for stage in [
            FLATTEN_CFG,
            SINK,
            INFER_ADDRESS_SPACES,
            PROMOTE_ALLOCA,
            AMDGPU_CODEGEN_PREPARE,
            SEPARATE_CONST_OFFSET,
            NARY_REASSOCIATE,
        ] {
            assert!(!pipeline.contains(stage), "{stage} present");
            assert_eq!(
                reason(&pipeline, stage),
                Some(SkipReason::Level(OptLevel::Less)),
                "{stage}"
            );
        }
        assert_eq!(
            reason(&pipeline, PERF_HINT),
            Some(SkipReason::Level(OptLevel::Default))
        );
    }

    #[test]
    fn test_late_structurize_is_explained() {
        let mut config = PipelineConfig::at(OptLevel::Default);
        config.amdgpu.late_structurize_cfg = Flag::from(true);
        let pipeline = build(&config);

        for stage in [
            FIX_IRREDUCIBLE,
            UNIFY_LOOP_EXITS,
            STRUCTURIZE_CFG,
            SI_ANNOTATE_CONTROL_FLOW,
            REWRITE_UNDEF_FOR_PHI,
        ] {
            assert_eq!(
                reason(&pipeline, stage),
                Some(SkipReason::Mode("structurization runs late")),
                "{stage}"
            );
        }

        config.amdgpu.late_structurize_cfg = Flag::from(false);
        config.amdgpu.disable_structurizer = Flag::from(true);
        let pipeline = build(&config);
        assert_eq!(
            reason(&pipeline, STRUCTURIZE_CFG),
            Some(SkipReason::Mode("structurizer disabled"))
        );
    }

    #[test]
    fn test_unchosen_cleanup_is_explained() {
        let pipeline = build(&PipelineConfig::at(OptLevel::Default));
        assert_eq!(
            reason(&pipeline, GVN),
            Some(SkipReason::Level(OptLevel::Aggressive))
        );

        let pipeline = build(&PipelineConfig::at(OptLevel::Aggressive));
        assert_eq!(
            reason(&pipeline, EARLY_CSE),
            Some(SkipReason::Mode("gvn replaces it at -O3"))
        );
    }
}
