//! Passline Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary between the pipeline
//! engine, its targets and the command line driver. Every option a target
//! consults arrives here already parsed; nothing reads ambient toggles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Code generation optimization level
///
/// Levels are totally ordered, gating compares with `<`, `>` and `>=`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    None,
    Less,
    #[default]
    Default,
    Aggressive,
}

impl OptLevel {
    /// All levels, lowest first
    pub const ALL: [OptLevel; 4] = [
        OptLevel::None,
        OptLevel::Less,
        OptLevel::Default,
        OptLevel::Aggressive,
    ];

    /// Get the string name of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Less => "less",
            OptLevel::Default => "default",
            OptLevel::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an optimization level string is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptLevelError(pub String);

impl fmt::Display for ParseOptLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown optimization level '{}'", self.0)
    }
}

impl std::error::Error for ParseOptLevelError {}

impl FromStr for OptLevel {
    type Err = ParseOptLevelError;

    /// Accepts `0`-`3`, `O0`-`O3` and the level names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('O').or_else(|| s.strip_prefix('o')).unwrap_or(s);
        match digits.to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(OptLevel::None),
            "1" | "less" => Ok(OptLevel::Less),
            "2" | "default" => Ok(OptLevel::Default),
            "3" | "aggressive" => Ok(OptLevel::Aggressive),
            _ => Err(ParseOptLevelError(s.to_string())),
        }
    }
}

/// Tri-state boolean control for an optional stage
///
/// `explicit` is the user override. When it is unset the flag defers to the
/// level gate: below `min_level` the flag is off, otherwise `default` applies.
///
/// Deserializing a plain boolean produces an explicit override; the full
/// object form written by `Serialize` reads back unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FlagRepr")]
pub struct Flag {
    /// Value used when nothing overrides it
    pub default: bool,
    /// User override, wins over any gate
    pub explicit: Option<bool>,
    /// Lowest level at which `default` is honored
    pub min_level: OptLevel,
}

impl Flag {
    /// A flag that defaults to on, with no level gate
    pub const fn on() -> Self {
        Self {
            default: true,
            explicit: None,
            min_level: OptLevel::None,
        }
    }

    /// A flag that defaults to off, with no level gate
    pub const fn off() -> Self {
        Self {
            default: false,
            explicit: None,
            min_level: OptLevel::None,
        }
    }

    /// Require at least `level` before the default is honored
    pub const fn gated(mut self, level: OptLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Record an explicit user override
    pub const fn set(mut self, value: bool) -> Self {
        self.explicit = Some(value);
        self
    }

    /// Check whether the user overrode this flag
    pub const fn is_explicit(&self) -> bool {
        self.explicit.is_some()
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag::off().set(value)
    }
}

/// Accepted shapes of a flag in option files
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Override(bool),
    Full {
        default: bool,
        #[serde(default)]
        explicit: Option<bool>,
        #[serde(default)]
        min_level: OptLevel,
    },
}

impl From<FlagRepr> for Flag {
    fn from(repr: FlagRepr) -> Self {
        match repr {
            FlagRepr::Override(value) => Flag::from(value),
            FlagRepr::Full {
                default,
                explicit,
                min_level,
            } => Flag {
                default,
                explicit,
                min_level,
            },
        }
    }
}

/// Scan implementation used by the atomic optimizer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomicScanStrategy {
    Dpp,
    #[default]
    Iterative,
    None,
}

/// Option table consulted by the AMDGPU pipeline hooks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmdgpuOptions {
    pub lower_kernel_arguments: Flag,
    pub load_store_vectorizer: Flag,
    pub scalar_ir_passes: Flag,
    pub image_intrinsic_optimizer: Flag,
    pub loop_prefetch: Flag,
    pub lower_module_lds: Flag,
    pub lower_ctor_dtor: Flag,
    pub atomic_optimizer_strategy: AtomicScanStrategy,
    /// Structurize later, in the machine pipeline
    pub late_structurize_cfg: Flag,
    pub disable_structurizer: Flag,
    /// Fix irreducible control flow and unify loop exits before structurizing
    pub structurizer_workarounds: Flag,
}

impl Default for AmdgpuOptions {
    fn default() -> Self {
        Self {
            lower_kernel_arguments: Flag::on(),
            load_store_vectorizer: Flag::on().gated(OptLevel::Default),
            scalar_ir_passes: Flag::on().gated(OptLevel::Default),
            image_intrinsic_optimizer: Flag::on().gated(OptLevel::Default),
            loop_prefetch: Flag::off().gated(OptLevel::Aggressive),
            lower_module_lds: Flag::on(),
            lower_ctor_dtor: Flag::on(),
            atomic_optimizer_strategy: AtomicScanStrategy::default(),
            late_structurize_cfg: Flag::off(),
            disable_structurizer: Flag::off(),
            structurizer_workarounds: Flag::on(),
        }
    }
}

/// Switches of the target independent codegen pipeline
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeGenOptions {
    pub disable_verify: bool,
    pub disable_lsr: bool,
    pub disable_merge_icmps: bool,
    pub disable_constant_hoisting: bool,
    pub disable_partial_libcall_inlining: bool,
    pub disable_select_optimize: bool,
    pub disable_cgp: bool,
}

/// Everything a target needs to resolve one pipeline
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub opt_level: OptLevel,
    pub amdgpu: AmdgpuOptions,
    pub codegen: CodeGenOptions,
    /// Extra stage names masked on top of the target's own disabled set
    pub disabled: Vec<String>,
}

impl PipelineConfig {
    /// Create a default configuration at the given level
    pub fn at(opt_level: OptLevel) -> Self {
        Self {
            opt_level,
            ..Self::default()
        }
    }
}

/// Pipeline phase
///
/// Phases always run in declaration order; targets only decide which
/// stages go inside each of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Preprocess,
    MidLevelOpt,
    CodeGenPrepare,
    PreIsel,
    InstSelect,
    PostIsel,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 6] = [
        Phase::Preprocess,
        Phase::MidLevelOpt,
        Phase::CodeGenPrepare,
        Phase::PreIsel,
        Phase::InstSelect,
        Phase::PostIsel,
    ];

    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preprocess => "preprocess",
            Phase::MidLevelOpt => "mid-level-opt",
            Phase::CodeGenPrepare => "codegen-prepare",
            Phase::PreIsel => "pre-isel",
            Phase::InstSelect => "isel",
            Phase::PostIsel => "post-isel",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
