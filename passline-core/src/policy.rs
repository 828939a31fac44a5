//! Optimization policy
//!
//! The single rule deciding whether an optional stage is enabled:
//! an explicit user override wins, otherwise the flag is off below its
//! minimum level and falls back to its default at or above it.

use passline_config::{Flag, OptLevel};
use serde::Serialize;

/// How a flag was resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "by", content = "value")]
pub enum Resolution {
    /// The user set the flag
    Override(bool),
    /// The session level is below the flag's minimum
    BelowLevel(OptLevel),
    /// Nothing overrode the flag's default
    Default(bool),
}

impl Resolution {
    pub fn enabled(&self) -> bool {
        match *self {
            Resolution::Override(value) | Resolution::Default(value) => value,
            Resolution::BelowLevel(_) => false,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Override(value) => write!(f, "set to {value} by the user"),
            Resolution::BelowLevel(level) => write!(f, "needs at least -O{}", *level as u8),
            Resolution::Default(value) => write!(f, "defaults to {value}"),
        }
    }
}

/// Policy evaluator for one compilation session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    level: OptLevel,
}

impl Policy {
    pub fn new(level: OptLevel) -> Self {
        Self { level }
    }

    /// Get the session optimization level
    pub fn level(&self) -> OptLevel {
        self.level
    }

    /// Resolve a flag against an explicit minimum level
    pub fn resolve_at(&self, flag: &Flag, min_level: OptLevel) -> Resolution {
        if let Some(value) = flag.explicit {
            return Resolution::Override(value);
        }
        if self.level < min_level {
            return Resolution::BelowLevel(min_level);
        }
        Resolution::Default(flag.default)
    }

    /// Resolve a flag against its own minimum level
    pub fn resolve(&self, flag: &Flag) -> Resolution {
        self.resolve_at(flag, flag.min_level)
    }

    pub fn is_enabled_at(&self, flag: &Flag, min_level: OptLevel) -> bool {
        self.resolve_at(flag, min_level).enabled()
    }

    pub fn is_enabled(&self, flag: &Flag) -> bool {
        self.resolve(flag).enabled()
    }
}
