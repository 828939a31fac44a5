//! CLI 配置
//!
//! 日志配置：全局级别加上按组件覆盖的级别

use tracing::Level;

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    pub builder: Option<Level>,
    pub policy: Option<Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::WARN,
            builder: None,
            policy: None,
        }
    }
}

impl LogConfig {
    /// Map a `-v` count to the global level
    pub fn from_verbosity(verbose: u8) -> Self {
        let global = match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            global,
            ..Self::default()
        }
    }

    /// Get log level for a specific target
    pub fn level_for(&self, target: &str) -> Level {
        match target {
            "passline::builder" => self.builder.unwrap_or(self.global),
            "passline::policy" => self.policy.unwrap_or(self.global),
            _ => self.global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_override() {
        let config = LogConfig {
            policy: Some(Level::TRACE),
            ..LogConfig::from_verbosity(1)
        };
        assert_eq!(config.level_for("passline::policy"), Level::TRACE);
        assert_eq!(config.level_for("passline::builder"), Level::INFO);
        assert_eq!(config.level_for("elsewhere"), Level::INFO);
        // the driver never runs stages, executor events follow the global level
        assert_eq!(config.level_for("passline::executor"), Level::INFO);
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(LogConfig::from_verbosity(0).global, Level::WARN);
        assert_eq!(LogConfig::from_verbosity(2).global, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(9).global, Level::TRACE);
    }
}
