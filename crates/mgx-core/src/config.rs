//! 会话配置
//!
//! 以 JSON 保存，所有字段都有默认值，缺省的字段使用默认值。

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// 配置读取错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 上下文配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// 可撤销的命令数上限
    pub undo_depth: usize,

    /// 几何容差
    pub tolerance: f64,

    /// 日志级别（trace/debug/info/warn/error）
    pub log_level: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            undo_depth: 100,
            tolerance: crate::math::EPSILON,
            log_level: "info".to_string(),
        }
    }
}

impl ContextConfig {
    /// 从 JSON 字符串读取
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件读取，文件不存在时使用默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// 设置撤销深度
    pub fn with_undo_depth(mut self, undo_depth: usize) -> Self {
        self.undo_depth = undo_depth;
        self
    }

    /// 设置容差
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance > 0.0) {
            return Err(ConfigError::Invalid {
                field: "tolerance",
                reason: format!("must be strictly positive, got {}", self.tolerance),
            });
        }
        if self.undo_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "undo_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = ContextConfig::from_json(r#"{ "undo_depth": 5 }"#).unwrap();
        assert_eq!(config.undo_depth, 5);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.tolerance, ContextConfig::default().tolerance);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ContextConfig::from_json(r#"{ "tolerance": -1.0 }"#),
            Err(ConfigError::Invalid { field: "tolerance", .. })
        ));
        assert!(ContextConfig::from_json(r#"{ "undo_depth": 0 }"#).is_err());
        assert!(matches!(
            ContextConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ContextConfig::load("/nonexistent/mgx/config.json").unwrap();
        assert_eq!(config, ContextConfig::default());
    }
}
