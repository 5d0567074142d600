//! 引擎配置（EngineConfig）
//!
//! 帧预算与按键名声明的节流配置，可由 JSON / TOML 加载，也可用 builder 构造。
//! 所有加载入口在返回前都会执行 `validate()`。
//!
//! ```toml
//! [frame_budget]
//! max_processing_time_ms = 2.0
//! max_consecutive_per_key = 3
//!
//! [throttles.PlayerMoved]
//! max_events_per_window = 2
//! window_seconds = 1.0
//! strategy = "drop_oldest"
//! max_queued_for_key = 1
//! ```
//!
use crate::error::{DispatchError, DispatchResult};
use crate::eventing::scheduler::FrameBudget;
use crate::eventing::throttle::ThrottleConfig;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Builder, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[builder(default)]
    pub frame_budget: FrameBudget,
    /// 事件键名 -> 节流配置（构建引擎时按名解析）
    #[builder(default)]
    pub throttles: BTreeMap<String, ThrottleConfig>,
}

impl EngineConfig {
    pub fn from_json_str(input: &str) -> DispatchResult<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(input: &str) -> DispatchResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取 TOML 配置文件；文件不存在时返回默认配置
    pub fn load_from_file(path: impl AsRef<Path>) -> DispatchResult<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn validate(&self) -> DispatchResult<()> {
        self.frame_budget.validate()?;
        for (name, throttle) in &self.throttles {
            throttle.validate().map_err(|err| match err {
                DispatchError::InvalidConfig { reason } => {
                    DispatchError::invalid_config(format!("throttles.{name}: {reason}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::throttle::OverflowStrategy;

    #[test]
    fn toml_fills_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [throttles.PlayerMoved]
            max_events_per_window = 2
            window_seconds = 1.0
            strategy = "drop_oldest"
            "#,
        )
        .unwrap();

        assert_eq!(config.frame_budget, FrameBudget::default());
        let moved = config.throttles["PlayerMoved"];
        assert_eq!(moved.strategy, OverflowStrategy::DropOldest);
        assert_eq!(moved.max_queued_for_key, 1);
    }

    #[test]
    fn json_overrides_budget() {
        let config = EngineConfig::from_json_str(
            r#"{
                "frame_budget": { "max_consecutive_per_key": 5 },
                "throttles": {
                    "ScoreChanged": { "max_events_per_window": 1, "window_seconds": 0.5 }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.frame_budget.max_consecutive_per_key, 5);
        assert_eq!(config.frame_budget.max_processing_time_ms, 2.0);
        assert_eq!(
            config.throttles["ScoreChanged"].strategy,
            OverflowStrategy::AddToQueue
        );
    }

    #[test]
    fn invalid_throttle_names_the_key() {
        let err = EngineConfig::from_toml_str(
            r#"
            [throttles.Broken]
            max_events_per_window = 1
            window_seconds = -1.0
            "#,
        )
        .unwrap_err();
        match err {
            DispatchError::InvalidConfig { reason } => assert!(reason.starts_with("throttles.Broken")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{"),
            Err(DispatchError::Json { .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("frame_budget = 3"),
            Err(DispatchError::Toml { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("framebus-config-that-does-not-exist.toml");
        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn builder_matches_default() {
        assert_eq!(EngineConfig::builder().build(), EngineConfig::default());
    }
}
