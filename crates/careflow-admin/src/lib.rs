//! # Careflow 管理模块
//!
//! 提供配置管理和日志初始化，并据此构建分析引擎

pub mod config;
pub mod logging;

use careflow_analytics::AnalyticsEngine;

pub use config::{CareflowConfig, ConfigManager, ConfigValidator, EngineSettings, LogFormat, LoggingConfig};
pub use logging::init_logging;

/// 按配置构建分析引擎
pub fn build_engine(config: &CareflowConfig) -> AnalyticsEngine {
    AnalyticsEngine::new(config.analytics.clone()).with_options(config.engine.report_options())
}
