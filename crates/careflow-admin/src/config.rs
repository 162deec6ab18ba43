//! 配置管理
//!
//! 提供统一的配置管理功能：TOML 文件 + 环境变量覆盖，更新前验证，支持保存和重新加载

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use careflow_analytics::{AnalyticsConfig, ReportOptions};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// 环境变量前缀，例如 `CAREFLOW__LOGGING__LEVEL=debug`
pub const ENV_PREFIX: &str = "CAREFLOW";

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<CareflowConfig>>,
    /// 配置文件路径
    config_path: PathBuf,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CareflowConfig {
    /// 分析阈值
    pub analytics: AnalyticsConfig,
    /// 引擎运行配置
    pub engine: EngineSettings,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 引擎运行配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// 入院量预测天数
    pub forecast_horizon_days: usize,
    /// 容量预测天数
    pub capacity_horizon_days: usize,
    /// 默认数据集路径
    pub dataset_path: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            forecast_horizon_days: 7,
            capacity_horizon_days: 30,
            dataset_path: None,
        }
    }
}

impl EngineSettings {
    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            forecast_days: self.forecast_horizon_days,
            capacity_days: self.capacity_horizon_days,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Full,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式
    pub format: LogFormat,
    /// 是否输出 target
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            with_target: false,
        }
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&CareflowConfig) -> Result<()>,
    /// 错误消息
    error_message: &'static str,
}

impl ConfigManager {
    /// 从文件和环境变量创建配置管理器，文件不存在时使用默认值
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::load_config(&config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            validator,
        })
    }

    /// 加载配置
    fn load_config(config_path: &Path) -> Result<CareflowConfig> {
        let settings = Config::builder()
            .add_source(File::from(config_path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()
            .context("Failed to build configuration")?;

        let config: CareflowConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        info!("Configuration loaded from: {}", config_path.display());
        Ok(config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 获取配置
    pub async fn get_config(&self) -> CareflowConfig {
        let config = self.config.read().await;
        config.clone()
    }

    /// 更新配置并写回文件
    pub async fn update_config(&self, new_config: CareflowConfig) -> Result<()> {
        // 验证新配置
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        self.save_config().await?;

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    pub async fn save_config(&self) -> Result<()> {
        let config = self.config.read().await;
        let config_str = toml::to_string_pretty(&*config).context("Failed to serialize configuration")?;

        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create configuration directory")?;
        }
        tokio::fs::write(&self.config_path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", self.config_path.display());
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(&self.config_path)?;
        self.validator.validate(&new_config)?;

        let mut config = self.config.write().await;
        *config = new_config;

        debug!("Configuration reloaded");
        Ok(())
    }

    /// 验证当前配置
    pub async fn validate_config(&self) -> Result<()> {
        let config = self.config.read().await;
        self.validator.validate(&config)
    }
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(anyhow::anyhow!(message()))
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "analytics.forecast.smoothing_alpha",
                validator: |config| {
                    let alpha = config.analytics.forecast.smoothing_alpha;
                    check(alpha > 0.0 && alpha <= 1.0, || format!("alpha {} must be in (0, 1]", alpha))
                },
                error_message: "Invalid smoothing alpha",
            },
            ValidationRule {
                field_path: "analytics.bottleneck.min_samples",
                validator: |config| {
                    check(config.analytics.bottleneck.min_samples >= 1, || {
                        "min_samples cannot be 0".to_string()
                    })
                },
                error_message: "Invalid bottleneck sample floor",
            },
            ValidationRule {
                field_path: "analytics.bottleneck",
                validator: |config| {
                    let b = &config.analytics.bottleneck;
                    let sum = b.patient_impact_weight + b.delay_propagation_weight + b.resource_strain_weight;
                    check((sum - 1.0).abs() <= 1e-6, || format!("score weights sum to {}, expected 1", sum))
                },
                error_message: "Invalid bottleneck score weights",
            },
            ValidationRule {
                field_path: "analytics.propagation",
                validator: |config| {
                    let p = &config.analytics.propagation;
                    check(p.min_wait_minutes >= 0.0 && p.saturation_minutes > 0.0, || {
                        format!(
                            "noise floor {} must be >= 0 and saturation {} > 0",
                            p.min_wait_minutes, p.saturation_minutes
                        )
                    })
                },
                error_message: "Invalid propagation settings",
            },
            ValidationRule {
                field_path: "analytics.capacity",
                validator: |config| {
                    let c = &config.analytics.capacity;
                    check(
                        c.beds_per_patient > 0.0 && c.patients_per_staff > 0.0 && c.peak_capacity_factor > 0.0,
                        || "capacity ratios must be positive".to_string(),
                    )
                },
                error_message: "Invalid capacity ratios",
            },
            ValidationRule {
                field_path: "analytics.simulation",
                validator: |config| {
                    let s = &config.analytics.simulation;
                    check(
                        s.staff_unit_cost >= 0.0 && s.bed_unit_cost >= 0.0 && s.processing_unit_cost >= 0.0,
                        || "unit costs cannot be negative".to_string(),
                    )?;
                    check(s.processing_cost_unit_minutes > 0.0, || {
                        "processing cost unit must be positive".to_string()
                    })?;
                    check(s.default_capacity.staff > 0 && s.default_capacity.beds > 0, || {
                        "default unit capacity must be positive".to_string()
                    })
                },
                error_message: "Invalid simulation settings",
            },
            ValidationRule {
                field_path: "engine",
                validator: |config| {
                    let e = &config.engine;
                    check(e.forecast_horizon_days >= 1 && e.capacity_horizon_days >= 1, || {
                        "horizons must be at least one day".to_string()
                    })
                },
                error_message: "Invalid engine horizons",
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    let level = config.logging.level.to_lowercase();
                    check(
                        matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"),
                        || format!("unknown log level '{}'", config.logging.level),
                    )
                },
                error_message: "Invalid log level",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &CareflowConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path().join("careflow.toml")).unwrap();

        let config = manager.get_config().await;
        assert_eq!(config.engine.forecast_horizon_days, 7);
        assert_eq!(config.analytics.forecast.smoothing_alpha, 0.3);
        assert!(manager.validate_config().await.is_ok());
    }

    #[tokio::test]
    async fn test_partial_file_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("careflow.toml");
        std::fs::write(
            &path,
            r#"
[engine]
forecast_horizon_days = 14

[analytics.propagation]
saturation_minutes = 90.0

[logging]
level = "debug"
format = "pretty"
"#,
        )
        .unwrap();

        let config = ConfigManager::new(&path).unwrap().get_config().await;
        assert_eq!(config.engine.forecast_horizon_days, 14);
        assert_eq!(config.engine.capacity_horizon_days, 30);
        assert_eq!(config.analytics.propagation.saturation_minutes, 90.0);
        assert_eq!(config.analytics.propagation.min_wait_minutes, 5.0);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("careflow.toml");
        let manager = ConfigManager::new(&path).unwrap();

        let mut config = manager.get_config().await;
        config.analytics.risk.max_actions = 3;
        config.analytics.capacity.available_beds = Some(40);
        config.engine.capacity_horizon_days = 60;
        manager.update_config(config.clone()).await.unwrap();
        assert!(path.exists());

        manager.reload_config().await.unwrap();
        assert_eq!(manager.get_config().await, config);

        let reopened = ConfigManager::new(&path).unwrap();
        assert_eq!(reopened.get_config().await.analytics.capacity.available_beds, Some(40));
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path().join("careflow.toml")).unwrap();

        let mut config = manager.get_config().await;
        config.analytics.forecast.smoothing_alpha = 0.0;
        assert!(manager.update_config(config).await.is_err());

        // 原配置保持不变，文件未写入
        assert_eq!(manager.get_config().await.analytics.forecast.smoothing_alpha, 0.3);
        assert!(!manager.config_path().exists());
    }

    #[test]
    fn test_validation_rules() {
        let validator = ConfigValidator::new();
        assert!(validator.validate(&CareflowConfig::default()).is_ok());

        let mut config = CareflowConfig::default();
        config.analytics.bottleneck.resource_strain_weight = 0.5;
        assert!(validator.validate(&config).is_err());

        let mut config = CareflowConfig::default();
        config.analytics.bottleneck.min_samples = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = CareflowConfig::default();
        config.analytics.propagation.saturation_minutes = 0.0;
        assert!(validator.validate(&config).is_err());

        let mut config = CareflowConfig::default();
        config.analytics.simulation.default_capacity.beds = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = CareflowConfig::default();
        config.analytics.simulation.processing_cost_unit_minutes = 0.0;
        assert!(validator.validate(&config).is_err());

        let mut config = CareflowConfig::default();
        config.engine.forecast_horizon_days = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = CareflowConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(validator.validate(&config).is_err());

        let mut config = CareflowConfig::default();
        config.logging.level = "WARN".to_string();
        assert!(validator.validate(&config).is_ok());
    }

    #[test]
    fn test_report_options_from_engine_settings() {
        let settings = EngineSettings {
            forecast_horizon_days: 10,
            capacity_horizon_days: 45,
            dataset_path: None,
        };
        let options = settings.report_options();
        assert_eq!(options.forecast_days, 10);
        assert_eq!(options.capacity_days, 45);
    }
}
