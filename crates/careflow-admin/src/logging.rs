//! 日志初始化

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// 构建日志过滤器，设置了 `RUST_LOG` 时优先使用
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(config.level.to_lowercase())
            .with_context(|| format!("Invalid log level: {}", config.level)),
    }
}

/// 安装全局 tracing 订阅器
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Full => builder.try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_level() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            ..Default::default()
        };
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_format_names() {
        let format: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(format, LogFormat::Pretty);
        assert_eq!(LoggingConfig::default().format, LogFormat::Compact);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        // 同一进程只能安装一次全局订阅器
        assert!(init_logging(&config).is_err());
    }
}
