//! 错误定义模块

use thiserror::Error;

/// 分析系统统一错误类型
#[derive(Error, Debug)]
pub enum CareflowError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("无效干预措施: {0}")]
    InvalidIntervention(String),

    #[error("数据不足: {0}")]
    InsufficientData(String),

    #[error("科室未找到: {0}")]
    UnitNotFound(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 分析系统统一结果类型
pub type Result<T> = std::result::Result<T, CareflowError>;
