//! # Careflow Core
//!
//! 患者流转分析系统的核心模块，提供基础数据结构、错误定义和通用工具。

pub mod error;
pub mod filter;
pub mod models;
pub mod utils;

pub use error::{CareflowError, Result};
pub use filter::RecordFilter;
pub use models::*;
