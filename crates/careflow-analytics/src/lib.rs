//! # 患者流转分析模块
//!
//! 提供完整的患者流转分析功能，包括：
//! - 旅程重建：将科室流转记录整理为按时间排序的患者旅程
//! - 统计画像：各科室阶段时长的分布统计
//! - 瓶颈识别：隐性、显性和新兴瓶颈的分类与排名
//! - 延迟传播：科室间等待的传递强度与级联路径
//! - 预测：入院量、科室瓶颈风险和容量短缺
//! - 风险评分：患者再入院风险
//! - 干预模拟：人员、床位和处理时间调整的效果推算

pub mod bottleneck;
pub mod capacity;
pub mod engine;
pub mod forecast;
pub mod journey;
pub mod propagation;
pub mod risk;
pub mod simulation;
pub mod statistics;
pub mod thresholds;

// 重新导出主要类型
pub use bottleneck::{BottleneckClassifier, BottleneckRecord, BottleneckScores, BottleneckType, LoadLevel};
pub use capacity::{CapacityOutlook, CapacityPlanner, CapacityWarning, ResourceKind, ShortageSeverity};
pub use engine::{AnalyticsEngine, AnalyticsReport, ReportOptions};
pub use forecast::{AdmissionForecaster, BottleneckPredictor, ForecastPoint, TrendDirection, UnitBottleneckForecast};
pub use journey::{JourneyReconstructor, JourneySet};
pub use propagation::{CascadePath, DelayEdge, DelayPropagationAnalyzer};
pub use risk::{ReadmissionRiskScorer, RiskDistribution, RiskFactor, RiskFactorKind, RiskLevel, RiskScore};
pub use simulation::{
    Improvements, Intervention, InterventionComparison, InterventionSimulator, InterventionType, SimulationResult,
    UnitBaseline, UnitMetrics,
};
pub use statistics::{DepartmentProfiler, DepartmentProfiles, DistributionStats, UnitProfile};
pub use thresholds::AnalyticsConfig;

#[cfg(test)]
pub(crate) mod fixtures {
    use careflow_core::{AdmissionRecord, Severity, TransitRecord};
    use chrono::{DateTime, TimeZone, Utc};

    /// 2024 年 3 月某日的时间点
    pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    pub fn record(patient: &str, unit: &str, entry: DateTime<Utc>, exit: DateTime<Utc>) -> TransitRecord {
        TransitRecord {
            patient_id: patient.to_string(),
            unit: unit.to_string(),
            entry_time: entry,
            exit_time: Some(exit),
            process: String::new(),
        }
    }

    pub fn admission(patient: &str, admitted: DateTime<Utc>, discharged: Option<DateTime<Utc>>) -> AdmissionRecord {
        AdmissionRecord {
            patient_id: patient.to_string(),
            admission_time: admitted,
            discharge_time: discharged,
            severity: Severity::Medium,
            is_readmission: false,
        }
    }
}
