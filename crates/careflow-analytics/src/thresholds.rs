//! 分析阈值配置
//!
//! 所有分类、评分和预测中使用的常量集中在此，默认值即标准算法参数

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 分析引擎完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// 瓶颈识别阈值
    pub bottleneck: BottleneckThresholds,
    /// 延迟传播配置
    pub propagation: PropagationSettings,
    /// 入院量预测配置
    pub forecast: ForecastSettings,
    /// 容量预测配置
    pub capacity: CapacitySettings,
    /// 再入院风险配置
    pub risk: RiskSettings,
    /// 干预模拟配置
    pub simulation: SimulationSettings,
}

/// 瓶颈识别阈值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BottleneckThresholds {
    /// 参与评估的最少样本数
    pub min_samples: usize,
    /// 患者影响分权重
    pub patient_impact_weight: f64,
    /// 延迟传播分权重
    pub delay_propagation_weight: f64,
    /// 资源压力分权重
    pub resource_strain_weight: f64,
    /// 患者影响分中的流量占比
    pub volume_share: f64,
    /// 患者影响分中的时间偏差占比
    pub deviation_share: f64,
    /// 资源压力分系数：拥堵指标
    pub strain_congestion_factor: f64,
    /// 资源压力分系数：方差比
    pub strain_variance_factor: f64,
    /// 资源压力分系数：z 分数
    pub strain_z_factor: f64,
    /// 拥堵判定：标准差超过均值的该比例
    pub congestion_std_ratio: f64,
    /// 低负载上限（流量百分位）
    pub low_load_ceiling: f64,
    /// 中负载上限（流量百分位）
    pub moderate_load_ceiling: f64,
    /// 隐性瓶颈：延迟传播分下限
    pub invisible_propagation_min: f64,
    /// 显性瓶颈：时间偏差下限（%）
    pub obvious_deviation_min: f64,
    /// 新兴瓶颈：方差比下限
    pub emerging_variance_ratio_min: f64,
    /// 新兴瓶颈：拥堵指标下限
    pub emerging_congestion_min: f64,
    /// 说明文字：时间偏差阈值
    pub narrative_deviation: f64,
    /// 说明文字：方差比阈值
    pub narrative_variance_ratio: f64,
    /// 说明文字：z 分数阈值
    pub narrative_z_score: f64,
    /// 说明文字：拥堵阈值
    pub narrative_congestion: f64,
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            min_samples: 3,
            patient_impact_weight: 0.35,
            delay_propagation_weight: 0.35,
            resource_strain_weight: 0.30,
            volume_share: 0.4,
            deviation_share: 0.6,
            strain_congestion_factor: 30.0,
            strain_variance_factor: 40.0,
            strain_z_factor: 30.0,
            congestion_std_ratio: 0.5,
            low_load_ceiling: 60.0,
            moderate_load_ceiling: 100.0,
            invisible_propagation_min: 30.0,
            obvious_deviation_min: 50.0,
            emerging_variance_ratio_min: 1.3,
            emerging_congestion_min: 0.8,
            narrative_deviation: 50.0,
            narrative_variance_ratio: 1.5,
            narrative_z_score: 2.0,
            narrative_congestion: 1.0,
        }
    }
}

/// 延迟传播配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropagationSettings {
    /// 噪声过滤：只统计超过该分钟数的等待
    pub min_wait_minutes: f64,
    /// 传播强度饱和所需的平均延迟（分钟）
    pub saturation_minutes: f64,
    /// 级联路径中边的最低强度
    pub cascade_min_strength: f64,
    /// 级联路径最大边数
    pub cascade_max_depth: usize,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            min_wait_minutes: 5.0,
            saturation_minutes: 60.0,
            cascade_min_strength: 50.0,
            cascade_max_depth: 4,
        }
    }
}

/// 入院量与科室瓶颈预测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastSettings {
    /// 指数平滑系数
    pub smoothing_alpha: f64,
    /// 周季节性振幅
    pub seasonal_amplitude: f64,
    /// 季节周期（天）
    pub seasonal_period_days: f64,
    /// 置信区间 z 值
    pub confidence_z: f64,
    /// 趋势判定斜率阈值
    pub trend_threshold: f64,
    /// 科室预测：视为延迟的等待（分钟）
    pub delay_wait_minutes: f64,
    /// 科室预测：危急/高/中 延迟频率阈值
    pub critical_frequency: f64,
    pub high_frequency: f64,
    pub medium_frequency: f64,
    /// 科室预测：危急/高/中 平均延迟阈值（分钟）
    pub critical_avg_delay: f64,
    pub high_avg_delay: f64,
    pub medium_avg_delay: f64,
    /// 说明文字：峰值小时流量倍数阈值
    pub narrative_peak_hour_ratio: f64,
    /// 各风险级别的固定概率
    pub critical_probability: f64,
    pub high_probability: f64,
    pub medium_probability: f64,
    pub low_probability: f64,
    /// 各风险级别的预警提前天数
    pub critical_lead_days: i64,
    pub high_lead_days: i64,
    pub medium_lead_days: i64,
    pub low_lead_days: i64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            seasonal_amplitude: 0.1,
            seasonal_period_days: 7.0,
            confidence_z: 1.96,
            trend_threshold: 0.5,
            delay_wait_minutes: 60.0,
            critical_frequency: 0.3,
            high_frequency: 0.2,
            medium_frequency: 0.1,
            critical_avg_delay: 120.0,
            high_avg_delay: 90.0,
            medium_avg_delay: 60.0,
            narrative_peak_hour_ratio: 3.0,
            critical_probability: 0.85,
            high_probability: 0.65,
            medium_probability: 0.40,
            low_probability: 0.15,
            critical_lead_days: 3,
            high_lead_days: 7,
            medium_lead_days: 14,
            low_lead_days: 30,
        }
    }
}

/// 容量短缺预测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapacitySettings {
    /// 每 30 天的需求增长率
    pub monthly_growth: f64,
    /// 基线需求取最近多少天
    pub baseline_window_days: usize,
    /// 床位需求系数（患者数 × 该值）
    pub beds_per_patient: f64,
    /// 每名员工负责的患者数
    pub patients_per_staff: f64,
    /// 历史峰值放大系数，用于推算现有容量
    pub peak_capacity_factor: f64,
    /// 显式配置的现有床位数
    pub available_beds: Option<u32>,
    /// 显式配置的现有员工数
    pub available_staff: Option<u32>,
    /// 利用率告警阈值（%）
    pub critical_utilization: f64,
    pub high_utilization: f64,
    pub medium_utilization: f64,
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            monthly_growth: 0.05,
            baseline_window_days: 7,
            beds_per_patient: 1.1,
            patients_per_staff: 8.0,
            peak_capacity_factor: 1.2,
            available_beds: None,
            available_staff: None,
            critical_utilization: 100.0,
            high_utilization: 90.0,
            medium_utilization: 80.0,
        }
    }
}

/// 再入院风险评分配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskSettings {
    pub short_stay_days: f64,
    pub short_stay_weight: f64,
    pub long_stay_days: f64,
    pub long_stay_weight: f64,
    /// 平均等待分级（分钟，权重），按阈值降序
    pub wait_tiers: Vec<(f64, f64)>,
    pub max_transitions: usize,
    pub transitions_weight: f64,
    pub history_window_days: i64,
    pub prior_admission_weight: f64,
    pub prior_admission_cap: f64,
    pub late_week_weight: f64,
    pub critical_score: f64,
    pub high_score: f64,
    pub medium_score: f64,
    pub max_actions: usize,
    /// 各风险级别的预计复发天数
    pub critical_recurrence_days: i64,
    pub high_recurrence_days: i64,
    pub medium_recurrence_days: i64,
    pub low_recurrence_days: i64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            short_stay_days: 2.0,
            short_stay_weight: 25.0,
            long_stay_days: 14.0,
            long_stay_weight: 20.0,
            wait_tiers: vec![(120.0, 30.0), (90.0, 20.0), (60.0, 10.0)],
            max_transitions: 5,
            transitions_weight: 15.0,
            history_window_days: 90,
            prior_admission_weight: 15.0,
            prior_admission_cap: 30.0,
            late_week_weight: 10.0,
            critical_score: 70.0,
            high_score: 50.0,
            medium_score: 30.0,
            max_actions: 5,
            critical_recurrence_days: 14,
            high_recurrence_days: 30,
            medium_recurrence_days: 60,
            low_recurrence_days: 90,
        }
    }
}

/// 科室人员与床位配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UnitCapacity {
    pub staff: u32,
    pub beds: u32,
}

impl Default for UnitCapacity {
    fn default() -> Self {
        Self { staff: 10, beds: 20 }
    }
}

/// 干预模拟配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    /// 未单独配置的科室使用的容量
    pub default_capacity: UnitCapacity,
    /// 按科室名称覆盖容量
    pub unit_capacity: HashMap<String, UnitCapacity>,
    /// 每名员工成本
    pub staff_unit_cost: f64,
    /// 每张床位成本
    pub bed_unit_cost: f64,
    /// 每个处理时间计价单位的成本
    pub processing_unit_cost: f64,
    /// 处理时间计价单位（分钟）
    pub processing_cost_unit_minutes: f64,
    /// 比较干预措施时使用的默认幅度
    pub default_staff_delta: f64,
    pub default_bed_delta: f64,
    pub default_processing_delta: f64,
    /// 结果下限
    pub min_los_days: f64,
    pub min_processing_minutes: f64,
    /// 增加人员：节省的小时数折算为住院天数缩短的系数
    pub staff_los_factor: f64,
    /// 增加人员：每缩短一天住院对应的床位利用率下降（%）
    pub staff_utilization_per_los_day: f64,
    pub staff_readmission_factor: f64,
    pub staff_throughput_factor: f64,
    /// 增加床位：等待缩减系数及其上限
    pub bed_wait_reduction_factor: f64,
    pub bed_max_wait_reduction: f64,
    pub bed_los_factor: f64,
    pub bed_processing_factor: f64,
    pub bed_readmission_factor: f64,
    pub bed_throughput_factor: f64,
    /// 缩短处理时间
    pub processing_los_factor: f64,
    pub processing_utilization_factor: f64,
    pub processing_readmission_factor: f64,
    pub processing_throughput_factor: f64,
    /// 影响分权重：住院时长缩短率、利用率变化、再入院风险下降
    pub impact_los_weight: f64,
    pub impact_utilization_weight: f64,
    pub impact_readmission_weight: f64,
    /// ROI 放大系数
    pub roi_scale: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            default_capacity: UnitCapacity::default(),
            unit_capacity: HashMap::new(),
            staff_unit_cost: 75_000.0,
            bed_unit_cost: 50_000.0,
            processing_unit_cost: 10_000.0,
            default_staff_delta: 2.0,
            default_bed_delta: 5.0,
            default_processing_delta: 10.0,
            min_los_days: 0.1,
            min_processing_minutes: 5.0,
            processing_cost_unit_minutes: 10.0,
            staff_los_factor: 0.8,
            staff_utilization_per_los_day: 5.0,
            staff_readmission_factor: 0.3,
            staff_throughput_factor: 0.5,
            bed_wait_reduction_factor: 0.3,
            bed_max_wait_reduction: 0.5,
            bed_los_factor: 0.4,
            bed_processing_factor: 0.2,
            bed_readmission_factor: 0.2,
            bed_throughput_factor: 0.3,
            processing_los_factor: 0.6,
            processing_utilization_factor: 0.4,
            processing_readmission_factor: 0.4,
            processing_throughput_factor: 0.7,
            impact_los_weight: 0.4,
            impact_utilization_weight: 0.3,
            impact_readmission_weight: 0.3,
            roi_scale: 1000.0,
        }
    }
}

impl SimulationSettings {
    /// 获取科室容量，未配置时使用默认值（科室名不区分大小写）
    pub fn capacity_for(&self, unit: &str) -> UnitCapacity {
        self.unit_capacity
            .get(unit)
            .or_else(|| {
                self.unit_capacity
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(unit))
                    .map(|(_, capacity)| capacity)
            })
            .copied()
            .unwrap_or(self.default_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bottleneck_weights_sum_to_one() {
        let t = BottleneckThresholds::default();
        let sum = t.patient_impact_weight + t.delay_propagation_weight + t.resource_strain_weight;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "forecast": { "smoothing_alpha": 0.5 } }"#;
        let config: AnalyticsConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.forecast.smoothing_alpha, 0.5);
        assert_eq!(config.forecast.confidence_z, 1.96);
        assert_eq!(config.bottleneck.min_samples, 3);
    }

    #[test]
    fn test_capacity_override() {
        let mut settings = SimulationSettings::default();
        settings.unit_capacity.insert("ICU".to_string(), UnitCapacity { staff: 4, beds: 8 });

        assert_eq!(settings.capacity_for("ICU").beds, 8);
        assert_eq!(settings.capacity_for("icu").staff, 4);
        assert_eq!(settings.capacity_for("Ward").staff, 10);
    }
}
