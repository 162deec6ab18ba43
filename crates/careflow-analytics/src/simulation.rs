//! 干预措施模拟
//!
//! 针对单个科室，用闭式公式推算增加人员、增加床位或缩短处理时间后的指标变化，
//! 并按投资回报率对多个方案排序。

use std::collections::BTreeSet;
use std::str::FromStr;

use careflow_core::utils::{minutes_between, safe_div};
use careflow_core::{CareflowError, Result};
use serde::{Deserialize, Serialize};

use crate::journey::JourneySet;
use crate::risk::RiskScore;
use crate::thresholds::{SimulationSettings, UnitCapacity};

/// 干预类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Staff,
    Beds,
    ProcessingTime,
}

impl FromStr for InterventionType {
    type Err = CareflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "staff" => Ok(InterventionType::Staff),
            "beds" | "bed" => Ok(InterventionType::Beds),
            "processing_time" | "processing" => Ok(InterventionType::ProcessingTime),
            other => Err(CareflowError::InvalidIntervention(format!("未知干预类型: {}", other))),
        }
    }
}

/// 干预措施
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intervention {
    pub intervention_type: InterventionType,
    pub target_unit: String,
    /// 增加的人数/床位数，或缩短的分钟数
    pub magnitude: f64,
}

impl Intervention {
    pub fn new(intervention_type: InterventionType, target_unit: impl Into<String>, magnitude: f64) -> Result<Self> {
        let intervention = Self {
            intervention_type,
            target_unit: target_unit.into(),
            magnitude,
        };
        intervention.validate()?;
        Ok(intervention)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.magnitude.is_finite() || self.magnitude <= 0.0 {
            return Err(CareflowError::InvalidIntervention(format!(
                "干预幅度必须为正数: {}",
                self.magnitude
            )));
        }
        if self.target_unit.trim().is_empty() {
            return Err(CareflowError::InvalidIntervention("目标科室不能为空".to_string()));
        }
        Ok(())
    }
}

/// 科室运营指标
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct UnitMetrics {
    pub average_los_days: f64,
    pub bed_utilization_pct: f64,
    pub average_processing_minutes: f64,
    pub readmission_risk: f64,
    pub throughput_per_day: f64,
}

/// 科室基线
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitBaseline {
    pub unit: String,
    pub capacity: UnitCapacity,
    pub metrics: UnitMetrics,
    pub patients_impacted: usize,
}

/// 相对基线的改善量
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Improvements {
    pub los_reduction_days: f64,
    pub los_reduction_pct: f64,
    /// 负值表示利用率下降
    pub utilization_change_pct: f64,
    pub processing_time_reduction_minutes: f64,
    pub readmission_risk_reduction: f64,
    pub throughput_increase_per_day: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub intervention: Intervention,
    pub baseline: UnitMetrics,
    pub projected: UnitMetrics,
    pub improvements: Improvements,
    pub patients_impacted: usize,
    pub cost: f64,
    pub impact_score: f64,
    pub roi: f64,
}

/// 多方案比较结果，按 ROI 降序
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InterventionComparison {
    pub ranked: Vec<SimulationResult>,
    pub optimal: Option<SimulationResult>,
}

/// 干预模拟器
#[derive(Debug, Clone, Default)]
pub struct InterventionSimulator {
    settings: SimulationSettings,
}

impl InterventionSimulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// 从旅程计算科室基线
    pub fn baseline(&self, journeys: &JourneySet, unit: &str, risk_scores: &[RiskScore]) -> Result<UnitBaseline> {
        let visiting: Vec<_> = journeys.journeys().into_iter().filter(|j| j.visits(unit)).collect();
        let stages: Vec<_> = journeys.stages().filter(|s| s.unit == unit).collect();

        let (Some(first_entry), Some(last_exit)) = (
            stages.iter().map(|s| s.entry_time).min(),
            stages.iter().map(|s| s.exit_time).max(),
        ) else {
            return Err(CareflowError::UnitNotFound(unit.to_string()));
        };

        let capacity = self.settings.capacity_for(unit);
        let patients: BTreeSet<&str> = visiting.iter().map(|j| j.patient_id.as_str()).collect();

        let occupied_minutes: f64 = stages.iter().map(|s| s.duration_minutes).sum();
        let window_minutes = minutes_between(first_entry, last_exit).max(24.0 * 60.0);
        let window_days = window_minutes / (24.0 * 60.0);

        let unit_risks: Vec<f64> = risk_scores
            .iter()
            .filter(|r| patients.contains(r.patient_id.as_str()))
            .map(|r| r.score)
            .collect();

        let metrics = UnitMetrics {
            average_los_days: safe_div(visiting.iter().map(|j| j.span_days()).sum(), visiting.len() as f64),
            bed_utilization_pct: (safe_div(occupied_minutes, capacity.beds as f64 * window_minutes) * 100.0).min(100.0),
            average_processing_minutes: safe_div(occupied_minutes, stages.len() as f64),
            readmission_risk: safe_div(unit_risks.iter().sum(), unit_risks.len() as f64),
            throughput_per_day: patients.len() as f64 / window_days,
        };

        tracing::debug!("Baseline for {}: {:?}", unit, metrics);

        Ok(UnitBaseline {
            unit: unit.to_string(),
            capacity,
            metrics,
            patients_impacted: patients.len(),
        })
    }

    /// 模拟单个干预措施
    pub fn simulate(&self, baseline: &UnitBaseline, intervention: &Intervention) -> Result<SimulationResult> {
        intervention.validate()?;

        let projected = match intervention.intervention_type {
            InterventionType::Staff => self.project_staff(baseline, intervention.magnitude),
            InterventionType::Beds => self.project_beds(baseline, intervention.magnitude),
            InterventionType::ProcessingTime => self.project_processing(baseline, intervention.magnitude),
        };

        let before = baseline.metrics;
        let improvements = Improvements {
            los_reduction_days: before.average_los_days - projected.average_los_days,
            los_reduction_pct: safe_div(before.average_los_days - projected.average_los_days, before.average_los_days)
                * 100.0,
            utilization_change_pct: projected.bed_utilization_pct - before.bed_utilization_pct,
            processing_time_reduction_minutes: before.average_processing_minutes - projected.average_processing_minutes,
            readmission_risk_reduction: before.readmission_risk - projected.readmission_risk,
            throughput_increase_per_day: projected.throughput_per_day - before.throughput_per_day,
        };

        let s = &self.settings;
        let impact_score = s.impact_los_weight * improvements.los_reduction_pct
            + s.impact_utilization_weight * improvements.utilization_change_pct.abs()
            + s.impact_readmission_weight * improvements.readmission_risk_reduction;
        let cost = self.cost(intervention);
        let roi = safe_div(impact_score * baseline.patients_impacted as f64 * s.roi_scale, cost);

        tracing::info!(
            "Simulated {:?} +{} on {}: impact {:.2}, ROI {:.3}",
            intervention.intervention_type,
            intervention.magnitude,
            baseline.unit,
            impact_score,
            roi
        );

        Ok(SimulationResult {
            intervention: intervention.clone(),
            baseline: before,
            projected,
            improvements,
            patients_impacted: baseline.patients_impacted,
            cost,
            impact_score,
            roi,
        })
    }

    /// 比较多个干预措施
    pub fn compare(&self, baseline: &UnitBaseline, interventions: &[Intervention]) -> Result<InterventionComparison> {
        let mut ranked = interventions
            .iter()
            .map(|intervention| self.simulate(baseline, intervention))
            .collect::<Result<Vec<_>>>()?;

        ranked.sort_by(|a, b| b.roi.total_cmp(&a.roi));

        Ok(InterventionComparison {
            optimal: ranked.first().cloned(),
            ranked,
        })
    }

    /// 使用配置中的默认幅度生成三种干预方案
    pub fn default_interventions(&self, unit: &str) -> Result<Vec<Intervention>> {
        let s = &self.settings;
        Ok(vec![
            Intervention::new(InterventionType::Staff, unit, s.default_staff_delta)?,
            Intervention::new(InterventionType::Beds, unit, s.default_bed_delta)?,
            Intervention::new(InterventionType::ProcessingTime, unit, s.default_processing_delta)?,
        ])
    }

    pub fn cost(&self, intervention: &Intervention) -> f64 {
        let s = &self.settings;
        match intervention.intervention_type {
            InterventionType::Staff => intervention.magnitude * s.staff_unit_cost,
            InterventionType::Beds => intervention.magnitude * s.bed_unit_cost,
            InterventionType::ProcessingTime => {
                safe_div(intervention.magnitude, s.processing_cost_unit_minutes) * s.processing_unit_cost
            }
        }
    }

    fn project_staff(&self, baseline: &UnitBaseline, delta: f64) -> UnitMetrics {
        let s = &self.settings;
        let m = baseline.metrics;
        let staff = baseline.capacity.staff as f64;
        let multiplier = safe_div(staff, staff + delta);

        let processing = (m.average_processing_minutes * multiplier).max(s.min_processing_minutes);
        let saved_minutes = (m.average_processing_minutes - processing).max(0.0);
        // 节省的小时数直接折算为住院天数的缩短
        let los_reduction = saved_minutes / 60.0 * s.staff_los_factor;
        let reduction_fraction = safe_div(saved_minutes, m.average_processing_minutes);

        UnitMetrics {
            average_los_days: (m.average_los_days - los_reduction).max(s.min_los_days),
            bed_utilization_pct: (m.bed_utilization_pct - los_reduction * s.staff_utilization_per_los_day)
                .clamp(0.0, 100.0),
            average_processing_minutes: processing,
            readmission_risk: (m.readmission_risk
                - reduction_fraction * m.readmission_risk * s.staff_readmission_factor)
                .max(0.0),
            throughput_per_day: m.throughput_per_day * (1.0 + s.staff_throughput_factor * safe_div(delta, staff)),
        }
    }

    fn project_beds(&self, baseline: &UnitBaseline, delta: f64) -> UnitMetrics {
        let s = &self.settings;
        let m = baseline.metrics;
        let beds = baseline.capacity.beds as f64;
        let capacity_increase = safe_div(delta, beds);
        let wait_reduction = (capacity_increase * s.bed_wait_reduction_factor).min(s.bed_max_wait_reduction);

        UnitMetrics {
            average_los_days: (m.average_los_days * (1.0 - wait_reduction * s.bed_los_factor)).max(s.min_los_days),
            bed_utilization_pct: safe_div(m.bed_utilization_pct * beds, beds + delta),
            average_processing_minutes: (m.average_processing_minutes * (1.0 - wait_reduction * s.bed_processing_factor))
                .max(s.min_processing_minutes),
            readmission_risk: (m.readmission_risk * (1.0 - wait_reduction * s.bed_readmission_factor)).max(0.0),
            throughput_per_day: m.throughput_per_day * (1.0 + s.bed_throughput_factor * capacity_increase),
        }
    }

    fn project_processing(&self, baseline: &UnitBaseline, delta: f64) -> UnitMetrics {
        let s = &self.settings;
        let m = baseline.metrics;
        let ratio = safe_div(delta, m.average_processing_minutes);

        UnitMetrics {
            average_los_days: (m.average_los_days * (1.0 - ratio * s.processing_los_factor)).max(s.min_los_days),
            bed_utilization_pct: (m.bed_utilization_pct * (1.0 - ratio * s.processing_utilization_factor))
                .clamp(0.0, 100.0),
            average_processing_minutes: (m.average_processing_minutes - delta).max(s.min_processing_minutes),
            readmission_risk: (m.readmission_risk * (1.0 - ratio * s.processing_readmission_factor)).max(0.0),
            throughput_per_day: m.throughput_per_day * (1.0 + s.processing_throughput_factor * ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, record};
    use crate::journey::JourneyReconstructor;

    fn baseline(processing: f64) -> UnitBaseline {
        UnitBaseline {
            unit: "Surgery".to_string(),
            capacity: UnitCapacity { staff: 10, beds: 20 },
            metrics: UnitMetrics {
                average_los_days: 5.0,
                bed_utilization_pct: 80.0,
                average_processing_minutes: processing,
                readmission_risk: 40.0,
                throughput_per_day: 10.0,
            },
            patients_impacted: 50,
        }
    }

    #[test]
    fn test_parse_intervention_type() {
        assert_eq!("staff".parse::<InterventionType>().unwrap(), InterventionType::Staff);
        assert_eq!("Beds".parse::<InterventionType>().unwrap(), InterventionType::Beds);
        assert_eq!(
            "processing-time".parse::<InterventionType>().unwrap(),
            InterventionType::ProcessingTime
        );
        assert!(matches!(
            "robots".parse::<InterventionType>(),
            Err(CareflowError::InvalidIntervention(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_magnitude() {
        assert!(matches!(
            Intervention::new(InterventionType::Beds, "Ward", 0.0),
            Err(CareflowError::InvalidIntervention(_))
        ));
        assert!(Intervention::new(InterventionType::Beds, "Ward", f64::NAN).is_err());
        assert!(Intervention::new(InterventionType::Beds, "Ward", 2.0).is_ok());
    }

    #[test]
    fn test_staff_intervention() {
        let simulator = InterventionSimulator::default();
        let intervention = Intervention::new(InterventionType::Staff, "Surgery", 2.0).unwrap();
        let result = simulator.simulate(&baseline(120.0), &intervention).unwrap();

        assert!((result.projected.average_processing_minutes - 100.0).abs() < 1e-9);
        assert!((result.improvements.processing_time_reduction_minutes - 20.0).abs() < 1e-9);
        assert!(result.projected.average_los_days < 5.0);
        assert!(result.projected.throughput_per_day > 10.0);
        assert_eq!(result.cost, 150_000.0);
        assert!(result.roi > 0.0);
    }

    #[test]
    fn test_bed_intervention() {
        let simulator = InterventionSimulator::default();
        let intervention = Intervention::new(InterventionType::Beds, "Surgery", 5.0).unwrap();
        let result = simulator.simulate(&baseline(120.0), &intervention).unwrap();

        // 80% × 20 / 25
        assert!((result.projected.bed_utilization_pct - 64.0).abs() < 1e-9);
        assert!((result.improvements.utilization_change_pct + 16.0).abs() < 1e-9);
        assert_eq!(result.cost, 250_000.0);
    }

    #[test]
    fn test_processing_time_respects_floor() {
        let simulator = InterventionSimulator::default();
        let intervention = Intervention::new(InterventionType::ProcessingTime, "Surgery", 10.0).unwrap();
        let result = simulator.simulate(&baseline(12.0), &intervention).unwrap();

        assert_eq!(result.projected.average_processing_minutes, 5.0);
        assert!(result.projected.average_los_days >= 0.1);
        assert!(result.projected.bed_utilization_pct >= 0.0);
        assert_eq!(result.cost, 10_000.0);
    }

    #[test]
    fn test_coefficients_come_from_settings() {
        let intervention = Intervention::new(InterventionType::ProcessingTime, "Surgery", 10.0).unwrap();
        let default = InterventionSimulator::default().simulate(&baseline(100.0), &intervention).unwrap();

        // 默认系数：缩短 10%，住院 5 × (1 − 0.1 × 0.6)，影响分 0.4 × 6 + 0.3 × 3.2 + 0.3 × 1.6
        assert!((default.projected.average_los_days - 4.7).abs() < 1e-9);
        assert!((default.impact_score - 3.84).abs() < 1e-9);
        assert!((default.roi - 3.84 * 50.0 * 1000.0 / 10_000.0).abs() < 1e-9);

        let settings = SimulationSettings {
            processing_los_factor: 0.0,
            processing_cost_unit_minutes: 5.0,
            roi_scale: 1.0,
            ..Default::default()
        };
        let tuned = InterventionSimulator::new(settings).simulate(&baseline(100.0), &intervention).unwrap();

        assert_eq!(tuned.projected.average_los_days, 5.0);
        assert_eq!(tuned.cost, 20_000.0);
        assert!((tuned.impact_score - 1.44).abs() < 1e-9);
        assert!((tuned.roi - 1.44 * 50.0 / 20_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_compare_ranks_by_roi() {
        let simulator = InterventionSimulator::default();
        let interventions = simulator.default_interventions("Surgery").unwrap();
        let comparison = simulator.compare(&baseline(120.0), &interventions).unwrap();

        assert_eq!(comparison.ranked.len(), 3);
        for pair in comparison.ranked.windows(2) {
            assert!(pair[0].roi >= pair[1].roi);
        }
        assert_eq!(comparison.optimal.as_ref(), comparison.ranked.first());
    }

    #[test]
    fn test_baseline_from_journeys() {
        let records = vec![
            record("P1", "Emergency", at(4, 8, 0), at(4, 9, 0)),
            record("P1", "Surgery", at(4, 10, 0), at(4, 12, 0)),
            record("P2", "Surgery", at(5, 10, 0), at(5, 11, 0)),
        ];
        let journeys = JourneyReconstructor::new().reconstruct(&records);
        let simulator = InterventionSimulator::default();

        let baseline = simulator.baseline(&journeys, "Surgery", &[]).unwrap();
        assert_eq!(baseline.patients_impacted, 2);
        assert_eq!(baseline.metrics.average_processing_minutes, 90.0);
        assert_eq!(baseline.metrics.readmission_risk, 0.0);
        assert_eq!(baseline.capacity, UnitCapacity::default());
        assert!(baseline.metrics.bed_utilization_pct <= 100.0);

        assert!(matches!(
            simulator.baseline(&journeys, "Oncology", &[]),
            Err(CareflowError::UnitNotFound(_))
        ));
    }
}
