//! 瓶颈识别
//!
//! 基于 z 分数、IQR 位置、方差比和相对流量对科室评分并分类。
//! 分类按固定顺序判定（隐性 → 显性 → 新兴），均不满足的科室不输出。

use std::collections::{BTreeMap, BTreeSet};

use careflow_core::utils::safe_div;
use serde::{Deserialize, Serialize};

use crate::journey::JourneySet;
use crate::statistics::{DepartmentProfiles, DistributionStats, UnitProfile};
use crate::thresholds::BottleneckThresholds;

/// 瓶颈类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckType {
    Invisible, // 隐性：中等负载但下游延迟传播严重
    Obvious,   // 显性：高负载且时间偏差大
    Emerging,  // 新兴：波动与拥堵已显现
}

/// 负载水平
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    Low,
    Moderate,
    High,
}

/// 瓶颈子评分
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BottleneckScores {
    pub patient_impact: f64,
    pub delay_propagation: f64,
    pub resource_strain: f64,
    pub overall: f64,
}

/// 单个科室的评估指标（分类之前）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitAssessment {
    pub unit: String,
    pub sample_count: usize,
    pub affected_patients: usize,
    pub expected_time_minutes: f64,
    pub actual_time_minutes: f64,
    pub time_deviation_pct: f64,
    pub z_score: f64,
    pub iqr_position: f64,
    pub variance_ratio: f64,
    pub congestion_indicator: f64,
    pub volume_percentile: f64,
    pub load_level: LoadLevel,
    pub average_downstream_delay_minutes: f64,
    pub downstream_units: Vec<String>,
    pub scores: BottleneckScores,
}

/// 瓶颈记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BottleneckRecord {
    pub unit: String,
    /// 排名，1 为影响最大
    pub rank: usize,
    pub bottleneck_type: BottleneckType,
    pub load_level: LoadLevel,
    pub expected_time_minutes: f64,
    pub actual_time_minutes: f64,
    pub time_deviation_pct: f64,
    pub z_score: f64,
    pub iqr_position: f64,
    pub variance_ratio: f64,
    pub congestion_indicator: f64,
    pub scores: BottleneckScores,
    pub affected_patients: usize,
    pub downstream_units: Vec<String>,
    pub explanations: Vec<String>,
}

/// 科室下游等待汇总
#[derive(Debug, Clone, Default, PartialEq)]
struct DownstreamDelay {
    total_minutes: f64,
    count: usize,
    by_target: BTreeMap<String, (f64, usize)>,
}

impl DownstreamDelay {
    fn average(&self) -> f64 {
        safe_div(self.total_minutes, self.count as f64)
    }

    /// 下游科室，按平均等待降序
    fn ranked_targets(&self) -> Vec<String> {
        let mut targets: Vec<(&String, f64)> = self
            .by_target
            .iter()
            .map(|(target, (total, count))| (target, safe_div(*total, *count as f64)))
            .collect();
        targets.sort_by(|a, b| b.1.total_cmp(&a.1));
        targets.into_iter().map(|(target, _)| target.clone()).collect()
    }
}

/// 瓶颈分类器
#[derive(Debug, Clone, Default)]
pub struct BottleneckClassifier {
    thresholds: BottleneckThresholds,
}

impl BottleneckClassifier {
    pub fn new(thresholds: BottleneckThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &BottleneckThresholds {
        &self.thresholds
    }

    /// 识别瓶颈并按综合评分排名
    pub fn detect(&self, journeys: &JourneySet, profiles: &DepartmentProfiles) -> Vec<BottleneckRecord> {
        let mut records: Vec<BottleneckRecord> = self
            .assess(journeys, profiles)
            .into_iter()
            .filter_map(|assessment| {
                let bottleneck_type = self.classify(&assessment)?;
                tracing::debug!(
                    "Unit {} classified as {:?} (overall {:.1})",
                    assessment.unit, bottleneck_type, assessment.scores.overall
                );
                Some(self.build_record(assessment, bottleneck_type))
            })
            .collect();

        // 稳定排序，同分时保持科室名称顺序
        records.sort_by(|a, b| b.scores.overall.total_cmp(&a.scores.overall));
        for (index, record) in records.iter_mut().enumerate() {
            record.rank = index + 1;
        }

        tracing::info!("Detected {} bottlenecks across {} units", records.len(), profiles.units.len());
        records
    }

    /// 计算所有满足样本数要求的科室指标
    pub fn assess(&self, journeys: &JourneySet, profiles: &DepartmentProfiles) -> Vec<UnitAssessment> {
        let downstream = downstream_delays(journeys);
        let mean_sample_count = profiles.mean_sample_count();

        profiles
            .units
            .values()
            .filter(|profile| profile.sample_count() >= self.thresholds.min_samples)
            .map(|profile| {
                let delay = downstream.get(profile.unit.as_str()).cloned().unwrap_or_default();
                self.assess_unit(profile, &profiles.global, mean_sample_count, &delay)
            })
            .collect()
    }

    fn assess_unit(
        &self,
        profile: &UnitProfile,
        global: &DistributionStats,
        mean_sample_count: f64,
        downstream: &DownstreamDelay,
    ) -> UnitAssessment {
        let t = &self.thresholds;
        let unit = &profile.stats;

        let z_score = z_score(unit.mean, global);
        let iqr_position = iqr_position(unit.mean, global);
        let variance_ratio = if global.std_dev == 0.0 {
            1.0
        } else {
            unit.std_dev / global.std_dev
        };
        let time_deviation_pct = safe_div(unit.mean - unit.median, unit.median) * 100.0;
        let congestion_indicator = if unit.mean > 0.0 && unit.std_dev > t.congestion_std_ratio * unit.mean {
            unit.std_dev / unit.mean
        } else {
            0.0
        };
        let volume_percentile = safe_div(profile.sample_count() as f64, mean_sample_count) * 100.0;

        let average_downstream_delay = downstream.average();
        let delay_propagation = (safe_div(average_downstream_delay, unit.mean) * 100.0).min(100.0);
        let patient_impact = t.volume_share * volume_percentile + t.deviation_share * time_deviation_pct.abs();
        let resource_strain = (t.strain_congestion_factor * congestion_indicator
            + t.strain_variance_factor * variance_ratio
            + t.strain_z_factor * z_score.abs())
        .min(100.0);
        let overall = t.patient_impact_weight * patient_impact
            + t.delay_propagation_weight * delay_propagation
            + t.resource_strain_weight * resource_strain;

        UnitAssessment {
            unit: profile.unit.clone(),
            sample_count: profile.sample_count(),
            affected_patients: profile.patient_count,
            expected_time_minutes: unit.median,
            actual_time_minutes: unit.mean,
            time_deviation_pct,
            z_score,
            iqr_position,
            variance_ratio,
            congestion_indicator,
            volume_percentile,
            load_level: self.load_level(volume_percentile),
            average_downstream_delay_minutes: average_downstream_delay,
            downstream_units: downstream.ranked_targets(),
            scores: BottleneckScores {
                patient_impact,
                delay_propagation,
                resource_strain,
                overall,
            },
        }
    }

    /// 根据流量百分位确定负载水平
    pub fn load_level(&self, volume_percentile: f64) -> LoadLevel {
        if volume_percentile < self.thresholds.low_load_ceiling {
            LoadLevel::Low
        } else if volume_percentile < self.thresholds.moderate_load_ceiling {
            LoadLevel::Moderate
        } else {
            LoadLevel::High
        }
    }

    /// 按顺序判定瓶颈类型，首个满足的条件生效；都不满足返回 None
    pub fn classify(&self, assessment: &UnitAssessment) -> Option<BottleneckType> {
        let t = &self.thresholds;

        if assessment.load_level == LoadLevel::Moderate
            && assessment.scores.delay_propagation > t.invisible_propagation_min
        {
            Some(BottleneckType::Invisible)
        } else if assessment.load_level == LoadLevel::High
            && assessment.time_deviation_pct > t.obvious_deviation_min
        {
            Some(BottleneckType::Obvious)
        } else if assessment.variance_ratio > t.emerging_variance_ratio_min
            && assessment.congestion_indicator > t.emerging_congestion_min
        {
            Some(BottleneckType::Emerging)
        } else {
            None
        }
    }

    fn build_record(&self, assessment: UnitAssessment, bottleneck_type: BottleneckType) -> BottleneckRecord {
        let explanations = self.explain(&assessment, bottleneck_type);

        BottleneckRecord {
            unit: assessment.unit,
            rank: 0,
            bottleneck_type,
            load_level: assessment.load_level,
            expected_time_minutes: assessment.expected_time_minutes,
            actual_time_minutes: assessment.actual_time_minutes,
            time_deviation_pct: assessment.time_deviation_pct,
            z_score: assessment.z_score,
            iqr_position: assessment.iqr_position,
            variance_ratio: assessment.variance_ratio,
            congestion_indicator: assessment.congestion_indicator,
            scores: assessment.scores,
            affected_patients: assessment.affected_patients,
            downstream_units: assessment.downstream_units,
            explanations,
        }
    }

    /// 生成说明文字
    fn explain(&self, assessment: &UnitAssessment, bottleneck_type: BottleneckType) -> Vec<String> {
        let t = &self.thresholds;
        let mut explanations = Vec::new();

        match bottleneck_type {
            BottleneckType::Invisible => explanations.push(format!(
                "Moderate load but {:.0} min average wait passed downstream",
                assessment.average_downstream_delay_minutes
            )),
            BottleneckType::Obvious => explanations.push(format!(
                "High volume ({:.0}% of the unit average) with visible overload",
                assessment.volume_percentile
            )),
            BottleneckType::Emerging => explanations.push(
                "Processing times are becoming erratic under congestion".to_string(),
            ),
        }

        if assessment.time_deviation_pct > t.narrative_deviation {
            explanations.push(format!(
                "Average time {:.0} min is {:.0}% above the expected {:.0} min",
                assessment.actual_time_minutes, assessment.time_deviation_pct, assessment.expected_time_minutes
            ));
        }
        if assessment.variance_ratio > t.narrative_variance_ratio {
            explanations.push(format!(
                "Variability is {:.1}x the facility-wide spread",
                assessment.variance_ratio
            ));
        }
        if assessment.z_score > t.narrative_z_score {
            explanations.push(format!(
                "Mean processing time sits {:.1} standard deviations above the facility mean",
                assessment.z_score
            ));
        }
        if assessment.congestion_indicator > t.narrative_congestion {
            explanations.push("Standard deviation exceeds the mean, indicating congestion".to_string());
        }
        if let Some(first) = assessment.downstream_units.first() {
            explanations.push(format!("Delays are felt first in {}", first));
        }

        explanations
    }
}

/// z 分数：科室均值偏离全局均值的标准差数
pub fn z_score(value: f64, global: &DistributionStats) -> f64 {
    if global.std_dev == 0.0 {
        0.0
    } else {
        (value - global.mean) / global.std_dev
    }
}

/// IQR 位置：落在全局 [Q1, Q3] 内为 0，否则为超出距离与 IQR 之比
pub fn iqr_position(value: f64, global: &DistributionStats) -> f64 {
    if global.iqr == 0.0 {
        return 0.0;
    }
    if value < global.q1 {
        (global.q1 - value) / global.iqr
    } else if value > global.q3 {
        (value - global.q3) / global.iqr
    } else {
        0.0
    }
}

/// 按科室汇总离开后到下一阶段之间的等待，重叠（负等待）计为 0
fn downstream_delays(journeys: &JourneySet) -> BTreeMap<&str, DownstreamDelay> {
    let mut delays: BTreeMap<&str, DownstreamDelay> = BTreeMap::new();

    for journey in journeys.by_patient.values() {
        for gap in journey.gaps() {
            let wait = gap.wait_minutes.max(0.0);
            let entry = delays.entry(gap.source).or_default();
            entry.total_minutes += wait;
            entry.count += 1;

            let target = entry.by_target.entry(gap.target.to_string()).or_insert((0.0, 0));
            target.0 += wait;
            target.1 += 1;
        }
    }

    delays
}

/// 受影响的科室集合（用于报告汇总）
pub fn affected_units(records: &[BottleneckRecord]) -> BTreeSet<&str> {
    records
        .iter()
        .flat_map(|r| std::iter::once(r.unit.as_str()).chain(r.downstream_units.iter().map(|u| u.as_str())))
        .collect()
}
