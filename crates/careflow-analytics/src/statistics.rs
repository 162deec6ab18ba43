//! 科室统计画像
//!
//! 计算全局和各科室阶段时长的描述性统计量。
//! 分位数采用简单的顺序统计量（取排序后下标 ⌊p·n⌋ 的样本），不做插值。

use std::collections::{BTreeMap, BTreeSet};

use careflow_core::StageCategory;
use serde::{Deserialize, Serialize};

use crate::journey::JourneySet;

/// 时长分布的描述性统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DistributionStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    /// 总体方差（除以 n）
    pub variance: f64,
    pub std_dev: f64,
}

impl DistributionStats {
    /// 从样本计算统计量，空样本返回全零
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let order_statistic = |p: f64| sorted[((p * n as f64).floor() as usize).min(n - 1)];

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let q1 = order_statistic(0.25);
        let q3 = order_statistic(0.75);

        Self {
            count: n,
            mean,
            median: sorted[n / 2],
            q1,
            q3,
            iqr: q3 - q1,
            variance,
            std_dev: variance.sqrt(),
        }
    }
}

/// 科室画像
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitProfile {
    pub unit: String,
    pub category: StageCategory,
    /// 经过该科室的不同患者数
    pub patient_count: usize,
    /// 原始时长样本（分钟，按出现顺序）
    pub samples: Vec<f64>,
    #[serde(flatten)]
    pub stats: DistributionStats,
}

impl UnitProfile {
    pub fn sample_count(&self) -> usize {
        self.stats.count
    }
}

/// 全局及各科室画像
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentProfiles {
    /// 所有科室合并后的统计
    pub global: DistributionStats,
    /// 科室名称 -> 画像
    pub units: BTreeMap<String, UnitProfile>,
}

impl DepartmentProfiles {
    /// 各科室平均样本数
    pub fn mean_sample_count(&self) -> f64 {
        if self.units.is_empty() {
            return 0.0;
        }
        let total: usize = self.units.values().map(|u| u.sample_count()).sum();
        total as f64 / self.units.len() as f64
    }
}

/// 科室统计画像器
#[derive(Debug, Default, Clone, Copy)]
pub struct DepartmentProfiler;

impl DepartmentProfiler {
    pub fn new() -> Self {
        Self
    }

    /// 计算全局画像和每个科室的画像
    pub fn profile(&self, journeys: &JourneySet) -> DepartmentProfiles {
        let mut samples_by_unit: BTreeMap<&str, (StageCategory, Vec<f64>, BTreeSet<&str>)> = BTreeMap::new();
        let mut all_samples = Vec::new();

        for journey in journeys.by_patient.values() {
            for stage in &journey.stages {
                let entry = samples_by_unit
                    .entry(stage.unit.as_str())
                    .or_insert_with(|| (stage.category, Vec::new(), BTreeSet::new()));
                entry.1.push(stage.duration_minutes);
                entry.2.insert(journey.patient_id.as_str());
                all_samples.push(stage.duration_minutes);
            }
        }

        let units: BTreeMap<String, UnitProfile> = samples_by_unit
            .into_iter()
            .map(|(unit, (category, samples, patients))| {
                let profile = UnitProfile {
                    unit: unit.to_string(),
                    category,
                    patient_count: patients.len(),
                    stats: DistributionStats::from_samples(&samples),
                    samples,
                };
                (unit.to_string(), profile)
            })
            .collect();

        let global = DistributionStats::from_samples(&all_samples);
        tracing::debug!(
            "Profiled {} units over {} stages (global mean {:.1} min)",
            units.len(),
            global.count,
            global.mean
        );

        DepartmentProfiles { global, units }
    }

    /// 只计算指定科室的画像
    pub fn profile_unit(&self, journeys: &JourneySet, unit: &str) -> Option<UnitProfile> {
        let mut category = None;
        let mut samples = Vec::new();
        let mut patients = BTreeSet::new();

        for journey in journeys.by_patient.values() {
            for stage in journey.stages.iter().filter(|s| s.unit == unit) {
                category.get_or_insert(stage.category);
                samples.push(stage.duration_minutes);
                patients.insert(journey.patient_id.as_str());
            }
        }

        category.map(|category| UnitProfile {
            unit: unit.to_string(),
            category,
            patient_count: patients.len(),
            stats: DistributionStats::from_samples(&samples),
            samples,
        })
    }
}
