//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::minutes_between;

/// 科室流转记录（由数据接入层提供，已完成校验）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitRecord {
    pub patient_id: String,                  // 患者标识
    pub unit: String,                        // 科室名称
    pub entry_time: DateTime<Utc>,           // 进入时间
    pub exit_time: Option<DateTime<Utc>>,    // 离开时间，为空表示仍在科室
    pub process: String,                     // 流程标签
}

/// 住院记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdmissionRecord {
    pub patient_id: String,
    pub admission_time: DateTime<Utc>,
    pub discharge_time: Option<DateTime<Utc>>,
    pub severity: Severity,
    #[serde(default)]
    pub is_readmission: bool,
}

impl AdmissionRecord {
    /// 住院时长（天），未出院时返回 None
    pub fn length_of_stay_days(&self) -> Option<f64> {
        self.discharge_time
            .map(|discharge| minutes_between(self.admission_time, discharge) / (60.0 * 24.0))
    }
}

/// 病情严重程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// 科室类别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    Emergency,   // 急诊
    Diagnostics, // 检查诊断
    Treatment,   // 治疗
    Recovery,    // 康复
    Discharge,   // 出院
}

impl StageCategory {
    const KEYWORDS: &'static [(StageCategory, &'static [&'static str])] = &[
        (StageCategory::Emergency, &["emergency", "triage", "trauma", "er"]),
        (StageCategory::Diagnostics, &["radiology", "imaging", "lab", "diagnos", "ct", "mri", "x-ray", "ultrasound", "pathology"]),
        (StageCategory::Discharge, &["discharge", "exit"]),
        (StageCategory::Recovery, &["recovery", "ward", "rehab", "pacu", "observation"]),
    ];

    /// 根据科室名称（或流程标签）推断类别，无法匹配时归为治疗
    pub fn from_unit(unit: &str, process: &str) -> Self {
        Self::match_keywords(unit)
            .or_else(|| Self::match_keywords(process))
            .unwrap_or(StageCategory::Treatment)
    }

    fn match_keywords(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|t| !t.is_empty())
            .collect();

        Self::KEYWORDS.iter().find_map(|(category, keywords)| {
            let hit = keywords.iter().any(|keyword| {
                // 短关键字只做整词匹配，避免 "er" 命中 "surgery"
                if keyword.len() <= 3 {
                    tokens.iter().any(|t| t == keyword)
                } else {
                    lowered.contains(keyword)
                }
            });
            hit.then_some(*category)
        })
    }
}

/// 患者旅程中的一个阶段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub unit: String,
    pub category: StageCategory,
    pub process: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_minutes: f64,
}

/// 相邻两个阶段之间的等待
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageGap<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub target_entry: DateTime<Utc>,
    pub wait_minutes: f64,
}

/// 患者旅程
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Journey {
    pub patient_id: String,
    pub stages: Vec<Stage>,
    pub total_duration_minutes: f64,
}

impl Journey {
    /// 由阶段列表构建旅程，阶段按进入时间升序排列
    pub fn new(patient_id: String, mut stages: Vec<Stage>) -> Self {
        // 稳定排序，同一时刻进入的阶段保持输入顺序
        stages.sort_by_key(|stage| stage.entry_time);
        let total_duration_minutes = stages.iter().map(|s| s.duration_minutes).sum();

        Self {
            patient_id,
            stages,
            total_duration_minutes,
        }
    }

    /// 阶段转换次数
    pub fn transitions(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    /// 相邻阶段之间的等待时间（重叠时为负值）
    pub fn gaps(&self) -> impl Iterator<Item = StageGap<'_>> {
        self.stages.windows(2).map(|pair| StageGap {
            source: &pair[0].unit,
            target: &pair[1].unit,
            target_entry: pair[1].entry_time,
            wait_minutes: minutes_between(pair[0].exit_time, pair[1].entry_time),
        })
    }

    /// 旅程跨度（天），从首个阶段进入到最后离开
    pub fn span_days(&self) -> f64 {
        let first_entry = self.stages.iter().map(|s| s.entry_time).min();
        let last_exit = self.stages.iter().map(|s| s.exit_time).max();

        match (first_entry, last_exit) {
            (Some(start), Some(end)) => (minutes_between(start, end) / (60.0 * 24.0)).max(0.0),
            _ => 0.0,
        }
    }

    /// 截取进入时间落在 `[from, to]` 内的阶段，用于单次住院的分析
    pub fn within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Journey {
        let stages = self
            .stages
            .iter()
            .filter(|stage| stage.entry_time >= from && stage.entry_time <= to)
            .cloned()
            .collect();
        Journey::new(self.patient_id.clone(), stages)
    }

    /// 是否经过指定科室
    pub fn visits(&self, unit: &str) -> bool {
        self.stages.iter().any(|s| s.unit == unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stage(unit: &str, entry_hour: u32, exit_hour: u32) -> Stage {
        let entry = Utc.with_ymd_and_hms(2024, 3, 4, entry_hour, 0, 0).unwrap();
        let exit = Utc.with_ymd_and_hms(2024, 3, 4, exit_hour, 0, 0).unwrap();
        Stage {
            unit: unit.to_string(),
            category: StageCategory::from_unit(unit, ""),
            process: String::new(),
            entry_time: entry,
            exit_time: exit,
            duration_minutes: minutes_between(entry, exit),
        }
    }

    #[test]
    fn test_category_keywords() {
        assert_eq!(StageCategory::from_unit("Emergency Room", ""), StageCategory::Emergency);
        assert_eq!(StageCategory::from_unit("ER", ""), StageCategory::Emergency);
        assert_eq!(StageCategory::from_unit("Radiology", ""), StageCategory::Diagnostics);
        assert_eq!(StageCategory::from_unit("General Surgery", ""), StageCategory::Treatment);
        assert_eq!(StageCategory::from_unit("Ward 3", ""), StageCategory::Recovery);
        assert_eq!(StageCategory::from_unit("Unit 7", "discharge planning"), StageCategory::Discharge);
    }

    #[test]
    fn test_journey_sorted_and_total() {
        let journey = Journey::new(
            "P1".to_string(),
            vec![stage("Ward", 12, 20), stage("Emergency", 8, 10)],
        );

        assert_eq!(journey.stages[0].unit, "Emergency");
        assert_eq!(journey.total_duration_minutes, 120.0 + 480.0);
        assert_eq!(journey.transitions(), 1);
    }

    #[test]
    fn test_journey_gaps() {
        let journey = Journey::new(
            "P1".to_string(),
            vec![stage("Emergency", 8, 10), stage("Radiology", 11, 12), stage("Ward", 12, 18)],
        );

        let gaps: Vec<_> = journey.gaps().collect();
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].source, "Emergency");
        assert_eq!(gaps[0].target, "Radiology");
        assert_eq!(gaps[0].wait_minutes, 60.0);
        assert_eq!(gaps[1].wait_minutes, 0.0);
        assert!((journey.span_days() - 10.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_journey_within_window() {
        let journey = Journey::new(
            "P1".to_string(),
            vec![stage("Emergency", 8, 10), stage("Radiology", 11, 12), stage("Ward", 12, 18)],
        );

        let from = Utc.with_ymd_and_hms(2024, 3, 4, 11, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let stay = journey.within(from, to);

        // 两端均包含
        assert_eq!(stay.stages.len(), 2);
        assert_eq!(stay.stages[0].unit, "Radiology");
        assert_eq!(stay.transitions(), 1);
        assert_eq!(stay.total_duration_minutes, 60.0 + 360.0);
    }
}
