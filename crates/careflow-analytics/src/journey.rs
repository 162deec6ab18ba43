//! 患者旅程重建
//!
//! 将无序的流转记录按患者分组、按时间排序并计算各阶段时长

use std::collections::BTreeMap;

use careflow_core::utils::minutes_between;
use careflow_core::{Journey, Stage, StageCategory, TransitRecord};
use serde::{Deserialize, Serialize};

/// 一次分析的旅程集合
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JourneySet {
    /// 患者ID -> 旅程
    pub by_patient: BTreeMap<String, Journey>,
    /// 仍在科室内（无离开时间）而跳过的记录数
    pub open_stays: usize,
    /// 时长为负而丢弃的记录数
    pub dropped_records: usize,
}

impl JourneySet {
    /// 旅程列表（按患者ID排序）
    pub fn journeys(&self) -> Vec<&Journey> {
        self.by_patient.values().collect()
    }

    /// 获取患者旅程
    pub fn get(&self, patient_id: &str) -> Option<&Journey> {
        self.by_patient.get(patient_id)
    }

    pub fn len(&self) -> usize {
        self.by_patient.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_patient.is_empty()
    }

    /// 所有阶段
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.by_patient.values().flat_map(|journey| journey.stages.iter())
    }
}

/// 旅程重建器
#[derive(Debug, Default, Clone, Copy)]
pub struct JourneyReconstructor;

impl JourneyReconstructor {
    pub fn new() -> Self {
        Self
    }

    /// 从流转记录重建患者旅程
    pub fn reconstruct(&self, records: &[TransitRecord]) -> JourneySet {
        let mut grouped: BTreeMap<String, Vec<Stage>> = BTreeMap::new();
        let mut open_stays = 0;
        let mut dropped_records = 0;

        for record in records {
            let Some(exit_time) = record.exit_time else {
                open_stays += 1;
                continue;
            };

            let duration_minutes = minutes_between(record.entry_time, exit_time);
            if duration_minutes < 0.0 {
                dropped_records += 1;
                tracing::warn!(
                    "Dropping record for patient {} in {}: negative duration {:.1} min",
                    record.patient_id, record.unit, duration_minutes
                );
                continue;
            }

            grouped.entry(record.patient_id.clone()).or_default().push(Stage {
                unit: record.unit.clone(),
                category: StageCategory::from_unit(&record.unit, &record.process),
                process: record.process.clone(),
                entry_time: record.entry_time,
                exit_time,
                duration_minutes,
            });
        }

        let by_patient: BTreeMap<String, Journey> = grouped
            .into_iter()
            .map(|(patient_id, stages)| (patient_id.clone(), Journey::new(patient_id, stages)))
            .collect();

        if open_stays > 0 {
            tracing::debug!("Skipped {} open stays without exit time", open_stays);
        }
        tracing::info!(
            "Reconstructed {} journeys from {} records ({} dropped)",
            by_patient.len(),
            records.len(),
            dropped_records
        );

        JourneySet {
            by_patient,
            open_stays,
            dropped_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, record};

    #[test]
    fn test_groups_and_orders_by_entry() {
        let records = vec![
            record("P1", "Ward", at(1, 12, 0), at(1, 18, 0)),
            record("P2", "Emergency", at(1, 9, 0), at(1, 10, 0)),
            record("P1", "Emergency", at(1, 8, 0), at(1, 9, 0)),
        ];

        let set = JourneyReconstructor::new().reconstruct(&records);
        assert_eq!(set.len(), 2);

        let p1 = set.get("P1").unwrap();
        assert_eq!(p1.stages[0].unit, "Emergency");
        assert_eq!(p1.stages[1].unit, "Ward");
        assert_eq!(p1.stages[0].category, StageCategory::Emergency);
    }

    #[test]
    fn test_total_equals_sum_of_stages() {
        let records = vec![
            record("P1", "Emergency", at(1, 8, 0), at(1, 8, 45)),
            record("P1", "Radiology", at(1, 9, 0), at(1, 10, 30)),
            record("P1", "Ward", at(1, 11, 0), at(2, 11, 0)),
        ];

        let set = JourneyReconstructor::new().reconstruct(&records);
        let journey = set.get("P1").unwrap();
        let sum: f64 = journey.stages.iter().map(|s| s.duration_minutes).sum();

        assert_eq!(journey.total_duration_minutes, sum);
        assert_eq!(journey.total_duration_minutes, 45.0 + 90.0 + 1440.0);
    }

    #[test]
    fn test_drops_negative_and_open_records() {
        let mut open = record("P1", "Ward", at(1, 12, 0), at(1, 13, 0));
        open.exit_time = None;

        let records = vec![
            record("P1", "Emergency", at(1, 8, 0), at(1, 9, 0)),
            record("P1", "Radiology", at(1, 10, 0), at(1, 9, 30)),
            open,
        ];

        let set = JourneyReconstructor::new().reconstruct(&records);
        assert_eq!(set.dropped_records, 1);
        assert_eq!(set.open_stays, 1);
        assert_eq!(set.get("P1").unwrap().stages.len(), 1);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let records = vec![
            record("P1", "Lab", at(1, 8, 0), at(1, 8, 30)),
            record("P1", "Radiology", at(1, 8, 0), at(1, 8, 20)),
        ];

        let set = JourneyReconstructor::new().reconstruct(&records);
        let units: Vec<&str> = set.get("P1").unwrap().stages.iter().map(|s| s.unit.as_str()).collect();
        assert_eq!(units, vec!["Lab", "Radiology"]);
    }

    #[test]
    fn test_empty_input() {
        let set = JourneyReconstructor::new().reconstruct(&[]);
        assert!(set.is_empty());
        assert_eq!(set.stages().count(), 0);
    }
}
