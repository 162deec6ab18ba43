//! 记录过滤器
//!
//! 分析前由调用方按日期范围、科室、严重程度和再入院标记筛选流转记录与住院记录

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{AdmissionRecord, Severity, TransitRecord};

/// 流转记录过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub unit: Option<String>,
    pub severities: Option<Vec<Severity>>,
    #[serde(default)]
    pub readmission_only: bool,
}

impl RecordFilter {
    /// 是否不包含任何条件
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.unit.is_none()
            && self.severities.is_none()
            && !self.readmission_only
    }

    /// 应用过滤器，严重程度与再入院条件通过患者的住院记录判定
    pub fn apply(&self, records: &[TransitRecord], admissions: &[AdmissionRecord]) -> Vec<TransitRecord> {
        if self.is_empty() {
            return records.to_vec();
        }

        let eligible_patients = self.eligible_patients(admissions);

        let filtered: Vec<TransitRecord> = records
            .iter()
            .filter(|record| {
                let day = record.entry_time.date_naive();
                self.date_from.map_or(true, |from| day >= from)
                    && self.date_to.map_or(true, |to| day <= to)
                    && self.unit.as_ref().map_or(true, |unit| &record.unit == unit)
                    && eligible_patients
                        .as_ref()
                        .map_or(true, |patients| patients.contains(record.patient_id.as_str()))
            })
            .cloned()
            .collect();

        tracing::debug!("Record filter kept {} of {} records", filtered.len(), records.len());
        filtered
    }

    /// 对住院记录应用同样的患者与日期条件，日期按入院时间判定；科室条件只作用于流转记录
    pub fn apply_admissions(&self, admissions: &[AdmissionRecord]) -> Vec<AdmissionRecord> {
        if self.is_empty() {
            return admissions.to_vec();
        }

        let eligible_patients = self.eligible_patients(admissions);

        let filtered: Vec<AdmissionRecord> = admissions
            .iter()
            .filter(|admission| {
                let day = admission.admission_time.date_naive();
                self.date_from.map_or(true, |from| day >= from)
                    && self.date_to.map_or(true, |to| day <= to)
                    && eligible_patients
                        .as_ref()
                        .map_or(true, |patients| patients.contains(admission.patient_id.as_str()))
            })
            .cloned()
            .collect();

        tracing::debug!("Record filter kept {} of {} admissions", filtered.len(), admissions.len());
        filtered
    }

    /// 满足严重程度/再入院条件的患者集合；无此类条件时返回 None
    fn eligible_patients<'a>(&self, admissions: &'a [AdmissionRecord]) -> Option<HashSet<&'a str>> {
        if self.severities.is_none() && !self.readmission_only {
            return None;
        }

        Some(
            admissions
                .iter()
                .filter(|admission| {
                    self.severities
                        .as_ref()
                        .map_or(true, |severities| severities.contains(&admission.severity))
                        && (!self.readmission_only || admission.is_readmission)
                })
                .map(|admission| admission.patient_id.as_str())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(patient: &str, unit: &str, day: u32) -> TransitRecord {
        let entry = Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap();
        TransitRecord {
            patient_id: patient.to_string(),
            unit: unit.to_string(),
            entry_time: entry,
            exit_time: Some(entry + chrono::Duration::minutes(30)),
            process: "visit".to_string(),
        }
    }

    fn admission(patient: &str, severity: Severity, readmission: bool) -> AdmissionRecord {
        admission_on(patient, 1, severity, readmission)
    }

    fn admission_on(patient: &str, day: u32, severity: Severity, readmission: bool) -> AdmissionRecord {
        AdmissionRecord {
            patient_id: patient.to_string(),
            admission_time: Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap(),
            discharge_time: None,
            severity,
            is_readmission: readmission,
        }
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let records = vec![record("P1", "ER", 1), record("P2", "Lab", 2)];
        let filter = RecordFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&records, &[]).len(), 2);
    }

    #[test]
    fn test_date_and_unit_filter() {
        let records = vec![record("P1", "ER", 1), record("P1", "Lab", 3), record("P2", "Lab", 10)];
        let filter = RecordFilter {
            date_from: NaiveDate::from_ymd_opt(2024, 5, 2),
            date_to: NaiveDate::from_ymd_opt(2024, 5, 5),
            unit: Some("Lab".to_string()),
            ..Default::default()
        };

        let kept = filter.apply(&records, &[]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].patient_id, "P1");
    }

    #[test]
    fn test_severity_and_readmission_filter() {
        let records = vec![record("P1", "ER", 1), record("P2", "ER", 1), record("P3", "ER", 1)];
        let admissions = vec![
            admission("P1", Severity::High, true),
            admission("P2", Severity::High, false),
            admission("P3", Severity::Low, true),
        ];

        let filter = RecordFilter {
            severities: Some(vec![Severity::High, Severity::Critical]),
            readmission_only: true,
            ..Default::default()
        };

        let kept = filter.apply(&records, &admissions);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].patient_id, "P1");
    }

    #[test]
    fn test_admissions_follow_patient_and_date_criteria() {
        let admissions = vec![
            admission_on("P1", 1, Severity::Low, false),
            admission_on("P1", 3, Severity::High, true),
            admission_on("P2", 3, Severity::Medium, false),
            admission_on("P3", 10, Severity::Critical, true),
        ];

        assert_eq!(RecordFilter::default().apply_admissions(&admissions).len(), 4);

        // 患者只要有一次符合条件的住院，其全部住院记录都保留
        let by_severity = RecordFilter {
            severities: Some(vec![Severity::High, Severity::Critical]),
            ..Default::default()
        };
        let kept = by_severity.apply_admissions(&admissions);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|a| a.patient_id != "P2"));

        let by_date = RecordFilter {
            date_from: NaiveDate::from_ymd_opt(2024, 5, 2),
            date_to: NaiveDate::from_ymd_opt(2024, 5, 5),
            readmission_only: true,
            ..Default::default()
        };
        let kept = by_date.apply_admissions(&admissions);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].patient_id, "P1");
        assert_eq!(kept[0].admission_time.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
    }

    #[test]
    fn test_unit_filter_does_not_narrow_admissions() {
        let admissions = vec![admission("P1", Severity::Low, false), admission("P2", Severity::Low, false)];
        let filter = RecordFilter {
            unit: Some("Lab".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.apply_admissions(&admissions).len(), 2);
    }
}
