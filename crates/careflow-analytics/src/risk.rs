//! 再入院风险评分
//!
//! 基于规则的加权评分：住院时长、科室间等待、流程复杂度、既往住院次数以及出院日期。
//! 每位患者只对最近一次已出院的住院记录评分。

use std::collections::{BTreeMap, BTreeSet};

use careflow_core::utils::{is_late_week, safe_div};
use careflow_core::{AdmissionRecord, Journey};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::journey::JourneySet;
use crate::thresholds::RiskSettings;

/// 风险级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// 风险因素
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    ShortStay,
    LongStay,
    ExtendedWaits,
    ComplexPathway,
    FrequentAdmissions,
    LateWeekDischarge,
}

impl RiskFactorKind {
    /// 针对该因素的建议措施
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            RiskFactorKind::ShortStay => &[
                "Schedule a follow-up call within 48 hours of discharge",
                "Confirm the discharge readiness checklist",
            ],
            RiskFactorKind::LongStay => &[
                "Arrange step-down or home care support",
                "Reconcile medications before discharge",
            ],
            RiskFactorKind::ExtendedWaits => &[
                "Review care coordination between units",
                "Book outpatient follow-up before discharge",
            ],
            RiskFactorKind::ComplexPathway => &[
                "Assign a dedicated care coordinator",
                "Reconcile medications before discharge",
            ],
            RiskFactorKind::FrequentAdmissions => &[
                "Enrol in the readmission prevention programme",
                "Schedule a follow-up call within 48 hours of discharge",
            ],
            RiskFactorKind::LateWeekDischarge => &[
                "Confirm weekend pharmacy and community support access",
                "Schedule a follow-up call within 48 hours of discharge",
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskFactor {
    pub name: RiskFactorKind,
    pub weight: f64,
    pub description: String,
}

/// 患者再入院风险评分
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskScore {
    pub patient_id: String,
    pub score: f64,
    pub risk_level: RiskLevel,
    /// 按权重降序
    pub factors: Vec<RiskFactor>,
    pub discharge_date: NaiveDate,
    pub estimated_recurrence_date: NaiveDate,
    pub recommended_actions: Vec<String>,
}

/// 风险级别分布
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
    pub mean_score: f64,
}

impl RiskDistribution {
    pub fn from_scores(scores: &[RiskScore]) -> Self {
        let mut distribution = Self::default();
        for score in scores {
            match score.risk_level {
                RiskLevel::Low => distribution.low += 1,
                RiskLevel::Medium => distribution.medium += 1,
                RiskLevel::High => distribution.high += 1,
                RiskLevel::Critical => distribution.critical += 1,
            }
        }
        distribution.mean_score = safe_div(scores.iter().map(|s| s.score).sum(), scores.len() as f64);
        distribution
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }
}

/// 再入院风险评分器
#[derive(Debug, Clone, Default)]
pub struct ReadmissionRiskScorer {
    settings: RiskSettings,
}

impl ReadmissionRiskScorer {
    pub fn new(settings: RiskSettings) -> Self {
        Self { settings }
    }

    /// 对所有有已出院记录的患者评分，按分数降序
    pub fn score_all(&self, journeys: &JourneySet, admissions: &[AdmissionRecord]) -> Vec<RiskScore> {
        let mut by_patient: BTreeMap<&str, Vec<&AdmissionRecord>> = BTreeMap::new();
        for admission in admissions {
            by_patient.entry(admission.patient_id.as_str()).or_default().push(admission);
        }

        let mut scores: Vec<RiskScore> = by_patient
            .into_iter()
            .filter_map(|(patient_id, history)| {
                let latest = history
                    .iter()
                    .filter(|a| a.discharge_time.is_some())
                    .max_by_key(|a| a.discharge_time)?;
                self.score_admission(latest, journeys.get(patient_id), &history)
            })
            .collect();

        scores.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::info!("Scored readmission risk for {} patients", scores.len());
        scores
    }

    /// 对单次住院评分；`history` 为该患者的全部住院记录
    pub fn score_admission(
        &self,
        admission: &AdmissionRecord,
        journey: Option<&Journey>,
        history: &[&AdmissionRecord],
    ) -> Option<RiskScore> {
        let s = &self.settings;
        let discharge = admission.discharge_time?;
        let los_days = admission.length_of_stay_days()?;
        let discharge_date = discharge.date_naive();

        let mut factors = Vec::new();

        if los_days < s.short_stay_days {
            factors.push(RiskFactor {
                name: RiskFactorKind::ShortStay,
                weight: s.short_stay_weight,
                description: format!("Length of stay {:.1} days is below {:.0} days", los_days, s.short_stay_days),
            });
        } else if los_days > s.long_stay_days {
            factors.push(RiskFactor {
                name: RiskFactorKind::LongStay,
                weight: s.long_stay_weight,
                description: format!("Length of stay {:.1} days exceeds {:.0} days", los_days, s.long_stay_days),
            });
        }

        // 只看本次住院期间的阶段，不同住院之间的间隔不算等待
        if let Some(journey) = journey.map(|j| j.within(admission.admission_time, discharge)) {
            let waits: Vec<f64> = journey.gaps().map(|g| g.wait_minutes.max(0.0)).collect();
            let average_wait = safe_div(waits.iter().sum(), waits.len() as f64);
            // 分级按阈值降序，只取命中的最高一级
            if let Some(&(threshold, weight)) = s.wait_tiers.iter().find(|(threshold, _)| average_wait > *threshold) {
                factors.push(RiskFactor {
                    name: RiskFactorKind::ExtendedWaits,
                    weight,
                    description: format!(
                        "Average wait between units {:.0} min exceeds {:.0} min",
                        average_wait, threshold
                    ),
                });
            }

            if journey.transitions() > s.max_transitions {
                factors.push(RiskFactor {
                    name: RiskFactorKind::ComplexPathway,
                    weight: s.transitions_weight,
                    description: format!("{} unit transitions during the stay", journey.transitions()),
                });
            }
        }

        let window_start = admission.admission_time - Duration::days(s.history_window_days);
        let prior = history
            .iter()
            .filter(|a| a.admission_time >= window_start && a.admission_time < admission.admission_time)
            .count();
        if prior > 0 {
            factors.push(RiskFactor {
                name: RiskFactorKind::FrequentAdmissions,
                weight: (prior as f64 * s.prior_admission_weight).min(s.prior_admission_cap),
                description: format!("{} admissions in the previous {} days", prior, s.history_window_days),
            });
        }

        if is_late_week(discharge_date) {
            factors.push(RiskFactor {
                name: RiskFactorKind::LateWeekDischarge,
                weight: s.late_week_weight,
                description: format!("Discharged on a {}", discharge_date.format("%A")),
            });
        }

        let score: f64 = factors.iter().map(|f| f.weight).sum();
        factors.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        let risk_level = self.level(score);
        let recurrence_days = match risk_level {
            RiskLevel::Critical => s.critical_recurrence_days,
            RiskLevel::High => s.high_recurrence_days,
            RiskLevel::Medium => s.medium_recurrence_days,
            RiskLevel::Low => s.low_recurrence_days,
        };

        Some(RiskScore {
            patient_id: admission.patient_id.clone(),
            score,
            risk_level,
            recommended_actions: self.actions_for(&factors),
            factors,
            discharge_date,
            estimated_recurrence_date: discharge_date + Duration::days(recurrence_days),
        })
    }

    /// 分数对应的风险级别
    pub fn level(&self, score: f64) -> RiskLevel {
        let s = &self.settings;
        if score >= s.critical_score {
            RiskLevel::Critical
        } else if score >= s.high_score {
            RiskLevel::High
        } else if score >= s.medium_score {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn actions_for(&self, factors: &[RiskFactor]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        factors
            .iter()
            .flat_map(|f| f.name.actions().iter().copied())
            .filter(|action| seen.insert(*action))
            .take(self.settings.max_actions)
            .map(str::to_string)
            .collect()
    }
}
