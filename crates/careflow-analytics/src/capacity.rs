//! 容量短缺预测

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::forecast::{AdmissionForecaster, DailySeries};
use crate::thresholds::{CapacitySettings, ForecastSettings};

/// 资源类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Beds,
    Staff,
}

/// 短缺严重程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ShortageSeverity {
    Medium,
    High,
    Critical,
}

/// 单日容量预测
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapacityPoint {
    pub date: NaiveDate,
    pub projected_patients: f64,
    pub required_beds: u32,
    pub required_staff: u32,
    pub bed_utilization_pct: f64,
    pub staff_utilization_pct: f64,
}

/// 容量告警
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapacityWarning {
    pub date: NaiveDate,
    pub resource: ResourceKind,
    pub severity: ShortageSeverity,
    pub required: u32,
    pub available: u32,
    pub utilization_pct: f64,
}

/// 容量展望
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapacityOutlook {
    pub baseline_daily_admissions: f64,
    pub historical_peak: f64,
    pub available_beds: u32,
    pub available_staff: u32,
    pub daily: Vec<CapacityPoint>,
    pub warnings: Vec<CapacityWarning>,
}

/// 容量规划器
#[derive(Debug, Clone, Default)]
pub struct CapacityPlanner {
    settings: CapacitySettings,
    forecaster: AdmissionForecaster,
}

impl CapacityPlanner {
    pub fn new(settings: CapacitySettings, forecast: ForecastSettings) -> Self {
        Self {
            settings,
            forecaster: AdmissionForecaster::new(forecast),
        }
    }

    /// 基于历史入院量推算未来容量需求
    pub fn project(&self, series: &DailySeries, horizon_days: usize) -> CapacityOutlook {
        let Some(last_date) = series.last_date() else {
            tracing::debug!("No admission history, skipping capacity projection");
            return CapacityOutlook::default();
        };

        let s = &self.settings;
        let window = s.baseline_window_days.max(1).min(series.counts.len());
        let recent = &series.counts[series.counts.len() - window..];
        let baseline = recent.iter().sum::<f64>() / window as f64;
        let peak = series.peak();

        let derived_beds = (peak * s.peak_capacity_factor).ceil();
        let available_beds = s.available_beds.unwrap_or(derived_beds as u32);
        let available_staff = s
            .available_staff
            .unwrap_or((derived_beds / s.patients_per_staff).ceil() as u32);

        let mut outlook = CapacityOutlook {
            baseline_daily_admissions: baseline,
            historical_peak: peak,
            available_beds,
            available_staff,
            ..Default::default()
        };

        for day in 1..=horizon_days {
            let date = last_date + Duration::days(day as i64);
            let growth = (1.0 + s.monthly_growth).powf(day as f64 / 30.0);
            let projected = baseline * growth * self.forecaster.seasonal_factor(day);

            let required_beds = (projected * s.beds_per_patient).ceil() as u32;
            let required_staff = (projected / s.patients_per_staff).ceil() as u32;
            let bed_utilization_pct = utilization(required_beds, available_beds);
            let staff_utilization_pct = utilization(required_staff, available_staff);

            for (resource, required, available, pct) in [
                (ResourceKind::Beds, required_beds, available_beds, bed_utilization_pct),
                (ResourceKind::Staff, required_staff, available_staff, staff_utilization_pct),
            ] {
                if let Some(severity) = self.severity(pct) {
                    outlook.warnings.push(CapacityWarning {
                        date,
                        resource,
                        severity,
                        required,
                        available,
                        utilization_pct: pct,
                    });
                }
            }

            outlook.daily.push(CapacityPoint {
                date,
                projected_patients: projected,
                required_beds,
                required_staff,
                bed_utilization_pct,
                staff_utilization_pct,
            });
        }

        if !outlook.warnings.is_empty() {
            tracing::warn!(
                "Capacity projection raised {} warnings over {} days",
                outlook.warnings.len(),
                horizon_days
            );
        }
        outlook
    }

    /// 利用率对应的告警级别
    pub fn severity(&self, utilization_pct: f64) -> Option<ShortageSeverity> {
        let s = &self.settings;
        if utilization_pct >= s.critical_utilization {
            Some(ShortageSeverity::Critical)
        } else if utilization_pct >= s.high_utilization {
            Some(ShortageSeverity::High)
        } else if utilization_pct >= s.medium_utilization {
            Some(ShortageSeverity::Medium)
        } else {
            None
        }
    }
}

fn utilization(required: u32, available: u32) -> f64 {
    required as f64 / available.max(1) as f64 * 100.0
}
