//! 预测模块
//!
//! 入院量预测（指数平滑 + 线性趋势 + 周季节性）以及面向更长时间窗口的科室瓶颈预测

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use careflow_core::utils::safe_div;
use careflow_core::AdmissionRecord;
use chrono::{Duration, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::journey::JourneySet;
use crate::risk::RiskLevel;
use crate::statistics::DistributionStats;
use crate::thresholds::ForecastSettings;

/// 趋势方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// 预测点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_count: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub trend: TrendDirection,
}

/// 按自然日统计的入院量序列，中间缺失的日期计为 0
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DailySeries {
    pub start: Option<NaiveDate>,
    pub counts: Vec<f64>,
}

impl DailySeries {
    pub fn from_admissions(admissions: &[AdmissionRecord]) -> Self {
        let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for admission in admissions {
            *by_day.entry(admission.admission_time.date_naive()).or_insert(0.0) += 1.0;
        }

        let (Some(first), Some(last)) = (by_day.keys().next().copied(), by_day.keys().last().copied()) else {
            return Self::default();
        };

        let days = (last - first).num_days() as usize + 1;
        let counts = (0..days)
            .map(|offset| by_day.get(&(first + Duration::days(offset as i64))).copied().unwrap_or(0.0))
            .collect();

        Self {
            start: Some(first),
            counts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 最后一天
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.start
            .filter(|_| !self.counts.is_empty())
            .map(|start| start + Duration::days(self.counts.len() as i64 - 1))
    }

    /// 历史单日峰值
    pub fn peak(&self) -> f64 {
        self.counts.iter().copied().fold(0.0, f64::max)
    }
}

/// 指数平滑：s[0] = x[0]，s[i] = α·x[i] + (1−α)·s[i−1]
pub fn exponential_smoothing(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut smoothed = Vec::with_capacity(values.len());
    for (i, &value) in values.iter().enumerate() {
        let next = if i == 0 {
            value
        } else {
            alpha * value + (1.0 - alpha) * smoothed[i - 1]
        };
        smoothed.push(next);
    }
    smoothed
}

/// 最小二乘斜率（x 为下标）
pub fn least_squares_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, &y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();

    safe_div(n * sum_xy - sum_x * sum_y, n * sum_x2 - sum_x.powi(2))
}

/// 入院量预测器
#[derive(Debug, Clone, Default)]
pub struct AdmissionForecaster {
    settings: ForecastSettings,
}

impl AdmissionForecaster {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    /// 周季节性系数
    pub fn seasonal_factor(&self, day: usize) -> f64 {
        1.0 + self.settings.seasonal_amplitude * (2.0 * PI * day as f64 / self.settings.seasonal_period_days).sin()
    }

    /// 根据斜率判断趋势
    pub fn trend_direction(&self, slope: f64) -> TrendDirection {
        if slope > self.settings.trend_threshold {
            TrendDirection::Increasing
        } else if slope < -self.settings.trend_threshold {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    /// 预测未来若干天的入院量
    pub fn forecast(&self, admissions: &[AdmissionRecord], horizon_days: usize) -> Vec<ForecastPoint> {
        self.forecast_series(&DailySeries::from_admissions(admissions), horizon_days)
    }

    pub fn forecast_series(&self, series: &DailySeries, horizon_days: usize) -> Vec<ForecastPoint> {
        let Some(last_date) = series.last_date() else {
            tracing::debug!("No admission history, skipping forecast");
            return Vec::new();
        };

        let smoothed = exponential_smoothing(&series.counts, self.settings.smoothing_alpha);
        let last_smoothed = smoothed.last().copied().unwrap_or(0.0);
        let slope = least_squares_slope(&smoothed);
        let trend = self.trend_direction(slope);
        let margin = self.settings.confidence_z * DistributionStats::from_samples(&series.counts).std_dev;

        let points: Vec<ForecastPoint> = (1..=horizon_days)
            .map(|day| {
                let base = (last_smoothed + slope * day as f64).max(0.0);
                let predicted = (base * self.seasonal_factor(day)).round().max(0.0);
                ForecastPoint {
                    date: last_date + Duration::days(day as i64),
                    predicted_count: predicted as u32,
                    lower_bound: (predicted - margin).max(0.0),
                    upper_bound: predicted + margin,
                    trend,
                }
            })
            .collect();

        tracing::info!(
            "Forecast {} days from {} observed days (slope {:.3}, {:?})",
            points.len(),
            series.counts.len(),
            slope,
            trend
        );
        points
    }
}

/// 科室瓶颈预测结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitBottleneckForecast {
    pub unit: String,
    pub risk_level: RiskLevel,
    pub probability: f64,
    /// 等待超过阈值的次数 / 患者数
    pub delay_frequency: f64,
    /// 超阈值等待的平均时长（分钟）
    pub average_delay_minutes: f64,
    /// 峰值小时流量 / 平均小时流量
    pub peak_hour_ratio: f64,
    pub total_patients: usize,
    pub predicted_date: NaiveDate,
    pub factors: Vec<String>,
}

#[derive(Debug, Default)]
struct UnitLoad<'a> {
    patients: BTreeSet<&'a str>,
    long_waits: Vec<f64>,
    hourly: [usize; 24],
}

/// 科室瓶颈预测器
#[derive(Debug, Clone, Default)]
pub struct BottleneckPredictor {
    settings: ForecastSettings,
}

impl BottleneckPredictor {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    /// 预测各科室未来出现瓶颈的风险
    pub fn predict(&self, journeys: &JourneySet, as_of: NaiveDate) -> Vec<UnitBottleneckForecast> {
        let mut loads: BTreeMap<&str, UnitLoad> = BTreeMap::new();

        for journey in journeys.by_patient.values() {
            for stage in &journey.stages {
                let load = loads.entry(stage.unit.as_str()).or_default();
                load.patients.insert(journey.patient_id.as_str());
                load.hourly[stage.entry_time.hour() as usize] += 1;
            }
            // 等待计入目标科室（患者等待进入该科室）
            for gap in journey.gaps() {
                if gap.wait_minutes > self.settings.delay_wait_minutes {
                    loads.entry(gap.target).or_default().long_waits.push(gap.wait_minutes);
                }
            }
        }

        let mut forecasts: Vec<UnitBottleneckForecast> = loads
            .into_iter()
            .map(|(unit, load)| self.predict_unit(unit, &load, as_of))
            .collect();

        forecasts.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then_with(|| b.delay_frequency.total_cmp(&a.delay_frequency))
        });

        tracing::info!("Predicted bottleneck risk for {} units", forecasts.len());
        forecasts
    }

    fn predict_unit(&self, unit: &str, load: &UnitLoad, as_of: NaiveDate) -> UnitBottleneckForecast {
        let s = &self.settings;
        let total_patients = load.patients.len();
        let delay_frequency = safe_div(load.long_waits.len() as f64, total_patients as f64);
        let average_delay_minutes = safe_div(load.long_waits.iter().sum(), load.long_waits.len() as f64);

        let total_entries: usize = load.hourly.iter().sum();
        let peak = load.hourly.iter().copied().max().unwrap_or(0);
        let peak_hour_ratio = safe_div(peak as f64, total_entries as f64 / 24.0);

        let (risk_level, probability, lead_days) =
            if delay_frequency >= s.critical_frequency && average_delay_minutes > s.critical_avg_delay {
                (RiskLevel::Critical, s.critical_probability, s.critical_lead_days)
            } else if delay_frequency >= s.high_frequency || average_delay_minutes > s.high_avg_delay {
                (RiskLevel::High, s.high_probability, s.high_lead_days)
            } else if delay_frequency >= s.medium_frequency || average_delay_minutes > s.medium_avg_delay {
                (RiskLevel::Medium, s.medium_probability, s.medium_lead_days)
            } else {
                (RiskLevel::Low, s.low_probability, s.low_lead_days)
            };

        let mut factors = Vec::new();
        if !load.long_waits.is_empty() {
            factors.push(format!(
                "{:.0}% of patients waited over {:.0} min to enter",
                delay_frequency * 100.0,
                s.delay_wait_minutes
            ));
            factors.push(format!("Average long wait {:.0} min", average_delay_minutes));
        }
        if peak_hour_ratio > s.narrative_peak_hour_ratio {
            factors.push(format!("Peak hour volume is {:.1}x the hourly average", peak_hour_ratio));
        }

        tracing::debug!("Unit {} bottleneck risk {:?} (frequency {:.2})", unit, risk_level, delay_frequency);

        UnitBottleneckForecast {
            unit: unit.to_string(),
            risk_level,
            probability,
            delay_frequency,
            average_delay_minutes,
            peak_hour_ratio,
            total_patients,
            predicted_date: as_of + Duration::days(lead_days),
            factors,
        }
    }
}
