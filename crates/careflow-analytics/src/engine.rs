//! 分析引擎
//!
//! 协调旅程重建、统计画像、瓶颈识别、延迟传播、预测、风险评分和干预模拟的核心引擎

use careflow_core::{AdmissionRecord, CareflowError, Result, TransitRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    bottleneck::{affected_units, BottleneckClassifier, BottleneckRecord},
    capacity::{CapacityOutlook, CapacityPlanner},
    forecast::{AdmissionForecaster, BottleneckPredictor, DailySeries, ForecastPoint, UnitBottleneckForecast},
    journey::{JourneyReconstructor, JourneySet},
    propagation::{CascadePath, DelayEdge, DelayPropagationAnalyzer},
    risk::{ReadmissionRiskScorer, RiskDistribution, RiskScore},
    simulation::{Intervention, InterventionComparison, InterventionSimulator, SimulationResult},
    statistics::{DepartmentProfiler, DepartmentProfiles},
    thresholds::AnalyticsConfig,
};

/// 报告生成选项
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReportOptions {
    /// 入院量预测天数
    pub forecast_days: usize,
    /// 容量预测天数
    pub capacity_days: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            forecast_days: 7,
            capacity_days: 30,
        }
    }
}

/// 完整分析报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub record_count: usize,
    pub patient_count: usize,
    pub open_stays: usize,
    pub dropped_records: usize,
    pub bottlenecks: Vec<BottleneckRecord>,
    /// 存在瓶颈的科室（名称排序）
    pub bottleneck_units: Vec<String>,
    pub delay_edges: Vec<DelayEdge>,
    pub cascade_paths: Vec<CascadePath>,
    pub admission_forecast: Vec<ForecastPoint>,
    pub unit_predictions: Vec<UnitBottleneckForecast>,
    pub capacity: CapacityOutlook,
    pub risk_scores: Vec<RiskScore>,
    pub risk_distribution: RiskDistribution,
}

/// 分析引擎
///
/// 除配置外不持有任何状态，每次调用都基于输入快照重新计算，可在多个线程间共享
#[derive(Debug, Clone, Default)]
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    options: ReportOptions,
}

impl AnalyticsEngine {
    /// 创建新的分析引擎
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            options: ReportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn options(&self) -> ReportOptions {
        self.options
    }

    /// 重建患者旅程
    pub fn reconstruct(&self, records: &[TransitRecord]) -> JourneySet {
        JourneyReconstructor::new().reconstruct(records)
    }

    /// 科室统计画像
    pub fn profile(&self, records: &[TransitRecord]) -> DepartmentProfiles {
        DepartmentProfiler::new().profile(&self.reconstruct(records))
    }

    /// 识别瓶颈
    pub fn detect_bottlenecks(&self, records: &[TransitRecord]) -> Vec<BottleneckRecord> {
        let journeys = self.reconstruct(records);
        let profiles = DepartmentProfiler::new().profile(&journeys);
        self.classifier().detect(&journeys, &profiles)
    }

    /// 延迟传播边
    pub fn analyze_propagation(&self, records: &[TransitRecord]) -> Vec<DelayEdge> {
        self.propagation().analyze(&self.reconstruct(records))
    }

    /// 级联路径
    pub fn cascade_paths(&self, edges: &[DelayEdge]) -> Vec<CascadePath> {
        self.propagation().cascade_paths(edges)
    }

    /// 入院量预测
    pub fn forecast_admissions(&self, admissions: &[AdmissionRecord], days: usize) -> Vec<ForecastPoint> {
        AdmissionForecaster::new(self.config.forecast.clone()).forecast(admissions, days)
    }

    /// 科室瓶颈预测
    pub fn predict_unit_bottlenecks(&self, records: &[TransitRecord], as_of: NaiveDate) -> Vec<UnitBottleneckForecast> {
        BottleneckPredictor::new(self.config.forecast.clone()).predict(&self.reconstruct(records), as_of)
    }

    /// 容量短缺预测
    pub fn project_capacity(&self, admissions: &[AdmissionRecord], days: usize) -> CapacityOutlook {
        self.capacity_planner().project(&DailySeries::from_admissions(admissions), days)
    }

    /// 再入院风险评分
    pub fn score_readmission_risk(&self, records: &[TransitRecord], admissions: &[AdmissionRecord]) -> Vec<RiskScore> {
        self.risk_scorer().score_all(&self.reconstruct(records), admissions)
    }

    /// 模拟单个干预措施
    pub fn simulate(
        &self,
        records: &[TransitRecord],
        admissions: &[AdmissionRecord],
        intervention: &Intervention,
    ) -> Result<SimulationResult> {
        intervention.validate()?;
        let journeys = self.reconstruct(records);
        let risk_scores = self.risk_scorer().score_all(&journeys, admissions);

        let simulator = self.simulator();
        let baseline = simulator.baseline(&journeys, &intervention.target_unit, &risk_scores)?;
        simulator.simulate(&baseline, intervention)
    }

    /// 比较多个干预措施；`interventions` 为空时使用默认幅度的三种方案
    pub fn compare_interventions(
        &self,
        records: &[TransitRecord],
        admissions: &[AdmissionRecord],
        unit: &str,
        interventions: &[Intervention],
    ) -> Result<InterventionComparison> {
        let simulator = self.simulator();
        let defaults;
        let interventions = if interventions.is_empty() {
            defaults = simulator.default_interventions(unit)?;
            defaults.as_slice()
        } else {
            interventions
        };

        if let Some(other) = interventions.iter().find(|i| i.target_unit != unit) {
            return Err(CareflowError::InvalidIntervention(format!(
                "干预目标科室 {} 与比较科室 {} 不一致",
                other.target_unit, unit
            )));
        }

        let journeys = self.reconstruct(records);
        let risk_scores = self.risk_scorer().score_all(&journeys, admissions);
        let baseline = simulator.baseline(&journeys, unit, &risk_scores)?;
        simulator.compare(&baseline, interventions)
    }

    /// 生成完整分析报告
    pub fn generate_report(
        &self,
        records: &[TransitRecord],
        admissions: &[AdmissionRecord],
        as_of: NaiveDate,
    ) -> Result<AnalyticsReport> {
        tracing::info!("Generating analytics report over {} records as of {}", records.len(), as_of);

        // 1. 重建旅程
        let journeys = self.reconstruct(records);
        if journeys.is_empty() {
            return Err(CareflowError::InsufficientData(format!(
                "{} 条记录中没有可分析的完整阶段",
                records.len()
            )));
        }

        // 2. 统计画像与瓶颈识别
        let profiles = DepartmentProfiler::new().profile(&journeys);
        let bottlenecks = self.classifier().detect(&journeys, &profiles);
        let bottleneck_units = affected_units(&bottlenecks).into_iter().map(str::to_string).collect();

        // 3. 延迟传播
        let propagation = self.propagation();
        let delay_edges = propagation.analyze(&journeys);
        let cascade_paths = propagation.cascade_paths(&delay_edges);

        // 4. 预测
        let series = DailySeries::from_admissions(admissions);
        let admission_forecast = AdmissionForecaster::new(self.config.forecast.clone())
            .forecast_series(&series, self.options.forecast_days);
        let unit_predictions = BottleneckPredictor::new(self.config.forecast.clone()).predict(&journeys, as_of);
        let capacity = self.capacity_planner().project(&series, self.options.capacity_days);

        // 5. 风险评分
        let risk_scores = self.risk_scorer().score_all(&journeys, admissions);
        let risk_distribution = RiskDistribution::from_scores(&risk_scores);

        let report = AnalyticsReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            as_of,
            record_count: records.len(),
            patient_count: journeys.len(),
            open_stays: journeys.open_stays,
            dropped_records: journeys.dropped_records,
            bottlenecks,
            bottleneck_units,
            delay_edges,
            cascade_paths,
            admission_forecast,
            unit_predictions,
            capacity,
            risk_scores,
            risk_distribution,
        };

        tracing::info!(
            "Report {} ready: {} bottlenecks, {} delay edges, {} risk scores",
            report.id,
            report.bottlenecks.len(),
            report.delay_edges.len(),
            report.risk_scores.len()
        );
        Ok(report)
    }

    fn classifier(&self) -> BottleneckClassifier {
        BottleneckClassifier::new(self.config.bottleneck.clone())
    }

    fn propagation(&self) -> DelayPropagationAnalyzer {
        DelayPropagationAnalyzer::new(self.config.propagation.clone())
    }

    fn capacity_planner(&self) -> CapacityPlanner {
        CapacityPlanner::new(self.config.capacity.clone(), self.config.forecast.clone())
    }

    fn risk_scorer(&self) -> ReadmissionRiskScorer {
        ReadmissionRiskScorer::new(self.config.risk.clone())
    }

    fn simulator(&self) -> InterventionSimulator {
        InterventionSimulator::new(self.config.simulation.clone())
    }
}
