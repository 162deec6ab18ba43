//! Careflow 命令行主程序

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use careflow_admin::{build_engine, init_logging, ConfigManager};
use careflow_analytics::{AnalyticsEngine, Intervention, InterventionType};
use careflow_core::{AdmissionRecord, RecordFilter, Severity, TransitRecord};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Careflow 命令行参数
#[derive(Parser, Debug)]
#[command(name = "careflow")]
#[command(about = "患者流转分析：瓶颈识别、延迟传播、预测、风险评分与干预模拟")]
struct Args {
    /// 数据集文件（JSON，包含 records 和 admissions）
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long, global = true, default_value = "careflow.toml")]
    config: PathBuf,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 预测基准日期，默认取数据中最后一次进入科室的日期
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,

    /// 只分析该日期及之后进入科室的记录
    #[arg(long, global = true)]
    from: Option<NaiveDate>,

    /// 只分析该日期及之前进入科室的记录
    #[arg(long, global = true)]
    to: Option<NaiveDate>,

    /// 严重程度过滤（逗号分隔）
    #[arg(long, global = true, value_delimiter = ',')]
    severity: Vec<String>,

    /// 只分析再入院患者
    #[arg(long, global = true)]
    readmissions_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 生成完整分析报告
    Report,
    /// 识别瓶颈科室
    Bottlenecks,
    /// 延迟传播边与级联路径
    Propagation,
    /// 入院量预测与科室瓶颈预测
    Forecast {
        #[arg(long)]
        days: Option<usize>,
    },
    /// 再入院风险评分
    Risk,
    /// 容量短缺预测
    Capacity {
        #[arg(long)]
        days: Option<usize>,
    },
    /// 模拟单个干预措施
    Simulate {
        #[arg(long)]
        unit: String,
        /// staff | beds | processing_time
        #[arg(long)]
        intervention: String,
        #[arg(long)]
        magnitude: f64,
    },
    /// 以默认幅度比较三种干预措施
    Compare {
        #[arg(long)]
        unit: String,
    },
}

/// 数据集文件
#[derive(Debug, Default, Serialize, Deserialize)]
struct DatasetFile {
    records: Vec<TransitRecord>,
    #[serde(default)]
    admissions: Vec<AdmissionRecord>,
}

impl DatasetFile {
    async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        let dataset: DatasetFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse dataset {}", path.display()))?;

        info!(
            "Loaded {} transit records and {} admissions from {}",
            dataset.records.len(),
            dataset.admissions.len(),
            path.display()
        );
        Ok(dataset)
    }

    /// 按过滤条件裁剪流转记录和住院记录
    fn filtered(&self, filter: &RecordFilter) -> DatasetFile {
        DatasetFile {
            records: filter.apply(&self.records, &self.admissions),
            admissions: filter.apply_admissions(&self.admissions),
        }
    }

    /// 最后一次进入科室的日期
    fn latest_entry_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.entry_time.date_naive()).max()
    }
}

fn parse_severity(value: &str) -> Result<Severity> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .with_context(|| format!("Unknown severity: {}", value))
}

fn build_filter(args: &Args) -> Result<RecordFilter> {
    let severities = if args.severity.is_empty() {
        None
    } else {
        Some(args.severity.iter().map(|s| parse_severity(s)).collect::<Result<Vec<_>>>()?)
    };

    Ok(RecordFilter {
        date_from: args.from,
        date_to: args.to,
        unit: None,
        severities,
        readmission_only: args.readmissions_only,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置并初始化日志
    let config_manager = ConfigManager::new(&args.config)?;
    let mut config = config_manager.get_config().await;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config.logging)?;

    let dataset_path = args
        .dataset
        .clone()
        .or_else(|| config.engine.dataset_path.as_ref().map(PathBuf::from))
        .context("No dataset given: pass --dataset or set engine.dataset_path")?;
    let dataset = DatasetFile::load(&dataset_path).await?;

    let filter = build_filter(&args)?;
    let DatasetFile { records, admissions } = dataset.filtered(&filter);
    if records.is_empty() {
        warn!("No transit records left after filtering");
    }

    let as_of = args
        .as_of
        .or_else(|| dataset.latest_entry_date())
        .unwrap_or_else(|| Utc::now().date_naive());

    let engine = Arc::new(build_engine(&config));
    let options = engine.options();

    match args.command {
        Command::Report => {
            let report = run_blocking(engine, move |engine| engine.generate_report(&records, &admissions, as_of))
                .await??;
            print_json(&report)?;
        }
        Command::Bottlenecks => {
            print_json(&engine.detect_bottlenecks(&records))?;
        }
        Command::Propagation => {
            let edges = engine.analyze_propagation(&records);
            let cascade_paths = engine.cascade_paths(&edges);
            print_json(&serde_json::json!({
                "delay_edges": edges,
                "cascade_paths": cascade_paths,
            }))?;
        }
        Command::Forecast { days } => {
            let days = days.unwrap_or(options.forecast_days);
            print_json(&serde_json::json!({
                "as_of": as_of,
                "admissions": engine.forecast_admissions(&admissions, days),
                "unit_predictions": engine.predict_unit_bottlenecks(&records, as_of),
            }))?;
        }
        Command::Risk => {
            print_json(&engine.score_readmission_risk(&records, &admissions))?;
        }
        Command::Capacity { days } => {
            let days = days.unwrap_or(options.capacity_days);
            print_json(&engine.project_capacity(&admissions, days))?;
        }
        Command::Simulate {
            unit,
            intervention,
            magnitude,
        } => {
            let intervention_type: InterventionType = intervention.parse()?;
            let intervention = Intervention::new(intervention_type, unit, magnitude)?;
            print_json(&engine.simulate(&records, &admissions, &intervention)?)?;
        }
        Command::Compare { unit } => {
            print_json(&engine.compare_interventions(&records, &admissions, &unit, &[])?)?;
        }
    }

    Ok(())
}

/// 在阻塞线程池上运行分析
async fn run_blocking<T, F>(engine: Arc<AnalyticsEngine>, task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AnalyticsEngine) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || task(&engine))
        .await
        .context("Analytics task panicked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity("High").unwrap(), Severity::High);
        assert_eq!(parse_severity(" critical ").unwrap(), Severity::Critical);
        assert!(parse_severity("extreme").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "careflow",
            "--dataset",
            "data.json",
            "--severity",
            "high,critical",
            "simulate",
            "--unit",
            "Radiology",
            "--intervention",
            "beds",
            "--magnitude",
            "3",
        ])
        .unwrap();

        let filter = build_filter(&args).unwrap();
        assert_eq!(filter.severities, Some(vec![Severity::High, Severity::Critical]));
        assert!(matches!(args.command, Command::Simulate { magnitude, .. } if magnitude == 3.0));
    }

    #[test]
    fn test_filter_narrows_records_and_admissions() {
        let dataset: DatasetFile = serde_json::from_str(
            r#"{"records": [
                    {"patient_id": "P1", "unit": "ER", "entry_time": "2024-03-04T08:00:00Z",
                     "exit_time": "2024-03-04T09:00:00Z", "process": "triage"},
                    {"patient_id": "P2", "unit": "ER", "entry_time": "2024-03-04T10:00:00Z",
                     "exit_time": "2024-03-04T11:00:00Z", "process": "triage"}],
                "admissions": [
                    {"patient_id": "P1", "admission_time": "2024-03-04T08:00:00Z",
                     "discharge_time": "2024-03-05T08:00:00Z", "severity": "high", "is_readmission": false},
                    {"patient_id": "P2", "admission_time": "2024-03-04T10:00:00Z",
                     "discharge_time": "2024-03-05T10:00:00Z", "severity": "low", "is_readmission": false}]}"#,
        )
        .unwrap();

        let args = Args::try_parse_from(["careflow", "--severity", "high", "risk"]).unwrap();
        let filtered = dataset.filtered(&build_filter(&args).unwrap());

        assert_eq!(filtered.records.len(), 1);
        assert_eq!(filtered.admissions.len(), 1);
        assert_eq!(filtered.admissions[0].patient_id, "P1");
    }

    #[test]
    fn test_dataset_defaults_admissions() {
        let dataset: DatasetFile = serde_json::from_str(
            r#"{"records": [{"patient_id": "P1", "unit": "ER", "entry_time": "2024-03-04T08:00:00Z",
                "exit_time": null, "process": "triage"}]}"#,
        )
        .unwrap();

        assert!(dataset.admissions.is_empty());
        assert_eq!(dataset.latest_entry_date(), NaiveDate::from_ymd_opt(2024, 3, 4));
    }
}
