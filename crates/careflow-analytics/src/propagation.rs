//! 延迟传播分析
//!
//! 统计患者在相邻科室之间的等待，衡量延迟从一个科室向下游科室的传递强度

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::journey::JourneySet;
use crate::thresholds::PropagationSettings;

/// 延迟传播边
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelayEdge {
    pub source: String,
    pub target: String,
    /// 平均传递延迟（分钟）
    pub average_delay_minutes: f64,
    /// 涉及的不同患者数
    pub patient_count: usize,
    /// 计入统计的等待次数
    pub occurrences: usize,
    /// 传播强度 0-100
    pub propagation_strength: f64,
}

/// 多跳级联路径
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CascadePath {
    /// 依次经过的科室
    pub units: Vec<String>,
    pub mean_strength: f64,
    pub total_delay_minutes: f64,
}

#[derive(Debug, Default)]
struct EdgeAccumulator<'a> {
    total_wait: f64,
    occurrences: usize,
    patients: BTreeSet<&'a str>,
}

/// 延迟传播分析器
#[derive(Debug, Clone, Default)]
pub struct DelayPropagationAnalyzer {
    settings: PropagationSettings,
}

impl DelayPropagationAnalyzer {
    pub fn new(settings: PropagationSettings) -> Self {
        Self { settings }
    }

    /// 计算所有科室对之间的传播边，按强度降序
    pub fn analyze(&self, journeys: &JourneySet) -> Vec<DelayEdge> {
        let mut accumulators: BTreeMap<(&str, &str), EdgeAccumulator> = BTreeMap::new();

        for journey in journeys.by_patient.values() {
            for gap in journey.gaps() {
                if gap.wait_minutes <= self.settings.min_wait_minutes {
                    continue;
                }
                let acc = accumulators.entry((gap.source, gap.target)).or_default();
                acc.total_wait += gap.wait_minutes;
                acc.occurrences += 1;
                acc.patients.insert(journey.patient_id.as_str());
            }
        }

        let mut edges: Vec<DelayEdge> = accumulators
            .into_iter()
            .map(|((source, target), acc)| {
                let average_delay_minutes = acc.total_wait / acc.occurrences as f64;
                DelayEdge {
                    source: source.to_string(),
                    target: target.to_string(),
                    average_delay_minutes,
                    patient_count: acc.patients.len(),
                    occurrences: acc.occurrences,
                    propagation_strength: self.strength(average_delay_minutes),
                }
            })
            .collect();

        edges.sort_by(|a, b| b.propagation_strength.total_cmp(&a.propagation_strength));

        tracing::info!("Found {} delay propagation edges", edges.len());
        edges
    }

    /// 传播强度：平均延迟达到饱和分钟数时为 100
    pub fn strength(&self, average_delay_minutes: f64) -> f64 {
        if self.settings.saturation_minutes <= 0.0 {
            return 0.0;
        }
        (average_delay_minutes / self.settings.saturation_minutes * 100.0).clamp(0.0, 100.0)
    }

    /// 查找由强传播边首尾相连组成的级联路径（至少两条边）
    pub fn cascade_paths(&self, edges: &[DelayEdge]) -> Vec<CascadePath> {
        let strong: Vec<&DelayEdge> = edges
            .iter()
            .filter(|e| e.propagation_strength >= self.settings.cascade_min_strength && e.source != e.target)
            .collect();

        let mut outgoing: BTreeMap<&str, Vec<&DelayEdge>> = BTreeMap::new();
        for edge in &strong {
            outgoing.entry(edge.source.as_str()).or_default().push(*edge);
        }

        let mut paths = Vec::new();
        for edge in &strong {
            let mut trail = vec![*edge];
            self.extend_paths(&outgoing, &mut trail, &mut paths);
        }

        paths.sort_by(|a: &CascadePath, b: &CascadePath| {
            b.mean_strength
                .total_cmp(&a.mean_strength)
                .then_with(|| b.units.len().cmp(&a.units.len()))
        });

        tracing::debug!("Found {} cascade paths", paths.len());
        paths
    }

    fn extend_paths<'a>(
        &self,
        outgoing: &BTreeMap<&str, Vec<&'a DelayEdge>>,
        trail: &mut Vec<&'a DelayEdge>,
        paths: &mut Vec<CascadePath>,
    ) {
        if trail.len() >= 2 {
            paths.push(to_cascade(trail));
        }
        if trail.len() >= self.settings.cascade_max_depth {
            return;
        }

        let Some(last) = trail.last() else {
            return;
        };
        let Some(next_edges) = outgoing.get(last.target.as_str()) else {
            return;
        };

        for next in next_edges {
            // 不允许回到已经经过的科室
            if trail.iter().any(|e| e.source == next.target) {
                continue;
            }
            trail.push(*next);
            self.extend_paths(outgoing, trail, paths);
            trail.pop();
        }
    }
}

fn to_cascade(trail: &[&DelayEdge]) -> CascadePath {
    let mut units: Vec<String> = trail.iter().map(|e| e.source.clone()).collect();
    if let Some(last) = trail.last() {
        units.push(last.target.clone());
    }

    CascadePath {
        units,
        mean_strength: trail.iter().map(|e| e.propagation_strength).sum::<f64>() / trail.len() as f64,
        total_delay_minutes: trail.iter().map(|e| e.average_delay_minutes).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, record};
    use crate::journey::JourneyReconstructor;
    use chrono::Duration;

    fn two_stage_journey(patient: &str, gap_minutes: i64) -> Vec<careflow_core::TransitRecord> {
        let entry = at(4, 8, 0);
        let exit = entry + Duration::minutes(30);
        let next_entry = exit + Duration::minutes(gap_minutes);
        vec![
            record(patient, "Emergency", entry, exit),
            record(patient, "Radiology", next_entry, next_entry + Duration::minutes(30)),
        ]
    }

    fn analyze(records: &[careflow_core::TransitRecord]) -> Vec<DelayEdge> {
        let journeys = JourneyReconstructor::new().reconstruct(records);
        DelayPropagationAnalyzer::default().analyze(&journeys)
    }

    #[test]
    fn test_noise_floor_boundary() {
        assert!(analyze(&two_stage_journey("P1", 5)).is_empty());

        let edges = analyze(&two_stage_journey("P1", 6));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].average_delay_minutes, 6.0);

        let edges = analyze(&two_stage_journey("P1", 10));
        assert_eq!(edges[0].average_delay_minutes, 10.0);
        assert_eq!(edges[0].source, "Emergency");
        assert_eq!(edges[0].target, "Radiology");
    }

    #[test]
    fn test_average_and_strength() {
        let mut records = two_stage_journey("P1", 20);
        records.extend(two_stage_journey("P2", 40));
        records.extend(two_stage_journey("P3", 3));

        let edges = analyze(&records);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].occurrences, 2);
        assert_eq!(edges[0].patient_count, 2);
        assert_eq!(edges[0].average_delay_minutes, 30.0);
        assert_eq!(edges[0].propagation_strength, 50.0);
    }

    #[test]
    fn test_strength_saturates() {
        let analyzer = DelayPropagationAnalyzer::default();
        assert_eq!(analyzer.strength(60.0), 100.0);
        assert_eq!(analyzer.strength(240.0), 100.0);
        assert_eq!(analyzer.strength(15.0), 25.0);
    }

    #[test]
    fn test_edges_sorted_by_strength() {
        let mut records = two_stage_journey("P1", 10);
        let exit = at(4, 9, 30);
        records.push(record("P1", "Ward", exit + Duration::minutes(90), exit + Duration::minutes(200)));

        let edges = analyze(&records);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].source, "Radiology");
        assert_eq!(edges[0].propagation_strength, 100.0);
        assert!(edges[0].propagation_strength >= edges[1].propagation_strength);
    }

    #[test]
    fn test_cascade_paths() {
        let edge = |source: &str, target: &str, strength: f64| DelayEdge {
            source: source.to_string(),
            target: target.to_string(),
            average_delay_minutes: strength * 0.6,
            patient_count: 1,
            occurrences: 1,
            propagation_strength: strength,
        };
        let edges = vec![
            edge("Emergency", "Radiology", 80.0),
            edge("Radiology", "Surgery", 60.0),
            edge("Surgery", "Emergency", 90.0),
            edge("Surgery", "Ward", 20.0),
        ];

        let paths = DelayPropagationAnalyzer::default().cascade_paths(&edges);

        assert!(paths.iter().all(|p| p.units.len() >= 3));
        assert!(paths.iter().any(|p| p.units == vec!["Emergency", "Radiology", "Surgery"]));
        // 弱边不参与
        assert!(paths.iter().all(|p| !p.units.contains(&"Ward".to_string())));
        // 不形成环
        for path in &paths {
            let unique: BTreeSet<_> = path.units.iter().collect();
            assert_eq!(unique.len(), path.units.len());
        }
        for pair in paths.windows(2) {
            assert!(pair[0].mean_strength >= pair[1].mean_strength);
        }
    }
}
