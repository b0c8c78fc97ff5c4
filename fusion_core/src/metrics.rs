//! Run metrics: detection counts, duplicates, crash warnings, data gaps and
//! the share of ticks each intersection spent congested.

use crate::{
    processor::FusionOutput,
    types::CongestionStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accumulated statistics over a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Number of ticks fused
    pub n_ticks: u64,
    pub n_agents: u64,
    pub n_detections: u64,
    pub n_duplicates: u64,
    /// Degenerate boxes skipped during projection
    pub n_skipped: u64,
    pub n_crash_warnings: u64,
    /// (entity, tick) pairs without a camera frame
    pub n_gaps: u64,
    /// Ticks each intersection was classified congested
    pub congested_ticks: BTreeMap<String, u64>,
    /// Total fusion time (µs)
    pub fusion_time_us: u64,
}

/// Predicted vs. recorded congestion share for one intersection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CongestionComparison {
    pub intersection_id: String,
    pub predicted_pct: f64,
    pub ground_truth_pct: f64,
}

impl RunMetrics {
    /// Accumulate one tick.
    pub fn accumulate(&mut self, output: &FusionOutput) {
        self.n_ticks += 1;
        self.n_agents += output.record.agents.len() as u64;
        self.n_detections += output.stats.projected as u64;
        self.n_duplicates += output.stats.duplicates as u64;
        self.n_skipped += output.stats.skipped as u64;
        self.n_crash_warnings += output.stats.crash_warnings as u64;
        self.n_gaps += output.stats.gaps as u64;
        self.fusion_time_us += output.stats.elapsed_us;
        for status in &output.record.intersections {
            let count = self.congested_ticks.entry(status.id.clone()).or_insert(0);
            if status.status == CongestionStatus::Congested {
                *count += 1;
            }
        }
    }

    /// Percentage of fused ticks an intersection was congested.
    pub fn congested_percentage(&self, intersection_id: &str) -> f64 {
        if self.n_ticks == 0 {
            return 0.0;
        }
        let congested = self.congested_ticks.get(intersection_id).copied().unwrap_or(0);
        100.0 * congested as f64 / self.n_ticks as f64
    }

    /// Compare with recorded congestion counts (`intersection → congested
    /// frames` over `frame_count` frames).
    pub fn compare_congestion(
        &self,
        ground_truth: &BTreeMap<String, u64>,
        frame_count: u64,
    ) -> Vec<CongestionComparison> {
        ground_truth
            .iter()
            .map(|(id, &frames)| CongestionComparison {
                intersection_id: id.clone(),
                predicted_pct: self.congested_percentage(id),
                ground_truth_pct: if frame_count == 0 {
                    0.0
                } else {
                    100.0 * frames as f64 / frame_count as f64
                },
            })
            .collect()
    }

    /// Mean fusion time per tick (µs).
    pub fn mean_fusion_time_us(&self) -> f64 {
        if self.n_ticks == 0 {
            0.0
        } else {
            self.fusion_time_us as f64 / self.n_ticks as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        processor::FusionStats,
        types::{IntersectionStatus, TickRecord},
    };

    fn output(tick: u64, congested: bool) -> FusionOutput {
        FusionOutput {
            record: TickRecord {
                tick,
                agents: vec![],
                intersections: vec![IntersectionStatus {
                    id: "intersection_1".into(),
                    car_count: 0,
                    human_count: 0,
                    rsu_count: 0,
                    speeds: vec![],
                    status: if congested {
                        CongestionStatus::Congested
                    } else {
                        CongestionStatus::Low
                    },
                    tick,
                }],
                gaps: vec![],
            },
            stats: FusionStats {
                projected: 2,
                duplicates: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn congested_share() {
        let mut m = RunMetrics::default();
        m.accumulate(&output(0, true));
        m.accumulate(&output(1, false));
        m.accumulate(&output(2, false));
        m.accumulate(&output(3, true));
        assert_eq!(m.n_ticks, 4);
        assert_eq!(m.n_detections, 8);
        assert_eq!(m.n_duplicates, 4);
        assert_eq!(m.congested_percentage("intersection_1"), 50.0);
        assert_eq!(m.congested_percentage("unknown"), 0.0);

        let gt = BTreeMap::from([("intersection_1".to_string(), 1u64)]);
        let cmp = m.compare_congestion(&gt, 4);
        assert_eq!(cmp[0].ground_truth_pct, 25.0);
        assert_eq!(cmp[0].predicted_pct, 50.0);
    }

    #[test]
    fn empty_run_is_zero() {
        let m = RunMetrics::default();
        assert_eq!(m.congested_percentage("intersection_1"), 0.0);
        assert_eq!(m.mean_fusion_time_us(), 0.0);
    }
}
