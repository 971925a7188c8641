use crate::error::ConfigurationError;
use crate::policy::{DetectorPolicy, Direction};
use crate::store::{History, HistoryRecord};
use serde::{Deserialize, Serialize};

/// A measurement compared against its baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Mean of the preceding measurements in the rolling window
    pub baseline: f64,
    pub current: f64,
    /// Relative deviation from the baseline, positive when the measurement got worse
    pub deviation: f64,
    /// How many measurements the baseline was built from
    pub baseline_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum IndeterminateReason {
    /// A relative deviation from a zero baseline is undefined
    #[display("baseline is zero")]
    ZeroBaseline,
}

/// The outcome of comparing one measurement against its series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Verdict {
    Regression { comparison: Comparison },
    Improvement { comparison: Comparison },
    /// No significant change, or nothing to compare against yet
    Stable { comparison: Option<Comparison> },
    Indeterminate { reason: IndeterminateReason },
}

impl Verdict {
    pub fn kind(&self) -> &'static str {
        match self {
            Verdict::Regression { .. } => "regression",
            Verdict::Improvement { .. } => "improvement",
            Verdict::Stable { .. } => "stable",
            Verdict::Indeterminate { .. } => "indeterminate",
        }
    }

    pub fn is_regression(&self) -> bool {
        matches!(self, Verdict::Regression { .. })
    }

    pub fn comparison(&self) -> Option<&Comparison> {
        match self {
            Verdict::Regression { comparison } | Verdict::Improvement { comparison } => {
                Some(comparison)
            }
            Verdict::Stable { comparison } => comparison.as_ref(),
            Verdict::Indeterminate { .. } => None,
        }
    }
}

/// Compares measurements against a baseline with a fixed policy
#[derive(Debug, Clone)]
pub struct Detector {
    policy: DetectorPolicy,
}

impl Detector {
    pub fn new(policy: DetectorPolicy) -> Result<Self, ConfigurationError> {
        policy.validate("detector")?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &DetectorPolicy {
        &self.policy
    }

    /// Judge `record` against the measurements that precede it in `history`
    ///
    /// If `record` is in `history` the baseline is taken from the records before it, otherwise
    /// from the end of `history`. The record itself is never part of its baseline.
    pub fn detect(&self, history: &History, record: &HistoryRecord) -> Verdict {
        let end = history
            .position(&record.commit.id)
            .unwrap_or(history.len());
        let start = end.saturating_sub(self.policy.rolling_window);
        let window = (start..end)
            .filter_map(|index| history.get(index))
            .map(|preceding| preceding.entry.value)
            .collect::<Vec<_>>();

        if window.is_empty() {
            return Verdict::Stable { comparison: None };
        }

        let baseline = window.iter().sum::<f64>() / window.len() as f64;
        if baseline == 0.0 {
            return Verdict::Indeterminate {
                reason: IndeterminateReason::ZeroBaseline,
            };
        }

        let current = record.entry.value;
        let (deviation, gain) = match self.policy.direction {
            Direction::HigherIsWorse => (
                (current - baseline) / baseline,
                (baseline - current) / current,
            ),
            Direction::LowerIsWorse => (
                (baseline - current) / baseline,
                (current - baseline) / current,
            ),
        };
        let comparison = Comparison {
            baseline,
            current,
            deviation,
            baseline_points: window.len(),
        };

        log::debug!(
            "{}: baseline {} from {} points, current {}, deviation {:.4}",
            history.key(),
            baseline,
            window.len(),
            current,
            deviation
        );

        if deviation > self.policy.alert_threshold {
            Verdict::Regression { comparison }
        } else if gain > self.policy.improvement_threshold {
            Verdict::Improvement { comparison }
        } else {
            Verdict::Stable {
                comparison: Some(comparison),
            }
        }
    }
}

/// Judge `record` against `history` with `policy`
pub fn detect(
    history: &History,
    record: &HistoryRecord,
    policy: &DetectorPolicy,
) -> Result<Verdict, ConfigurationError> {
    Ok(Detector::new(*policy)?.detect(history, record))
}
