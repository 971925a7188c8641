use crate::detect::{Detector, Verdict};
use crate::error::ConfigurationError;
use crate::key::SeriesKey;
use crate::normalize::Run;
use crate::policy::{DetectorPolicy, Direction, PolicySet};
use crate::store::HistoryStore;
use serde::{Deserialize, Serialize};

/// A measurement that got worse than its policy allows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionAlert {
    pub tool: String,
    pub name: String,
    pub commit_id: String,
    pub current: f64,
    pub baseline: f64,
    pub deviation: f64,
    pub threshold: f64,
    pub direction: Direction,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum EntryOutcome {
    Evaluated { verdict: Verdict },
    /// The series has no record for the run's commit
    NotInHistory,
}

/// The outcome of evaluating one entry of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryVerdict {
    #[serde(flatten)]
    pub key: SeriesKey,
    pub commit_id: String,
    pub unit: String,
    pub policy: DetectorPolicy,
    pub outcome: EntryOutcome,
}

impl EntryVerdict {
    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.outcome {
            EntryOutcome::Evaluated { verdict } => Some(verdict),
            EntryOutcome::NotInHistory => None,
        }
    }

    /// The alert for this entry, if it regressed
    pub fn alert(&self) -> Option<RegressionAlert> {
        let Some(Verdict::Regression { comparison }) = self.verdict() else {
            return None;
        };

        Some(RegressionAlert {
            tool: self.key.tool.clone(),
            name: self.key.name.clone(),
            commit_id: self.commit_id.clone(),
            current: comparison.current,
            baseline: comparison.baseline,
            deviation: comparison.deviation,
            threshold: self.policy.alert_threshold,
            direction: self.policy.direction,
            unit: self.unit.clone(),
        })
    }
}

/// Evaluate every entry of an appended run, in entry order
///
/// Policies for all entries are resolved first, so a configuration problem fails the whole call
/// before anything is evaluated. After that each entry is evaluated on its own.
pub fn evaluate_verdicts(
    run: &Run,
    store: &HistoryStore,
    policies: &PolicySet,
) -> Result<Vec<EntryVerdict>, ConfigurationError> {
    policies.validate()?;
    let detectors = run
        .series_keys()
        .map(|key| {
            let detector = Detector::new(policies.resolve(&key)?)?;
            Ok((key, detector))
        })
        .collect::<Result<Vec<_>, ConfigurationError>>()?;

    let verdicts = run
        .entries
        .iter()
        .zip(detectors)
        .map(|(entry, (key, detector))| {
            let history = store.history(&key.tool, &key.name);
            let outcome = match history
                .position(&run.commit.id)
                .and_then(|index| history.get(index))
            {
                Some(record) => {
                    let verdict = detector.detect(&history, record);
                    match &verdict {
                        Verdict::Regression { comparison } => log::warn!(
                            "Regression in {} at commit {}: {} {} against a baseline of {} ({:+.2}%)",
                            key,
                            run.commit.id,
                            comparison.current,
                            entry.unit,
                            comparison.baseline,
                            comparison.deviation * 100.0
                        ),
                        Verdict::Indeterminate { reason } => {
                            log::info!("Cannot judge {} at commit {}: {}", key, run.commit.id, reason)
                        }
                        _ => log::debug!("{} is {} at commit {}", key, verdict.kind(), run.commit.id),
                    }
                    EntryOutcome::Evaluated { verdict }
                }
                None => {
                    log::warn!(
                        "Not evaluating {}, it has no record for commit {}",
                        key,
                        run.commit.id
                    );
                    EntryOutcome::NotInHistory
                }
            };

            EntryVerdict {
                key,
                commit_id: run.commit.id.clone(),
                unit: entry.unit.clone(),
                policy: *detector.policy(),
                outcome,
            }
        })
        .collect();

    Ok(verdicts)
}

/// Evaluate an appended run and return the alerts it raised, in entry order
pub fn evaluate(
    run: &Run,
    store: &HistoryStore,
    policies: &PolicySet,
) -> Result<Vec<RegressionAlert>, ConfigurationError> {
    Ok(evaluate_verdicts(run, store, policies)?
        .iter()
        .filter_map(EntryVerdict::alert)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::policy::PolicyOverride;
    use bench_history_model::{RawBench, RawCommit, RawRun};
    use pretty_assertions::assert_eq;

    fn run(commit_id: &str, date: i64, benches: &[(&str, f64)]) -> Run {
        normalize(&RawRun {
            commit: Some(RawCommit {
                id: Some(commit_id.to_string()),
                message: Some("Update bench.yml".to_string()),
                timestamp: Some("2020-05-21T11:28:04-05:00".to_string()),
                ..Default::default()
            }),
            date: Some(date),
            tool: Some("cargo".to_string()),
            benches: Some(
                benches
                    .iter()
                    .map(|(name, value)| RawBench {
                        name: Some(name.to_string()),
                        value: Some(*value),
                        range: Some("± 1".to_string()),
                        unit: Some("ns/iter".to_string()),
                        extra: None,
                    })
                    .collect(),
            ),
        })
        .unwrap()
    }

    fn appended(store: &HistoryStore, run: Run) -> Run {
        for result in store.append_run(&run) {
            result.unwrap();
        }
        run
    }

    #[test]
    fn fibonacci_regression_raises_one_alert() {
        let store = HistoryStore::in_memory();
        let policies = PolicySet::uniform(DetectorPolicy::new(0.2, Direction::HigherIsWorse));

        let first = appended(&store, run("c1", 1000, &[("fibonacci", 540592.0)]));
        assert!(evaluate(&first, &store, &policies).unwrap().is_empty());

        let second = appended(&store, run("c2", 2000, &[("fibonacci", 530777.0)]));
        let verdicts = evaluate_verdicts(&second, &store, &policies).unwrap();
        assert_eq!(verdicts[0].verdict().unwrap().kind(), "stable");
        assert!(evaluate(&second, &store, &policies).unwrap().is_empty());

        let third = appended(&store, run("c3", 3000, &[("fibonacci", 700000.0)]));
        let alerts = evaluate(&third, &store, &policies).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            (alerts[0].tool.as_str(), alerts[0].name.as_str()),
            ("cargo", "fibonacci")
        );
        assert_eq!(alerts[0].commit_id, "c3");
        assert_eq!(alerts[0].baseline, 530777.0);
        assert_eq!(alerts[0].current, 700000.0);
        assert_eq!(alerts[0].threshold, 0.2);
        assert_eq!(alerts[0].unit, "ns/iter");
    }

    #[test]
    fn entries_are_evaluated_independently_and_in_order() {
        let store = HistoryStore::in_memory();
        let policies = PolicySet::uniform(DetectorPolicy::new(0.5, Direction::HigherIsWorse));

        appended(&store, run("c1", 1000, &[("zero", 0.0), ("slow", 10.0), ("fast", 10.0)]));
        let latest = appended(
            &store,
            run(
                "c2",
                2000,
                &[("slow", 30.0), ("zero", 1.0), ("new", 5.0), ("fast", 20.0)],
            ),
        );

        let verdicts = evaluate_verdicts(&latest, &store, &policies).unwrap();
        assert_eq!(
            verdicts
                .iter()
                .map(|v| (v.key.name.as_str(), v.verdict().unwrap().kind()))
                .collect::<Vec<_>>(),
            vec![
                ("slow", "regression"),
                ("zero", "indeterminate"),
                ("new", "stable"),
                ("fast", "regression"),
            ]
        );

        let alerts = evaluate(&latest, &store, &policies).unwrap();
        assert_eq!(
            alerts.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            vec!["slow", "fast"]
        );
        assert_eq!(alerts[0].deviation, 2.0);
    }

    #[test]
    fn configuration_error_is_fatal() {
        let store = HistoryStore::in_memory();
        let policies = PolicySet::default().with_tool(
            "cargo",
            PolicyOverride {
                alert_threshold: Some(0.2),
                ..Default::default()
            },
        );

        let latest = appended(&store, run("c1", 1000, &[("fibonacci", 1.0)]));
        assert!(matches!(
            evaluate(&latest, &store, &policies),
            Err(ConfigurationError::MissingDirection { .. })
        ));
    }

    #[test]
    fn per_benchmark_policy_applies() {
        let store = HistoryStore::in_memory();
        let policies = PolicySet::uniform(DetectorPolicy::new(0.5, Direction::HigherIsWorse))
            .with_benchmark(
                "cargo",
                "throughput",
                PolicyOverride {
                    direction: Some(Direction::LowerIsWorse),
                    ..Default::default()
                },
            );

        appended(&store, run("c1", 1000, &[("throughput", 400.0), ("latency", 400.0)]));
        let latest = appended(
            &store,
            run("c2", 2000, &[("throughput", 100.0), ("latency", 100.0)]),
        );

        let verdicts = evaluate_verdicts(&latest, &store, &policies).unwrap();
        assert_eq!(verdicts[0].policy.direction, Direction::LowerIsWorse);
        assert_eq!(verdicts[0].verdict().unwrap().kind(), "regression");
        assert_eq!(verdicts[1].verdict().unwrap().kind(), "improvement");
    }

    #[test]
    fn run_that_was_never_appended() {
        let store = HistoryStore::in_memory();
        let policies = PolicySet::uniform(DetectorPolicy::new(0.5, Direction::HigherIsWorse));

        let missing = run("c1", 1000, &[("fibonacci", 1.0)]);
        let verdicts = evaluate_verdicts(&missing, &store, &policies).unwrap();
        assert_eq!(verdicts[0].outcome, EntryOutcome::NotInHistory);
        assert!(verdicts[0].alert().is_none());
    }

    #[test]
    fn alert_json_uses_camel_case() {
        let alert = RegressionAlert {
            tool: "cargo".to_string(),
            name: "fibonacci".to_string(),
            commit_id: "c3".to_string(),
            current: 150.0,
            baseline: 100.0,
            deviation: 0.5,
            threshold: 0.2,
            direction: Direction::HigherIsWorse,
            unit: "ns/iter".to_string(),
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["commitId"], "c3");
        assert_eq!(value["direction"], "higherIsWorse");
    }
}
