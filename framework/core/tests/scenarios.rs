use bench_history_core::prelude::*;
use bench_history_model::{load_raw_run, RawBench, RawRun};
use std::collections::BTreeMap;
use std::sync::Arc;

fn cargo_run(commit_id: &str, date: i64, fibonacci: f64) -> RawRun {
    let json = format!(
        r#"{{
            "commit": {{
                "author": {{ "email": "dev@example.com", "name": "Dev", "username": "dev" }},
                "committer": {{ "email": "noreply@github.com", "name": "GitHub", "username": "web-flow" }},
                "distinct": true,
                "id": "{commit_id}",
                "message": "Update bench.yml",
                "timestamp": "2020-05-21T11:28:04-05:00",
                "tree_id": "8bb1b4ea9c8e2c2a3e6d3bd0f7c2b3d5b2a5a4c1",
                "url": "https://github.com/example/bench/commit/{commit_id}"
            }},
            "date": {date},
            "tool": "cargo",
            "benches": [
                {{ "name": "fibonacci", "value": {fibonacci}, "range": "± 744", "unit": "ns/iter" }}
            ]
        }}"#
    );
    load_raw_run(json.as_bytes()).unwrap()
}

fn policies() -> PolicySet {
    PolicySet::from_toml_str(
        r#"
        [tools.cargo]
        alertThreshold = 0.2
        direction = "higherIsWorse"
        "#,
    )
    .unwrap()
}

#[test]
fn fibonacci_slows_down() {
    let store = HistoryStore::in_memory();

    let report = ingest(&cargo_run("c1", 1590080218824, 540592.0), &store, &policies()).unwrap();
    assert!(report.alerts.is_empty());

    let report = ingest(&cargo_run("c2", 1590081353339, 530777.0), &store, &policies()).unwrap();
    assert!(report.alerts.is_empty());
    assert_eq!(report.verdicts[0].verdict().unwrap().kind(), "stable");

    let report = ingest(&cargo_run("c3", 1590082000000, 700000.0), &store, &policies()).unwrap();
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].tool, "cargo");
    assert_eq!(report.alerts[0].name, "fibonacci");

    assert_eq!(store.history("cargo", "fibonacci").len(), 3);
}

#[test]
fn history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let open = || HistoryStore::open(Arc::new(DirectoryBackend::new(dir.path()).unwrap())).unwrap();

    {
        let store = open();
        ingest(&cargo_run("c1", 1000, 540592.0), &store, &policies()).unwrap();
        ingest(&cargo_run("c2", 2000, 530777.0), &store, &policies()).unwrap();
    }

    let store = open();
    let report = ingest(&cargo_run("c3", 3000, 700000.0), &store, &policies()).unwrap();
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].baseline, 530777.0);

    let report = ingest(&cargo_run("c2", 4000, 1.0), &store, &policies()).unwrap();
    assert_eq!(report.rejected[0].reason, RejectionReason::DuplicateCommit);
    assert!(store.contains("cargo", "fibonacci", "c2"));
    assert_eq!(store.history("cargo", "fibonacci").len(), 3);
}

#[test]
fn interleaved_series_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let open = || HistoryStore::open(Arc::new(DirectoryBackend::new(dir.path()).unwrap())).unwrap();
    let run = |commit_id: &str, date: i64, benches: &[(&str, f64)]| {
        let mut raw = cargo_run(commit_id, date, 0.0);
        raw.benches = Some(
            benches
                .iter()
                .map(|(name, value)| RawBench {
                    name: Some(name.to_string()),
                    value: Some(*value),
                    range: Some("± 10".to_string()),
                    unit: Some("ns/iter".to_string()),
                    extra: None,
                })
                .collect(),
        );
        raw
    };

    let histories = |store: &HistoryStore| {
        store
            .series_keys()
            .into_iter()
            .map(|key| {
                let commits = store
                    .history(&key.tool, &key.name)
                    .iter()
                    .map(|record| record.commit.id.clone())
                    .collect::<Vec<_>>();
                (key.to_string(), commits)
            })
            .collect::<BTreeMap<_, _>>()
    };

    let before = {
        let store = open();
        ingest(&run("c1", 1000, &[("fibonacci", 100.0)]), &store, &policies()).unwrap();
        ingest(&run("c2", 2000, &[("fibonacci", 110.0)]), &store, &policies()).unwrap();
        ingest(&run("c3", 500, &[("gcd", 5.0)]), &store, &policies()).unwrap();
        let report = ingest(
            &run("c1", 1000, &[("gcd", 6.0), ("sort", 7.0)]),
            &store,
            &policies(),
        )
        .unwrap();
        assert_eq!(report.appended.len(), 2);
        histories(&store)
    };

    let store = open();
    pretty_assertions::assert_eq!(before, histories(&store));
    assert_eq!(before["cargo/gcd"], vec!["c3", "c1"]);

    let report = ingest(&run("c4", 1500, &[("gcd", 20.0)]), &store, &policies()).unwrap();
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].baseline, 6.0);
}

#[test]
fn detection_on_a_snapshot() {
    let store = HistoryStore::in_memory();
    let run = normalize(&cargo_run("c1", 1000, 100.0)).unwrap();
    for result in store.append_run(&run) {
        result.unwrap();
    }

    let history = store.history("cargo", "fibonacci");
    let detector = Detector::new(DetectorPolicy::new(0.5, Direction::HigherIsWorse)).unwrap();
    let candidate = |value: f64| {
        let run = normalize(&cargo_run("next", 2000, value)).unwrap();
        HistoryRecord {
            commit: run.commit.clone(),
            entry: run.entries[0].clone(),
            run_timestamp: run.run_timestamp,
        }
    };

    assert_eq!(detector.detect(&history, &candidate(151.0)).kind(), "regression");
    assert_eq!(detector.detect(&history, &candidate(149.0)).kind(), "stable");
    assert_eq!(detector.detect(&history, &candidate(50.0)).kind(), "improvement");
}
