use bench_history_core::prelude::*;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct VerdictRow {
    pub tool: String,
    pub name: String,
    pub verdict: String,
    pub current: String,
    pub baseline: String,
    pub change: String,
    pub unit: String,
}

#[derive(Tabled)]
pub struct RejectedRow {
    pub tool: String,
    pub name: String,
    pub reason: String,
    pub message: String,
}

#[derive(Tabled)]
pub struct HistoryRow {
    pub commit: String,
    pub run_time: String,
    #[tabled(display = "float2")]
    pub value: f64,
    #[tabled(display = "float2")]
    pub range: f64,
    pub unit: String,
}

#[derive(Tabled)]
pub struct SeriesRow {
    pub tool: String,
    pub name: String,
    pub points: usize,
    pub latest_commit: String,
    #[tabled(display = "float2")]
    pub latest_value: f64,
    pub unit: String,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn short_commit(id: &str) -> String {
    id.chars().take(8).collect()
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.to_string()
}

pub fn verdict_rows(report: &IngestReport) -> Vec<VerdictRow> {
    report
        .verdicts
        .iter()
        .map(|entry| {
            let comparison = entry.verdict().and_then(Verdict::comparison);
            VerdictRow {
                tool: entry.key.tool.clone(),
                name: entry.key.name.clone(),
                verdict: match entry.verdict() {
                    Some(verdict) => verdict.kind().to_string(),
                    None => "not evaluated".to_string(),
                },
                current: comparison
                    .map(|c| float2(&c.current))
                    .unwrap_or_else(|| "-".to_string()),
                baseline: comparison
                    .map(|c| float2(&c.baseline))
                    .unwrap_or_else(|| "-".to_string()),
                change: comparison
                    .map(|c| format!("{:+.2}%", c.deviation * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
                unit: entry.unit.clone(),
            }
        })
        .collect()
}

pub fn rejected_rows(report: &IngestReport) -> Vec<RejectedRow> {
    report
        .rejected
        .iter()
        .map(|rejected| RejectedRow {
            tool: rejected.key.tool.clone(),
            name: rejected.key.name.clone(),
            reason: rejected.reason.to_string(),
            message: rejected.message.clone(),
        })
        .collect()
}

pub fn history_rows(history: &History) -> Vec<HistoryRow> {
    history
        .iter()
        .map(|record| HistoryRow {
            commit: short_commit(&record.commit.id),
            run_time: chrono::DateTime::from_timestamp_millis(record.run_timestamp)
                .map(|time| time.to_rfc3339())
                .unwrap_or_else(|| record.run_timestamp.to_string()),
            value: record.entry.value,
            range: record.entry.range,
            unit: record.entry.unit.clone(),
        })
        .collect()
}

pub fn series_rows(store: &HistoryStore) -> Vec<SeriesRow> {
    store
        .series_keys()
        .into_iter()
        .filter_map(|key| {
            let history = store.history(&key.tool, &key.name);
            let latest = history.last()?;
            Some(SeriesRow {
                tool: key.tool.clone(),
                name: key.name.clone(),
                points: history.len(),
                latest_commit: short_commit(&latest.commit.id),
                latest_value: latest.entry.value,
                unit: latest.entry.unit.clone(),
            })
        })
        .collect()
}

/// Print what happened to the entries of an ingested run
pub fn print_report(report: &IngestReport) {
    println!(
        "\n{} run for commit {}",
        report.tool,
        short_commit(&report.commit_id)
    );
    if !report.verdicts.is_empty() {
        println!("{}", render(verdict_rows(report)));
    }
    if !report.rejected.is_empty() {
        println!("Rejected entries");
        println!("{}", render(rejected_rows(report)));
    }
}

pub fn print_history(history: &History) {
    println!("\nHistory of {}", history.key());
    println!("{}", render(history_rows(history)));
}

pub fn print_series(store: &HistoryStore) {
    println!("{}", render(series_rows(store)));
}
