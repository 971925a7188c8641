//! Data model shared by the benchmark history store, its ingestion CLI and the dashboard that
//! reads the persisted history.
//!
//! There are two families of types here:
//!     - The raw ingestion payload, [RawRun], which is exactly what CI hands over and has not been
//!       validated yet.
//!     - The persisted layout, [BenchmarkData] and [RunRecord], which is the format the dashboard
//!       reads. Field names and ordering of these types must not change.

mod dashboard;
mod payload;
mod range;
mod record;

pub use dashboard::{load_benchmark_data, store_benchmark_data, BenchmarkData, DATA_JS_PREFIX};
pub use payload::{RawBench, RawCommit, RawRun};
pub use range::{format_range, parse_range};
pub use record::{BenchRecord, BenchmarkEntry, Commit, Person, RunRecord};

use anyhow::Context;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Load a single run payload from a reader
pub fn load_raw_run<R: Read>(reader: R) -> anyhow::Result<RawRun> {
    let reader = std::io::BufReader::new(reader);
    let raw_run: RawRun = serde_json::from_reader(reader)?;
    Ok(raw_run)
}

/// Load run payloads from a file
///
/// The file holds a sequence of JSON objects separated by whitespace, so both a single
/// pretty-printed payload and one payload per line are accepted. Errors report the line and column
/// of the offending value within the file.
pub fn load_raw_runs(path: PathBuf) -> anyhow::Result<Vec<RawRun>> {
    let content = std::fs::read_to_string(&path)?;

    let mut runs = Vec::new();
    for run in serde_json::Deserializer::from_str(&content).into_iter::<RawRun>() {
        let run = run.with_context(|| {
            format!(
                "Failed to parse run payload {} in {}",
                runs.len() + 1,
                path.display()
            )
        })?;
        runs.push(run);
    }
    Ok(runs)
}

/// Serialize a run payload to a writer as a single line of JSON
pub fn store_raw_run<W: Write>(raw_run: &RawRun, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *writer, raw_run)?;
    let _ = writer.write("\n".as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "commit": {
            "author": { "email": "dev@example.com", "name": "Dev" },
            "committer": { "email": "noreply@github.com", "name": "GitHub" },
            "id": "59b6d26e0be8a2e056d6826b9ce39366c5cc4fdc",
            "message": "Update bench.yml",
            "timestamp": "2020-05-21T11:28:04-05:00"
        },
        "date": 1590080218824,
        "tool": "cargo",
        "benches": [
            { "name": "arithmetic", "value": 26579, "range": "± 744", "unit": "ns/iter" }
        ]
    }"#;

    #[test]
    fn load_single_payload() {
        let run = load_raw_run(PAYLOAD.as_bytes()).unwrap();
        assert_eq!(run.tool.as_deref(), Some("cargo"));
        assert_eq!(run.date, Some(1590080218824));
        let benches = run.benches.unwrap();
        assert_eq!(benches.len(), 1);
        assert_eq!(benches[0].value, Some(26579.0));
        assert_eq!(benches[0].range.as_deref(), Some("± 744"));
    }

    #[test]
    fn load_payloads_as_lines() {
        let run = load_raw_run(PAYLOAD.as_bytes()).unwrap();
        let mut second = run.clone();
        second.date = Some(1590080218825);

        let dir = std::env::temp_dir().join(format!("bench-history-model-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runs.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        store_raw_run(&run, &mut file).unwrap();
        store_raw_run(&second, &mut file).unwrap();
        drop(file);

        let loaded = load_raw_runs(path).unwrap();
        std::fs::remove_dir_all(dir).ok();

        pretty_assertions::assert_eq!(vec![run, second], loaded);
    }

    fn load_from_file(name: &str, content: &str) -> anyhow::Result<Vec<RawRun>> {
        let dir = std::env::temp_dir().join(format!(
            "bench-history-model-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runs.json");
        std::fs::write(&path, content).unwrap();
        let loaded = load_raw_runs(path);
        std::fs::remove_dir_all(dir).ok();
        loaded
    }

    #[test]
    fn load_pretty_printed_payloads() {
        let loaded = load_from_file("pretty", &format!("{PAYLOAD}\n\n{PAYLOAD}\n")).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].date, Some(1590080218824));
    }

    #[test]
    fn malformed_pretty_payload_reports_its_position() {
        // Missing comma after the date
        let broken = PAYLOAD.replace("1590080218824,", "1590080218824");
        let err = load_from_file("malformed", &broken).unwrap_err();

        assert!(err.to_string().contains("run payload 1"), "{err:#}");
        let cause = err.root_cause().to_string();
        assert!(cause.contains("line 10"), "{cause}");
    }

    #[test]
    fn error_names_the_failing_payload() {
        let content = format!("{}\n[1, 2]\n", PAYLOAD.replace('\n', " "));
        let err = load_from_file("not-a-run", &content).unwrap_err();

        assert!(err.to_string().contains("run payload 2"), "{err:#}");
        assert!(err.root_cause().to_string().contains("line 2"), "{err:#}");
    }
}
