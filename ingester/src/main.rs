use anyhow::{anyhow, Context};
use bench_history_core::prelude::HistoryStore;
use bench_history_ingester::{
    ingest_runs, load_policies, load_runs, open_store, table, write_report, DEFAULT_HISTORY_DIR,
    HISTORY_DIR_ENV, IGNORE_REGRESSIONS_ENV,
};
use bench_history_model::{load_benchmark_data, store_benchmark_data};
use clap::Parser;
use cli::{BenchHistoryCli, Command, ExportArgs, IngestArgs};
use log::debug;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = BenchHistoryCli::parse();

    let dir = cli
        .dir
        .or_else(|| std::env::var(HISTORY_DIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_DIR));
    debug!("Using history directory {}", dir.display());
    let store = open_store(&dir)?;

    match cli.command {
        Command::Ingest(args) => ingest_command(&store, args),
        Command::Import { file } => import_command(&store, &file),
        Command::Export(args) => export_command(&store, args),
        Command::History { tool, name } => {
            table::print_history(&store.history(&tool, &name));
            Ok(())
        }
        Command::Series => {
            table::print_series(&store);
            Ok(())
        }
    }
}

fn ingest_command(store: &HistoryStore, args: IngestArgs) -> anyhow::Result<()> {
    let ignore_regressions =
        args.ignore_regressions || std::env::var(IGNORE_REGRESSIONS_ENV).is_ok();

    let policies = load_policies(args.policies.as_deref())?;
    let raw_runs = load_runs(&args.files)?;

    let outcome = ingest_runs(&raw_runs, store, &policies);
    for report in &outcome.reports {
        let path = write_report(report, &args.report_dir)?;
        debug!("Wrote ingest report to {}", path.display());
        table::print_report(report);
    }

    // Runs rejected as a whole are never ignored
    if !outcome.errors.is_empty() {
        return Err(anyhow!(
            "{} out of {} runs failed:\n{:#?}",
            outcome.errors.len(),
            outcome.total_runs(),
            outcome.errors
        ));
    }

    let alerts = outcome.alerts().collect::<Vec<_>>();
    if !alerts.is_empty() {
        let error_message = format!(
            "{} regressions detected:\n{}",
            alerts.len(),
            alerts
                .iter()
                .map(|alert| format!(
                    "  {}/{} at {}: {} {} against a baseline of {} (threshold {}%)",
                    alert.tool,
                    alert.name,
                    alert.commit_id,
                    alert.current,
                    alert.unit,
                    alert.baseline,
                    alert.threshold * 100.0
                ))
                .collect::<Vec<_>>()
                .join("\n")
        );

        if ignore_regressions {
            log::warn!("{}", error_message);
        } else {
            return Err(anyhow!(error_message));
        }
    }

    Ok(())
}

fn import_command(store: &HistoryStore, file: &Path) -> anyhow::Result<()> {
    let data = load_benchmark_data(
        File::open(file).with_context(|| format!("Cannot open {}", file.display()))?,
    )?;
    let summary = store.import(&data);

    println!(
        "Imported {} of {} runs: {} entries appended, {} skipped, {} invalid runs",
        summary.runs - summary.invalid_runs,
        summary.runs,
        summary.appended,
        summary.skipped,
        summary.invalid_runs
    );
    Ok(())
}

fn export_command(store: &HistoryStore, args: ExportArgs) -> anyhow::Result<()> {
    let data = store.dashboard_data(&args.repo_url);

    match args.output {
        Some(path) => {
            let mut file = File::create(&path)
                .with_context(|| format!("Cannot create {}", path.display()))?;
            store_benchmark_data(&data, &mut file, !args.json)?;
            file.flush()?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            store_benchmark_data(&data, &mut stdout, !args.json)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
