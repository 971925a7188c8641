use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bench-history", version, about, long_about = None)]
pub struct BenchHistoryCli {
    /// The directory the history is stored in.
    ///
    /// Defaults to the `BENCH_HISTORY_DIR` environment variable, or `bench-history` if that is not set.
    #[clap(long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest benchmark runs and report regressions
    Ingest(IngestArgs),
    /// Import an existing history document, as JSON or as the dashboard's `data.js`
    Import {
        /// The document to import
        file: PathBuf,
    },
    /// Export the full history in the layout the dashboard reads
    Export(ExportArgs),
    /// Show the history of one series
    History {
        /// The tool that produced the series, for example `cargo`
        #[clap(long)]
        tool: String,
        /// The benchmark name
        #[clap(long)]
        name: String,
    },
    /// List every series in the history
    Series,
}

#[derive(Args)]
pub struct IngestArgs {
    /// Files with run payloads, either a single JSON object or one JSON object per line
    #[clap(required = true)]
    pub files: Vec<PathBuf>,

    /// A TOML file with detector policies.
    ///
    /// Without one, every series alerts when it gets twice as bad as its previous measurement.
    #[clap(long, short)]
    pub policies: Option<PathBuf>,

    /// The directory to write ingest reports to
    #[clap(long, default_value = ".")]
    pub report_dir: PathBuf,

    /// Exit successfully even if regressions were detected.
    ///
    /// Setting the `IGNORE_REGRESSIONS` environment variable has the same effect.
    #[clap(long, default_value = "false")]
    pub ignore_regressions: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Where to write the export, standard output if not set
    #[clap(long, short)]
    pub output: Option<PathBuf>,

    /// The repository URL recorded in the export
    #[clap(long, default_value = "")]
    pub repo_url: String,

    /// Write plain JSON instead of `data.js`
    #[clap(long, default_value = "false")]
    pub json: bool,
}
