use clap::{Parser, Subcommand};
use std::path::PathBuf;

use yolo_dataset_merger::config::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(name = "yolo-merge")]
#[command(about = "Merge YOLO detection datasets under a class mapping and quotas", long_about = None)]
pub struct Cli {
    /// Directory for log files (defaults to the per-user data directory)
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write an example configuration file
    Init {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show per-target supply, quota and selection without writing anything
    Preview {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Run the merge into the plan's output directory
    Run {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Ignore quotas and take every image that survives class mapping
        #[arg(long)]
        all: bool,

        /// Merge into an output directory that is not empty
        #[arg(long)]
        force: bool,

        /// Do not write reports/merge_report.json
        #[arg(long)]
        no_report: bool,
    },
}
