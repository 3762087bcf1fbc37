use clap::Parser;
use std::io::{self, BufRead, IsTerminal};
use std::path::Path;
use std::process::ExitCode;
use std::sync::mpsc::channel;
use std::thread;
use tracing::{error, info, warn};

use yolo_dataset_merger::core::merge::{
    preview, run_merge, CancelToken, MergeOptions, MergeOutcome, MergeProgressMessage, Progress,
    SelectionResult,
};
use yolo_dataset_merger::logging::{default_log_dir, setup_logging};
use yolo_dataset_merger::{MergeConfig, MergeError, MergeResult, MergeSummary};

mod cli;
use cli::{Cli, Command};

/// Progress messages are sent every this many images
const PROGRESS_EVERY: usize = 50;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    if let Err(e) = setup_logging(&log_dir) {
        eprintln!("Failed to set up logging in {:?}: {}", log_dir, e);
    }

    let result = match cli.command {
        Command::Init { config, force } => init_config(&config, force),
        Command::Preview { config } => preview_config(&config),
        Command::Run {
            config,
            all,
            force,
            no_report,
        } => {
            let options = MergeOptions {
                take_all: all,
                allow_non_empty_output: force,
                write_report: !no_report,
            };
            run_config(&config, options)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_config(path: &Path, force: bool) -> MergeResult<ExitCode> {
    if path.exists() && !force {
        return Err(MergeError::Config(format!(
            "{:?} already exists, pass --force to overwrite",
            path
        )));
    }
    MergeConfig::template().save(path)?;
    println!("Wrote template configuration to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn preview_config(path: &Path) -> MergeResult<ExitCode> {
    let config = MergeConfig::load(path)?;
    let sources = config.open_sources();
    let selection = preview(&config.plan, &sources)?;
    print_preview(&config, &selection);
    Ok(ExitCode::SUCCESS)
}

fn print_preview(config: &MergeConfig, selection: &SelectionResult) {
    println!("{:<28} {:>8} {:>8} {:>8}", "target", "supply", "quota", "selected");
    for (target, row) in &selection.preview_supply {
        let name = config.plan.target_name(*target).unwrap_or("?");
        println!(
            "{:<28} {:>8} {:>8} {:>8}",
            format!("{} {}", target, name),
            row.supply,
            row.quota,
            row.selected
        );
        for edge in selection.preview_edges.get(target).into_iter().flatten() {
            println!(
                "  <- {:<23} {:>8} {:>8}",
                edge.edge.to_string(),
                edge.supply,
                edge.taken
            );
        }
    }
    println!("{} unique images selected", selection.selected_count());
    for warning in &selection.warnings {
        println!("warning: {}", warning);
    }
}

/// Run the merge on a worker thread and follow its progress messages.
fn run_config(path: &Path, options: MergeOptions) -> MergeResult<ExitCode> {
    let config = MergeConfig::load(path)?;
    let sources = config.open_sources();
    let plan = config.plan;

    let (tx, rx) = channel::<MergeProgressMessage>();
    let cancel = CancelToken::new();
    watch_stdin_for_cancel(cancel.clone());

    let worker_cancel = cancel.clone();
    let worker = thread::spawn(move || {
        info!("Background thread started for merge '{}'", plan.name);
        let progress_tx = tx.clone();
        let mut on_progress = |progress: &Progress| {
            if progress.value % PROGRESS_EVERY == 0 || progress.is_done() {
                let _ = progress_tx.send(MergeProgressMessage::Progress(*progress));
            }
        };

        let message = match run_merge(&plan, &sources, options, Some(&mut on_progress), Some(&worker_cancel)) {
            Ok(run) => match run.outcome {
                MergeOutcome::Completed(summary) => MergeProgressMessage::Complete(summary),
                MergeOutcome::Cancelled(summary) => MergeProgressMessage::Cancelled(summary),
            },
            Err(e) => MergeProgressMessage::Error(e.to_string()),
        };
        let _ = tx.send(message);
    });

    let mut code = ExitCode::FAILURE;
    for message in rx {
        match message {
            MergeProgressMessage::Progress(progress) => {
                println!(
                    "{}/{} images ({:.0}%)",
                    progress.value,
                    progress.total,
                    progress.fraction() * 100.0
                );
            }
            MergeProgressMessage::Complete(summary) => {
                print_summary("Merge complete", &summary);
                code = ExitCode::SUCCESS;
            }
            MergeProgressMessage::Cancelled(summary) => {
                print_summary("Merge was cancelled", &summary);
                warn!("Output directory is partially populated");
            }
            MergeProgressMessage::Error(message) => {
                error!("Merge failed: {}", message);
            }
        }
    }

    if worker.join().is_err() {
        error!("Merge worker thread panicked");
        return Ok(ExitCode::FAILURE);
    }
    Ok(code)
}

fn print_summary(title: &str, summary: &MergeSummary) {
    println!("{}:", title);
    println!("  processed            {}", summary.processed);
    println!("  written              {}", summary.written);
    println!("  skipped (unselected) {}", summary.skipped_unselected);
    println!("  skipped (empty)      {}", summary.skipped_empty);
    println!("  skipped (collision)  {}", summary.skipped_collisions);
    println!("  skipped (invalid)    {}", summary.skipped_invalid);
    println!("  renamed              {}", summary.renamed);
    println!(
        "  linked/copied/kept   {}/{}/{}",
        summary.hardlinked, summary.copied, summary.already_present
    );
}

/// Typing `q` and Enter on an interactive terminal cancels the run.
fn watch_stdin_for_cancel(cancel: CancelToken) {
    if !io::stdin().is_terminal() {
        return;
    }
    println!("Type 'q' and press Enter to cancel");
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    info!("User requested merge cancellation");
                    cancel.cancel();
                    return;
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    });
}
