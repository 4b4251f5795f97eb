//! tempsweep - find and remove transient disk junk

use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tempsweep::cleaner::{
    browsers, locations, Category, ChannelSink, CleanupOutcome, Location, Options, ProgressEvent,
    ScanResult, ServiceCoordinator, Session,
};
use tempsweep::native;

#[derive(Parser)]
#[command(name = "tempsweep")]
#[command(author, version, about = "tempsweep - reclaim space from temp files and caches")]
struct Cli {
    /// Config file (defaults to <config dir>/tempsweep/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan and report what could be removed
    Scan {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Worker count (overrides probing and config)
        #[arg(long)]
        degree: Option<usize>,
    },
    /// Scan, then delete what was found
    Clean {
        /// Actually delete; without this the run is a dry run
        #[arg(short, long)]
        yes: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Worker count (overrides probing and config)
        #[arg(long)]
        degree: Option<usize>,
    },
    /// List the locations that would be scanned
    Locations {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    scan: &'a ScanResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a CleanupOutcome>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut options = Options::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Locations { json } => {
            let found = locations::discover(&options);
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                print_locations(&found);
            }
        }
        Commands::Scan { json, degree } => {
            if degree.is_some() {
                options.engine.degree = degree;
            }
            let session = Session::new(&options);
            install_ctrlc(&session)?;
            let found = locations::discover(&options);
            let result = run_scan(&session, &found, json)?;
            report(&result, None, json)?;
            warn_if_browsers_open(&options, &result);
        }
        Commands::Clean { yes, json, degree } => {
            if degree.is_some() {
                options.engine.degree = degree;
            }
            let session = Session::new(&options);
            install_ctrlc(&session)?;
            let found = locations::discover(&options);
            warn_if_update_active(&found);

            let mut result = run_scan(&session, &found, json)?;
            warn_if_browsers_open(&options, &result);
            if !yes || result.cancelled {
                report(&result, None, json)?;
                if !json && !result.cancelled {
                    println!("{}", "Dry run. Pass --yes to delete.".dimmed());
                }
                return Ok(());
            }

            let scanned = result.clone();
            let outcome =
                with_progress(json, "cleaning", |sink| session.clean(&mut result, sink))??;
            report(&scanned, Some(&outcome), json)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "tempsweep=debug" } else { "tempsweep=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn install_ctrlc(session: &Session) -> Result<()> {
    let controller = session.controller();
    ctrlc::set_handler(move || {
        // Idle, or a second Ctrl-C: exit like a plain SIGINT.
        if !controller.stop() {
            std::process::exit(130);
        }
    })
    .context("installing Ctrl-C handler")
}

fn warn_if_update_active(found: &[Location]) {
    let coordinator = ServiceCoordinator::new(native::service_control());
    let busy = found
        .iter()
        .filter(|l| l.category == Category::UpdateCache)
        .any(|l| coordinator.is_transfer_active(&l.root));
    if busy {
        eprintln!(
            "{}",
            "An update download looks active; its service will be paused while cleaning."
                .yellow()
        );
    }
}

fn warn_if_browsers_open(options: &Options, result: &ScanResult) {
    if !options.browser_cache || result.is_empty() {
        return;
    }
    let running = browsers::running_browsers();
    if running.is_empty() {
        return;
    }
    warn!(browsers = ?running, "browsers are running");
    eprintln!(
        "{} {}. Close them first or their caches will be recreated right away.",
        "Browsers are open:".yellow(),
        running.join(", ")
    );
}

fn run_scan(session: &Session, found: &[Location], json: bool) -> Result<ScanResult> {
    let result = with_progress(json, "scanning", |sink| session.scan(found, sink))??;
    Ok(result)
}

/// Run `op` with a channel sink, rendering its events on a progress bar.
fn with_progress<T, E>(
    quiet: bool,
    verb: &str,
    op: impl FnOnce(&ChannelSink) -> Result<T, E>,
) -> Result<Result<T, E>> {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>10.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(verb.to_string());

    let (sink, rx) = ChannelSink::new();
    let render = {
        let pb = pb.clone();
        thread::spawn(move || {
            for event in rx {
                match event {
                    ProgressEvent::Batch(batch) => pb.set_message(format!(
                        "{} files, {}",
                        batch.counts.total(),
                        format_size(batch.total_bytes, BINARY)
                    )),
                    ProgressEvent::LocationDone { done, total } => {
                        pb.set_length(total as u64);
                        pb.set_position(done as u64);
                    }
                    ProgressEvent::Delete(p) => {
                        pb.set_length(p.total_target as u64);
                        pb.set_position((p.deleted + p.skipped) as u64);
                        pb.set_message(format!("freed {}", format_size(p.freed_bytes, BINARY)));
                    }
                    ProgressEvent::Phase(phase) => pb.set_prefix(format!("{phase:?}")),
                }
            }
        })
    };

    let result = op(&sink);
    drop(sink);
    let _ = render.join();
    pb.finish_and_clear();
    Ok(result)
}

fn report(result: &ScanResult, outcome: Option<&CleanupOutcome>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&Report { scan: result, outcome })?);
        return Ok(());
    }

    match outcome {
        None => {
            println!("{}", "Scan results".bold());
            println!("  Temp & caches   {}", result.counts.plain);
            println!("  Browser caches  {}", result.counts.browser);
            println!("  Recycle bin     {}", result.counts.recycle);
            println!(
                "  Total           {} in {} items",
                format_size(result.total_bytes, BINARY).bold(),
                result.len()
            );
            if result.cancelled {
                println!("{}", "Scan stopped early; results are partial.".yellow());
            }
        }
        Some(outcome) => {
            let freed = format_size(outcome.freed_bytes, BINARY);
            if outcome.cancelled {
                println!("{} freed {}", "Stopped.".yellow().bold(), freed);
            } else {
                println!("{} freed {}", "Done.".green().bold(), freed);
            }
            println!("  Deleted  {}", outcome.deleted_count);
            if outcome.skipped_count > 0 {
                println!("  Skipped  {} (in use or access denied)", outcome.skipped_count);
            }
        }
    }
    Ok(())
}

fn print_locations(found: &[Location]) {
    for location in found {
        let depth = if location.recursive { "" } else { " (top level only)" };
        println!(
            "{:<28} {:<18} {}{}",
            location.label.bold(),
            location.category.to_string().cyan(),
            location.root.display(),
            depth.dimmed()
        );
    }
    println!("{} locations", found.len());
}
