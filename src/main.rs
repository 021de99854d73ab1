//! CLI entry point for citegraph.

use std::process::ExitCode;

use anyhow::{Context, Result};
use citegraph_core::{Crawler, export};
use clap::Parser;
use clap::error::ErrorKind;
use tracing::{debug, error, info, warn};

mod cli;

use cli::Args;

/// Exit status for a run cut short by the global timeout.
const EXIT_INCOMPLETE: u8 = 2;

/// Exit status for configuration, seed, and export failures.
const EXIT_FATAL: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_FATAL),
            };
        }
    };

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_INCOMPLETE),
        Err(err) => {
            error!(error = %format!("{err:#}"), "run failed");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Crawls and exports. Returns whether the crawl completed.
async fn run(args: &Args) -> Result<bool> {
    let config = args.to_config();
    let output_dir = config.output_dir.clone();
    let write_metrics = config.write_metrics;

    info!(seed = %config.seed, depth = config.max_depth, sources = ?config.sources, "citegraph starting");
    if config.contact_email.is_none() {
        warn!("no contact address set (--email or OPENALEX_EMAIL); requests use the anonymous pool");
    }

    let crawler = Crawler::from_config(config).context("invalid configuration")?;
    let outcome = crawler
        .run()
        .await
        .context("stopped while seeding; no layer was reached")?;

    let stage = format!("after {} completed layer(s)", outcome.layers_completed);
    let graph_path = export::write_graph(&output_dir, &outcome)
        .with_context(|| format!("export failed {stage}"))?;
    if write_metrics {
        export::write_metrics(&output_dir, &crawler.metrics().report())
            .with_context(|| format!("metrics export failed {stage}"))?;
    }

    if outcome.complete {
        info!(layers = outcome.layers_completed, "crawl complete");
    } else {
        warn!(
            layers = outcome.layers_completed,
            reason = outcome.failure.as_deref().unwrap_or("unknown"),
            "crawl incomplete; partial graph written"
        );
    }
    println!("{}", graph_path.display());
    Ok(outcome.complete)
}
