//! Command-line entry point for the Ultra Ethernet fabric simulator.
//!
//! Loads a scenario (file or built-in baseline), applies CLI overrides,
//! runs the discrete-event simulation to completion, and prints the
//! resulting report as JSON or text.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use uet_common::config::ScenarioConfig;
use uet_sim::{Network, RunReport};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

/// Ultra Ethernet fabric simulator.
#[derive(Parser, Debug)]
#[command(name = "uet-sim", about = "Discrete-event simulator for an Ultra Ethernet-style fabric")]
struct Cli {
    /// Path to a scenario TOML file. Defaults to the built-in baseline scenario.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Overrides the scenario's RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides the scenario's simulated duration, in seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Output format for the run report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Output path. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut cfg = ScenarioConfig::load(cli.scenario.as_deref())?;
    if let Some(seed) = cli.seed {
        cfg.seed = seed;
    }
    if let Some(duration) = cli.duration {
        cfg.sim_duration_secs = duration;
    }
    cfg.validate()?;

    tracing::info!(
        seed = cfg.seed,
        num_hosts = cfg.num_hosts,
        sim_duration_secs = cfg.sim_duration_secs,
        "starting simulation run"
    );

    let report = Network::new(cfg).run();

    tracing::info!(final_time_secs = report.final_time_secs, "simulation run complete");

    let rendered = render(&report, cli.format)?;
    match cli.output {
        Some(path) => std::fs::write(&path, rendered)?,
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(rendered.as_bytes())?;
            handle.write_all(b"\n")?;
        }
    }

    Ok(())
}

fn render(report: &RunReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("seed: {}\n", report.seed));
    out.push_str(&format!("num_hosts: {}\n", report.num_hosts));
    out.push_str(&format!("sim_duration_secs: {}\n", report.sim_duration_secs));
    out.push_str(&format!("final_time_secs: {}\n", report.final_time_secs));
    out.push_str("counters:\n");
    for (name, value) in &report.final_snapshot.counters {
        out.push_str(&format!("  {name}: {value}\n"));
    }
    out.push_str("summaries:\n");
    for (name, s) in &report.final_snapshot.summaries {
        out.push_str(&format!(
            "  {name}: count={} min={:.6} max={:.6} mean={:.6}\n",
            s.count,
            s.min,
            s.max,
            s.mean()
        ));
    }
    out
}
