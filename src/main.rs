use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use fleet_battery_health::analysis::BatteryAnalysis;
use fleet_battery_health::drain::{self, DrainPolicy};
use fleet_battery_health::report;
use fleet_battery_health::source::{FileSource, PgSampleSource};

#[derive(Parser)]
#[command(name = "fleet-battery-health")]
#[command(about = "Battery drain analysis for school device fleets", long_about = None)]
struct Cli {
    /// Read samples from a JSON or CSV export instead of Postgres
    #[arg(long, global = true)]
    input: Option<PathBuf>,
    /// Daily drain percentage above which a device counts as unhealthy
    #[arg(long, global = true, default_value_t = drain::UNHEALTHY_THRESHOLD)]
    threshold: f64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank schools by unhealthy device count
    Schools {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the drain estimate for a single device
    Device {
        #[arg(long)]
        serial: String,
    },
    /// Generate a markdown field-visit report
    Report {
        #[arg(long, default_value = "battery-report.md")]
        out: PathBuf,
    },
    /// Print school summaries as JSON
    Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut analysis = BatteryAnalysis::new(DrainPolicy::new(cli.threshold));

    let label = match &cli.input {
        Some(path) => {
            let source = FileSource::new(path);
            analysis.load(&source).await;
            source.path().display().to_string()
        }
        None => {
            let database_url = std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set when --input is not given")?;

            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await
                .context("failed to connect to Postgres")?;

            analysis.load(&PgSampleSource::new(pool)).await;
            "all schools".to_string()
        }
    };

    if let Some(message) = analysis.error.take() {
        anyhow::bail!(message);
    }

    match cli.command {
        Commands::Schools { limit } => {
            if analysis.summaries.is_empty() {
                println!("No battery samples found.");
                return Ok(());
            }

            let totals = analysis.totals();
            println!(
                "{} of {} devices unhealthy; {} schools to visit.",
                totals.total_unhealthy, totals.total_devices, totals.schools_to_visit
            );
            println!("Schools by unhealthy devices:");
            for summary in analysis.summaries.iter().take(limit) {
                println!(
                    "- School {}: {} unhealthy of {} devices",
                    summary.academy_id, summary.unhealthy_count, summary.total_devices
                );
            }
        }
        Commands::Device { serial } => {
            let stat = analysis
                .summaries
                .iter()
                .flat_map(|summary| summary.devices.iter())
                .find(|device| device.serial_number == serial)
                .with_context(|| format!("no samples found for device {serial}"))?;

            println!(
                "{} (school {}): {} across {} intervals, {}",
                stat.serial_number,
                stat.academy_id,
                report::format_drain(stat.average_daily_drain_pct),
                stat.intervals_considered,
                if stat.unhealthy { "unhealthy" } else { "healthy" }
            );
        }
        Commands::Report { out } => {
            let markdown = report::build_report(&label, &analysis.summaries, analysis.policy());
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export => {
            println!(
                "{}",
                report::build_json(&analysis.summaries, analysis.policy())?
            );
        }
    }

    Ok(())
}
