use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pulsewatch",
    about = "Self-hosted HTTP endpoint latency monitoring with anomaly detection",
    version,
    long_about = None
)]
struct Cli {
    /// Config file path (defaults apply when the file is missing)
    #[arg(long, global = true, default_value = "pulsewatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + probe loop)
    Serve {
        /// Bind address override
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one probe cycle immediately
    Ping,

    /// Print the current baseline statistics
    Stats {
        /// Trailing window in hours
        #[arg(long, default_value = "24")]
        window_hours: i64,
    },

    /// Forecast the next expected latency
    Predict {
        /// Trailing window in hours
        #[arg(long, default_value = "24")]
        window_hours: i64,

        /// Use the simple-moving-average method instead of the default chain
        #[arg(long)]
        sma: bool,

        /// Number of trailing values for --sma
        #[arg(long, default_value = "10")]
        period: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = pulsewatch::config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            tracing::info!(bind = %config.bind, "Starting pulsewatch daemon");
            pulsewatch::serve(config).await?;
        }
        Commands::Ping => {
            let app = pulsewatch::build(&config)?;
            let anomalies = app.monitor.run_cycle().await?;

            if let Some(sample) = app.store.latest_sample()? {
                println!("\npulsewatch probe: {}", config.monitor.url);
                println!("Latency:  {:.1} ms", sample.value_ms);
                println!("Status:   {}", sample.status_code);
                println!("Success:  {}", sample.success);
            }
            if anomalies.is_empty() {
                println!("Anomalies: none");
            } else {
                println!("Anomalies:");
                for a in anomalies {
                    println!(
                        " - [{}] {} (actual {:.1}, expected {:.1})",
                        a.severity.as_str(),
                        a.kind.as_str(),
                        a.actual_value,
                        a.expected_value
                    );
                }
            }
        }
        Commands::Stats { window_hours } => {
            let app = pulsewatch::build(&config)?;
            let snap = app.stats.snapshot(window_hours, chrono::Utc::now())?;

            println!("\nBaseline statistics ({}h window)", snap.window_hours);
            println!("{:<18} | Value", "Metric");
            println!("{:-<18}-|-{:-<20}", "", "");
            println!("{:<18} | {}", "samples", snap.sample_count);
            println!("{:<18} | {:.2} ms", "mean", snap.mean);
            println!("{:<18} | {:.2} ms", "std dev", snap.std_dev);
            println!("{:<18} | {:.2} ms", "min", snap.min);
            println!("{:<18} | {:.2} ms", "max", snap.max);
            println!(
                "{:<18} | [{:.2}, {:.2}] @ {:.0}%",
                "confidence band",
                snap.confidence_lower,
                snap.confidence_upper,
                snap.confidence_level * 100.0
            );
        }
        Commands::Predict {
            window_hours,
            sma,
            period,
        } => {
            let app = pulsewatch::build(&config)?;
            let prediction = if sma {
                app.forecast.predict_sma(window_hours, period)?
            } else {
                app.forecast.predict_next(window_hours).await?
            };

            match prediction {
                Some(p) => {
                    println!("\nForecast ({})", p.method);
                    println!("Predicted: {:.2} ms", p.predicted_value);
                    println!(
                        "Band:      [{:.2}, {:.2}] ms",
                        p.confidence_lower, p.confidence_upper
                    );
                }
                None => println!("Not enough samples in the window to forecast."),
            }
        }
    }

    Ok(())
}
