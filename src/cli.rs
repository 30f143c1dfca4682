use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::info;

use anomflow::config::Config;
use anomflow::engine::{capture, Engine, FileSource, LiveSource, PacketSource};
use anomflow::model::ArtifactMeta;

#[derive(Parser)]
#[command(name = "anomflow")]
#[command(author, version, about = "live IP traffic anomaly detector")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture and classify live traffic
    Run {
        /// Interface to capture on
        #[arg(short, long)]
        interface: Option<String>,

        /// BPF filter override
        #[arg(short, long)]
        filter: Option<String>,

        /// Replay a pcap file instead of capturing live
        #[arg(short, long)]
        pcap: Option<PathBuf>,

        /// Emit records as JSON lines
        #[arg(short, long)]
        json: bool,
    },

    /// List capture-capable interfaces
    Interfaces,

    /// Show model artifact metadata
    ModelInfo,

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Run {
            interface,
            filter,
            pcap,
            json,
        } => cmd_run(config, interface, filter, pcap, json).await,
        Commands::Interfaces => cmd_interfaces(),
        Commands::ModelInfo => cmd_model_info(config),
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

async fn cmd_run(
    mut config: Config,
    interface: Option<String>,
    filter: Option<String>,
    pcap: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    if let Some(iface) = interface {
        config.capture.interface = Some(iface);
    }
    if let Some(filter) = filter {
        config.capture.filter = filter;
    }

    let engine = Engine::new(&config).context("Failed to initialize engine")?;
    let stats = engine.stats_handle();
    let running = engine.running_handle();

    let source: Box<dyn PacketSource> = match &pcap {
        Some(path) => {
            let path = path.to_str().context("pcap path is not valid UTF-8")?;
            Box::new(FileSource::open(path, &config.capture.filter)?)
        }
        None => Box::new(LiveSource::open(&config.capture)?),
    };

    let (tx, rx) = crossbeam_channel::bounded(config.capture.buffer_size);

    let mut capture_task = tokio::task::spawn_blocking(move || engine.run(source, tx));

    let printer = tokio::task::spawn_blocking(move || {
        for record in rx.iter() {
            if json {
                if let Ok(line) = serde_json::to_string(&record) {
                    println!("{}", line);
                }
            } else {
                println!(
                    "#{:<6} {:>12.6}  {} -> {}  {:<4} {:>5} bytes  {}  {}",
                    record.seq,
                    record.timestamp,
                    record.src_ip,
                    record.dst_ip,
                    record.protocol,
                    record.length,
                    record.info,
                    record.classification,
                );
            }
        }
    });

    let reporter_stats = stats.clone();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.tick().await;
        loop {
            interval.tick().await;
            let snapshot = reporter_stats.read().clone();
            info!(
                "processed={} dropped={} normal={} anomalous={} model={} heuristic={} flows={} evicted={}",
                snapshot.packets_processed,
                snapshot.packets_dropped,
                snapshot.normal,
                snapshot.anomalous,
                snapshot.model_decisions,
                snapshot.heuristic_decisions,
                snapshot.flows_active,
                snapshot.flows_evicted,
            );
        }
    });

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    tokio::select! {
        result = &mut capture_task => {
            result??;
        }
        _ = shutdown_signal => {
            println!("\nShutting down...");
            running.store(false, Ordering::SeqCst);
            capture_task.await??;
        }
    }

    reporter.abort();
    printer.await?;

    let snapshot = stats.read().clone();
    println!(
        "Done: {} packets ({} normal, {} anomalous), {} dropped, {} flows evicted",
        snapshot.packets_processed,
        snapshot.normal,
        snapshot.anomalous,
        snapshot.packets_dropped,
        snapshot.flows_evicted,
    );

    Ok(())
}

fn cmd_interfaces() -> Result<()> {
    let interfaces = capture::list_interfaces()?;
    if interfaces.is_empty() {
        println!("No capture-capable interfaces found");
    } else {
        for name in interfaces {
            println!("{}", name);
        }
    }
    Ok(())
}

fn cmd_model_info(config: Config) -> Result<()> {
    let model_meta = ArtifactMeta::read_for(&config.model.model_path)
        .context("Cannot read model artifact metadata")?;
    println!("Model:  {}", config.model.model_path.display());
    println!("  version:    {}", model_meta.version);
    println!("  saved at:   {}", model_meta.saved_at);
    println!("  clusters:   {}", model_meta.n_clusters);
    println!("  features:   {}", model_meta.n_features);

    let scaler_meta = ArtifactMeta::read_for(&config.model.scaler_path)
        .context("Cannot read scaler artifact metadata")?;
    println!("Scaler: {}", config.model.scaler_path.display());
    println!("  version:    {}", scaler_meta.version);
    println!("  saved at:   {}", scaler_meta.saved_at);
    println!("  features:   {}", scaler_meta.n_features);

    let mut labels: Vec<_> = config.model.cluster_labels.iter().collect();
    labels.sort_by(|a, b| a.0.cmp(b.0));
    println!("Cluster labels:");
    for (cluster, label) in labels {
        println!("  C{} -> {}", cluster, label);
    }

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();
    let content = toml::to_string_pretty(&config)?;

    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}
