//! Vigil Agent CLI
//!
//! Background desktop usage telemetry agent.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vigil_agent::{
    config::Config,
    dispatcher::HttpUploadClient,
    engine::Engine,
    probe::{NoopDisplayProbe, NoopIdleProbe, NoopWindowProbe, ProbeChain},
    screenshot::NoopCaptureProvider,
    stats::AgentStats,
    COLLECTION_DISCLOSURE, VERSION,
};

#[derive(Parser)]
#[command(name = "vigil-agent")]
#[command(author = "Vigil Labs")]
#[command(version = VERSION)]
#[command(about = "Background desktop usage telemetry agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start observing and delivering telemetry
    Start {
        /// Collector base URL (overrides the configured one)
        #[arg(long)]
        collector_url: Option<String>,

        /// Collector bearer token (overrides the configured one)
        #[arg(long)]
        token: Option<String>,

        /// Disable the screenshot scheduler for this run
        #[arg(long)]
        no_screenshots: bool,

        /// Flush interval in seconds (overrides the configured one)
        #[arg(long)]
        flush_interval: Option<u64>,
    },

    /// Pause collection
    Pause,

    /// Resume collection
    Resume,

    /// Show current collection status
    Status,

    /// Show configuration
    Config,

    /// Display the collection disclosure
    Disclosure,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            collector_url,
            token,
            no_screenshots,
            flush_interval,
        } => {
            cmd_start(collector_url, token, no_screenshots, flush_interval);
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Disclosure => {
            println!("{COLLECTION_DISCLOSURE}");
        }
    }
}

fn cmd_start(
    collector_url: Option<String>,
    token: Option<String>,
    no_screenshots: bool,
    flush_interval: Option<u64>,
) {
    init_tracing();

    println!("Vigil Agent v{VERSION}");
    println!();

    // Load or create configuration. The generated device id must survive
    // restarts, so a missing config file is written back immediately.
    let config_existed = Config::config_path().exists();
    let mut config = Config::load().unwrap_or_default();
    if !config_existed {
        if let Err(e) = config.save() {
            eprintln!("Warning: Could not persist initial config: {e}");
        }
    }

    if let Some(url) = collector_url {
        config.collector.base_url = url;
    }
    if let Some(token) = token {
        config.collector.token = token;
    }
    if no_screenshots {
        config.screenshot.enabled = false;
    }
    if let Some(secs) = flush_interval {
        config.buffer.flush_interval = Duration::from_secs(secs);
    }

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("Starting collection...");
    println!("  Device ID: {}", config.collector.device_id);
    println!("  Collector: {}", config.collector.base_url);
    println!("  Poll interval: {}s", config.poll_interval.as_secs());
    println!(
        "  Screenshots: {}",
        if config.screenshot.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Flush interval: {}s",
        config.buffer.flush_interval.as_secs()
    );

    // Upload client
    let upload = match HttpUploadClient::new(config.collector.clone()) {
        Ok(client) => {
            match client.check_health() {
                Ok(true) => println!("  Collector connection: OK"),
                Ok(false) => eprintln!("Warning: Collector health check failed"),
                Err(e) => eprintln!("Warning: Could not reach collector: {e}"),
            }
            Arc::new(client)
        }
        Err(e) => {
            eprintln!("Error creating upload client: {e}");
            std::process::exit(1);
        }
    };

    if config.paused {
        println!();
        println!("Collection is currently paused.");
        println!("Run `vigil-agent resume` to start collecting.");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = AgentStats::shared_with_persistence(config.data_path.join("stats.json"));

    // Window probe chain. Platform-specific strategies go ahead of the
    // noop terminator; the shipped binary runs headless.
    let mut chain = ProbeChain::new(Duration::from_millis(config.probe_deadline_ms));
    chain.push(Arc::new(NoopWindowProbe));

    let engine = Engine::new(
        config,
        chain,
        Arc::new(NoopIdleProbe),
        Arc::new(NoopDisplayProbe),
        Arc::new(NoopCaptureProvider),
        upload,
        Arc::clone(&stats),
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        let handler_token = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
            eprintln!("Error setting Ctrl+C handler: {e}");
            std::process::exit(1);
        }

        engine.start();

        // Poll the config file so `vigil-agent pause/resume` can control a
        // running agent from another process.
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Ok(current) = Config::load() {
                        engine.set_paused(current.paused);
                    }
                }
            }
        }

        println!();
        println!("Stopping collection...");
        engine.stop().await;
    });

    println!();
    println!("{}", stats.summary());
}

fn cmd_pause() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Collection paused. Use 'vigil-agent resume' to continue.");
}

fn cmd_resume() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Collection resumed.");
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Vigil Agent Status");
    println!("==================");
    println!();

    println!("Configuration:");
    println!("  Device ID: {}", config.collector.device_id);
    println!("  Collector: {}", config.collector.base_url);
    println!("  Poll interval: {}s", config.poll_interval.as_secs());
    println!(
        "  Screenshots: {}",
        if config.screenshot.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Screenshot cap: {}/hour",
        config.screenshot.max_per_hour
    );
    println!("  Buffer: batch {}, cap {}", config.buffer.batch_size, config.buffer.max_size);
    println!("  Paused: {}", config.paused);
    println!();

    // Load and show persisted stats if available
    let stats_path = config.data_path.join("stats.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(records) = stats.get("activity_records_emitted") {
                    println!("  Activity records emitted: {records}");
                }
                if let Some(shots) = stats.get("screenshots_captured") {
                    println!("  Screenshots captured: {shots}");
                }
                if let Some(sent) = stats.get("events_delivered") {
                    println!("  Events delivered: {sent}");
                }
                if let Some(evicted) = stats.get("events_evicted") {
                    println!("  Events evicted: {evicted}");
                }
                if let Some(failed) = stats.get("batches_failed") {
                    println!("  Batches failed: {failed}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Initialize structured logging from `RUST_LOG`, defaulting to info.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
