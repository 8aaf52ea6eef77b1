use clap::Parser;
use sd_batch::{app_state::AppState, config::AppConfig, services::storage::ImageStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Headless batch worker: optionally queues a job, then drains the queue.
///
/// Uses the same environment configuration as the server. The queue file is
/// locked, so run this instead of the server, not beside it.
#[derive(Debug, Parser)]
#[command(name = "sd-batch-worker", version, about)]
struct Args {
    /// Queue a job for this generation config before processing
    #[arg(long)]
    config: Option<String>,

    /// Images per batch for the queued job
    #[arg(long, default_value_t = 1, requires = "config")]
    batch_size: u32,

    /// Number of batches for the queued job
    #[arg(long, default_value_t = 1, requires = "config")]
    num_batches: u32,

    /// Base seed for the queued job; image i uses seed + i
    #[arg(long, requires = "config", value_parser = clap::value_parser!(i64).range(0..=4_294_967_295))]
    seed: Option<i64>,

    /// Exit once no pending jobs remain instead of polling
    #[arg(long)]
    exit_when_idle: bool,
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();

    tracing::info!("Starting sd-batch worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let state = AppState::from_config(&config).expect("Failed to initialize worker state");

    if let Some(name) = &args.config {
        let generation = match state.configs.load(name) {
            Ok(generation) => generation,
            Err(e) => {
                tracing::error!(config = %name, error = %e, "Cannot queue job");
                std::process::exit(1);
            }
        };
        match state
            .queue
            .add_job(&generation, args.batch_size, args.num_batches, args.seed)
        {
            Ok(job) => tracing::info!(job_id = %job.id, total_images = job.total_images, "Job queued"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to queue job");
                std::process::exit(1);
            }
        }
    }

    let runner = state
        .batch_runner(ImageStore::new(&config.output_dir), config.retry_policy())
        .with_poll_interval(config.poll_interval());

    tracing::info!(queue = %state.queue.path().display(), "Draining job queue");

    if args.exit_when_idle {
        match runner.run_until_idle().await {
            Ok(processed) => {
                let stats = state.reporter.queue_stats();
                tracing::info!(
                    processed,
                    completed_images = stats.completed_images,
                    failed_images = stats.failed_images,
                    "Queue drained, exiting"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Worker stopped on queue error");
                std::process::exit(1);
            }
        }
        return;
    }

    tracing::info!("Worker ready, starting job processing loop");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });
    runner.run(shutdown_rx).await;
}
