use std::sync::Arc;

use crate::config::{generation::ConfigStore, AppConfig};
use crate::services::{
    generator::{GenerateError, ImageGenerator, SdApiClient},
    prompt::PromptResolver,
    queue::{JobQueue, QueueError},
    reporter::StatusReporter,
    runner::{BatchRunner, RetryPolicy},
    storage::ImageStore,
    wildcards::{WildcardError, WildcardStore},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub configs: Arc<ConfigStore>,
    pub wildcards: Arc<WildcardStore>,
    pub resolver: Arc<PromptResolver>,
    pub reporter: StatusReporter,
    pub generator: Arc<dyn ImageGenerator>,
}

impl AppState {
    pub fn new(
        queue: JobQueue,
        configs: ConfigStore,
        wildcards: WildcardStore,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        let queue = Arc::new(queue);
        let wildcards = Arc::new(wildcards);
        Self {
            reporter: StatusReporter::new(queue.clone()),
            resolver: Arc::new(PromptResolver::new(wildcards.clone())),
            queue,
            configs: Arc::new(configs),
            wildcards,
            generator,
        }
    }

    /// Open the queue, wildcard store and API client described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, InitError> {
        tracing::info!(path = %config.queue_file.display(), "Opening job queue");
        let queue = JobQueue::open(&config.queue_file)?;

        tracing::info!(dir = %config.wildcards_dir.display(), "Loading wildcard rotation state");
        let wildcards = WildcardStore::open(
            &config.wildcards_dir,
            Some(config.wildcard_state_file.clone()),
        )?;

        tracing::info!(url = %config.sd_api_url, "Initializing generation API client");
        let generator = SdApiClient::new(&config.sd_api_url, config.request_timeout())?;

        let configs = ConfigStore::new(&config.config_dir);
        tracing::info!(dir = %configs.dir().display(), "Using generation configs");

        Ok(Self::new(
            queue,
            configs,
            wildcards,
            Arc::new(generator),
        ))
    }

    /// A runner sharing this state's queue, configs and wildcard rotation.
    pub fn batch_runner(&self, images: ImageStore, retry: RetryPolicy) -> BatchRunner {
        BatchRunner::new(
            self.queue.clone(),
            self.configs.clone(),
            self.resolver.clone(),
            self.generator.clone(),
            Arc::new(images),
            retry,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Failed to open job queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to load wildcards: {0}")]
    Wildcards(#[from] WildcardError),

    #[error("Failed to initialize generation API client: {0}")]
    Generator(#[from] GenerateError),
}
