//! Test fixtures: scratch workspaces and a scripted image generator
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sd_batch::{
    app_state::AppState,
    config::generation::ConfigStore,
    services::{
        generator::{GenerateError, GeneratedImage, GenerationRequest, ImageGenerator},
        queue::JobQueue,
        runner::{BackoffKind, BatchRunner, RetryPolicy},
        storage::ImageStore,
        wildcards::WildcardStore,
    },
};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// "hello", base64-encoded; stands in for PNG bytes.
pub const FAKE_IMAGE: &str = "aGVsbG8=";

/// Literal prompt, no wildcards.
pub const PLAIN_CONFIG: &str = r#"{
    "model": {"checkpoint": "dreamshaper_8.safetensors"},
    "generation": {"steps": 20, "width": 512, "height": 768},
    "prompt": {"positive": "a lighthouse at dusk", "negative": "blurry"}
}"#;

/// Template with two wildcards.
pub const WILDCARD_CONFIG: &str = r#"{
    "generation": {"steps": 20},
    "prompt": {"positive": "portrait of a __animal__ in a __place__", "negative": "lowres"}
}"#;

/// Scripted failure kinds for [`ScriptedGenerator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    /// 503 from the server; retried.
    Transient,
    /// 400 content-policy style rejection; not retried.
    Rejected,
}

impl Failure {
    fn to_error(self) -> GenerateError {
        match self {
            Failure::Transient => GenerateError::Server {
                status: 503,
                body: "model loading".to_string(),
            },
            Failure::Rejected => GenerateError::Rejected {
                status: 400,
                body: "prompt rejected".to_string(),
            },
        }
    }
}

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// In-process stand-in for the remote API. Succeeds unless a failure is
/// scripted for the request's prompt, and records every call.
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<String, VecDeque<Failure>>>,
    always: Mutex<HashMap<String, Failure>>,
    calls: Mutex<Vec<GenerationRequest>>,
    on_call: Mutex<Option<CallHook>>,
    unhealthy: Mutex<bool>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next calls for `prompt` with `failures`, in order, then succeed.
    pub fn fail_prompt(&self, prompt: &str, failures: &[Failure]) {
        self.scripts
            .lock()
            .entry(prompt.to_string())
            .or_default()
            .extend(failures.iter().copied());
    }

    /// Fail every call for `prompt`.
    pub fn always_fail(&self, prompt: &str, failure: Failure) {
        self.always.lock().insert(prompt.to_string(), failure);
    }

    pub fn clear_failures(&self) {
        self.scripts.lock().clear();
        self.always.lock().clear();
    }

    /// Run `hook` with the 1-based call number before each call is answered.
    pub fn on_call(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_call.lock() = Some(Box::new(hook));
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        *self.unhealthy.lock() = unhealthy;
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.prompt.clone()).collect()
    }

    pub fn calls_for(&self, prompt: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.prompt == prompt).count()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerateError> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            calls.len()
        };
        if let Some(hook) = self.on_call.lock().as_ref() {
            hook(call);
        }

        if let Some(failure) = self.always.lock().get(&request.prompt) {
            return Err(failure.to_error());
        }
        let scripted = self
            .scripts
            .lock()
            .get_mut(&request.prompt)
            .and_then(VecDeque::pop_front);
        if let Some(failure) = scripted {
            return Err(failure.to_error());
        }

        Ok(GeneratedImage {
            image_base64: FAKE_IMAGE.to_string(),
            metadata: serde_json::json!({"seed": request.seed, "prompt": request.prompt}),
        })
    }

    async fn health_check(&self) -> Result<(), GenerateError> {
        if *self.unhealthy.lock() {
            return Err(GenerateError::Server {
                status: 503,
                body: "down".to_string(),
            });
        }
        Ok(())
    }
}

/// Scratch directory with `configs/`, `wildcards/`, `data/` and `output/`.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("configs")).unwrap();
        std::fs::create_dir_all(dir.path().join("wildcards")).unwrap();
        Self { dir }
    }

    pub fn with_config(self, name: &str, json: &str) -> Self {
        std::fs::write(self.configs_dir().join(format!("{name}.json")), json).unwrap();
        self
    }

    pub fn with_wildcard(self, name: &str, values: &[&str]) -> Self {
        let path = self.wildcards_dir().join(format!("{name}.txt"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, values.join("\n")).unwrap();
        self
    }

    pub fn remove_config(&self, name: &str) {
        std::fs::remove_file(self.configs_dir().join(format!("{name}.json"))).unwrap();
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.dir.path().join("configs")
    }

    pub fn wildcards_dir(&self) -> PathBuf {
        self.dir.path().join("wildcards")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.dir.path().join("data").join("queue.json")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    /// Application state over this workspace. Only one may be alive at a time
    /// because the queue file is locked.
    pub fn state(&self, generator: Arc<ScriptedGenerator>) -> AppState {
        let queue = JobQueue::open(self.queue_file()).unwrap();
        let wildcards = WildcardStore::open(
            self.wildcards_dir(),
            Some(self.dir.path().join("data").join("wildcard_state.json")),
        )
        .unwrap();
        AppState::new(queue, ConfigStore::new(self.configs_dir()), wildcards, generator)
    }

    pub fn runner(&self, state: &AppState, max_retries: u32) -> BatchRunner {
        state
            .batch_runner(ImageStore::new(self.output_dir()), fast_retry(max_retries))
            .with_poll_interval(Duration::from_millis(10))
    }
}

/// Retry policy with millisecond delays.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff: BackoffKind::Exponential,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

pub fn prompts(items: &[&str]) -> Vec<String> {
    items.iter().map(|p| p.to_string()).collect()
}
