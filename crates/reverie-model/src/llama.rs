//! llama.cpp server backend
//!
//! Loading spawns one local `llama-server` process for the requested
//! weights; the process owns the VRAM, so killing it is the unload. The
//! resident model generates through the server's HTTP completion endpoint.

use crate::backend::{ModelBackend, ResidentModel};
use crate::error::{ModelError, ModelResult};
use crate::types::{InferenceRequest, InferenceResult, ModelSpec};
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct LlamaServerBackend {
    server_bin: PathBuf,
    client: reqwest::Client,
    startup_timeout: Duration,
}

impl LlamaServerBackend {
    pub fn new(server_bin: impl Into<PathBuf>) -> Self {
        Self {
            server_bin: server_bin.into(),
            client: reqwest::Client::new(),
            startup_timeout: Duration::from_secs(180),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl ModelBackend for LlamaServerBackend {
    fn name(&self) -> &str {
        "llama-server"
    }

    async fn load(&self, spec: &ModelSpec) -> ModelResult<Arc<dyn ResidentModel>> {
        if !spec.path.exists() {
            return Err(ModelError::load_failed(
                spec.id.as_str(),
                format!("weights not found at {}", spec.path.display()),
            ));
        }

        let mut child = Command::new(&self.server_bin)
            .arg("-m")
            .arg(&spec.path)
            .arg("--port")
            .arg(spec.port.to_string())
            .arg("-c")
            .arg(spec.context_window.to_string())
            .arg("--host")
            .arg("127.0.0.1")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ModelError::load_failed(spec.id.as_str(), e.to_string()))?;

        let base = format!("http://127.0.0.1:{}", spec.port);
        let deadline = Instant::now() + self.startup_timeout;
        loop {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(ModelError::load_failed(
                    spec.id.as_str(),
                    format!("server exited during startup: {status}"),
                ));
            }
            match self.client.get(format!("{base}/health")).send().await {
                Ok(resp) if resp.status().is_success() => break,
                _ => {}
            }
            if Instant::now() >= deadline {
                let _ = child.start_kill();
                return Err(ModelError::load_failed(
                    spec.id.as_str(),
                    format!(
                        "server not healthy after {}s",
                        self.startup_timeout.as_secs()
                    ),
                ));
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }

        info!(model = %spec.id, port = spec.port, "llama-server ready");
        Ok(Arc::new(LlamaServerModel {
            child: Mutex::new(Some(child)),
            base,
            client: self.client.clone(),
            model: spec.id.to_string(),
        }))
    }
}

struct LlamaServerModel {
    child: Mutex<Option<Child>>,
    base: String,
    client: reqwest::Client,
    model: String,
}

#[async_trait::async_trait]
impl ResidentModel for LlamaServerModel {
    async fn generate(&self, request: &InferenceRequest) -> ModelResult<InferenceResult> {
        let body = json!({
            "prompt": request.prompt,
            "n_predict": request.max_tokens,
            "temperature": request.params.temperature,
            "top_p": request.params.top_p,
            "top_k": request.params.top_k,
            "stream": false,
            "cache_prompt": true,
        });

        let started = Instant::now();
        let resp = self
            .client
            .post(format!("{}/completion", self.base))
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Backend(format!("{}: {e}", self.model)))?;

        if !resp.status().is_success() {
            return Err(ModelError::Backend(format!(
                "{}: completion returned {}",
                self.model,
                resp.status()
            )));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ModelError::Backend(format!("{}: bad completion body: {e}", self.model)))?;

        let text = value["content"].as_str().unwrap_or_default().to_string();
        let generated_tokens = value["tokens_predicted"].as_u64().unwrap_or(0) as u32;
        let prompt_tokens = value["tokens_evaluated"].as_u64().unwrap_or(0) as u32;
        debug!(model = %self.model, generated_tokens, "completion finished");

        Ok(InferenceResult {
            text,
            latency_ms: started.elapsed().as_millis() as u64,
            prompt_tokens,
            generated_tokens,
        })
    }

    async fn shutdown(&self) {
        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            if let Err(e) = child.start_kill() {
                warn!(model = %self.model, "failed to kill llama-server: {e}");
            }
            let _ = child.wait().await;
            info!(model = %self.model, "llama-server stopped, VRAM reclaimed");
        }
    }
}
