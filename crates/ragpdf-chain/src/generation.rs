//! Deadline enforcement around a [`Generator`].
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::Generator;
use ragpdf_core::types::GenerationParams;

/// Runs every call on a worker thread and gives up after `timeout`. An
/// expired worker is left to finish on its own; its result is discarded.
pub struct TimedGenerator {
    inner: Arc<dyn Generator>,
    timeout: Duration,
}

impl TimedGenerator {
    pub fn new(inner: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl Generator for TimedGenerator {
    fn model_id(&self) -> &str { self.inner.model_id() }

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_string();
        let params = *params;
        thread::Builder::new()
            .name("ragpdf-generate".into())
            .spawn(move || {
                let _ = tx.send(inner.generate(&prompt, &params));
            })
            .map_err(|e| Error::GenerationUnavailable(format!("spawning generation worker: {}", e)))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "generation deadline exceeded");
                Err(Error::GenerationTimeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::GenerationUnavailable("generation worker stopped without a result".into()))
            }
        }
    }
}
