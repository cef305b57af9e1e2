//! Debounced validation pipeline:
//! `on_input → debounce → normalize → (if changed) → delay → remote check`.
//!
//! Each input gets its own cancellation token. A newer input cancels the
//! previous request, and publishing happens under the same lock that swaps
//! tokens, so a stale lookup can never overwrite newer state.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Availability, SubdomainCandidate, SubdomainValidator};
use crate::config::SubdomainConfig;

pub struct SubdomainPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    validator: Arc<SubdomainValidator>,
    config: SubdomainConfig,
    tx: watch::Sender<SubdomainCandidate>,
    current: Mutex<CancellationToken>,
}

impl Inner {
    /// Publish `candidate` unless `token` has been superseded.
    fn publish(&self, token: &CancellationToken, candidate: SubdomainCandidate) -> bool {
        let _guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() {
            return false;
        }
        self.tx.send_replace(candidate);
        true
    }
}

impl SubdomainPipeline {
    pub fn new(validator: Arc<SubdomainValidator>, config: SubdomainConfig) -> Self {
        let (tx, _rx) = watch::channel(SubdomainCandidate::default());
        Self {
            inner: Arc::new(Inner {
                validator,
                config,
                tx,
                current: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Subscribe to published candidates.
    pub fn subscribe(&self) -> watch::Receiver<SubdomainCandidate> {
        self.inner.tx.subscribe()
    }

    /// Latest published candidate.
    pub fn current(&self) -> SubdomainCandidate {
        self.inner.tx.borrow().clone()
    }

    /// Feed a new raw input. Supersedes any in-flight request.
    pub fn on_input(&self, input: &str) -> tokio::task::JoinHandle<()> {
        let token = {
            let mut current = self.inner.current.lock().unwrap_or_else(|e| e.into_inner());
            current.cancel();
            let token = CancellationToken::new();
            *current = token.clone();
            token
        };

        let inner = Arc::clone(&self.inner);
        let input = input.to_string();
        tokio::spawn(async move { run_request(inner, token, input).await })
    }

    /// Publish a candidate that was checked outside the pipeline, superseding
    /// any in-flight request.
    pub fn record(&self, candidate: SubdomainCandidate) {
        let mut current = self.inner.current.lock().unwrap_or_else(|e| e.into_inner());
        current.cancel();
        *current = CancellationToken::new();
        self.inner.tx.send_replace(candidate);
    }

    /// Cancel whatever is in flight without publishing anything.
    pub fn cancel(&self) {
        self.inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}

impl Drop for SubdomainPipeline {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_request(inner: Arc<Inner>, token: CancellationToken, input: String) {
    if input.trim().is_empty() {
        inner.publish(&token, SubdomainCandidate::default());
        return;
    }

    tokio::select! {
        _ = token.cancelled() => {
            debug!("Subdomain input superseded during debounce");
            return;
        }
        _ = tokio::time::sleep(inner.config.debounce) => {}
    }

    let previous = inner.tx.borrow().clone();
    let evaluation = inner.validator.evaluate(&input, &previous);

    let unchanged = evaluation.needs_check
        && evaluation.candidate.normalized == previous.normalized
        && matches!(
            previous.availability,
            Availability::Available | Availability::Unavailable
        );
    if unchanged {
        inner.publish(
            &token,
            SubdomainCandidate {
                raw_input: input,
                ..previous
            },
        );
        return;
    }

    if !inner.publish(&token, evaluation.candidate.clone()) || !evaluation.needs_check {
        return;
    }

    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(inner.config.check_delay) => {}
    }

    let subdomain = evaluation.candidate.normalized.clone();
    let checked = tokio::select! {
        _ = token.cancelled() => {
            debug!(subdomain = %subdomain, "Availability check cancelled");
            return;
        }
        checked = inner.validator.check_availability(evaluation.candidate) => checked,
    };
    inner.publish(&token, checked);
}
