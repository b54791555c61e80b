//! ============================================================================
//! Try-On Orchestrator - One AI try-on at a time
//! ============================================================================
//! Owns the pending/success/error lifecycle of a try-on:
//! - Rejects locally when either image is missing
//! - Refuses a second request while one is in flight
//! - Bounds every request with a timeout
//! - Always leaves the processing state, on success, failure or cancellation
//! ============================================================================

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::types::{ErrorBody, TryOnError, TryOnRequest, TryOnResult};

/// Observable lifecycle of the orchestrator
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TryOnState {
    #[default]
    Idle,
    Processing,
    Ready(TryOnResult),
    Failed(String),
}

impl TryOnState {
    pub fn is_processing(&self) -> bool {
        matches!(self, TryOnState::Processing)
    }

    pub fn result(&self) -> Option<&TryOnResult> {
        match self {
            TryOnState::Ready(result) => Some(result),
            _ => None,
        }
    }
}

/// Something that turns a try-on request into a result
#[async_trait]
pub trait TryOnBackend: Send + Sync {
    async fn submit(&self, request: &TryOnRequest) -> Result<TryOnResult, TryOnError>;
}

// ============================================================================
// HTTP Backend
// ============================================================================

/// Backend posting to the try-on proxy endpoint
pub struct HttpTryOnBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTryOnBackend {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.proxy_url.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TryOnBackend for HttpTryOnBackend {
    async fn submit(&self, request: &TryOnRequest) -> Result<TryOnResult, TryOnError> {
        debug!("Posting try-on request to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| TryOnError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TryOnError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str::<TryOnResult>(&body)
                .map_err(|e| TryOnError::InvalidResponse(e.to_string()));
        }

        let (message, details) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => (err.error, err.details),
            Err(_) => (format!("Request failed with status {}", status.as_u16()), None),
        };
        Err(TryOnError::Remote {
            status: status.as_u16(),
            message,
            details,
        })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs try-ons against a backend, at most one at a time
pub struct TryOnOrchestrator {
    backend: Arc<dyn TryOnBackend>,
    state: watch::Sender<TryOnState>,
    in_flight: AtomicBool,
    timeout: Duration,
}

/// Clears the in-flight flag however the request ends
struct InFlightGuard<'a> {
    orchestrator: &'a TryOnOrchestrator,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // A dropped future never reached a terminal state
        self.orchestrator.state.send_if_modified(|state| {
            if state.is_processing() {
                *state = TryOnState::Idle;
                true
            } else {
                false
            }
        });
        self.orchestrator.in_flight.store(false, Ordering::SeqCst);
    }
}

impl TryOnOrchestrator {
    pub fn new(backend: Arc<dyn TryOnBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            state: watch::Sender::new(TryOnState::Idle),
            in_flight: AtomicBool::new(false),
            timeout,
        }
    }

    /// Watch state transitions (for progress indicators)
    pub fn subscribe(&self) -> watch::Receiver<TryOnState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TryOnState {
        self.state.borrow().clone()
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one try-on, ending in `Ready` or `Failed`
    pub async fn perform_try_on(
        &self,
        person_image: &str,
        outfit_image: &str,
    ) -> Result<TryOnResult, TryOnError> {
        if person_image.is_empty() || outfit_image.is_empty() {
            return Err(TryOnError::MissingImages);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Try-on ignored, another request is pending");
            return Err(TryOnError::Busy);
        }
        let _guard = InFlightGuard { orchestrator: self };

        self.state.send_replace(TryOnState::Processing);
        info!(
            "Starting try-on (person {} chars, outfit {} chars)",
            person_image.len(),
            outfit_image.len()
        );

        let request = TryOnRequest::new(person_image, outfit_image);
        let outcome = match tokio::time::timeout(self.timeout, self.backend.submit(&request)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(TryOnError::Timeout(self.timeout.as_secs())),
        };

        match &outcome {
            Ok(result) => {
                info!("Virtual try-on complete");
                self.state.send_replace(TryOnState::Ready(result.clone()));
            }
            Err(e) => {
                warn!("Try-on failed: {}", e);
                self.state.send_replace(TryOnState::Failed(e.to_string()));
            }
        }

        outcome
    }

    /// Drop any result or error and return to idle; a pending request is left alone
    pub fn reset(&self) {
        self.state.send_if_modified(|state| match state {
            TryOnState::Ready(_) | TryOnState::Failed(_) => {
                *state = TryOnState::Idle;
                true
            }
            _ => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct TestBackend {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: Option<TryOnError>,
        delay: Option<Duration>,
    }

    impl TestBackend {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                fail: None,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl TryOnBackend for TestBackend {
        async fn submit(&self, _request: &TryOnRequest) -> Result<TryOnResult, TryOnError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail {
                Some(e) => Err(e.clone()),
                None => Ok(TryOnResult {
                    result_image: "data:image/png;base64,AAAA".to_string(),
                    message: "done".to_string(),
                }),
            }
        }
    }

    fn orchestrator(backend: Arc<TestBackend>) -> TryOnOrchestrator {
        TryOnOrchestrator::new(backend, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_success_reaches_ready() {
        let backend = Arc::new(TestBackend::ok());
        let orch = orchestrator(backend.clone());

        let result = orch.perform_try_on("data:a", "data:b").await.unwrap();
        assert_eq!(result.message, "done");
        assert!(!orch.is_processing());
        assert_eq!(orch.state(), TryOnState::Ready(result));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_failed() {
        let backend = Arc::new(TestBackend {
            fail: Some(TryOnError::Remote {
                status: 429,
                message: crate::types::RATE_LIMIT_MESSAGE.to_string(),
                details: None,
            }),
            ..TestBackend::ok()
        });
        let orch = orchestrator(backend);

        let err = orch.perform_try_on("data:a", "data:b").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!orch.is_processing());
        assert_eq!(
            orch.state(),
            TryOnState::Failed(crate::types::RATE_LIMIT_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_images_rejected_locally() {
        let backend = Arc::new(TestBackend::ok());
        let orch = orchestrator(backend.clone());

        assert_eq!(
            orch.perform_try_on("", "data:b").await,
            Err(TryOnError::MissingImages)
        );
        assert_eq!(
            orch.perform_try_on("data:a", "").await,
            Err(TryOnError::MissingImages)
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orch.state(), TryOnState::Idle);
    }

    #[tokio::test]
    async fn test_second_call_while_pending_is_refused() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(TestBackend {
            gate: Some(gate.clone()),
            ..TestBackend::ok()
        });
        let orch = Arc::new(orchestrator(backend.clone()));

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.perform_try_on("data:a", "data:b").await })
        };

        let mut states = orch.subscribe();
        states.wait_for(TryOnState::is_processing).await.unwrap();

        assert_eq!(
            orch.perform_try_on("data:a", "data:b").await,
            Err(TryOnError::Busy)
        );

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(!orch.is_processing());
    }

    #[tokio::test]
    async fn test_timeout_clears_processing() {
        let backend = Arc::new(TestBackend {
            delay: Some(Duration::from_secs(60)),
            ..TestBackend::ok()
        });
        let orch = TryOnOrchestrator::new(backend, Duration::from_millis(20));

        let err = orch.perform_try_on("data:a", "data:b").await.unwrap_err();
        assert_eq!(err, TryOnError::Timeout(0));
        assert!(!orch.is_processing());
        assert!(matches!(orch.state(), TryOnState::Failed(_)));
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let orch = orchestrator(Arc::new(TestBackend::ok()));
        orch.perform_try_on("data:a", "data:b").await.unwrap();

        orch.reset();
        assert_eq!(orch.state(), TryOnState::Idle);
        orch.reset();
        assert_eq!(orch.state(), TryOnState::Idle);
    }

    #[tokio::test]
    async fn test_dropped_request_leaves_processing() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(TestBackend {
            gate: Some(gate),
            ..TestBackend::ok()
        });
        let orch = orchestrator(backend);

        let pending = orch.perform_try_on("data:a", "data:b");
        let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;

        assert!(!orch.is_processing());
        assert_eq!(orch.state(), TryOnState::Idle);
    }
}
