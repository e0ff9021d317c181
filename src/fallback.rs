//! Model fallback invoker.
//!
//! Defines the [`GenerateBackend`] trait and unified payload/error types so the
//! retry policy stays independent of any concrete API client, plus the
//! [`FallbackInvoker`] that tries candidate models in priority order until one
//! produces text.

use std::time::Duration;

use tracing::{debug, warn};

/// A binary attachment with its declared media type.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Opaque request content handed to a backend: a text prompt plus optional
/// binary attachments. The invoker never inspects it.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
}

impl Payload {
    /// Create a text-only payload.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach binary data with its media type.
    pub fn with_attachment(mut self, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.attachments.push(Attachment {
            mime_type: mime_type.into(),
            data,
        });
        self
    }
}

/// Per-candidate error taxonomy. Backends classify at their own boundary;
/// the invoker branches on variants, never on error strings.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// Rate/usage limit hit for this candidate.
    #[error("quota exhausted for {model}: {message}")]
    QuotaExhausted { model: String, message: String },

    /// The candidate model is not exposed to this caller's credentials.
    #[error("model {model} is not available: {message}")]
    ModelUnavailable { model: String, message: String },

    /// Any other API-level failure.
    #[error("API error from {model} (HTTP {status}): {message}")]
    Api {
        model: String,
        status: u16,
        message: String,
    },

    /// Transport failure (connect, timeout, body read).
    #[error("request to {model} failed")]
    Transport {
        model: String,
        #[source]
        source: reqwest::Error,
    },

    /// The call succeeded but the response carried no usable text.
    #[error("unusable response from {model}: {message}")]
    BadResponse { model: String, message: String },
}

/// Async boundary to the remote generation service.
#[async_trait::async_trait]
pub trait GenerateBackend: Send + Sync {
    async fn generate(&self, model: &str, payload: &Payload) -> Result<String, GenerateError>;
}

/// Classification of a total-failure outcome, for mapping to user guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    QuotaExhausted,
    ModelUnavailable,
    Other,
}

/// Total failure of a full candidate sweep, carrying the last seen cause.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("every candidate model hit its quota")]
    QuotaExhausted(#[source] GenerateError),

    #[error("no candidate model is available to this account")]
    ModelUnavailable(#[source] GenerateError),

    #[error(transparent)]
    Other(GenerateError),

    #[error("no candidates configured")]
    NoCandidates,
}

impl InvokeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::QuotaExhausted(_) => FailureKind::QuotaExhausted,
            Self::ModelUnavailable(_) => FailureKind::ModelUnavailable,
            Self::Other(_) | Self::NoCandidates => FailureKind::Other,
        }
    }
}

/// Backoff charged after a quota error at 0-based attempt `idx`:
/// 1, 2, 4 seconds, then capped at 8.
fn backoff_delay(idx: usize) -> Duration {
    Duration::from_secs(1u64 << idx.min(3))
}

/// Tries candidate models in priority order until one produces text.
///
/// The candidate list is fixed at construction and never mutated; no state
/// carries between separate `invoke` calls.
pub struct FallbackInvoker<B> {
    backend: B,
    candidates: Vec<String>,
}

impl<B: GenerateBackend> FallbackInvoker<B> {
    pub fn new(backend: B, candidates: Vec<String>) -> Self {
        Self {
            backend,
            candidates,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Run one full sweep over the candidate list.
    ///
    /// First success wins. A quota error sleeps before moving on; every other
    /// error moves on immediately. No error aborts the sweep early. After
    /// exhausting the list the last seen error decides the classification.
    pub async fn invoke(&self, payload: &Payload) -> Result<String, InvokeError> {
        let mut last_error: Option<GenerateError> = None;

        for (idx, candidate) in self.candidates.iter().enumerate() {
            debug!(model = %candidate, attempt = idx, "trying candidate model");

            match self.backend.generate(candidate, payload).await {
                Ok(text) => {
                    debug!(model = %candidate, "candidate succeeded");
                    return Ok(text);
                }
                Err(err @ GenerateError::QuotaExhausted { .. }) => {
                    let delay = backoff_delay(idx);
                    warn!(
                        model = %candidate,
                        backoff_secs = delay.as_secs(),
                        "quota exhausted, backing off before next candidate"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                }
                Err(err @ GenerateError::ModelUnavailable { .. }) => {
                    warn!(model = %candidate, "model unavailable, skipping");
                    last_error = Some(err);
                }
                Err(err) => {
                    warn!(model = %candidate, error = %err, "candidate failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        Err(match last_error {
            Some(err @ GenerateError::QuotaExhausted { .. }) => InvokeError::QuotaExhausted(err),
            Some(err @ GenerateError::ModelUnavailable { .. }) => InvokeError::ModelUnavailable(err),
            Some(err) => InvokeError::Other(err),
            None => InvokeError::NoCandidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed(&'static str),
        Quota,
        NotFound,
        Fault,
    }

    struct ScriptedBackend {
        behaviors: HashMap<&'static str, Behavior>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(script: &[(&'static str, Behavior)]) -> Self {
            Self {
                behaviors: script.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl GenerateBackend for ScriptedBackend {
        async fn generate(&self, model: &str, _payload: &Payload) -> Result<String, GenerateError> {
            self.calls.lock().unwrap().push(model.to_string());
            match self.behaviors.get(model) {
                Some(Behavior::Succeed(text)) => Ok((*text).to_string()),
                Some(Behavior::Quota) => Err(GenerateError::QuotaExhausted {
                    model: model.to_string(),
                    message: "rate limit exceeded".to_string(),
                }),
                Some(Behavior::NotFound) => Err(GenerateError::ModelUnavailable {
                    model: model.to_string(),
                    message: "model not found".to_string(),
                }),
                _ => Err(GenerateError::BadResponse {
                    model: model.to_string(),
                    message: "backend fault".to_string(),
                }),
            }
        }
    }

    fn invoker(
        script: &[(&'static str, Behavior)],
        candidates: &[&str],
    ) -> FallbackInvoker<ScriptedBackend> {
        FallbackInvoker::new(
            ScriptedBackend::new(script),
            candidates.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn backoff_doubles_then_caps_at_eight_seconds() {
        let secs: Vec<u64> = (0..6).map(|i| backoff_delay(i).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 8, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_wins_without_trying_later_candidates() {
        let inv = invoker(
            &[
                ("a", Behavior::Succeed("a-text")),
                ("b", Behavior::Succeed("b-text")),
            ],
            &["a", "b", "c"],
        );
        let start = Instant::now();

        let text = inv.invoke(&Payload::text("hi")).await.unwrap();

        assert_eq!(text, "a-text");
        assert_eq!(inv.backend().calls(), vec!["a"]);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_model_is_skipped_without_backoff() {
        let inv = invoker(
            &[("a", Behavior::NotFound), ("b", Behavior::Succeed("b-text"))],
            &["a", "b"],
        );
        let start = Instant::now();

        let text = inv.invoke(&Payload::text("hi")).await.unwrap();

        assert_eq!(text, "b-text");
        assert_eq!(inv.backend().calls(), vec!["a", "b"]);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_errors_back_off_exponentially() {
        let inv = invoker(
            &[
                ("a", Behavior::Quota),
                ("b", Behavior::Quota),
                ("c", Behavior::Succeed("c-text")),
            ],
            &["a", "b", "c"],
        );
        let start = Instant::now();

        let text = inv.invoke(&Payload::text("hi")).await.unwrap();

        assert_eq!(text, "c-text");
        // 1s after a, 2s after b
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn all_quota_failures_classify_as_quota_exhausted() {
        let inv = invoker(
            &[
                ("a", Behavior::Quota),
                ("b", Behavior::Quota),
                ("c", Behavior::Quota),
            ],
            &["a", "b", "c"],
        );

        let err = inv.invoke(&Payload::text("hi")).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::QuotaExhausted);
        assert_eq!(inv.backend().calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn all_unavailable_failures_classify_as_model_unavailable() {
        let inv = invoker(
            &[("a", Behavior::NotFound), ("b", Behavior::NotFound)],
            &["a", "b"],
        );

        let err = inv.invoke(&Payload::text("hi")).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::ModelUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn classification_follows_the_last_seen_error() {
        // Quota first, then unavailable: last seen decides.
        let inv = invoker(
            &[("a", Behavior::Quota), ("b", Behavior::NotFound)],
            &["a", "b"],
        );
        let err = inv.invoke(&Payload::text("hi")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ModelUnavailable);

        let inv = invoker(&[("a", Behavior::Quota), ("b", Behavior::Fault)], &["a", "b"]);
        let err = inv.invoke(&Payload::text("hi")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_candidate_list_fails_without_calls_or_sleeps() {
        let inv = invoker(&[], &[]);
        let start = Instant::now();

        let err = inv.invoke(&Payload::text("hi")).await.unwrap_err();

        assert!(matches!(err, InvokeError::NoCandidates));
        assert_eq!(err.kind(), FailureKind::Other);
        assert!(inv.backend().calls().is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_invocations_behave_identically() {
        let inv = invoker(
            &[("a", Behavior::NotFound), ("b", Behavior::Succeed("b-text"))],
            &["a", "b"],
        );
        let before: Vec<String> = inv.candidates().to_vec();

        let first = inv.invoke(&Payload::text("hi")).await.unwrap();
        let second = inv.invoke(&Payload::text("hi")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inv.candidates(), before.as_slice());
        assert_eq!(inv.backend().calls(), vec!["a", "b", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_then_not_found_then_success() {
        let inv = invoker(
            &[
                ("m1", Behavior::Quota),
                ("m2", Behavior::NotFound),
                ("m3", Behavior::Succeed("ok-text")),
            ],
            &["m1", "m2", "m3"],
        );
        let start = Instant::now();

        let text = inv.invoke(&Payload::text("hi")).await.unwrap();

        assert_eq!(text, "ok-text");
        assert_eq!(inv.backend().calls(), vec!["m1", "m2", "m3"]);
        // Exactly one 1s backoff, after m1 only.
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
