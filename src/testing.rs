//! Instrumented engine doubles for unit tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::engine::{CircuitTransform, EngineError, ProofHandle};
use crate::types::SerializedProof;

static NEXT_NONCE: AtomicU64 = AtomicU64::new(1);

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call from every test.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proofport_claims=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Counts engine verifications of a proof and all of its clones.
#[derive(Debug, Default)]
pub(crate) struct EngineCalls {
    verify: AtomicUsize,
}

impl EngineCalls {
    pub(crate) fn verifications(&self) -> usize {
        self.verify.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MockProofJson {
    circuit: String,
    commitment: Commitment,
    accepted: bool,
    nonce: u64,
}

/// A proof whose validity and public output are fixed at construction.
#[derive(Debug, Clone)]
pub(crate) struct MockProof {
    circuit: String,
    commitment: Commitment,
    accepted: bool,
    readable: bool,
    rejected_attempts: usize,
    nonce: u64,
    delay: Option<Duration>,
    calls: Arc<EngineCalls>,
}

impl MockProof {
    fn build(circuit: &str, commitment: Commitment, accepted: bool) -> Self {
        Self {
            circuit: circuit.to_string(),
            commitment,
            accepted,
            readable: true,
            rejected_attempts: 0,
            nonce: NEXT_NONCE.fetch_add(1, Ordering::Relaxed),
            delay: None,
            calls: Arc::new(EngineCalls::default()),
        }
    }

    /// A proof the engine accepts, attesting to `commitment`.
    pub(crate) fn valid(commitment: Commitment) -> Self {
        Self::build("geo_point", commitment, true)
    }

    /// A proof the engine rejects, whatever it embeds.
    pub(crate) fn invalid(commitment: Commitment) -> Self {
        Self::build("geo_point", commitment, false)
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The first `attempts` engine checks fail; later ones follow `accepted`.
    pub(crate) fn rejecting_first(mut self, attempts: usize) -> Self {
        self.rejected_attempts = attempts;
        self
    }

    pub(crate) fn without_public_output(mut self) -> Self {
        self.readable = false;
        self
    }

    pub(crate) fn circuit(&self) -> &str {
        &self.circuit
    }

    pub(crate) fn calls(&self) -> Arc<EngineCalls> {
        self.calls.clone()
    }
}

#[async_trait]
impl ProofHandle for MockProof {
    async fn verify(&self) -> Result<(), EngineError> {
        let attempt = self.calls.verify.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.accepted && attempt >= self.rejected_attempts {
            Ok(())
        } else {
            Err(EngineError::new(format!(
                "Proof rejected by circuit {}",
                self.circuit
            )))
        }
    }

    fn public_output(&self) -> Result<Commitment, EngineError> {
        if self.readable {
            Ok(self.commitment)
        } else {
            Err(EngineError::new("public output truncated"))
        }
    }

    fn to_json(&self) -> Result<SerializedProof, EngineError> {
        let json = MockProofJson {
            circuit: self.circuit.clone(),
            commitment: self.commitment,
            accepted: self.accepted,
            nonce: self.nonce,
        };
        serde_json::to_value(json)
            .map(SerializedProof::new)
            .map_err(|e| EngineError::new(e.to_string()))
    }

    fn from_json(json: &SerializedProof) -> Result<Self, EngineError> {
        let parsed: MockProofJson = serde_json::from_value(json.as_value().clone())
            .map_err(|e| EngineError::new(e.to_string()))?;
        Ok(Self {
            circuit: parsed.circuit,
            commitment: parsed.commitment,
            accepted: parsed.accepted,
            readable: true,
            rejected_attempts: 0,
            nonce: parsed.nonce,
            delay: None,
            calls: Arc::new(EngineCalls::default()),
        })
    }
}

/// A transformation that emits a valid proof attesting to a fixed commitment.
pub(crate) struct MockTransform {
    circuit: String,
    output: Commitment,
    failure: Option<String>,
    delay: Option<Duration>,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl MockTransform {
    pub(crate) fn new(circuit: &str, output: Commitment) -> Self {
        Self {
            circuit: circuit.to_string(),
            output,
            failure: None,
            delay: None,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(circuit: &str, reason: &str) -> Self {
        let mut transform = Self::new(circuit, Commitment::from_bytes([0; 32]));
        transform.failure = Some(reason.to_string());
        transform
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Transformations started.
    pub(crate) fn calls(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Transformations that ran to completion.
    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CircuitTransform<MockProof> for MockTransform {
    type Output = MockProof;

    fn circuit_id(&self) -> &str {
        &self.circuit
    }

    async fn transform(&self, _source: &MockProof) -> Result<MockProof, EngineError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(EngineError::new(reason.clone()));
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(MockProof::build(&self.circuit, self.output, true))
    }
}
