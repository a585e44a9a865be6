//! Noir / barretenberg backend (UltraHonk, Keccak transcript).
//!
//! Proof bytes are `public_inputs ++ proof`, as barretenberg emits them. The
//! commitment is the public input field named by the circuit's
//! [`CircuitLayout`].

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use noir_rs::barretenberg::prove::prove_ultra_honk_keccak;
use noir_rs::barretenberg::verify::verify_ultra_honk_keccak;
use noir_rs::witness::from_vec_str_to_witness_map;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::circuit::{CircuitLayout, CircuitRegistry};
use crate::commitment::{Commitment, COMMITMENT_LEN};
use crate::engine::{CircuitTransform, EngineError, ProofHandle};
use crate::types::SerializedProof;

static BACKEND: OnceLock<Arc<NoirBackend>> = OnceLock::new();

/// Serializes every noir_rs call behind one tokio Mutex.
///
/// barretenberg has global mutable state behind its C++ FFI and is NOT
/// thread-safe, so there is exactly one backend per process.
pub struct NoirBackend {
    mutex: Mutex<()>,
    circuits: Arc<CircuitRegistry>,
}

impl NoirBackend {
    fn new(circuits: Arc<CircuitRegistry>) -> Self {
        Self {
            mutex: Mutex::new(()),
            circuits,
        }
    }

    /// Install the process-wide backend. Fails if one is installed already.
    pub fn install(circuits: Arc<CircuitRegistry>) -> Result<Arc<Self>, EngineError> {
        let backend = Arc::new(Self::new(circuits));
        BACKEND
            .set(backend.clone())
            .map_err(|_| EngineError::new("Noir backend already installed"))?;
        tracing::info!("Noir backend installed: {} circuits", backend.circuits.len());
        Ok(backend)
    }

    pub fn global() -> Result<Arc<Self>, EngineError> {
        BACKEND
            .get()
            .cloned()
            .ok_or_else(|| EngineError::new("Noir backend not installed"))
    }

    pub fn circuits(&self) -> &Arc<CircuitRegistry> {
        &self.circuits
    }

    /// Prove `circuit_id` with decimal (or `0x` hex) field inputs.
    pub async fn prove(&self, circuit_id: &str, inputs: Vec<String>) -> Result<Vec<u8>, EngineError> {
        let circuit = self.circuits.get(circuit_id)?;
        let bytecode = circuit.bytecode.clone();
        let vk = circuit.vk.clone();
        let public_inputs_size = circuit.layout.public_inputs_size();

        let _guard = self.mutex.lock().await;

        tracing::info!(
            "Generating proof for circuit={} inputs_len={}",
            circuit_id,
            inputs.len()
        );

        let input_refs: Vec<&str> = inputs.iter().map(|s| s.as_str()).collect();
        let witness = from_vec_str_to_witness_map(input_refs)
            .map_err(|e| EngineError::new(format!("Witness generation failed: {}", e)))?;

        // disable_zk = false, low_memory_mode = false
        let proof_bytes = prove_ultra_honk_keccak(bytecode.as_str(), witness, vk, false, false)
            .map_err(|e| EngineError::new(format!("Proof generation failed: {}", e)))?;

        if proof_bytes.len() <= public_inputs_size {
            return Err(EngineError::new(format!(
                "Proof output too small: {} bytes (expected > {})",
                proof_bytes.len(),
                public_inputs_size
            )));
        }

        tracing::info!(
            "Proof generated for circuit={}: {} bytes total",
            circuit_id,
            proof_bytes.len()
        );
        Ok(proof_bytes)
    }

    /// Verify `public_inputs ++ proof` bytes against the circuit's key.
    pub async fn verify(&self, circuit_id: &str, proof: Vec<u8>) -> Result<bool, EngineError> {
        let vk = self.circuits.get(circuit_id)?.vk.clone();

        let _guard = self.mutex.lock().await;

        tracing::info!(
            "Verifying proof for circuit={} proof_len={}",
            circuit_id,
            proof.len()
        );

        let valid = verify_ultra_honk_keccak(proof, vk, false)
            .map_err(|e| EngineError::new(format!("Verification failed: {}", e)))?;

        tracing::info!("Verification result for circuit={}: {}", circuit_id, valid);
        Ok(valid)
    }
}

/// The `index`-th 32-byte public input field of `bytes`.
fn public_field(bytes: &[u8], layout: &CircuitLayout, index: usize) -> Result<[u8; 32], EngineError> {
    if index >= layout.public_inputs {
        return Err(EngineError::new(format!(
            "Public input {} out of range for circuit {}",
            index, layout.id
        )));
    }
    if bytes.len() <= layout.public_inputs_size() {
        return Err(EngineError::new(format!(
            "Proof too small for circuit {}: {} bytes",
            layout.id,
            bytes.len()
        )));
    }
    let start = index * COMMITMENT_LEN;
    let mut field = [0u8; 32];
    field.copy_from_slice(&bytes[start..start + COMMITMENT_LEN]);
    Ok(field)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoirProofJson {
    circuit_id: String,
    proof_with_inputs: String,
}

/// A barretenberg proof for a registered circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoirProof {
    circuit_id: String,
    proof_with_inputs: Vec<u8>,
}

impl NoirProof {
    pub fn new(circuit_id: &str, proof_with_inputs: Vec<u8>) -> Self {
        Self {
            circuit_id: circuit_id.to_string(),
            proof_with_inputs,
        }
    }

    pub fn circuit_id(&self) -> &str {
        &self.circuit_id
    }

    pub fn proof_with_inputs(&self) -> &[u8] {
        &self.proof_with_inputs
    }

    /// All public input fields, in circuit order.
    pub fn public_inputs(&self, layout: &CircuitLayout) -> Result<Vec<[u8; 32]>, EngineError> {
        (0..layout.public_inputs)
            .map(|i| public_field(&self.proof_with_inputs, layout, i))
            .collect()
    }

    fn layout(&self) -> Result<CircuitLayout, EngineError> {
        let backend = NoirBackend::global()?;
        let layout = backend.circuits().get(&self.circuit_id)?.layout.clone();
        Ok(layout)
    }
}

#[async_trait]
impl ProofHandle for NoirProof {
    async fn verify(&self) -> Result<(), EngineError> {
        let backend = NoirBackend::global()?;
        let valid = backend
            .verify(&self.circuit_id, self.proof_with_inputs.clone())
            .await?;
        if valid {
            Ok(())
        } else {
            Err(EngineError::new(format!(
                "Proof rejected for circuit {}",
                self.circuit_id
            )))
        }
    }

    fn public_output(&self) -> Result<Commitment, EngineError> {
        let layout = self.layout()?;
        let field = public_field(&self.proof_with_inputs, &layout, layout.commitment_index)?;
        Ok(Commitment::from_bytes(field))
    }

    fn to_json(&self) -> Result<SerializedProof, EngineError> {
        let json = NoirProofJson {
            circuit_id: self.circuit_id.clone(),
            proof_with_inputs: hex::encode(&self.proof_with_inputs),
        };
        serde_json::to_value(json)
            .map(SerializedProof::new)
            .map_err(|e| EngineError::new(e.to_string()))
    }

    fn from_json(json: &SerializedProof) -> Result<Self, EngineError> {
        let parsed: NoirProofJson = serde_json::from_value(json.as_value().clone())
            .map_err(|e| EngineError::new(format!("Invalid Noir proof JSON: {}", e)))?;
        let bytes = hex::decode(&parsed.proof_with_inputs)
            .map_err(|e| EngineError::new(format!("Invalid proof hex: {}", e)))?;
        Ok(Self::new(&parsed.circuit_id, bytes))
    }
}

type WitnessBuilder = dyn Fn(&NoirProof) -> Result<Vec<String>, EngineError> + Send + Sync;

/// Proves a target circuit whose witness is built from a source proof.
pub struct NoirTransform {
    target: String,
    witness: Box<WitnessBuilder>,
}

impl NoirTransform {
    pub fn new<W>(target: &str, witness: W) -> Self
    where
        W: Fn(&NoirProof) -> Result<Vec<String>, EngineError> + Send + Sync + 'static,
    {
        Self {
            target: target.to_string(),
            witness: Box::new(witness),
        }
    }
}

#[async_trait]
impl CircuitTransform<NoirProof> for NoirTransform {
    type Output = NoirProof;

    fn circuit_id(&self) -> &str {
        &self.target
    }

    async fn transform(&self, source: &NoirProof) -> Result<NoirProof, EngineError> {
        let inputs = (self.witness)(source)?;
        let backend = NoirBackend::global()?;
        let bytes = backend.prove(&self.target, inputs).await?;
        Ok(NoirProof::new(&self.target, bytes))
    }
}
