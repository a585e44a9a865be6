use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::EngineError;

/// Layout of a circuit's public inputs and where its commitment sits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitLayout {
    /// Canonical circuit ID, e.g. `geo_point`.
    pub id: String,
    /// Number of 32-byte public input fields prefixed to every proof.
    pub public_inputs: usize,
    /// Index of the commitment field among the public inputs.
    pub commitment_index: usize,
}

impl CircuitLayout {
    pub fn new(id: &str, public_inputs: usize, commitment_index: usize) -> Self {
        Self {
            id: id.to_string(),
            public_inputs,
            commitment_index,
        }
    }

    /// Byte length of the public input prefix.
    pub fn public_inputs_size(&self) -> usize {
        self.public_inputs * 32
    }

    /// `<dir>/<id with dashes>/target/<id>.json`, the nargo output layout.
    fn artifact_path(&self, base: &Path) -> PathBuf {
        base.join(self.id.replace('_', "-"))
            .join("target")
            .join(format!("{}.json", self.id))
    }
}

/// Compiled bytecode and verification key for a single circuit.
#[derive(Clone, Debug)]
pub struct CircuitData {
    pub bytecode: String,
    pub vk: Vec<u8>,
    pub layout: CircuitLayout,
}

/// Registry of loaded circuits, keyed by canonical circuit ID.
pub struct CircuitRegistry {
    circuits: HashMap<String, CircuitData>,
}

/// Extract the `bytecode` field of a compiled Noir circuit JSON file.
fn load_bytecode_from_json(path: &Path) -> Result<String, EngineError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        EngineError::new(format!(
            "Failed to read circuit JSON at {}: {}",
            path.display(),
            e
        ))
    })?;
    let json: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
        EngineError::new(format!(
            "Failed to parse circuit JSON at {}: {}",
            path.display(),
            e
        ))
    })?;
    json["bytecode"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            EngineError::new(format!(
                "No 'bytecode' field in circuit JSON at {}",
                path.display()
            ))
        })
}

fn validate_layout(layout: &CircuitLayout) -> Result<(), EngineError> {
    if layout.commitment_index >= layout.public_inputs {
        return Err(EngineError::new(format!(
            "Commitment index {} out of range for circuit {} with {} public inputs",
            layout.commitment_index, layout.id, layout.public_inputs
        )));
    }
    Ok(())
}

impl CircuitRegistry {
    /// Load the given circuits from `circuits_dir`.
    ///
    /// Circuits whose artifact is missing are skipped with a warning. For each
    /// one found, the SRS is set up (downloaded if needed) and the UltraHonk
    /// Keccak verification key is generated.
    pub fn new(circuits_dir: &str, layouts: &[CircuitLayout]) -> Result<Arc<Self>, EngineError> {
        use noir_rs::barretenberg::srs::setup_srs_from_bytecode;
        use noir_rs::barretenberg::verify::get_ultra_honk_keccak_verification_key;

        let base = PathBuf::from(circuits_dir);
        let mut circuits = HashMap::new();

        for layout in layouts {
            validate_layout(layout)?;

            let json_path = layout.artifact_path(&base);
            if !json_path.exists() {
                tracing::warn!(
                    "Circuit JSON not found for {}: {}, skipping",
                    layout.id,
                    json_path.display()
                );
                continue;
            }

            tracing::info!("Loading circuit: {} from {}", layout.id, json_path.display());
            let bytecode = load_bytecode_from_json(&json_path)?;

            tracing::info!("Setting up SRS for {}", layout.id);
            setup_srs_from_bytecode(bytecode.as_str(), None, false).map_err(|e| {
                EngineError::new(format!("SRS setup failed for {}: {}", layout.id, e))
            })?;

            tracing::info!("Generating VK for {}", layout.id);
            let vk = get_ultra_honk_keccak_verification_key(bytecode.as_str(), false, false)
                .map_err(|e| {
                    EngineError::new(format!("VK generation failed for {}: {}", layout.id, e))
                })?;

            tracing::info!(
                "Circuit {} loaded: bytecode={} chars, vk={} bytes",
                layout.id,
                bytecode.len(),
                vk.len()
            );

            circuits.insert(
                layout.id.clone(),
                CircuitData {
                    bytecode,
                    vk,
                    layout: layout.clone(),
                },
            );
        }

        tracing::info!("Circuit registry initialized: {} circuits loaded", circuits.len());

        Ok(Arc::new(Self { circuits }))
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            circuits: HashMap::new(),
        })
    }

    /// A registry with fake bytecode and keys, for tests that never reach
    /// barretenberg.
    #[cfg(test)]
    pub fn mock() -> Arc<Self> {
        let mut circuits = HashMap::new();
        circuits.insert(
            "geo_point".to_string(),
            CircuitData {
                bytecode: "mock_bytecode_point".to_string(),
                vk: vec![1, 2, 3, 4],
                layout: CircuitLayout::new("geo_point", 2, 1),
            },
        );
        circuits.insert(
            "grid_cell".to_string(),
            CircuitData {
                bytecode: "mock_bytecode_cell".to_string(),
                vk: vec![5, 6, 7, 8],
                layout: CircuitLayout::new("grid_cell", 3, 0),
            },
        );
        Arc::new(Self { circuits })
    }

    pub fn get(&self, circuit_id: &str) -> Result<&CircuitData, EngineError> {
        self.circuits
            .get(circuit_id)
            .ok_or_else(|| EngineError::new(format!("Circuit not found: {}", circuit_id)))
    }

    pub fn ids(&self) -> Vec<String> {
        self.circuits.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }
}
