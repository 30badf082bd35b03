// Configuration du moteur - Consensus et stockage
use crate::codec;
use crate::execution::gas::GasCostModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longueur maximale par défaut des messages d'erreur conservés
pub const DEFAULT_MAX_ERROR_LENGTH: usize = 300;

/// Parameters every node of a chain must agree on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Identifiant de la chaîne, vérifié dans chaque requête signée
    pub chain_id: String,

    /// Version of code verification and of the binary log encoding
    pub verification_version: u8,

    /// Gas maximum par transaction
    pub max_gas_per_transaction: u64,

    /// Prix minimum du gas accepté
    pub min_gas_price: u64,

    /// Longueur maximale des messages d'erreur dans les réponses
    pub max_error_length: usize,

    pub gas_cost_model: GasCostModel,
}

impl ConsensusConfig {
    pub fn mainnet() -> Self {
        Self {
            chain_id: "kratos".to_string(),
            verification_version: 0,
            max_gas_per_transaction: 1_000_000_000,
            min_gas_price: 1,
            max_error_length: DEFAULT_MAX_ERROR_LENGTH,
            gas_cost_model: GasCostModel::standard(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            chain_id: "kratos-testnet".to_string(),
            ..Self::mainnet()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        codec::check_version(self.verification_version)
            .map_err(|_| ConfigError::UnsupportedVerificationVersion(self.verification_version))?;

        if self.chain_id.is_empty() {
            return Err(ConfigError::Invalid("chain_id must not be empty".into()));
        }
        if self.max_gas_per_transaction == 0 {
            return Err(ConfigError::Invalid(
                "max_gas_per_transaction must be positive".into(),
            ));
        }
        if self.max_error_length == 0 {
            return Err(ConfigError::Invalid("max_error_length must be positive".into()));
        }

        Ok(())
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Configuration complète d'un moteur
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub consensus: ConsensusConfig,

    /// Répertoire RocksDB; `None` pour un journal en mémoire
    pub storage_path: Option<PathBuf>,

    /// Maintain a per-object history index to shorten backward walks
    pub index_history: bool,
}

impl EngineConfig {
    pub fn in_memory(consensus: ConsensusConfig) -> Self {
        Self {
            consensus,
            storage_path: None,
            index_history: true,
        }
    }

    /// Charge une configuration JSON
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.consensus.validate()?;

        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Unsupported verification version: {0}")]
    UnsupportedVerificationVersion(u8),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
