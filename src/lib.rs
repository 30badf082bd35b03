// KratOs Engine - Exécution de transactions sur un journal de mises à jour
// Principle: state is never stored, only the updates that produced it

pub mod code;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod execution;
pub mod node;
pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;

pub use code::{CodeRegistry, JarManifest};
pub use config::{ConsensusConfig, EngineConfig};
pub use node::{CodeExecutionException, ContractOutcome, Node, TransactionError};
