// Node - Orchestrateur des transactions
//
// Features:
// - Initial transactions (kernel jar, gamete) before initialization
// - Signed, paid transactions: jar store, constructor and method calls
// - Classification: rejected, failed, exception or successful
// - add_* commits under a single lock, run_* never commits
// - Queries over the committed log
pub mod builders;

use crate::code::CodeRegistry;
use crate::config::{ConfigError, ConsensusConfig, EngineConfig};
use crate::crypto::SignatureVerifier;
use crate::codec;
use crate::execution::deserializer::{class_tag_in, DeserializationError};
use crate::execution::EngineFault;
use crate::storage::{ChainStore, MemoryStore, RocksStore, StoreError};
use crate::types::*;
use builders::Mode;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

// =============================================================================
// OUTCOMES
// =============================================================================

/// Transaction that did not complete normally
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransactionError {
    /// Refused before execution; nothing was committed
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Execution failed. Committed at `reference` (if added) with the
    /// caller's gas payment as only effect.
    #[error("Transaction failed: {cause}")]
    Failed {
        reference: Option<TransactionReference>,
        cause: FailureCause,
    },
}

impl From<StoreError> for TransactionError {
    fn from(error: StoreError) -> Self {
        TransactionError::Rejected(error.to_string())
    }
}

/// Checked exception escaping the called code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExecutionException {
    /// Position the exception was committed at, `None` for run variants
    pub reference: Option<TransactionReference>,
    pub class_name: String,
    pub message: String,
    pub call_site: String,
}

/// Result of contract code: a value, or a checked exception it was allowed
/// to throw
#[derive(Debug, Clone, PartialEq)]
pub enum ContractOutcome<T> {
    Returned(T),
    Threw(CodeExecutionException),
}

impl<T> ContractOutcome<T> {
    pub fn returned(self) -> Option<T> {
        match self {
            ContractOutcome::Returned(value) => Some(value),
            ContractOutcome::Threw(_) => None,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, ContractOutcome::Threw(_))
    }
}

// =============================================================================
// NODE
// =============================================================================

pub struct Node {
    store: Arc<dyn ChainStore>,
    config: ConsensusConfig,
    registry: Arc<CodeRegistry>,
    verifier: Arc<dyn SignatureVerifier>,
    commit_lock: Mutex<()>,
}

impl Node {
    pub fn new(
        store: Arc<dyn ChainStore>,
        config: ConsensusConfig,
        registry: Arc<CodeRegistry>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "Node ready on chain {} (verification version {})",
            config.chain_id, config.verification_version
        );
        Ok(Self {
            store,
            config,
            registry,
            verifier,
            commit_lock: Mutex::new(()),
        })
    }

    /// Node over the store described by `config`: RocksDB if a storage path
    /// is set, memory otherwise
    pub fn open(
        config: &EngineConfig,
        registry: Arc<CodeRegistry>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, ConfigError> {
        config.consensus.validate()?;
        let store: Arc<dyn ChainStore> = match &config.storage_path {
            Some(path) => Arc::new(
                RocksStore::open_with_index(
                    path,
                    config.consensus.verification_version,
                    config.index_history,
                )
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            None => Arc::new(MemoryStore::with_index(config.index_history)),
        };
        Self::new(store, config.consensus.clone(), registry, verifier)
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn ChainStore {
        self.store.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn commit(
        &self,
        request: TransactionRequest,
        response: TransactionResponse,
    ) -> Result<TransactionReference, TransactionError> {
        let kind = response.kind();
        let position = self.store.append(request, response)?;
        info!("Committed {} at {}", kind, position);
        Ok(position)
    }

    // =========================================================================
    // Initial transactions
    // =========================================================================

    pub fn add_jar_store_initial_transaction(
        &self,
        request: JarStoreInitialTransactionRequest,
    ) -> Result<TransactionReference, TransactionError> {
        let _guard = self.lock();
        self.check_not_initialized()?;
        let current = self.store.next_position()?;
        let response = builders::jar_store_initial(self, current, &request).map_err(|e| {
            warn!("Rejected initial jar: {}", e);
            e
        })?;
        self.commit(request.into(), response)
    }

    /// Creates the account holding the initial coins of the chain
    pub fn add_gamete_creation_transaction(
        &self,
        request: GameteCreationTransactionRequest,
    ) -> Result<StorageReference, TransactionError> {
        let _guard = self.lock();
        self.check_not_initialized()?;
        let current = self.store.next_position()?;
        let (response, gamete) = builders::gamete_creation(self, current, &request).map_err(|e| {
            warn!("Rejected gamete creation: {}", e);
            e
        })?;
        self.commit(request.into(), response)?;
        Ok(gamete)
    }

    fn check_not_initialized(&self) -> Result<(), TransactionError> {
        if self.is_initialized()? {
            Err(TransactionError::Rejected(
                "initial transactions are only allowed before initialization".into(),
            ))
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Paid transactions
    // =========================================================================

    pub fn add_jar_store_transaction(
        &self,
        request: JarStoreTransactionRequest,
    ) -> Result<TransactionReference, TransactionError> {
        let _guard = self.lock();
        let current = self.store.next_position()?;
        let response = builders::jar_store(self, current, &request)?;
        let position = self.commit(request.into(), response.clone())?;
        match response.failure() {
            Some((cause, _)) => Err(TransactionError::Failed {
                reference: Some(position),
                cause: cause.clone(),
            }),
            None => Ok(position),
        }
    }

    pub fn add_constructor_call_transaction(
        &self,
        request: ConstructorCallTransactionRequest,
    ) -> Result<ContractOutcome<StorageReference>, TransactionError> {
        let _guard = self.lock();
        let current = self.store.next_position()?;
        let response = builders::constructor_call(self, current, &request)?;
        let position = self.commit(request.into(), response.clone())?;
        constructor_outcome(response, Some(position))
    }

    pub fn add_instance_method_call_transaction(
        &self,
        request: InstanceMethodCallTransactionRequest,
    ) -> Result<ContractOutcome<Option<StorageValue>>, TransactionError> {
        let _guard = self.lock();
        let current = self.store.next_position()?;
        let response = builders::instance_method_call(self, current, &request, Mode::Add)?;
        let position = self.commit(request.into(), response.clone())?;
        method_outcome(response, Some(position))
    }

    pub fn add_static_method_call_transaction(
        &self,
        request: StaticMethodCallTransactionRequest,
    ) -> Result<ContractOutcome<Option<StorageValue>>, TransactionError> {
        let _guard = self.lock();
        let current = self.store.next_position()?;
        let response = builders::static_method_call(self, current, &request, Mode::Add)?;
        let position = self.commit(request.into(), response.clone())?;
        method_outcome(response, Some(position))
    }

    /// Runs a method against the current state without committing anything.
    /// Nonce and signature are not checked.
    pub fn run_instance_method_call_transaction(
        &self,
        request: InstanceMethodCallTransactionRequest,
    ) -> Result<ContractOutcome<Option<StorageValue>>, TransactionError> {
        let current = self.store.next_position()?;
        let response = builders::instance_method_call(self, current, &request, Mode::Run)?;
        method_outcome(response, None)
    }

    pub fn run_static_method_call_transaction(
        &self,
        request: StaticMethodCallTransactionRequest,
    ) -> Result<ContractOutcome<Option<StorageValue>>, TransactionError> {
        let current = self.store.next_position()?;
        let response = builders::static_method_call(self, current, &request, Mode::Run)?;
        method_outcome(response, None)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn tail(&self) -> Result<Option<TransactionReference>, StoreError> {
        self.store.tail()
    }

    /// True once a non-initial transaction has been committed
    pub fn is_initialized(&self) -> Result<bool, StoreError> {
        match self.store.tail()? {
            None => Ok(false),
            Some(tail) => Ok(!self.store.request_at(tail)?.is_initial()),
        }
    }

    pub fn request_at(&self, reference: TransactionReference) -> Result<TransactionRequest, StoreError> {
        self.store.request_at(reference)
    }

    pub fn response_at(&self, reference: TransactionReference) -> Result<TransactionResponse, StoreError> {
        self.store.response_at(reference)
    }

    /// Running digest of every encoded response up to the tail. Two nodes
    /// agree on their history iff their digests match.
    pub fn log_digest(&self) -> Result<Hash, EngineFault> {
        let mut digest = Hash::ZERO;
        if let Some(tail) = self.store.tail()? {
            for n in 0..=tail.number() {
                let response = self.store.response_at(TransactionReference::new(n))?;
                digest = digest.chain(&codec::encode(&response, self.config.verification_version)?);
            }
        }
        Ok(digest)
    }

    /// Class tag of a committed object
    pub fn class_tag_of(&self, object: &StorageReference) -> Result<Update, DeserializationError> {
        let creation = self.store.response_at(object.transaction)?;
        if creation.updates().is_none() {
            return Err(DeserializationError::NoUpdates(object.transaction));
        }
        let (class_name, jar) =
            class_tag_in(&creation, object).ok_or(DeserializationError::MissingClassTag(*object))?;
        Ok(Update::ClassTag {
            object: *object,
            class_name,
            jar,
        })
    }

    /// Class tag and latest update of every field of an object, as of the tail
    pub fn state_of(&self, object: &StorageReference) -> Result<Vec<Update>, DeserializationError> {
        let tag = self.class_tag_of(object)?;
        let tail = self.store.tail()?.unwrap_or(object.transaction);

        let positions: Vec<TransactionReference> = match self.store.history_of(object)? {
            Some(history) => history.into_iter().rev().collect(),
            None => (object.transaction.number()..=tail.number())
                .rev()
                .map(TransactionReference::new)
                .collect(),
        };

        let mut state: Vec<Update> = vec![tag];
        for position in positions {
            let response = self.store.response_at(position)?;
            for update in response.updates().unwrap_or(&[]) {
                if update.object() == *object
                    && !update.is_class_tag()
                    && !state.iter().any(|u| u.is_for_same_property_as(update))
                {
                    state.push(update.clone());
                }
            }
        }

        Ok(state.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
    }
}

fn constructor_outcome(
    response: TransactionResponse,
    reference: Option<TransactionReference>,
) -> Result<ContractOutcome<StorageReference>, TransactionError> {
    match response {
        TransactionResponse::ConstructorCallSuccessful { new_object, .. } => {
            Ok(ContractOutcome::Returned(new_object))
        }
        other => classify_abrupt(other, reference),
    }
}

fn method_outcome(
    response: TransactionResponse,
    reference: Option<TransactionReference>,
) -> Result<ContractOutcome<Option<StorageValue>>, TransactionError> {
    match response {
        TransactionResponse::MethodCallSuccessful { result, .. } => {
            Ok(ContractOutcome::Returned(Some(result)))
        }
        TransactionResponse::VoidMethodCallSuccessful { .. } => Ok(ContractOutcome::Returned(None)),
        other => classify_abrupt(other, reference),
    }
}

fn classify_abrupt<T>(
    response: TransactionResponse,
    reference: Option<TransactionReference>,
) -> Result<ContractOutcome<T>, TransactionError> {
    if let Some(exception) = response.exception() {
        return Ok(ContractOutcome::Threw(CodeExecutionException {
            reference,
            class_name: exception.class_name.clone(),
            message: exception.message.clone(),
            call_site: exception.call_site.clone(),
        }));
    }
    match response.failure() {
        Some((cause, _)) => Err(TransactionError::Failed {
            reference,
            cause: cause.clone(),
        }),
        None => Err(TransactionError::Rejected(format!(
            "unexpected {} response",
            response.kind()
        ))),
    }
}
