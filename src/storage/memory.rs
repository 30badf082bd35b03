// MemoryStore - Journal en mémoire avec index d'historique
use super::{updated_objects, ChainStore, StoreError};
use crate::types::{StorageReference, TransactionReference, TransactionRequest, TransactionResponse};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Log {
    entries: Vec<(TransactionRequest, TransactionResponse)>,
    history: HashMap<StorageReference, Vec<TransactionReference>>,
}

/// In-memory chain. Readers share the lock, the appender takes it alone.
pub struct MemoryStore {
    log: RwLock<Log>,
    index_history: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_index(true)
    }

    /// `index_history = false` forces lookups to walk the chain
    pub fn with_index(index_history: bool) -> Self {
        Self {
            log: RwLock::new(Log::default()),
            index_history,
        }
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Log> {
        self.log.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Log> {
        self.log.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainStore for MemoryStore {
    fn request_at(&self, reference: TransactionReference) -> Result<TransactionRequest, StoreError> {
        self.read()
            .entries
            .get(reference.number() as usize)
            .map(|(request, _)| request.clone())
            .ok_or(StoreError::NotFound(reference))
    }

    fn response_at(&self, reference: TransactionReference) -> Result<TransactionResponse, StoreError> {
        self.read()
            .entries
            .get(reference.number() as usize)
            .map(|(_, response)| response.clone())
            .ok_or(StoreError::NotFound(reference))
    }

    fn append(
        &self,
        request: TransactionRequest,
        response: TransactionResponse,
    ) -> Result<TransactionReference, StoreError> {
        let mut log = self.write();
        let position = TransactionReference::new(log.entries.len() as u64);

        if self.index_history {
            for object in updated_objects(&response) {
                log.history.entry(object).or_default().push(position);
            }
        }
        log.entries.push((request, response));

        Ok(position)
    }

    fn tail(&self) -> Result<Option<TransactionReference>, StoreError> {
        let len = self.read().entries.len() as u64;
        Ok(len.checked_sub(1).map(TransactionReference::new))
    }

    fn history_of(
        &self,
        object: &StorageReference,
    ) -> Result<Option<Vec<TransactionReference>>, StoreError> {
        if !self.index_history {
            return Ok(None);
        }
        Ok(Some(
            self.read().history.get(object).cloned().unwrap_or_default(),
        ))
    }
}
