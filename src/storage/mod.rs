// Storage - Journal des transactions committées
//
// The engine only appends a request and its response at the next position
// and reads back what was committed. Once a position is observable, its
// response is final.
pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{DatabaseError, RocksStore};

use crate::types::{StorageReference, TransactionReference, TransactionRequest, TransactionResponse};

pub trait ChainStore: Send + Sync {
    fn request_at(&self, reference: TransactionReference) -> Result<TransactionRequest, StoreError>;

    fn response_at(&self, reference: TransactionReference) -> Result<TransactionResponse, StoreError>;

    /// Appends at the position following the tail and returns that position
    fn append(
        &self,
        request: TransactionRequest,
        response: TransactionResponse,
    ) -> Result<TransactionReference, StoreError>;

    fn tail(&self) -> Result<Option<TransactionReference>, StoreError>;

    /// Positions, in increasing order, whose response updates `object`.
    /// `None` if the store keeps no such index: callers walk the chain.
    fn history_of(
        &self,
        _object: &StorageReference,
    ) -> Result<Option<Vec<TransactionReference>>, StoreError> {
        Ok(None)
    }

    /// Position the next committed transaction will get
    fn next_position(&self) -> Result<TransactionReference, StoreError> {
        Ok(self
            .tail()?
            .map(|tail| tail.next())
            .unwrap_or(TransactionReference::FIRST))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown transaction {0}")]
    NotFound(TransactionReference),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Corrupted entry at {reference}: {reason}")]
    Corrupted {
        reference: TransactionReference,
        reason: String,
    },
}

/// Objects whose updates appear in a response, for history indexes
pub(crate) fn updated_objects(response: &TransactionResponse) -> Vec<StorageReference> {
    let mut objects: Vec<StorageReference> = response
        .updates()
        .unwrap_or(&[])
        .iter()
        .map(|update| update.object())
        .collect();
    objects.sort();
    objects.dedup();
    objects
}
