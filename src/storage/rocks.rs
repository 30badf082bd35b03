// RocksStore - Journal persistant sur RocksDB
use super::{updated_objects, ChainStore, StoreError};
use crate::codec;
use crate::types::{StorageReference, TransactionReference, TransactionRequest, TransactionResponse};
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const PREFIX_REQUEST: &[u8] = b"request:";
const PREFIX_RESPONSE: &[u8] = b"response:";
const PREFIX_HISTORY: &[u8] = b"history:";
const KEY_TAIL: &[u8] = b"meta:tail";

fn key(prefix: &[u8], parts: &[u64]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8 * parts.len());
    key.extend_from_slice(prefix);
    for part in parts {
        key.extend_from_slice(&part.to_be_bytes());
    }
    key
}

fn history_prefix(object: &StorageReference) -> Vec<u8> {
    key(
        PREFIX_HISTORY,
        &[object.transaction.number(), object.progressive],
    )
}

/// Chain log in a RocksDB directory.
///
/// Requests are stored with bincode, responses with the log codec of the
/// configured verification version, so their bytes are the ones that were
/// charged as storage gas.
pub struct RocksStore {
    db: Arc<DB>,
    verification_version: u8,
    index_history: bool,
    append_lock: Mutex<()>,
}

impl RocksStore {
    /// Store keeping the per-object history index
    pub fn open<P: AsRef<Path>>(path: P, verification_version: u8) -> Result<Self, DatabaseError> {
        Self::open_with_index(path, verification_version, true)
    }

    pub fn open_with_index<P: AsRef<Path>>(
        path: P,
        verification_version: u8,
        index_history: bool,
    ) -> Result<Self, DatabaseError> {
        codec::check_version(verification_version)
            .map_err(|e| DatabaseError::OpenFailed(e.to_string()))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_keep_log_file_num(5);
        opts.set_max_background_jobs(2);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| DatabaseError::OpenFailed(e.to_string()))?;
        info!("Chain store opened at {}", path.as_ref().display());

        Ok(Self {
            db: Arc::new(db),
            verification_version,
            index_history,
            append_lock: Mutex::new(()),
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.db
            .get(key)
            .map_err(|e| DatabaseError::ReadFailed(e.to_string()))
    }

    fn entry(&self, prefix: &[u8], reference: TransactionReference) -> Result<Vec<u8>, StoreError> {
        self.get(&key(prefix, &[reference.number()]))?
            .ok_or(StoreError::NotFound(reference))
    }

    /// Keys starting with `prefix`, in key order. Iteration errors are
    /// yielded to the caller.
    fn keys_with_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = Result<Vec<u8>, DatabaseError>> + 'a {
        self.db
            .prefix_iterator(prefix)
            .map(|item| {
                item.map(|(key, _)| key.to_vec())
                    .map_err(|e| DatabaseError::ReadFailed(e.to_string()))
            })
            .take_while(move |result| match result {
                Ok(key) => key.starts_with(prefix),
                Err(_) => true,
            })
    }
}

/// Positions encoded in the history keys of `object`. Stops at the first
/// read error or malformed key: a partial history would hide updates.
fn history_positions<I>(
    object: &StorageReference,
    prefix_len: usize,
    keys: I,
) -> Result<Vec<TransactionReference>, StoreError>
where
    I: Iterator<Item = Result<Vec<u8>, DatabaseError>>,
{
    keys.map(|key| -> Result<TransactionReference, StoreError> {
        let key = key?;
        let suffix: [u8; 8] = key
            .get(prefix_len..)
            .and_then(|suffix| suffix.try_into().ok())
            .ok_or_else(|| StoreError::Corrupted {
                reference: object.transaction,
                reason: format!("history key of {} bytes for {}", key.len(), object),
            })?;
        Ok(TransactionReference::new(u64::from_be_bytes(suffix)))
    })
    .collect()
}

impl ChainStore for RocksStore {
    fn request_at(&self, reference: TransactionReference) -> Result<TransactionRequest, StoreError> {
        let bytes = self.entry(PREFIX_REQUEST, reference)?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::Corrupted {
            reference,
            reason: e.to_string(),
        })
    }

    fn response_at(&self, reference: TransactionReference) -> Result<TransactionResponse, StoreError> {
        let bytes = self.entry(PREFIX_RESPONSE, reference)?;
        codec::decode(&bytes, self.verification_version).map_err(|e| StoreError::Corrupted {
            reference,
            reason: e.to_string(),
        })
    }

    fn append(
        &self,
        request: TransactionRequest,
        response: TransactionResponse,
    ) -> Result<TransactionReference, StoreError> {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let position = self.next_position()?;

        let request_bytes = bincode::serialize(&request)
            .map_err(|e| DatabaseError::SerializationFailed(e.to_string()))?;
        let response_bytes = codec::encode(&response, self.verification_version)
            .map_err(|e| DatabaseError::SerializationFailed(e.to_string()))?;

        let mut batch = WriteBatch::default();
        batch.put(key(PREFIX_REQUEST, &[position.number()]), request_bytes);
        batch.put(key(PREFIX_RESPONSE, &[position.number()]), response_bytes);
        if self.index_history {
            for object in updated_objects(&response) {
                let mut history_key = history_prefix(&object);
                history_key.extend_from_slice(&position.number().to_be_bytes());
                batch.put(history_key, b"");
            }
        }
        batch.put(KEY_TAIL, position.number().to_be_bytes());

        self.db
            .write(batch)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))?;

        Ok(position)
    }

    fn tail(&self) -> Result<Option<TransactionReference>, StoreError> {
        match self.get(KEY_TAIL)? {
            None => Ok(None),
            Some(bytes) => {
                let array: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    DatabaseError::ReadFailed(format!("tail of {} bytes", bytes.len()))
                })?;
                Ok(Some(TransactionReference::new(u64::from_be_bytes(array))))
            }
        }
    }

    fn history_of(
        &self,
        object: &StorageReference,
    ) -> Result<Option<Vec<TransactionReference>>, StoreError> {
        if !self.index_history {
            return Ok(None);
        }
        let prefix = history_prefix(object);
        let positions = history_positions(object, prefix.len(), self.keys_with_prefix(&prefix))?;
        Ok(Some(positions))
    }
}

/// Erreurs de base de données
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Échec d'ouverture de la DB: {0}")]
    OpenFailed(String),

    #[error("Échec de lecture: {0}")]
    ReadFailed(String),

    #[error("Échec d'écriture: {0}")]
    WriteFailed(String),

    #[error("Sérialisation échouée: {0}")]
    SerializationFailed(String),
}
