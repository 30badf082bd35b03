// Références - Positions de chaîne et identités d'objets
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a committed transaction in the chain.
///
/// Positions are totally ordered by commit order; the first transaction of a
/// chain sits at position 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionReference(u64);

impl TransactionReference {
    pub const FIRST: TransactionReference = TransactionReference(0);

    pub fn new(number: u64) -> Self {
        TransactionReference(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }

    /// Position immediately preceding this one, if any
    pub fn previous(&self) -> Option<TransactionReference> {
        self.0.checked_sub(1).map(TransactionReference)
    }

    pub fn next(&self) -> TransactionReference {
        TransactionReference(self.0 + 1)
    }

    /// Strictly older, consistent with commit order
    pub fn is_older_than(&self, other: &TransactionReference) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of an object: the transaction that created it plus a progressive
/// index among the objects created by that transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageReference {
    pub transaction: TransactionReference,
    pub progressive: u64,
}

impl StorageReference {
    pub fn new(transaction: TransactionReference, progressive: u64) -> Self {
        Self {
            transaction,
            progressive,
        }
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.transaction, self.progressive)
    }
}
