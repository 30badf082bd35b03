// Réponses - Résultats classifiés des transactions
use super::reference::{StorageReference, TransactionReference};
use super::update::Update;
use super::value::StorageValue;
use std::fmt;

/// Gas consumed by a transaction, per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasConsumed {
    pub cpu: u64,
    pub ram: u64,
    pub storage: u64,
}

impl GasConsumed {
    pub fn total(&self) -> u64 {
        self.cpu + self.ram + self.storage
    }
}

/// Cause of a failed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCause {
    pub class_name: String,
    pub message: String,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.class_name)
        } else {
            write!(f, "{}: {}", self.class_name, self.message)
        }
    }
}

/// Checked exception thrown by contract code allowed to throw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub class_name: String,
    pub message: String,
    /// Executable member the exception escaped from
    pub call_site: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionResponse {
    JarStoreInitial {
        verified_jar: Vec<u8>,
        dependencies: Vec<TransactionReference>,
        verification_version: u8,
    },
    GameteCreation {
        updates: Vec<Update>,
        gamete: StorageReference,
    },
    JarStoreSuccessful {
        verified_jar: Vec<u8>,
        dependencies: Vec<TransactionReference>,
        verification_version: u8,
        updates: Vec<Update>,
        gas: GasConsumed,
    },
    JarStoreFailed {
        cause: FailureCause,
        updates: Vec<Update>,
        gas: GasConsumed,
        penalty: u64,
    },
    ConstructorCallSuccessful {
        new_object: StorageReference,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    ConstructorCallException {
        exception: ExceptionInfo,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    ConstructorCallFailed {
        cause: FailureCause,
        updates: Vec<Update>,
        gas: GasConsumed,
        penalty: u64,
    },
    MethodCallSuccessful {
        result: StorageValue,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    VoidMethodCallSuccessful {
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    MethodCallException {
        exception: ExceptionInfo,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    MethodCallFailed {
        cause: FailureCause,
        updates: Vec<Update>,
        gas: GasConsumed,
        penalty: u64,
    },
}

impl TransactionResponse {
    /// Updates produced by the transaction, `None` for responses that
    /// carry no update set
    pub fn updates(&self) -> Option<&[Update]> {
        match self {
            TransactionResponse::JarStoreInitial { .. } => None,
            TransactionResponse::GameteCreation { updates, .. }
            | TransactionResponse::JarStoreSuccessful { updates, .. }
            | TransactionResponse::JarStoreFailed { updates, .. }
            | TransactionResponse::ConstructorCallSuccessful { updates, .. }
            | TransactionResponse::ConstructorCallException { updates, .. }
            | TransactionResponse::ConstructorCallFailed { updates, .. }
            | TransactionResponse::MethodCallSuccessful { updates, .. }
            | TransactionResponse::VoidMethodCallSuccessful { updates, .. }
            | TransactionResponse::MethodCallException { updates, .. }
            | TransactionResponse::MethodCallFailed { updates, .. } => Some(updates),
        }
    }

    pub fn events(&self) -> &[StorageReference] {
        match self {
            TransactionResponse::ConstructorCallSuccessful { events, .. }
            | TransactionResponse::ConstructorCallException { events, .. }
            | TransactionResponse::MethodCallSuccessful { events, .. }
            | TransactionResponse::VoidMethodCallSuccessful { events, .. }
            | TransactionResponse::MethodCallException { events, .. } => events,
            _ => &[],
        }
    }

    pub fn gas(&self) -> Option<GasConsumed> {
        match self {
            TransactionResponse::JarStoreSuccessful { gas, .. }
            | TransactionResponse::JarStoreFailed { gas, .. }
            | TransactionResponse::ConstructorCallSuccessful { gas, .. }
            | TransactionResponse::ConstructorCallException { gas, .. }
            | TransactionResponse::ConstructorCallFailed { gas, .. }
            | TransactionResponse::MethodCallSuccessful { gas, .. }
            | TransactionResponse::VoidMethodCallSuccessful { gas, .. }
            | TransactionResponse::MethodCallException { gas, .. }
            | TransactionResponse::MethodCallFailed { gas, .. } => Some(*gas),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<(&FailureCause, u64)> {
        match self {
            TransactionResponse::JarStoreFailed { cause, penalty, .. }
            | TransactionResponse::ConstructorCallFailed { cause, penalty, .. }
            | TransactionResponse::MethodCallFailed { cause, penalty, .. } => {
                Some((cause, *penalty))
            }
            _ => None,
        }
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        match self {
            TransactionResponse::ConstructorCallException { exception, .. }
            | TransactionResponse::MethodCallException { exception, .. } => Some(exception),
            _ => None,
        }
    }

    /// Jar installed by this transaction: verified bytes, dependencies and
    /// the verification version used
    pub fn installed_jar(&self) -> Option<(&[u8], &[TransactionReference], u8)> {
        match self {
            TransactionResponse::JarStoreInitial {
                verified_jar,
                dependencies,
                verification_version,
            }
            | TransactionResponse::JarStoreSuccessful {
                verified_jar,
                dependencies,
                verification_version,
                ..
            } => Some((verified_jar, dependencies, *verification_version)),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransactionResponse::JarStoreInitial { .. } => "JarStoreInitial",
            TransactionResponse::GameteCreation { .. } => "GameteCreation",
            TransactionResponse::JarStoreSuccessful { .. } => "JarStoreSuccessful",
            TransactionResponse::JarStoreFailed { .. } => "JarStoreFailed",
            TransactionResponse::ConstructorCallSuccessful { .. } => "ConstructorCallSuccessful",
            TransactionResponse::ConstructorCallException { .. } => "ConstructorCallException",
            TransactionResponse::ConstructorCallFailed { .. } => "ConstructorCallFailed",
            TransactionResponse::MethodCallSuccessful { .. } => "MethodCallSuccessful",
            TransactionResponse::VoidMethodCallSuccessful { .. } => "VoidMethodCallSuccessful",
            TransactionResponse::MethodCallException { .. } => "MethodCallException",
            TransactionResponse::MethodCallFailed { .. } => "MethodCallFailed",
        }
    }
}
