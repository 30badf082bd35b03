// Exécution - Moteur d'exécution des transactions
//
// Everything here is transaction-scoped: a fresh context, gas meter, heap and
// deserializer cache per transaction, never shared between transactions.
pub mod classloader;
pub mod context;
pub mod deserializer;
pub mod extractor;
pub mod gas;
pub mod runtime;

pub use classloader::{ClassLoader, ClassLoaderError};
pub use context::ExecutionContext;
pub use deserializer::{DeserializationError, Deserializer};
pub use extractor::extract_updates;
pub use gas::{GasCostModel, GasError, GasMeter};
pub use runtime::{Heap, ObjectId, RuntimeObject, RuntimeValue};

use crate::code::VerificationError;
use crate::codec::CodecError;
use crate::storage::StoreError;
use crate::types::FailureCause;

/// Host-level fault: anything that aborts a transaction for reasons other
/// than a legitimate contract exception
#[derive(Debug, thiserror::Error)]
pub enum EngineFault {
    #[error(transparent)]
    Gas(#[from] GasError),

    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    #[error(transparent)]
    ClassLoader(#[from] ClassLoaderError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Exception escaping contract code not allowed to throw it
    #[error("{class_name}: {message}")]
    Uncaught {
        class_name: String,
        message: String,
        call_site: Option<String>,
    },

    #[error("Side effects in view method {0}")]
    SideEffectsInViewMethod(String),

    #[error("No such member: {0}")]
    NoSuchMember(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
}

impl EngineFault {
    /// Class name and message recorded in failed responses
    pub fn cause(&self) -> FailureCause {
        let class_name = match self {
            EngineFault::Gas(GasError::OutOfGas { .. })
            | EngineFault::Deserialization(DeserializationError::Gas(_)) => "OutOfGasError",
            EngineFault::Deserialization(_) => "DeserializationError",
            EngineFault::ClassLoader(_) => "ClassNotFoundError",
            EngineFault::Verification(_) => "VerificationError",
            EngineFault::Store(_) => "StoreError",
            EngineFault::Codec(_) => "EncodingError",
            EngineFault::Uncaught { class_name, message, .. } => {
                return FailureCause {
                    class_name: class_name.clone(),
                    message: message.clone(),
                }
            }
            EngineFault::SideEffectsInViewMethod(_) => "SideEffectsInViewMethodException",
            EngineFault::NoSuchMember(_) => "NoSuchMethodException",
            EngineFault::IllegalArgument(_) => "IllegalArgumentException",
        };

        FailureCause {
            class_name: class_name.to_string(),
            message: self.to_string(),
        }
    }
}

/// Exception raised by contract code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractException {
    pub class_name: String,
    pub message: String,
    /// Member the exception escaped from, filled in by the engine
    pub call_site: Option<String>,
}

/// Abrupt completion of contract code
#[derive(Debug)]
pub enum Throw {
    /// Checked exception: a legitimate outcome when it escapes a member
    /// allowed to throw it
    Checked(ContractException),
    /// Unchecked error raised by contract code
    Runtime(ContractException),
    /// Fault of the host: never meant to be caught by contract code
    Fault(EngineFault),
}

impl Throw {
    pub fn checked(class_name: &str, message: impl Into<String>) -> Self {
        Throw::Checked(ContractException {
            class_name: class_name.to_string(),
            message: message.into(),
            call_site: None,
        })
    }

    pub fn runtime(class_name: &str, message: impl Into<String>) -> Self {
        Throw::Runtime(ContractException {
            class_name: class_name.to_string(),
            message: message.into(),
            call_site: None,
        })
    }

    /// Records the member an exception escaped from, if not known yet
    pub(crate) fn at(mut self, call_site: impl FnOnce() -> String) -> Self {
        if let Throw::Checked(e) | Throw::Runtime(e) = &mut self {
            if e.call_site.is_none() {
                e.call_site = Some(call_site());
            }
        }
        self
    }

    /// Host view of a throw that is not a legitimate outcome
    pub fn into_fault(self) -> EngineFault {
        match self {
            Throw::Checked(e) | Throw::Runtime(e) => EngineFault::Uncaught {
                class_name: e.class_name,
                message: e.message,
                call_site: e.call_site,
            },
            Throw::Fault(fault) => fault,
        }
    }
}

impl From<EngineFault> for Throw {
    fn from(fault: EngineFault) -> Self {
        Throw::Fault(fault)
    }
}

macro_rules! throw_from_fault {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for Throw {
                fn from(error: $error) -> Self {
                    Throw::Fault(error.into())
                }
            }
        )*
    };
}

throw_from_fault!(
    GasError,
    DeserializationError,
    ClassLoaderError,
    VerificationError,
    StoreError,
    CodecError,
);
