// Requêtes - Demandes de transaction adressées au moteur
use super::reference::{StorageReference, TransactionReference};
use super::signatures::{ConstructorSignature, MethodSignature};
use super::value::StorageValue;
use crate::crypto::{domain_separate, DOMAIN_TRANSACTION};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Fields shared by every request paid by a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerData {
    /// Externally owned account paying for the transaction
    pub caller: StorageReference,
    pub nonce: BigInt,
    pub chain_id: String,
    pub gas_limit: u64,
    pub gas_price: u64,
    /// Jar installation whose classes (and dependencies) are visible to the code
    pub classpath: TransactionReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreInitialTransactionRequest {
    pub jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameteCreationTransactionRequest {
    pub classpath: TransactionReference,
    pub initial_amount: BigInt,
    /// Hex-encoded public key of the gamete
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreTransactionRequest {
    pub caller: CallerData,
    pub jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorCallTransactionRequest {
    pub caller: CallerData,
    pub constructor: ConstructorSignature,
    pub actuals: Vec<StorageValue>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMethodCallTransactionRequest {
    pub caller: CallerData,
    pub method: MethodSignature,
    pub receiver: StorageReference,
    pub actuals: Vec<StorageValue>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMethodCallTransactionRequest {
    pub caller: CallerData,
    pub method: MethodSignature,
    pub actuals: Vec<StorageValue>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionRequest {
    JarStoreInitial(JarStoreInitialTransactionRequest),
    GameteCreation(GameteCreationTransactionRequest),
    JarStore(JarStoreTransactionRequest),
    ConstructorCall(ConstructorCallTransactionRequest),
    InstanceMethodCall(InstanceMethodCallTransactionRequest),
    StaticMethodCall(StaticMethodCallTransactionRequest),
}

impl TransactionRequest {
    /// Initial requests can only be run before the chain is initialized
    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionRequest::JarStoreInitial(_) | TransactionRequest::GameteCreation(_)
        )
    }

    pub fn caller_data(&self) -> Option<&CallerData> {
        match self {
            TransactionRequest::JarStoreInitial(_) | TransactionRequest::GameteCreation(_) => None,
            TransactionRequest::JarStore(r) => Some(&r.caller),
            TransactionRequest::ConstructorCall(r) => Some(&r.caller),
            TransactionRequest::InstanceMethodCall(r) => Some(&r.caller),
            TransactionRequest::StaticMethodCall(r) => Some(&r.caller),
        }
    }

    pub fn signature(&self) -> Option<&[u8]> {
        match self {
            TransactionRequest::JarStoreInitial(_) | TransactionRequest::GameteCreation(_) => None,
            TransactionRequest::JarStore(r) => Some(&r.signature),
            TransactionRequest::ConstructorCall(r) => Some(&r.signature),
            TransactionRequest::InstanceMethodCall(r) => Some(&r.signature),
            TransactionRequest::StaticMethodCall(r) => Some(&r.signature),
        }
    }

    fn without_signature(&self) -> TransactionRequest {
        let mut copy = self.clone();
        match &mut copy {
            TransactionRequest::JarStoreInitial(_) | TransactionRequest::GameteCreation(_) => {}
            TransactionRequest::JarStore(r) => r.signature.clear(),
            TransactionRequest::ConstructorCall(r) => r.signature.clear(),
            TransactionRequest::InstanceMethodCall(r) => r.signature.clear(),
            TransactionRequest::StaticMethodCall(r) => r.signature.clear(),
        }
        copy
    }

    /// Bytes covered by the caller's signature
    pub fn signing_message(&self) -> Result<Vec<u8>, bincode::Error> {
        let encoded = bincode::serialize(&self.without_signature())?;
        Ok(domain_separate(DOMAIN_TRANSACTION, &encoded))
    }

    /// Size in bytes of the stored request, charged as storage gas
    pub fn size(&self) -> Result<u64, bincode::Error> {
        bincode::serialized_size(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransactionRequest::JarStoreInitial(_) => "jar store initial",
            TransactionRequest::GameteCreation(_) => "gamete creation",
            TransactionRequest::JarStore(_) => "jar store",
            TransactionRequest::ConstructorCall(_) => "constructor call",
            TransactionRequest::InstanceMethodCall(_) => "instance method call",
            TransactionRequest::StaticMethodCall(_) => "static method call",
        }
    }
}

macro_rules! into_request {
    ($($variant:ident($request:ty)),* $(,)?) => {
        $(
            impl From<$request> for TransactionRequest {
                fn from(request: $request) -> Self {
                    TransactionRequest::$variant(request)
                }
            }
        )*
    };
}

into_request!(
    JarStoreInitial(JarStoreInitialTransactionRequest),
    GameteCreation(GameteCreationTransactionRequest),
    JarStore(JarStoreTransactionRequest),
    ConstructorCall(ConstructorCallTransactionRequest),
    InstanceMethodCall(InstanceMethodCallTransactionRequest),
    StaticMethodCall(StaticMethodCallTransactionRequest),
);
