// Tests module
// Lifecycle: initialization, signed transactions and their classification
// Lazy fields: backward walks, final fields, exceptions with lazy updates
// Determinism: byte-identical logs for identical histories
// Properties: order independence of update extraction

pub mod lazy_fields;
pub mod lifecycle;

use crate::code::{CodeRegistry, JarManifest};
use crate::code::jar::{ClassDefinition, FieldDefinition, MemberFlags};
use crate::code::kernel;
use crate::config::ConsensusConfig;
use crate::crypto::{Ed25519Verifier, KeyPair};
use crate::execution::{RuntimeValue, Throw};
use crate::node::Node;
use crate::storage::{ChainStore, MemoryStore};
use crate::types::*;
use num_bigint::BigInt;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Log output for failing tests, filtered by RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ===== DEMO JAR =====

pub const COUNTER: &str = "demo.Counter";
pub const BOX: &str = "demo.Box";
pub const NOTICE: &str = "demo.Notice";
pub const PLEDGE: &str = "demo.Pledge";
pub const REFUSED: &str = "demo.Refused";

/// Gas granted to the loop of `burnWithin`
pub const SUB_BUDGET: u64 = 25_000;
pub const GAS_LIMIT: u64 = 500_000;
pub const GAS_PRICE: u64 = 1;
pub const INITIAL_COINS: u64 = 1_000_000_000;

pub fn pledge_constructor() -> ConstructorSignature {
    ConstructorSignature::new(PLEDGE, vec![BasicType::Int.into()])
}

pub fn counter_constructor() -> ConstructorSignature {
    ConstructorSignature::new(COUNTER, vec![])
}

pub fn counter_method(name: &str, formals: Vec<StorageType>, returns: Option<StorageType>) -> MethodSignature {
    MethodSignature::new(COUNTER, name, formals, returns)
}

pub fn count_field() -> FieldSignature {
    FieldSignature::new(COUNTER, "count", BasicType::Int.into())
}

pub fn shelf_field() -> FieldSignature {
    FieldSignature::new(COUNTER, "shelf", StorageType::class(BOX))
}

pub fn label_field() -> FieldSignature {
    FieldSignature::new(BOX, "label", StorageType::string())
}

/// Counter contract, a box it keeps on its shelf and an event it emits
pub fn demo_manifest() -> JarManifest {
    JarManifest::new(vec![
        ClassDefinition::new(BOX, Some(classes::STORAGE))
            .with_field(FieldDefinition::new("label", StorageType::string()).final_field())
            .with_constructor(vec![StorageType::string()], MemberFlags::default()),
        ClassDefinition::new(NOTICE, Some(classes::EVENT))
            .with_field(FieldDefinition::new("count", BasicType::Int.into()))
            .with_constructor(vec![BasicType::Int.into()], MemberFlags::entry()),
        ClassDefinition::new(PLEDGE, Some(classes::STORAGE))
            .with_field(FieldDefinition::new("amount", BasicType::Int.into()))
            .with_constructor(vec![BasicType::Int.into()], MemberFlags::entry().throwing()),
        ClassDefinition::new(COUNTER, Some(classes::CONTRACT))
            .with_field(FieldDefinition::new("count", BasicType::Int.into()))
            .with_field(FieldDefinition::new("shelf", StorageType::class(BOX)))
            .with_constructor(vec![], MemberFlags::entry())
            .with_method("increment", vec![], None, MemberFlags::entry())
            .with_method("get", vec![], Some(BasicType::Int.into()), MemberFlags::view())
            .with_method("sneaky", vec![], Some(BasicType::Int.into()), MemberFlags::view())
            .with_method("deposit", vec![StorageType::big_integer()], None, MemberFlags::payable())
            .with_method("drain", vec![], None, MemberFlags::entry())
            .with_method("store", vec![StorageType::string()], None, MemberFlags::entry())
            .with_method("label", vec![], Some(StorageType::string()), MemberFlags::view())
            .with_method("relabel", vec![StorageType::string()], None, MemberFlags::entry())
            .with_method(
                "storeAndRefuse",
                vec![StorageType::string()],
                None,
                MemberFlags::entry().throwing(),
            )
            .with_method("refuse", vec![], None, MemberFlags::entry())
            .with_method("burn", vec![], None, MemberFlags::entry())
            .with_method("burnWithin", vec![], None, MemberFlags::entry())
            .with_method("announce", vec![], None, MemberFlags::entry())
            .with_static_method(
                "twice",
                vec![BasicType::Int.into()],
                Some(BasicType::Int.into()),
                MemberFlags::view(),
            ),
    ])
}

fn count_of(ctx: &mut crate::execution::ExecutionContext<'_>, this: crate::execution::ObjectId) -> Result<i32, Throw> {
    Ok(ctx.get_field(this, &count_field())?.as_int().unwrap_or(0))
}

fn store_box(
    ctx: &mut crate::execution::ExecutionContext<'_>,
    this: crate::execution::ObjectId,
    label: RuntimeValue,
) -> Result<(), Throw> {
    let boxed = ctx.construct(
        &ConstructorSignature::new(BOX, vec![StorageType::string()]),
        vec![label],
        None,
    )?;
    ctx.set_field(this, &shelf_field(), RuntimeValue::Object(boxed))
}

fn shelved_box(
    ctx: &mut crate::execution::ExecutionContext<'_>,
    this: crate::execution::ObjectId,
) -> Result<crate::execution::ObjectId, Throw> {
    ctx.get_field(this, &shelf_field())?
        .as_object()
        .ok_or_else(|| Throw::runtime("NullPointerException", "empty shelf"))
}

pub fn demo_registry() -> CodeRegistry {
    let mut registry = CodeRegistry::with_kernel();
    let string = || vec![StorageType::string()];

    registry
        .register_constructor(ConstructorSignature::new(BOX, string()), |ctx, frame| {
            ctx.set_field(frame.this()?, &label_field(), frame.arg(0)?.clone())?;
            Ok(RuntimeValue::Null)
        })
        .register_constructor(
            ConstructorSignature::new(NOTICE, vec![BasicType::Int.into()]),
            |ctx, frame| {
                let this = frame.this()?;
                ctx.super_constructor(
                    &ConstructorSignature::new(classes::EVENT, vec![]),
                    this,
                    vec![],
                    frame.caller,
                )?;
                ctx.set(this, NOTICE, "count", frame.arg(0)?.clone())?;
                Ok(RuntimeValue::Null)
            },
        )
        .register_constructor(pledge_constructor(), |ctx, frame| {
            let amount = frame.arg(0)?.clone();
            ctx.set(frame.this()?, PLEDGE, "amount", amount.clone())?;
            match amount {
                RuntimeValue::Int(n) if n > 0 => Ok(RuntimeValue::Null),
                _ => Err(Throw::checked(REFUSED, "pledges must be positive")),
            }
        })
        .register_constructor(counter_constructor(), |_, _| Ok(RuntimeValue::Null));

    registry
        .register_method(counter_method("increment", vec![], None), |ctx, frame| {
            let this = frame.this()?;
            let count = count_of(ctx, this)?;
            ctx.set_field(this, &count_field(), RuntimeValue::Int(count + 1))?;
            Ok(RuntimeValue::Null)
        })
        .register_method(
            counter_method("get", vec![], Some(BasicType::Int.into())),
            |ctx, frame| Ok(RuntimeValue::Int(count_of(ctx, frame.this()?)?)),
        )
        .register_method(
            counter_method("sneaky", vec![], Some(BasicType::Int.into())),
            |ctx, frame| {
                let this = frame.this()?;
                let count = count_of(ctx, this)? + 1;
                ctx.set_field(this, &count_field(), RuntimeValue::Int(count))?;
                Ok(RuntimeValue::Int(count))
            },
        )
        .register_method(
            counter_method("deposit", vec![StorageType::big_integer()], None),
            |_, _| Ok(RuntimeValue::Null),
        )
        .register_method(counter_method("drain", vec![], None), |ctx, frame| {
            let this = frame.this()?;
            let balance = ctx.balance_of(this)?;
            ctx.transfer(this, frame.caller()?, &balance)?;
            Ok(RuntimeValue::Null)
        })
        .register_method(counter_method("store", string(), None), |ctx, frame| {
            store_box(ctx, frame.this()?, frame.arg(0)?.clone())?;
            Ok(RuntimeValue::Null)
        })
        .register_method(
            counter_method("label", vec![], Some(StorageType::string())),
            |ctx, frame| {
                let boxed = shelved_box(ctx, frame.this()?)?;
                ctx.get_field(boxed, &label_field())
            },
        )
        .register_method(counter_method("relabel", string(), None), |ctx, frame| {
            let boxed = shelved_box(ctx, frame.this()?)?;
            ctx.set_field(boxed, &label_field(), frame.arg(0)?.clone())?;
            Ok(RuntimeValue::Null)
        })
        .register_method(counter_method("storeAndRefuse", string(), None), |ctx, frame| {
            store_box(ctx, frame.this()?, frame.arg(0)?.clone())?;
            Err(Throw::checked(REFUSED, "stored, then refused"))
        })
        .register_method(counter_method("refuse", vec![], None), |_, _| {
            Err(Throw::checked(REFUSED, "not declared to throw"))
        })
        .register_method(counter_method("burn", vec![], None), |ctx, _| loop {
            ctx.charge_cpu(10_000)?;
        })
        .register_method(counter_method("burnWithin", vec![], None), |ctx, _| {
            ctx.with_gas::<(), _>(SUB_BUDGET, |ctx| loop {
                ctx.charge_cpu(10_000)?;
            })?;
            Ok(RuntimeValue::Null)
        })
        .register_method(counter_method("announce", vec![], None), |ctx, frame| {
            let this = frame.this()?;
            let count = count_of(ctx, this)?;
            let notice = ctx.construct(
                &ConstructorSignature::new(NOTICE, vec![BasicType::Int.into()]),
                vec![RuntimeValue::Int(count)],
                Some(this),
            )?;
            ctx.emit(notice)?;
            Ok(RuntimeValue::Null)
        })
        .register_method(
            MethodSignature::new(
                COUNTER,
                "twice",
                vec![BasicType::Int.into()],
                Some(BasicType::Int.into()),
            ),
            |_, frame| {
                let value = frame.arg(0)?.as_int().unwrap_or(0);
                Ok(RuntimeValue::Int(value * 2))
            },
        );

    registry
}

// ===== CHAIN FIXTURE =====

/// Initialized chain: kernel and demo jars, a funded gamete, one more account
pub struct Chain {
    pub node: Node,
    pub store: Arc<dyn ChainStore>,
    pub keys: KeyPair,
    pub gamete: StorageReference,
    pub kernel: TransactionReference,
    pub demo: TransactionReference,
    nonce: BigInt,
}

impl Chain {
    pub fn new() -> Self {
        Self::with_index(true)
    }

    pub fn with_index(index_history: bool) -> Self {
        Self::over(Arc::new(MemoryStore::with_index(index_history)))
    }

    /// Kernel, demo jar and gamete installed in `store`
    pub fn over(store: Arc<dyn ChainStore>) -> Self {
        init_tracing();
        let config = ConsensusConfig::testnet();
        let node = Node::new(
            store.clone(),
            config,
            Arc::new(demo_registry()),
            Arc::new(Ed25519Verifier),
        )
        .unwrap();

        let kernel = node
            .add_jar_store_initial_transaction(JarStoreInitialTransactionRequest {
                jar: kernel::manifest().to_bytes().unwrap(),
                dependencies: vec![],
            })
            .unwrap();
        let demo = node
            .add_jar_store_initial_transaction(JarStoreInitialTransactionRequest {
                jar: demo_manifest().to_bytes().unwrap(),
                dependencies: vec![kernel],
            })
            .unwrap();

        let keys = KeyPair::from_seed(&[7; 32]);
        let gamete = node
            .add_gamete_creation_transaction(GameteCreationTransactionRequest {
                classpath: kernel,
                initial_amount: BigInt::from(INITIAL_COINS),
                public_key: keys.public_key(),
            })
            .unwrap();

        Self {
            node,
            store,
            keys,
            gamete,
            kernel,
            demo,
            nonce: BigInt::from(0),
        }
    }

    /// Caller data for the next transaction of the gamete
    pub fn caller(&self) -> CallerData {
        CallerData {
            caller: self.gamete,
            nonce: self.nonce.clone(),
            chain_id: self.node.config().chain_id.clone(),
            gas_limit: GAS_LIMIT,
            gas_price: GAS_PRICE,
            classpath: self.demo,
        }
    }

    /// Records that a transaction of the gamete was committed
    pub fn committed(&mut self) {
        self.nonce += 1;
    }

    pub fn sign<R>(&self, request: R) -> TransactionRequest
    where
        R: Into<TransactionRequest>,
    {
        let mut request = request.into();
        let signature = self.keys.sign(&request.signing_message().unwrap());
        match &mut request {
            TransactionRequest::JarStore(r) => r.signature = signature,
            TransactionRequest::ConstructorCall(r) => r.signature = signature,
            TransactionRequest::InstanceMethodCall(r) => r.signature = signature,
            TransactionRequest::StaticMethodCall(r) => r.signature = signature,
            TransactionRequest::JarStoreInitial(_) | TransactionRequest::GameteCreation(_) => {}
        }
        request
    }

    pub fn constructor_request(&self, caller: CallerData) -> ConstructorCallTransactionRequest {
        match self.sign(ConstructorCallTransactionRequest {
            caller,
            constructor: counter_constructor(),
            actuals: vec![],
            signature: vec![],
        }) {
            TransactionRequest::ConstructorCall(r) => r,
            other => panic!("unexpected {:?}", other),
        }
    }

    pub fn method_request(
        &self,
        caller: CallerData,
        receiver: StorageReference,
        method: MethodSignature,
        actuals: Vec<StorageValue>,
    ) -> InstanceMethodCallTransactionRequest {
        match self.sign(InstanceMethodCallTransactionRequest {
            caller,
            method,
            receiver,
            actuals,
            signature: vec![],
        }) {
            TransactionRequest::InstanceMethodCall(r) => r,
            other => panic!("unexpected {:?}", other),
        }
    }

    /// Creates a counter and returns its reference
    pub fn new_counter(&mut self) -> StorageReference {
        let request = self.constructor_request(self.caller());
        let counter = self
            .node
            .add_constructor_call_transaction(request)
            .unwrap()
            .returned()
            .unwrap();
        self.committed();
        counter
    }

    /// Adds a signed instance method call of the gamete
    pub fn call(
        &mut self,
        receiver: StorageReference,
        method: MethodSignature,
        actuals: Vec<StorageValue>,
    ) -> Result<crate::node::ContractOutcome<Option<StorageValue>>, crate::node::TransactionError> {
        let request = self.method_request(self.caller(), receiver, method, actuals);
        let outcome = self.node.add_instance_method_call_transaction(request);
        if !matches!(outcome, Err(crate::node::TransactionError::Rejected(_))) {
            self.committed();
        }
        outcome
    }

    /// Runs a view call without committing
    pub fn read(&self, receiver: StorageReference, method: MethodSignature) -> Option<StorageValue> {
        let request = InstanceMethodCallTransactionRequest {
            caller: self.caller(),
            method,
            receiver,
            actuals: vec![],
            signature: vec![],
        };
        self.node
            .run_instance_method_call_transaction(request)
            .unwrap()
            .returned()
            .unwrap()
    }

    pub fn response_at(&self, reference: TransactionReference) -> TransactionResponse {
        self.store.response_at(reference).unwrap()
    }

    pub fn balance_of(&self, object: &StorageReference) -> BigInt {
        self.node
            .state_of(object)
            .unwrap()
            .iter()
            .find_map(|update| match update {
                Update::OfBigInteger { field, value, .. } if *field == FieldSignature::balance() => {
                    Some(value.clone())
                }
                _ => None,
            })
            .unwrap_or_default()
    }
}
