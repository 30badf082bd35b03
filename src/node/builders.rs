// Builders - Exécution d'une requête et construction de sa réponse
//
// A paid request goes through: rejection checks, payment of the whole gas
// limit, execution of the called code, then classification of its ending
// into a successful, exception or failed response. Nothing here commits.
use super::{Node, TransactionError};
use crate::code::{verify_jar, JarManifest, MemberFlags, VerificationError};
use crate::codec;
use crate::config::ConsensusConfig;
use crate::execution::{
    extract_updates, ClassLoader, ContractException, EngineFault, ExecutionContext, GasError,
    GasMeter, ObjectId, RuntimeValue, Throw,
};
use crate::types::*;
use num_bigint::BigInt;
use num_traits::Signed;
use tracing::{debug, info, warn};

/// Whether the transaction is meant to be committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Add,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseKind {
    JarStore,
    Constructor,
    Method,
}

/// What the called code produced, in heap terms
enum Completion {
    Jar(Vec<u8>),
    Created(ObjectId),
    Returned(RuntimeValue),
    Void,
}

/// Ending of the called code, in storage terms
enum Ending {
    Jar {
        verified_jar: Vec<u8>,
        dependencies: Vec<TransactionReference>,
    },
    Created(StorageReference),
    Returned(StorageValue),
    Void,
    Threw(ExceptionInfo),
}

/// A request whose caller has been checked and has paid the gas limit
struct Paid<'a> {
    ctx: ExecutionContext<'a>,
    caller: ObjectId,
    caller_reference: StorageReference,
    gas_limit: u64,
    gas_price: u64,
    /// Nonce increment and gas payment: the only effects of a failure
    failure_updates: Vec<Update>,
}

fn rejected(reason: impl Into<String>) -> TransactionError {
    let reason = reason.into();
    warn!("Rejected transaction: {}", reason);
    TransactionError::Rejected(reason)
}

fn truncate(message: &str, max_length: usize) -> String {
    message.chars().take(max_length).collect()
}

/// Gas needed to pay for a request and for a failed response
pub fn minimal_gas(config: &ConsensusConfig, request_size: u64) -> u64 {
    let costs = &config.gas_cost_model;
    let failed = TransactionResponse::MethodCallFailed {
        cause: FailureCause {
            class_name: String::new(),
            message: String::new(),
        },
        updates: Vec::new(),
        gas: GasConsumed::default(),
        penalty: 0,
    };
    costs
        .base_transaction
        .saturating_add(costs.per_request_byte.saturating_mul(request_size))
        .saturating_add(costs.storage_for(codec::size_of(&failed)))
}

fn big_integer_field(
    ctx: &mut ExecutionContext<'_>,
    object: ObjectId,
    field: &FieldSignature,
) -> Result<BigInt, EngineFault> {
    match ctx.peek(object, field)? {
        RuntimeValue::BigInteger(value) => Ok(value),
        other => Err(EngineFault::IllegalArgument(format!("{} holds {:?}", field, other))),
    }
}

fn cost_of(gas: u64, gas_price: u64) -> BigInt {
    BigInt::from(gas) * BigInt::from(gas_price)
}

// =============================================================================
// INITIAL TRANSACTIONS
// =============================================================================

pub(crate) fn jar_store_initial(
    node: &Node,
    current: TransactionReference,
    request: &JarStoreInitialTransactionRequest,
) -> Result<TransactionResponse, TransactionError> {
    let version = node.config.verification_version;
    let loader = ClassLoader::new(node.store.as_ref(), &request.dependencies, version)
        .map_err(|e| rejected(e.to_string()))?;
    let manifest = JarManifest::from_bytes(&request.jar)
        .map_err(|e| rejected(VerificationError::Malformed(e.to_string()).to_string()))?;
    let verified_jar = verify_jar(&manifest, &loader, &node.registry, current)
        .map_err(|e| rejected(e.to_string()))?;

    info!(
        "Initial jar verified at {}: {} classes",
        current,
        manifest.classes.len()
    );
    Ok(TransactionResponse::JarStoreInitial {
        verified_jar,
        dependencies: request.dependencies.clone(),
        verification_version: version,
    })
}

pub(crate) fn gamete_creation(
    node: &Node,
    current: TransactionReference,
    request: &GameteCreationTransactionRequest,
) -> Result<(TransactionResponse, StorageReference), TransactionError> {
    if request.initial_amount.is_negative() {
        return Err(rejected("the gamete cannot start with a negative balance"));
    }
    let loader = ClassLoader::new(
        node.store.as_ref(),
        &[request.classpath],
        node.config.verification_version,
    )
    .map_err(|e| rejected(e.to_string()))?;

    let mut ctx = ExecutionContext::new(
        node.store.as_ref(),
        &node.config,
        &node.registry,
        loader,
        current,
        GasMeter::unmetered(),
    );
    let fault = |throw: Throw| rejected(throw.into_fault().to_string());
    let gamete = ctx
        .construct(
            &ConstructorSignature::new(classes::EOA, vec![StorageType::string()]),
            vec![RuntimeValue::String(request.public_key.clone())],
            None,
        )
        .map_err(fault)?;
    ctx.set_field(
        gamete,
        &FieldSignature::balance(),
        RuntimeValue::BigInteger(request.initial_amount.clone()),
    )
    .map_err(fault)?;
    let reference = ctx.reference_of(gamete).map_err(fault)?;

    let updates = extract_updates(ctx.heap(), &[gamete]).into_iter().collect();
    info!("Gamete {} created with {} coins", reference, request.initial_amount);
    Ok((TransactionResponse::GameteCreation { updates, gamete: reference }, reference))
}

// =============================================================================
// PAID TRANSACTIONS
// =============================================================================

/// Checks a paid request and makes its caller pay for the whole gas limit
fn prepare<'a>(
    node: &'a Node,
    current: TransactionReference,
    request: &TransactionRequest,
    mode: Mode,
) -> Result<Paid<'a>, TransactionError> {
    let data = request
        .caller_data()
        .ok_or_else(|| rejected(format!("{} request has no caller", request.kind())))?;
    let config = &node.config;

    if mode == Mode::Add {
        if data.chain_id != config.chain_id {
            return Err(rejected(format!("incorrect chain id {:?}", data.chain_id)));
        }
        if data.gas_price < config.min_gas_price {
            return Err(rejected(format!(
                "gas price {} is below the minimum {}",
                data.gas_price, config.min_gas_price
            )));
        }
    }

    let size = request.size().map_err(|e| rejected(e.to_string()))?;
    let minimal = minimal_gas(config, size);
    if data.gas_limit < minimal {
        return Err(rejected(format!(
            "gas limit {} is below the minimum {}",
            data.gas_limit, minimal
        )));
    }
    if data.gas_limit > config.max_gas_per_transaction {
        return Err(rejected(format!(
            "gas limit {} exceeds the maximum {}",
            data.gas_limit, config.max_gas_per_transaction
        )));
    }

    let loader = ClassLoader::new(
        node.store.as_ref(),
        &[data.classpath],
        config.verification_version,
    )
    .map_err(|e| rejected(format!("classpath {}: {}", data.classpath, e)))?;
    let mut ctx = ExecutionContext::new(
        node.store.as_ref(),
        config,
        &node.registry,
        loader,
        current,
        GasMeter::new(data.gas_limit),
    );

    let caller = ctx
        .deserialize_reference(data.caller)
        .map_err(|e| rejected(format!("caller {}: {}", data.caller, e)))?;
    let is_eoa = ctx
        .class_of(caller)
        .map(|class| ctx.loader().is_eoa(class))
        .unwrap_or(false);
    if !is_eoa {
        return Err(rejected(format!(
            "caller {} is not an externally owned account",
            data.caller
        )));
    }

    let nonce_field = FieldSignature::eoa_nonce();
    let nonce = big_integer_field(&mut ctx, caller, &nonce_field).map_err(|e| rejected(e.to_string()))?;
    if mode == Mode::Add {
        let public_key = match ctx.peek(caller, &FieldSignature::eoa_public_key()) {
            Ok(RuntimeValue::String(key)) => key,
            _ => return Err(rejected("caller has no public key")),
        };
        let message = request.signing_message().map_err(|e| rejected(e.to_string()))?;
        let signature = request.signature().unwrap_or(&[]);
        if !node.verifier.verify(&public_key, &message, signature) {
            return Err(rejected("invalid request signature"));
        }
        if nonce != data.nonce {
            return Err(rejected(format!(
                "incorrect nonce: the request reports {} but the account contains {}",
                data.nonce, nonce
            )));
        }
    }

    let balance_field = FieldSignature::balance();
    let balance =
        big_integer_field(&mut ctx, caller, &balance_field).map_err(|e| rejected(e.to_string()))?;
    let payment = cost_of(data.gas_limit, data.gas_price);
    if balance < payment {
        return Err(rejected(format!(
            "the caller cannot pay for {} units of gas: balance {}",
            data.gas_limit, balance
        )));
    }

    if mode == Mode::Add {
        ctx.poke(caller, &nonce_field, RuntimeValue::BigInteger(nonce + 1))
            .map_err(|e| rejected(e.to_string()))?;
    }

    let jars = ctx.loader().jar_count() as u64;
    charge_request(ctx.gas_mut(), config, size, jars).map_err(|e| rejected(e.to_string()))?;

    ctx.poke(caller, &balance_field, RuntimeValue::BigInteger(balance - payment))
        .map_err(|e| rejected(e.to_string()))?;
    let failure_updates = extract_updates(ctx.heap(), &[caller]).into_iter().collect();

    debug!("Caller {} paid for {} gas", data.caller, data.gas_limit);
    Ok(Paid {
        ctx,
        caller,
        caller_reference: data.caller,
        gas_limit: data.gas_limit,
        gas_price: data.gas_price,
        failure_updates,
    })
}

/// Base cost, storage of the request and reads of the classpath jars
fn charge_request(
    gas: &mut GasMeter,
    config: &ConsensusConfig,
    request_size: u64,
    jars: u64,
) -> Result<(), GasError> {
    let costs = &config.gas_cost_model;
    gas.charge_cpu(costs.base_transaction)?;
    gas.charge_storage(costs.per_request_byte.saturating_mul(request_size))?;
    gas.charge_cpu(costs.response_read.saturating_mul(jars))
}

fn deserialize_actuals(
    ctx: &mut ExecutionContext<'_>,
    actuals: &[StorageValue],
    roots: &mut Vec<ObjectId>,
) -> Result<Vec<RuntimeValue>, Throw> {
    actuals
        .iter()
        .map(|actual| {
            let value = ctx.deserialize(actual)?;
            if let RuntimeValue::Object(id) = value {
                roots.push(id);
            }
            Ok(value)
        })
        .collect()
}

/// Runs the called code of a paid request and classifies its ending
fn execute<'a, F>(
    mut paid: Paid<'a>,
    kind: ResponseKind,
    flags: MemberFlags,
    view_check: bool,
    member: String,
    body: F,
) -> TransactionResponse
where
    F: FnOnce(&mut ExecutionContext<'a>, ObjectId, &mut Vec<ObjectId>) -> Result<Completion, Throw>,
{
    let caller = paid.caller;
    let mut roots = vec![caller];
    let outcome = body(&mut paid.ctx, caller, &mut roots);
    let max_error_length = paid.ctx.config().max_error_length;

    let ending = match outcome {
        Ok(completion) => match to_ending(&paid.ctx, completion, &mut roots) {
            Ok(ending) => ending,
            Err(fault) => return failed(paid, kind, fault),
        },
        Err(Throw::Checked(ContractException {
            class_name,
            message,
            call_site,
        })) if flags.throws_exceptions => Ending::Threw(ExceptionInfo {
            class_name,
            message: truncate(&message, max_error_length),
            call_site: call_site.unwrap_or_else(|| member.clone()),
        }),
        Err(throw) => return failed(paid, kind, throw.into_fault()),
    };

    roots.extend_from_slice(paid.ctx.events());
    let updates: Vec<Update> = extract_updates(paid.ctx.heap(), &roots).into_iter().collect();
    if view_check && has_side_effects(&updates, &paid.caller_reference) {
        return failed(paid, kind, EngineFault::SideEffectsInViewMethod(member));
    }

    let events = match event_references(&paid.ctx) {
        Ok(events) => events,
        Err(fault) => return failed(paid, kind, fault),
    };
    let version = paid.ctx.config().verification_version;
    let provisional = build(kind, &ending, version, updates, events.clone(), paid.ctx.gas().consumed());
    let storage = paid
        .ctx
        .config()
        .gas_cost_model
        .storage_for(codec::size_of(&provisional));
    if let Err(e) = paid.ctx.gas_mut().charge_storage(storage) {
        return failed(paid, kind, e.into());
    }
    if let Err(fault) = refund(&mut paid) {
        return failed(paid, kind, fault);
    }

    let updates = extract_updates(paid.ctx.heap(), &roots).into_iter().collect();
    let response = build(kind, &ending, version, updates, events, paid.ctx.gas().consumed());
    debug!("{} built for {}", response.kind(), member);
    response
}

fn to_ending(
    ctx: &ExecutionContext<'_>,
    completion: Completion,
    roots: &mut Vec<ObjectId>,
) -> Result<Ending, EngineFault> {
    let ending = match completion {
        Completion::Jar(verified_jar) => Ending::Jar {
            verified_jar,
            dependencies: Vec::new(),
        },
        Completion::Created(id) => {
            roots.push(id);
            Ending::Created(ctx.reference_of(id).map_err(Throw::into_fault)?)
        }
        Completion::Returned(value) => {
            if let RuntimeValue::Object(id) = value {
                roots.push(id);
            }
            Ending::Returned(ctx.serialize(&value).map_err(Throw::into_fault)?)
        }
        Completion::Void => Ending::Void,
    };
    Ok(ending)
}

fn event_references(ctx: &ExecutionContext<'_>) -> Result<Vec<StorageReference>, EngineFault> {
    ctx.events()
        .iter()
        .map(|event| ctx.reference_of(*event).map_err(Throw::into_fault))
        .collect()
}

/// True if the updates touch anything but the balance and nonce of the caller
fn has_side_effects(updates: &[Update], caller: &StorageReference) -> bool {
    let balance = FieldSignature::balance();
    let nonce = FieldSignature::eoa_nonce();
    updates.iter().any(|update| {
        update.object() != *caller
            || !matches!(update.field(), Some(field) if *field == balance || *field == nonce)
    })
}

/// Gives the caller back the price of the gas it did not use
fn refund(paid: &mut Paid<'_>) -> Result<(), EngineFault> {
    let unused = paid.ctx.gas().unused();
    if unused == 0 {
        return Ok(());
    }
    let field = FieldSignature::balance();
    let balance = big_integer_field(&mut paid.ctx, paid.caller, &field)?;
    let refund = cost_of(unused, paid.gas_price);
    paid.ctx
        .poke(paid.caller, &field, RuntimeValue::BigInteger(balance + refund))
}

fn build(
    kind: ResponseKind,
    ending: &Ending,
    verification_version: u8,
    updates: Vec<Update>,
    events: Vec<StorageReference>,
    gas: GasConsumed,
) -> TransactionResponse {
    match ending {
        Ending::Jar {
            verified_jar,
            dependencies,
        } => TransactionResponse::JarStoreSuccessful {
            verified_jar: verified_jar.clone(),
            dependencies: dependencies.clone(),
            verification_version,
            updates,
            gas,
        },
        Ending::Created(new_object) => TransactionResponse::ConstructorCallSuccessful {
            new_object: *new_object,
            updates,
            events,
            gas,
        },
        Ending::Returned(result) => TransactionResponse::MethodCallSuccessful {
            result: result.clone(),
            updates,
            events,
            gas,
        },
        Ending::Void => TransactionResponse::VoidMethodCallSuccessful {
            updates,
            events,
            gas,
        },
        Ending::Threw(exception) => match kind {
            ResponseKind::Constructor => TransactionResponse::ConstructorCallException {
                exception: exception.clone(),
                updates,
                events,
                gas,
            },
            ResponseKind::Method | ResponseKind::JarStore => TransactionResponse::MethodCallException {
                exception: exception.clone(),
                updates,
                events,
                gas,
            },
        },
    }
}

fn failed(paid: Paid<'_>, kind: ResponseKind, fault: EngineFault) -> TransactionResponse {
    let mut cause = fault.cause();
    cause.message = truncate(&cause.message, paid.ctx.config().max_error_length);
    warn!("Transaction failed: {}", cause);

    let gas = paid.ctx.gas().consumed();
    let penalty = paid.ctx.gas().penalty(paid.gas_limit);
    let updates = paid.failure_updates;
    match kind {
        ResponseKind::JarStore => TransactionResponse::JarStoreFailed {
            cause,
            updates,
            gas,
            penalty,
        },
        ResponseKind::Constructor => TransactionResponse::ConstructorCallFailed {
            cause,
            updates,
            gas,
            penalty,
        },
        ResponseKind::Method => TransactionResponse::MethodCallFailed {
            cause,
            updates,
            gas,
            penalty,
        },
    }
}

pub(crate) fn jar_store(
    node: &Node,
    current: TransactionReference,
    request: &JarStoreTransactionRequest,
) -> Result<TransactionResponse, TransactionError> {
    let wrapped = TransactionRequest::JarStore(request.clone());
    let paid = prepare(node, current, &wrapped, Mode::Add)?;

    let response = execute(
        paid,
        ResponseKind::JarStore,
        MemberFlags::default(),
        false,
        format!("jar store at {}", current),
        |ctx, _, _| {
            let costs = ctx.config().gas_cost_model.clone();
            let bytes = request.jar.len() as u64;
            ctx.charge_cpu(costs.jar_cpu_byte.saturating_mul(bytes))?;
            ctx.charge_ram(costs.jar_ram_byte.saturating_mul(bytes))?;

            let manifest = JarManifest::from_bytes(&request.jar)
                .map_err(|e| VerificationError::Malformed(e.to_string()))?;
            let loader = ClassLoader::new(
                node.store.as_ref(),
                &request.dependencies,
                ctx.config().verification_version,
            )?;
            let verified = verify_jar(&manifest, &loader, &node.registry, ctx.current())?;
            info!(
                "Jar verified at {}: {} classes",
                ctx.current(),
                manifest.classes.len()
            );
            Ok(Completion::Jar(verified))
        },
    );

    Ok(match response {
        TransactionResponse::JarStoreSuccessful {
            verified_jar,
            verification_version,
            updates,
            gas,
            ..
        } => TransactionResponse::JarStoreSuccessful {
            verified_jar,
            dependencies: request.dependencies.clone(),
            verification_version,
            updates,
            gas,
        },
        other => other,
    })
}

pub(crate) fn constructor_call(
    node: &Node,
    current: TransactionReference,
    request: &ConstructorCallTransactionRequest,
) -> Result<TransactionResponse, TransactionError> {
    let wrapped = TransactionRequest::ConstructorCall(request.clone());
    let paid = prepare(node, current, &wrapped, Mode::Add)?;
    let constructor = &request.constructor;
    let flags = paid
        .ctx
        .loader()
        .constructor(constructor.defining_class.name(), &constructor.formals)
        .map(|c| c.flags)
        .unwrap_or_default();

    Ok(execute(
        paid,
        ResponseKind::Constructor,
        flags,
        false,
        constructor.to_string(),
        |ctx, caller, roots| {
            let actuals = deserialize_actuals(ctx, &request.actuals, roots)?;
            let created = ctx.construct(constructor, actuals, Some(caller))?;
            Ok(Completion::Created(created))
        },
    ))
}

pub(crate) fn instance_method_call(
    node: &Node,
    current: TransactionReference,
    request: &InstanceMethodCallTransactionRequest,
    mode: Mode,
) -> Result<TransactionResponse, TransactionError> {
    let wrapped = TransactionRequest::InstanceMethodCall(request.clone());
    let paid = prepare(node, current, &wrapped, mode)?;
    let method = &request.method;
    let flags = paid
        .ctx
        .loader()
        .resolve_method(method.defining_class.name(), method)
        .map(|(_, definition)| definition.flags)
        .unwrap_or_default();

    Ok(execute(
        paid,
        ResponseKind::Method,
        flags,
        flags.view || mode == Mode::Run,
        method.to_string(),
        |ctx, caller, roots| {
            let receiver = ctx.deserialize_reference(request.receiver)?;
            roots.push(receiver);
            let actuals = deserialize_actuals(ctx, &request.actuals, roots)?;
            let result = ctx.call(receiver, method, actuals, Some(caller))?;
            Ok(if method.is_void() {
                Completion::Void
            } else {
                Completion::Returned(result)
            })
        },
    ))
}

pub(crate) fn static_method_call(
    node: &Node,
    current: TransactionReference,
    request: &StaticMethodCallTransactionRequest,
    mode: Mode,
) -> Result<TransactionResponse, TransactionError> {
    let wrapped = TransactionRequest::StaticMethodCall(request.clone());
    let paid = prepare(node, current, &wrapped, mode)?;
    let method = &request.method;
    let flags = paid
        .ctx
        .loader()
        .class(method.defining_class.name())
        .and_then(|class| class.declared_method(method))
        .map(|definition| definition.flags)
        .unwrap_or_default();

    Ok(execute(
        paid,
        ResponseKind::Method,
        flags,
        flags.view || mode == Mode::Run,
        method.to_string(),
        |ctx, caller, roots| {
            let actuals = deserialize_actuals(ctx, &request.actuals, roots)?;
            let result = ctx.call_static(method, actuals, Some(caller))?;
            Ok(if method.is_void() {
                Completion::Void
            } else {
                Completion::Returned(result)
            })
        },
    ))
}
