// Contexte d'exécution - État explicite d'une transaction en cours
use super::classloader::ClassLoader;
use super::deserializer::Deserializer;
use super::gas::GasMeter;
use super::runtime::{FieldState, Heap, ObjectId, RuntimeObject, RuntimeValue, Slot};
use super::{EngineFault, Throw};
use crate::code::registry::{CodeRegistry, Frame};
use crate::config::ConsensusConfig;
use crate::storage::ChainStore;
use crate::types::{
    ConstructorSignature, FieldSignature, MethodSignature, StorageReference, StorageType,
    StorageValue, TransactionReference,
};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// Everything a running transaction can see and touch. Created for one
/// transaction and threaded through every call it makes.
pub struct ExecutionContext<'a> {
    config: &'a ConsensusConfig,
    registry: &'a CodeRegistry,
    loader: ClassLoader,
    current: TransactionReference,
    gas: GasMeter,
    heap: Heap,
    deserializer: Deserializer<'a>,
    events: Vec<ObjectId>,
    next_progressive: u64,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        store: &'a dyn ChainStore,
        config: &'a ConsensusConfig,
        registry: &'a CodeRegistry,
        loader: ClassLoader,
        current: TransactionReference,
        gas: GasMeter,
    ) -> Self {
        Self {
            config,
            registry,
            loader,
            current,
            gas,
            heap: Heap::new(),
            deserializer: Deserializer::new(store, current, config.gas_cost_model.response_read),
            events: Vec::new(),
            next_progressive: 0,
        }
    }

    /// Position the transaction will be committed at
    pub fn current(&self) -> TransactionReference {
        self.current
    }

    pub fn config(&self) -> &ConsensusConfig {
        self.config
    }

    pub fn loader(&self) -> &ClassLoader {
        &self.loader
    }

    pub fn gas(&self) -> &GasMeter {
        &self.gas
    }

    pub(crate) fn gas_mut(&mut self) -> &mut GasMeter {
        &mut self.gas
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn events(&self) -> &[ObjectId] {
        &self.events
    }

    // =========================================================================
    // Gas
    // =========================================================================

    pub fn charge_cpu(&mut self, amount: u64) -> Result<(), Throw> {
        Ok(self.gas.charge_cpu(amount)?)
    }

    pub fn charge_ram(&mut self, amount: u64) -> Result<(), Throw> {
        Ok(self.gas.charge_ram(amount)?)
    }

    /// Runs `body` with at most `amount` gas, taken from the current budget
    pub fn with_gas<T, F>(&mut self, amount: u64, body: F) -> Result<T, Throw>
    where
        F: FnOnce(&mut Self) -> Result<T, Throw>,
    {
        self.gas.enter_budget(amount)?;
        let result = body(self);
        self.gas.leave_budget();
        result
    }

    // =========================================================================
    // Objects
    // =========================================================================

    fn object(&self, id: ObjectId) -> Result<&RuntimeObject, Throw> {
        self.heap
            .get(id)
            .ok_or_else(|| EngineFault::IllegalArgument(format!("unknown object {}", id)).into())
    }

    pub fn reference_of(&self, id: ObjectId) -> Result<StorageReference, Throw> {
        Ok(self.object(id)?.reference)
    }

    pub fn class_of(&self, id: ObjectId) -> Result<&str, Throw> {
        Ok(self.object(id)?.class_name.as_str())
    }

    /// Heap object of a stored reference
    pub fn deserialize_reference(&mut self, reference: StorageReference) -> Result<ObjectId, EngineFault> {
        Ok(self
            .deserializer
            .deserialize(reference, &self.loader, &mut self.heap, &mut self.gas)?)
    }

    pub fn deserialize(&mut self, value: &StorageValue) -> Result<RuntimeValue, Throw> {
        match value {
            StorageValue::Reference(reference) => {
                Ok(RuntimeValue::Object(self.deserialize_reference(*reference)?))
            }
            scalar => RuntimeValue::from_scalar(scalar)
                .ok_or_else(|| EngineFault::IllegalArgument(format!("illegal value {}", scalar)).into()),
        }
    }

    pub fn serialize(&self, value: &RuntimeValue) -> Result<StorageValue, Throw> {
        self.heap
            .to_storage(value)
            .ok_or_else(|| EngineFault::IllegalArgument(format!("unknown object in {:?}", value)).into())
    }

    /// Fresh object of a storage class, with reference `current/progressive`
    fn allocate(&mut self, class_name: &str) -> Result<ObjectId, Throw> {
        if !self.loader.is_storage(class_name) {
            return Err(EngineFault::IllegalArgument(format!(
                "{} is not a storage class",
                class_name
            ))
            .into());
        }
        let jar = self
            .loader
            .jar_of(class_name)
            .ok_or_else(|| EngineFault::NoSuchMember(class_name.to_string()))?;
        let fields = self.loader.fields_of(class_name);
        self.gas
            .charge_ram(self.config.gas_cost_model.ram_for_object(fields.len()))?;

        let mut states = Vec::with_capacity(fields.len());
        for field in fields {
            let initial = field
                .initial_value
                .unwrap_or_else(|| StorageValue::default_for(&field.signature.field_type));
            let current = RuntimeValue::from_scalar(&initial).ok_or_else(|| {
                EngineFault::IllegalArgument(format!("initial value of {}", field.signature))
            })?;
            states.push(FieldState {
                signature: field.signature,
                eager: field.eager,
                is_final: field.is_final,
                slot: Slot::Loaded { old: None, current },
            });
        }

        let reference = StorageReference::new(self.current, self.next_progressive);
        self.next_progressive += 1;
        Ok(self.heap.allocate(RuntimeObject {
            reference,
            class_name: class_name.to_string(),
            jar,
            in_storage: false,
            fields: states,
        }))
    }

    // =========================================================================
    // Fields
    // =========================================================================

    fn no_such_field(&self, id: ObjectId, field: &FieldSignature) -> Throw {
        EngineFault::NoSuchMember(format!("field {} of {}", field, id)).into()
    }

    pub fn get_field(&mut self, id: ObjectId, field: &FieldSignature) -> Result<RuntimeValue, Throw> {
        self.gas.charge_cpu(self.config.gas_cost_model.field_read)?;
        let slot = self
            .object(id)?
            .field(field)
            .map(|state| state.slot.clone())
            .ok_or_else(|| self.no_such_field(id, field))?;

        match slot {
            Slot::Loaded { current, .. } => Ok(current),
            Slot::Unloaded => Ok(self.deserializer.load_lazy(
                id,
                field,
                &self.loader,
                &mut self.heap,
                &mut self.gas,
            )?),
        }
    }

    /// Assigns a field. Final fields can only be assigned in objects created
    /// by the running transaction.
    pub fn set_field(
        &mut self,
        id: ObjectId,
        field: &FieldSignature,
        value: RuntimeValue,
    ) -> Result<(), Throw> {
        self.gas.charge_cpu(self.config.gas_cost_model.field_write)?;
        if !self.loader.accepts(&field.field_type, &value, &self.heap) {
            return Err(EngineFault::IllegalArgument(format!(
                "{:?} cannot be assigned to {}",
                value, field
            ))
            .into());
        }

        let in_storage = self.object(id)?.in_storage;
        let state = self
            .heap
            .get_mut(id)
            .and_then(|object| object.field_mut(field))
            .ok_or_else(|| EngineFault::NoSuchMember(format!("field {} of {}", field, id)))?;
        if state.is_final && in_storage {
            return Err(Throw::runtime(
                "IllegalAccessError",
                format!("final field {} cannot be modified", field),
            ));
        }
        state.slot = match std::mem::replace(&mut state.slot, Slot::Unloaded) {
            Slot::Unloaded => Slot::Loaded { old: None, current: value },
            Slot::Loaded { old, .. } => Slot::Loaded { old, current: value },
        };
        Ok(())
    }

    fn field_signature(&self, id: ObjectId, class_name: &str, name: &str) -> Result<FieldSignature, Throw> {
        self.object(id)?
            .field_named(class_name, name)
            .map(|state| state.signature.clone())
            .ok_or_else(|| {
                EngineFault::NoSuchMember(format!("field {}.{} of {}", class_name, name, id)).into()
            })
    }

    /// Reads field `name` declared by `class_name`
    pub fn get(&mut self, id: ObjectId, class_name: &str, name: &str) -> Result<RuntimeValue, Throw> {
        let field = self.field_signature(id, class_name, name)?;
        self.get_field(id, &field)
    }

    pub fn set(
        &mut self,
        id: ObjectId,
        class_name: &str,
        name: &str,
        value: RuntimeValue,
    ) -> Result<(), Throw> {
        let field = self.field_signature(id, class_name, name)?;
        self.set_field(id, &field, value)
    }

    /// Field value without gas, for the engine's own bookkeeping
    pub(crate) fn peek(&mut self, id: ObjectId, field: &FieldSignature) -> Result<RuntimeValue, EngineFault> {
        let slot = self
            .heap
            .get(id)
            .and_then(|object| object.field(field))
            .map(|state| state.slot.clone())
            .ok_or_else(|| EngineFault::NoSuchMember(format!("field {} of {}", field, id)))?;
        match slot {
            Slot::Loaded { current, .. } => Ok(current),
            Slot::Unloaded => Ok(self.deserializer.load_lazy(
                id,
                field,
                &self.loader,
                &mut self.heap,
                &mut self.gas,
            )?),
        }
    }

    pub(crate) fn poke(&mut self, id: ObjectId, field: &FieldSignature, value: RuntimeValue) -> Result<(), EngineFault> {
        let state = self
            .heap
            .get_mut(id)
            .and_then(|object| object.field_mut(field))
            .ok_or_else(|| EngineFault::NoSuchMember(format!("field {} of {}", field, id)))?;
        state.slot = match std::mem::replace(&mut state.slot, Slot::Unloaded) {
            Slot::Unloaded => Slot::Loaded { old: None, current: value },
            Slot::Loaded { old, .. } => Slot::Loaded { old, current: value },
        };
        Ok(())
    }

    // =========================================================================
    // Coins
    // =========================================================================

    pub fn balance_of(&mut self, contract: ObjectId) -> Result<BigInt, Throw> {
        match self.get_field(contract, &FieldSignature::balance())? {
            RuntimeValue::BigInteger(balance) => Ok(balance),
            RuntimeValue::Null => Ok(BigInt::zero()),
            other => Err(EngineFault::IllegalArgument(format!("balance {:?}", other)).into()),
        }
    }

    /// Moves `amount` coins between two contracts
    pub fn transfer(&mut self, from: ObjectId, to: ObjectId, amount: &BigInt) -> Result<(), Throw> {
        if amount.is_negative() {
            return Err(Throw::runtime(
                "IllegalArgumentException",
                format!("cannot transfer a negative amount {}", amount),
            ));
        }
        for contract in [from, to] {
            if !self.loader.is_contract(self.class_of(contract)?) {
                return Err(EngineFault::IllegalArgument(format!(
                    "{} is not a contract",
                    contract
                ))
                .into());
            }
        }

        let available = self.balance_of(from)?;
        if available < *amount {
            return Err(Throw::runtime(
                "InsufficientFundsError",
                format!("{} needed, {} available", amount, available),
            ));
        }
        if from == to {
            return Ok(());
        }

        let credited = self.balance_of(to)? + amount;
        self.set_field(from, &FieldSignature::balance(), RuntimeValue::BigInteger(available - amount))?;
        self.set_field(to, &FieldSignature::balance(), RuntimeValue::BigInteger(credited))
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn emit(&mut self, event: ObjectId) -> Result<(), Throw> {
        if !self.loader.is_event(self.class_of(event)?) {
            return Err(EngineFault::IllegalArgument(format!("{} is not an event", event)).into());
        }
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        Ok(())
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn check_actuals(&self, formals: &[StorageType], actuals: &[RuntimeValue], member: &str) -> Result<(), Throw> {
        let matches = formals.len() == actuals.len()
            && formals
                .iter()
                .zip(actuals)
                .all(|(formal, actual)| self.loader.accepts(formal, actual, &self.heap));
        if matches {
            Ok(())
        } else {
            Err(EngineFault::IllegalArgument(format!("actuals of {} do not match its formals", member)).into())
        }
    }

    /// Amount moved by payable code: its first actual
    fn payment(actuals: &[RuntimeValue]) -> Result<BigInt, Throw> {
        match actuals.first() {
            Some(RuntimeValue::Int(v)) => Ok(BigInt::from(*v)),
            Some(RuntimeValue::Long(v)) => Ok(BigInt::from(*v)),
            Some(RuntimeValue::BigInteger(v)) => Ok(v.clone()),
            _ => Err(EngineFault::IllegalArgument("payable code without amount".into()).into()),
        }
    }

    fn required_caller(caller: Option<ObjectId>, member: &str) -> Result<ObjectId, Throw> {
        caller.ok_or_else(|| EngineFault::IllegalArgument(format!("entry {} called without a caller", member)).into())
    }

    /// Creates an object by running one of its constructors
    pub fn construct(
        &mut self,
        constructor: &ConstructorSignature,
        actuals: Vec<RuntimeValue>,
        caller: Option<ObjectId>,
    ) -> Result<ObjectId, Throw> {
        self.gas.charge_cpu(self.config.gas_cost_model.method_call)?;
        let class_name = constructor.defining_class.name();
        let flags = self
            .loader
            .constructor(class_name, &constructor.formals)
            .map(|c| c.flags)
            .ok_or_else(|| EngineFault::NoSuchMember(constructor.to_string()))?;
        let body = self
            .registry
            .constructor(constructor)
            .ok_or_else(|| EngineFault::NoSuchMember(constructor.to_string()))?;
        self.check_actuals(&constructor.formals, &actuals, &constructor.to_string())?;

        let this = self.allocate(class_name)?;
        let caller = if flags.entry {
            Some(Self::required_caller(caller, &constructor.to_string())?)
        } else {
            None
        };
        if flags.payable {
            let amount = Self::payment(&actuals)?;
            self.transfer(Self::required_caller(caller, &constructor.to_string())?, this, &amount)?;
        }

        let frame = Frame {
            this: Some(this),
            caller,
            args: actuals,
        };
        body(self, &frame).map_err(|t| t.at(|| constructor.to_string()))?;
        Ok(this)
    }

    /// Runs the constructor of a superclass over an object under construction
    pub fn super_constructor(
        &mut self,
        constructor: &ConstructorSignature,
        this: ObjectId,
        actuals: Vec<RuntimeValue>,
        caller: Option<ObjectId>,
    ) -> Result<(), Throw> {
        self.gas.charge_cpu(self.config.gas_cost_model.method_call)?;
        let class_name = constructor.defining_class.name();
        if self.object(this)?.in_storage || !self.loader.is_subclass_of(self.class_of(this)?, class_name) {
            return Err(EngineFault::IllegalArgument(format!(
                "{} cannot initialize {}",
                constructor, this
            ))
            .into());
        }
        let flags = self
            .loader
            .constructor(class_name, &constructor.formals)
            .map(|c| c.flags)
            .ok_or_else(|| EngineFault::NoSuchMember(constructor.to_string()))?;
        let body = self
            .registry
            .constructor(constructor)
            .ok_or_else(|| EngineFault::NoSuchMember(constructor.to_string()))?;
        self.check_actuals(&constructor.formals, &actuals, &constructor.to_string())?;

        let frame = Frame {
            this: Some(this),
            caller: if flags.entry { caller } else { None },
            args: actuals,
        };
        body(self, &frame).map_err(|t| t.at(|| constructor.to_string()))?;
        Ok(())
    }

    /// Calls an instance method, dispatched on the class of `receiver`
    pub fn call(
        &mut self,
        receiver: ObjectId,
        method: &MethodSignature,
        actuals: Vec<RuntimeValue>,
        caller: Option<ObjectId>,
    ) -> Result<RuntimeValue, Throw> {
        self.gas.charge_cpu(self.config.gas_cost_model.method_call)?;
        let receiver_class = self.class_of(receiver)?.to_string();
        if !self
            .loader
            .is_subclass_of(&receiver_class, method.defining_class.name())
        {
            return Err(EngineFault::NoSuchMember(format!("{} on {}", method, receiver_class)).into());
        }
        let (implementation, flags) = self
            .loader
            .resolve_method(&receiver_class, method)
            .filter(|(_, definition)| !definition.is_static)
            .map(|(signature, definition)| (signature, definition.flags))
            .ok_or_else(|| EngineFault::NoSuchMember(method.to_string()))?;
        let body = self
            .registry
            .method(&implementation)
            .ok_or_else(|| EngineFault::NoSuchMember(implementation.to_string()))?;
        self.check_actuals(&method.formals, &actuals, &method.to_string())?;

        let caller = if flags.entry {
            Some(Self::required_caller(caller, &method.to_string())?)
        } else {
            None
        };
        if flags.payable {
            let amount = Self::payment(&actuals)?;
            self.transfer(Self::required_caller(caller, &method.to_string())?, receiver, &amount)?;
        }

        let frame = Frame {
            this: Some(receiver),
            caller,
            args: actuals,
        };
        let result = body(self, &frame).map_err(|t| t.at(|| implementation.to_string()))?;
        self.check_result(method, result)
    }

    pub fn call_static(
        &mut self,
        method: &MethodSignature,
        actuals: Vec<RuntimeValue>,
        caller: Option<ObjectId>,
    ) -> Result<RuntimeValue, Throw> {
        self.gas.charge_cpu(self.config.gas_cost_model.method_call)?;
        let flags = self
            .loader
            .class(method.defining_class.name())
            .and_then(|class| class.declared_method(method))
            .filter(|definition| definition.is_static)
            .map(|definition| definition.flags)
            .ok_or_else(|| EngineFault::NoSuchMember(method.to_string()))?;
        let body = self
            .registry
            .method(method)
            .ok_or_else(|| EngineFault::NoSuchMember(method.to_string()))?;
        self.check_actuals(&method.formals, &actuals, &method.to_string())?;

        let frame = Frame {
            this: None,
            caller: if flags.entry {
                Some(Self::required_caller(caller, &method.to_string())?)
            } else {
                None
            },
            args: actuals,
        };
        let result = body(self, &frame).map_err(|t| t.at(|| method.to_string()))?;
        self.check_result(method, result)
    }

    fn check_result(&self, method: &MethodSignature, result: RuntimeValue) -> Result<RuntimeValue, Throw> {
        match &method.returns {
            None => Ok(RuntimeValue::Null),
            Some(returns) if self.loader.accepts(returns, &result, &self.heap) => Ok(result),
            Some(_) => Err(EngineFault::IllegalArgument(format!(
                "{} returned {:?}",
                method, result
            ))
            .into()),
        }
    }
}
