// Désérialiseur - Reconstruction des objets depuis le journal des mises à jour
//
// An object is never stored as a whole: its state at a position is the latest
// update of each field among the responses preceding that position, back to
// the response that created it.
use super::classloader::{ClassLoader, FieldInfo};
use super::gas::{GasError, GasMeter};
use super::runtime::{FieldState, Heap, ObjectId, RuntimeObject, RuntimeValue, Slot};
use crate::storage::{ChainStore, StoreError};
use crate::types::{
    FieldSignature, StorageReference, StorageValue, TransactionReference, TransactionResponse,
    Update,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Class tag of `object` in the response of the transaction that created it
pub fn class_tag_in(
    response: &TransactionResponse,
    object: &StorageReference,
) -> Option<(String, TransactionReference)> {
    response.updates()?.iter().find_map(|update| match update {
        Update::ClassTag {
            object: tagged,
            class_name,
            jar,
        } if tagged == object => Some((class_name.clone(), *jar)),
        _ => None,
    })
}

/// Per-transaction deserializer. The same reference always yields the same
/// heap object.
pub struct Deserializer<'a> {
    store: &'a dyn ChainStore,
    current: TransactionReference,
    response_read: u64,
    cache: HashMap<StorageReference, ObjectId>,
}

impl<'a> Deserializer<'a> {
    /// Deserializer for the state seen by the transaction running at `current`
    pub fn new(store: &'a dyn ChainStore, current: TransactionReference, response_read: u64) -> Self {
        Self {
            store,
            current,
            response_read,
            cache: HashMap::new(),
        }
    }

    pub fn current(&self) -> TransactionReference {
        self.current
    }

    fn read(
        &self,
        position: TransactionReference,
        gas: &mut GasMeter,
    ) -> Result<TransactionResponse, DeserializationError> {
        self.read_since(position.next(), position, gas)
    }

    /// Reads `position` after `previous`, charging the reads of every
    /// position in between: gas does not depend on the history index
    fn read_since(
        &self,
        previous: TransactionReference,
        position: TransactionReference,
        gas: &mut GasMeter,
    ) -> Result<TransactionResponse, DeserializationError> {
        let span = previous.number().saturating_sub(position.number()).max(1);
        gas.charge_cpu(self.response_read.saturating_mul(span))?;
        Ok(self.store.response_at(position)?)
    }

    /// Positions strictly between the creation of `object` and `current`,
    /// most recent first
    fn positions_after_creation(
        &self,
        object: &StorageReference,
    ) -> Result<Vec<TransactionReference>, DeserializationError> {
        let creation = object.transaction;
        match self.store.history_of(object)? {
            Some(history) => Ok(history
                .into_iter()
                .filter(|p| creation.is_older_than(p) && p.is_older_than(&self.current))
                .rev()
                .collect()),
            None => Ok((creation.number() + 1..self.current.number())
                .rev()
                .map(TransactionReference::new)
                .collect()),
        }
    }

    /// Class name and installing jar of an object
    pub fn class_tag_of(
        &self,
        object: &StorageReference,
        gas: &mut GasMeter,
    ) -> Result<(String, TransactionReference), DeserializationError> {
        self.check_visible(object)?;
        let creation = self.read(object.transaction, gas)?;
        Self::tag_from(&creation, object)
    }

    fn tag_from(
        creation: &TransactionResponse,
        object: &StorageReference,
    ) -> Result<(String, TransactionReference), DeserializationError> {
        if creation.updates().is_none() {
            return Err(DeserializationError::NoUpdates(object.transaction));
        }
        class_tag_in(creation, object).ok_or(DeserializationError::MissingClassTag(*object))
    }

    fn check_visible(&self, object: &StorageReference) -> Result<(), DeserializationError> {
        if object.transaction.is_older_than(&self.current) {
            Ok(())
        } else {
            Err(DeserializationError::NotYetCreated(*object))
        }
    }

    /// Heap object for `reference`, with its eager fields loaded
    pub fn deserialize(
        &mut self,
        reference: StorageReference,
        loader: &ClassLoader,
        heap: &mut Heap,
        gas: &mut GasMeter,
    ) -> Result<ObjectId, DeserializationError> {
        if let Some(id) = self.cache.get(&reference) {
            return Ok(*id);
        }

        self.check_visible(&reference)?;
        let creation = self.read(reference.transaction, gas)?;
        let (class_name, jar) = Self::tag_from(&creation, &reference)?;
        match loader.jar_of(&class_name) {
            Some(installed) if installed == jar => {}
            Some(installed) => {
                return Err(DeserializationError::JarMismatch {
                    class_name,
                    tagged: jar,
                    installed,
                })
            }
            None => return Err(DeserializationError::UnknownClass(class_name)),
        }

        let fields = loader.fields_of(&class_name);
        let mut eager = self.eager_values(&reference, &fields, &creation, gas)?;

        let mut states = Vec::with_capacity(fields.len());
        for field in fields {
            let slot = if field.eager {
                let value = eager
                    .remove(&field.signature)
                    .ok_or_else(|| DeserializationError::MissingEagerField {
                        object: reference,
                        field: field.signature.to_string(),
                    })?;
                let value = RuntimeValue::from_scalar(&value).ok_or_else(|| {
                    DeserializationError::IllegalValue {
                        object: reference,
                        field: field.signature.to_string(),
                    }
                })?;
                Slot::Loaded {
                    old: Some(value.clone()),
                    current: value,
                }
            } else {
                Slot::Unloaded
            };
            states.push(FieldState {
                signature: field.signature,
                eager: field.eager,
                is_final: field.is_final,
                slot,
            });
        }

        let id = heap.allocate(RuntimeObject {
            reference,
            class_name,
            jar,
            in_storage: true,
            fields: states,
        });
        self.cache.insert(reference, id);
        debug!("Deserialized {} as {}", reference, id);
        Ok(id)
    }

    /// Latest value of every eager field. Final fields only come from the
    /// creating response.
    fn eager_values(
        &self,
        object: &StorageReference,
        fields: &[FieldInfo],
        creation: &TransactionResponse,
        gas: &mut GasMeter,
    ) -> Result<BTreeMap<FieldSignature, StorageValue>, DeserializationError> {
        let mut pending: Vec<&FieldSignature> = fields
            .iter()
            .filter(|f| f.eager && !f.is_final)
            .map(|f| &f.signature)
            .collect();
        let mut found = BTreeMap::new();

        if !pending.is_empty() {
            let mut previous = self.current;
            for position in self.positions_after_creation(object)? {
                let response = self.read_since(previous, position, gas)?;
                previous = position;
                harvest(&response, object, &mut pending, &mut found);
                if pending.is_empty() {
                    break;
                }
            }
        }

        pending.extend(fields.iter().filter(|f| f.eager && f.is_final).map(|f| &f.signature));
        harvest(creation, object, &mut pending, &mut found);
        Ok(found)
    }

    /// Fetches the value of a lazy field and marks it loaded
    pub fn load_lazy(
        &mut self,
        id: ObjectId,
        field: &FieldSignature,
        loader: &ClassLoader,
        heap: &mut Heap,
        gas: &mut GasMeter,
    ) -> Result<RuntimeValue, DeserializationError> {
        let (reference, is_final) = {
            let object = heap.get(id).ok_or(DeserializationError::UnknownObject(id))?;
            let state = object
                .field(field)
                .ok_or_else(|| DeserializationError::MissingLazyField {
                    object: object.reference,
                    field: field.to_string(),
                })?;
            (object.reference, state.is_final)
        };

        let value = self.lazy_value(&reference, field, is_final, gas)?;
        let value = match value {
            StorageValue::Reference(target) => {
                RuntimeValue::Object(self.deserialize(target, loader, heap, gas)?)
            }
            scalar => RuntimeValue::from_scalar(&scalar).ok_or_else(|| {
                DeserializationError::IllegalValue {
                    object: reference,
                    field: field.to_string(),
                }
            })?,
        };

        if let Some(state) = heap.get_mut(id).and_then(|o| o.field_mut(field)) {
            state.slot = Slot::Loaded {
                old: Some(value.clone()),
                current: value.clone(),
            };
        }
        Ok(value)
    }

    fn lazy_value(
        &self,
        object: &StorageReference,
        field: &FieldSignature,
        is_final: bool,
        gas: &mut GasMeter,
    ) -> Result<StorageValue, DeserializationError> {
        let (later, mut previous) = if is_final {
            (Vec::new(), object.transaction.next())
        } else {
            (self.positions_after_creation(object)?, self.current)
        };

        for position in later.into_iter().chain(std::iter::once(object.transaction)) {
            let response = self.read_since(previous, position, gas)?;
            previous = position;
            let value = response
                .updates()
                .unwrap_or(&[])
                .iter()
                .find(|u| u.is_for(object, field))
                .and_then(Update::value);
            if let Some(value) = value {
                return Ok(value);
            }
        }

        Err(DeserializationError::MissingLazyField {
            object: *object,
            field: field.to_string(),
        })
    }
}

/// Moves into `found` the values of `pending` fields updated by `response`
fn harvest(
    response: &TransactionResponse,
    object: &StorageReference,
    pending: &mut Vec<&FieldSignature>,
    found: &mut BTreeMap<FieldSignature, StorageValue>,
) {
    for update in response.updates().unwrap_or(&[]) {
        if update.object() != *object {
            continue;
        }
        let (Some(field), Some(value)) = (update.field(), update.value()) else {
            continue;
        };
        if let Some(index) = pending.iter().position(|p| *p == field) {
            pending.swap_remove(index);
            found.insert(field.clone(), value);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializationError {
    #[error("No class tag for {0}")]
    MissingClassTag(StorageReference),

    #[error("Transaction {0} has no updates")]
    NoUpdates(TransactionReference),

    #[error("Object {0} does not exist yet")]
    NotYetCreated(StorageReference),

    #[error("No value for eager field {field} of {object}")]
    MissingEagerField {
        object: StorageReference,
        field: String,
    },

    #[error("No value for lazy field {field} of {object}")]
    MissingLazyField {
        object: StorageReference,
        field: String,
    },

    #[error("Illegal value for field {field} of {object}")]
    IllegalValue {
        object: StorageReference,
        field: String,
    },

    #[error("Class {class_name} is tagged with jar {tagged} but was installed by {installed}")]
    JarMismatch {
        class_name: String,
        tagged: TransactionReference,
        installed: TransactionReference,
    },

    #[error("Unknown class {0}")]
    UnknownClass(String),

    #[error("Unknown heap object {0}")]
    UnknownObject(ObjectId),

    #[error(transparent)]
    Gas(#[from] GasError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
