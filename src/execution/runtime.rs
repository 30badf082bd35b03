// Runtime - Graphe transitoire des objets d'une transaction
use crate::types::{FieldSignature, StorageReference, StorageValue, TransactionReference};
use num_bigint::BigInt;
use std::fmt;

/// Handle of an object in the heap of the current transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A value as seen by running code: objects are heap handles
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    BigInteger(BigInt),
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Double(f64),
    Enum { class_name: String, name: String },
    Float(f32),
    Int(i32),
    Long(i64),
    Null,
    Object(ObjectId),
    Short(i16),
    String(String),
}

impl RuntimeValue {
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            RuntimeValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_big_integer(&self) -> Option<&BigInt> {
        match self {
            RuntimeValue::BigInteger(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            RuntimeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuntimeValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RuntimeValue::Null)
    }

    /// Scalar counterpart of a storage value; `None` for references, which
    /// need the deserializer
    pub fn from_scalar(value: &StorageValue) -> Option<RuntimeValue> {
        Some(match value {
            StorageValue::BigInteger(v) => RuntimeValue::BigInteger(v.clone()),
            StorageValue::Boolean(v) => RuntimeValue::Boolean(*v),
            StorageValue::Byte(v) => RuntimeValue::Byte(*v),
            StorageValue::Char(v) => RuntimeValue::Char(*v),
            StorageValue::Double(v) => RuntimeValue::Double(*v),
            StorageValue::Enum { class_name, name } => RuntimeValue::Enum {
                class_name: class_name.clone(),
                name: name.clone(),
            },
            StorageValue::Float(v) => RuntimeValue::Float(*v),
            StorageValue::Int(v) => RuntimeValue::Int(*v),
            StorageValue::Long(v) => RuntimeValue::Long(*v),
            StorageValue::Null => RuntimeValue::Null,
            StorageValue::Reference(_) => return None,
            StorageValue::Short(v) => RuntimeValue::Short(*v),
            StorageValue::String(v) => RuntimeValue::String(v.clone()),
        })
    }
}

/// Equality used to detect modified fields: floating point values compare
/// by bit pattern, objects by identity
impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        use RuntimeValue::*;
        match (self, other) {
            (BigInteger(a), BigInteger(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (
                Enum { class_name: c1, name: n1 },
                Enum { class_name: c2, name: n2 },
            ) => c1 == c2 && n1 == n2,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Null, Null) => true,
            (Object(a), Object(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (String(a), String(b)) => a == b,
            _ => false,
        }
    }
}

impl From<BigInt> for RuntimeValue {
    fn from(value: BigInt) -> Self {
        RuntimeValue::BigInteger(value)
    }
}

impl From<ObjectId> for RuntimeValue {
    fn from(id: ObjectId) -> Self {
        RuntimeValue::Object(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Lazy field of a stored object, not read yet
    Unloaded,
    Loaded {
        /// Value found in the log, `None` if never loaded before being written
        old: Option<RuntimeValue>,
        current: RuntimeValue,
    },
}

#[derive(Debug, Clone)]
pub struct FieldState {
    pub signature: FieldSignature,
    pub eager: bool,
    pub is_final: bool,
    pub slot: Slot,
}

impl FieldState {
    /// True if the value at the end of the transaction may differ from the
    /// one in the log
    pub fn is_modified(&self) -> bool {
        match &self.slot {
            Slot::Unloaded => false,
            Slot::Loaded { old, current } => old.as_ref() != Some(current),
        }
    }
}

/// Transient image of a storage object.
///
/// `reference` and `in_storage` are identity metadata: they are never
/// reported as field updates.
#[derive(Debug, Clone)]
pub struct RuntimeObject {
    pub reference: StorageReference,
    pub class_name: String,
    /// Transaction that installed the class of the object
    pub jar: TransactionReference,
    /// False for objects created by the current transaction
    pub in_storage: bool,
    pub fields: Vec<FieldState>,
}

impl RuntimeObject {
    pub fn field(&self, signature: &FieldSignature) -> Option<&FieldState> {
        self.fields.iter().find(|f| f.signature == *signature)
    }

    pub fn field_mut(&mut self, signature: &FieldSignature) -> Option<&mut FieldState> {
        self.fields.iter_mut().find(|f| f.signature == *signature)
    }

    /// Field named `name` declared in `defining_class`
    pub fn field_named(&self, defining_class: &str, name: &str) -> Option<&FieldState> {
        self.fields
            .iter()
            .find(|f| f.signature.defining_class.name() == defining_class && f.signature.name == name)
    }
}

/// Objects reachable by the running transaction
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<RuntimeObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, object: RuntimeObject) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    pub fn get(&self, id: ObjectId) -> Option<&RuntimeObject> {
        self.objects.get(id.0)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut RuntimeObject> {
        self.objects.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len()).map(ObjectId)
    }

    /// Storage counterpart of a runtime value
    pub fn to_storage(&self, value: &RuntimeValue) -> Option<StorageValue> {
        Some(match value {
            RuntimeValue::BigInteger(v) => StorageValue::BigInteger(v.clone()),
            RuntimeValue::Boolean(v) => StorageValue::Boolean(*v),
            RuntimeValue::Byte(v) => StorageValue::Byte(*v),
            RuntimeValue::Char(v) => StorageValue::Char(*v),
            RuntimeValue::Double(v) => StorageValue::Double(*v),
            RuntimeValue::Enum { class_name, name } => StorageValue::Enum {
                class_name: class_name.clone(),
                name: name.clone(),
            },
            RuntimeValue::Float(v) => StorageValue::Float(*v),
            RuntimeValue::Int(v) => StorageValue::Int(*v),
            RuntimeValue::Long(v) => StorageValue::Long(*v),
            RuntimeValue::Null => StorageValue::Null,
            RuntimeValue::Object(id) => StorageValue::Reference(self.get(*id)?.reference),
            RuntimeValue::Short(v) => StorageValue::Short(*v),
            RuntimeValue::String(v) => StorageValue::String(v.clone()),
        })
    }
}
