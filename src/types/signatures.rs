// Signatures - Types de stockage, champs et membres exécutables
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Storage types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BasicType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl BasicType {
    pub const ALL: [BasicType; 8] = [
        BasicType::Boolean,
        BasicType::Byte,
        BasicType::Char,
        BasicType::Short,
        BasicType::Int,
        BasicType::Long,
        BasicType::Float,
        BasicType::Double,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BasicType::Boolean => "boolean",
            BasicType::Byte => "byte",
            BasicType::Char => "char",
            BasicType::Short => "short",
            BasicType::Int => "int",
            BasicType::Long => "long",
            BasicType::Float => "float",
            BasicType::Double => "double",
        }
    }

    /// Position in `ALL`, used as wire ordinal
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<BasicType> {
        Self::ALL.get(ordinal as usize).copied()
    }
}

/// Name of a class
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassType(pub String);

impl ClassType {
    pub fn new(name: impl Into<String>) -> Self {
        ClassType(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known class names
pub mod classes {
    pub const OBJECT: &str = "kratos.lang.Object";
    pub const STRING: &str = "kratos.lang.String";
    pub const BIG_INTEGER: &str = "kratos.lang.BigInteger";
    pub const STORAGE: &str = "kratos.lang.Storage";
    pub const CONTRACT: &str = "kratos.lang.Contract";
    pub const EOA: &str = "kratos.lang.ExternallyOwnedAccount";
    pub const EVENT: &str = "kratos.lang.Event";
    pub const GAS_STATION: &str = "kratos.lang.GasStation";
    pub const STORAGE_TREE_MAP: &str = "kratos.util.StorageTreeMap";
    pub const STORAGE_TREE_MAP_NODE: &str = "kratos.util.StorageTreeMap$Node";
    pub const STORAGE_TREE_INTMAP: &str = "kratos.util.StorageTreeIntMap";
    pub const STORAGE_TREE_INTMAP_NODE: &str = "kratos.util.StorageTreeIntMap$Node";

    /// Class names that exist on every classpath without being installed
    pub const BUILT_IN: [&str; 3] = [OBJECT, STRING, BIG_INTEGER];
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageType {
    Basic(BasicType),
    Class(ClassType),
}

impl StorageType {
    pub fn class(name: impl Into<String>) -> Self {
        StorageType::Class(ClassType::new(name))
    }

    pub fn object() -> Self {
        Self::class(classes::OBJECT)
    }

    pub fn string() -> Self {
        Self::class(classes::STRING)
    }

    pub fn big_integer() -> Self {
        Self::class(classes::BIG_INTEGER)
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, StorageType::Basic(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, StorageType::Class(c) if c.name() == classes::STRING)
    }

    pub fn is_big_integer(&self) -> bool {
        matches!(self, StorageType::Class(c) if c.name() == classes::BIG_INTEGER)
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            StorageType::Class(c) => Some(c.name()),
            StorageType::Basic(_) => None,
        }
    }
}

impl From<BasicType> for StorageType {
    fn from(basic: BasicType) -> Self {
        StorageType::Basic(basic)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageType::Basic(b) => f.write_str(b.name()),
            StorageType::Class(c) => f.write_str(c.name()),
        }
    }
}

// =============================================================================
// Fields
// =============================================================================

/// A field, identified by its defining class, its name and its declared type.
/// Ordered by `(defining_class, name, field_type)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldSignature {
    pub defining_class: ClassType,
    pub name: String,
    pub field_type: StorageType,
}

impl FieldSignature {
    pub fn new(defining_class: &str, name: &str, field_type: StorageType) -> Self {
        Self {
            defining_class: ClassType::new(defining_class),
            name: name.to_string(),
            field_type,
        }
    }

    pub fn balance() -> Self {
        Self::new(classes::CONTRACT, "balance", StorageType::big_integer())
    }

    pub fn eoa_nonce() -> Self {
        Self::new(classes::EOA, "nonce", StorageType::big_integer())
    }

    pub fn eoa_public_key() -> Self {
        Self::new(classes::EOA, "publicKey", StorageType::string())
    }

    pub fn event_creator() -> Self {
        Self::new(classes::EVENT, "creator", StorageType::class(classes::CONTRACT))
    }

    pub fn gas_price() -> Self {
        Self::new(classes::GAS_STATION, "gasPrice", StorageType::big_integer())
    }

    /// Reserved by the codec for basic-income style contracts
    pub fn ubi_value() -> Self {
        Self::new("kratos.lang.UBI", "value", StorageType::big_integer())
    }

    pub fn tree_map_root() -> Self {
        Self::new(
            classes::STORAGE_TREE_MAP,
            "root",
            StorageType::class(classes::STORAGE_TREE_MAP_NODE),
        )
    }

    pub fn tree_map_node_size() -> Self {
        Self::new(classes::STORAGE_TREE_MAP_NODE, "size", BasicType::Int.into())
    }

    pub fn tree_map_node_left() -> Self {
        Self::tree_map_node_child("left")
    }

    pub fn tree_map_node_right() -> Self {
        Self::tree_map_node_child("right")
    }

    pub fn tree_map_node_key() -> Self {
        Self::new(classes::STORAGE_TREE_MAP_NODE, "key", StorageType::object())
    }

    pub fn tree_map_node_value() -> Self {
        Self::new(classes::STORAGE_TREE_MAP_NODE, "value", StorageType::object())
    }

    pub fn tree_intmap_root() -> Self {
        Self::new(
            classes::STORAGE_TREE_INTMAP,
            "root",
            StorageType::class(classes::STORAGE_TREE_INTMAP_NODE),
        )
    }

    pub fn tree_intmap_node_size() -> Self {
        Self::new(classes::STORAGE_TREE_INTMAP_NODE, "size", BasicType::Int.into())
    }

    pub fn tree_intmap_node_key() -> Self {
        Self::new(classes::STORAGE_TREE_INTMAP_NODE, "key", BasicType::Int.into())
    }

    pub fn tree_intmap_node_value() -> Self {
        Self::new(classes::STORAGE_TREE_INTMAP_NODE, "value", StorageType::object())
    }

    pub fn tree_intmap_node_left() -> Self {
        Self::tree_intmap_node_child("left")
    }

    pub fn tree_intmap_node_right() -> Self {
        Self::tree_intmap_node_child("right")
    }

    fn tree_map_node_child(name: &str) -> Self {
        Self::new(
            classes::STORAGE_TREE_MAP_NODE,
            name,
            StorageType::class(classes::STORAGE_TREE_MAP_NODE),
        )
    }

    fn tree_intmap_node_child(name: &str) -> Self {
        Self::new(
            classes::STORAGE_TREE_INTMAP_NODE,
            name,
            StorageType::class(classes::STORAGE_TREE_INTMAP_NODE),
        )
    }
}

impl fmt::Display for FieldSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}:{}", self.defining_class, self.name, self.field_type)
    }
}

// =============================================================================
// Executable members
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstructorSignature {
    pub defining_class: ClassType,
    pub formals: Vec<StorageType>,
}

impl ConstructorSignature {
    pub fn new(defining_class: &str, formals: Vec<StorageType>) -> Self {
        Self {
            defining_class: ClassType::new(defining_class),
            formals,
        }
    }
}

impl fmt::Display for ConstructorSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.defining_class, join(&self.formals))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub defining_class: ClassType,
    pub name: String,
    pub formals: Vec<StorageType>,
    /// `None` for void methods
    pub returns: Option<StorageType>,
}

impl MethodSignature {
    pub fn new(
        defining_class: &str,
        name: &str,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
    ) -> Self {
        Self {
            defining_class: ClassType::new(defining_class),
            name: name.to_string(),
            formals,
            returns,
        }
    }

    pub fn is_void(&self) -> bool {
        self.returns.is_none()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}({})", self.defining_class, self.name, join(&self.formals))
    }
}

fn join(types: &[StorageType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
