// Valeurs - Valeurs persistées dans le journal des mises à jour
use super::reference::StorageReference;
use super::signatures::{BasicType, StorageType};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A value as it can appear in requests, responses and updates.
///
/// Floating point values compare by the total order of their bit patterns, so
/// that values (and the updates carrying them) have a canonical sort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageValue {
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
    Reference(StorageReference),
    Short(i16),
    String(String),
}

impl StorageValue {
    fn rank(&self) -> u8 {
        match self {
            StorageValue::BigInteger(_) => 0,
            StorageValue::Boolean(_) => 1,
            StorageValue::Byte(_) => 2,
            StorageValue::Char(_) => 3,
            StorageValue::Double(_) => 4,
            StorageValue::Enum { .. } => 5,
            StorageValue::Float(_) => 6,
            StorageValue::Int(_) => 7,
            StorageValue::Long(_) => 8,
            StorageValue::Null => 9,
            StorageValue::Reference(_) => 10,
            StorageValue::Short(_) => 11,
            StorageValue::String(_) => 12,
        }
    }

    /// Basic type of a primitive value
    pub fn basic_type(&self) -> Option<BasicType> {
        match self {
            StorageValue::Boolean(_) => Some(BasicType::Boolean),
            StorageValue::Byte(_) => Some(BasicType::Byte),
            StorageValue::Char(_) => Some(BasicType::Char),
            StorageValue::Short(_) => Some(BasicType::Short),
            StorageValue::Int(_) => Some(BasicType::Int),
            StorageValue::Long(_) => Some(BasicType::Long),
            StorageValue::Float(_) => Some(BasicType::Float),
            StorageValue::Double(_) => Some(BasicType::Double),
            _ => None,
        }
    }

    /// Default value of a field of the given type
    pub fn default_for(field_type: &StorageType) -> StorageValue {
        match field_type {
            StorageType::Basic(BasicType::Boolean) => StorageValue::Boolean(false),
            StorageType::Basic(BasicType::Byte) => StorageValue::Byte(0),
            StorageType::Basic(BasicType::Char) => StorageValue::Char(0),
            StorageType::Basic(BasicType::Short) => StorageValue::Short(0),
            StorageType::Basic(BasicType::Int) => StorageValue::Int(0),
            StorageType::Basic(BasicType::Long) => StorageValue::Long(0),
            StorageType::Basic(BasicType::Float) => StorageValue::Float(0.0),
            StorageType::Basic(BasicType::Double) => StorageValue::Double(0.0),
            StorageType::Class(_) => StorageValue::Null,
        }
    }

    pub fn as_reference(&self) -> Option<StorageReference> {
        match self {
            StorageValue::Reference(r) => Some(*r),
            _ => None,
        }
    }
}

impl Ord for StorageValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use StorageValue::*;
        match (self, other) {
            (BigInteger(a), BigInteger(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Byte(a), Byte(b)) => a.cmp(b),
            (Char(a), Char(b)) => a.cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (
                Enum { class_name: c1, name: n1 },
                Enum { class_name: c2, name: n2 },
            ) => c1.cmp(c2).then_with(|| n1.cmp(n2)),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Long(a), Long(b)) => a.cmp(b),
            (Null, Null) => Ordering::Equal,
            (Reference(a), Reference(b)) => a.cmp(b),
            (Short(a), Short(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for StorageValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for StorageValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StorageValue {}

impl From<StorageReference> for StorageValue {
    fn from(reference: StorageReference) -> Self {
        StorageValue::Reference(reference)
    }
}

impl From<BigInt> for StorageValue {
    fn from(value: BigInt) -> Self {
        StorageValue::BigInteger(value)
    }
}

impl From<i32> for StorageValue {
    fn from(value: i32) -> Self {
        StorageValue::Int(value)
    }
}

impl From<&str> for StorageValue {
    fn from(value: &str) -> Self {
        StorageValue::String(value.to_string())
    }
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageValue::BigInteger(v) => write!(f, "{}", v),
            StorageValue::Boolean(v) => write!(f, "{}", v),
            StorageValue::Byte(v) => write!(f, "{}", v),
            StorageValue::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "'{}'", c),
                None => write!(f, "\\u{:04x}", v),
            },
            StorageValue::Double(v) => write!(f, "{}", v),
            StorageValue::Enum { class_name, name } => write!(f, "{}.{}", class_name, name),
            StorageValue::Float(v) => write!(f, "{}", v),
            StorageValue::Int(v) => write!(f, "{}", v),
            StorageValue::Long(v) => write!(f, "{}", v),
            StorageValue::Null => f.write_str("null"),
            StorageValue::Reference(r) => write!(f, "{}", r),
            StorageValue::Short(v) => write!(f, "{}", v),
            StorageValue::String(v) => write!(f, "\"{}\"", v),
        }
    }
}
