// Updates - Faits immuables sur la classe ou un champ d'un objet
use super::reference::{StorageReference, TransactionReference};
use super::signatures::FieldSignature;
use super::value::StorageValue;
use num_bigint::BigInt;
use std::cmp::Ordering;
use std::fmt;

/// One logged fact about an object, as produced by one transaction.
///
/// Field updates carry the final value of the field at the end of the
/// producing transaction. A `ClassTag` exists once per object, at the position
/// that created it.
#[derive(Debug, Clone)]
pub enum Update {
    ClassTag {
        object: StorageReference,
        class_name: String,
        /// Transaction that installed the jar defining the class
        jar: TransactionReference,
    },
    OfBigInteger {
        object: StorageReference,
        field: FieldSignature,
        value: BigInt,
    },
    OfBoolean {
        object: StorageReference,
        field: FieldSignature,
        value: bool,
    },
    OfByte {
        object: StorageReference,
        field: FieldSignature,
        value: i8,
    },
    OfChar {
        object: StorageReference,
        field: FieldSignature,
        value: u16,
    },
    OfDouble {
        object: StorageReference,
        field: FieldSignature,
        value: f64,
    },
    OfEnum {
        object: StorageReference,
        field: FieldSignature,
        enum_class: String,
        name: String,
        eager: bool,
    },
    OfFloat {
        object: StorageReference,
        field: FieldSignature,
        value: f32,
    },
    OfInt {
        object: StorageReference,
        field: FieldSignature,
        value: i32,
    },
    OfLong {
        object: StorageReference,
        field: FieldSignature,
        value: i64,
    },
    OfShort {
        object: StorageReference,
        field: FieldSignature,
        value: i16,
    },
    OfStorage {
        object: StorageReference,
        field: FieldSignature,
        value: StorageReference,
    },
    OfString {
        object: StorageReference,
        field: FieldSignature,
        value: String,
    },
    ToNull {
        object: StorageReference,
        field: FieldSignature,
        eager: bool,
    },
}

impl Update {
    /// Builds the field update matching a value. `eager` only matters for
    /// enum and null values, whose eagerness is decided by the declared type
    /// of the field and cannot be recovered from the value.
    pub fn of(
        object: StorageReference,
        field: FieldSignature,
        value: StorageValue,
        eager: bool,
    ) -> Update {
        match value {
            StorageValue::BigInteger(value) => Update::OfBigInteger { object, field, value },
            StorageValue::Boolean(value) => Update::OfBoolean { object, field, value },
            StorageValue::Byte(value) => Update::OfByte { object, field, value },
            StorageValue::Char(value) => Update::OfChar { object, field, value },
            StorageValue::Double(value) => Update::OfDouble { object, field, value },
            StorageValue::Enum { class_name, name } => Update::OfEnum {
                object,
                field,
                enum_class: class_name,
                name,
                eager,
            },
            StorageValue::Float(value) => Update::OfFloat { object, field, value },
            StorageValue::Int(value) => Update::OfInt { object, field, value },
            StorageValue::Long(value) => Update::OfLong { object, field, value },
            StorageValue::Null => Update::ToNull { object, field, eager },
            StorageValue::Reference(value) => Update::OfStorage { object, field, value },
            StorageValue::Short(value) => Update::OfShort { object, field, value },
            StorageValue::String(value) => Update::OfString { object, field, value },
        }
    }

    /// Name of the variant, first component of the canonical order
    pub fn kind(&self) -> &'static str {
        match self {
            Update::ClassTag { .. } => "ClassTag",
            Update::OfBigInteger { .. } => "UpdateOfBigInteger",
            Update::OfBoolean { .. } => "UpdateOfBoolean",
            Update::OfByte { .. } => "UpdateOfByte",
            Update::OfChar { .. } => "UpdateOfChar",
            Update::OfDouble { .. } => "UpdateOfDouble",
            Update::OfEnum { eager: true, .. } => "UpdateOfEnumEager",
            Update::OfEnum { eager: false, .. } => "UpdateOfEnumLazy",
            Update::OfFloat { .. } => "UpdateOfFloat",
            Update::OfInt { .. } => "UpdateOfInt",
            Update::OfLong { .. } => "UpdateOfLong",
            Update::OfShort { .. } => "UpdateOfShort",
            Update::OfStorage { .. } => "UpdateOfStorage",
            Update::OfString { .. } => "UpdateOfString",
            Update::ToNull { eager: true, .. } => "UpdateToNullEager",
            Update::ToNull { eager: false, .. } => "UpdateToNullLazy",
        }
    }

    pub fn object(&self) -> StorageReference {
        match self {
            Update::ClassTag { object, .. }
            | Update::OfBigInteger { object, .. }
            | Update::OfBoolean { object, .. }
            | Update::OfByte { object, .. }
            | Update::OfChar { object, .. }
            | Update::OfDouble { object, .. }
            | Update::OfEnum { object, .. }
            | Update::OfFloat { object, .. }
            | Update::OfInt { object, .. }
            | Update::OfLong { object, .. }
            | Update::OfShort { object, .. }
            | Update::OfStorage { object, .. }
            | Update::OfString { object, .. }
            | Update::ToNull { object, .. } => *object,
        }
    }

    /// Updated field, `None` for class tags
    pub fn field(&self) -> Option<&FieldSignature> {
        match self {
            Update::ClassTag { .. } => None,
            Update::OfBigInteger { field, .. }
            | Update::OfBoolean { field, .. }
            | Update::OfByte { field, .. }
            | Update::OfChar { field, .. }
            | Update::OfDouble { field, .. }
            | Update::OfEnum { field, .. }
            | Update::OfFloat { field, .. }
            | Update::OfInt { field, .. }
            | Update::OfLong { field, .. }
            | Update::OfShort { field, .. }
            | Update::OfStorage { field, .. }
            | Update::OfString { field, .. }
            | Update::ToNull { field, .. } => Some(field),
        }
    }

    /// New value of the field, `None` for class tags
    pub fn value(&self) -> Option<StorageValue> {
        let value = match self {
            Update::ClassTag { .. } => return None,
            Update::OfBigInteger { value, .. } => StorageValue::BigInteger(value.clone()),
            Update::OfBoolean { value, .. } => StorageValue::Boolean(*value),
            Update::OfByte { value, .. } => StorageValue::Byte(*value),
            Update::OfChar { value, .. } => StorageValue::Char(*value),
            Update::OfDouble { value, .. } => StorageValue::Double(*value),
            Update::OfEnum {
                enum_class, name, ..
            } => StorageValue::Enum {
                class_name: enum_class.clone(),
                name: name.clone(),
            },
            Update::OfFloat { value, .. } => StorageValue::Float(*value),
            Update::OfInt { value, .. } => StorageValue::Int(*value),
            Update::OfLong { value, .. } => StorageValue::Long(*value),
            Update::OfShort { value, .. } => StorageValue::Short(*value),
            Update::OfStorage { value, .. } => StorageValue::Reference(*value),
            Update::OfString { value, .. } => StorageValue::String(value.clone()),
            Update::ToNull { .. } => StorageValue::Null,
        };
        Some(value)
    }

    /// Eagerness follows the declared type of the field, never the value:
    /// a string stored into a field declared as a generic reference is lazy.
    pub fn is_eager(&self) -> bool {
        match self {
            Update::ClassTag { .. } => true,
            Update::OfBigInteger { field, .. } => field.field_type.is_big_integer(),
            Update::OfString { field, .. } => field.field_type.is_string(),
            Update::OfEnum { eager, .. } | Update::ToNull { eager, .. } => *eager,
            Update::OfStorage { .. } => false,
            Update::OfBoolean { .. }
            | Update::OfByte { .. }
            | Update::OfChar { .. }
            | Update::OfDouble { .. }
            | Update::OfFloat { .. }
            | Update::OfInt { .. }
            | Update::OfLong { .. }
            | Update::OfShort { .. } => true,
        }
    }

    pub fn is_class_tag(&self) -> bool {
        matches!(self, Update::ClassTag { .. })
    }

    /// True if both updates concern the same property of the same object:
    /// the class of the object, or the same field
    pub fn is_for_same_property_as(&self, other: &Update) -> bool {
        self.object() == other.object()
            && match (self.field(), other.field()) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    }

    /// True if this is an update of `field` of `object`
    pub fn is_for(&self, object: &StorageReference, field: &FieldSignature) -> bool {
        self.object() == *object && self.field() == Some(field)
    }
}

impl Ord for Update {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_kind = self
            .kind()
            .cmp(other.kind())
            .then_with(|| self.object().cmp(&other.object()));
        if by_kind != Ordering::Equal {
            return by_kind;
        }

        match (self, other) {
            (
                Update::ClassTag {
                    class_name: c1,
                    jar: j1,
                    ..
                },
                Update::ClassTag {
                    class_name: c2,
                    jar: j2,
                    ..
                },
            ) => c1.cmp(c2).then_with(|| j1.cmp(j2)),
            _ => self
                .field()
                .cmp(&other.field())
                .then_with(|| self.value().cmp(&other.value())),
        }
    }
}

impl PartialOrd for Update {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Update {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Update {}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Update::ClassTag {
                object,
                class_name,
                jar,
            } => write!(f, "<{}.class|{}|@{}>", object, class_name, jar),
            _ => match (self.field(), self.value()) {
                (Some(field), Some(value)) => {
                    write!(f, "<{}|{}|{}>", self.object(), field, value)
                }
                _ => write!(f, "<{}>", self.object()),
            },
        }
    }
}
