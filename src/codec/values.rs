// Encodage des références, types, champs et valeurs
use super::{CodecError, Marshal, Marshaller, Unmarshal, Unmarshaller};
use crate::types::{
    classes, BasicType, ClassType, FieldSignature, StorageReference, StorageType, StorageValue,
    TransactionReference,
};

impl Marshal for TransactionReference {
    fn marshal(&self, out: &mut Marshaller) {
        out.write_compact_u64(self.number());
    }
}

impl Unmarshal for TransactionReference {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        Ok(TransactionReference::new(input.read_compact_u64()?))
    }
}

/// Written without selector: a reference is never null where this is used
impl Marshal for StorageReference {
    fn marshal(&self, out: &mut Marshaller) {
        self.transaction.marshal(out);
        out.write_compact_u64(self.progressive);
    }
}

impl Unmarshal for StorageReference {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        let transaction = TransactionReference::unmarshal(input)?;
        let progressive = input.read_compact_u64()?;
        Ok(StorageReference::new(transaction, progressive))
    }
}

// Basic types use their ordinal (0..=7) as selector
const TYPE_CLASS: u8 = 8;
const TYPE_OBJECT: u8 = 9;
const TYPE_STRING: u8 = 10;
const TYPE_BIG_INTEGER: u8 = 11;

impl Marshal for StorageType {
    fn marshal(&self, out: &mut Marshaller) {
        match self {
            StorageType::Basic(basic) => out.write_u8(basic.ordinal()),
            StorageType::Class(class) => match class.name() {
                classes::OBJECT => out.write_u8(TYPE_OBJECT),
                classes::STRING => out.write_u8(TYPE_STRING),
                classes::BIG_INTEGER => out.write_u8(TYPE_BIG_INTEGER),
                name => {
                    out.write_u8(TYPE_CLASS);
                    out.write_utf(name);
                }
            },
        }
    }
}

impl Unmarshal for StorageType {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        let selector = input.read_u8()?;
        if let Some(basic) = BasicType::from_ordinal(selector) {
            return Ok(StorageType::Basic(basic));
        }
        match selector {
            TYPE_CLASS => Ok(StorageType::Class(ClassType(input.read_utf()?))),
            TYPE_OBJECT => Ok(StorageType::object()),
            TYPE_STRING => Ok(StorageType::string()),
            TYPE_BIG_INTEGER => Ok(StorageType::big_integer()),
            selector => Err(CodecError::UnknownSelector {
                what: "storage type",
                selector,
            }),
        }
    }
}

impl Marshal for FieldSignature {
    fn marshal(&self, out: &mut Marshaller) {
        out.write_utf(self.defining_class.name());
        out.write_utf(&self.name);
        self.field_type.marshal(out);
    }
}

impl Unmarshal for FieldSignature {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        let defining_class = ClassType(input.read_utf()?);
        let name = input.read_utf()?;
        let field_type = StorageType::unmarshal(input)?;
        Ok(FieldSignature {
            defining_class,
            name,
            field_type,
        })
    }
}

const VALUE_BIG_INTEGER: u8 = 0;
const VALUE_FALSE: u8 = 1;
const VALUE_TRUE: u8 = 2;
const VALUE_BYTE: u8 = 3;
const VALUE_CHAR: u8 = 4;
const VALUE_DOUBLE: u8 = 5;
const VALUE_ENUM: u8 = 6;
const VALUE_FLOAT: u8 = 7;
const VALUE_INT: u8 = 8;
const VALUE_LONG: u8 = 9;
const VALUE_NULL: u8 = 10;
const VALUE_REFERENCE: u8 = 11;
const VALUE_SHORT: u8 = 12;
const VALUE_STRING: u8 = 13;

impl Marshal for StorageValue {
    fn marshal(&self, out: &mut Marshaller) {
        match self {
            StorageValue::BigInteger(v) => {
                out.write_u8(VALUE_BIG_INTEGER);
                out.write_big_integer(v);
            }
            StorageValue::Boolean(false) => out.write_u8(VALUE_FALSE),
            StorageValue::Boolean(true) => out.write_u8(VALUE_TRUE),
            StorageValue::Byte(v) => {
                out.write_u8(VALUE_BYTE);
                out.write_i8(*v);
            }
            StorageValue::Char(v) => {
                out.write_u8(VALUE_CHAR);
                out.write_u16(*v);
            }
            StorageValue::Double(v) => {
                out.write_u8(VALUE_DOUBLE);
                out.write_f64(*v);
            }
            StorageValue::Enum { class_name, name } => {
                out.write_u8(VALUE_ENUM);
                out.write_utf(class_name);
                out.write_utf(name);
            }
            StorageValue::Float(v) => {
                out.write_u8(VALUE_FLOAT);
                out.write_f32(*v);
            }
            StorageValue::Int(v) => {
                out.write_u8(VALUE_INT);
                out.write_i32(*v);
            }
            StorageValue::Long(v) => {
                out.write_u8(VALUE_LONG);
                out.write_i64(*v);
            }
            StorageValue::Null => out.write_u8(VALUE_NULL),
            StorageValue::Reference(r) => {
                out.write_u8(VALUE_REFERENCE);
                r.marshal(out);
            }
            StorageValue::Short(v) => {
                out.write_u8(VALUE_SHORT);
                out.write_i16(*v);
            }
            StorageValue::String(v) => {
                out.write_u8(VALUE_STRING);
                out.write_utf(v);
            }
        }
    }
}

impl Unmarshal for StorageValue {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_u8()? {
            VALUE_BIG_INTEGER => StorageValue::BigInteger(input.read_big_integer()?),
            VALUE_FALSE => StorageValue::Boolean(false),
            VALUE_TRUE => StorageValue::Boolean(true),
            VALUE_BYTE => StorageValue::Byte(input.read_i8()?),
            VALUE_CHAR => StorageValue::Char(input.read_u16()?),
            VALUE_DOUBLE => StorageValue::Double(input.read_f64()?),
            VALUE_ENUM => StorageValue::Enum {
                class_name: input.read_utf()?,
                name: input.read_utf()?,
            },
            VALUE_FLOAT => StorageValue::Float(input.read_f32()?),
            VALUE_INT => StorageValue::Int(input.read_i32()?),
            VALUE_LONG => StorageValue::Long(input.read_i64()?),
            VALUE_NULL => StorageValue::Null,
            VALUE_REFERENCE => StorageValue::Reference(StorageReference::unmarshal(input)?),
            VALUE_SHORT => StorageValue::Short(input.read_i16()?),
            VALUE_STRING => StorageValue::String(input.read_utf()?),
            selector => {
                return Err(CodecError::UnknownSelector {
                    what: "storage value",
                    selector,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    #[test]
    fn test_well_known_types_take_one_byte() {
        assert_eq!(encode(&StorageType::string(), 0).unwrap(), vec![TYPE_STRING]);
        assert_eq!(
            encode(&StorageType::from(BasicType::Double), 0).unwrap(),
            vec![7]
        );
        let custom = StorageType::class("a.Custom");
        let bytes = encode(&custom, 0).unwrap();
        assert_eq!(bytes[0], TYPE_CLASS);
        assert_eq!(decode::<StorageType>(&bytes, 0).unwrap(), custom);
    }

    #[test]
    fn test_values_survive_encoding() {
        let reference = StorageReference::new(TransactionReference::new(300), 2);
        let values = vec![
            StorageValue::Reference(reference),
            StorageValue::Enum {
                class_name: "a.Color".into(),
                name: "RED".into(),
            },
            StorageValue::Char(0x263A),
            StorageValue::Null,
        ];
        for value in values {
            let bytes = encode(&value, 0).unwrap();
            assert_eq!(decode::<StorageValue>(&bytes, 0).unwrap(), value);
        }
    }

    #[test]
    fn test_unknown_value_selector() {
        assert_eq!(
            decode::<StorageValue>(&[99], 0),
            Err(CodecError::UnknownSelector {
                what: "storage value",
                selector: 99
            })
        );
    }
}
