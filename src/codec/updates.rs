// Encodage des mises à jour avec sélecteurs dédiés
//
// The most frequent updates (balances, nonces, public keys, container node
// fields) have their own selector and omit the field signature, which is
// implied by the selector. Storage gas is paid per byte, so these selectors
// are what makes an ordinary transfer cheap.
use super::{CodecError, Marshal, Marshaller, Unmarshal, Unmarshaller};
use crate::types::{FieldSignature, StorageReference, TransactionReference, Update};
use num_bigint::BigInt;
use num_traits::Zero;

pub mod selectors {
    pub const CLASS_TAG: u8 = 0;
    pub const BALANCE: u8 = 1;
    pub const BIG_INTEGER: u8 = 2;
    pub const BOOLEAN_FALSE: u8 = 3;
    pub const BOOLEAN_TRUE: u8 = 4;
    pub const BYTE: u8 = 5;
    pub const CHAR: u8 = 6;
    pub const DOUBLE: u8 = 7;
    pub const ENUM_EAGER: u8 = 8;
    pub const ENUM_LAZY: u8 = 9;
    pub const FLOAT: u8 = 10;
    pub const INT: u8 = 11;
    pub const NONCE: u8 = 12;
    pub const LONG: u8 = 13;
    pub const SHORT: u8 = 14;
    pub const STRING: u8 = 15;
    pub const STORAGE: u8 = 16;
    pub const NULL_EAGER: u8 = 17;
    pub const NULL_LAZY: u8 = 18;
    pub const INT_SMALL: u8 = 19;
    pub const INT_VERY_SMALL: u8 = 20;
    pub const TREE_MAP_NODE_SIZE: u8 = 21;
    pub const TREE_INTMAP_NODE_SIZE: u8 = 22;
    pub const TREE_MAP_NODE_LEFT: u8 = 23;
    pub const TREE_MAP_NODE_RIGHT: u8 = 24;
    pub const TREE_MAP_NODE_KEY: u8 = 25;
    pub const TREE_MAP_NODE_VALUE: u8 = 26;
    pub const PUBLIC_KEY: u8 = 27;
    pub const TREE_MAP_ROOT: u8 = 28;
    pub const TREE_INTMAP_NODE_KEY: u8 = 29;
    pub const EVENT_CREATOR: u8 = 31;
    pub const TREE_INTMAP_NODE_VALUE: u8 = 33;
    pub const TREE_INTMAP_NODE_LEFT: u8 = 34;
    pub const TREE_INTMAP_NODE_RIGHT: u8 = 35;
    pub const TREE_INTMAP_ROOT: u8 = 36;
    pub const GAS_PRICE: u8 = 37;
    pub const UBI_VALUE: u8 = 38;
    pub const BALANCE_TO_ZERO: u8 = 39;
    pub const NONCE_TO_ZERO: u8 = 40;
}

use selectors::*;

/// Selectors followed by a full field signature
const GENERIC: [u8; 18] = [
    BIG_INTEGER,
    BOOLEAN_FALSE,
    BOOLEAN_TRUE,
    BYTE,
    CHAR,
    DOUBLE,
    ENUM_EAGER,
    ENUM_LAZY,
    FLOAT,
    INT,
    INT_SMALL,
    INT_VERY_SMALL,
    LONG,
    SHORT,
    STRING,
    STORAGE,
    NULL_EAGER,
    NULL_LAZY,
];

fn storage_selector_for(field: &FieldSignature) -> Option<u8> {
    let fields: [(fn() -> FieldSignature, u8); 10] = [
        (FieldSignature::tree_map_node_left, TREE_MAP_NODE_LEFT),
        (FieldSignature::tree_map_node_right, TREE_MAP_NODE_RIGHT),
        (FieldSignature::tree_map_node_key, TREE_MAP_NODE_KEY),
        (FieldSignature::tree_map_node_value, TREE_MAP_NODE_VALUE),
        (FieldSignature::tree_map_root, TREE_MAP_ROOT),
        (FieldSignature::event_creator, EVENT_CREATOR),
        (FieldSignature::tree_intmap_node_value, TREE_INTMAP_NODE_VALUE),
        (FieldSignature::tree_intmap_node_left, TREE_INTMAP_NODE_LEFT),
        (FieldSignature::tree_intmap_node_right, TREE_INTMAP_NODE_RIGHT),
        (FieldSignature::tree_intmap_root, TREE_INTMAP_ROOT),
    ];
    fields
        .into_iter()
        .find(|(known, _)| known() == *field)
        .map(|(_, selector)| selector)
}

fn storage_field_for(selector: u8) -> Option<FieldSignature> {
    Some(match selector {
        TREE_MAP_NODE_LEFT => FieldSignature::tree_map_node_left(),
        TREE_MAP_NODE_RIGHT => FieldSignature::tree_map_node_right(),
        TREE_MAP_NODE_KEY => FieldSignature::tree_map_node_key(),
        TREE_MAP_NODE_VALUE => FieldSignature::tree_map_node_value(),
        TREE_MAP_ROOT => FieldSignature::tree_map_root(),
        EVENT_CREATOR => FieldSignature::event_creator(),
        TREE_INTMAP_NODE_VALUE => FieldSignature::tree_intmap_node_value(),
        TREE_INTMAP_NODE_LEFT => FieldSignature::tree_intmap_node_left(),
        TREE_INTMAP_NODE_RIGHT => FieldSignature::tree_intmap_node_right(),
        TREE_INTMAP_ROOT => FieldSignature::tree_intmap_root(),
        _ => return None,
    })
}

fn write_big_integer_update(
    out: &mut Marshaller,
    object: &StorageReference,
    field: &FieldSignature,
    value: &BigInt,
) {
    let (special, to_zero) = if *field == FieldSignature::balance() {
        (Some(BALANCE), Some(BALANCE_TO_ZERO))
    } else if *field == FieldSignature::eoa_nonce() {
        (Some(NONCE), Some(NONCE_TO_ZERO))
    } else if *field == FieldSignature::gas_price() {
        (Some(GAS_PRICE), None)
    } else if *field == FieldSignature::ubi_value() {
        (Some(UBI_VALUE), None)
    } else {
        (None, None)
    };

    match (special, to_zero) {
        (Some(_), Some(zero)) if value.is_zero() => {
            out.write_u8(zero);
            object.marshal(out);
        }
        (Some(selector), _) => {
            out.write_u8(selector);
            object.marshal(out);
            out.write_big_integer(value);
        }
        (None, _) => {
            out.write_u8(BIG_INTEGER);
            object.marshal(out);
            field.marshal(out);
            out.write_big_integer(value);
        }
    }
}

fn write_int_update(out: &mut Marshaller, object: &StorageReference, field: &FieldSignature, value: i32) {
    let special = if *field == FieldSignature::tree_map_node_size() {
        Some(TREE_MAP_NODE_SIZE)
    } else if *field == FieldSignature::tree_intmap_node_size() {
        Some(TREE_INTMAP_NODE_SIZE)
    } else if *field == FieldSignature::tree_intmap_node_key() {
        Some(TREE_INTMAP_NODE_KEY)
    } else {
        None
    };

    if let Some(selector) = special {
        out.write_u8(selector);
        object.marshal(out);
        out.write_i32(value);
    } else if (0..=255).contains(&value) {
        out.write_u8(INT_VERY_SMALL);
        object.marshal(out);
        field.marshal(out);
        out.write_u8(value as u8);
    } else if let Ok(short) = i16::try_from(value) {
        out.write_u8(INT_SMALL);
        object.marshal(out);
        field.marshal(out);
        out.write_i16(short);
    } else {
        out.write_u8(INT);
        object.marshal(out);
        field.marshal(out);
        out.write_i32(value);
    }
}

fn write_generic(out: &mut Marshaller, selector: u8, object: &StorageReference, field: &FieldSignature) {
    out.write_u8(selector);
    object.marshal(out);
    field.marshal(out);
}

impl Marshal for Update {
    fn marshal(&self, out: &mut Marshaller) {
        match self {
            Update::ClassTag {
                object,
                class_name,
                jar,
            } => {
                out.write_u8(CLASS_TAG);
                object.marshal(out);
                out.write_utf(class_name);
                jar.marshal(out);
            }
            Update::OfBigInteger {
                object,
                field,
                value,
            } => write_big_integer_update(out, object, field, value),
            Update::OfBoolean {
                object,
                field,
                value,
            } => {
                let selector = if *value { BOOLEAN_TRUE } else { BOOLEAN_FALSE };
                write_generic(out, selector, object, field);
            }
            Update::OfByte {
                object,
                field,
                value,
            } => {
                write_generic(out, BYTE, object, field);
                out.write_i8(*value);
            }
            Update::OfChar {
                object,
                field,
                value,
            } => {
                write_generic(out, CHAR, object, field);
                out.write_u16(*value);
            }
            Update::OfDouble {
                object,
                field,
                value,
            } => {
                write_generic(out, DOUBLE, object, field);
                out.write_f64(*value);
            }
            Update::OfEnum {
                object,
                field,
                enum_class,
                name,
                eager,
            } => {
                let selector = if *eager { ENUM_EAGER } else { ENUM_LAZY };
                write_generic(out, selector, object, field);
                out.write_utf(enum_class);
                out.write_utf(name);
            }
            Update::OfFloat {
                object,
                field,
                value,
            } => {
                write_generic(out, FLOAT, object, field);
                out.write_f32(*value);
            }
            Update::OfInt {
                object,
                field,
                value,
            } => write_int_update(out, object, field, *value),
            Update::OfLong {
                object,
                field,
                value,
            } => {
                write_generic(out, LONG, object, field);
                out.write_i64(*value);
            }
            Update::OfShort {
                object,
                field,
                value,
            } => {
                write_generic(out, SHORT, object, field);
                out.write_i16(*value);
            }
            Update::OfStorage {
                object,
                field,
                value,
            } => {
                match storage_selector_for(field) {
                    Some(selector) => {
                        out.write_u8(selector);
                        object.marshal(out);
                    }
                    None => write_generic(out, STORAGE, object, field),
                }
                value.marshal(out);
            }
            Update::OfString {
                object,
                field,
                value,
            } => {
                if *field == FieldSignature::eoa_public_key() {
                    out.write_u8(PUBLIC_KEY);
                    object.marshal(out);
                } else {
                    write_generic(out, STRING, object, field);
                }
                out.write_utf(value);
            }
            Update::ToNull {
                object,
                field,
                eager,
            } => {
                let selector = if *eager { NULL_EAGER } else { NULL_LAZY };
                write_generic(out, selector, object, field);
            }
        }
    }
}

impl Unmarshal for Update {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        let selector = input.read_u8()?;
        let object = StorageReference::unmarshal(input)?;

        if let Some(field) = storage_field_for(selector) {
            let value = StorageReference::unmarshal(input)?;
            return Ok(Update::OfStorage {
                object,
                field,
                value,
            });
        }

        let update = match selector {
            CLASS_TAG => Update::ClassTag {
                object,
                class_name: input.read_utf()?,
                jar: TransactionReference::unmarshal(input)?,
            },
            BALANCE => Update::OfBigInteger {
                object,
                field: FieldSignature::balance(),
                value: input.read_big_integer()?,
            },
            BALANCE_TO_ZERO => Update::OfBigInteger {
                object,
                field: FieldSignature::balance(),
                value: BigInt::zero(),
            },
            NONCE => Update::OfBigInteger {
                object,
                field: FieldSignature::eoa_nonce(),
                value: input.read_big_integer()?,
            },
            NONCE_TO_ZERO => Update::OfBigInteger {
                object,
                field: FieldSignature::eoa_nonce(),
                value: BigInt::zero(),
            },
            GAS_PRICE => Update::OfBigInteger {
                object,
                field: FieldSignature::gas_price(),
                value: input.read_big_integer()?,
            },
            UBI_VALUE => Update::OfBigInteger {
                object,
                field: FieldSignature::ubi_value(),
                value: input.read_big_integer()?,
            },
            TREE_MAP_NODE_SIZE => Update::OfInt {
                object,
                field: FieldSignature::tree_map_node_size(),
                value: input.read_i32()?,
            },
            TREE_INTMAP_NODE_SIZE => Update::OfInt {
                object,
                field: FieldSignature::tree_intmap_node_size(),
                value: input.read_i32()?,
            },
            TREE_INTMAP_NODE_KEY => Update::OfInt {
                object,
                field: FieldSignature::tree_intmap_node_key(),
                value: input.read_i32()?,
            },
            PUBLIC_KEY => Update::OfString {
                object,
                field: FieldSignature::eoa_public_key(),
                value: input.read_utf()?,
            },
            _ if !GENERIC.contains(&selector) => {
                return Err(CodecError::UnknownSelector {
                    what: "update",
                    selector,
                })
            }
            _ => {
                let field = FieldSignature::unmarshal(input)?;
                match selector {
                    BIG_INTEGER => Update::OfBigInteger {
                        object,
                        field,
                        value: input.read_big_integer()?,
                    },
                    BOOLEAN_FALSE | BOOLEAN_TRUE => Update::OfBoolean {
                        object,
                        field,
                        value: selector == BOOLEAN_TRUE,
                    },
                    BYTE => Update::OfByte {
                        object,
                        field,
                        value: input.read_i8()?,
                    },
                    CHAR => Update::OfChar {
                        object,
                        field,
                        value: input.read_u16()?,
                    },
                    DOUBLE => Update::OfDouble {
                        object,
                        field,
                        value: input.read_f64()?,
                    },
                    ENUM_EAGER | ENUM_LAZY => Update::OfEnum {
                        object,
                        field,
                        enum_class: input.read_utf()?,
                        name: input.read_utf()?,
                        eager: selector == ENUM_EAGER,
                    },
                    FLOAT => Update::OfFloat {
                        object,
                        field,
                        value: input.read_f32()?,
                    },
                    INT => Update::OfInt {
                        object,
                        field,
                        value: input.read_i32()?,
                    },
                    INT_SMALL => Update::OfInt {
                        object,
                        field,
                        value: input.read_i16()? as i32,
                    },
                    INT_VERY_SMALL => Update::OfInt {
                        object,
                        field,
                        value: input.read_u8()? as i32,
                    },
                    LONG => Update::OfLong {
                        object,
                        field,
                        value: input.read_i64()?,
                    },
                    SHORT => Update::OfShort {
                        object,
                        field,
                        value: input.read_i16()?,
                    },
                    STRING => Update::OfString {
                        object,
                        field,
                        value: input.read_utf()?,
                    },
                    STORAGE => Update::OfStorage {
                        object,
                        field,
                        value: StorageReference::unmarshal(input)?,
                    },
                    NULL_EAGER | NULL_LAZY => Update::ToNull {
                        object,
                        field,
                        eager: selector == NULL_EAGER,
                    },
                    selector => {
                        return Err(CodecError::UnknownSelector {
                            what: "update",
                            selector,
                        })
                    }
                }
            }
        };

        Ok(update)
    }
}
