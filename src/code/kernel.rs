// Kernel - Classes de base de toute chaîne
//
// Storage is the root of every object kept in the log. Contracts hold coins,
// externally owned accounts pay for transactions, events are emitted by
// contracts and carry their creator.
use super::jar::{ClassDefinition, FieldDefinition, JarManifest, MemberFlags};
use super::registry::{CodeRegistry, Frame};
use crate::execution::{ExecutionContext, RuntimeValue, Throw};
use crate::types::{
    classes, BasicType, ConstructorSignature, FieldSignature, MethodSignature, StorageType,
    StorageValue,
};
use num_bigint::BigInt;
use num_traits::Zero;

pub fn manifest() -> JarManifest {
    let zero = || StorageValue::BigInteger(BigInt::zero());

    JarManifest::new(vec![
        ClassDefinition::new(classes::STORAGE, None).with_constructor(vec![], MemberFlags::default()),
        ClassDefinition::new(classes::CONTRACT, Some(classes::STORAGE))
            .with_field(FieldDefinition::new("balance", StorageType::big_integer()).initialized_to(zero()))
            .with_constructor(vec![], MemberFlags::default())
            .with_method(
                "balance",
                vec![],
                Some(StorageType::big_integer()),
                MemberFlags::view(),
            ),
        ClassDefinition::new(classes::EOA, Some(classes::CONTRACT))
            .with_field(FieldDefinition::new("nonce", StorageType::big_integer()).initialized_to(zero()))
            .with_field(FieldDefinition::new("publicKey", StorageType::string()).final_field())
            .with_constructor(vec![StorageType::string()], MemberFlags::default())
            .with_method("receive", vec![StorageType::big_integer()], None, MemberFlags::payable())
            .with_method("receive", vec![BasicType::Int.into()], None, MemberFlags::payable())
            .with_method("receive", vec![BasicType::Long.into()], None, MemberFlags::payable())
            .with_method(
                "nonce",
                vec![],
                Some(StorageType::big_integer()),
                MemberFlags::view(),
            ),
        ClassDefinition::new(classes::EVENT, Some(classes::STORAGE))
            .with_field(
                FieldDefinition::new("creator", StorageType::class(classes::CONTRACT)).final_field(),
            )
            .with_constructor(vec![], MemberFlags::entry()),
    ])
}

fn nothing(_: &mut ExecutionContext<'_>, _: &Frame) -> Result<RuntimeValue, Throw> {
    Ok(RuntimeValue::Null)
}

pub fn register(registry: &mut CodeRegistry) {
    registry
        .register_constructor(ConstructorSignature::new(classes::STORAGE, vec![]), nothing)
        .register_constructor(ConstructorSignature::new(classes::CONTRACT, vec![]), nothing)
        .register_method(
            MethodSignature::new(
                classes::CONTRACT,
                "balance",
                vec![],
                Some(StorageType::big_integer()),
            ),
            |ctx, frame| Ok(RuntimeValue::BigInteger(ctx.balance_of(frame.this()?)?)),
        );

    registry
        .register_constructor(
            ConstructorSignature::new(classes::EOA, vec![StorageType::string()]),
            |ctx, frame| {
                let public_key = frame.arg(0)?.clone();
                ctx.set_field(frame.this()?, &FieldSignature::eoa_public_key(), public_key)?;
                Ok(RuntimeValue::Null)
            },
        )
        .register_method(
            MethodSignature::new(
                classes::EOA,
                "nonce",
                vec![],
                Some(StorageType::big_integer()),
            ),
            |ctx, frame| ctx.get_field(frame.this()?, &FieldSignature::eoa_nonce()),
        );
    for amount in [
        StorageType::big_integer(),
        BasicType::Int.into(),
        BasicType::Long.into(),
    ] {
        registry.register_method(
            MethodSignature::new(classes::EOA, "receive", vec![amount], None),
            nothing,
        );
    }

    registry.register_constructor(
        ConstructorSignature::new(classes::EVENT, vec![]),
        |ctx, frame| {
            let creator = RuntimeValue::Object(frame.caller()?);
            ctx.set_field(frame.this()?, &FieldSignature::event_creator(), creator)?;
            Ok(RuntimeValue::Null)
        },
    );
}
