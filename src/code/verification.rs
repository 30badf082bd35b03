// Vérification - Contrôles d'un jar avant son installation
use super::jar::{ClassKind, JarManifest};
use super::registry::CodeRegistry;
use crate::execution::runtime::RuntimeValue;
use crate::execution::{ClassLoader, ClassLoaderError, Heap};
use crate::types::{classes, BasicType, StorageType, TransactionReference};
use std::collections::HashSet;

/// Checks a jar against the classes already visible to it and returns the
/// bytes to install
pub fn verify_jar(
    manifest: &JarManifest,
    loader: &ClassLoader,
    registry: &CodeRegistry,
    position: TransactionReference,
) -> Result<Vec<u8>, VerificationError> {
    let mut combined = loader.clone();
    combined
        .add_jar(position, manifest.clone())
        .map_err(|e| match e {
            ClassLoaderError::DuplicateClass { name, .. } => VerificationError::DuplicateClass(name),
            other => VerificationError::Malformed(other.to_string()),
        })?;

    for class in &manifest.classes {
        let name = class.name.as_str();

        if let Some(superclass) = &class.superclass {
            if !combined.is_known(superclass) {
                return Err(VerificationError::UnknownClass {
                    class: name.to_string(),
                    referenced: superclass.clone(),
                });
            }
            if superclass == classes::STRING
                || superclass == classes::BIG_INTEGER
                || combined.is_enum(superclass)
            {
                return Err(VerificationError::FinalSuperclass {
                    class: name.to_string(),
                    superclass: superclass.clone(),
                });
            }
        }
        if has_cyclic_ancestry(&combined, name) {
            return Err(VerificationError::CyclicInheritance(name.to_string()));
        }

        match &class.kind {
            ClassKind::Enum { elements } => {
                if class.superclass.is_some() {
                    return Err(VerificationError::IllegalEnum {
                        class: name.to_string(),
                        reason: "enums cannot extend a class".into(),
                    });
                }
                if elements.is_empty() {
                    return Err(VerificationError::IllegalEnum {
                        class: name.to_string(),
                        reason: "no elements".into(),
                    });
                }
                let mut unique = HashSet::new();
                if let Some(duplicate) = elements.iter().find(|e| !unique.insert(e.as_str())) {
                    return Err(VerificationError::IllegalEnum {
                        class: name.to_string(),
                        reason: format!("duplicate element {}", duplicate),
                    });
                }
            }
            ClassKind::Class => {}
        }

        let mut field_names = HashSet::new();
        for field in &class.fields {
            if !combined.is_storage(name) {
                return Err(VerificationError::FieldOutsideStorage {
                    class: name.to_string(),
                    field: field.name.clone(),
                });
            }
            if !field_names.insert(field.name.as_str()) {
                return Err(VerificationError::DuplicateField {
                    class: name.to_string(),
                    field: field.name.clone(),
                });
            }
            check_type(&combined, name, &field.field_type)?;
            if let Some(initial) = &field.initial_value {
                let accepted = RuntimeValue::from_scalar(initial)
                    .map(|value| combined.accepts(&field.field_type, &value, &Heap::new()))
                    .unwrap_or(false);
                if !accepted {
                    return Err(VerificationError::IllegalInitialValue {
                        class: name.to_string(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        for constructor in &class.constructors {
            let signature = class.constructor_signature(constructor);
            for formal in &constructor.formals {
                check_type(&combined, name, formal)?;
            }
            if !registry.has_constructor(&signature) {
                return Err(VerificationError::MissingBody(signature.to_string()));
            }
            if constructor.flags.payable
                && (!constructor.flags.entry
                    || !combined.is_contract(name)
                    || !is_amount(constructor.formals.first()))
            {
                return Err(VerificationError::IllegalPayable(signature.to_string()));
            }
        }

        for method in &class.methods {
            let signature = class.method_signature(method);
            for formal in method.formals.iter().chain(method.returns.iter()) {
                check_type(&combined, name, formal)?;
            }
            if !registry.has_method(&signature) {
                return Err(VerificationError::MissingBody(signature.to_string()));
            }
            if method.flags.payable
                && (method.is_static
                    || !method.flags.entry
                    || !combined.is_contract(name)
                    || !is_amount(method.formals.first()))
            {
                return Err(VerificationError::IllegalPayable(signature.to_string()));
            }
        }
    }

    manifest
        .to_bytes()
        .map_err(|e| VerificationError::Malformed(e.to_string()))
}

fn has_cyclic_ancestry(loader: &ClassLoader, name: &str) -> bool {
    let mut visited = HashSet::new();
    let mut next = Some(name);
    while let Some(current) = next {
        if !visited.insert(current) {
            return true;
        }
        next = loader.class(current).and_then(|c| c.superclass.as_deref());
    }
    false
}

fn check_type(loader: &ClassLoader, class: &str, field_type: &StorageType) -> Result<(), VerificationError> {
    match field_type.class_name() {
        Some(referenced) if !loader.is_known(referenced) => Err(VerificationError::UnknownClass {
            class: class.to_string(),
            referenced: referenced.to_string(),
        }),
        _ => Ok(()),
    }
}

fn is_amount(formal: Option<&StorageType>) -> bool {
    matches!(
        formal,
        Some(StorageType::Basic(BasicType::Int)) | Some(StorageType::Basic(BasicType::Long))
    ) || formal.map(StorageType::is_big_integer).unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Malformed jar: {0}")]
    Malformed(String),

    #[error("Class {0} is already defined")]
    DuplicateClass(String),

    #[error("Class {class} refers to unknown class {referenced}")]
    UnknownClass { class: String, referenced: String },

    #[error("Class {class} cannot extend {superclass}")]
    FinalSuperclass { class: String, superclass: String },

    #[error("Cyclic inheritance through {0}")]
    CyclicInheritance(String),

    #[error("Illegal enum {class}: {reason}")]
    IllegalEnum { class: String, reason: String },

    #[error("Field {field} of {class} is not in a storage class")]
    FieldOutsideStorage { class: String, field: String },

    #[error("Field {field} is declared twice in {class}")]
    DuplicateField { class: String, field: String },

    #[error("Illegal initial value for field {field} of {class}")]
    IllegalInitialValue { class: String, field: String },

    #[error("No code registered for {0}")]
    MissingBody(String),

    #[error("Illegal payable member {0}")]
    IllegalPayable(String),
}
