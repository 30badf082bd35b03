// Jar - Description des classes installables
use crate::types::{ConstructorSignature, FieldSignature, MethodSignature, StorageType, StorageValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    /// Enumeration with its elements, in declaration order
    Enum { elements: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: StorageType,
    pub is_final: bool,
    /// Constant the field holds in a freshly created object, instead of the
    /// default of its type
    pub initial_value: Option<StorageValue>,
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: StorageType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            is_final: false,
            initial_value: None,
        }
    }

    pub fn final_field(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn initialized_to(mut self, value: StorageValue) -> Self {
        self.initial_value = Some(value);
        self
    }
}

/// Annotations of a constructor or method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFlags {
    /// Receives the calling contract
    pub entry: bool,
    /// First formal is an amount moved from the caller before the body runs
    pub payable: bool,
    /// Must not have side effects beyond the caller's balance and nonce
    pub view: bool,
    /// Checked exceptions escaping the member are legitimate outcomes
    pub throws_exceptions: bool,
}

impl MemberFlags {
    pub fn entry() -> Self {
        Self {
            entry: true,
            ..Self::default()
        }
    }

    pub fn payable() -> Self {
        Self {
            entry: true,
            payable: true,
            ..Self::default()
        }
    }

    pub fn view() -> Self {
        Self {
            view: true,
            ..Self::default()
        }
    }

    pub fn throwing(mut self) -> Self {
        self.throws_exceptions = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDefinition {
    pub formals: Vec<StorageType>,
    pub flags: MemberFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDefinition {
    pub name: String,
    pub formals: Vec<StorageType>,
    pub returns: Option<StorageType>,
    pub is_static: bool,
    pub flags: MemberFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub name: String,
    /// `None` for classes extending the root object class
    pub superclass: Option<String>,
    pub kind: ClassKind,
    pub fields: Vec<FieldDefinition>,
    pub constructors: Vec<ConstructorDefinition>,
    pub methods: Vec<MethodDefinition>,
}

impl ClassDefinition {
    pub fn new(name: &str, superclass: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
            kind: ClassKind::Class,
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn enumeration(name: &str, elements: &[&str]) -> Self {
        Self {
            kind: ClassKind::Enum {
                elements: elements.iter().map(|e| e.to_string()).collect(),
            },
            ..Self::new(name, None)
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_constructor(mut self, formals: Vec<StorageType>, flags: MemberFlags) -> Self {
        self.constructors.push(ConstructorDefinition { formals, flags });
        self
    }

    pub fn with_method(
        mut self,
        name: &str,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
        flags: MemberFlags,
    ) -> Self {
        self.methods.push(MethodDefinition {
            name: name.to_string(),
            formals,
            returns,
            is_static: false,
            flags,
        });
        self
    }

    pub fn with_static_method(
        mut self,
        name: &str,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
        flags: MemberFlags,
    ) -> Self {
        self.methods.push(MethodDefinition {
            name: name.to_string(),
            formals,
            returns,
            is_static: true,
            flags,
        });
        self
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, ClassKind::Enum { .. })
    }

    pub fn field_signature(&self, field: &FieldDefinition) -> FieldSignature {
        FieldSignature::new(&self.name, &field.name, field.field_type.clone())
    }

    pub fn constructor_signature(&self, constructor: &ConstructorDefinition) -> ConstructorSignature {
        ConstructorSignature::new(&self.name, constructor.formals.clone())
    }

    pub fn method_signature(&self, method: &MethodDefinition) -> MethodSignature {
        MethodSignature::new(
            &self.name,
            &method.name,
            method.formals.clone(),
            method.returns.clone(),
        )
    }

    pub fn constructor(&self, formals: &[StorageType]) -> Option<&ConstructorDefinition> {
        self.constructors.iter().find(|c| c.formals == formals)
    }

    /// Method declared in this very class
    pub fn declared_method(&self, signature: &MethodSignature) -> Option<&MethodDefinition> {
        self.methods.iter().find(|m| {
            m.name == signature.name && m.formals == signature.formals && m.returns == signature.returns
        })
    }
}

/// Installable unit of code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JarManifest {
    pub classes: Vec<ClassDefinition>,
}

impl JarManifest {
    pub fn new(classes: Vec<ClassDefinition>) -> Self {
        Self { classes }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BasicType;

    #[test]
    fn test_manifest_bytes_round_trip() {
        let manifest = JarManifest::new(vec![ClassDefinition::new("a.Counter", Some("kratos.lang.Storage"))
            .with_field(FieldDefinition::new("count", BasicType::Int.into()))
            .with_constructor(vec![], MemberFlags::default())
            .with_method("increment", vec![], None, MemberFlags::default())]);

        let bytes = manifest.to_bytes().unwrap();
        assert_eq!(JarManifest::from_bytes(&bytes).unwrap(), manifest);
        assert!(JarManifest::from_bytes(&[0xff, 0xff]).is_err());
    }

    #[test]
    fn test_member_lookup() {
        let class = ClassDefinition::new("a.A", None)
            .with_constructor(vec![BasicType::Int.into()], MemberFlags::payable())
            .with_method("get", vec![], Some(BasicType::Int.into()), MemberFlags::view());

        assert!(class.constructor(&[BasicType::Int.into()]).unwrap().flags.payable);
        assert!(class.constructor(&[]).is_none());

        let get = MethodSignature::new("a.A", "get", vec![], Some(BasicType::Int.into()));
        assert!(class.declared_method(&get).unwrap().flags.view);
        let wrong_return = MethodSignature::new("a.A", "get", vec![], None);
        assert!(class.declared_method(&wrong_return).is_none());
    }
}
