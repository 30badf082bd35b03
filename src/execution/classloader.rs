// ClassLoader - Résolution des classes visibles depuis un classpath
use super::runtime::{Heap, RuntimeValue};
use crate::code::jar::{ClassDefinition, ConstructorDefinition, JarManifest, MethodDefinition};
use crate::storage::{ChainStore, StoreError};
use crate::types::{
    classes, BasicType, FieldSignature, MethodSignature, StorageType, StorageValue,
    TransactionReference,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct LoadedClass {
    definition: ClassDefinition,
    jar: TransactionReference,
}

/// Field of a class chain, with what the engine needs to materialize it
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub signature: FieldSignature,
    pub is_final: bool,
    pub eager: bool,
    pub initial_value: Option<StorageValue>,
}

/// Classes of a classpath, each mapped to the transaction that installed it
#[derive(Debug, Clone, Default)]
pub struct ClassLoader {
    classes: HashMap<String, LoadedClass>,
    jars: Vec<TransactionReference>,
}

impl ClassLoader {
    /// Loads the jars installed at `classpath` and, transitively, their
    /// dependencies. Dependencies are loaded before the jars needing them.
    pub fn new(
        store: &dyn ChainStore,
        classpath: &[TransactionReference],
        verification_version: u8,
    ) -> Result<Self, ClassLoaderError> {
        let mut loader = Self::default();
        let mut visited = HashSet::new();
        for jar in classpath {
            loader.load(store, *jar, verification_version, &mut visited)?;
        }
        debug!(
            "Classpath {:?} resolved: {} jars, {} classes",
            classpath,
            loader.jars.len(),
            loader.classes.len()
        );
        Ok(loader)
    }

    fn load(
        &mut self,
        store: &dyn ChainStore,
        jar: TransactionReference,
        verification_version: u8,
        visited: &mut HashSet<TransactionReference>,
    ) -> Result<(), ClassLoaderError> {
        if !visited.insert(jar) {
            return Ok(());
        }

        let response = store.response_at(jar)?;
        let (bytes, dependencies, version) =
            response.installed_jar().ok_or(ClassLoaderError::NotAJar(jar))?;
        if version != verification_version {
            return Err(ClassLoaderError::VersionMismatch {
                jar,
                found: version,
                expected: verification_version,
            });
        }
        let manifest = JarManifest::from_bytes(bytes).map_err(|e| ClassLoaderError::MalformedJar {
            jar,
            reason: e.to_string(),
        })?;
        let dependencies = dependencies.to_vec();

        for dependency in dependencies {
            self.load(store, dependency, verification_version, visited)?;
        }
        self.add_jar(jar, manifest)
    }

    /// Makes the classes of `manifest` visible as installed at `jar`
    pub fn add_jar(
        &mut self,
        jar: TransactionReference,
        manifest: JarManifest,
    ) -> Result<(), ClassLoaderError> {
        for definition in manifest.classes {
            if self.classes.contains_key(&definition.name)
                || classes::BUILT_IN.contains(&definition.name.as_str())
            {
                return Err(ClassLoaderError::DuplicateClass {
                    name: definition.name,
                    jar,
                });
            }
            self.classes
                .insert(definition.name.clone(), LoadedClass { definition, jar });
        }
        self.jars.push(jar);
        Ok(())
    }

    pub fn jar_count(&self) -> usize {
        self.jars.len()
    }

    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.get(name).map(|c| &c.definition)
    }

    /// Transaction that installed the class
    pub fn jar_of(&self, name: &str) -> Option<TransactionReference> {
        self.classes.get(name).map(|c| c.jar)
    }

    pub fn is_known(&self, name: &str) -> bool {
        classes::BUILT_IN.contains(&name) || self.classes.contains_key(name)
    }

    /// Walks the superclass chain, `name` first. Stops at the root object
    /// class, at an unknown class or after a cycle.
    pub fn ancestors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ClassDefinition> + 'a {
        let mut next = self.class(name);
        let mut steps = 0;
        std::iter::from_fn(move || {
            let current = next?;
            steps += 1;
            if steps > self.classes.len() {
                return None;
            }
            next = current.superclass.as_deref().and_then(|s| self.class(s));
            Some(current)
        })
    }

    pub fn is_subclass_of(&self, name: &str, ancestor: &str) -> bool {
        if name == ancestor {
            return self.is_known(name);
        }
        if ancestor == classes::OBJECT {
            return self.is_known(name);
        }
        self.ancestors(name).any(|c| c.name == ancestor)
    }

    pub fn is_storage(&self, name: &str) -> bool {
        self.is_subclass_of(name, classes::STORAGE)
    }

    pub fn is_contract(&self, name: &str) -> bool {
        self.is_subclass_of(name, classes::CONTRACT)
    }

    pub fn is_eoa(&self, name: &str) -> bool {
        self.is_subclass_of(name, classes::EOA)
    }

    pub fn is_event(&self, name: &str) -> bool {
        self.is_subclass_of(name, classes::EVENT)
    }

    pub fn is_enum(&self, name: &str) -> bool {
        self.class(name).map(ClassDefinition::is_enum).unwrap_or(false)
    }

    /// Values of these types are loaded together with their object
    pub fn is_eager_type(&self, field_type: &StorageType) -> bool {
        match field_type {
            StorageType::Basic(_) => true,
            StorageType::Class(class) => {
                field_type.is_string() || field_type.is_big_integer() || self.is_enum(class.name())
            }
        }
    }

    /// Fields of the class and of all its superclasses
    pub fn fields_of(&self, name: &str) -> Vec<FieldInfo> {
        self.ancestors(name)
            .flat_map(|class| {
                class.fields.iter().map(move |field| FieldInfo {
                    signature: class.field_signature(field),
                    is_final: field.is_final,
                    eager: self.is_eager_type(&field.field_type),
                    initial_value: field.initial_value.clone(),
                })
            })
            .collect()
    }

    pub fn constructor(&self, class_name: &str, formals: &[StorageType]) -> Option<&ConstructorDefinition> {
        self.class(class_name)?.constructor(formals)
    }

    /// Virtual lookup: the first class, from `receiver_class` upwards,
    /// declaring a method matching `signature`. Returns the signature of the
    /// implementation found.
    pub fn resolve_method(
        &self,
        receiver_class: &str,
        signature: &MethodSignature,
    ) -> Option<(MethodSignature, &MethodDefinition)> {
        self.ancestors(receiver_class).find_map(|class| {
            class
                .declared_method(signature)
                .map(|method| (class.method_signature(method), method))
        })
    }

    /// Whether `value` can be stored in a field or formal of type `expected`
    pub fn accepts(&self, expected: &StorageType, value: &RuntimeValue, heap: &Heap) -> bool {
        match (expected, value) {
            (StorageType::Basic(basic), value) => matches!(
                (basic, value),
                (BasicType::Boolean, RuntimeValue::Boolean(_))
                    | (BasicType::Byte, RuntimeValue::Byte(_))
                    | (BasicType::Char, RuntimeValue::Char(_))
                    | (BasicType::Short, RuntimeValue::Short(_))
                    | (BasicType::Int, RuntimeValue::Int(_))
                    | (BasicType::Long, RuntimeValue::Long(_))
                    | (BasicType::Float, RuntimeValue::Float(_))
                    | (BasicType::Double, RuntimeValue::Double(_))
            ),
            (StorageType::Class(_), RuntimeValue::Null) => true,
            (StorageType::Class(class), value) => {
                let expected = class.name();
                match value {
                    RuntimeValue::String(_) => {
                        expected == classes::STRING || expected == classes::OBJECT
                    }
                    RuntimeValue::BigInteger(_) => {
                        expected == classes::BIG_INTEGER || expected == classes::OBJECT
                    }
                    RuntimeValue::Enum { class_name, .. } => {
                        self.is_subclass_of(class_name, expected)
                    }
                    RuntimeValue::Object(id) => heap
                        .get(*id)
                        .map(|object| self.is_subclass_of(&object.class_name, expected))
                        .unwrap_or(false),
                    _ => false,
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassLoaderError {
    #[error("Transaction {0} did not install a jar")]
    NotAJar(TransactionReference),

    #[error("Jar {jar} was verified with version {found}, expected {expected}")]
    VersionMismatch {
        jar: TransactionReference,
        found: u8,
        expected: u8,
    },

    #[error("Malformed jar at {jar}: {reason}")]
    MalformedJar {
        jar: TransactionReference,
        reason: String,
    },

    #[error("Class {name} of jar {jar} is already defined")]
    DuplicateClass {
        name: String,
        jar: TransactionReference,
    },

    #[error("Unknown class {0}")]
    UnknownClass(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::jar::{FieldDefinition, MemberFlags};
    use crate::code::kernel;
    use crate::storage::MemoryStore;
    use crate::types::{
        JarStoreInitialTransactionRequest, TransactionResponse,
    };

    fn install(store: &MemoryStore, manifest: &JarManifest, dependencies: Vec<TransactionReference>, version: u8) -> TransactionReference {
        let jar = manifest.to_bytes().unwrap();
        store
            .append(
                JarStoreInitialTransactionRequest {
                    jar: jar.clone(),
                    dependencies: dependencies.clone(),
                }
                .into(),
                TransactionResponse::JarStoreInitial {
                    verified_jar: jar,
                    dependencies,
                    verification_version: version,
                },
            )
            .unwrap()
    }

    fn counter_jar() -> JarManifest {
        JarManifest::new(vec![
            ClassDefinition::new("a.Counter", Some(classes::CONTRACT))
                .with_field(FieldDefinition::new("count", BasicType::Int.into()))
                .with_field(FieldDefinition::new("owner", StorageType::class(classes::CONTRACT)))
                .with_field(FieldDefinition::new("color", StorageType::class("a.Color")))
                .with_constructor(vec![], MemberFlags::default()),
            ClassDefinition::enumeration("a.Color", &["RED", "GREEN"]),
        ])
    }

    #[test]
    fn test_classpath_resolves_dependencies() {
        let store = MemoryStore::new();
        let base = install(&store, &kernel::manifest(), vec![], 0);
        let app = install(&store, &counter_jar(), vec![base], 0);

        let loader = ClassLoader::new(&store, &[app], 0).unwrap();
        assert_eq!(loader.jar_count(), 2);
        assert_eq!(loader.jar_of("a.Counter"), Some(app));
        assert_eq!(loader.jar_of(classes::EOA), Some(base));
        assert!(loader.is_contract("a.Counter"));
        assert!(loader.is_storage("a.Counter"));
        assert!(!loader.is_eoa("a.Counter"));
        assert!(loader.is_subclass_of("a.Color", classes::OBJECT));
        assert!(!loader.is_storage("a.Color"));
    }

    #[test]
    fn test_fields_of_class_chain() {
        let store = MemoryStore::new();
        let base = install(&store, &kernel::manifest(), vec![], 0);
        let app = install(&store, &counter_jar(), vec![base], 0);
        let loader = ClassLoader::new(&store, &[app], 0).unwrap();

        let fields = loader.fields_of("a.Counter");
        let eager: Vec<(&str, bool)> = fields
            .iter()
            .map(|f| (f.signature.name.as_str(), f.eager))
            .collect();
        assert_eq!(
            eager,
            vec![("count", true), ("owner", false), ("color", true), ("balance", true)]
        );
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let store = MemoryStore::new();
        let base = install(&store, &kernel::manifest(), vec![], 1);
        assert!(matches!(
            ClassLoader::new(&store, &[base], 0),
            Err(ClassLoaderError::VersionMismatch { found: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_classes_are_refused() {
        let store = MemoryStore::new();
        let base = install(&store, &kernel::manifest(), vec![], 0);
        let again = install(&store, &kernel::manifest(), vec![base], 0);
        assert!(matches!(
            ClassLoader::new(&store, &[again], 0),
            Err(ClassLoaderError::DuplicateClass { .. })
        ));
    }

    #[test]
    fn test_virtual_lookup() {
        let store = MemoryStore::new();
        let base = install(&store, &kernel::manifest(), vec![], 0);
        let loader = ClassLoader::new(&store, &[base], 0).unwrap();

        let balance = MethodSignature::new(
            classes::CONTRACT,
            "balance",
            vec![],
            Some(StorageType::big_integer()),
        );
        let (found, method) = loader.resolve_method(classes::EOA, &balance).unwrap();
        assert_eq!(found.defining_class.name(), classes::CONTRACT);
        assert!(method.flags.view);
    }
}
