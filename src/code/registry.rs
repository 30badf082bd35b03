// Registre - Corps exécutables des constructeurs et méthodes
//
// A jar describes classes; the executable bodies of their members are native
// functions injected by the node, looked up by signature.
use crate::execution::{ExecutionContext, ObjectId, RuntimeValue, Throw};
use crate::types::{ConstructorSignature, MethodSignature};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Activation of a constructor or method
#[derive(Debug, Clone)]
pub struct Frame {
    /// Receiver, or the object under construction
    pub this: Option<ObjectId>,
    /// Calling contract, for entries only
    pub caller: Option<ObjectId>,
    pub args: Vec<RuntimeValue>,
}

impl Frame {
    pub fn this(&self) -> Result<ObjectId, Throw> {
        self.this
            .ok_or_else(|| Throw::runtime("IllegalStateException", "no receiver in static code"))
    }

    pub fn caller(&self) -> Result<ObjectId, Throw> {
        self.caller
            .ok_or_else(|| Throw::runtime("IllegalStateException", "no caller outside entries"))
    }

    pub fn arg(&self, index: usize) -> Result<&RuntimeValue, Throw> {
        self.args.get(index).ok_or_else(|| {
            Throw::runtime(
                "IllegalArgumentException",
                format!("missing argument {}", index),
            )
        })
    }
}

pub type Body =
    Arc<dyn Fn(&mut ExecutionContext<'_>, &Frame) -> Result<RuntimeValue, Throw> + Send + Sync>;

#[derive(Default, Clone)]
pub struct CodeRegistry {
    constructors: HashMap<ConstructorSignature, Body>,
    methods: HashMap<MethodSignature, Body>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the bodies of the kernel classes
    pub fn with_kernel() -> Self {
        let mut registry = Self::new();
        super::kernel::register(&mut registry);
        registry
    }

    pub fn register_constructor<F>(&mut self, signature: ConstructorSignature, body: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext<'_>, &Frame) -> Result<RuntimeValue, Throw> + Send + Sync + 'static,
    {
        self.constructors.insert(signature, Arc::new(body));
        self
    }

    pub fn register_method<F>(&mut self, signature: MethodSignature, body: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext<'_>, &Frame) -> Result<RuntimeValue, Throw> + Send + Sync + 'static,
    {
        self.methods.insert(signature, Arc::new(body));
        self
    }

    pub fn constructor(&self, signature: &ConstructorSignature) -> Option<Body> {
        self.constructors.get(signature).cloned()
    }

    pub fn method(&self, signature: &MethodSignature) -> Option<Body> {
        self.methods.get(signature).cloned()
    }

    pub fn has_constructor(&self, signature: &ConstructorSignature) -> bool {
        self.constructors.contains_key(signature)
    }

    pub fn has_method(&self, signature: &MethodSignature) -> bool {
        self.methods.contains_key(signature)
    }
}

impl fmt::Debug for CodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CodeRegistry")
            .field("constructors", &self.constructors.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{classes, StorageType};

    #[test]
    fn test_kernel_bodies_are_registered() {
        let registry = CodeRegistry::with_kernel();
        assert!(registry.has_constructor(&ConstructorSignature::new(
            classes::EOA,
            vec![StorageType::string()]
        )));
        assert!(registry.has_method(&MethodSignature::new(
            classes::CONTRACT,
            "balance",
            vec![],
            Some(StorageType::big_integer())
        )));
        assert!(!registry.has_method(&MethodSignature::new(classes::CONTRACT, "none", vec![], None)));
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame {
            this: None,
            caller: None,
            args: vec![RuntimeValue::Int(3)],
        };
        assert!(frame.this().is_err());
        assert!(frame.caller().is_err());
        assert_eq!(frame.arg(0).unwrap(), &RuntimeValue::Int(3));
        assert!(frame.arg(1).is_err());
    }
}
