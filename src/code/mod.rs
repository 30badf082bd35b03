// Code - Jars, corps exécutables et vérification
pub mod jar;
pub mod kernel;
pub mod registry;
pub mod verification;

pub use jar::{ClassDefinition, ClassKind, FieldDefinition, JarManifest, MemberFlags};
pub use registry::{Body, CodeRegistry, Frame};
pub use verification::{verify_jar, VerificationError};
