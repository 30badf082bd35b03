// Types du moteur d'exécution
pub mod primitives;
pub mod reference;
pub mod request;
pub mod response;
pub mod signatures;
pub mod update;
pub mod value;

pub use primitives::*;
pub use reference::*;
pub use request::*;
pub use response::*;
pub use signatures::*;
pub use update::*;
pub use value::*;
