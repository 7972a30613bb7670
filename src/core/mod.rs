pub use self::capability::{CapId, Capability, Value};
pub use self::environment::Environment;
pub use self::module::{Module, ModuleId, ModuleStore};
pub use self::requirement::{ReqId, Requirement, Resolution, Visibility};
pub use self::resolver::{FailureKind, Resolve, ResolveFailure, Resolver};
pub use self::wiring::{Wire, Wiring};

pub mod capability;
pub mod environment;
pub mod module;
pub mod namespace;
pub mod requirement;
pub mod resolver;
pub mod wiring;
