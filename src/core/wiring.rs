use crate::core::capability::CapId;
use crate::core::module::ModuleId;
use crate::core::requirement::ReqId;

/// A realized requirement→capability edge between two modules.
///
/// Wires always name declared capabilities and requirements: hosted
/// wrappers used internally during resolution are unwrapped before
/// emission, so consumers see the declaring fragment, not its host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wire {
    pub requirer: ModuleId,
    pub requirement: ReqId,
    pub provider: ModuleId,
    pub capability: CapId,
}

/// The finalized wiring of an already-resolved module. Once a module has a
/// `Wiring` the resolver treats its capabilities and requirements as frozen
/// and only reads them, never re-resolves them.
#[derive(Clone, Debug, Default)]
pub struct Wiring {
    wires: Vec<Wire>,
    capabilities: Vec<CapId>,
    requirements: Vec<ReqId>,
}

impl Wiring {
    pub fn new(wires: Vec<Wire>, capabilities: Vec<CapId>, requirements: Vec<ReqId>) -> Wiring {
        Wiring {
            wires,
            capabilities,
            requirements,
        }
    }

    /// The wires this module required, in emission order.
    pub fn required_wires(&self) -> &[Wire] {
        &self.wires
    }

    /// The capabilities this module provides, post-substitution.
    pub fn capabilities(&self) -> &[CapId] {
        &self.capabilities
    }

    pub fn requirements(&self) -> &[ReqId] {
        &self.requirements
    }
}
