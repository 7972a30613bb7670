use std::fmt;

use semver::Version;

use crate::core::capability::{CapId, Capability};
use crate::core::namespace::HOST_NAMESPACE;
use crate::core::requirement::{ReqId, Requirement, Resolution};
use crate::core::wiring::Wiring;
use crate::util::Symbol;

/// Identifies a module in a [`ModuleStore`]. Ids are handed out in
/// installation order, which is the only global order the resolver relies
/// on (fragments attach in ascending id order, diagnostics sort by it).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) u32);

impl ModuleId {
    /// Placeholder owner of a capability or requirement that has not been
    /// added to a store yet.
    pub(crate) const UNSET: ModuleId = ModuleId(u32::MAX);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// A versioned unit declaring capabilities and requirements (a *revision*).
#[derive(Clone, Debug)]
pub struct Module {
    id: ModuleId,
    symbolic_name: Symbol,
    version: Version,
    capabilities: Vec<CapId>,
    requirements: Vec<ReqId>,
    wiring: Option<Wiring>,
}

impl Module {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn symbolic_name(&self) -> Symbol {
        self.symbolic_name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Present iff the module is already resolved; the resolver then treats
    /// the declared capabilities and requirements as frozen.
    pub fn wiring(&self) -> Option<&Wiring> {
        self.wiring.as_ref()
    }
}

/// Flat arena of modules, capabilities and requirements.
///
/// Modules, capabilities and requirements form a cyclic object graph
/// (modules ↔ capabilities ↔ requirements); the store flattens it into three
/// vectors keyed by stable ids so the resolver can pass two-word handles
/// around instead of reference-counted cycles.
#[derive(Default)]
pub struct ModuleStore {
    modules: Vec<Module>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
}

impl ModuleStore {
    pub fn new() -> ModuleStore {
        ModuleStore::default()
    }

    pub fn add_module(&mut self, symbolic_name: &str, version: Version) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module {
            id,
            symbolic_name: Symbol::intern(symbolic_name),
            version,
            capabilities: Vec::new(),
            requirements: Vec::new(),
            wiring: None,
        });
        id
    }

    pub fn add_capability(&mut self, owner: ModuleId, mut cap: Capability) -> CapId {
        cap.set_owner(owner);
        let id = CapId(self.capabilities.len() as u32);
        self.capabilities.push(cap);
        self.modules[owner.index()].capabilities.push(id);
        id
    }

    pub fn add_requirement(&mut self, owner: ModuleId, mut req: Requirement) -> ReqId {
        req.set_owner(owner);
        let id = ReqId(self.requirements.len() as u32);
        self.requirements.push(req);
        self.modules[owner.index()].requirements.push(id);
        id
    }

    /// Installs the finalized wiring of `module`, freezing it for future
    /// resolves.
    pub fn set_wiring(&mut self, module: ModuleId, wiring: Wiring) {
        self.modules[module.index()].wiring = Some(wiring);
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    pub fn capability(&self, id: CapId) -> &Capability {
        &self.capabilities[id.index()]
    }

    pub fn requirement(&self, id: ReqId) -> &Requirement {
        &self.requirements[id.index()]
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    pub fn wiring(&self, module: ModuleId) -> Option<&Wiring> {
        self.modules[module.index()].wiring.as_ref()
    }

    pub fn is_wired(&self, module: ModuleId) -> bool {
        self.wiring(module).is_some()
    }

    /// Declared capabilities of `module`, optionally restricted to one
    /// namespace.
    pub fn declared_capabilities<'a>(
        &'a self,
        module: ModuleId,
        namespace: Option<&'a str>,
    ) -> impl Iterator<Item = CapId> + 'a {
        self.modules[module.index()]
            .capabilities
            .iter()
            .copied()
            .filter(move |&c| match namespace {
                Some(ns) => self.capability(c).namespace().as_str() == ns,
                None => true,
            })
    }

    /// Declared requirements of `module`, optionally restricted to one
    /// namespace.
    pub fn declared_requirements<'a>(
        &'a self,
        module: ModuleId,
        namespace: Option<&'a str>,
    ) -> impl Iterator<Item = ReqId> + 'a {
        self.modules[module.index()]
            .requirements
            .iter()
            .copied()
            .filter(move |&r| match namespace {
                Some(ns) => self.requirement(r).namespace().as_str() == ns,
                None => true,
            })
    }

    /// A fragment is a module demanding attachment to a host.
    pub fn is_fragment(&self, module: ModuleId) -> bool {
        self.host_requirement(module).is_some()
    }

    pub fn host_requirement(&self, module: ModuleId) -> Option<ReqId> {
        self.declared_requirements(module, Some(HOST_NAMESPACE))
            .find(|&r| {
                let req = self.requirement(r);
                req.is_effective() && req.resolution() != Resolution::Dynamic
            })
    }

    /// `symbolic-name version`, the display form used throughout
    /// diagnostics.
    pub fn describe(&self, module: ModuleId) -> String {
        let m = self.module(module);
        format!("{} {}", m.symbolic_name(), m.version())
    }
}
