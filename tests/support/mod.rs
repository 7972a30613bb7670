//! Shared vocabulary for the resolver test suites: a registration-order
//! environment and a small module-building DSL.
#![allow(dead_code)]

use std::collections::HashMap;

use semver::Version;

use weft::core::namespace::{
    BUNDLE_NAMESPACE, HOST_NAMESPACE, PACKAGE_NAMESPACE, RESOLUTION_DIRECTIVE, RESOLUTION_DYNAMIC,
    RESOLUTION_OPTIONAL, VERSION_ATTRIBUTE, VISIBILITY_DIRECTIVE, VISIBILITY_REEXPORT,
};
use weft::{
    CapId, Capability, Environment, ModuleId, ModuleStore, ReqId, Requirement, Resolve,
    WeftResult, Wire,
};

pub fn ver(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// An environment whose preference order is registration order (module
/// insertion, then declaration order within a module), with per-requirement
/// overrides for tests that pin a specific ordering.
pub struct StaticEnvironment {
    store: ModuleStore,
    overrides: HashMap<ReqId, Vec<CapId>>,
}

impl StaticEnvironment {
    pub fn new(store: ModuleStore) -> StaticEnvironment {
        StaticEnvironment {
            store,
            overrides: HashMap::new(),
        }
    }

    pub fn prefer(&mut self, req: ReqId, caps: Vec<CapId>) {
        self.overrides.insert(req, caps);
    }

    pub fn store_mut(&mut self) -> &mut ModuleStore {
        &mut self.store
    }
}

impl Environment for StaticEnvironment {
    fn store(&self) -> &ModuleStore {
        &self.store
    }

    fn candidates(&self, requirement: ReqId, _obey_mandatory: bool) -> WeftResult<Vec<CapId>> {
        if let Some(order) = self.overrides.get(&requirement) {
            return Ok(order.clone());
        }
        let req = self.store.requirement(requirement);
        let mut out = Vec::new();
        for module in self.store.modules() {
            for c in self.store.declared_capabilities(module.id(), None) {
                if req.matches(self.store.capability(c)) {
                    out.push(c);
                }
            }
        }
        Ok(out)
    }
}

/// Builder over one module in a store.
pub struct ModuleBuilder<'a> {
    store: &'a mut ModuleStore,
    id: ModuleId,
}

pub fn module<'a>(store: &'a mut ModuleStore, name: &str) -> ModuleBuilder<'a> {
    module_v(store, name, "1.0.0")
}

pub fn module_v<'a>(store: &'a mut ModuleStore, name: &str, version: &str) -> ModuleBuilder<'a> {
    let id = store.add_module(name, ver(version));
    ModuleBuilder { store, id }
}

impl<'a> ModuleBuilder<'a> {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn cap(self, cap: Capability) -> Self {
        self.store.add_capability(self.id, cap);
        self
    }

    pub fn req(self, req: Requirement) -> Self {
        self.store.add_requirement(self.id, req);
        self
    }

    pub fn exports(self, pkg: &str) -> Self {
        self.cap(Capability::package(pkg))
    }

    pub fn exports_versioned(self, pkg: &str, version: &str) -> Self {
        self.cap(Capability::package(pkg).attr(VERSION_ATTRIBUTE, ver(version)))
    }

    pub fn exports_uses(self, pkg: &str, uses: &[&str]) -> Self {
        self.cap(Capability::package(pkg).uses(uses.iter().copied()))
    }

    pub fn imports(self, pkg: &str) -> Self {
        self.req(Requirement::package(pkg))
    }

    pub fn imports_versioned(self, pkg: &str, range: &str) -> Self {
        self.req(Requirement::package(pkg).version_req(range.parse().unwrap()))
    }

    pub fn imports_optional(self, pkg: &str) -> Self {
        self.req(Requirement::package(pkg).directive(RESOLUTION_DIRECTIVE, RESOLUTION_OPTIONAL))
    }

    pub fn dynamic_imports(self, pattern: &str) -> Self {
        self.req(Requirement::package(pattern).directive(RESOLUTION_DIRECTIVE, RESOLUTION_DYNAMIC))
    }

    /// A bundle capability named after the module, making it requirable.
    pub fn bundle_cap(self, name: &str) -> Self {
        self.cap(Capability::new(BUNDLE_NAMESPACE).attr(BUNDLE_NAMESPACE, name))
    }

    pub fn requires_bundle(self, name: &str) -> Self {
        self.req(Requirement::new(BUNDLE_NAMESPACE).filter_attr(BUNDLE_NAMESPACE, name))
    }

    pub fn reexports_bundle(self, name: &str) -> Self {
        self.req(
            Requirement::new(BUNDLE_NAMESPACE)
                .filter_attr(BUNDLE_NAMESPACE, name)
                .directive(VISIBILITY_DIRECTIVE, VISIBILITY_REEXPORT),
        )
    }

    /// A host capability named after the module, making it a fragment
    /// host.
    pub fn host_cap(self, name: &str) -> Self {
        self.cap(Capability::new(HOST_NAMESPACE).attr(HOST_NAMESPACE, name))
    }

    pub fn fragment_of(self, host: &str) -> Self {
        self.req(Requirement::new(HOST_NAMESPACE).filter_attr(HOST_NAMESPACE, host))
    }
}

pub fn module_named(store: &ModuleStore, name: &str) -> ModuleId {
    store
        .modules()
        .find(|m| m.symbolic_name().as_str() == name)
        .unwrap_or_else(|| panic!("no module named `{}`", name))
        .id()
}

/// The requirement of `module` importing `pkg` (used for preference
/// overrides).
pub fn import_req(store: &ModuleStore, module: ModuleId, pkg: &str) -> ReqId {
    store
        .declared_requirements(module, Some(PACKAGE_NAMESPACE))
        .find(|&r| {
            store.requirement(r).key().map(|k| k.as_str()) == Some(pkg)
        })
        .unwrap_or_else(|| panic!("no import of `{}`", pkg))
}

pub fn package_cap(store: &ModuleStore, module: ModuleId, pkg: &str) -> CapId {
    store
        .declared_capabilities(module, Some(PACKAGE_NAMESPACE))
        .find(|&c| store.capability(c).key().map(|k| k.as_str()) == Some(pkg))
        .unwrap_or_else(|| panic!("no export of `{}`", pkg))
}

/// The package wire of `requirer` for `pkg`, if any.
pub fn package_wire<'r>(
    store: &ModuleStore,
    resolve: &'r Resolve,
    requirer: ModuleId,
    pkg: &str,
) -> Option<&'r Wire> {
    resolve.wires(requirer)?.iter().find(|w| {
        let cap = store.capability(w.capability);
        cap.namespace().as_str() == PACKAGE_NAMESPACE
            && cap.key().map(|k| k.as_str()) == Some(pkg)
    })
}

/// Asserts that `requirer` ended up importing `pkg` from `provider`.
pub fn assert_wired_to(
    store: &ModuleStore,
    resolve: &Resolve,
    requirer: ModuleId,
    pkg: &str,
    provider: ModuleId,
) {
    let wire = package_wire(store, resolve, requirer, pkg).unwrap_or_else(|| {
        panic!(
            "`{}` has no wire for `{}`",
            store.describe(requirer),
            pkg
        )
    });
    assert_eq!(
        wire.provider,
        provider,
        "`{}` imports `{}` from `{}`, expected `{}`",
        store.describe(requirer),
        pkg,
        store.describe(wire.provider),
        store.describe(provider),
    );
}
