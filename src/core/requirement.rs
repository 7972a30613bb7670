use std::collections::BTreeMap;
use std::fmt;

use semver::VersionReq;

use crate::core::capability::{Capability, Value};
use crate::core::module::ModuleId;
use crate::core::namespace::{
    EFFECTIVE_DIRECTIVE, EFFECTIVE_RESOLVE, PACKAGE_NAMESPACE, RESOLUTION_DIRECTIVE,
    RESOLUTION_DYNAMIC, RESOLUTION_OPTIONAL, VERSION_ATTRIBUTE, VISIBILITY_DIRECTIVE,
    VISIBILITY_REEXPORT,
};
use crate::util::Symbol;

/// Identifies a declared requirement in a [`crate::core::ModuleStore`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReqId(pub(crate) u32);

impl ReqId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ReqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// How a requirement must be satisfied for its owner to resolve.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Mandatory,
    Optional,
    Dynamic,
}

/// Visibility of a bundle requirement to the requirer's own dependents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Reexport,
}

/// A declared requirement: a demand that some capability in `namespace`
/// match the filter. The filter here is deliberately simple (an
/// attribute-equality map plus an optional version range) because filter
/// *evaluation* belongs to the environment, not the resolver;
/// [`Requirement::matches`] exists for environments that want it.
#[derive(Clone, Debug)]
pub struct Requirement {
    owner: ModuleId,
    namespace: Symbol,
    filter: BTreeMap<Symbol, Value>,
    version: Option<VersionReq>,
    directives: BTreeMap<Symbol, Symbol>,
}

impl Requirement {
    pub fn new(namespace: &str) -> Requirement {
        Requirement {
            owner: ModuleId::UNSET,
            namespace: Symbol::intern(namespace),
            filter: BTreeMap::new(),
            version: None,
            directives: BTreeMap::new(),
        }
    }

    /// A package import of `name`, the common case.
    pub fn package(name: &str) -> Requirement {
        Requirement::new(PACKAGE_NAMESPACE).filter_attr(PACKAGE_NAMESPACE, name)
    }

    pub fn filter_attr(mut self, key: &str, value: impl Into<Value>) -> Requirement {
        self.filter.insert(Symbol::intern(key), value.into());
        self
    }

    pub fn version_req(mut self, req: VersionReq) -> Requirement {
        self.version = Some(req);
        self
    }

    pub fn directive(mut self, key: &str, value: &str) -> Requirement {
        self.directives
            .insert(Symbol::intern(key), Symbol::intern(value));
        self
    }

    pub(crate) fn set_owner(&mut self, owner: ModuleId) {
        self.owner = owner;
    }

    pub fn owner(&self) -> ModuleId {
        self.owner
    }

    pub fn namespace(&self) -> Symbol {
        self.namespace
    }

    pub fn directives(&self) -> &BTreeMap<Symbol, Symbol> {
        &self.directives
    }

    pub fn filter(&self) -> &BTreeMap<Symbol, Value> {
        &self.filter
    }

    /// The namespace key this requirement filters on, if it pins one by
    /// equality (e.g. the package name of an import).
    pub fn key(&self) -> Option<Symbol> {
        match self.filter.get(&self.namespace) {
            Some(Value::Str(s)) => Some(*s),
            _ => None,
        }
    }

    pub fn resolution(&self) -> Resolution {
        let key = Symbol::intern(RESOLUTION_DIRECTIVE);
        match self.directives.get(&key).map(|v| v.as_str()) {
            Some(RESOLUTION_OPTIONAL) => Resolution::Optional,
            Some(RESOLUTION_DYNAMIC) => Resolution::Dynamic,
            _ => Resolution::Mandatory,
        }
    }

    pub fn visibility(&self) -> Visibility {
        let key = Symbol::intern(VISIBILITY_DIRECTIVE);
        match self.directives.get(&key).map(|v| v.as_str()) {
            Some(VISIBILITY_REEXPORT) => Visibility::Reexport,
            _ => Visibility::Private,
        }
    }

    pub fn is_effective(&self) -> bool {
        match self.directives.get(&Symbol::intern(EFFECTIVE_DIRECTIVE)) {
            Some(v) => v.as_str() == EFFECTIVE_RESOLVE,
            None => true,
        }
    }

    /// Whether `cap` satisfies this requirement. All filter attributes must
    /// match by equality (the namespace key of a dynamic import may be a
    /// `*` or `prefix.*` pattern), and the capability's `version` attribute
    /// must fall in the version range when one is set.
    pub fn matches(&self, cap: &Capability) -> bool {
        if cap.namespace() != self.namespace {
            return false;
        }
        for (k, v) in &self.filter {
            let got = match cap.attributes().get(k) {
                Some(got) => got,
                None => return false,
            };
            if *k == self.namespace && self.resolution() == Resolution::Dynamic {
                let pattern = match v {
                    Value::Str(s) => *s,
                    _ => return false,
                };
                let name = match got {
                    Value::Str(s) => *s,
                    _ => return false,
                };
                if !pattern.covers_package(name.as_str()) {
                    return false;
                }
            } else if got != v {
                return false;
            }
        }
        if let Some(req) = &self.version {
            match cap.attributes().get(&Symbol::intern(VERSION_ATTRIBUTE)) {
                Some(Value::Version(v)) => {
                    if !req.matches(v) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Whether a dynamic import covers the concrete `package` requested at
    /// runtime.
    pub fn matches_dynamic_package(&self, package: &str) -> bool {
        if self.resolution() != Resolution::Dynamic {
            return false;
        }
        match self.filter.get(&self.namespace) {
            None => true,
            Some(Value::Str(s)) => s.covers_package(package),
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::namespace::RESOLUTION_DIRECTIVE;

    #[test]
    fn package_filter_matches_by_name() {
        let req = Requirement::package("org.example.api");
        let cap = Capability::package("org.example.api");
        let other = Capability::package("org.example.impl");
        assert!(req.matches(&cap));
        assert!(!req.matches(&other));
    }

    #[test]
    fn version_range_is_honored() {
        let req = Requirement::package("p").version_req("^1.2".parse().unwrap());
        let hit = Capability::package("p").attr("version", semver::Version::new(1, 4, 0));
        let miss = Capability::package("p").attr("version", semver::Version::new(2, 0, 0));
        let unversioned = Capability::package("p");
        assert!(req.matches(&hit));
        assert!(!req.matches(&miss));
        assert!(!req.matches(&unversioned));
    }

    #[test]
    fn dynamic_wildcards() {
        let star = Requirement::package("*").directive(RESOLUTION_DIRECTIVE, "dynamic");
        let prefix = Requirement::package("org.example.*").directive(RESOLUTION_DIRECTIVE, "dynamic");
        assert!(star.matches_dynamic_package("anything.at.all"));
        assert!(prefix.matches_dynamic_package("org.example.api"));
        assert!(prefix.matches_dynamic_package("org.example"));
        assert!(!prefix.matches_dynamic_package("org.other"));
        assert!(!Requirement::package("p").matches_dynamic_package("p"));
    }
}
