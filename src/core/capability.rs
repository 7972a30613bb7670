use std::collections::BTreeMap;
use std::fmt;

use semver::Version;

use crate::core::module::ModuleId;
use crate::core::namespace::{EFFECTIVE_DIRECTIVE, EFFECTIVE_RESOLVE, PACKAGE_NAMESPACE};
use crate::util::Symbol;

/// Identifies a declared capability in a [`crate::core::ModuleStore`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapId(pub(crate) u32);

impl CapId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for CapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cap#{}", self.0)
    }
}

/// An attribute value: string, number, version, or a list of those.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(Symbol),
    Number(i64),
    Version(Version),
    List(Vec<Value>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Symbol::intern(s))
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Value {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Number(n)
    }
}

impl From<Version> for Value {
    fn from(v: Version) -> Value {
        Value::Version(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Version(v) => write!(f, "{}", v),
            Value::List(vs) => {
                let mut first = true;
                for v in vs {
                    if !first {
                        write!(f, ",")?;
                    }
                    first = false;
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}

/// A declared capability: an advertisement that `owner` provides some facet
/// in `namespace`, described by attributes and directives. Package
/// capabilities additionally carry the ordered `uses` list driving the
/// transitive consistency rule.
#[derive(Clone, Debug)]
pub struct Capability {
    owner: ModuleId,
    namespace: Symbol,
    attributes: BTreeMap<Symbol, Value>,
    directives: BTreeMap<Symbol, Symbol>,
    uses: Vec<Symbol>,
}

impl Capability {
    pub fn new(namespace: &str) -> Capability {
        Capability {
            owner: ModuleId::UNSET,
            namespace: Symbol::intern(namespace),
            attributes: BTreeMap::new(),
            directives: BTreeMap::new(),
            uses: Vec::new(),
        }
    }

    /// A package capability for `name`, the common case.
    pub fn package(name: &str) -> Capability {
        Capability::new(PACKAGE_NAMESPACE).attr(PACKAGE_NAMESPACE, name)
    }

    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Capability {
        self.attributes.insert(Symbol::intern(key), value.into());
        self
    }

    pub fn directive(mut self, key: &str, value: &str) -> Capability {
        self.directives
            .insert(Symbol::intern(key), Symbol::intern(value));
        self
    }

    pub fn uses<'a>(mut self, packages: impl IntoIterator<Item = &'a str>) -> Capability {
        self.uses.extend(packages.into_iter().map(Symbol::intern));
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

    pub fn attributes(&self) -> &BTreeMap<Symbol, Value> {
        &self.attributes
    }

    pub fn directives(&self) -> &BTreeMap<Symbol, Symbol> {
        &self.directives
    }

    pub fn uses_list(&self) -> &[Symbol] {
        &self.uses
    }

    /// The namespace key of this capability: the attribute named after the
    /// namespace, when the namespace defines one. For package capabilities
    /// this is the package name.
    pub fn key(&self) -> Option<Symbol> {
        match self.attributes.get(&self.namespace) {
            Some(Value::Str(s)) => Some(*s),
            _ => None,
        }
    }

    /// Whether the resolver should consider this capability at all.
    pub fn is_effective(&self) -> bool {
        match self.directives.get(&Symbol::intern(EFFECTIVE_DIRECTIVE)) {
            Some(v) => v.as_str() == EFFECTIVE_RESOLVE,
            None => true,
        }
    }
}
