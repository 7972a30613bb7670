//! The finalized output of a resolve: one ordered wire list per module.

use indexmap::IndexMap;

use crate::core::module::{ModuleId, ModuleStore};
use crate::core::namespace::{BUNDLE_NAMESPACE, HOST_NAMESPACE, PACKAGE_NAMESPACE};
use crate::core::resolver::candidates::Candidates;
use crate::core::resolver::space::Spaces;
use crate::core::resolver::types::Session;
use crate::core::wiring::{Wire, Wiring};

/// A successful resolution: for every module that took part and was not
/// already wired, the ordered list of wires realizing its requirements.
/// Wires reference declared capabilities and requirements: hosted
/// wrappers are unwrapped, so fragment-contributed wires show the fragment
/// as declaring owner.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolve {
    wires: IndexMap<ModuleId, Vec<Wire>>,
}

impl Resolve {
    pub fn modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.wires.keys().copied()
    }

    pub fn wires(&self, module: ModuleId) -> Option<&[Wire]> {
        self.wires.get(&module).map(|w| w.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &[Wire])> {
        self.wires.iter().map(|(&m, w)| (m, w.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.wires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wires.is_empty()
    }

    pub fn contains(&self, module: ModuleId) -> bool {
        self.wires.contains_key(&module)
    }

    /// Installs the resolution back into the store, freezing every
    /// resolved module. Package capabilities substituted by an import do
    /// not appear in the installed capability list.
    pub fn install_into(&self, store: &mut ModuleStore) {
        for (&module, wires) in &self.wires {
            let imported: Vec<_> = wires
                .iter()
                .filter_map(|w| {
                    let cap = store.capability(w.capability);
                    if cap.namespace().as_str() == PACKAGE_NAMESPACE && w.provider != module {
                        cap.key()
                    } else {
                        None
                    }
                })
                .collect();
            let capabilities: Vec<_> = store
                .declared_capabilities(module, None)
                .filter(|&c| {
                    let cap = store.capability(c);
                    cap.namespace().as_str() != PACKAGE_NAMESPACE
                        || cap.key().map_or(true, |k| !imported.contains(&k))
                })
                .collect();
            let requirements: Vec<_> = store.declared_requirements(module, None).collect();
            store.set_wiring(module, Wiring::new(wires.clone(), capabilities, requirements));
        }
    }
}

/// Converts the winning candidate map into wire lists: package wires, then
/// bundle wires, then generic-capability wires, stable within each group by
/// declaration order; host wires of attached fragments come last, listed
/// under the fragment itself.
pub(super) fn emit_wires(
    session: &Session<'_>,
    candidates: &Candidates,
    spaces: &Spaces,
) -> Resolve {
    let mut out: IndexMap<ModuleId, Vec<Wire>> = IndexMap::new();
    for &module in spaces.keys() {
        if session.is_wired(module) {
            continue;
        }
        let mut package = Vec::new();
        let mut bundle = Vec::new();
        let mut generic = Vec::new();
        for (req, cap) in session.chosen_pairs(candidates, module) {
            let namespace = session.req(req).namespace();
            if namespace.as_str() == HOST_NAMESPACE {
                continue;
            }
            let wire = Wire {
                requirer: session.req_declared_owner(req),
                requirement: session.req_declared(req),
                provider: session.cap_declared_owner(cap),
                capability: session.cap_declared(cap),
            };
            match namespace.as_str() {
                PACKAGE_NAMESPACE => package.push(wire),
                BUNDLE_NAMESPACE => bundle.push(wire),
                _ => generic.push(wire),
            }
        }
        package.extend(bundle);
        package.extend(generic);
        out.insert(module, package);
    }
    for (fragment, attachment) in session.attachments() {
        if !spaces.contains_key(&attachment.host) {
            continue;
        }
        out.entry(fragment).or_default().push(Wire {
            requirer: fragment,
            requirement: attachment.host_req,
            provider: attachment.host,
            capability: attachment.host_cap,
        });
    }
    Resolve { wires: out }
}

/// A dynamic import resolves to exactly one wire for the requesting
/// module.
pub(super) fn emit_dynamic_wire(module: ModuleId, wire: Wire) -> Resolve {
    let mut wires = IndexMap::new();
    wires.insert(module, vec![wire]);
    Resolve { wires }
}
