//! Resolve-session state.
//!
//! Declared capabilities and requirements live in the [`ModuleStore`] arena
//! and are referenced by id. Fragment attachment mints *hosted* wrappers,
//! the same declaration re-owned by a host, which only exist for the
//! duration of one resolve pass, so they live in side arenas here and
//! everything resolver-internal passes [`CapRef`]/[`ReqRef`] tagged handles
//! instead of ids. Effective owner (the host) and declared owner (the
//! fragment) are two explicit accessors, not dispatch.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::core::capability::{CapId, Capability};
use crate::core::module::{ModuleId, ModuleStore};
use crate::core::requirement::{ReqId, Requirement, Resolution};
use crate::core::resolver::candidates::Candidates;
use crate::util::Symbol;

/// A capability handle: either a declared capability or a hosted wrapper
/// over one. Two wrappers over the same declaration with different hosts
/// are distinct handles.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum CapRef {
    Declared(CapId),
    Hosted(u32),
}

/// A requirement handle, same shape as [`CapRef`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum ReqRef {
    Declared(ReqId),
    Hosted(u32),
}

#[derive(Clone, Debug)]
pub(crate) struct HostedCap {
    pub declared: CapId,
    pub host: ModuleId,
}

#[derive(Clone, Debug)]
pub(crate) struct HostedReq {
    pub declared: ReqId,
    pub host: ModuleId,
}

/// Where a fragment ended up.
#[derive(Clone, Debug)]
pub(crate) struct Attachment {
    pub host: ModuleId,
    pub host_req: ReqId,
    pub host_cap: CapId,
}

/// The merged capability/requirement lists of a host with attached
/// fragments.
#[derive(Clone, Debug, Default)]
pub(crate) struct HostMerge {
    pub caps: Vec<CapRef>,
    pub reqs: Vec<ReqRef>,
}

/// Per-resolve state: the hosted side arenas plus fragment attachment
/// records. Lives for one `resolve` call and is discarded on retraction
/// retries.
pub(crate) struct Session<'e> {
    store: &'e ModuleStore,
    hosted_caps: Vec<HostedCap>,
    hosted_reqs: Vec<HostedReq>,
    hosted_cap_index: HashMap<(CapId, ModuleId), u32>,
    hosted_req_index: HashMap<(ReqId, ModuleId), u32>,
    /// host → merged effective lists, present only for hosts with fragments
    merged: HashMap<ModuleId, HostMerge>,
    /// fragment → where it attached, in attachment order
    attachments: IndexMap<ModuleId, Attachment>,
    /// fragment-declared capability → its hosted wrapper
    repointed: HashMap<CapId, CapRef>,
}

impl<'e> Session<'e> {
    pub fn new(store: &'e ModuleStore) -> Session<'e> {
        Session {
            store,
            hosted_caps: Vec::new(),
            hosted_reqs: Vec::new(),
            hosted_cap_index: HashMap::new(),
            hosted_req_index: HashMap::new(),
            merged: HashMap::new(),
            attachments: IndexMap::new(),
            repointed: HashMap::new(),
        }
    }

    pub fn store(&self) -> &'e ModuleStore {
        self.store
    }

    // --- capabilities -----------------------------------------------------

    pub fn add_hosted_cap(&mut self, declared: CapId, host: ModuleId) -> CapRef {
        if let Some(&i) = self.hosted_cap_index.get(&(declared, host)) {
            return CapRef::Hosted(i);
        }
        let i = self.hosted_caps.len() as u32;
        self.hosted_caps.push(HostedCap { declared, host });
        self.hosted_cap_index.insert((declared, host), i);
        CapRef::Hosted(i)
    }

    pub fn cap_declared(&self, cap: CapRef) -> CapId {
        match cap {
            CapRef::Declared(c) => c,
            CapRef::Hosted(i) => self.hosted_caps[i as usize].declared,
        }
    }

    pub fn cap(&self, cap: CapRef) -> &'e Capability {
        self.store.capability(self.cap_declared(cap))
    }

    /// The owner the rest of the resolve sees: the host for hosted
    /// wrappers.
    pub fn cap_owner(&self, cap: CapRef) -> ModuleId {
        match cap {
            CapRef::Declared(c) => self.store.capability(c).owner(),
            CapRef::Hosted(i) => self.hosted_caps[i as usize].host,
        }
    }

    /// The owner as declared, i.e. the fragment for hosted wrappers. Wires
    /// and diagnostics use this.
    pub fn cap_declared_owner(&self, cap: CapRef) -> ModuleId {
        self.store.capability(self.cap_declared(cap)).owner()
    }

    pub fn cap_key(&self, cap: CapRef) -> Option<Symbol> {
        self.cap(cap).key()
    }

    pub fn cap_uses(&self, cap: CapRef) -> &'e [Symbol] {
        self.cap(cap).uses_list()
    }

    /// The hosted wrapper a fragment-declared capability was replaced by,
    /// if its declarer attached.
    pub fn repoint(&self, declared: CapId) -> Option<CapRef> {
        self.repointed.get(&declared).copied()
    }

    pub fn set_repoint(&mut self, declared: CapId, hosted: CapRef) {
        self.repointed.insert(declared, hosted);
    }

    // --- requirements -----------------------------------------------------

    pub fn add_hosted_req(&mut self, declared: ReqId, host: ModuleId) -> ReqRef {
        if let Some(&i) = self.hosted_req_index.get(&(declared, host)) {
            return ReqRef::Hosted(i);
        }
        let i = self.hosted_reqs.len() as u32;
        self.hosted_reqs.push(HostedReq { declared, host });
        self.hosted_req_index.insert((declared, host), i);
        ReqRef::Hosted(i)
    }

    pub fn hosted_reqs(&self) -> Vec<ReqRef> {
        (0..self.hosted_reqs.len() as u32).map(ReqRef::Hosted).collect()
    }

    pub fn req_declared(&self, req: ReqRef) -> ReqId {
        match req {
            ReqRef::Declared(r) => r,
            ReqRef::Hosted(i) => self.hosted_reqs[i as usize].declared,
        }
    }

    pub fn req(&self, req: ReqRef) -> &'e Requirement {
        self.store.requirement(self.req_declared(req))
    }

    pub fn req_owner(&self, req: ReqRef) -> ModuleId {
        match req {
            ReqRef::Declared(r) => self.store.requirement(r).owner(),
            ReqRef::Hosted(i) => self.hosted_reqs[i as usize].host,
        }
    }

    pub fn req_declared_owner(&self, req: ReqRef) -> ModuleId {
        self.store.requirement(self.req_declared(req)).owner()
    }

    pub fn req_is_hosted(&self, req: ReqRef) -> bool {
        matches!(req, ReqRef::Hosted(_))
    }

    // --- fragment attachment ----------------------------------------------

    pub fn attach(&mut self, fragment: ModuleId, attachment: Attachment) {
        self.attachments.insert(fragment, attachment);
    }

    pub fn attachment(&self, fragment: ModuleId) -> Option<&Attachment> {
        self.attachments.get(&fragment)
    }

    pub fn attachments(&self) -> impl Iterator<Item = (ModuleId, &Attachment)> {
        self.attachments.iter().map(|(&f, a)| (f, a))
    }

    pub fn set_merge(&mut self, host: ModuleId, merge: HostMerge) {
        self.merged.insert(host, merge);
    }

    // --- effective views --------------------------------------------------

    pub fn is_wired(&self, module: ModuleId) -> bool {
        self.store.is_wired(module)
    }

    /// The capabilities `module` effectively offers during this resolve:
    /// the installed list for wired modules, the merged host list after
    /// fragment attachment, the declared list otherwise. Attached fragments
    /// offer nothing of their own any more.
    pub fn effective_caps(&self, module: ModuleId) -> Vec<CapRef> {
        if self.attachments.contains_key(&module) {
            return Vec::new();
        }
        if let Some(w) = self.store.wiring(module) {
            return w.capabilities().iter().map(|&c| CapRef::Declared(c)).collect();
        }
        if let Some(m) = self.merged.get(&module) {
            return m.caps.clone();
        }
        self.store
            .declared_capabilities(module, None)
            .filter(|&c| self.store.capability(c).is_effective())
            .map(CapRef::Declared)
            .collect()
    }

    /// The requirements the resolver must satisfy for `module`: merged with
    /// hosted fragment requirements where fragments attached; dynamic and
    /// non-resolve-effective requirements are never included.
    pub fn effective_reqs(&self, module: ModuleId) -> Vec<ReqRef> {
        if self.attachments.contains_key(&module) {
            return Vec::new();
        }
        if let Some(m) = self.merged.get(&module) {
            return m.reqs.clone();
        }
        self.store
            .declared_requirements(module, None)
            .filter(|&r| {
                let req = self.store.requirement(r);
                req.is_effective() && req.resolution() != Resolution::Dynamic
            })
            .map(ReqRef::Declared)
            .collect()
    }

    /// The chosen (requirement, capability) pairs of `module`: its
    /// installed wires when wired, otherwise the head of each candidate
    /// list. Requirements without surviving candidates (satisfied
    /// optionals' leftovers) yield no pair.
    pub fn chosen_pairs(&self, candidates: &Candidates, module: ModuleId) -> Vec<(ReqRef, CapRef)> {
        if let Some(w) = self.store.wiring(module) {
            return w
                .required_wires()
                .iter()
                .map(|w| (ReqRef::Declared(w.requirement), CapRef::Declared(w.capability)))
                .collect();
        }
        self.effective_reqs(module)
            .into_iter()
            .filter_map(|r| candidates.chosen(r).map(|c| (r, c)))
            .collect()
    }
}
