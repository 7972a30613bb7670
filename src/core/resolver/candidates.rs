//! The candidate map: for each open requirement, the ordered set of still
//! viable providers. The head of each list is the current choice.
//!
//! Permutations clone the whole map, so it has to be as cheap to copy as a
//! backtracking loop demands: the map itself is an `im_rc` HashMap
//! (structural sharing, O(1) clone) and each candidate list is an
//! `Rc<Vec<_>>` cloned only when the one entry being mutated is rewritten.
//! The resolver only ever *removes* candidates; the environment's
//! preference order is never rearranged.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::core::capability::CapId;
use crate::core::environment::Environment;
use crate::core::module::ModuleId;
use crate::core::namespace::HOST_NAMESPACE;
use crate::core::requirement::{ReqId, Resolution};
use crate::core::resolver::errors::{ResolveError, ResolveFailure};
use crate::core::resolver::types::{Attachment, CapRef, HostMerge, ReqRef, Session};

#[derive(Clone, Default)]
pub(crate) struct Candidates {
    assignment: im_rc::HashMap<ReqRef, Rc<Vec<CapRef>>>,
}

impl Candidates {
    pub fn new() -> Candidates {
        Candidates::default()
    }

    pub fn insert(&mut self, req: ReqRef, caps: Vec<CapRef>) {
        debug_assert!(!caps.is_empty());
        self.assignment.insert(req, Rc::new(caps));
    }

    pub fn remove(&mut self, req: ReqRef) {
        self.assignment.remove(&req);
    }

    pub fn candidates(&self, req: ReqRef) -> Option<&[CapRef]> {
        self.assignment.get(&req).map(|v| v.as_slice())
    }

    /// The current choice for `req`: the head of its ordered list.
    pub fn chosen(&self, req: ReqRef) -> Option<CapRef> {
        self.candidates(req).and_then(|c| c.first().copied())
    }

    pub fn has_alternatives(&self, req: ReqRef) -> bool {
        self.candidates(req).map_or(false, |c| c.len() > 1)
    }

    /// Drops the current choice so the next candidate in preference order
    /// takes over. Refuses to empty a list: permutations must differ from
    /// the current map without manufacturing an unsatisfied requirement.
    pub fn drop_head(&mut self, req: ReqRef) -> bool {
        match self.assignment.get(&req) {
            Some(caps) if caps.len() > 1 => {
                let tail = caps[1..].to_vec();
                self.assignment.insert(req, Rc::new(tail));
                true
            }
            _ => false,
        }
    }

    pub fn requirements(&self) -> Vec<ReqRef> {
        self.assignment.keys().copied().collect()
    }
}

enum PopulateState {
    InProgress,
    Done,
    Failed(ResolveFailure),
}

/// Builds the candidate map for one resolve attempt: seeds the root,
/// recurses through chosen providers, swallows optional failures, and
/// finally merges fragments into their hosts.
pub(crate) struct Populator<'a, 'e> {
    env: &'e dyn Environment,
    session: &'a mut Session<'e>,
    states: HashMap<ModuleId, PopulateState>,
}

impl<'a, 'e> Populator<'a, 'e> {
    pub fn new(env: &'e dyn Environment, session: &'a mut Session<'e>) -> Populator<'a, 'e> {
        Populator {
            env,
            session,
            states: HashMap::new(),
        }
    }

    /// Populates `module` and, transitively, every module a chosen
    /// candidate is owned by. Fails when a mandatory requirement cannot be
    /// satisfied.
    pub fn populate(&mut self, cands: &mut Candidates, module: ModuleId) -> Result<(), ResolveError> {
        match self.states.get(&module) {
            Some(PopulateState::Done) | Some(PopulateState::InProgress) => return Ok(()),
            Some(PopulateState::Failed(f)) => return Err(f.clone().into()),
            None => {}
        }
        let store = self.session.store();
        if store.is_wired(module) {
            self.states.insert(module, PopulateState::Done);
            return Ok(());
        }
        self.states.insert(module, PopulateState::InProgress);
        trace!("populating {}", store.describe(module));

        match self.populate_requirements(cands, module) {
            Ok(entries) => {
                for (req, caps) in entries {
                    cands.insert(req, caps);
                }
                self.states.insert(module, PopulateState::Done);
                Ok(())
            }
            Err(ResolveError::Failure(f)) => {
                debug!("failed to populate {}: {}", store.describe(module), f);
                self.states.insert(module, PopulateState::Failed(f.clone()));
                Err(f.into())
            }
            Err(fatal) => Err(fatal),
        }
    }

    /// Population for optionals (hinted fragments and the like): a failure
    /// is swallowed and the optional is simply left out of the candidate
    /// space. Environment errors still abort.
    pub fn populate_optional(
        &mut self,
        cands: &mut Candidates,
        module: ModuleId,
    ) -> Result<(), ResolveError> {
        match self.populate(cands, module) {
            Ok(()) => Ok(()),
            Err(ResolveError::Failure(f)) => {
                debug!(
                    "dropping optional {}: {}",
                    self.session.store().describe(module),
                    f
                );
                Ok(())
            }
            Err(fatal) => Err(fatal),
        }
    }

    fn populate_requirements(
        &mut self,
        cands: &mut Candidates,
        module: ModuleId,
    ) -> Result<Vec<(ReqRef, Vec<CapRef>)>, ResolveError> {
        let store = self.session.store();
        // A fragment is seeded through its host requirement alone; its
        // remaining requirements join the candidate space as hosted
        // wrappers when the fragment attaches during prepare().
        let reqs: Vec<ReqId> = match store.host_requirement(module) {
            Some(host_req) => vec![host_req],
            None => store
                .declared_requirements(module, None)
                .filter(|&r| {
                    let req = store.requirement(r);
                    req.is_effective() && req.resolution() != Resolution::Dynamic
                })
                .collect(),
        };

        let mut entries = Vec::new();
        for r in reqs {
            let (kept, discarded) = self.viable_candidates(cands, module, r)?;
            if kept.is_empty() {
                match store.requirement(r).resolution() {
                    Resolution::Mandatory => {
                        return Err(ResolveFailure::unsatisfied(
                            self.session,
                            module,
                            ReqRef::Declared(r),
                            &discarded,
                        )
                        .into());
                    }
                    _ => continue,
                }
            }
            entries.push((ReqRef::Declared(r), kept));
        }
        Ok(entries)
    }

    /// Queries the environment for `req` and keeps the candidates whose
    /// provider module can itself be populated. A provider that is still
    /// mid-population (a dependency cycle back into the current walk) is
    /// discarded: nothing can vouch for it yet, and a ring of modules with
    /// no settled provider must not satisfy each other into existence.
    /// Self-provided candidates are the exception: a module may offer one
    /// of its own capabilities to itself.
    fn viable_candidates(
        &mut self,
        cands: &mut Candidates,
        module: ModuleId,
        r: ReqId,
    ) -> Result<(Vec<CapRef>, Vec<String>), ResolveError> {
        let store = self.session.store();
        let found = self.env.candidates(r, true)?;
        let mut kept = Vec::new();
        let mut discarded = Vec::new();
        for c in found {
            let cap = store.capability(c);
            if !cap.is_effective() {
                continue;
            }
            let owner = cap.owner();
            if owner == module {
                kept.push(CapRef::Declared(c));
                continue;
            }
            match self.vouch(cands, owner)? {
                Ok(()) => kept.push(CapRef::Declared(c)),
                Err(reason) => {
                    trace!(
                        "discarding candidate `{}` for {:?}: {}",
                        store.describe(owner),
                        r,
                        reason
                    );
                    discarded.push(format!("`{}`: {}", store.describe(owner), reason));
                }
            }
        }
        Ok((kept, discarded))
    }

    /// Candidate screening for a dynamic import: keeps the capabilities
    /// whose providers can be populated. The importing module itself never
    /// provides (its own exports disqualify the dynamic import upfront).
    pub fn vouch_all(
        &mut self,
        cands: &mut Candidates,
        module: ModuleId,
        caps: &[CapId],
    ) -> Result<Vec<CapRef>, ResolveError> {
        let store = self.session.store();
        let mut kept = Vec::new();
        for &c in caps {
            let owner = store.capability(c).owner();
            if owner == module {
                continue;
            }
            match self.vouch(cands, owner)? {
                Ok(()) => kept.push(CapRef::Declared(c)),
                Err(reason) => trace!(
                    "discarding dynamic candidate `{}`: {}",
                    store.describe(owner),
                    reason
                ),
            }
        }
        Ok(kept)
    }

    /// Whether `owner` can stand behind a candidate: wired or populatable.
    /// The inner result carries the human-readable discard reason.
    fn vouch(
        &mut self,
        cands: &mut Candidates,
        owner: ModuleId,
    ) -> Result<Result<(), String>, ResolveError> {
        let store = self.session.store();
        if store.is_wired(owner) {
            return Ok(Ok(()));
        }
        match self.states.get(&owner) {
            Some(PopulateState::Done) => return Ok(Ok(())),
            Some(PopulateState::InProgress) => {
                return Ok(Err("dependency cycle with no settled provider".to_string()));
            }
            Some(PopulateState::Failed(f)) => return Ok(Err(f.message().to_string())),
            None => {}
        }
        match self.populate(cands, owner) {
            Ok(()) => Ok(Ok(())),
            Err(ResolveError::Failure(f)) => Ok(Err(f.message().to_string())),
            Err(fatal) => Err(fatal),
        }
    }

    /// Merges every populated fragment into its chosen host: wraps the
    /// fragment's capabilities and requirements with the host as effective
    /// owner, populates the hosted requirements, and re-points candidate
    /// lists that named fragment capabilities at the hosted wrappers.
    pub fn prepare(&mut self, cands: &mut Candidates) -> Result<(), ResolveError> {
        let store = self.session.store();

        // Chosen host per populated fragment, ascending module id.
        let mut frags: Vec<(ModuleId, ReqId, CapId)> = Vec::new();
        for req in cands.requirements() {
            let r = match req {
                ReqRef::Declared(r) => r,
                ReqRef::Hosted(_) => continue,
            };
            if store.requirement(r).namespace().as_str() != HOST_NAMESPACE {
                continue;
            }
            let mut chosen = None;
            if let Some(caps) = cands.candidates(req) {
                // Attachment to an already-wired host would mean mutating a
                // frozen wiring; such candidates are skipped.
                chosen = caps.iter().find_map(|&c| match c {
                    CapRef::Declared(cap) if !store.is_wired(store.capability(cap).owner()) => {
                        Some(cap)
                    }
                    _ => None,
                });
            }
            match chosen {
                Some(host_cap) => frags.push((store.requirement(r).owner(), r, host_cap)),
                None => {
                    // No attachable host: the fragment leaves the candidate
                    // space. Its capabilities disappear during re-pointing,
                    // failing whatever mandatorily chose them; a fragment
                    // root is caught by the driver when no attachment
                    // exists for it.
                    debug!(
                        "fragment `{}` has no attachable host",
                        store.describe(store.requirement(r).owner())
                    );
                    cands.remove(req);
                }
            }
        }
        frags.sort_by_key(|&(f, _, _)| f);

        // Reject attachment cycles before recording anything.
        let frag_host: HashMap<ModuleId, ModuleId> = frags
            .iter()
            .map(|&(f, _, hc)| (f, store.capability(hc).owner()))
            .collect();
        for &(f, _, _) in &frags {
            let mut seen = vec![f];
            let mut cur = frag_host[&f];
            loop {
                if seen.contains(&cur) {
                    return Err(ResolveFailure::circular_host(self.session, f).into());
                }
                seen.push(cur);
                match frag_host.get(&cur) {
                    Some(&next) => cur = next,
                    None => break,
                }
            }
        }

        for &(f, r, hc) in &frags {
            let host = store.capability(hc).owner();
            trace!(
                "attaching fragment `{}` to `{}`",
                store.describe(f),
                store.describe(host)
            );
            self.session.attach(
                f,
                Attachment {
                    host,
                    host_req: r,
                    host_cap: hc,
                },
            );
            cands.insert(ReqRef::Declared(r), vec![CapRef::Declared(hc)]);
        }

        // Merged capability/requirement lists per host, hosts ascending,
        // sibling fragments in attachment (ascending id) order. Wrapping is
        // deduplicated by underlying declaration.
        let mut hosts: Vec<ModuleId> = frag_host.values().copied().collect();
        hosts.sort_unstable();
        hosts.dedup();
        for host in hosts {
            let mut merge = HostMerge::default();
            merge.caps = store
                .declared_capabilities(host, None)
                .filter(|&c| store.capability(c).is_effective())
                .map(CapRef::Declared)
                .collect();
            merge.reqs = store
                .declared_requirements(host, None)
                .filter(|&r| {
                    let req = store.requirement(r);
                    req.is_effective() && req.resolution() != Resolution::Dynamic
                })
                .map(ReqRef::Declared)
                .collect();
            for &(f, _, _) in frags.iter().filter(|&&(_, _, hc)| {
                store.capability(hc).owner() == host
            }) {
                for c in store.declared_capabilities(f, None) {
                    if !store.capability(c).is_effective() {
                        continue;
                    }
                    let wrapped = self.session.add_hosted_cap(c, host);
                    self.session.set_repoint(c, wrapped);
                    if !merge.caps.contains(&wrapped) {
                        merge.caps.push(wrapped);
                    }
                }
                for r in store.declared_requirements(f, None) {
                    let req = store.requirement(r);
                    if !req.is_effective()
                        || req.resolution() == Resolution::Dynamic
                        || req.namespace().as_str() == HOST_NAMESPACE
                    {
                        continue;
                    }
                    let wrapped = self.session.add_hosted_req(r, host);
                    if !merge.reqs.contains(&wrapped) {
                        merge.reqs.push(wrapped);
                    }
                }
            }
            self.session.set_merge(host, merge);
        }

        // Hosted requirements have never seen the environment; populate
        // them now that they exist.
        for req in self.session.hosted_reqs() {
            let r = self.session.req_declared(req);
            let module = self.session.req_owner(req);
            let (kept, discarded) = self.viable_candidates(cands, module, r)?;
            if kept.is_empty() {
                match self.session.store().requirement(r).resolution() {
                    Resolution::Mandatory => {
                        return Err(ResolveFailure::unsatisfied(
                            self.session,
                            module,
                            req,
                            &discarded,
                        )
                        .into());
                    }
                    _ => continue,
                }
            }
            cands.insert(req, kept);
        }

        self.repoint_candidates(cands)
    }

    /// Rewrites every candidate list so capabilities declared by attached
    /// fragments resolve through their hosted wrappers, and capabilities of
    /// unattached fragments disappear.
    fn repoint_candidates(&mut self, cands: &mut Candidates) -> Result<(), ResolveError> {
        let store = self.session.store();
        for req in cands.requirements() {
            if self.session.req(req).namespace().as_str() == HOST_NAMESPACE {
                continue;
            }
            let caps = match cands.candidates(req) {
                Some(c) => c.to_vec(),
                None => continue,
            };
            let mut rewritten = Vec::with_capacity(caps.len());
            let mut changed = false;
            for cap in caps {
                match cap {
                    CapRef::Declared(c) => {
                        if let Some(hosted) = self.session.repoint(c) {
                            changed = true;
                            if !rewritten.contains(&hosted) {
                                rewritten.push(hosted);
                            }
                        } else {
                            let owner = store.capability(c).owner();
                            if store.is_fragment(owner)
                                && !store.is_wired(owner)
                                && self.session.attachment(owner).is_none()
                            {
                                changed = true;
                                trace!(
                                    "dropping capability of unattached fragment `{}`",
                                    store.describe(owner)
                                );
                            } else {
                                rewritten.push(cap);
                            }
                        }
                    }
                    CapRef::Hosted(_) => rewritten.push(cap),
                }
            }
            if !changed {
                continue;
            }
            if rewritten.is_empty() {
                let owner = self.session.req_owner(req);
                match self.session.req(req).resolution() {
                    Resolution::Mandatory => {
                        return Err(ResolveFailure::unsatisfied(
                            self.session,
                            owner,
                            req,
                            &["every provider is an unattached fragment".to_string()],
                        )
                        .into());
                    }
                    _ => cands.remove(req),
                }
            } else {
                cands.insert(req, rewritten);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capability::CapId;

    #[test]
    fn copies_share_until_mutated() {
        let req = ReqRef::Declared(ReqId(0));
        let caps = vec![
            CapRef::Declared(CapId(0)),
            CapRef::Declared(CapId(1)),
        ];
        let mut original = Candidates::new();
        original.insert(req, caps.clone());

        let mut copy = original.clone();
        assert!(copy.drop_head(req));

        assert_eq!(original.candidates(req).unwrap(), caps.as_slice());
        assert_eq!(copy.candidates(req).unwrap(), &caps[1..]);
    }

    #[test]
    fn drop_head_never_empties() {
        let req = ReqRef::Declared(ReqId(0));
        let mut cands = Candidates::new();
        cands.insert(req, vec![CapRef::Declared(CapId(0))]);
        assert!(!cands.drop_head(req));
        assert_eq!(cands.chosen(req), Some(CapRef::Declared(CapId(0))));
    }
}
