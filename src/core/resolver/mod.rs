//! Resolution of module wirings from declared capabilities and
//! requirements.
//!
//! This module implements the core search: take the environment's view of
//! the installed modules, a designated root, and decide whether one
//! provider can be assigned to every open requirement such that every
//! transitively reachable module sees a single coherent view of every
//! exported package. Solving this exactly is constraint satisfaction over
//! an exponential space; what is implemented below is a backtracking walk
//! that trusts the environment's candidate ordering and only ever narrows
//! it.
//!
//! A resolve runs in three strokes, repeated until one sticks:
//!
//! 1. *Populate* a candidate map for the root and everything reachable
//!    through chosen providers, then merge fragments into their hosts
//!    (`prepare`).
//! 2. *Build* the package space of every module the current choices reach,
//!    including the transitive uses closure.
//! 3. *Check* the spaces for conflicts. A conflict pushes permutations
//!    (alternative candidate maps differing in at least one choice) onto
//!    two stacks, uses-level ones drained before import-level ones, and
//!    the loop tries the next map.
//!
//! Only when both stacks run dry does a failure surface, and even then the
//! driver has one more card: if the blamed module is one of the optional
//! fragments the caller listed, it is retracted and the whole resolve
//! restarts without it.
//!
//! Everything here is single-threaded and pure: one `resolve` call runs to
//! completion on its calling thread, performs no I/O, and never mutates
//! the environment. A `Resolver` instance holds the permutation stacks and
//! the package-sources cache between calls purely as an allocation
//! convenience; both are cleared on entry and exit, so the one rule is
//! that an instance must not be entered concurrently.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::core::capability::CapId;
use crate::core::environment::Environment;
use crate::core::module::{ModuleId, ModuleStore};
use crate::core::namespace::{BUNDLE_NAMESPACE, PACKAGE_NAMESPACE};
use crate::core::requirement::{ReqId, Resolution, Visibility};
use crate::core::wiring::Wire;
use crate::util::{Symbol, WeftResult};

pub use self::errors::{FailureKind, ResolveFailure};
pub use self::resolve::Resolve;

use self::candidates::{Candidates, Populator};
use self::checker::Checker;
use self::errors::ResolveError;
use self::space::{Sources, SpaceBuilder, Spaces};
use self::types::{ReqRef, Session};

mod candidates;
mod checker;
mod errors;
mod resolve;
mod space;
mod types;

/// Resolves `root` against `env`, also trying to attach the listed
/// optional fragments. See [`Resolver::resolve`].
pub fn resolve(
    env: &dyn Environment,
    root: ModuleId,
    optional_fragments: &[ModuleId],
) -> WeftResult<Resolve> {
    Resolver::new().resolve(env, root, optional_fragments)
}

/// Resolves a dynamic package import of `module`. See
/// [`Resolver::resolve_dynamic`].
pub fn resolve_dynamic(
    env: &dyn Environment,
    module: ModuleId,
    package: &str,
    optional_fragments: &[ModuleId],
) -> WeftResult<Option<Resolve>> {
    Resolver::new().resolve_dynamic(env, module, package, optional_fragments)
}

/// The resolver. Reusable across invocations; must not be entered
/// concurrently.
#[derive(Default)]
pub struct Resolver {
    uses_permutations: Vec<Candidates>,
    import_permutations: Vec<Candidates>,
    sources: Sources,
}

struct Attempt {
    candidates: Candidates,
    spaces: Spaces,
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver::default()
    }

    fn clear(&mut self) {
        self.uses_permutations.clear();
        self.import_permutations.clear();
        self.sources.clear();
    }

    /// Full resolve of `root`: on success, the wires for every module that
    /// had to be co-resolved, keyed by module; on failure, an error whose
    /// [`ResolveFailure`] names the conflict and its blame chains.
    ///
    /// `optional_fragments` are attached opportunistically: if the final
    /// failure of the search blames one of them, it is retracted and the
    /// resolve restarts from scratch without it.
    pub fn resolve(
        &mut self,
        env: &dyn Environment,
        root: ModuleId,
        optional_fragments: &[ModuleId],
    ) -> WeftResult<Resolve> {
        self.clear();
        let result = self.resolve_loop(env, root, optional_fragments);
        self.clear();
        match result {
            Ok(resolve) => Ok(resolve),
            Err(ResolveError::Fatal(e)) => Err(e),
            Err(ResolveError::Failure(f)) => Err(anyhow::Error::new(f)),
        }
    }

    /// Resolves a runtime import of `package` against the already-wired
    /// `module`. Returns `Ok(None)` when the dynamic import is
    /// inapplicable (module unwired, package empty, already sourced or
    /// exported, no matching dynamic requirement) or unresolvable;
    /// environment errors still surface as errors.
    pub fn resolve_dynamic(
        &mut self,
        env: &dyn Environment,
        module: ModuleId,
        package: &str,
        optional_fragments: &[ModuleId],
    ) -> WeftResult<Option<Resolve>> {
        self.clear();
        let result = self.resolve_dynamic_loop(env, module, package, optional_fragments);
        self.clear();
        match result {
            Ok(resolve) => Ok(resolve),
            Err(ResolveError::Fatal(e)) => Err(e),
            Err(ResolveError::Failure(f)) => {
                debug!("dynamic import of `{}` unresolvable: {}", package, f);
                Ok(None)
            }
        }
    }

    fn resolve_loop(
        &mut self,
        env: &dyn Environment,
        root: ModuleId,
        optional_fragments: &[ModuleId],
    ) -> Result<Resolve, ResolveError> {
        let store = env.store();
        let mut optionals: BTreeSet<ModuleId> = optional_fragments.iter().copied().collect();
        loop {
            let mut session = Session::new(store);
            match self.attempt(env, &mut session, root, &optionals) {
                Ok(attempt) => {
                    return Ok(resolve::emit_wires(
                        &session,
                        &attempt.candidates,
                        &attempt.spaces,
                    ));
                }
                Err(ResolveError::Failure(failure)) => {
                    if optionals.remove(&failure.blamed) {
                        debug!(
                            "retracting optional `{}` and retrying: {}",
                            store.describe(failure.blamed),
                            failure
                        );
                        continue;
                    }
                    return Err(failure.into());
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    fn attempt<'e>(
        &mut self,
        env: &'e dyn Environment,
        session: &mut Session<'e>,
        root: ModuleId,
        optionals: &BTreeSet<ModuleId>,
    ) -> Result<Attempt, ResolveError> {
        let store = env.store();
        let mut candidates = Candidates::new();
        {
            let mut populator = Populator::new(env, session);
            populator.populate(&mut candidates, root)?;
            for &optional in optionals {
                populator.populate_optional(&mut candidates, optional)?;
            }
            populator.prepare(&mut candidates)?;
        }

        // A fragment root resolves through its host.
        let target = if store.is_fragment(root) {
            match session.attachment(root) {
                Some(attachment) => attachment.host,
                None => {
                    let host_req = store
                        .host_requirement(root)
                        .expect("fragment has a host requirement");
                    return Err(ResolveFailure::unsatisfied(
                        session,
                        root,
                        ReqRef::Declared(host_req),
                        &[],
                    )
                    .into());
                }
            }
        } else {
            root
        };

        self.uses_permutations.clear();
        self.import_permutations.clear();
        self.uses_permutations.push(candidates);
        self.search(session, target, None)
    }

    /// The inner loop shared by full and dynamic resolves: drain the
    /// permutation stacks (uses first), building and checking spaces for
    /// each candidate map until one is consistent.
    fn search(
        &mut self,
        session: &Session<'_>,
        target: ModuleId,
        dynamic: Option<(ModuleId, ReqRef)>,
    ) -> Result<Attempt, ResolveError> {
        let mut failure: Option<ResolveFailure> = None;
        let mut attempts = 0u32;
        while let Some(candidates) = self
            .uses_permutations
            .pop()
            .or_else(|| self.import_permutations.pop())
        {
            attempts += 1;
            trace!("resolution attempt {} for {:?}", attempts, target);
            self.sources.clear();
            let spaces = {
                let mut builder =
                    SpaceBuilder::new(session, &candidates, &mut self.sources, dynamic);
                builder.build(target);
                builder.finish()
            };
            let mut checker = Checker::new(
                session,
                &candidates,
                &spaces,
                &mut self.sources,
                &mut self.uses_permutations,
                &mut self.import_permutations,
                dynamic.map(|(subject, _)| subject),
            );
            match checker.check(target) {
                Ok(()) => {
                    debug!("consistent assignment found after {} attempt(s)", attempts);
                    return Ok(Attempt { candidates, spaces });
                }
                Err(f) => {
                    trace!("attempt {} failed: {}", attempts, f);
                    failure = Some(f);
                }
            }
        }
        Err(failure
            .expect("permutation stacks were seeded, so at least one attempt ran")
            .into())
    }

    fn resolve_dynamic_loop(
        &mut self,
        env: &dyn Environment,
        module: ModuleId,
        package: &str,
        optional_fragments: &[ModuleId],
    ) -> Result<Option<Resolve>, ResolveError> {
        let store = env.store();
        if store.wiring(module).is_none() || package.is_empty() {
            return Ok(None);
        }
        if already_sources(store, module, package) || exports_package(store, module, package) {
            return Ok(None);
        }
        let Some((dyn_req, caps)) = dynamic_import_candidates(env, module, package)? else {
            return Ok(None);
        };

        let mut optionals: BTreeSet<ModuleId> = optional_fragments.iter().copied().collect();
        loop {
            let mut session = Session::new(store);
            match self.attempt_dynamic(env, &mut session, module, dyn_req, &caps, &optionals) {
                Ok(Some(attempt)) => {
                    let req = ReqRef::Declared(dyn_req);
                    let cap = attempt
                        .candidates
                        .chosen(req)
                        .expect("dynamic requirement kept a candidate");
                    let wire = Wire {
                        requirer: module,
                        requirement: dyn_req,
                        provider: session.cap_declared_owner(cap),
                        capability: session.cap_declared(cap),
                    };
                    return Ok(Some(resolve::emit_dynamic_wire(module, wire)));
                }
                Ok(None) => return Ok(None),
                Err(ResolveError::Failure(failure)) => {
                    if optionals.remove(&failure.blamed) {
                        debug!(
                            "retracting optional `{}` from dynamic import and retrying",
                            store.describe(failure.blamed)
                        );
                        continue;
                    }
                    return Err(failure.into());
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    fn attempt_dynamic<'e>(
        &mut self,
        env: &'e dyn Environment,
        session: &mut Session<'e>,
        module: ModuleId,
        dyn_req: ReqId,
        caps: &[CapId],
        optionals: &BTreeSet<ModuleId>,
    ) -> Result<Option<Attempt>, ResolveError> {
        let req = ReqRef::Declared(dyn_req);
        let mut candidates = Candidates::new();
        {
            let mut populator = Populator::new(env, session);
            let kept = populator.vouch_all(&mut candidates, module, caps)?;
            if kept.is_empty() {
                return Ok(None);
            }
            candidates.insert(req, kept);
            for &optional in optionals {
                populator.populate_optional(&mut candidates, optional)?;
            }
            populator.prepare(&mut candidates)?;
        }
        if candidates.chosen(req).is_none() {
            return Ok(None);
        }
        // The dynamic target is never fragment-unwrapped.
        self.uses_permutations.clear();
        self.import_permutations.clear();
        self.uses_permutations.push(candidates);
        self.search(session, module, Some((module, req))).map(Some)
    }
}

/// Pre-filters the dynamic requirements of `module` to the first one whose
/// pattern covers `package` and that the environment can satisfy with a
/// capability actually providing `package`.
fn dynamic_import_candidates(
    env: &dyn Environment,
    module: ModuleId,
    package: &str,
) -> Result<Option<(ReqId, Vec<CapId>)>, ResolveError> {
    let store = env.store();
    let package = Symbol::intern(package);
    for r in store.declared_requirements(module, Some(PACKAGE_NAMESPACE)) {
        let req = store.requirement(r);
        if !req.is_effective()
            || req.resolution() != Resolution::Dynamic
            || !req.matches_dynamic_package(package.as_str())
        {
            continue;
        }
        let caps: Vec<_> = env
            .candidates(r, false)?
            .into_iter()
            .filter(|&c| {
                let cap = store.capability(c);
                cap.owner() != module
                    && cap.namespace().as_str() == PACKAGE_NAMESPACE
                    && cap.key() == Some(package)
            })
            .collect();
        if !caps.is_empty() {
            return Ok(Some((r, caps)));
        }
    }
    Ok(None)
}

/// Whether the installed wiring of `module` already gives it a view of
/// `package`, either through a package wire or through the exports of a
/// required bundle (following re-exports).
fn already_sources(store: &ModuleStore, module: ModuleId, package: &str) -> bool {
    let Some(wiring) = store.wiring(module) else {
        return false;
    };
    for wire in wiring.required_wires() {
        let cap = store.capability(wire.capability);
        match cap.namespace().as_str() {
            PACKAGE_NAMESPACE => {
                if cap.key().map_or(false, |k| k.as_str() == package) {
                    return true;
                }
            }
            BUNDLE_NAMESPACE => {
                let mut seen = BTreeSet::new();
                if bundle_exports(store, cap.owner(), package, &mut seen) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn bundle_exports(
    store: &ModuleStore,
    provider: ModuleId,
    package: &str,
    seen: &mut BTreeSet<ModuleId>,
) -> bool {
    if !seen.insert(provider) {
        return false;
    }
    if exports_package(store, provider, package) {
        return true;
    }
    if let Some(wiring) = store.wiring(provider) {
        for wire in wiring.required_wires() {
            let req = store.requirement(wire.requirement);
            if req.namespace().as_str() == BUNDLE_NAMESPACE
                && req.visibility() == Visibility::Reexport
                && bundle_exports(store, store.capability(wire.capability).owner(), package, seen)
            {
                return true;
            }
        }
    }
    false
}

fn exports_package(store: &ModuleStore, module: ModuleId, package: &str) -> bool {
    let caps: Vec<_> = match store.wiring(module) {
        Some(w) => w.capabilities().to_vec(),
        None => store.declared_capabilities(module, None).collect(),
    };
    caps.iter().any(|&c| {
        let cap = store.capability(c);
        cap.namespace().as_str() == PACKAGE_NAMESPACE
            && cap.key().map_or(false, |k| k.as_str() == package)
    })
}
