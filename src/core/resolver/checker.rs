//! Consistency checking over built package spaces.
//!
//! The checker walks every resolving module reachable from the target and
//! looks for three shapes of trouble: the same package imported from two
//! providers (fragment imports), an export clashing with a uses-reachable
//! view of the same package, and an import clashing with one. On a
//! conflict it manufactures *permutations* (copies of the candidate map
//! with one choice dropped) and raises a failure for the driver to catch.
//! Uses-level permutations go on the high-priority stack; import-level
//! permutations are the fallback once uses mutations are exhausted.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::core::module::ModuleId;
use crate::core::resolver::candidates::Candidates;
use crate::core::resolver::errors::{ResolveFailure, SubjectKind};
use crate::core::resolver::space::{Blame, Sources, Spaces};
use crate::core::resolver::types::{CapRef, ReqRef, Session};

pub(crate) struct Checker<'a, 'e> {
    session: &'a Session<'e>,
    candidates: &'a Candidates,
    spaces: &'a Spaces,
    sources: &'a mut Sources,
    uses_permutations: &'a mut Vec<Candidates>,
    import_permutations: &'a mut Vec<Candidates>,
    dynamic: Option<ModuleId>,
    /// Requirements already mutated while reporting the current failure;
    /// one conflict never drops two candidates from the same requirement.
    mutated: HashSet<ReqRef>,
    checked: HashSet<ModuleId>,
}

impl<'a, 'e> Checker<'a, 'e> {
    pub fn new(
        session: &'a Session<'e>,
        candidates: &'a Candidates,
        spaces: &'a Spaces,
        sources: &'a mut Sources,
        uses_permutations: &'a mut Vec<Candidates>,
        import_permutations: &'a mut Vec<Candidates>,
        dynamic: Option<ModuleId>,
    ) -> Checker<'a, 'e> {
        Checker {
            session,
            candidates,
            spaces,
            sources,
            uses_permutations,
            import_permutations,
            dynamic,
            mutated: HashSet::new(),
            checked: HashSet::new(),
        }
    }

    pub fn check(&mut self, module: ModuleId) -> Result<(), ResolveFailure> {
        if !self.checked.insert(module) {
            return Ok(());
        }
        if self.session.is_wired(module) && self.dynamic != Some(module) {
            return Ok(());
        }
        let space = match self.spaces.get(&module) {
            Some(s) => s,
            None => return Ok(()),
        };
        trace!(
            "checking package space consistency of {}",
            self.session.store().describe(module)
        );

        // Fragment import conflict: the same package imported from two
        // providers is unrecoverable for this map; permute every blamed
        // import and fail the attempt.
        for (key, blames) in &space.imported {
            let providers: HashSet<ModuleId> = blames
                .iter()
                .map(|b| self.session.cap_owner(b.cap))
                .collect();
            if providers.len() > 1 {
                for blame in blames {
                    if let Some(&req) = blame.path.first() {
                        self.permute_if_needed(req);
                    }
                }
                return Err(ResolveFailure::fragment_import_conflict(
                    self.session,
                    module,
                    *key,
                    blames,
                ));
            }
        }

        // Export vs. used.
        for (key, export) in &space.exported {
            let Some(used) = space.used.get(key) else {
                continue;
            };
            for used_blame in used {
                if self.compatible(export.cap, used_blame.cap) {
                    continue;
                }
                debug!(
                    "export of `{}` by {} conflicts with its uses closure",
                    key,
                    self.session.store().describe(module)
                );
                self.push_uses_permutation(&used_blame.path);
                return Err(ResolveFailure::uses_conflict(
                    self.session,
                    module,
                    *key,
                    SubjectKind::Export,
                    export,
                    used_blame,
                ));
            }
        }

        // Import vs. used.
        for (key, imports) in &space.imported {
            let Some(used) = space.used.get(key) else {
                continue;
            };
            for import_blame in imports {
                for used_blame in used {
                    if self.compatible(import_blame.cap, used_blame.cap) {
                        continue;
                    }
                    debug!(
                        "import of `{}` into {} conflicts with its uses closure",
                        key,
                        self.session.store().describe(module)
                    );
                    self.push_uses_permutation(&used_blame.path);
                    // Backtracking on the import itself is the fallback
                    // once uses-level mutations run dry.
                    if let Some(&req) = import_blame.path.first() {
                        self.permute_if_needed(req);
                    }
                    return Err(ResolveFailure::uses_conflict(
                        self.session,
                        module,
                        *key,
                        SubjectKind::Import,
                        import_blame,
                        used_blame,
                    ));
                }
            }
        }

        // Recurse down imports; a deeper failure that created no new
        // permutation gets one here so the search always makes progress.
        let import_blames: Vec<Blame> = space.imported.values().flatten().cloned().collect();
        for blame in import_blames {
            let provider = self.session.cap_owner(blame.cap);
            let permutations_before =
                self.uses_permutations.len() + self.import_permutations.len();
            if let Err(failure) = self.check(provider) {
                let created =
                    self.uses_permutations.len() + self.import_permutations.len();
                if created == permutations_before {
                    if let Some(&req) = blame.path.first() {
                        self.permute_if_needed(req);
                    }
                }
                return Err(failure);
            }
        }
        Ok(())
    }

    /// Two capabilities are compatible when one's package-source set is a
    /// subset of the other's; the same package name sourced from two
    /// disjoint provider sets is the incompatibility uses constraints
    /// exist to catch.
    fn compatible(&mut self, a: CapRef, b: CapRef) -> bool {
        if a == b {
            return true;
        }
        let sa = self.sources.of(self.session, self.candidates, a);
        let sb = self.sources.of(self.session, self.candidates, b);
        let sa: HashSet<CapRef> = sa.iter().copied().collect();
        let sb: HashSet<CapRef> = sb.iter().copied().collect();
        sa.is_subset(&sb) || sb.is_subset(&sa)
    }

    /// Copies the current map, walks the used-blame chain from its deepest
    /// requirement backwards and drops the head of the first requirement
    /// still offering an alternative. Pushed on the high-priority stack.
    fn push_uses_permutation(&mut self, path: &[ReqRef]) {
        let mut copy = self.candidates.clone();
        for &req in path.iter().rev() {
            if self.mutated.contains(&req) {
                continue;
            }
            if copy.drop_head(req) {
                self.mutated.insert(req);
                trace!("uses permutation: advanced {:?}", req);
                self.uses_permutations.push(copy);
                return;
            }
        }
        trace!("uses conflict with no mutable requirement in its chain");
    }

    /// Pushes an import-level permutation for `req` unless some queued
    /// import permutation already chooses differently for it.
    fn permute_if_needed(&mut self, req: ReqRef) {
        if !self.candidates.has_alternatives(req) {
            return;
        }
        let current = self.candidates.chosen(req);
        if self
            .import_permutations
            .iter()
            .any(|p| p.chosen(req) != current)
        {
            return;
        }
        let mut copy = self.candidates.clone();
        if copy.drop_head(req) {
            trace!("import permutation: advanced {:?}", req);
            self.import_permutations.push(copy);
        }
    }
}
