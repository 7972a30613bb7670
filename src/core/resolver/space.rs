//! Per-module package spaces and the four-phase space builder.
//!
//! A module's package space is its complete view of the package namespace:
//! what it exports, what it imports, what it pulls in through
//! require-bundle edges, and (the expensive part) the transitive closure
//! of every package reached through `uses` directives. Each entry carries a
//! [`Blame`]: the capability plus the chain of requirements explaining why
//! it is visible, which is what conflict diagnostics and permutation
//! targeting are built from.
//!
//! Build order per module is strict because later phases read earlier ones:
//! exports (with substitution) first, then imports and required packages,
//! then recursion into chosen providers, and only then uses merging, by
//! which point every provider this module can see has its exports and
//! imports in place.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::core::module::ModuleId;
use crate::core::namespace::{BUNDLE_NAMESPACE, HOST_NAMESPACE, PACKAGE_NAMESPACE};
use crate::core::requirement::Visibility;
use crate::core::resolver::candidates::Candidates;
use crate::core::resolver::types::{CapRef, ReqRef, Session};
use crate::util::Symbol;

/// A capability plus the requirement chain that made it visible to some
/// subject module. An empty path means the subject exports it directly.
#[derive(Clone, Debug)]
pub(crate) struct Blame {
    pub cap: CapRef,
    pub path: Vec<ReqRef>,
}

impl Blame {
    fn exported(cap: CapRef) -> Blame {
        Blame {
            cap,
            path: Vec::new(),
        }
    }

    fn via(cap: CapRef, req: ReqRef) -> Blame {
        Blame {
            cap,
            path: vec![req],
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PackageSpace {
    pub exported: IndexMap<Symbol, Blame>,
    pub imported: IndexMap<Symbol, Vec<Blame>>,
    pub required: IndexMap<Symbol, Vec<Blame>>,
    pub used: IndexMap<Symbol, Vec<Blame>>,
}

pub(crate) type Spaces = IndexMap<ModuleId, PackageSpace>;

/// Memoized package sources: for a package capability, the set of package
/// capabilities its owner's view of that package actually comes from,
/// following substitutable exports to the import's provider and walking
/// require-bundle re-exports. Valid for exactly one candidate map, so the
/// driver clears it before every permutation attempt.
#[derive(Default)]
pub(crate) struct Sources {
    cache: HashMap<CapRef, Rc<Vec<CapRef>>>,
}

impl Sources {
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn of(
        &mut self,
        session: &Session<'_>,
        candidates: &Candidates,
        cap: CapRef,
    ) -> Rc<Vec<CapRef>> {
        if let Some(cached) = self.cache.get(&cap) {
            return Rc::clone(cached);
        }
        let key = session.cap_key(cap);
        let sources = match key {
            Some(key) if session.cap(cap).namespace().as_str() == PACKAGE_NAMESPACE => {
                let mut out = Vec::new();
                let mut seen = HashSet::new();
                self.collect(session, candidates, session.cap_owner(cap), key, &mut out, &mut seen);
                if out.is_empty() {
                    out.push(cap);
                }
                out
            }
            _ => vec![cap],
        };
        let sources = Rc::new(sources);
        self.cache.insert(cap, Rc::clone(&sources));
        sources
    }

    fn collect(
        &mut self,
        session: &Session<'_>,
        candidates: &Candidates,
        module: ModuleId,
        key: Symbol,
        out: &mut Vec<CapRef>,
        seen: &mut HashSet<ModuleId>,
    ) {
        if !seen.insert(module) {
            return;
        }
        let pairs = session.chosen_pairs(candidates, module);

        // A substituted export: the module's own view of `key` is whatever
        // its import provides, so the sources are the provider's.
        let substituted = pairs.iter().find_map(|&(_, cap)| {
            if session.cap(cap).namespace().as_str() == PACKAGE_NAMESPACE
                && session.cap_key(cap) == Some(key)
                && session.cap_owner(cap) != module
            {
                Some(cap)
            } else {
                None
            }
        });
        match substituted {
            Some(cap) => {
                self.collect(session, candidates, session.cap_owner(cap), key, out, seen)
            }
            None => {
                for cap in session.effective_caps(module) {
                    if session.cap(cap).namespace().as_str() == PACKAGE_NAMESPACE
                        && session.cap_key(cap) == Some(key)
                        && !out.contains(&cap)
                    {
                        out.push(cap);
                    }
                }
            }
        }

        for (req, cap) in pairs {
            if session.req(req).namespace().as_str() == BUNDLE_NAMESPACE
                && session.req(req).visibility() == Visibility::Reexport
            {
                self.collect(session, candidates, session.cap_owner(cap), key, out, seen);
            }
        }
    }
}

/// Walks the candidate graph from a target module and fills in the package
/// space of every transitively chosen module.
pub(crate) struct SpaceBuilder<'a, 'e> {
    session: &'a Session<'e>,
    candidates: &'a Candidates,
    sources: &'a mut Sources,
    /// A wired module doing a dynamic import still gets phase 4; its
    /// dynamic pair rides alongside the installed wires.
    dynamic: Option<(ModuleId, ReqRef)>,
    spaces: Spaces,
    visited: HashSet<ModuleId>,
    /// capability → subjects already merged, the uses-closure cycle guard
    cycles: HashMap<CapRef, Vec<ModuleId>>,
}

impl<'a, 'e> SpaceBuilder<'a, 'e> {
    pub fn new(
        session: &'a Session<'e>,
        candidates: &'a Candidates,
        sources: &'a mut Sources,
        dynamic: Option<(ModuleId, ReqRef)>,
    ) -> SpaceBuilder<'a, 'e> {
        SpaceBuilder {
            session,
            candidates,
            sources,
            dynamic,
            spaces: Spaces::default(),
            visited: HashSet::new(),
            cycles: HashMap::new(),
        }
    }

    pub fn finish(self) -> Spaces {
        self.spaces
    }

    fn pairs(&self, module: ModuleId) -> Vec<(ReqRef, CapRef)> {
        let mut pairs = self.session.chosen_pairs(self.candidates, module);
        if let Some((subject, req)) = self.dynamic {
            if subject == module {
                if let Some(cap) = self.candidates.chosen(req) {
                    pairs.push((req, cap));
                }
            }
        }
        pairs
    }

    fn is_uses_subject(&self, module: ModuleId) -> bool {
        !self.session.is_wired(module)
            || self.dynamic.map_or(false, |(subject, _)| subject == module)
    }

    /// The packages `module` effectively exports: declared (or installed)
    /// package capabilities minus those substituted by an import of the
    /// same package from another module.
    fn exported_packages(&self, module: ModuleId) -> Vec<CapRef> {
        let imported: HashSet<Symbol> = self
            .pairs(module)
            .iter()
            .filter_map(|&(_, cap)| {
                if self.session.cap(cap).namespace().as_str() == PACKAGE_NAMESPACE
                    && self.session.cap_owner(cap) != module
                {
                    self.session.cap_key(cap)
                } else {
                    None
                }
            })
            .collect();
        self.session
            .effective_caps(module)
            .into_iter()
            .filter(|&cap| {
                if self.session.cap(cap).namespace().as_str() != PACKAGE_NAMESPACE {
                    return false;
                }
                match self.session.cap_key(cap) {
                    Some(key) => !imported.contains(&key),
                    None => false,
                }
            })
            .collect()
    }

    pub fn build(&mut self, module: ModuleId) {
        if !self.visited.insert(module) {
            return;
        }
        trace!("building package space for {}", self.session.store().describe(module));
        let pairs = self.pairs(module);
        let mut space = PackageSpace::default();

        // Phase 1: exported.
        for cap in self.exported_packages(module) {
            if let Some(key) = self.session.cap_key(cap) {
                space.exported.entry(key).or_insert_with(|| Blame::exported(cap));
            }
        }

        // Phase 2: imported and required.
        for &(req, cap) in &pairs {
            if self.session.cap_owner(cap) == module {
                // Self-provided: no blame, no uses merge; the wire still
                // shows up in the final emission.
                continue;
            }
            match self.session.req(req).namespace().as_str() {
                PACKAGE_NAMESPACE => {
                    if let Some(key) = self.session.cap_key(cap) {
                        space.imported.entry(key).or_default().push(Blame::via(cap, req));
                    }
                }
                BUNDLE_NAMESPACE => {
                    let mut seen = HashSet::new();
                    self.merge_required(
                        &mut space,
                        self.session.cap_owner(cap),
                        req,
                        &mut seen,
                    );
                }
                HOST_NAMESPACE => {}
                _ => {
                    // Generic namespaces participate when they define a
                    // key, exactly like package imports.
                    if let Some(key) = self.session.cap_key(cap) {
                        space.imported.entry(key).or_default().push(Blame::via(cap, req));
                    }
                }
            }
        }
        self.spaces.insert(module, space);

        // Phase 3: recurse into every chosen provider.
        for &(_, cap) in &pairs {
            let provider = self.session.cap_owner(cap);
            if provider != module {
                self.build(provider);
            }
        }

        // Phase 4: uses closure, only where consistency will be checked.
        if self.is_uses_subject(module) {
            let blames: Vec<Blame> = {
                let space = &self.spaces[&module];
                space
                    .imported
                    .values()
                    .chain(space.required.values())
                    .flatten()
                    .cloned()
                    .collect()
            };
            for blame in blames {
                self.merge_uses(module, blame.cap, &blame.path);
            }
        }
    }

    /// Pulls the provider's exports into `space.required`, recursing
    /// through the provider's own re-export-visibility bundle edges with
    /// the original requirement as the blame origin.
    fn merge_required(
        &mut self,
        space: &mut PackageSpace,
        provider: ModuleId,
        origin: ReqRef,
        seen: &mut HashSet<ModuleId>,
    ) {
        if !seen.insert(provider) {
            return;
        }
        for cap in self.exported_packages(provider) {
            if let Some(key) = self.session.cap_key(cap) {
                space.required.entry(key).or_default().push(Blame::via(cap, origin));
            }
        }
        for (req, cap) in self.pairs(provider) {
            if self.session.req(req).namespace().as_str() == BUNDLE_NAMESPACE
                && self.session.req(req).visibility() == Visibility::Reexport
            {
                self.merge_required(space, self.session.cap_owner(cap), origin, seen);
            }
        }
    }

    /// Records, for every package source of `cap` and every package those
    /// sources declare in `uses`, how `module` comes to see that package,
    /// then chases the newly recorded capabilities the same way. The
    /// closure is what lets the checker compare a module's direct view of a
    /// package against every view reachable through `uses` chains.
    fn merge_uses(&mut self, module: ModuleId, cap: CapRef, path: &[ReqRef]) {
        if self.session.cap_owner(cap) == module {
            return;
        }
        let merged = self.cycles.entry(cap).or_default();
        if merged.contains(&module) {
            return;
        }
        merged.push(module);

        let sources = self.sources.of(self.session, self.candidates, cap);
        for &source in sources.iter() {
            let owner = self.session.cap_owner(source);
            for &used in self.session.cap_uses(source) {
                if !self.spaces.contains_key(&owner) {
                    self.build(owner);
                }
                let owner_blames: Vec<Blame> = {
                    let owner_space = match self.spaces.get(&owner) {
                        Some(s) => s,
                        None => continue,
                    };
                    match owner_space.exported.get(&used) {
                        Some(b) => vec![b.clone()],
                        None => owner_space
                            .imported
                            .get(&used)
                            .cloned()
                            .unwrap_or_default(),
                    }
                };
                for owner_blame in owner_blames {
                    let mut extended = path.to_vec();
                    extended.extend(owner_blame.path.iter().copied());
                    let entry = self
                        .spaces
                        .get_mut(&module)
                        .expect("subject space exists during uses merge")
                        .used
                        .entry(used)
                        .or_default();
                    // A second path to the same capability proves nothing
                    // new: compatibility compares capability identities.
                    if entry.iter().any(|b| b.cap == owner_blame.cap) {
                        continue;
                    }
                    entry.push(Blame {
                        cap: owner_blame.cap,
                        path: extended.clone(),
                    });
                    self.merge_uses(module, owner_blame.cap, &extended);
                }
            }
        }
    }
}
