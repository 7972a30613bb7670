mod support;

use pretty_assertions::assert_eq;

use support::{
    assert_wired_to, import_req, module, module_named, module_v, package_cap, package_wire, ver,
    StaticEnvironment,
};
use weft::core::namespace::BUNDLE_NAMESPACE;
use weft::{Environment, FailureKind, ModuleStore, ResolveFailure, Resolver};

#[test]
fn single_import_wires_to_the_only_provider() {
    let mut store = ModuleStore::new();
    let a = module(&mut store, "a").exports("p").id();
    let b = module(&mut store, "b").imports("p").id();
    let env = StaticEnvironment::new(store);

    let resolve = Resolver::new().resolve(&env, b, &[]).unwrap();

    assert_wired_to(env.store(), &resolve, b, "p", a);
    // The provider had to be co-resolved, so it shows up with an empty
    // wire list of its own.
    assert_eq!(resolve.wires(a).unwrap(), &[]);
    assert_eq!(resolve.len(), 2);
}

#[test]
fn wired_provider_is_not_re_emitted() {
    let mut store = ModuleStore::new();
    let a = module(&mut store, "a").exports("p").id();
    let b = module(&mut store, "b").imports("p").id();
    let mut env = StaticEnvironment::new(store);

    let first = Resolver::new().resolve(&env, a, &[]).unwrap();
    first.install_into(env.store_mut());

    let resolve = Resolver::new().resolve(&env, b, &[]).unwrap();
    assert_wired_to(env.store(), &resolve, b, "p", a);
    assert!(!resolve.contains(a));
}

#[test]
fn substitutable_export_chains_to_one_provider() {
    let mut store = ModuleStore::new();
    // Registration order makes `b` the preferred provider of `p` for `c`;
    // `b` itself imports `p` pinned to `a`, substituting its own export.
    let b = module_v(&mut store, "b", "1.1.0")
        .cap(weft::Capability::package("p").attr("version", ver("1.1.0")))
        .imports_versioned("p", "=1.0.0")
        .id();
    let a = module(&mut store, "a")
        .cap(weft::Capability::package("p").attr("version", ver("1.0.0")))
        .id();
    let c = module(&mut store, "c").imports("p").id();
    let env = StaticEnvironment::new(store);

    let resolve = Resolver::new().resolve(&env, c, &[]).unwrap();

    assert_wired_to(env.store(), &resolve, c, "p", b);
    assert_wired_to(env.store(), &resolve, b, "p", a);
}

#[test]
fn uses_violation_backtracks_the_import() {
    let mut store = ModuleStore::new();
    // `c` prefers a2 for `p` (registration order), but `u`'s export of `q`
    // uses `p` and `u` only accepts a1's `p`. The only consistent
    // assignment flips `c` onto a1.
    let a2 = module(&mut store, "a2")
        .cap(weft::Capability::package("p").attr("version", ver("2.0.0")))
        .id();
    let a1 = module(&mut store, "a1")
        .cap(weft::Capability::package("p").attr("version", ver("1.0.0")))
        .id();
    let u = module(&mut store, "u")
        .exports_uses("q", &["p"])
        .imports_versioned("p", "^1.0")
        .id();
    let c = module(&mut store, "c").imports("q").imports("p").id();
    let env = StaticEnvironment::new(store);

    // Sanity: a2 really is preferred before backtracking.
    let head = env
        .candidates(import_req(env.store(), c, "p"), true)
        .unwrap()[0];
    assert_eq!(env.store().capability(head).owner(), a2);

    let resolve = Resolver::new().resolve(&env, c, &[]).unwrap();

    assert_wired_to(env.store(), &resolve, c, "p", a1);
    assert_wired_to(env.store(), &resolve, c, "q", u);
    assert_wired_to(env.store(), &resolve, u, "p", a1);
}

#[test]
fn export_clashing_with_uses_closure_is_reported() {
    let mut store = ModuleStore::new();
    // `c` exports `p` itself but imports `q` from `u`, whose export uses
    // `p` as seen from `a1`. Nothing can reconcile `c`'s own `p` with
    // `a1`'s, so the conflict surfaces with both chains.
    let _a1 = module(&mut store, "a1").exports("p").id();
    let _u = module(&mut store, "u")
        .exports_uses("q", &["p"])
        .imports("p")
        .id();
    let c = module(&mut store, "c").exports("p").imports("q").id();
    let env = StaticEnvironment::new(store);

    let err = Resolver::new().resolve(&env, c, &[]).unwrap_err();
    let failure = err.downcast_ref::<ResolveFailure>().unwrap();

    assert_eq!(failure.kind, FailureKind::UsesConstraintViolation);
    assert_eq!(failure.module, c);
    assert!(failure.message().contains("exported by"), "{}", failure);
    assert!(failure.message().contains("a1 1.0.0"), "{}", failure);
}

#[test]
fn mutual_cycle_with_no_settled_provider_fails() {
    let mut store = ModuleStore::new();
    let x = module(&mut store, "x").exports("x").imports("y").id();
    let _y = module(&mut store, "y").exports("y").imports("x").id();
    let env = StaticEnvironment::new(store);

    let err = Resolver::new().resolve(&env, x, &[]).unwrap_err();
    let failure = err.downcast_ref::<ResolveFailure>().unwrap();

    assert_eq!(failure.kind, FailureKind::UnsatisfiedMandatoryRequirement);
    assert!(failure.message().contains("no providers"), "{}", failure);
}

#[test]
fn unsatisfied_optional_import_is_skipped() {
    let mut store = ModuleStore::new();
    let a = module(&mut store, "a").exports("p").id();
    let b = module(&mut store, "b")
        .imports("p")
        .imports_optional("missing")
        .id();
    let env = StaticEnvironment::new(store);

    let resolve = Resolver::new().resolve(&env, b, &[]).unwrap();

    assert_wired_to(env.store(), &resolve, b, "p", a);
    assert!(package_wire(env.store(), &resolve, b, "missing").is_none());
}

#[test]
fn missing_mandatory_import_names_the_requirement() {
    let mut store = ModuleStore::new();
    let b = module(&mut store, "b").imports("nowhere").id();
    let env = StaticEnvironment::new(store);

    let err = Resolver::new().resolve(&env, b, &[]).unwrap_err();
    let failure = err.downcast_ref::<ResolveFailure>().unwrap();

    assert_eq!(failure.kind, FailureKind::UnsatisfiedMandatoryRequirement);
    assert_eq!(failure.module, b);
    assert!(failure.message().contains("`nowhere`"), "{}", failure);
    assert!(failure.message().contains("`b 1.0.0`"), "{}", failure);
}

#[test]
fn require_bundle_pulls_reexported_packages_through() {
    let mut store = ModuleStore::new();
    let b1 = module(&mut store, "b1")
        .bundle_cap("b1")
        .exports("p1")
        .id();
    let b2 = module(&mut store, "b2")
        .bundle_cap("b2")
        .exports("p2")
        .reexports_bundle("b1")
        .id();
    let c = module(&mut store, "c").requires_bundle("b2").id();
    let env = StaticEnvironment::new(store);

    let resolve = Resolver::new().resolve(&env, c, &[]).unwrap();

    let wires = resolve.wires(c).unwrap();
    assert_eq!(wires.len(), 1);
    let wire = &wires[0];
    assert_eq!(wire.provider, b2);
    assert_eq!(
        env.store()
            .capability(wire.capability)
            .namespace()
            .as_str(),
        BUNDLE_NAMESPACE
    );
    // Both bundles had to resolve.
    assert!(resolve.contains(b1));
    assert!(resolve.contains(b2));
}

#[test]
fn uses_conflict_through_required_bundle_is_detected() {
    let mut store = ModuleStore::new();
    // `c` requires a bundle whose exports use `p` as seen from `a1`, while
    // `c` itself imports `p` pinned to `a2`. No permutation can fix it:
    // both sides have exactly one candidate.
    let _a1 = module(&mut store, "a1")
        .cap(weft::Capability::package("p").attr("version", ver("1.0.0")))
        .id();
    let _a2 = module(&mut store, "a2")
        .cap(weft::Capability::package("p").attr("version", ver("2.0.0")))
        .id();
    let _u = module(&mut store, "u")
        .bundle_cap("u")
        .exports_uses("q", &["p"])
        .imports_versioned("p", "^1.0")
        .id();
    let c = module(&mut store, "c")
        .requires_bundle("u")
        .imports_versioned("p", "^2.0")
        .id();
    let env = StaticEnvironment::new(store);

    let err = Resolver::new().resolve(&env, c, &[]).unwrap_err();
    let failure = err.downcast_ref::<ResolveFailure>().unwrap();

    assert_eq!(failure.kind, FailureKind::UsesConstraintViolation);
    assert_eq!(failure.module, c);
    // The two chains name both providers.
    assert!(failure.message().contains("a1 1.0.0"), "{}", failure);
    assert!(failure.message().contains("a2 1.0.0"), "{}", failure);
}

#[test]
fn environment_preference_order_is_respected() {
    let mut store = ModuleStore::new();
    let a1 = module(&mut store, "a1").exports("p").id();
    let a2 = module(&mut store, "a2").exports("p").id();
    let c = module(&mut store, "c").imports("p").id();
    let mut env = StaticEnvironment::new(store);

    // Registration order prefers a1.
    let resolve = Resolver::new().resolve(&env, c, &[]).unwrap();
    assert_wired_to(env.store(), &resolve, c, "p", a1);

    // An explicit override flips the preference.
    let req = import_req(env.store(), c, "p");
    let a2_cap = package_cap(env.store(), a2, "p");
    let a1_cap = package_cap(env.store(), a1, "p");
    env.prefer(req, vec![a2_cap, a1_cap]);
    let resolve = Resolver::new().resolve(&env, c, &[]).unwrap();
    assert_wired_to(env.store(), &resolve, c, "p", a2);
}

#[test]
fn resolving_twice_is_idempotent() {
    let mut store = ModuleStore::new();
    module(&mut store, "a1").exports("p").id();
    let a1 = module_named(&store, "a1");
    module(&mut store, "u")
        .exports_uses("q", &["p"])
        .imports("p")
        .id();
    let c = module(&mut store, "c").imports("q").imports("p").id();
    let env = StaticEnvironment::new(store);

    let mut resolver = Resolver::new();
    let first = resolver.resolve(&env, c, &[]).unwrap();
    let second = resolver.resolve(&env, c, &[]).unwrap();

    assert_eq!(first, second);
    assert_wired_to(env.store(), &first, c, "p", a1);
}

#[test]
fn every_emitted_wire_is_an_environment_candidate() {
    let mut store = ModuleStore::new();
    module(&mut store, "a").exports("p").exports("q");
    module(&mut store, "b").imports("p").exports_uses("r", &["p"]);
    let c = module(&mut store, "c").imports("p").imports("q").imports("r").id();
    let env = StaticEnvironment::new(store);

    let resolve = Resolver::new().resolve(&env, c, &[]).unwrap();

    for (_, wires) in resolve.iter() {
        for wire in wires {
            let candidates = env.candidates(wire.requirement, true).unwrap();
            assert!(
                candidates.contains(&wire.capability),
                "wire capability not among environment candidates"
            );
        }
    }
}

#[test]
fn self_provided_requirement_still_wires() {
    let mut store = ModuleStore::new();
    let a = module(&mut store, "a").exports("p").imports("p").id();
    let env = StaticEnvironment::new(store);

    let resolve = Resolver::new().resolve(&env, a, &[]).unwrap();

    let wire = package_wire(env.store(), &resolve, a, "p").unwrap();
    assert_eq!(wire.provider, a);
    assert_eq!(wire.requirer, a);
}
