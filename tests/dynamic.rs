mod support;

use support::{module, package_wire, ver, StaticEnvironment};
use weft::{Environment, ModuleStore, Resolver};

/// Resolves `root` and installs the result, leaving it wired.
fn wire_up(env: &mut StaticEnvironment, root: weft::ModuleId) {
    let resolve = Resolver::new().resolve(&*env, root, &[]).unwrap();
    resolve.install_into(env.store_mut());
}

#[test]
fn dynamic_import_wires_a_single_package() {
    let mut store = ModuleStore::new();
    let a = module(&mut store, "a").exports("p").id();
    let h = module(&mut store, "h").dynamic_imports("p").id();
    let mut env = StaticEnvironment::new(store);
    wire_up(&mut env, h);

    let resolve = Resolver::new()
        .resolve_dynamic(&env, h, "p", &[])
        .unwrap()
        .expect("dynamic import applies");

    assert_eq!(resolve.len(), 1);
    let wire = package_wire(env.store(), &resolve, h, "p").unwrap();
    assert_eq!((wire.requirer, wire.provider), (h, a));
}

#[test]
fn wildcard_dynamic_import_covers_subpackages() {
    let mut store = ModuleStore::new();
    let a = module(&mut store, "a").exports("org.example.api").id();
    let h = module(&mut store, "h").dynamic_imports("org.example.*").id();
    let mut env = StaticEnvironment::new(store);
    wire_up(&mut env, h);

    let resolve = Resolver::new()
        .resolve_dynamic(&env, h, "org.example.api", &[])
        .unwrap()
        .expect("wildcard covers the package");

    let wire = package_wire(env.store(), &resolve, h, "org.example.api").unwrap();
    assert_eq!(wire.provider, a);
}

#[test]
fn dynamic_import_is_inapplicable_without_preconditions() {
    let mut store = ModuleStore::new();
    module(&mut store, "a").exports("p");
    let unwired = module(&mut store, "u").dynamic_imports("p").id();
    let h = module(&mut store, "h").dynamic_imports("p").exports("q").id();
    let mut env = StaticEnvironment::new(store);
    wire_up(&mut env, h);

    let mut resolver = Resolver::new();
    // Target not wired.
    assert!(resolver.resolve_dynamic(&env, unwired, "p", &[]).unwrap().is_none());
    // Empty package name.
    assert!(resolver.resolve_dynamic(&env, h, "", &[]).unwrap().is_none());
    // Package exported by the target itself.
    assert!(resolver.resolve_dynamic(&env, h, "q", &[]).unwrap().is_none());
    // No dynamic declaration covering the package.
    assert!(resolver.resolve_dynamic(&env, h, "other", &[]).unwrap().is_none());
}

#[test]
fn dynamic_import_of_an_already_sourced_package_is_inapplicable() {
    let mut store = ModuleStore::new();
    module(&mut store, "a").exports("p");
    let h = module(&mut store, "h").imports("p").dynamic_imports("*").id();
    let mut env = StaticEnvironment::new(store);
    wire_up(&mut env, h);

    assert!(Resolver::new()
        .resolve_dynamic(&env, h, "p", &[])
        .unwrap()
        .is_none());
}

#[test]
fn unresolvable_dynamic_import_returns_none() {
    let mut store = ModuleStore::new();
    let h = module(&mut store, "h").dynamic_imports("*").id();
    let mut env = StaticEnvironment::new(store);
    wire_up(&mut env, h);

    assert!(Resolver::new()
        .resolve_dynamic(&env, h, "p", &[])
        .unwrap()
        .is_none());
}

#[test]
fn dynamic_import_honors_uses_constraints_of_the_existing_wiring() {
    let mut store = ModuleStore::new();
    // `h` is wired to `u` for `q`, whose export uses `p` as provided by
    // `a1`. A dynamic import of `p` must not pick `a2` even though it is
    // preferred, or `h` would see two versions of `p`.
    let _a2 = module(&mut store, "a2")
        .cap(weft::Capability::package("p").attr("version", ver("2.0.0")))
        .id();
    let a1 = module(&mut store, "a1")
        .cap(weft::Capability::package("p").attr("version", ver("1.0.0")))
        .id();
    module(&mut store, "u")
        .exports_uses("q", &["p"])
        .imports_versioned("p", "^1.0");
    let h = module(&mut store, "h").imports("q").dynamic_imports("p").id();
    let mut env = StaticEnvironment::new(store);
    wire_up(&mut env, h);

    let resolve = Resolver::new()
        .resolve_dynamic(&env, h, "p", &[])
        .unwrap()
        .expect("dynamic import applies");

    let wire = package_wire(env.store(), &resolve, h, "p").unwrap();
    assert_eq!(wire.provider, a1);
}
