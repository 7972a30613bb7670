//! Reserved namespace, directive and attribute names.
//!
//! Three namespaces get special treatment from the resolver: package
//! capabilities carry uses-constraints and substitutable exports, bundle
//! requirements pull in a provider's whole export set, and host requirements
//! attach fragments. Every other namespace participates in wiring but not in
//! package-space bookkeeping (unless it defines a key attribute named after
//! the namespace itself).

/// Package wiring. The attribute named [`PACKAGE_NAMESPACE`] on a capability
/// in this namespace holds the package name.
pub const PACKAGE_NAMESPACE: &str = "osgi.wiring.package";

/// Require-bundle wiring.
pub const BUNDLE_NAMESPACE: &str = "osgi.wiring.bundle";

/// Fragment-to-host attachment.
pub const HOST_NAMESPACE: &str = "osgi.wiring.host";

/// `resolution` directive: `mandatory` (default), `optional` or `dynamic`.
pub const RESOLUTION_DIRECTIVE: &str = "resolution";
pub const RESOLUTION_MANDATORY: &str = "mandatory";
pub const RESOLUTION_OPTIONAL: &str = "optional";
pub const RESOLUTION_DYNAMIC: &str = "dynamic";

/// `visibility` directive on bundle requirements: `private` (default) or
/// `reexport`.
pub const VISIBILITY_DIRECTIVE: &str = "visibility";
pub const VISIBILITY_PRIVATE: &str = "private";
pub const VISIBILITY_REEXPORT: &str = "reexport";

/// `effective` directive; the resolver only considers capabilities and
/// requirements effective at `resolve` time.
pub const EFFECTIVE_DIRECTIVE: &str = "effective";
pub const EFFECTIVE_RESOLVE: &str = "resolve";

/// `version` attribute, matched by a requirement's version range.
pub const VERSION_ATTRIBUTE: &str = "version";
