//! Resolution of module wirings from capabilities and requirements.
//!
//! `weft` answers one question: given a set of installed modules that each
//! declare *capabilities* they provide and *requirements* they need, plus a
//! designated root module, is there an assignment of one provider per
//! requirement under which every transitively reachable module sees a
//! single, coherent view of every exported package? If so, the answer is
//! the set of *wires* (requirement → capability edges) realizing it;
//! otherwise a diagnostic naming the conflict.
//!
//! The hard part is that this is constraint satisfaction over an
//! exponential candidate space, not a lookup: package capabilities carry
//! *uses* directives whose consistency rule cascades across arbitrary
//! dependency depth, fragments graft extra capabilities and requirements
//! onto their hosts, and a module that both exports and imports the same
//! package silently substitutes the import. The resolver searches by
//! backtracking over *permutations*, alternative candidate assignments
//! differing in at least one choice, always respecting the environment's
//! preference order.
//!
//! The crate is a library with no I/O: the [`core::Environment`] trait
//! supplies ordered candidate sets, [`core::Resolver::resolve`] is a pure
//! function of the environment and the root, and the emitted
//! [`core::Resolve`] is handed back to whatever owns wiring installation.

pub use crate::core::{
    CapId, Capability, Environment, FailureKind, Module, ModuleId, ModuleStore, ReqId,
    Requirement, Resolve, ResolveFailure, Resolver, Value, Wire, Wiring,
};
pub use crate::util::{WeftError, WeftResult};

pub mod core;
pub mod util;
