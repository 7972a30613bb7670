//! Crate-wide error plumbing.
//!
//! Most fallible operations return [`WeftResult`], an `anyhow` result: the
//! environment is free to fail in ways the resolver cannot anticipate
//! (corrupt index, I/O behind a cache, ...) and such errors abort the whole
//! resolve rather than triggering backtracking. Failures the resolver *can*
//! react to (a missing provider, a uses conflict) are typed
//! ([`crate::core::resolver::ResolveFailure`]) and travel separately so the
//! driver can permute or retract before surfacing them.

pub use anyhow::Error as WeftError;

pub type WeftResult<T> = anyhow::Result<T>;
