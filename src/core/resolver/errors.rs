use std::fmt;

use itertools::Itertools;

use crate::core::module::ModuleId;
use crate::core::namespace::{BUNDLE_NAMESPACE, PACKAGE_NAMESPACE};
use crate::core::requirement::ReqId;
use crate::core::resolver::space::Blame;
use crate::core::resolver::types::{ReqRef, Session};
use crate::util::Symbol;

/// Why a resolve could not complete.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// A mandatory requirement ended up with no viable candidates.
    UnsatisfiedMandatoryRequirement,
    /// An export/used or import/used incompatibility survived every
    /// permutation.
    UsesConstraintViolation,
    /// The same package reached a module from two providers via fragment
    /// imports.
    FragmentImportConflict,
    /// A fragment's host requirement resolved to itself or to a cycle of
    /// fragment hosts.
    CircularHostAttachment,
}

/// A resolution failure, carrying the module being resolved when the
/// conflict arose, the requirement at fault when one can be named, and a
/// formatted blame chain.
///
/// During the search these are raised by the checker and converted into
/// permutation pops by the driver; only after both permutation stacks drain
/// does one surface to the caller.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ResolveFailure {
    pub module: ModuleId,
    pub requirement: Option<ReqId>,
    pub kind: FailureKind,
    /// The module whose retraction could make the failure go away: the
    /// declaring fragment for failures on hosted requirements, otherwise
    /// the subject module. The driver consults this for optional
    /// retraction.
    pub(crate) blamed: ModuleId,
    message: String,
}

impl ResolveFailure {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn unsatisfied(
        session: &Session<'_>,
        module: ModuleId,
        requirement: ReqRef,
        discarded: &[String],
    ) -> ResolveFailure {
        let store = session.store();
        let req = session.req(requirement);
        let what = match req.key() {
            Some(k) => format!("`{}`", k),
            None => format!("in namespace `{}`", req.namespace()),
        };
        let mut message = format!(
            "no providers for mandatory requirement {} of `{}`",
            what,
            store.describe(session.req_declared_owner(requirement)),
        );
        for reason in discarded {
            message.push_str("\n    candidate discarded: ");
            message.push_str(reason);
        }
        ResolveFailure {
            module,
            requirement: Some(session.req_declared(requirement)),
            kind: FailureKind::UnsatisfiedMandatoryRequirement,
            blamed: blamed_for(session, module, requirement),
            message,
        }
    }

    pub(crate) fn uses_conflict(
        session: &Session<'_>,
        module: ModuleId,
        key: Symbol,
        subject_kind: SubjectKind,
        subject: &Blame,
        used: &Blame,
    ) -> ResolveFailure {
        let store = session.store();
        let subject_provider = store.describe(session.cap_declared_owner(subject.cap));
        let used_provider = store.describe(session.cap_declared_owner(used.cap));
        let (verb, chain_label) = match subject_kind {
            SubjectKind::Export => ("exported by", "export chain"),
            SubjectKind::Import => ("imported from", "import chain"),
        };
        let message = format!(
            "uses constraint violation for `{}`: package `{}` is {} `{}` but a \
             conflicting view of `{}` comes from `{}`:\n  {}:\n{}\n  uses chain:\n{}",
            store.describe(module),
            key,
            verb,
            subject_provider,
            key,
            used_provider,
            chain_label,
            describe_chain(session, module, subject),
            describe_chain(session, module, used),
        );
        let requirement = subject.path.first().copied();
        ResolveFailure {
            module,
            requirement: requirement.map(|r| session.req_declared(r)),
            kind: FailureKind::UsesConstraintViolation,
            blamed: requirement
                .map(|r| blamed_for(session, module, r))
                .unwrap_or(module),
            message,
        }
    }

    pub(crate) fn fragment_import_conflict(
        session: &Session<'_>,
        module: ModuleId,
        key: Symbol,
        blames: &[Blame],
    ) -> ResolveFailure {
        let store = session.store();
        let providers = blames
            .iter()
            .map(|b| format!("`{}`", store.describe(session.cap_declared_owner(b.cap))))
            .unique()
            .join(" and ");
        let chains = blames
            .iter()
            .map(|b| describe_chain(session, module, b))
            .join("\n");
        let message = format!(
            "package `{}` is imported into `{}` from {} at once:\n{}",
            key,
            store.describe(module),
            providers,
            chains,
        );
        // Prefer blaming a fragment-contributed import: retracting the
        // fragment is the retry that can actually clear the conflict.
        let requirement = blames
            .iter()
            .filter_map(|b| b.path.first().copied())
            .find(|&r| session.req_is_hosted(r))
            .or_else(|| blames.first().and_then(|b| b.path.first().copied()));
        ResolveFailure {
            module,
            requirement: requirement.map(|r| session.req_declared(r)),
            kind: FailureKind::FragmentImportConflict,
            blamed: requirement
                .map(|r| blamed_for(session, module, r))
                .unwrap_or(module),
            message,
        }
    }

    pub(crate) fn circular_host(session: &Session<'_>, fragment: ModuleId) -> ResolveFailure {
        let store = session.store();
        let message = format!(
            "fragment `{}` is attached through a cycle of fragment hosts",
            store.describe(fragment),
        );
        ResolveFailure {
            module: fragment,
            requirement: None,
            kind: FailureKind::CircularHostAttachment,
            blamed: fragment,
            message,
        }
    }
}

/// Which side of the subject module a uses conflict was detected on.
#[derive(Copy, Clone, Debug)]
pub(crate) enum SubjectKind {
    Export,
    Import,
}

/// Failures on hosted requirements are pinned on the declaring fragment so
/// that optional-fragment retraction retracts the fragment, not its host.
fn blamed_for(session: &Session<'_>, module: ModuleId, requirement: ReqRef) -> ModuleId {
    if session.req_is_hosted(requirement) {
        session.req_declared_owner(requirement)
    } else {
        module
    }
}

/// Renders a blame as an indented chain of the requirements that made the
/// capability visible to `subject`. An empty path means the capability is
/// exported by `subject` itself.
pub(crate) fn describe_chain(session: &Session<'_>, subject: ModuleId, blame: &Blame) -> String {
    let store = session.store();
    if blame.path.is_empty() {
        let key = session
            .cap_key(blame.cap)
            .map(|k| k.to_string())
            .unwrap_or_else(|| session.cap(blame.cap).namespace().to_string());
        return format!("    `{}` exports `{}`", store.describe(subject), key);
    }
    let mut lines = Vec::new();
    let mut owner = subject;
    for (i, &req) in blame.path.iter().enumerate() {
        let provider = if i + 1 < blame.path.len() {
            session.req_owner(blame.path[i + 1])
        } else {
            session.cap_owner(blame.cap)
        };
        let line = match session.req(req).namespace().as_str() {
            BUNDLE_NAMESPACE => format!(
                "`{}` requires bundle `{}`",
                store.describe(owner),
                store.describe(provider),
            ),
            PACKAGE_NAMESPACE => {
                let key = session
                    .req(req)
                    .key()
                    .or_else(|| session.cap_key(blame.cap))
                    .map(|k| k.to_string())
                    .unwrap_or_default();
                format!(
                    "`{}` imports `{}` from `{}`",
                    store.describe(owner),
                    key,
                    store.describe(provider),
                )
            }
            ns => format!(
                "`{}` wires `{}` to `{}`",
                store.describe(owner),
                ns,
                store.describe(provider),
            ),
        };
        lines.push(if i == 0 {
            format!("    {}", line)
        } else {
            format!("    ... {}", line)
        });
        owner = provider;
    }
    lines.join("\n")
}

/// Internal error channel of the resolver: failures the driver can react to
/// (permute, retract an optional) versus environment errors that abort the
/// whole resolve.
#[derive(Debug)]
pub(crate) enum ResolveError {
    Fatal(anyhow::Error),
    Failure(ResolveFailure),
}

impl From<anyhow::Error> for ResolveError {
    fn from(e: anyhow::Error) -> ResolveError {
        ResolveError::Fatal(e)
    }
}

impl From<ResolveFailure> for ResolveError {
    fn from(f: ResolveFailure) -> ResolveError {
        ResolveError::Failure(f)
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Fatal(e) => e.fmt(f),
            ResolveError::Failure(e) => e.fmt(f),
        }
    }
}
