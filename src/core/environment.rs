use crate::core::capability::CapId;
use crate::core::module::ModuleStore;
use crate::core::requirement::ReqId;
use crate::util::WeftResult;

/// The resolver's window onto the installed world.
///
/// The environment owns capability indexing and filter evaluation; the
/// resolver only ever asks it for the ordered candidate set of a
/// requirement and respects that order: it removes candidates during
/// backtracking but never reorders them. The environment must be read-only
/// for the duration of a resolve and idempotent (the same query returns the
/// same answer every time).
pub trait Environment {
    /// The module arena all ids handed to and from this environment index
    /// into.
    fn store(&self) -> &ModuleStore;

    /// Candidate providers for `requirement`, most preferred first.
    ///
    /// With `obey_mandatory` set, an unsatisfiable requirement yields an
    /// empty list and the caller decides whether that is fatal; the flag
    /// exists so dynamic-import queries can ask for best-effort candidates.
    ///
    /// Errors from this method are environment failures (corrupt index and
    /// the like); they abort the resolve rather than triggering
    /// backtracking.
    fn candidates(&self, requirement: ReqId, obey_mandatory: bool) -> WeftResult<Vec<CapId>>;
}
