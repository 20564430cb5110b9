use strum_macros::Display;

/// Terminal status of a call to [`crate::PrimalSimplex::solve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SolveStatus {
    /// The solve ran to completion.
    Ok,
    /// The solve bailed out on an iteration, time or stop-flag limit;
    /// the instance state is intact and the solve can be resumed.
    Warning,
    /// The solve failed; see [`ModelStatus::SolveError`].
    Error,
}

/// Classification of the model after a solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ModelStatus {
    /// No classification has been reached yet.
    NotSet,
    /// An optimal vertex was found.
    Optimal,
    /// The constraints cannot be satisfied.
    PrimalInfeasible,
    /// The objective is unbounded over the feasible region.
    PrimalUnbounded,
    /// Both the primal and the dual problem are infeasible.
    PrimalDualInfeasible,
    /// The dual problem is infeasible.
    DualInfeasible,
    /// A logical or numerical error ended the solve.
    SolveError,
}

/// State machine of the two-phase solve.
///
/// `Phase1` and `Phase2` are the iterating states; the remaining variants
/// are terminal or transitional sentinels inspected by the outer loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SolvePhase {
    Optimal,
    Phase1,
    Phase2,
    /// Bound shifts were removed and primal infeasibilities remain; a dual
    /// clean-up pass outside this engine is required.
    Cleanup,
    /// The model has been classified (infeasible or unbounded); leave the
    /// outer loop.
    Exit,
    /// The phase must be re-derived from a fresh infeasibility count.
    Unknown,
    Error,
}

impl SolvePhase {
    pub(crate) fn is_solving(self) -> bool {
        matches!(self, SolvePhase::Phase1 | SolvePhase::Phase2)
    }
}

/// Reason an inner iteration asks the outer loop to restore invariants
/// from scratch. Inner routines never abort; they record one of these and
/// return normally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RebuildReason {
    No,
    PossiblyOptimal,
    PossiblyPrimalUnbounded,
    PossiblySingularBasis,
    PrimalInfeasibleInPrimalSimplex,
    SyntheticClockSaysInvert,
    UpdateLimitReached,
}

impl RebuildReason {
    pub(crate) fn is_set(self) -> bool {
        self != RebuildReason::No
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_predicates() {
        assert!(SolvePhase::Phase1.is_solving());
        assert!(SolvePhase::Phase2.is_solving());
        assert!(!SolvePhase::Optimal.is_solving());
        assert!(!SolvePhase::Exit.is_solving());
        assert!(!RebuildReason::No.is_set());
        assert!(RebuildReason::UpdateLimitReached.is_set());
    }

    #[test]
    fn status_display() {
        assert_eq!(ModelStatus::PrimalInfeasible.to_string(), "PrimalInfeasible");
        assert_eq!(SolveStatus::Warning.to_string(), "Warning");
    }
}
